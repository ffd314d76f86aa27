#[derive(thiserror::Error, Debug)]
pub enum AudioDecodeError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Mono sample buffer as produced by a decode adapter.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate_hz as f64
    }
}

pub trait AudioDecodePort: Send + Sync {
    /// Decode a container (sniffed from the byte stream) to mono samples.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, AudioDecodeError>;

    fn resample(&self, audio: &DecodedAudio, target_rate_hz: u32) -> DecodedAudio;
}
