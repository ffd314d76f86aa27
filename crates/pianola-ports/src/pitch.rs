/// Sample rate every inference backend expects its input resampled to.
pub const INFERENCE_SAMPLE_RATE_HZ: u32 = 22_050;

#[derive(thiserror::Error, Debug)]
pub enum PitchInferError {
    #[error("model load failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("cancelled")]
    Cancelled,
}

/// Proactive capability probe, reported before any conversion is attempted.
#[derive(Clone, Debug)]
pub struct Capability {
    pub supported: bool,
    pub message: Option<String>,
}

impl Capability {
    pub fn ok() -> Self {
        Self {
            supported: true,
            message: None,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            supported: false,
            message: Some(message.into()),
        }
    }
}

/// Per-frame activation matrices from the inference model. Rows are frames,
/// columns are pitch bins starting at `first_pitch`. The matrices are opaque
/// to the codec; only the adapter that produced them interprets the bins.
#[derive(Clone, Debug, Default)]
pub struct PitchActivations {
    pub frames: Vec<Vec<f32>>,
    pub onsets: Vec<Vec<f32>>,
    pub contours: Vec<Vec<f32>>,
    pub frames_per_second: f64,
    pub first_pitch: u8,
}

impl PitchActivations {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NoteExtractOptions {
    /// 0.1..=0.9; higher means stricter onset detection.
    pub onset_threshold: f32,
    /// 0.1..=0.5; controls how long a note sustains.
    pub frame_threshold: f32,
    /// Minimum note length in inference frames, 1..=10.
    pub min_note_frames: usize,
}

/// A detected note before it becomes part of a song: time in seconds,
/// amplitude still unmapped to velocity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawNoteEvent {
    pub pitch_midi: f32,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub amplitude: f32,
}

/// Incremental inference progress as a fraction in 0..=1. Returning false
/// requests cancellation; the adapter must then bail out with `Cancelled`.
pub type InferProgress<'a> = &'a mut dyn FnMut(f32) -> bool;

pub trait PitchInferencePort: Send + Sync {
    fn capability(&self) -> Capability;

    /// Run the model over mono samples at `INFERENCE_SAMPLE_RATE_HZ`.
    fn infer(
        &self,
        samples: &[f32],
        sample_rate_hz: u32,
        on_progress: InferProgress,
    ) -> Result<PitchActivations, PitchInferError>;

    /// Threshold activation matrices into timed note events.
    fn extract_notes(
        &self,
        activations: &PitchActivations,
        options: &NoteExtractOptions,
    ) -> Vec<RawNoteEvent>;
}
