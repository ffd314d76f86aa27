//! WAV intake built on hound: decode to mono f32, resample by linear
//! interpolation. MP3 payloads are recognized and refused up front so the
//! caller can surface a usable message instead of a parser error.

use std::io::Cursor;

use hound::SampleFormat;
use pianola_ports::audio::{AudioDecodeError, AudioDecodePort, DecodedAudio};

pub struct HoundDecoder;

impl HoundDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HoundDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn looks_like_mp3(bytes: &[u8]) -> bool {
    if bytes.starts_with(b"ID3") {
        return true;
    }
    // Raw MPEG frame sync: 11 set bits.
    bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0
}

fn sample_to_f32(sample: i32, bits_per_sample: u16) -> f32 {
    let full_scale = (1i64 << (bits_per_sample.clamp(1, 32) - 1)) as f32;
    sample as f32 / full_scale
}

fn mix_down(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

impl AudioDecodePort for HoundDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, AudioDecodeError> {
        if looks_like_mp3(bytes) {
            return Err(AudioDecodeError::UnsupportedFormat(
                "MP3 decoding is not available in this build; convert the file to WAV".into(),
            ));
        }

        let mut reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| AudioDecodeError::DecodeFailed(e.to_string()))?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| AudioDecodeError::DecodeFailed(e.to_string()))?,
            SampleFormat::Int => {
                let raw: Vec<i32> = reader
                    .samples::<i32>()
                    .collect::<Result<_, _>>()
                    .map_err(|e| AudioDecodeError::DecodeFailed(e.to_string()))?;
                raw.into_iter()
                    .map(|s| sample_to_f32(s, spec.bits_per_sample))
                    .collect()
            }
        };

        Ok(DecodedAudio {
            samples: mix_down(&interleaved, spec.channels as usize),
            sample_rate_hz: spec.sample_rate,
        })
    }

    fn resample(&self, audio: &DecodedAudio, target_rate_hz: u32) -> DecodedAudio {
        if audio.sample_rate_hz == target_rate_hz
            || audio.sample_rate_hz == 0
            || audio.samples.is_empty()
        {
            return DecodedAudio {
                samples: audio.samples.clone(),
                sample_rate_hz: target_rate_hz.max(audio.sample_rate_hz),
            };
        }

        let ratio = audio.sample_rate_hz as f64 / target_rate_hz as f64;
        let out_len = (audio.samples.len() as f64 / ratio).round().max(1.0) as usize;
        let last = audio.samples.len() - 1;
        let samples = (0..out_len)
            .map(|i| {
                let src = i as f64 * ratio;
                let i0 = (src.floor() as usize).min(last);
                let i1 = (i0 + 1).min(last);
                let frac = (src - i0 as f64) as f32;
                audio.samples[i0] + (audio.samples[i1] - audio.samples[i0]) * frac
            })
            .collect();

        DecodedAudio {
            samples,
            sample_rate_hz: target_rate_hz,
        }
    }
}
