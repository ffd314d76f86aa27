//! Audio-to-song conversion pipeline: validate, decode, infer pitches,
//! extract notes, build a two-hand song. All-or-nothing: cancellation or
//! any phase failure yields an error, never a partial document.

use std::sync::mpsc;

use pianola_domain_song::audio_import::song_from_note_events;
use pianola_domain_song::model::Song;
use pianola_ports::audio::{AudioDecodeError, AudioDecodePort};
use pianola_ports::pitch::{
    NoteExtractOptions, PitchInferError, PitchInferencePort, INFERENCE_SAMPLE_RATE_HZ,
};
use pianola_ports::storage::SettingsDto;
use serde::{Deserialize, Serialize};

/// Hard upload ceiling.
pub const MAX_AUDIO_BYTES: u64 = 50 * 1024 * 1024;
/// Above this the upload is accepted with a slowness warning.
pub const WARN_AUDIO_BYTES: u64 = 10 * 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("unsupported audio input: {0}")]
    Unsupported(String),
    #[error("audio decode failed: {0}")]
    Decode(String),
    #[error("pitch inference failed: {0}")]
    Inference(String),
    #[error("conversion cancelled")]
    Cancelled,
}

/// Tunables carried alongside the settings; clamped before use so saved
/// values from older files can never wedge the extractor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConvertOptions {
    pub onset_threshold: f32,
    pub frame_threshold: f32,
    pub min_note_frames: u32,
    pub velocity_sensitivity: f32,
}

impl Default for AudioConvertOptions {
    fn default() -> Self {
        Self::from_settings(&SettingsDto::default())
    }
}

impl AudioConvertOptions {
    pub fn from_settings(settings: &SettingsDto) -> Self {
        Self {
            onset_threshold: settings.onset_threshold,
            frame_threshold: settings.frame_threshold,
            min_note_frames: settings.min_note_frames,
            velocity_sensitivity: settings.velocity_sensitivity,
        }
    }

    pub fn store(&self, settings: &mut SettingsDto) {
        settings.onset_threshold = self.onset_threshold;
        settings.frame_threshold = self.frame_threshold;
        settings.min_note_frames = self.min_note_frames;
        settings.velocity_sensitivity = self.velocity_sensitivity;
    }

    pub fn clamped(self) -> Self {
        Self {
            onset_threshold: self.onset_threshold.clamp(0.1, 0.9),
            frame_threshold: self.frame_threshold.clamp(0.1, 0.5),
            min_note_frames: self.min_note_frames.clamp(1, 10),
            velocity_sensitivity: self.velocity_sensitivity.clamp(0.1, 1.0),
        }
    }

    fn extract_options(&self) -> NoteExtractOptions {
        let clamped = self.clamped();
        NoteExtractOptions {
            onset_threshold: clamped.onset_threshold,
            frame_threshold: clamped.frame_threshold,
            min_note_frames: clamped.min_note_frames as usize,
        }
    }
}

/// Extension and size gate for the audio intake. `Ok(Some(_))` carries a
/// soft warning for large-but-accepted files.
pub fn validate_audio_upload(
    file_name: &str,
    size_bytes: u64,
) -> Result<Option<String>, ConvertError> {
    let extension = file_name
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if extension != "wav" && extension != "mp3" {
        return Err(ConvertError::Unsupported(
            "please supply a WAV or MP3 file".into(),
        ));
    }
    if size_bytes > MAX_AUDIO_BYTES {
        return Err(ConvertError::Unsupported(format!(
            "file is too large ({} MB); the limit is {} MB",
            size_bytes / (1024 * 1024),
            MAX_AUDIO_BYTES / (1024 * 1024)
        )));
    }
    if size_bytes > WARN_AUDIO_BYTES {
        return Ok(Some(
            "large file; conversion may take several minutes".into(),
        ));
    }
    Ok(None)
}

fn cancelled(cancel_rx: &mpsc::Receiver<()>) -> bool {
    cancel_rx.try_recv().is_ok()
}

/// Runs the full pipeline on the calling thread. Progress lands as
/// (percent, stage) pairs; the cancel channel is polled between phases and
/// from inside inference.
pub fn convert_audio_to_song(
    decoder: &dyn AudioDecodePort,
    inference: &dyn PitchInferencePort,
    bytes: &[u8],
    options: &AudioConvertOptions,
    cancel_rx: &mpsc::Receiver<()>,
    mut on_progress: impl FnMut(f32, &str),
) -> Result<Song, ConvertError> {
    let capability = inference.capability();
    if !capability.supported {
        return Err(ConvertError::Unsupported(
            capability
                .message
                .unwrap_or_else(|| "pitch inference is not available on this host".into()),
        ));
    }

    on_progress(0.0, "Decoding and resampling audio");
    if cancelled(cancel_rx) {
        return Err(ConvertError::Cancelled);
    }
    let decoded = decoder.decode(bytes).map_err(|e| match e {
        AudioDecodeError::UnsupportedFormat(msg) => ConvertError::Unsupported(msg),
        other => ConvertError::Decode(other.to_string()),
    })?;
    let decoded = if decoded.sample_rate_hz == INFERENCE_SAMPLE_RATE_HZ {
        decoded
    } else {
        decoder.resample(&decoded, INFERENCE_SAMPLE_RATE_HZ)
    };
    let audio_secs = decoded.duration_secs();

    on_progress(20.0, "Loading pitch model");
    if cancelled(cancel_rx) {
        return Err(ConvertError::Cancelled);
    }

    on_progress(30.0, "Analyzing audio");
    let mut cancel_seen = false;
    let mut forward = |fraction: f32| {
        on_progress(30.0 + fraction.clamp(0.0, 1.0) * 40.0, "Analyzing audio");
        if cancelled(cancel_rx) {
            cancel_seen = true;
            return false;
        }
        true
    };
    let activations = inference
        .infer(&decoded.samples, decoded.sample_rate_hz, &mut forward)
        .map_err(|e| match e {
            PitchInferError::Cancelled => ConvertError::Cancelled,
            other => ConvertError::Inference(other.to_string()),
        })?;
    if cancel_seen || cancelled(cancel_rx) {
        return Err(ConvertError::Cancelled);
    }

    on_progress(70.0, "Converting to musical notes");
    let events = inference.extract_notes(&activations, &options.extract_options());

    on_progress(90.0, "Generating notation");
    let song = song_from_note_events(
        &events,
        audio_secs,
        options.clamped().velocity_sensitivity,
    );

    on_progress(100.0, "Complete");
    Ok(song)
}
