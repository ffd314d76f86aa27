//! Monophonic pitch inference built on the YIN estimator (de Cheveigné &
//! Kawahara 2002). Each analysis window yields at most one activated pitch
//! bin, so chords come out as their strongest voice. The activation
//! matrices use the same 88-bin piano layout the extraction stage expects.

use pianola_ports::pitch::{
    Capability, InferProgress, NoteExtractOptions, PitchActivations, PitchInferError,
    PitchInferencePort, RawNoteEvent,
};

const WINDOW: usize = 2048;
const HOP: usize = 512;
const PITCH_BINS: usize = 88;
const FIRST_PITCH: u8 = 21;

/// Absolute cumulative-mean threshold for the first candidate dip.
const YIN_THRESHOLD: f32 = 0.15;
/// A frame whose best dip is worse than this counts as unvoiced.
const VOICED_CEILING: f32 = 0.5;
const SILENCE_RMS: f32 = 1e-3;
/// Calls into the progress callback are batched to one per this many frames.
const PROGRESS_EVERY: usize = 8;

pub struct YinPitchDetector;

impl YinPitchDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for YinPitchDetector {
    fn default() -> Self {
        Self::new()
    }
}

struct FramePitch {
    bin: usize,
    clarity: f32,
}

fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt()
}

/// One YIN pass over a window: difference function, cumulative mean
/// normalization, absolute threshold, parabolic refinement.
fn detect_pitch(window: &[f32], sample_rate_hz: u32) -> Option<(f32, f32)> {
    let tau_max = window.len() / 2;
    if tau_max < 4 || rms(window) < SILENCE_RMS {
        return None;
    }

    let mut difference = vec![0.0f32; tau_max];
    for tau in 1..tau_max {
        let mut sum = 0.0f32;
        for i in 0..tau_max {
            let delta = window[i] - window[i + tau];
            sum += delta * delta;
        }
        difference[tau] = sum;
    }

    let mut cmnd = vec![1.0f32; tau_max];
    let mut running_sum = 0.0f32;
    for tau in 1..tau_max {
        running_sum += difference[tau];
        cmnd[tau] = if running_sum > 0.0 {
            difference[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }

    let mut tau = match (2..tau_max).find(|&t| cmnd[t] < YIN_THRESHOLD) {
        Some(t) => {
            // Slide down to the bottom of this dip.
            let mut t = t;
            while t + 1 < tau_max && cmnd[t + 1] < cmnd[t] {
                t += 1;
            }
            t
        }
        None => {
            let t = (2..tau_max)
                .min_by(|&a, &b| cmnd[a].total_cmp(&cmnd[b]))
                .unwrap_or(2);
            if cmnd[t] > VOICED_CEILING {
                return None;
            }
            t
        }
    };
    let clarity = (1.0 - cmnd[tau]).clamp(0.0, 1.0);

    // Parabolic interpolation over the dip, skipped at the edges.
    let mut refined = tau as f32;
    if tau > 0 && tau + 1 < tau_max {
        let s0 = cmnd[tau - 1];
        let s1 = cmnd[tau];
        let s2 = cmnd[tau + 1];
        let denom = s0 - 2.0 * s1 + s2;
        if denom.abs() > f32::EPSILON {
            refined += (s0 - s2) / (2.0 * denom);
        }
    }
    if refined <= 0.0 {
        tau = tau.max(1);
        refined = tau as f32;
    }

    Some((sample_rate_hz as f32 / refined, clarity))
}

fn freq_to_bin(freq_hz: f32) -> Option<usize> {
    if freq_hz <= 0.0 {
        return None;
    }
    let midi = 69.0 + 12.0 * (freq_hz / 440.0).log2();
    let rounded = midi.round();
    if rounded < FIRST_PITCH as f32 || rounded >= (FIRST_PITCH as usize + PITCH_BINS) as f32 {
        return None;
    }
    Some(rounded as usize - FIRST_PITCH as usize)
}

fn analyze_frame(window: &[f32], sample_rate_hz: u32) -> Option<FramePitch> {
    let (freq, clarity) = detect_pitch(window, sample_rate_hz)?;
    let bin = freq_to_bin(freq)?;
    Some(FramePitch { bin, clarity })
}

impl PitchInferencePort for YinPitchDetector {
    fn capability(&self) -> Capability {
        Capability::ok()
    }

    fn infer(
        &self,
        samples: &[f32],
        sample_rate_hz: u32,
        on_progress: InferProgress,
    ) -> Result<PitchActivations, PitchInferError> {
        if sample_rate_hz == 0 {
            return Err(PitchInferError::Inference("sample rate is zero".into()));
        }

        let frame_count = if samples.len() >= WINDOW {
            (samples.len() - WINDOW) / HOP + 1
        } else {
            0
        };

        let mut frames = vec![vec![0.0f32; PITCH_BINS]; frame_count];
        for (f, row) in frames.iter_mut().enumerate() {
            if f % PROGRESS_EVERY == 0 && !on_progress(f as f32 / frame_count as f32) {
                return Err(PitchInferError::Cancelled);
            }
            let offset = f * HOP;
            if let Some(pitch) = analyze_frame(&samples[offset..offset + WINDOW], sample_rate_hz)
            {
                row[pitch.bin] = pitch.clarity;
            }
        }

        // Onsets are rising edges of the frame activations; a bin already
        // sounding in the previous frame does not retrigger.
        let mut onsets = vec![vec![0.0f32; PITCH_BINS]; frame_count];
        for f in 0..frame_count {
            for bin in 0..PITCH_BINS {
                let previous = if f == 0 { 0.0 } else { frames[f - 1][bin] };
                if frames[f][bin] > previous + 1e-3 {
                    onsets[f][bin] = frames[f][bin];
                }
            }
        }

        Ok(PitchActivations {
            contours: frames.clone(),
            frames,
            onsets,
            frames_per_second: sample_rate_hz as f64 / HOP as f64,
            first_pitch: FIRST_PITCH,
        })
    }

    fn extract_notes(
        &self,
        activations: &PitchActivations,
        options: &NoteExtractOptions,
    ) -> Vec<RawNoteEvent> {
        let frame_count = activations.frame_count();
        let fps = activations.frames_per_second.max(1.0);
        let mut events = Vec::new();

        for bin in 0..PITCH_BINS {
            let mut f = 0;
            while f < frame_count {
                let onset = activations.onsets[f].get(bin).copied().unwrap_or(0.0);
                let level = activations.frames[f].get(bin).copied().unwrap_or(0.0);
                if onset < options.onset_threshold || level < options.frame_threshold {
                    f += 1;
                    continue;
                }

                let start = f;
                let mut end = f + 1;
                while end < frame_count
                    && activations.frames[end].get(bin).copied().unwrap_or(0.0)
                        >= options.frame_threshold
                {
                    end += 1;
                }
                let length = end - start;
                if length >= options.min_note_frames.max(1) {
                    let amplitude = activations.frames[start..end]
                        .iter()
                        .map(|row| row.get(bin).copied().unwrap_or(0.0))
                        .sum::<f32>()
                        / length as f32;
                    events.push(RawNoteEvent {
                        pitch_midi: (FIRST_PITCH as usize + bin) as f32,
                        start_secs: start as f64 / fps,
                        duration_secs: length as f64 / fps,
                        amplitude,
                    });
                }
                f = end;
            }
        }

        events.sort_by(|a, b| a.start_secs.total_cmp(&b.start_secs));
        events
    }
}
