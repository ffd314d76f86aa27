//! Tick ⇄ wall-time conversions and transport display helpers.

use pianola_ports::clock::ClockPort;
use std::time::Instant;

pub const TEMPO_MIN_BPM: f64 = 40.0;
pub const TEMPO_MAX_BPM: f64 = 240.0;

pub const ZOOM_MIN: f32 = 0.5;
pub const ZOOM_MAX: f32 = 3.0;
pub const ZOOM_STEP: f32 = 0.25;

/// Snap grid denominators offered by the editor, as 1/Nth of a beat.
pub const QUANTIZATION_CHOICES: [u16; 5] = [1, 2, 4, 8, 16];

/// Ticks elapsing per wall-clock second at the given tempo. Zero for
/// degenerate inputs so callers never divide time by silence.
pub fn ticks_per_second(ticks_per_beat: u16, tempo_bpm: f64) -> f64 {
    if tempo_bpm <= 0.0 {
        return 0.0;
    }
    ticks_per_beat as f64 * tempo_bpm / 60.0
}

pub fn ticks_to_secs(ticks: f64, ticks_per_beat: u16, tempo_bpm: f64) -> f64 {
    let tps = ticks_per_second(ticks_per_beat, tempo_bpm);
    if tps <= 0.0 {
        return 0.0;
    }
    ticks / tps
}

pub fn secs_to_ticks(secs: f64, ticks_per_beat: u16, tempo_bpm: f64) -> f64 {
    secs * ticks_per_second(ticks_per_beat, tempo_bpm)
}

pub fn clamp_tempo(bpm: f64) -> f64 {
    bpm.clamp(TEMPO_MIN_BPM, TEMPO_MAX_BPM)
}

pub fn zoom_in(zoom: f32) -> f32 {
    (zoom + ZOOM_STEP).min(ZOOM_MAX)
}

pub fn zoom_out(zoom: f32) -> f32 {
    (zoom - ZOOM_STEP).max(ZOOM_MIN)
}

pub fn is_quantization_choice(quantization: u16) -> bool {
    QUANTIZATION_CHOICES.contains(&quantization)
}

/// "m:ss" playhead readout from a tick position at the current tempo.
pub fn format_position(ticks: f64, ticks_per_beat: u16, tempo_bpm: f64) -> String {
    let total_secs = ticks_to_secs(ticks.max(0.0), ticks_per_beat, tempo_bpm);
    let mins = (total_secs / 60.0).floor() as u64;
    let secs = (total_secs % 60.0).floor() as u64;
    format!("{mins}:{secs:02}")
}

/// Monotonic wall clock for production use; seconds since construction.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for SystemClock {
    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}
