//! Pure look-ahead scheduling. One advance per poll turns the wall clock
//! into tone effects pinned to absolute timestamps, so audio precision
//! never depends on poll cadence.

use pianola_domain_song::model::Song;
use pianola_ports::tone::ToneEvent;
use pianola_ports::types::Tick;
use serde::Serialize;
use std::collections::HashSet;

use crate::transport::ticks_per_second;

/// How far past the playhead each advance schedules tones.
pub const LOOKAHEAD_SECS: f64 = 0.1;
pub const PREVIEW_VELOCITY: u8 = 100;
pub const PREVIEW_DURATION_SECS: f64 = 0.3;
/// A song never runs shorter than four beats, even when empty.
pub const MIN_PLAY_BEATS: Tick = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    Stopped,
    Playing,
    Paused,
}

/// Tick reached when playback stops on its own.
pub fn end_bound(song: &Song) -> Tick {
    song.max_occupied_tick()
        .max(song.ticks_per_beat as Tick * MIN_PLAY_BEATS)
}

/// Effects produced by one scheduling advance.
#[derive(Debug, Default)]
pub struct SchedulePass {
    pub tones: Vec<ToneEvent>,
    /// End bound reached; the cursor has already stopped itself and the
    /// caller owes the all-tones-off effect.
    pub finished: bool,
}

/// Transport cursor: anchor wall time plus anchor tick define the playhead,
/// and a per-run set keeps every note from being scheduled twice.
#[derive(Clone, Debug)]
pub struct PlaybackCursor {
    phase: PlaybackPhase,
    anchor_secs: f64,
    anchor_tick: f64,
    position: f64,
    scheduled: HashSet<String>,
}

impl Default for PlaybackCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self {
            phase: PlaybackPhase::Stopped,
            anchor_secs: 0.0,
            anchor_tick: 0.0,
            position: 0.0,
            scheduled: HashSet::new(),
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Starts (or resumes) playing from `from_tick`, anchored at `now_secs`.
    pub fn begin(&mut self, from_tick: f64, now_secs: f64) {
        self.phase = PlaybackPhase::Playing;
        self.anchor_secs = now_secs;
        self.anchor_tick = from_tick;
        self.position = from_tick;
        self.scheduled.clear();
    }

    /// Freezes the playhead where it is. Sounding tones are not touched.
    pub fn pause(&mut self) {
        if self.phase == PlaybackPhase::Playing {
            self.phase = PlaybackPhase::Paused;
        }
    }

    pub fn stop(&mut self) {
        self.phase = PlaybackPhase::Stopped;
        self.position = 0.0;
        self.scheduled.clear();
    }

    /// Moves the playhead without starting playback.
    pub fn park(&mut self, tick: f64) {
        self.position = tick.max(0.0);
    }

    /// Advances the playhead to `now_secs` and schedules every audible note
    /// whose start falls inside the look-ahead window. Self-stops at the
    /// end bound.
    pub fn advance(&mut self, song: &Song, now_secs: f64) -> SchedulePass {
        let mut pass = SchedulePass::default();
        if self.phase != PlaybackPhase::Playing {
            return pass;
        }
        let tps = ticks_per_second(song.ticks_per_beat, song.tempo);
        if tps <= 0.0 {
            return pass;
        }
        let current = self.anchor_tick + (now_secs - self.anchor_secs) * tps;
        if current >= end_bound(song) as f64 {
            self.stop();
            pass.finished = true;
            return pass;
        }
        self.position = current;
        let horizon = current + LOOKAHEAD_SECS * tps;
        for visible in song.visible_notes() {
            let note = visible.note;
            let start = note.start as f64;
            if start >= current && start < horizon && !self.scheduled.contains(&note.id) {
                self.scheduled.insert(note.id.clone());
                pass.tones.push(ToneEvent {
                    note_id: note.id.clone(),
                    pitch: note.pitch,
                    velocity: note.velocity,
                    at_secs: now_secs + (start - current) / tps,
                    duration_secs: note.duration as f64 / tps,
                });
            }
        }
        pass
    }
}
