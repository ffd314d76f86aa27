//! Playback engine: drives the scheduling cursor from the injected clock
//! and forwards tone effects to the tone port. Every exit path that ends a
//! run, including drop, emits all-tones-off exactly where the run ends.

use std::sync::Arc;

use pianola_domain_song::model::Song;
use pianola_ports::clock::ClockPort;
use pianola_ports::tone::{ToneEvent, TonePort};

use crate::scheduler::{
    PlaybackCursor, PlaybackPhase, SchedulePass, PREVIEW_DURATION_SECS, PREVIEW_VELOCITY,
};

/// Transport readout after one engine tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransportSnapshot {
    pub position: f64,
    pub playing: bool,
    /// True on the tick that hit the end bound.
    pub finished: bool,
}

pub struct PlaybackEngine {
    clock: Arc<dyn ClockPort>,
    tone: Arc<dyn TonePort>,
    cursor: PlaybackCursor,
}

impl PlaybackEngine {
    pub fn new(clock: Arc<dyn ClockPort>, tone: Arc<dyn TonePort>) -> Self {
        Self {
            clock,
            tone,
            cursor: PlaybackCursor::new(),
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.cursor.phase()
    }

    pub fn is_playing(&self) -> bool {
        self.cursor.phase() == PlaybackPhase::Playing
    }

    pub fn position(&self) -> f64 {
        self.cursor.position()
    }

    pub fn play_from(&mut self, tick: f64) {
        self.cursor.begin(tick.max(0.0), self.clock.now_secs());
    }

    /// Freezes the playhead; sounding tones ring out on their own.
    pub fn pause(&mut self) {
        self.cursor.pause();
    }

    pub fn stop(&mut self) {
        self.cursor.stop();
        self.tone.all_off();
    }

    /// Stop plus reposition; resumes from the new tick when a run was live.
    pub fn seek(&mut self, tick: f64) {
        let was_playing = self.is_playing();
        self.stop();
        self.cursor.park(tick);
        if was_playing {
            self.play_from(tick);
        }
    }

    /// Fires a short tone right now, off the document path entirely.
    pub fn preview(&self, pitch: u8) {
        self.tone.start_tone(&ToneEvent {
            note_id: format!("preview-{pitch}"),
            pitch,
            velocity: PREVIEW_VELOCITY,
            at_secs: self.clock.now_secs(),
            duration_secs: PREVIEW_DURATION_SECS,
        });
    }

    /// One cooperative poll: schedules the look-ahead window and reports
    /// where the playhead landed.
    pub fn tick(&mut self, song: &Song) -> TransportSnapshot {
        let pass: SchedulePass = self.cursor.advance(song, self.clock.now_secs());
        for tone in &pass.tones {
            self.tone.start_tone(tone);
        }
        if pass.finished {
            self.tone.all_off();
        }
        TransportSnapshot {
            position: self.cursor.position(),
            playing: self.is_playing(),
            finished: pass.finished,
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.tone.all_off();
    }
}
