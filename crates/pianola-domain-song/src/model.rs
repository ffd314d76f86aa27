use pianola_ports::types::Tick;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TEMPO_BPM: f64 = 120.0;
pub const DEFAULT_TICKS_PER_BEAT: u16 = 480;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub pitch: u8,
    pub start: Tick,
    pub duration: Tick,
    pub velocity: u8,
    pub track: usize,
}

impl Note {
    pub fn end(&self) -> Tick {
        self.start + self.duration
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub instrument: u8,
    pub notes: Vec<Note>,
    pub muted: bool,
    pub solo: bool,
}

impl Track {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instrument: 0,
            notes: Vec::new(),
            muted: false,
            solo: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub name: String,
    pub duration: Tick,
    pub tempo: f64,
    pub time_signature: TimeSignature,
    pub ticks_per_beat: u16,
    pub tracks: Vec<Track>,
}

impl Song {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration: 0,
            tempo: DEFAULT_TEMPO_BPM,
            time_signature: TimeSignature::default(),
            ticks_per_beat: DEFAULT_TICKS_PER_BEAT,
            tracks: vec![Track::new("track-0", "Track 1")],
        }
    }

    pub fn ticks_per_measure(&self) -> Tick {
        self.ticks_per_beat as Tick * self.time_signature.numerator as Tick
    }

    /// Largest note end across all tracks, 0 for a song with no notes.
    pub fn max_occupied_tick(&self) -> Tick {
        self.tracks
            .iter()
            .flat_map(|t| t.notes.iter())
            .map(|n| n.end())
            .max()
            .unwrap_or(0)
    }

    pub fn has_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// True when the track at `index` should sound: solo on any track
    /// silences every non-solo track, otherwise only mute silences.
    pub fn track_audible(&self, index: usize) -> bool {
        let Some(track) = self.tracks.get(index) else {
            return false;
        };
        if self.has_solo() {
            track.solo
        } else {
            !track.muted
        }
    }

    pub fn visible_notes(&self) -> Vec<VisibleNote<'_>> {
        let mut out = Vec::new();
        for (index, track) in self.tracks.iter().enumerate() {
            if !self.track_audible(index) {
                continue;
            }
            for note in &track.notes {
                out.push(VisibleNote {
                    track_id: &track.id,
                    note,
                });
            }
        }
        out
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }
}

/// A note paired with the id of the track it belongs to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleNote<'a> {
    pub track_id: &'a str,
    pub note: &'a Note,
}

/// "C4" style spelling for a MIDI pitch; octave numbering puts middle C at 4.
pub fn note_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[pitch as usize % 12], octave)
}

/// Inverse of [`note_name`]. Unparseable spellings map to middle C.
pub fn pitch_from_name(name: &str) -> u8 {
    let mut chars = name.trim().chars();
    let step = match chars.next() {
        Some(c @ 'A'..='G') => c,
        _ => return pianola_ports::types::MIDDLE_C,
    };
    let rest = chars.as_str();
    let (spelling, octave_str) = match rest.strip_prefix('#') {
        Some(tail) => (format!("{step}#"), tail),
        None => (step.to_string(), rest),
    };
    let index = NOTE_NAMES.iter().position(|n| *n == spelling);
    let octave = octave_str.parse::<i32>().ok();
    match (index, octave) {
        (Some(index), Some(octave)) => ((octave + 1) * 12 + index as i32).clamp(0, 127) as u8,
        _ => pianola_ports::types::MIDDLE_C,
    }
}

/// Equal-tempered frequency with A4 = 440 Hz.
pub fn pitch_to_frequency(pitch: u8) -> f64 {
    440.0 * 2f64.powf((pitch as f64 - 69.0) / 12.0)
}
