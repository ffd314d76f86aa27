use crate::model::{Note, Song, TimeSignature, Track};
use pianola_ports::pitch::RawNoteEvent;
use pianola_ports::types::{Tick, MIDDLE_C};

/// Transcribed songs are laid out against a fixed grid; the source audio
/// carries no tempo of its own.
pub const TRANSCRIBE_TEMPO_BPM: f64 = 120.0;
pub const TRANSCRIBE_TICKS_PER_BEAT: u16 = 480;

const TICKS_PER_SECOND: f64 = TRANSCRIBE_TEMPO_BPM / 60.0 * TRANSCRIBE_TICKS_PER_BEAT as f64;

/// Builds a two-track song from pitch-inference note events, split at
/// middle C into right and left hand.
pub fn song_from_note_events(
    events: &[RawNoteEvent],
    audio_duration_secs: f64,
    velocity_sensitivity: f32,
) -> Song {
    let mut treble: Vec<Note> = Vec::new();
    let mut bass: Vec<Note> = Vec::new();

    for event in events {
        let pitch = event.pitch_midi.round().clamp(0.0, 127.0) as u8;
        let (bucket, prefix, track) = if pitch >= MIDDLE_C {
            (&mut treble, "treble", 0usize)
        } else {
            (&mut bass, "bass", 1usize)
        };
        bucket.push(Note {
            id: format!("{prefix}-{}", bucket.len()),
            pitch,
            start: seconds_to_ticks(event.start_secs),
            duration: seconds_to_ticks(event.duration_secs),
            velocity: amplitude_to_velocity(event.amplitude, velocity_sensitivity),
            track,
        });
    }
    treble.sort_by_key(|n| n.start);
    bass.sort_by_key(|n| n.start);

    Song {
        name: "Converted from Audio".to_string(),
        duration: (audio_duration_secs * TICKS_PER_SECOND).round() as Tick,
        tempo: TRANSCRIBE_TEMPO_BPM,
        time_signature: TimeSignature {
            numerator: 4,
            denominator: 4,
        },
        ticks_per_beat: TRANSCRIBE_TICKS_PER_BEAT,
        tracks: vec![
            Track {
                id: "track-0".to_string(),
                name: "Right Hand (Treble)".to_string(),
                instrument: 0,
                notes: treble,
                muted: false,
                solo: false,
            },
            Track {
                id: "track-1".to_string(),
                name: "Left Hand (Bass)".to_string(),
                instrument: 0,
                notes: bass,
                muted: false,
                solo: false,
            },
        ],
    }
}

pub fn seconds_to_ticks(seconds: f64) -> Tick {
    (seconds * TICKS_PER_SECOND).round() as Tick
}

/// Sensitivity curve from inference amplitude to MIDI velocity. Higher
/// sensitivity lifts quiet notes; the floor of 20 keeps everything audible.
pub fn amplitude_to_velocity(amplitude: f32, sensitivity: f32) -> u8 {
    let adjusted = (amplitude as f64).powf(1.0 / sensitivity as f64);
    let velocity = (20.0 + adjusted * 107.0).round();
    velocity.clamp(0.0, 127.0) as u8
}
