use crate::model::{Song, Track};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use pianola_ports::types::Tick;
use std::path::Path;

/// Exported files always declare this resolution; tick values pass through
/// unchanged, so callers should keep songs at the same resolution.
pub const EXPORT_TICKS_PER_BEAT: u16 = 480;

#[derive(thiserror::Error, Debug)]
pub enum MidiExportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("encode error: {0}")]
    Encode(String),
}

pub fn export_midi_path(song: &Song, path: &Path) -> Result<(), MidiExportError> {
    let data = export_midi_bytes(song)?;
    std::fs::write(path, data).map_err(|e| MidiExportError::Io(e.to_string()))
}

pub fn export_midi_bytes(song: &Song) -> Result<Vec<u8>, MidiExportError> {
    let mut smf_tracks = Vec::new();
    for (index, track) in song.tracks.iter().enumerate() {
        smf_tracks.push(encode_track(song, index, track));
    }
    if smf_tracks.is_empty() {
        smf_tracks.push(encode_conductor_only(song));
    }

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(u15::new(EXPORT_TICKS_PER_BEAT)),
        },
        tracks: smf_tracks,
    };

    let mut data = Vec::new();
    smf.write(&mut data)
        .map_err(|e| MidiExportError::Encode(e.to_string()))?;
    Ok(data)
}

struct MidiEvent<'a> {
    tick: Tick,
    kind: TrackEventKind<'a>,
}

fn encode_track<'a>(song: &'a Song, index: usize, track: &'a Track) -> Vec<TrackEvent<'a>> {
    let channel = u4::new((index % 16) as u8);
    let mut events: Vec<MidiEvent<'a>> = Vec::new();

    if index == 0 {
        push_conductor_events(song, &mut events);
    }
    if !track.name.is_empty() {
        events.push(MidiEvent {
            tick: 0,
            kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
        });
    }
    events.push(MidiEvent {
        tick: 0,
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(track.instrument.min(127)),
            },
        },
    });

    for note in &track.notes {
        let key = u7::new(note.pitch.min(127));
        events.push(MidiEvent {
            tick: note.start.max(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    vel: u7::new(note.velocity.clamp(1, 127)),
                },
            },
        });
        events.push(MidiEvent {
            tick: note.end().max(note.start.max(0)),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: u7::new(64),
                },
            },
        });
    }

    finish_track(events)
}

fn encode_conductor_only(song: &Song) -> Vec<TrackEvent<'_>> {
    let mut events = Vec::new();
    push_conductor_events(song, &mut events);
    finish_track(events)
}

fn push_conductor_events<'a>(song: &Song, events: &mut Vec<MidiEvent<'a>>) {
    let us_per_quarter = if song.tempo > 0.0 {
        (60_000_000.0 / song.tempo).round() as u32
    } else {
        500_000
    };
    events.push(MidiEvent {
        tick: 0,
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(
            us_per_quarter.clamp(1, 0x00FF_FFFF),
        ))),
    });
    events.push(MidiEvent {
        tick: 0,
        kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
            song.time_signature.numerator.max(1),
            denominator_log2(song.time_signature.denominator),
            24,
            8,
        )),
    });
}

fn finish_track(mut events: Vec<MidiEvent<'_>>) -> Vec<TrackEvent<'_>> {
    events.sort_by(|a, b| {
        a.tick
            .cmp(&b.tick)
            .then_with(|| track_event_rank(&a.kind).cmp(&track_event_rank(&b.kind)))
    });

    let mut track_events = Vec::with_capacity(events.len() + 1);
    let mut last_tick: Tick = 0;
    for event in events {
        let delta = (event.tick - last_tick).max(0) as u32;
        last_tick = event.tick.max(last_tick);
        track_events.push(TrackEvent {
            delta: u28::new(delta),
            kind: event.kind,
        });
    }
    track_events.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track_events
}

fn track_event_rank(kind: &TrackEventKind<'_>) -> (u8, u8, u8) {
    match kind {
        TrackEventKind::Meta(MetaMessage::Tempo(_)) => (0, 0, 0),
        TrackEventKind::Meta(_) => (0, 1, 0),
        TrackEventKind::Midi { message, .. } => match message {
            MidiMessage::ProgramChange { .. } => (1, 0, 0),
            MidiMessage::NoteOff { key, .. } => (1, 1, key.as_int()),
            MidiMessage::NoteOn { key, vel } => {
                if vel.as_int() == 0 {
                    (1, 1, key.as_int())
                } else {
                    (1, 2, key.as_int())
                }
            }
            _ => (1, 3, 0),
        },
        _ => (2, 0, 0),
    }
}

fn denominator_log2(denominator: u8) -> u8 {
    match denominator {
        0 => 2,
        d if d.is_power_of_two() => d.trailing_zeros() as u8,
        d => (d as f64).log2().round() as u8,
    }
}
