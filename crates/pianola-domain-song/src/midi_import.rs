use crate::model::{Note, Song, TimeSignature, Track, DEFAULT_TEMPO_BPM};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use pianola_ports::types::Tick;
use std::collections::HashMap;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum MidiImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
}

pub fn import_midi_path(path: &Path) -> Result<Song, MidiImportError> {
    let data = std::fs::read(path).map_err(|e| MidiImportError::Io(e.to_string()))?;
    let mut song = import_midi_bytes(&data)?;
    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        song.name = stem.to_string();
    }
    Ok(song)
}

pub fn import_midi_bytes(data: &[u8]) -> Result<Song, MidiImportError> {
    let smf = Smf::parse(data).map_err(|e| MidiImportError::Parse(e.to_string()))?;
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(..) => {
            return Err(MidiImportError::Parse(
                "timecode timing is not supported".to_string(),
            ))
        }
    };

    let mut tempo_us: Option<u32> = None;
    let mut time_signature: Option<TimeSignature> = None;
    let mut tracks: Vec<Track> = Vec::new();

    for smf_track in &smf.tracks {
        let mut tick: Tick = 0;
        let mut name: Option<String> = None;
        let mut instrument: Option<u8> = None;
        // per key, onsets still waiting for their note-off, oldest first
        let mut open: HashMap<u8, Vec<(Tick, u8)>> = HashMap::new();
        let mut spans: Vec<(Tick, Tick, u8, u8)> = Vec::new();

        for event in smf_track {
            tick += event.delta.as_int() as Tick;
            match &event.kind {
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { key, vel } => {
                        let note = key.as_int();
                        let velocity = vel.as_int();
                        if velocity == 0 {
                            close_note(&mut open, &mut spans, note, tick);
                        } else {
                            open.entry(note).or_default().push((tick, velocity));
                        }
                    }
                    MidiMessage::NoteOff { key, .. } => {
                        close_note(&mut open, &mut spans, key.as_int(), tick);
                    }
                    MidiMessage::ProgramChange { program } => {
                        if instrument.is_none() {
                            instrument = Some(program.as_int());
                        }
                    }
                    _ => {}
                },
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    if tempo_us.is_none() {
                        tempo_us = Some(us_per_quarter.as_int().max(1));
                    }
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, denom_log2, _, _)) => {
                    if time_signature.is_none() {
                        time_signature = Some(TimeSignature {
                            numerator: (*num).max(1),
                            denominator: 1u8.checked_shl(*denom_log2 as u32).unwrap_or(4),
                        });
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                    if name.is_none() {
                        let text = String::from_utf8_lossy(bytes).trim().to_string();
                        if !text.is_empty() {
                            name = Some(text);
                        }
                    }
                }
                _ => {}
            }
        }

        // onsets never closed get cut off at the track's end
        let mut leftovers: Vec<(u8, Tick, u8)> = open
            .into_iter()
            .flat_map(|(note, starts)| {
                starts.into_iter().map(move |(start, vel)| (note, start, vel))
            })
            .collect();
        leftovers.sort_by_key(|(note, start, _)| (*start, *note));
        for (note, start, vel) in leftovers {
            spans.push((start, (tick - start).max(1), note, vel));
        }

        if spans.is_empty() {
            continue;
        }
        spans.sort_by_key(|(start, _, pitch, _)| (*start, *pitch));

        let index = tracks.len();
        let notes = spans
            .into_iter()
            .enumerate()
            .map(|(n, (start, duration, pitch, velocity))| Note {
                id: format!("note-{index}-{n}"),
                pitch,
                start,
                duration,
                velocity,
                track: index,
            })
            .collect();
        tracks.push(Track {
            id: format!("track-{index}"),
            name: name.unwrap_or_else(|| format!("Track {}", index + 1)),
            instrument: instrument.unwrap_or(0),
            notes,
            muted: false,
            solo: false,
        });
    }

    let tempo = match tempo_us {
        Some(us) => 60_000_000.0 / us as f64,
        None => DEFAULT_TEMPO_BPM,
    };
    let mut song = Song {
        name: "Untitled".to_string(),
        duration: 0,
        tempo,
        time_signature: time_signature.unwrap_or_default(),
        ticks_per_beat,
        tracks,
    };
    song.duration = song.max_occupied_tick();
    Ok(song)
}

fn close_note(
    open: &mut HashMap<u8, Vec<(Tick, u8)>>,
    spans: &mut Vec<(Tick, Tick, u8, u8)>,
    note: u8,
    tick: Tick,
) {
    let Some(starts) = open.get_mut(&note) else {
        return;
    };
    if starts.is_empty() {
        return;
    }
    let (start, velocity) = starts.remove(0);
    spans.push((start, (tick - start).max(1), note, velocity));
}
