use crate::model::{Note, Song, TimeSignature, Track, DEFAULT_TEMPO_BPM};
use pianola_ports::types::Tick;
use roxmltree::Document;
use std::io::Read;
use std::path::Path;

/// Velocity assigned to every imported note; MusicXML does not carry one.
pub const IMPORT_VELOCITY: u8 = 80;

#[derive(thiserror::Error, Debug)]
pub enum MusicXmlImportError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unsupported feature: {0}")]
    Unsupported(String),
}

pub fn import_musicxml_path(path: &Path) -> Result<Song, MusicXmlImportError> {
    let xml = read_musicxml_file(path)?;
    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Untitled");
    import_musicxml_named(&xml, fallback)
}

pub fn import_musicxml_str(xml: &str) -> Result<Song, MusicXmlImportError> {
    import_musicxml_named(xml, "Untitled")
}

fn import_musicxml_named(xml: &str, fallback_name: &str) -> Result<Song, MusicXmlImportError> {
    let doc = Document::parse(xml).map_err(|e| MusicXmlImportError::Parse(e.to_string()))?;

    let title = first_text(&doc, "work-title").unwrap_or_else(|| fallback_name.to_string());
    let divisions = first_text(&doc, "divisions")
        .and_then(|t| t.trim().parse::<i64>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(480);
    let tempo = parse_tempo(&doc);
    let time_signature = parse_time_signature(&doc);

    let mut treble: Vec<Note> = Vec::new();
    let mut bass: Vec<Note> = Vec::new();

    for part in doc.descendants().filter(|node| node.has_tag_name("part")) {
        let mut cursor: Tick = 0;
        let mut last_note_start: Option<Tick> = None;

        for measure in part
            .children()
            .filter(|node| node.is_element() && node.has_tag_name("measure"))
        {
            for element in measure.children().filter(|node| node.is_element()) {
                if element.has_tag_name("backup") {
                    let duration = element_duration(&element);
                    cursor = (cursor - duration).max(0);
                    last_note_start = None;
                } else if element.has_tag_name("forward") {
                    let duration = element_duration(&element);
                    cursor += duration;
                    last_note_start = None;
                } else if element.has_tag_name("note") {
                    let is_chord = element.children().any(|n| n.has_tag_name("chord"));
                    let is_rest = element.children().any(|n| n.has_tag_name("rest"));
                    let is_grace = element.children().any(|n| n.has_tag_name("grace"));
                    if is_grace {
                        continue;
                    }

                    let duration = element_duration(&element);
                    if is_rest {
                        last_note_start = None;
                        cursor += duration;
                        continue;
                    }
                    // An unpitched non-rest note neither sounds nor
                    // advances time.
                    let Some(pitch) = parse_pitch(&element) else {
                        continue;
                    };

                    let start = if is_chord {
                        last_note_start.unwrap_or(cursor)
                    } else {
                        cursor
                    };
                    if duration > 0 {
                        push_note(&mut treble, &mut bass, &element, pitch, start, duration);
                    }
                    if !is_chord {
                        last_note_start = Some(start);
                        cursor += duration;
                    }
                }
            }
        }
    }

    let tracks = vec![
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
    ];

    let mut song = Song {
        name: title,
        duration: 0,
        tempo,
        time_signature,
        ticks_per_beat: divisions.clamp(1, u16::MAX as i64) as u16,
        tracks,
    };
    song.duration = song.max_occupied_tick();
    Ok(song)
}

fn push_note(
    treble: &mut Vec<Note>,
    bass: &mut Vec<Note>,
    element: &roxmltree::Node,
    pitch: u8,
    start: Tick,
    duration: Tick,
) {
    let staff = element
        .children()
        .find(|n| n.has_tag_name("staff"))
        .and_then(|n| n.text())
        .and_then(|t| t.trim().parse::<u8>().ok())
        .unwrap_or(1);
    // staves beyond the usual two have no home in a two-track song
    let (bucket, track) = match staff {
        1 => (treble, 0usize),
        2 => (bass, 1usize),
        _ => return,
    };
    bucket.push(Note {
        id: format!("note-{track}-{}", bucket.len()),
        pitch,
        start,
        duration,
        velocity: IMPORT_VELOCITY,
        track,
    });
}

fn element_duration(node: &roxmltree::Node) -> Tick {
    node.children()
        .find(|child| child.has_tag_name("duration"))
        .and_then(|child| child.text())
        .and_then(|text| text.trim().parse::<Tick>().ok())
        .unwrap_or(0)
        .max(0)
}

fn parse_pitch(node: &roxmltree::Node) -> Option<u8> {
    let pitch = node.children().find(|child| child.has_tag_name("pitch"))?;
    let step = pitch
        .children()
        .find(|child| child.has_tag_name("step"))
        .and_then(|child| child.text())?;
    let octave = pitch
        .children()
        .find(|child| child.has_tag_name("octave"))
        .and_then(|child| child.text())
        .and_then(|text| text.trim().parse::<i32>().ok())?;
    let alter = pitch
        .children()
        .find(|child| child.has_tag_name("alter"))
        .and_then(|child| child.text())
        .and_then(|text| text.trim().parse::<i32>().ok())
        .unwrap_or(0);

    let base = match step.trim() {
        "C" => 0,
        "D" => 2,
        "E" => 4,
        "F" => 5,
        "G" => 7,
        "A" => 9,
        "B" => 11,
        _ => return None,
    };

    let midi_note = (octave + 1) * 12 + base + alter;
    if !(0..=127).contains(&midi_note) {
        return None;
    }
    Some(midi_note as u8)
}

fn parse_tempo(doc: &Document) -> f64 {
    let sound_tempo = doc
        .descendants()
        .filter(|node| node.has_tag_name("sound"))
        .find_map(|node| node.attribute("tempo"))
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|bpm| *bpm > 0.0);
    if let Some(bpm) = sound_tempo {
        return bpm;
    }
    doc.descendants()
        .filter(|node| node.has_tag_name("per-minute"))
        .find_map(|node| node.text())
        .and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|bpm| *bpm > 0.0)
        .unwrap_or(DEFAULT_TEMPO_BPM)
}

fn parse_time_signature(doc: &Document) -> TimeSignature {
    let time = doc.descendants().find(|node| node.has_tag_name("time"));
    let Some(time) = time else {
        return TimeSignature::default();
    };
    let beats = time
        .children()
        .find(|node| node.has_tag_name("beats"))
        .and_then(|node| node.text())
        .and_then(|text| text.trim().parse::<u8>().ok())
        .filter(|b| *b > 0);
    let beat_type = time
        .children()
        .find(|node| node.has_tag_name("beat-type"))
        .and_then(|node| node.text())
        .and_then(|text| text.trim().parse::<u8>().ok())
        .filter(|b| *b > 0);
    match (beats, beat_type) {
        (Some(numerator), Some(denominator)) => TimeSignature {
            numerator,
            denominator,
        },
        _ => TimeSignature::default(),
    }
}

fn first_text(doc: &Document, tag: &str) -> Option<String> {
    doc.descendants()
        .find(|node| node.has_tag_name(tag))
        .and_then(|node| node.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn read_musicxml_file(path: &Path) -> Result<String, MusicXmlImportError> {
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    if ext.eq_ignore_ascii_case("mxl") {
        return read_mxl_archive(path);
    }
    std::fs::read_to_string(path).map_err(|e| MusicXmlImportError::Io(e.to_string()))
}

fn read_mxl_archive(path: &Path) -> Result<String, MusicXmlImportError> {
    let data = std::fs::read(path).map_err(|e| MusicXmlImportError::Io(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data))
        .map_err(|e| MusicXmlImportError::Parse(e.to_string()))?;

    let container_xml = if let Ok(mut container) = archive.by_name("META-INF/container.xml") {
        let mut xml = String::new();
        container
            .read_to_string(&mut xml)
            .map_err(|e| MusicXmlImportError::Io(e.to_string()))?;
        Some(xml)
    } else {
        None
    };

    if let Some(container_xml) = container_xml {
        if let Ok(doc) = Document::parse(&container_xml) {
            if let Some(full_path) = doc
                .descendants()
                .find(|node| node.has_tag_name("rootfile"))
                .and_then(|node| node.attribute("full-path"))
            {
                if let Ok(mut rootfile) = archive.by_name(full_path) {
                    let mut xml = String::new();
                    rootfile
                        .read_to_string(&mut xml)
                        .map_err(|e| MusicXmlImportError::Io(e.to_string()))?;
                    return Ok(xml);
                }
            }
        }
    }

    for idx in 0..archive.len() {
        let mut file = archive
            .by_index(idx)
            .map_err(|e| MusicXmlImportError::Parse(e.to_string()))?;
        let name = file.name().to_string();
        if (name.ends_with(".xml") || name.ends_with(".musicxml")) && !name.starts_with("META-INF/")
        {
            let mut xml = String::new();
            file.read_to_string(&mut xml)
                .map_err(|e| MusicXmlImportError::Io(e.to_string()))?;
            return Ok(xml);
        }
    }

    Err(MusicXmlImportError::Unsupported(
        "mxl archive missing MusicXML payload".to_string(),
    ))
}
