use crate::chords::{detect_chord, ChordSymbol, PITCH_ALTERS, PITCH_STEPS};
use crate::model::{Note, Song};
use pianola_ports::types::{Tick, MIDDLE_C};
use std::collections::HashMap;

/// Standard note values in quarter notes, longest first. Ties during
/// snapping keep the earlier entry.
const QUANTIZE_LADDER: [f64; 9] = [4.0, 3.0, 2.0, 1.5, 1.0, 0.75, 0.5, 0.25, 0.125];

/// Renders a song as a two-staff single-part MusicXML score. Total over
/// any well-formed song; degenerate inputs still produce one rest-filled
/// measure per staff.
pub fn export_musicxml(song: &Song) -> String {
    let divisions = song.ticks_per_beat.max(1) as Tick;
    let ticks_per_measure = divisions * song.time_signature.numerator.max(1) as Tick;
    let (treble, bass) = split_staves(song);

    let last_tick = song
        .tracks
        .iter()
        .flat_map(|t| &t.notes)
        .map(Note::end)
        .fold(ticks_per_measure, Tick::max);
    let measure_count = (last_tick + ticks_per_measure - 1) / ticks_per_measure;

    let mut xml = String::new();
    push_header(&mut xml, song);

    for measure in 0..measure_count {
        let measure_start = measure * ticks_per_measure;
        let measure_end = measure_start + ticks_per_measure;
        let in_measure =
            |n: &&Note| n.start < measure_end && n.end() > measure_start;
        let treble_measure: Vec<&Note> = treble.iter().copied().filter(in_measure).collect();
        let bass_measure: Vec<&Note> = bass.iter().copied().filter(in_measure).collect();

        xml.push_str(&format!("    <measure number=\"{}\">\n", measure + 1));
        if measure == 0 {
            push_first_measure_attributes(&mut xml, song, divisions);
            let chord = detect_chord(
                treble_measure
                    .iter()
                    .chain(bass_measure.iter())
                    .map(|n| n.pitch),
            );
            if let Some(chord) = chord {
                push_harmony(&mut xml, chord);
            }
        }

        push_staff_notes(
            &mut xml,
            &treble_measure,
            measure_start,
            divisions,
            1,
            ticks_per_measure,
        );
        xml.push_str(&format!(
            "      <backup>\n        <duration>{ticks_per_measure}</duration>\n      </backup>\n"
        ));
        push_staff_notes(
            &mut xml,
            &bass_measure,
            measure_start,
            divisions,
            2,
            ticks_per_measure,
        );

        xml.push_str("    </measure>\n");
    }

    xml.push_str("  </part>\n</score-partwise>");
    xml
}

/// Routes notes to the two staves: named treble/bass tracks win, otherwise
/// everything is split by pitch at middle C.
fn split_staves(song: &Song) -> (Vec<&Note>, Vec<&Note>) {
    let is_treble = |name: &str| {
        let name = name.to_lowercase();
        name.contains("treble") || name.contains("right")
    };
    let is_bass = |name: &str| {
        let name = name.to_lowercase();
        name.contains("bass") || name.contains("left")
    };

    let has_treble = song.tracks.iter().any(|t| is_treble(&t.name));
    let has_bass = song.tracks.iter().any(|t| is_bass(&t.name));

    if has_treble && has_bass {
        let treble = song
            .tracks
            .iter()
            .filter(|t| is_treble(&t.name))
            .flat_map(|t| &t.notes)
            .collect();
        let bass = song
            .tracks
            .iter()
            .filter(|t| is_bass(&t.name))
            .flat_map(|t| &t.notes)
            .collect();
        (treble, bass)
    } else {
        let mut all: Vec<&Note> = song.tracks.iter().flat_map(|t| &t.notes).collect();
        all.sort_by_key(|n| n.start);
        let treble = all.iter().copied().filter(|n| n.pitch >= MIDDLE_C).collect();
        let bass = all.into_iter().filter(|n| n.pitch < MIDDLE_C).collect();
        (treble, bass)
    }
}

fn push_header(xml: &mut String, song: &Song) {
    let title = if song.name.is_empty() {
        "Piano Score"
    } else {
        &song.name
    };
    let date = chrono::Utc::now().format("%Y-%m-%d");
    xml.push_str(&format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 3.1 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">
<score-partwise version="3.1">
  <work>
    <work-title>{}</work-title>
  </work>
  <identification>
    <encoding>
      <software>Pianola</software>
      <encoding-date>{date}</encoding-date>
    </encoding>
  </identification>
  <defaults>
    <scaling>
      <millimeters>7</millimeters>
      <tenths>40</tenths>
    </scaling>
    <page-layout>
      <page-height>1545</page-height>
      <page-width>1194</page-width>
      <page-margins type="both">
        <left-margin>70</left-margin>
        <right-margin>70</right-margin>
        <top-margin>70</top-margin>
        <bottom-margin>70</bottom-margin>
      </page-margins>
    </page-layout>
    <system-layout>
      <system-margins>
        <left-margin>0</left-margin>
        <right-margin>0</right-margin>
      </system-margins>
      <system-distance>120</system-distance>
      <top-system-distance>70</top-system-distance>
    </system-layout>
  </defaults>
  <part-list>
    <score-part id="P1">
      <part-name>Piano</part-name>
      <score-instrument id="P1-I1">
        <instrument-name>Acoustic Grand Piano</instrument-name>
      </score-instrument>
      <midi-instrument id="P1-I1">
        <midi-channel>1</midi-channel>
        <midi-program>1</midi-program>
      </midi-instrument>
    </score-part>
  </part-list>
  <part id="P1">
"#,
        escape_xml(title)
    ));
}

fn push_first_measure_attributes(xml: &mut String, song: &Song, divisions: Tick) {
    let tempo = fmt_tempo(song.tempo);
    xml.push_str(&format!(
        r#"      <attributes>
        <divisions>{divisions}</divisions>
        <key>
          <fifths>0</fifths>
        </key>
        <time>
          <beats>{}</beats>
          <beat-type>{}</beat-type>
        </time>
        <staves>2</staves>
        <clef number="1">
          <sign>G</sign>
          <line>2</line>
        </clef>
        <clef number="2">
          <sign>F</sign>
          <line>4</line>
        </clef>
      </attributes>
      <direction placement="above">
        <direction-type>
          <metronome parentheses="no">
            <beat-unit>quarter</beat-unit>
            <per-minute>{tempo}</per-minute>
          </metronome>
        </direction-type>
        <sound tempo="{tempo}"/>
      </direction>
"#,
        song.time_signature.numerator, song.time_signature.denominator
    ));
}

fn push_harmony(xml: &mut String, chord: ChordSymbol) {
    xml.push_str("      <harmony print-frame=\"no\">\n        <root>\n");
    xml.push_str(&format!(
        "          <root-step>{}</root-step>\n",
        chord.root_step
    ));
    if chord.root_alter != 0 {
        xml.push_str(&format!(
            "          <root-alter>{}</root-alter>\n",
            chord.root_alter
        ));
    }
    xml.push_str("        </root>\n");
    if chord.kind != "major" {
        xml.push_str(&format!("        <kind>{}</kind>\n", chord.kind));
    }
    xml.push_str("        <staff>1</staff>\n      </harmony>\n");
}

fn push_staff_notes(
    xml: &mut String,
    notes: &[&Note],
    measure_start: Tick,
    divisions: Tick,
    staff: u8,
    ticks_per_measure: Tick,
) {
    let measure_end = measure_start + ticks_per_measure;
    let mut cursor = measure_start;

    if notes.is_empty() {
        push_rest(xml, ticks_per_measure, divisions, staff);
        return;
    }

    let mut sorted: Vec<&Note> = notes.to_vec();
    sorted.sort_by_key(|n| n.start);

    // chord grouping keyed by the first member's measure-relative start
    let chord_threshold = divisions / 16;
    let mut groups: Vec<(Tick, Vec<&Note>)> = Vec::new();
    for note in sorted {
        let start_in_measure = (note.start - measure_start).max(0);
        match groups
            .iter_mut()
            .find(|(start, _)| (*start - start_in_measure).abs() < chord_threshold)
        {
            Some((_, group)) => group.push(note),
            None => groups.push((start_in_measure, vec![note])),
        }
    }
    groups.sort_by_key(|(start, _)| *start);

    let beam_state = assign_beams(&groups, measure_start, divisions, ticks_per_measure);

    let gap_threshold = divisions / 32;
    for (idx, (start_tick, group)) in groups.iter().enumerate() {
        let absolute_start = measure_start + start_tick;

        if cursor + gap_threshold < absolute_start {
            let rest = quantize_duration((absolute_start - cursor) as f64, divisions);
            push_rest(xml, rest, divisions, staff);
            cursor += rest;
        }

        let avg = average_duration(group, measure_end, divisions);
        let max_duration = measure_end - cursor;
        let quantized = quantize_duration(avg, divisions).min(max_duration);
        let note_type = duration_type(quantized, divisions);

        let mut chord_notes = group.clone();
        chord_notes.sort_by_key(|n| n.pitch);
        for (i, note) in chord_notes.iter().enumerate() {
            push_pitched_note(
                xml,
                note.pitch,
                quantized,
                note_type,
                staff,
                i > 0,
                if i == 0 { beam_state.get(&idx).copied() } else { None },
            );
        }

        cursor += quantized;
    }

    if cursor < measure_end - gap_threshold {
        let rest = quantize_duration((measure_end - cursor) as f64, divisions);
        push_rest(xml, rest, divisions, staff);
    }
}

/// Mean of the group's durations, each clamped to the measure end and
/// floored at an eighth note.
fn average_duration(group: &[&Note], measure_end: Tick, divisions: Tick) -> f64 {
    let min_duration = divisions / 8;
    let sum: Tick = group
        .iter()
        .map(|n| (n.end().min(measure_end) - n.start).max(min_duration))
        .sum();
    sum as f64 / group.len() as f64
}

/// Beam runs over consecutive beamable groups sharing a beat. Runs of one
/// are left unbeamed. The lookahead clamps durations against the group
/// start rather than the emission cursor, so states are decided before any
/// rest padding shifts things.
fn assign_beams(
    groups: &[(Tick, Vec<&Note>)],
    measure_start: Tick,
    divisions: Tick,
    ticks_per_measure: Tick,
) -> HashMap<usize, &'static str> {
    let measure_end = measure_start + ticks_per_measure;
    let mut runs: Vec<Vec<usize>> = Vec::new();
    let mut run: Vec<usize> = Vec::new();
    let mut run_beat: Tick = -1;

    for (idx, (start_tick, group)) in groups.iter().enumerate() {
        let absolute_start = measure_start + start_tick;
        let avg = average_duration(group, measure_end, divisions);
        let max_duration = measure_end - absolute_start;
        let quantized = quantize_duration(avg, divisions).min(max_duration);
        let note_type = duration_type(quantized, divisions);
        let beat = start_tick / divisions;

        if matches!(note_type, "eighth" | "16th" | "32nd") {
            if run_beat != beat {
                if !run.is_empty() {
                    runs.push(std::mem::take(&mut run));
                }
                run.push(idx);
                run_beat = beat;
            } else {
                run.push(idx);
            }
        } else if !run.is_empty() {
            runs.push(std::mem::take(&mut run));
            run_beat = -1;
        }
    }
    if !run.is_empty() {
        runs.push(run);
    }

    let mut states = HashMap::new();
    for run in runs.iter().filter(|r| r.len() > 1) {
        for (pos, &idx) in run.iter().enumerate() {
            let state = if pos == 0 {
                "begin"
            } else if pos == run.len() - 1 {
                "end"
            } else {
                "continue"
            };
            states.insert(idx, state);
        }
    }
    states
}

fn push_rest(xml: &mut String, duration: Tick, divisions: Tick, staff: u8) {
    xml.push_str(&format!(
        "      <note>\n        <rest/>\n        <duration>{duration}</duration>\n        <voice>1</voice>\n        <type>{}</type>\n        <staff>{staff}</staff>\n      </note>\n",
        duration_type(duration, divisions)
    ));
}

fn push_pitched_note(
    xml: &mut String,
    pitch: u8,
    duration: Tick,
    note_type: &str,
    staff: u8,
    in_chord: bool,
    beam: Option<&'static str>,
) {
    let step = PITCH_STEPS[pitch as usize % 12];
    let alter = PITCH_ALTERS[pitch as usize % 12];
    let octave = pitch as i32 / 12 - 1;

    xml.push_str("      <note>\n");
    if in_chord {
        xml.push_str("        <chord/>\n");
    }
    xml.push_str(&format!("        <pitch>\n          <step>{step}</step>\n"));
    if alter != 0 {
        xml.push_str(&format!("          <alter>{alter}</alter>\n"));
    }
    xml.push_str(&format!(
        "          <octave>{octave}</octave>\n        </pitch>\n        <duration>{duration}</duration>\n        <voice>1</voice>\n        <type>{note_type}</type>\n"
    ));
    if alter != 0 {
        let accidental = if alter > 0 { "sharp" } else { "flat" };
        xml.push_str(&format!("        <accidental>{accidental}</accidental>\n"));
    }
    if let Some(state) = beam {
        xml.push_str(&format!("        <beam number=\"1\">{state}</beam>\n"));
    }
    xml.push_str(&format!("        <staff>{staff}</staff>\n      </note>\n"));
}

/// Snaps a tick duration to the nearest ladder value, returned in ticks.
fn quantize_duration(duration: f64, divisions: Tick) -> Tick {
    let quarters = duration / divisions as f64;
    let mut closest = QUANTIZE_LADDER[0];
    let mut min_diff = (quarters - closest).abs();
    for &value in &QUANTIZE_LADDER[1..] {
        let diff = (quarters - value).abs();
        if diff < min_diff {
            min_diff = diff;
            closest = value;
        }
    }
    (closest * divisions as f64).round() as Tick
}

/// Nearest simple type for the tag, dots disregarded.
fn duration_type(duration: Tick, divisions: Tick) -> &'static str {
    let quarters = duration as f64 / divisions as f64;
    if quarters >= 3.5 {
        "whole"
    } else if quarters >= 1.75 {
        "half"
    } else if quarters >= 0.875 {
        "quarter"
    } else if quarters >= 0.4375 {
        "eighth"
    } else if quarters >= 0.21875 {
        "16th"
    } else {
        "32nd"
    }
}

fn fmt_tempo(tempo: f64) -> String {
    if tempo.fract() == 0.0 {
        format!("{}", tempo as i64)
    } else {
        tempo.to_string()
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_snaps_to_nearest_and_ties_keep_longer() {
        assert_eq!(quantize_duration(480.0, 480), 480);
        assert_eq!(quantize_duration(500.0, 480), 480);
        // halfway between dotted quarter and quarter keeps the dotted quarter
        assert_eq!(quantize_duration(600.0, 480), 720);
        // halfway between dotted half and whole keeps the whole
        assert_eq!(quantize_duration(1680.0, 480), 1920);
        assert_eq!(quantize_duration(30.0, 480), 60);
    }

    #[test]
    fn simple_types_by_threshold() {
        assert_eq!(duration_type(1920, 480), "whole");
        assert_eq!(duration_type(1440, 480), "half");
        assert_eq!(duration_type(480, 480), "quarter");
        assert_eq!(duration_type(240, 480), "eighth");
        assert_eq!(duration_type(120, 480), "16th");
        assert_eq!(duration_type(60, 480), "32nd");
        assert_eq!(duration_type(0, 480), "32nd");
    }

    #[test]
    fn escaping() {
        assert_eq!(escape_xml("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
