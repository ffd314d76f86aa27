pub type Tick = i64; // musical time, monotonic in a song

/// Middle C in MIDI numbering; the treble/bass split point.
pub const MIDDLE_C: u8 = 60;
