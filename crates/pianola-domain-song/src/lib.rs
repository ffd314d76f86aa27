pub mod audio_import;
pub mod chords;
pub mod midi_export;
pub mod midi_import;
pub mod model;
pub mod musicxml_export;
pub mod musicxml_import;

pub use audio_import::*;
pub use chords::*;
pub use midi_export::*;
pub use midi_import::*;
pub use model::*;
pub use musicxml_export::*;
pub use musicxml_import::*;
