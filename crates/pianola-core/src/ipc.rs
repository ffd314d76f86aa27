//! Command and event shapes exchanged with the embedding shell. Tagged
//! serde enums so any JSON-speaking host can drive the core.

use pianola_domain_song::model::Song;
use pianola_ports::storage::SettingsDto;
use serde::{Deserialize, Serialize};

use crate::convert::AudioConvertOptions;
use crate::editor::EditAction;

/// Everything the embedder can ask the core to do.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Command {
    /// Start over with an empty one-track song.
    NewSong { name: String },
    /// Load a `.mid`/`.midi`/`.xml`/`.musicxml`/`.mxl` file by extension.
    LoadFile { path: String },
    /// Dispatch one editor action through the reducer.
    Edit { action: EditAction },
    Play { from_tick: Option<f64> },
    Pause,
    Stop,
    Seek { tick: f64 },
    PreviewPitch { pitch: u8 },
    ExportMidi { path: String },
    ExportMusicXml { path: String },
    ExportPdf { path: String },
    /// Start the audio-to-song conversion job for a `.wav`/`.mp3` file.
    ConvertAudioFile { path: String },
    CancelConversion,
    SetAudioOptions { options: AudioConvertOptions },
    /// Write diagnostics JSON snapshots into a directory.
    ExportDiagnostics { dir: String },
}

/// Everything the core reports back; drained by the embedder after each
/// command or tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// The document or its history moved; `song` is the full new state.
    DocumentChanged {
        song: Option<Song>,
        can_undo: bool,
        can_redo: bool,
    },
    SelectionChanged {
        selected: Vec<String>,
    },
    /// Playhead readout, throttled while playing.
    TransportUpdated {
        position: f64,
        playing: bool,
    },
    SettingsUpdated {
        settings: SettingsDto,
    },
    ConversionProgress {
        percent: f32,
        stage: String,
    },
    ConversionFinished {
        ok: bool,
        message: String,
    },
    Exported {
        kind: String,
        path: String,
    },
    Diagnostics {
        severity: String,
        message: String,
    },
}
