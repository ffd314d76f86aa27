//! Diagnostics snapshots: a handful of plain JSON files that a bug report
//! can carry without the embedder attaching a debugger.

use std::fs;
use std::path::Path;

use pianola_ports::storage::{SettingsDto, StorageError};
use pianola_ports::types::Tick;
use serde::Serialize;

use crate::editor::EditorState;
use crate::scheduler::PlaybackPhase;

#[derive(Serialize)]
struct BuildInfo {
    name: &'static str,
    version: &'static str,
    os: &'static str,
    arch: &'static str,
}

#[derive(Serialize)]
struct SessionStats {
    song_name: Option<String>,
    track_count: usize,
    note_count: usize,
    max_occupied_tick: Tick,
    tempo_bpm: Option<f64>,
    selection_size: usize,
    history_depth: usize,
    history_index: isize,
    playback_phase: PlaybackPhase,
    position_ticks: f64,
}

/// Writes `build.json`, `settings.json` and `session.json` under `dir`,
/// creating it if needed.
pub fn write_snapshot(
    dir: &Path,
    state: &EditorState,
    phase: PlaybackPhase,
    settings: &SettingsDto,
) -> Result<(), StorageError> {
    fs::create_dir_all(dir).map_err(|e| StorageError::Io(e.to_string()))?;
    write_json(
        &dir.join("build.json"),
        &BuildInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
        },
    )?;
    write_json(&dir.join("settings.json"), settings)?;
    let song = state.song.as_ref();
    write_json(
        &dir.join("session.json"),
        &SessionStats {
            song_name: song.map(|s| s.name.clone()),
            track_count: song.map(|s| s.tracks.len()).unwrap_or(0),
            note_count: song
                .map(|s| s.tracks.iter().map(|t| t.notes.len()).sum())
                .unwrap_or(0),
            max_occupied_tick: song.map(|s| s.max_occupied_tick()).unwrap_or(0),
            tempo_bpm: song.map(|s| s.tempo),
            selection_size: state.selected.len(),
            history_depth: state.history.len(),
            history_index: state.history_index,
            playback_phase: phase,
            position_ticks: state.position,
        },
    )
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
    fs::write(path, text).map_err(|e| StorageError::Io(e.to_string()))
}
