//! Editor state and the action reducer that owns every mutation of it.
//!
//! All edits funnel through [`EditorState::reduce`]: a closed action enum,
//! one exhaustive match, and a snapshot-before-mutate history with a hard
//! cap. Nothing else in the crate writes to the document.

use pianola_domain_song::model::{Note, Song};
use pianola_ports::types::Tick;
use serde::{Deserialize, Serialize};

/// Oldest snapshots fall off once the history grows past this.
pub const HISTORY_CAP: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Select,
    Pencil,
    Eraser,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zoom {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scroll {
    pub x: f32,
    pub y: f32,
}

/// A note as dispatched by a tool, before the reducer assigns its id and
/// owning track index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewNote {
    pub pitch: u8,
    pub start: Tick,
    pub duration: Tick,
    pub velocity: u8,
}

/// Partial update merged over a note; absent fields keep their value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Tick>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Tick>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum EditAction {
    Load(Song),
    AddNote { track_id: String, note: NewNote },
    UpdateNote { note_id: String, changes: NoteChanges },
    DeleteNotes(Vec<String>),
    SelectNotes(Vec<String>),
    ClearSelection,
    SetPlaying(bool),
    SetPosition(f64),
    SetTempo(f64),
    ToggleTrackMute(String),
    ToggleTrackSolo(String),
    SetTool(Tool),
    SetZoom(Zoom),
    SetScroll(Scroll),
    SetQuantization(u16),
    Undo,
    Redo,
    Reset,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditorState {
    pub song: Option<Song>,
    pub is_playing: bool,
    /// Playhead in ticks, fractional while the transport runs.
    pub position: f64,
    pub loop_start: Option<Tick>,
    pub loop_end: Option<Tick>,
    /// Selected note ids, replaced wholesale by [`EditAction::SelectNotes`].
    pub selected: Vec<String>,
    pub tool: Tool,
    pub zoom: Zoom,
    pub scroll: Scroll,
    /// Snap grid as 1/Nth of a beat.
    pub quantization: u16,
    pub history: Vec<Song>,
    /// -1 while the history is empty.
    pub history_index: isize,
    next_note_id: u64,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            song: None,
            is_playing: false,
            position: 0.0,
            loop_start: None,
            loop_end: None,
            selected: Vec::new(),
            tool: Tool::Select,
            zoom: Zoom { x: 1.0, y: 1.0 },
            scroll: Scroll { x: 0.0, y: 0.0 },
            quantization: 4,
            history: Vec::new(),
            history_index: -1,
            next_note_id: 0,
        }
    }
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        self.history_index > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.history.is_empty() && self.history_index < self.history.len() as isize - 1
    }

    /// Applies one action. Document-touching actions are no-ops while no
    /// song is loaded; out-of-domain inputs (unknown track id) no-op rather
    /// than error, so the reducer is total.
    pub fn reduce(&mut self, action: EditAction) {
        match action {
            EditAction::Load(song) => {
                let counter = self.next_note_id;
                *self = Self {
                    history: vec![song.clone()],
                    history_index: 0,
                    song: Some(song),
                    next_note_id: counter,
                    ..Self::default()
                };
            }
            EditAction::AddNote { track_id, note } => {
                let Some(song) = &self.song else { return };
                let Some(track_index) = song.tracks.iter().position(|t| t.id == track_id)
                else {
                    return;
                };
                self.snapshot();
                let id = self.fresh_note_id();
                if let Some(song) = &mut self.song {
                    if let Some(track) = song.track_mut(track_index) {
                        track.notes.push(Note {
                            id,
                            pitch: note.pitch,
                            start: note.start,
                            duration: note.duration,
                            velocity: note.velocity,
                            track: track_index,
                        });
                    }
                }
            }
            EditAction::UpdateNote { note_id, changes } => {
                if self.song.is_none() {
                    return;
                }
                // Snapshot lands even when no note matches; an unknown id
                // burns a history slot with an identical copy.
                self.snapshot();
                if let Some(song) = &mut self.song {
                    for track in &mut song.tracks {
                        for note in &mut track.notes {
                            if note.id == note_id {
                                if let Some(pitch) = changes.pitch {
                                    note.pitch = pitch;
                                }
                                if let Some(start) = changes.start {
                                    note.start = start;
                                }
                                if let Some(duration) = changes.duration {
                                    note.duration = duration;
                                }
                                if let Some(velocity) = changes.velocity {
                                    note.velocity = velocity;
                                }
                                if let Some(track_index) = changes.track {
                                    note.track = track_index;
                                }
                            }
                        }
                    }
                }
            }
            EditAction::DeleteNotes(ids) => {
                if self.song.is_none() {
                    return;
                }
                self.snapshot();
                if let Some(song) = &mut self.song {
                    for track in &mut song.tracks {
                        track.notes.retain(|n| !ids.contains(&n.id));
                    }
                }
                self.selected.retain(|id| !ids.contains(id));
            }
            EditAction::SelectNotes(ids) => self.selected = ids,
            EditAction::ClearSelection => self.selected.clear(),
            EditAction::SetPlaying(playing) => self.is_playing = playing,
            EditAction::SetPosition(position) => self.position = position,
            EditAction::SetTempo(bpm) => {
                // Write-through, deliberately outside the history.
                if let Some(song) = &mut self.song {
                    song.tempo = bpm;
                }
            }
            EditAction::ToggleTrackMute(track_id) => {
                if let Some(song) = &mut self.song {
                    if let Some(track) = song.tracks.iter_mut().find(|t| t.id == track_id) {
                        track.muted = !track.muted;
                    }
                }
            }
            EditAction::ToggleTrackSolo(track_id) => {
                if let Some(song) = &mut self.song {
                    if let Some(track) = song.tracks.iter_mut().find(|t| t.id == track_id) {
                        track.solo = !track.solo;
                    }
                }
            }
            EditAction::SetTool(tool) => self.tool = tool,
            EditAction::SetZoom(zoom) => self.zoom = zoom,
            EditAction::SetScroll(scroll) => self.scroll = scroll,
            EditAction::SetQuantization(quantization) => self.quantization = quantization,
            EditAction::Undo => {
                if self.history_index > 0 {
                    self.history_index -= 1;
                    self.song = Some(self.history[self.history_index as usize].clone());
                }
            }
            EditAction::Redo => {
                if self.can_redo() {
                    self.history_index += 1;
                    self.song = Some(self.history[self.history_index as usize].clone());
                }
            }
            EditAction::Reset => {
                let counter = self.next_note_id;
                *self = Self {
                    next_note_id: counter,
                    ..Self::default()
                };
            }
        }
    }

    /// Pushes a deep copy of the current song, dropping any redo entries
    /// and the oldest snapshot past [`HISTORY_CAP`].
    fn snapshot(&mut self) {
        let Some(song) = &self.song else { return };
        self.history.truncate((self.history_index + 1) as usize);
        self.history.push(song.clone());
        if self.history.len() > HISTORY_CAP {
            self.history.remove(0);
        }
        self.history_index = self.history.len() as isize - 1;
    }

    /// Session-monotonic ids; imported ids carry two dash segments so the
    /// two families never collide.
    fn fresh_note_id(&mut self) -> String {
        self.next_note_id += 1;
        format!("note-{}", self.next_note_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn add(pitch: u8, start: Tick) -> EditAction {
        EditAction::AddNote {
            track_id: "track-0".into(),
            note: NewNote {
                pitch,
                start,
                duration: 120,
                velocity: 100,
            },
        }
    }

    fn note_count(state: &EditorState) -> usize {
        state
            .song
            .as_ref()
            .map(|s| s.tracks.iter().map(|t| t.notes.len()).sum())
            .unwrap_or(0)
    }

    #[test]
    fn load_seeds_single_entry_history() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history_index, 0);
        assert!(!state.can_undo());
        assert!(!state.can_redo());
    }

    #[test]
    fn load_resets_editor_ui_state() {
        let mut state = EditorState::new();
        state.reduce(EditAction::SetTool(Tool::Pencil));
        state.reduce(EditAction::SetQuantization(16));
        state.reduce(EditAction::SelectNotes(vec!["x".into()]));
        state.reduce(EditAction::Load(Song::empty("Test")));
        assert_eq!(state.tool, Tool::Select);
        assert_eq!(state.quantization, 4);
        assert!(state.selected.is_empty());
        assert_eq!(state.position, 0.0);
    }

    #[test]
    fn add_note_appends_with_fresh_id() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        state.reduce(add(60, 0));
        state.reduce(add(64, 480));
        let song = state.song.as_ref().unwrap();
        assert_eq!(song.tracks[0].notes.len(), 2);
        assert_ne!(song.tracks[0].notes[0].id, song.tracks[0].notes[1].id);
        assert_eq!(song.tracks[0].notes[0].track, 0);
    }

    #[test]
    fn add_note_unknown_track_is_total_noop() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        let before = state.clone();
        state.reduce(EditAction::AddNote {
            track_id: "track-9".into(),
            note: NewNote {
                pitch: 60,
                start: 0,
                duration: 120,
                velocity: 100,
            },
        });
        // No mutation and no history entry either.
        assert_eq!(state, before);
    }

    #[test]
    fn add_then_undo_restores_zero_notes() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        state.reduce(add(60, 0));
        assert_eq!(note_count(&state), 1);
        state.reduce(EditAction::Undo);
        assert_eq!(note_count(&state), 0);
    }

    #[test]
    fn update_note_merges_partial_fields() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        state.reduce(add(60, 0));
        let id = state.song.as_ref().unwrap().tracks[0].notes[0].id.clone();
        state.reduce(EditAction::UpdateNote {
            note_id: id.clone(),
            changes: NoteChanges {
                pitch: Some(72),
                start: Some(240),
                ..NoteChanges::default()
            },
        });
        let note = &state.song.as_ref().unwrap().tracks[0].notes[0];
        assert_eq!(note.pitch, 72);
        assert_eq!(note.start, 240);
        assert_eq!(note.duration, 120);
        assert_eq!(note.velocity, 100);
    }

    #[test]
    fn update_unknown_note_still_burns_a_history_slot() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        let depth = state.history.len();
        state.reduce(EditAction::UpdateNote {
            note_id: "missing".into(),
            changes: NoteChanges::default(),
        });
        assert_eq!(state.history.len(), depth + 1);
    }

    #[test]
    fn delete_notes_drops_from_selection_too() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        state.reduce(add(60, 0));
        state.reduce(add(64, 480));
        let song = state.song.as_ref().unwrap();
        let first = song.tracks[0].notes[0].id.clone();
        let second = song.tracks[0].notes[1].id.clone();
        state.reduce(EditAction::SelectNotes(vec![first.clone(), second.clone()]));
        state.reduce(EditAction::DeleteNotes(vec![first]));
        assert_eq!(note_count(&state), 1);
        assert_eq!(state.selected, vec![second]);
    }

    #[test]
    fn tempo_mute_solo_bypass_history() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        let depth = state.history.len();
        state.reduce(EditAction::SetTempo(90.0));
        state.reduce(EditAction::ToggleTrackMute("track-0".into()));
        state.reduce(EditAction::ToggleTrackSolo("track-0".into()));
        let song = state.song.as_ref().unwrap();
        assert_eq!(song.tempo, 90.0);
        assert!(song.tracks[0].muted);
        assert!(song.tracks[0].solo);
        assert_eq!(state.history.len(), depth);
    }

    #[test]
    fn history_caps_at_fifty_snapshots() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        for i in 0..60 {
            state.reduce(add(60, i as Tick * 10));
        }
        assert_eq!(state.history.len(), HISTORY_CAP);
        assert_eq!(state.history_index, HISTORY_CAP as isize - 1);
        assert_eq!(note_count(&state), 60);
    }

    #[test]
    fn undo_at_floor_and_redo_at_ceiling_are_noops() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        state.reduce(add(60, 0));
        // Walk to the floor and keep pushing.
        state.reduce(EditAction::Undo);
        let at_floor = state.clone();
        state.reduce(EditAction::Undo);
        assert_eq!(state, at_floor);
        // Walk to the ceiling and keep pushing.
        state.reduce(EditAction::Redo);
        let at_ceiling = state.clone();
        state.reduce(EditAction::Redo);
        assert_eq!(state, at_ceiling);
    }

    #[test]
    fn edit_after_undo_truncates_redo_entries() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        state.reduce(add(60, 0));
        state.reduce(add(62, 100));
        state.reduce(add(64, 200));
        state.reduce(EditAction::Undo);
        assert!(state.can_redo());
        state.reduce(add(65, 300));
        assert!(!state.can_redo());
    }

    #[test]
    fn actions_without_a_song_are_noops() {
        let mut state = EditorState::new();
        state.reduce(add(60, 0));
        state.reduce(EditAction::UpdateNote {
            note_id: "x".into(),
            changes: NoteChanges::default(),
        });
        state.reduce(EditAction::DeleteNotes(vec!["x".into()]));
        state.reduce(EditAction::SetTempo(90.0));
        state.reduce(EditAction::Undo);
        state.reduce(EditAction::Redo);
        assert_eq!(state, EditorState::new());
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let mut state = EditorState::new();
        state.reduce(EditAction::Load(Song::empty("Test")));
        state.reduce(add(60, 0));
        state.reduce(EditAction::Reset);
        assert!(state.song.is_none());
        assert!(state.history.is_empty());
        assert_eq!(state.history_index, -1);
    }

    #[test]
    fn edit_action_serde_shape_is_tagged() {
        let json = serde_json::to_string(&EditAction::SetQuantization(8)).unwrap();
        assert_eq!(json, r#"{"type":"setQuantization","payload":8}"#);
        let back: EditAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EditAction::SetQuantization(8));
    }
}
