//! Piano-roll geometry and tool dispatch. Everything here is pure: screen
//! coordinates map to ticks and pitches, tool gestures map to edit actions
//! plus an optional preview pitch, and the host does the drawing.

use pianola_domain_song::model::{note_name, Note, Song};
use pianola_ports::types::Tick;

use crate::editor::{EditAction, EditorState, NewNote, Tool};

pub const NOTE_HEIGHT: f32 = 14.0;
pub const BEAT_WIDTH: f32 = 40.0;
pub const KEY_GUTTER_WIDTH: f32 = 60.0;

/// Lowest drawable pitch, A0.
pub const MIN_PITCH: u8 = 21;
/// Highest drawable pitch, C8.
pub const MAX_PITCH: u8 = 108;
pub const PITCH_ROWS: u8 = MAX_PITCH - MIN_PITCH + 1;

pub const PENCIL_VELOCITY: u8 = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Marquee drags can run in any direction; flip to positive extents.
    pub fn normalized(self) -> Rect {
        Rect {
            x: self.x.min(self.x + self.width),
            y: self.y.min(self.y + self.height),
            width: self.width.abs(),
            height: self.height.abs(),
        }
    }
}

/// Zoom-scaled unit conversions for one roll view.
#[derive(Clone, Copy, Debug)]
pub struct RollMetrics {
    pub zoom_x: f32,
    pub zoom_y: f32,
    pub ticks_per_beat: u16,
    pub quantization: u16,
}

impl RollMetrics {
    pub fn new(state: &EditorState, song: &Song) -> Self {
        Self {
            zoom_x: state.zoom.x,
            zoom_y: state.zoom.y,
            ticks_per_beat: song.ticks_per_beat,
            quantization: state.quantization,
        }
    }

    pub fn scaled_beat_width(&self) -> f32 {
        BEAT_WIDTH * self.zoom_x
    }

    pub fn scaled_note_height(&self) -> f32 {
        NOTE_HEIGHT * self.zoom_y
    }

    pub fn tick_at_x(&self, x: f32) -> Tick {
        (x / self.scaled_beat_width() * self.ticks_per_beat as f32).round() as Tick
    }

    pub fn x_at_tick(&self, tick: Tick) -> f32 {
        tick as f32 / self.ticks_per_beat as f32 * self.scaled_beat_width()
    }

    /// Row pitch under a y coordinate; above the top row this exceeds
    /// [`MAX_PITCH`], so callers bound-check before casting.
    pub fn pitch_at_y(&self, y: f32) -> i32 {
        MAX_PITCH as i32 - (y / self.scaled_note_height()).floor() as i32
    }

    pub fn y_at_pitch(&self, pitch: u8) -> f32 {
        (MAX_PITCH as i32 - pitch as i32) as f32 * self.scaled_note_height()
    }

    /// Snap grid width in ticks, 1/Nth of a beat.
    pub fn grid_ticks(&self) -> Tick {
        self.ticks_per_beat as Tick / self.quantization.max(1) as Tick
    }

    pub fn snap(&self, tick: Tick) -> Tick {
        let grid = self.grid_ticks().max(1);
        ((tick as f64 / grid as f64).round() as Tick) * grid
    }

    pub fn playhead_x(&self, position: f64) -> f32 {
        (position / self.ticks_per_beat as f64) as f32 * self.scaled_beat_width()
    }

    pub fn note_rect(&self, note: &Note) -> Rect {
        Rect {
            x: self.x_at_tick(note.start),
            y: self.y_at_pitch(note.pitch),
            width: note.duration as f32 / self.ticks_per_beat as f32 * self.scaled_beat_width(),
            height: self.scaled_note_height(),
        }
    }

    pub fn content_size(&self, song: &Song) -> (f32, f32) {
        let width =
            content_ticks(song) as f32 / self.ticks_per_beat as f32 * self.scaled_beat_width();
        (width, PITCH_ROWS as f32 * self.scaled_note_height())
    }
}

/// Drawable extent: the occupied span plus four beats of tail, never less
/// than eight measures.
pub fn content_ticks(song: &Song) -> Tick {
    let tail = song.max_occupied_tick() + song.ticks_per_beat as Tick * 4;
    let floor = song.ticks_per_beat as Tick * song.time_signature.numerator as Tick * 8;
    tail.max(floor)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VerticalLine {
    pub x: f32,
    /// Measure boundaries draw heavier than beat lines.
    pub measure: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HorizontalLine {
    pub y: f32,
    /// Octave boundaries (every C) draw heavier than row lines.
    pub octave: bool,
}

pub fn vertical_gridlines(song: &Song, metrics: &RollMetrics) -> Vec<VerticalLine> {
    let beats = content_ticks(song) / song.ticks_per_beat as Tick;
    let numerator = song.time_signature.numerator.max(1) as Tick;
    (0..=beats)
        .map(|beat| VerticalLine {
            x: beat as f32 * metrics.scaled_beat_width(),
            measure: beat % numerator == 0,
        })
        .collect()
}

pub fn horizontal_gridlines(metrics: &RollMetrics) -> Vec<HorizontalLine> {
    (MIN_PITCH..=MAX_PITCH)
        .rev()
        .map(|pitch| HorizontalLine {
            y: metrics.y_at_pitch(pitch),
            octave: pitch % 12 == 0,
        })
        .collect()
}

/// One key-gutter row, top row first.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyRow {
    pub pitch: u8,
    pub y: f32,
    pub is_black: bool,
    /// Octave label, present on every C.
    pub label: Option<String>,
}

pub fn key_rows(metrics: &RollMetrics) -> Vec<KeyRow> {
    (MIN_PITCH..=MAX_PITCH)
        .rev()
        .map(|pitch| {
            let name = note_name(pitch);
            KeyRow {
                pitch,
                y: metrics.y_at_pitch(pitch),
                is_black: name.contains('#'),
                label: (pitch % 12 == 0).then_some(name),
            }
        })
        .collect()
}

/// What one tool gesture wants done: actions for the reducer plus an
/// optional pitch to sound.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolResponse {
    pub actions: Vec<EditAction>,
    pub preview: Option<u8>,
}

/// Pointer press on empty grid space. The pencil writes a note one grid
/// unit long on the first track; the select tool opens a marquee (host
/// feeds the final rect to [`marquee`]); the eraser only acts on notes.
pub fn press_grid(state: &EditorState, song: &Song, x: f32, y: f32) -> ToolResponse {
    let mut response = ToolResponse::default();
    if state.tool != Tool::Pencil {
        return response;
    }
    let metrics = RollMetrics::new(state, song);
    let pitch = metrics.pitch_at_y(y);
    if !(MIN_PITCH as i32..=MAX_PITCH as i32).contains(&pitch) {
        return response;
    }
    let Some(track) = song.tracks.first() else {
        return response;
    };
    let pitch = pitch as u8;
    let start = metrics.snap(metrics.tick_at_x(x)).max(0);
    response.actions.push(EditAction::AddNote {
        track_id: track.id.clone(),
        note: NewNote {
            pitch,
            start,
            duration: metrics.grid_ticks(),
            velocity: PENCIL_VELOCITY,
        },
    });
    response.preview = Some(pitch);
    response
}

/// Pointer press on an existing note.
pub fn press_note(state: &EditorState, note_id: &str, pitch: u8, shift_held: bool) -> ToolResponse {
    let mut response = ToolResponse::default();
    match state.tool {
        Tool::Select => {
            let ids = if shift_held {
                let mut ids = state.selected.clone();
                match ids.iter().position(|id| id == note_id) {
                    Some(at) => {
                        ids.remove(at);
                    }
                    None => ids.push(note_id.to_owned()),
                }
                ids
            } else {
                vec![note_id.to_owned()]
            };
            response.actions.push(EditAction::SelectNotes(ids));
            response.preview = Some(pitch);
        }
        Tool::Eraser => {
            response
                .actions
                .push(EditAction::DeleteNotes(vec![note_id.to_owned()]));
        }
        // The grid press already handled pencil input at this spot.
        Tool::Pencil => {}
    }
    response
}

/// Marquee release: select every solo/mute-visible note whose span
/// intersects the dragged rectangle.
pub fn marquee(state: &EditorState, song: &Song, rect: Rect) -> ToolResponse {
    let metrics = RollMetrics::new(state, song);
    let rect = rect.normalized();
    let min_tick = metrics.tick_at_x(rect.x);
    let max_tick = metrics.tick_at_x(rect.x + rect.width);
    let min_pitch = metrics.pitch_at_y(rect.y + rect.height);
    let max_pitch = metrics.pitch_at_y(rect.y);
    let ids = song
        .visible_notes()
        .into_iter()
        .filter(|v| {
            let n = v.note;
            n.start < max_tick
                && n.end() > min_tick
                && (min_pitch..=max_pitch).contains(&(n.pitch as i32))
        })
        .map(|v| v.note.id.clone())
        .collect();
    ToolResponse {
        actions: vec![EditAction::SelectNotes(ids)],
        preview: None,
    }
}

/// Delete/Backspace with a live selection clears it out of the document.
pub fn press_delete_key(state: &EditorState) -> ToolResponse {
    let mut response = ToolResponse::default();
    if !state.selected.is_empty() {
        response
            .actions
            .push(EditAction::DeleteNotes(state.selected.clone()));
    }
    response
}

/// Key-gutter press sounds the row's pitch, nothing else.
pub fn press_key_gutter(state: &EditorState, song: &Song, y: f32) -> ToolResponse {
    let metrics = RollMetrics::new(state, song);
    let pitch = metrics.pitch_at_y(y);
    let mut response = ToolResponse::default();
    if (MIN_PITCH as i32..=MAX_PITCH as i32).contains(&pitch) {
        response.preview = Some(pitch as u8);
    }
    response
}
