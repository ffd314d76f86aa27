use serde::{Deserialize, Serialize};

fn default_quantization() -> u16 {
    4
}

fn default_zoom() -> f32 {
    1.0
}

fn default_onset_threshold() -> f32 {
    0.35
}

fn default_frame_threshold() -> f32 {
    0.25
}

fn default_min_note_frames() -> u32 {
    3
}

fn default_velocity_sensitivity() -> f32 {
    0.7
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsDto {
    #[serde(default = "default_quantization")]
    pub quantization: u16,
    #[serde(default = "default_zoom")]
    pub zoom_x: f32,
    #[serde(default = "default_zoom")]
    pub zoom_y: f32,
    #[serde(default = "default_onset_threshold")]
    pub onset_threshold: f32,
    #[serde(default = "default_frame_threshold")]
    pub frame_threshold: f32,
    #[serde(default = "default_min_note_frames")]
    pub min_note_frames: u32,
    #[serde(default = "default_velocity_sensitivity")]
    pub velocity_sensitivity: f32,
    pub last_open_dir: Option<String>,
}

impl Default for SettingsDto {
    fn default() -> Self {
        Self {
            quantization: 4,
            zoom_x: 1.0,
            zoom_y: 1.0,
            onset_threshold: 0.35,
            frame_threshold: 0.25,
            min_note_frames: 3,
            velocity_sensitivity: 0.7,
            last_open_dir: None,
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<SettingsDto, StorageError>;
    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError>;
}
