use pianola_ports::storage::{SettingsDto, StorageError, StoragePort};
use std::fs;
use std::path::{Path, PathBuf};

pub struct FsStorage {
    base_dir: PathBuf,
}

impl FsStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_base_dir() -> Result<PathBuf, StorageError> {
        let base = dirs_next::config_dir()
            .ok_or_else(|| StorageError::Io("config dir not found".to_string()))?;
        Ok(base.join("Pianola"))
    }

    fn settings_path(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
        let data = fs::read(path).map_err(|e| StorageError::Io(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| StorageError::Serde(e.to_string()))
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        let data =
            serde_json::to_vec_pretty(value).map_err(|e| StorageError::Serde(e.to_string()))?;
        fs::write(path, data).map_err(|e| StorageError::Io(e.to_string()))
    }
}

impl Default for FsStorage {
    fn default() -> Self {
        let base_dir = Self::default_base_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { base_dir }
    }
}

impl StoragePort for FsStorage {
    /// A missing settings file reads as defaults; a corrupt one is an
    /// error so the caller can decide whether to clobber it.
    fn load_settings(&self) -> Result<SettingsDto, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(SettingsDto::default());
        }
        Self::read_json(&path)
    }

    fn save_settings(&self, s: &SettingsDto) -> Result<(), StorageError> {
        let path = self.settings_path();
        Self::write_json(&path, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_base() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("pianola-storage-{nanos}"))
    }

    #[test]
    fn missing_settings_file_reads_as_defaults() {
        let storage = FsStorage::new(temp_base());
        assert_eq!(storage.load_settings().unwrap(), SettingsDto::default());
    }

    #[test]
    fn settings_round_trip_creating_the_directory() {
        let base = temp_base();
        let storage = FsStorage::new(base.clone());
        let settings = SettingsDto {
            quantization: 16,
            zoom_x: 2.0,
            last_open_dir: Some("/music".into()),
            ..SettingsDto::default()
        };
        storage.save_settings(&settings).unwrap();
        assert_eq!(storage.load_settings().unwrap(), settings);
        fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn unknown_fields_in_the_settings_file_are_ignored() {
        let base = temp_base();
        fs::create_dir_all(&base).unwrap();
        fs::write(
            base.join("settings.json"),
            r#"{"quantization": 8, "someFutureKnob": true}"#,
        )
        .unwrap();
        let storage = FsStorage::new(base.clone());
        let loaded = storage.load_settings().unwrap();
        assert_eq!(loaded.quantization, 8);
        assert_eq!(loaded.zoom_x, 1.0);
        fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn corrupt_settings_are_reported_not_swallowed() {
        let base = temp_base();
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("settings.json"), b"{nope").unwrap();
        let storage = FsStorage::new(base.clone());
        assert!(matches!(
            storage.load_settings(),
            Err(StorageError::Serde(_))
        ));
        fs::remove_dir_all(&base).ok();
    }
}
