//! Key-value persistence for the settings blob.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::{AlertSettings, SETTINGS_KEY, SettingsError, SettingsPatch};

/// Minimal string key-value storage, the shape of a mobile local store.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the backing storage cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        (**self).set(key, value)
    }
}

/// Volatile in-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store that keeps one `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the stored files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SettingsError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(SettingsError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;

        // Write-then-rename so a crash never leaves a half-written blob
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Typed access to the persisted [`AlertSettings`] blob.
#[derive(Debug)]
pub struct SettingsStore<S> {
    backend: S,
}

impl<S: KeyValueStore> SettingsStore<S> {
    /// Wraps a key-value backend.
    pub const fn new(backend: S) -> Self {
        Self { backend }
    }

    /// Loads the persisted settings.
    ///
    /// A missing, unreadable or corrupt blob yields the defaults; the
    /// result is always sanitized.
    pub fn load(&self) -> AlertSettings {
        let raw = match self.backend.get(SETTINGS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::debug!("No stored alert settings, using defaults");
                return AlertSettings::default();
            }
            Err(e) => {
                log::warn!("Failed to read alert settings, using defaults: {e}");
                return AlertSettings::default();
            }
        };

        match serde_json::from_str::<AlertSettings>(&raw) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                log::warn!("Stored alert settings are corrupt, using defaults: {e}");
                AlertSettings::default()
            }
        }
    }

    /// Persists `settings` (sanitized first).
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if serialization or the backend write fails.
    pub fn save(&self, settings: &AlertSettings) -> Result<(), SettingsError> {
        let json = serde_json::to_string(&settings.sanitized())?;
        self.backend.set(SETTINGS_KEY, &json)
    }

    /// Loads, applies `patch`, saves, and returns the new settings.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] if the write fails.
    pub fn update(&self, patch: &SettingsPatch) -> Result<AlertSettings, SettingsError> {
        let updated = self.load().with_patch(patch);
        self.save(&updated)?;
        Ok(updated)
    }

    /// Borrows the underlying backend.
    pub const fn backend(&self) -> &S {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlertTone;

    #[test]
    fn memory_store_round_trips_settings() {
        let store = SettingsStore::new(MemoryStore::new());
        let settings = AlertSettings {
            is_active: true,
            tone_id: AlertTone::Beep,
            ..AlertSettings::default()
        };

        store.save(&settings).unwrap();
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn missing_blob_loads_defaults() {
        let store = SettingsStore::new(MemoryStore::new());
        assert_eq!(store.load(), AlertSettings::default());
    }

    #[test]
    fn corrupt_blob_loads_defaults() {
        let backend = MemoryStore::new();
        backend.set(SETTINGS_KEY, "{not json").unwrap();
        let store = SettingsStore::new(backend);
        assert_eq!(store.load(), AlertSettings::default());
    }

    #[test]
    fn out_of_range_blob_is_clamped_on_load() {
        let backend = MemoryStore::new();
        backend
            .set(SETTINGS_KEY, r#"{"searchRadiusKm":40,"alertDistanceMeters":2}"#)
            .unwrap();
        let settings = SettingsStore::new(backend).load();

        assert!((settings.search_radius_km - 10.0).abs() < f64::EPSILON);
        assert!((settings.alert_distance_meters - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn update_persists_patch() {
        let store = SettingsStore::new(MemoryStore::new());
        let patch = SettingsPatch {
            is_active: Some(true),
            volume: Some(0.25),
            ..SettingsPatch::default()
        };

        let updated = store.update(&patch).unwrap();
        assert!(updated.is_active);
        assert_eq!(store.load(), updated);
    }

    #[test]
    fn file_store_writes_one_file_per_key() {
        let tmp = std::env::temp_dir().join("roadwatch_settings_file_store");
        let _ = std::fs::remove_dir_all(&tmp);

        let store = SettingsStore::new(FileStore::new(&tmp));
        assert_eq!(store.load(), AlertSettings::default());

        let settings = AlertSettings {
            verified_only: false,
            ..AlertSettings::default()
        };
        store.save(&settings).unwrap();

        assert!(tmp.join("alert_settings.json").exists());
        assert_eq!(SettingsStore::new(FileStore::new(&tmp)).load(), settings);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let store = FileStore::new(std::env::temp_dir());
        assert!(matches!(
            store.get("../escape"),
            Err(SettingsError::InvalidKey { .. })
        ));
    }

    #[test]
    fn shared_backend_sees_saved_settings() {
        let backend = std::sync::Arc::new(MemoryStore::new());
        let writer = SettingsStore::new(std::sync::Arc::clone(&backend));
        writer
            .update(&SettingsPatch {
                tone_id: Some(AlertTone::Siren),
                ..SettingsPatch::default()
            })
            .unwrap();

        assert_eq!(SettingsStore::new(backend).load().tone_id, AlertTone::Siren);
    }
}
