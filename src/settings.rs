//! User settings, persisted as a flat JSON document.
//!
//! Loading is lenient: unknown keys are ignored, missing keys keep their
//! defaults and every recognized value is coerced to its declared type. A
//! file that can't be read or coerced is replaced by the defaults.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::speech::VoiceProfile;

pub const MIN_SPEECH_RATE: u32 = 50;
pub const MAX_SPEECH_RATE: u32 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub tts_enabled: bool,
    pub clipboard_monitoring: bool,
    pub auto_speak: bool,
    /// Words per minute.
    pub speech_rate: u32,
    /// Case-insensitive substring matched against installed voice names.
    pub voice_name: String,
    pub volume: f32,
    pub show_ipa: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            clipboard_monitoring: true,
            auto_speak: true,
            speech_rate: 150,
            voice_name: "zira".into(),
            volume: 1.0,
            show_ipa: true,
        }
    }
}

/// Load (`Read`, `Parse`, `InvalidValue`) and save (`Save`, `Serialize`)
/// failures. Neither is fatal: a failed load heals itself by rewriting the
/// defaults, a failed save is reported to the user.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("settings document must be a JSON object")]
    NotAnObject,

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to save {path}: {source}")]
    Save {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Settings {
    /// Build settings from a parsed document, starting from the defaults.
    pub fn from_document(doc: &Value) -> Result<Self, SettingsError> {
        let map = doc.as_object().ok_or(SettingsError::NotAnObject)?;
        let mut settings = Self::default();

        for (key, value) in map {
            match key.as_str() {
                "tts_enabled" => settings.tts_enabled = coerce_bool(value),
                "clipboard_monitoring" => settings.clipboard_monitoring = coerce_bool(value),
                "auto_speak" => settings.auto_speak = coerce_bool(value),
                "show_ipa" => settings.show_ipa = coerce_bool(value),
                "speech_rate" => {
                    let rate = coerce_int("speech_rate", value)?;
                    settings.speech_rate =
                        rate.clamp(i64::from(MIN_SPEECH_RATE), i64::from(MAX_SPEECH_RATE)) as u32;
                }
                "volume" => {
                    settings.volume = coerce_float("volume", value)?.clamp(0.0, 1.0) as f32;
                }
                "voice_name" => settings.voice_name = coerce_string("voice_name", value)?,
                other => debug!("Ignoring unknown settings key: {other}"),
            }
        }

        Ok(settings)
    }

    pub fn voice_profile(&self) -> VoiceProfile {
        VoiceProfile {
            rate: self.speech_rate,
            volume: self.volume,
            voice_name: self.voice_name.clone(),
        }
    }
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn coerce_int(key: &'static str, value: &Value) -> Result<i64, SettingsError> {
    let parsed = match value {
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| invalid(key, value))
}

fn coerce_float(key: &'static str, value: &Value) -> Result<f64, SettingsError> {
    let parsed = match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|f| f.is_finite())
        .ok_or_else(|| invalid(key, value))
}

fn coerce_string(key: &'static str, value: &Value) -> Result<String, SettingsError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &'static str, value: &Value) -> SettingsError {
    SettingsError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

fn read_settings(path: &Path) -> Result<Settings, SettingsError> {
    let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_json::from_str(&contents)?;
    Settings::from_document(&doc)
}

/// Load settings from `path`. Any failure yields the defaults, which are
/// written back so the next start finds a valid file.
pub fn load_settings(path: &Path) -> Settings {
    match read_settings(path) {
        Ok(settings) => {
            info!("Settings loaded from {}", path.display());
            debug!("Loaded settings: {settings:?}");
            settings
        }
        Err(e) => {
            if path.exists() {
                warn!("Failed to load settings: {e}, restoring defaults");
            } else {
                info!("Settings file not found, creating default: {}", path.display());
            }
            let defaults = Settings::default();
            if let Err(e) = save_settings(path, &defaults) {
                warn!("Could not write default settings: {e}");
            }
            defaults
        }
    }
}

/// Save the full settings document. A failed direct write is retried once
/// through [`write_replace`]; only a second failure is returned.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    let json = serde_json::to_string_pretty(settings)?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!("Failed to create settings dir {}: {e}", dir.display());
        }
    }

    match fs::write(path, &json) {
        Ok(()) => {
            info!("Settings saved to {}", path.display());
            Ok(())
        }
        Err(e) => {
            warn!("Failed to save settings: {e}, retrying via temp file");
            write_replace(path, json.as_bytes()).map_err(|source| SettingsError::Save {
                path: path.to_path_buf(),
                source,
            })?;
            info!("Settings saved via temp file: {}", path.display());
            Ok(())
        }
    }
}

/// Write `contents` to a temp file next to `path`, then rename it over
/// `path`. Readers see either the old or the new file, never a partial one.
pub fn write_replace(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Settings shared between the UI and background tasks.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    pub fn load(path: PathBuf) -> Self {
        let current = load_settings(&path);
        Self {
            path,
            current: RwLock::new(current),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> Settings {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the in-memory settings and persist them. The in-memory copy
    /// is updated even when the write fails.
    pub fn save(&self, settings: Settings) -> Result<(), SettingsError> {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        save_settings(&self.path, &settings)
    }

    pub fn reset(&self) -> Result<(), SettingsError> {
        self.save(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.tts_enabled);
        assert!(settings.clipboard_monitoring);
        assert!(settings.auto_speak);
        assert!(settings.show_ipa);
        assert_eq!(settings.speech_rate, 150);
        assert_eq!(settings.voice_name, "zira");
        assert!((settings.volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_values_coerced_to_declared_types() {
        let doc = json!({
            "tts_enabled": 0,
            "clipboard_monitoring": "yes",
            "auto_speak": false,
            "show_ipa": 1,
            "speech_rate": "200",
            "volume": 1,
            "voice_name": "David",
        });
        let settings = Settings::from_document(&doc).unwrap();
        assert!(!settings.tts_enabled);
        assert!(settings.clipboard_monitoring);
        assert!(!settings.auto_speak);
        assert!(settings.show_ipa);
        assert_eq!(settings.speech_rate, 200);
        assert!((settings.volume - 1.0).abs() < f32::EPSILON);
        assert_eq!(settings.voice_name, "David");
    }

    #[test]
    fn test_float_rate_is_truncated() {
        let settings = Settings::from_document(&json!({ "speech_rate": 175.9 })).unwrap();
        assert_eq!(settings.speech_rate, 175);
    }

    #[test]
    fn test_unknown_keys_ignored_and_missing_keys_defaulted() {
        let doc = json!({ "speech_rate": 180, "theme": "dark" });
        let settings = Settings::from_document(&doc).unwrap();
        assert_eq!(settings.speech_rate, 180);
        assert_eq!(
            settings,
            Settings {
                speech_rate: 180,
                ..Settings::default()
            }
        );
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let doc = json!({ "speech_rate": 1000, "volume": -0.5 });
        let settings = Settings::from_document(&doc).unwrap();
        assert_eq!(settings.speech_rate, MAX_SPEECH_RATE);
        assert_eq!(settings.volume, 0.0);
    }

    #[test]
    fn test_uncoercible_value_rejected() {
        let err = Settings::from_document(&json!({ "speech_rate": "fast" })).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidValue {
                key: "speech_rate",
                ..
            }
        ));
        assert!(matches!(
            Settings::from_document(&json!([1, 2])),
            Err(SettingsError::NotAnObject)
        ));
    }

    #[test]
    fn test_load_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asset").join("settings.json");

        let settings = load_settings(&path);
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
        assert_eq!(read_settings(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_load_corrupt_file_rewrites_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ \"tts_enabled\": tru").unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings, Settings::default());

        let rewritten: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten["speech_rate"], json!(150));
        assert_eq!(rewritten["voice_name"], json!("zira"));
    }

    #[test]
    fn test_store_save_persists_and_updates_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.json"));

        let changed = Settings {
            speech_rate: 220,
            voice_name: "hazel".into(),
            show_ipa: false,
            ..store.get()
        };
        store.save(changed.clone()).unwrap();

        assert_eq!(store.get(), changed);
        assert_eq!(load_settings(store.path()), changed);

        store.reset().unwrap();
        assert_eq!(load_settings(store.path()), Settings::default());
    }

    #[test]
    fn test_save_failure_reported_after_retry() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let path = blocker.join("settings.json");

        let err = save_settings(&path, &Settings::default()).unwrap_err();
        assert!(matches!(err, SettingsError::Save { .. }));
    }

    #[test]
    fn test_write_replace_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "old").unwrap();

        write_replace(&path, b"new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
