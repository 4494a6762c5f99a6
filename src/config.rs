//! Application configuration for pronounce-rs.
//!
//! Loads config from YAML files in standard locations. This covers where
//! things live and how often things poll; the user-facing options edited in
//! the settings dialog are in `settings.json` (see [`crate::settings`]).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding settings.json, the IPA dictionary and the
    /// update-check timestamp.
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .map(|d| d.join("pronounce-rs"))
                .unwrap_or_else(|| PathBuf::from("asset")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    pub poll_interval_ms: u64,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    pub enabled: bool,
    pub feed_url: String,
    pub timeout_secs: u64,
    /// Show a desktop notification when a newer release is found.
    pub notify: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feed_url:
                "https://api.github.com/repos/needyamin/tts-pronunciation-practice/releases/latest"
                    .into(),
            timeout_secs: 10,
            notify: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    pub file_name: String,
    pub url: String,
    /// Fetch the dictionary on startup when the file is missing.
    pub download: bool,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            file_name: "cmudict-0.7b-ipa.txt".into(),
            url: "https://raw.githubusercontent.com/menelik3/cmudict-ipa/master/cmudict-0.7b-ipa.txt"
                .into(),
            download: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 50 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Localhost port bound for the lifetime of the process so a second
    /// copy can tell one is already running.
    pub port: u16,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self { port: 12345 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub clipboard: ClipboardConfig,
    pub update: UpdateConfig,
    pub dictionary: DictionaryConfig,
    pub history: HistoryConfig,
    pub instance: InstanceConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/pronounce-rs/config.yaml
    /// 3. /etc/pronounce-rs/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/pronounce-rs/config.yaml")),
                Some(PathBuf::from("/etc/pronounce-rs/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        Self::from_file(&config_path)
    }

    fn from_file(config_path: &Path) -> Self {
        match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.paths.data_dir.join("settings.json")
    }

    pub fn dictionary_path(&self) -> PathBuf {
        self.paths.data_dir.join(&self.dictionary.file_name)
    }

    pub fn update_stamp_path(&self) -> PathBuf {
        self.paths.data_dir.join(".update_check")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults_for_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "paths:\n  data_dir: /tmp/pronounce\nclipboard:\n  poll_interval_ms: 20\n",
        )
        .unwrap();

        let config = Config::load(Some(&path));
        assert_eq!(config.paths.data_dir, PathBuf::from("/tmp/pronounce"));
        assert_eq!(config.clipboard.poll_interval_ms, 20);
        assert_eq!(config.update.timeout_secs, 10);
        assert_eq!(config.history.max_entries, 50);
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/tmp/pronounce/settings.json")
        );
    }

    #[test]
    fn unparsable_yaml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "clipboard: [not, a, map").unwrap();

        let config = Config::load(Some(&path));
        assert_eq!(config.clipboard.poll_interval_ms, 50);
        assert_eq!(config.instance.port, 12345);
    }
}
