use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::SettingsError;

pub const APP_DIR: &str = ".craftwarden";
pub const SETTINGS_FILE: &str = "settings.json";

/// Per-user home for settings, the default server directory and backups.
pub fn app_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub java_home: String,
    pub java_path: String,
    pub minecraft_directory: PathBuf,
    pub server_jar: String,
    pub memory: MemorySettings,
    pub backups: BackupSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    pub minimum: u32,
    pub maximum: u32,
    pub units: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupSettings {
    pub path: PathBuf,
    pub num_to_keep: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let home = app_home();
        Self {
            java_home: String::new(),
            java_path: String::new(),
            minecraft_directory: home.join("minecraft"),
            server_jar: "minecraft_server.jar".into(),
            memory: MemorySettings::default(),
            backups: BackupSettings {
                path: home.join("backups"),
                num_to_keep: 5,
            },
        }
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            minimum: 1,
            maximum: 2,
            units: "G".into(),
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            path: app_home().join("backups"),
            num_to_keep: 5,
        }
    }
}

impl Settings {
    /// Settings rooted at `root`: server files in `root/minecraft`, backups in
    /// `root/backups`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            minecraft_directory: root.join("minecraft"),
            backups: BackupSettings {
                path: root.join("backups"),
                num_to_keep: 5,
            },
            ..Self::default()
        }
    }

    pub fn jar_path(&self) -> PathBuf {
        self.minecraft_directory.join(&self.server_jar)
    }

    pub fn memory_flags(&self) -> [String; 2] {
        let units = self.memory.units.trim();
        [
            format!("-Xms{}{}", self.memory.minimum, units),
            format!("-Xmx{}{}", self.memory.maximum.max(self.memory.minimum), units),
        ]
    }
}

/// JSON settings document at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        Self::new(app_home().join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the document, writing `defaults` on first run.
    pub async fn read(&self, defaults: &Settings) -> Result<Settings, SettingsError> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no settings found, writing defaults");
                return self.save(defaults).await;
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let settings = serde_json::from_slice(&data).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "settings loaded");
        Ok(settings)
    }

    pub async fn save(&self, settings: &Settings) -> Result<Settings, SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(settings).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).await.map_err(io_err)?;

        Ok(settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_read_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested/settings.json"));
        let defaults = Settings::rooted_at(dir.path());

        let loaded = store.read(&defaults).await.unwrap();
        assert_eq!(loaded, defaults);
        assert!(store.path().is_file());

        let again = store.read(&Settings::default()).await.unwrap();
        assert_eq!(again, defaults);
    }

    #[tokio::test]
    async fn missing_fields_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, r#"{"serverJar":"custom.jar","memory":{"maximum":4}}"#)
            .await
            .unwrap();

        let loaded = SettingsStore::new(&path)
            .read(&Settings::default())
            .await
            .unwrap();
        assert_eq!(loaded.server_jar, "custom.jar");
        assert_eq!(loaded.memory.maximum, 4);
        assert_eq!(loaded.memory.minimum, 1);
        assert_eq!(loaded.memory.units, "G");
    }

    #[tokio::test]
    async fn malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = SettingsStore::new(&path)
            .read(&Settings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn memory_flags_use_units() {
        let mut settings = Settings::default();
        settings.memory = MemorySettings {
            minimum: 512,
            maximum: 2048,
            units: "M".into(),
        };
        assert_eq!(settings.memory_flags(), ["-Xms512M".to_string(), "-Xmx2048M".to_string()]);
    }
}
