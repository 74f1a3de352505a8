//! Runtime-editable persona settings, persisted as a flat JSON file.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::ConfigError;

/// Settings changed through chat commands. Empty strings mean "use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub bot_name: String,
    #[serde(default)]
    pub language: String,
}

#[derive(Debug)]
pub enum StoreError {
    Serialize(serde_json::Error),
    Write { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize(e) => write!(f, "failed to serialize user config: {e}"),
            Self::Write { path, source } => {
                write!(f, "failed to write '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialize(e) => Some(e),
            Self::Write { source, .. } => Some(source),
        }
    }
}

/// The user config plus the file backing it.
///
/// Every mutation rewrites the whole file while holding the lock, and the
/// in-memory value only changes once the write succeeded.
pub struct UserConfigStore {
    path: Option<PathBuf>,
    current: Mutex<UserConfig>,
}

impl UserConfigStore {
    /// Read the file if it exists, otherwise start with empty settings.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let current = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            let config: UserConfig = serde_json::from_str(&content).map_err(|e| ConfigError::ParseJson {
                path: path.to_path_buf(),
                source: e,
            })?;
            info!("Loaded user config from {:?}", path);
            config
        } else {
            info!("No user config file, using defaults");
            UserConfig::default()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            current: Mutex::new(current),
        })
    }

    /// A store that never touches the disk.
    pub fn in_memory(config: UserConfig) -> Self {
        Self {
            path: None,
            current: Mutex::new(config),
        }
    }

    pub async fn get(&self) -> UserConfig {
        self.current.lock().await.clone()
    }

    /// Apply `change`, persist, then commit.
    pub async fn update<F>(&self, change: F) -> Result<UserConfig, StoreError>
    where
        F: FnOnce(&mut UserConfig),
    {
        let mut current = self.current.lock().await;
        let mut next = current.clone();
        change(&mut next);

        if let Some(ref path) = self.path {
            let json = serde_json::to_string(&next).map_err(StoreError::Serialize)?;
            std::fs::write(path, json).map_err(|e| StoreError::Write {
                path: path.clone(),
                source: e,
            })?;
        }

        *current = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_defaults() {
        let dir = TempDir::new().unwrap();
        let store = UserConfigStore::load_or_default(&dir.path().join("user-config.json")).unwrap();
        assert_eq!(store.get().await, UserConfig::default());
    }

    #[tokio::test]
    async fn test_update_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user-config.json");
        let store = UserConfigStore::load_or_default(&path).unwrap();

        store.update(|c| c.personality = "a grumpy pirate".to_string()).await.unwrap();
        store.update(|c| c.bot_name = "Barbossa".to_string()).await.unwrap();

        let on_disk: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            on_disk,
            serde_json::json!({"personality": "a grumpy pirate", "botName": "Barbossa", "language": ""})
        );

        let reloaded = UserConfigStore::load_or_default(&path).unwrap();
        assert_eq!(reloaded.get().await.bot_name, "Barbossa");
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("user-config.json");
        let store = UserConfigStore::load_or_default(&path).unwrap();

        let result = store.update(|c| c.language = "pt".to_string()).await;
        assert!(matches!(result, Err(StoreError::Write { .. })));
        assert_eq!(store.get().await.language, "");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user-config.json");
        std::fs::write(&path, r#"{"language": "pt"}"#).unwrap();
        let store = UserConfigStore::load_or_default(&path).unwrap();
        let config = store.current.try_lock().unwrap().clone();
        assert_eq!(config.language, "pt");
        assert_eq!(config.personality, "");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user-config.json");
        std::fs::write(&path, "{ invalid json }").unwrap();
        assert!(matches!(
            UserConfigStore::load_or_default(&path),
            Err(ConfigError::ParseJson { .. })
        ));
    }
}
