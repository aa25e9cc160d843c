//! Editor configuration persistence
//!
//! Stores user preferences in `~/.config/ved/config.yaml`

use serde::{Deserialize, Serialize};

use crate::undo::UndoLog;

/// Editor configuration that persists across sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Maximum number of undo records kept per session; the oldest is
    /// discarded beyond this bound
    #[serde(default = "default_undo_depth")]
    pub undo_depth: usize,
}

fn default_undo_depth() -> usize {
    UndoLog::DEFAULT_DEPTH
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_depth: default_undo_depth(),
        }
    }
}

impl EditorConfig {
    /// Load config from disk, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = crate::config_paths::config_file() else {
            tracing::debug!("No config directory available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_yaml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(err) => {
                    tracing::warn!("Failed to parse config at {}: {}", path.display(), err);
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Save config to disk
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> Result<(), String> {
        let path = crate::config_paths::config_file()
            .ok_or_else(|| "No config directory available".to_string())?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create config directory: {}", err))?;
        }

        let content = serde_yaml::to_string(self)
            .map_err(|err| format!("Failed to serialize config: {}", err))?;

        std::fs::write(&path, content)
            .map_err(|err| format!("Failed to write config to {}: {}", path.display(), err))?;

        tracing::info!("Saved config to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_undo_depth() {
        let config = EditorConfig::default();
        assert_eq!(config.undo_depth, UndoLog::DEFAULT_DEPTH);
    }

    #[test]
    fn test_missing_field_falls_back() {
        let config: EditorConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.undo_depth, UndoLog::DEFAULT_DEPTH);
    }

    #[test]
    fn test_round_trip() {
        let config = EditorConfig { undo_depth: 17 };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: EditorConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.undo_depth, 17);
    }
}
