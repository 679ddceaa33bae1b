use crate::error::{ConfigError, ConfigResult};
use crate::settings::{EditorSettings, EncodingSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure for quire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Encoding detection settings
    pub encodings: EncodingSettings,
    /// Load and save behavior
    pub editor: EditorSettings,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Export configuration as TOML string
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get configuration file search paths
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // User-specific config
        if let Some(home) = std::env::var_os("HOME") {
            paths.push(PathBuf::from(&home).join(".quire").join("config.toml"));
            paths.push(PathBuf::from(&home).join(".config").join("quire").join("config.toml"));
        }

        // System-wide config
        paths.push(PathBuf::from("/etc/quire/config.toml"));

        // Current directory
        if let Ok(current_dir) = std::env::current_dir() {
            paths.push(current_dir.join(".quire.toml"));
        }

        paths
    }

    /// Load configuration with automatic path discovery
    pub fn load() -> ConfigResult<Self> {
        Self::load_with_paths(&Self::config_paths())
    }

    /// Load configuration with custom search paths
    pub fn load_with_paths(paths: &[PathBuf]) -> ConfigResult<Self> {
        for path in paths {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        // Return default configuration if no config file found
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.encodings.auto_detected.is_empty() {
            return Err(ConfigError::Validation(
                "At least one auto-detected encoding is required".to_string(),
            ));
        }
        if self.encodings.auto_detected.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigError::Validation("Encoding names must not be empty".to_string()));
        }
        if self.editor.chunk_size == 0 {
            return Err(ConfigError::Validation("Chunk size must be greater than 0".to_string()));
        }

        Ok(())
    }
}
