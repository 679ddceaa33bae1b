use quire_fs::file::DEFAULT_CANDIDATES;
use serde::{Deserialize, Serialize};

/// Encoding detection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingSettings {
    /// Ranked candidate charsets; `"CURRENT"` stands for the locale charset
    pub auto_detected: Vec<String>,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            auto_detected: DEFAULT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Load and save behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Terminate the last line on save and hide that newline on load
    pub ensure_trailing_newline: bool,
    /// Keep `<name>~` with the previous content when saving
    pub create_backup_copy: bool,
    /// Bytes per read or write step
    pub chunk_size: usize,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            ensure_trailing_newline: true,
            create_backup_copy: false,
            chunk_size: 8192,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let editor = EditorSettings::default();
        assert!(editor.ensure_trailing_newline);
        assert!(!editor.create_backup_copy);
        assert_eq!(editor.chunk_size, 8192);

        let encodings = EncodingSettings::default();
        assert_eq!(encodings.auto_detected, ["UTF-8", "CURRENT", "ISO-8859-15", "UTF-16"]);
    }
}
