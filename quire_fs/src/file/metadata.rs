//! Per-location key/value metadata consulted by the loader.

use std::collections::HashMap;

/// Key under which the charset of the last successful load is stored.
pub const ENCODING_KEY: &str = "encoding";

/// Read-only metadata lookup keyed by location name.
pub trait MetadataStore {
    fn get(&self, location: &str, key: &str) -> Option<String>;
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadata {
    entries: HashMap<(String, String), String>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, location: impl Into<String>, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .insert((location.into(), key.into()), value.into());
    }
}

impl MetadataStore for MemoryMetadata {
    fn get(&self, location: &str, key: &str) -> Option<String> {
        self.entries
            .get(&(location.to_string(), key.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_metadata() {
        let mut store = MemoryMetadata::new();
        assert_eq!(store.get("a.txt", ENCODING_KEY), None);

        store.set("a.txt", ENCODING_KEY, "ISO-8859-15");
        assert_eq!(store.get("a.txt", ENCODING_KEY).as_deref(), Some("ISO-8859-15"));
        assert_eq!(store.get("b.txt", ENCODING_KEY), None);
    }
}
