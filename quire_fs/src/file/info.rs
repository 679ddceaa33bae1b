//! Metadata reported by a location before reading or after writing.

use std::fs::Metadata;
use std::time::SystemTime;

/// Kind of filesystem object behind a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    /// Sockets, FIFOs, devices and anything else that is not plain data.
    Special,
}

/// Snapshot of a location's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub file_type: FileType,
    /// MIME type when known; `None` asks the loader to sniff the content.
    pub content_type: Option<String>,
    pub size: Option<u64>,
    /// Last modification time
    pub mtime: Option<SystemTime>,
    pub writable: bool,
}

impl FileInfo {
    /// Build from filesystem metadata. The content type is left for the
    /// caller to fill in.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let file_type = if metadata.is_file() {
            FileType::Regular
        } else if metadata.is_dir() {
            FileType::Directory
        } else {
            FileType::Special
        };

        FileInfo {
            file_type,
            content_type: None,
            size: Some(metadata.len()),
            mtime: metadata.modified().ok(),
            writable: !metadata.permissions().readonly(),
        }
    }

    /// Info for an already-open stream: a regular source of unknown type
    /// and size.
    pub fn for_stream() -> Self {
        FileInfo {
            file_type: FileType::Regular,
            content_type: None,
            size: None,
            mtime: None,
            writable: false,
        }
    }

    pub fn is_regular(&self) -> bool {
        self.file_type == FileType::Regular
    }

    /// Whether the location changed since `old_mtime` was recorded.
    ///
    /// Unknown times on either side never count as a change.
    pub fn is_modified_since(&self, old_mtime: Option<SystemTime>) -> bool {
        match (old_mtime, self.mtime) {
            (Some(old), Some(current)) => old != current,
            _ => false,
        }
    }
}
