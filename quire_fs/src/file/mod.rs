//! Loading and saving documents from locations.
//!
//! - `location` for byte sources and atomic-replace destinations
//! - `load` / `save` for the chunked drivers
//! - `newline` for newline styles and first-line classification

pub mod info;
pub mod load;
pub mod location;
pub mod metadata;
pub mod newline;
pub mod save;

pub use info::{FileInfo, FileType};
pub use load::{DEFAULT_CANDIDATES, DocumentLoader, LoadProgress, LoadedDocument, LoaderConfig};
pub use location::{
    AccessError, Credentials, LocalFile, LocalFileConfig, LocalReplace, Location, MountOperation,
    ReplaceStream, StreamLocation, Unwritable,
};
pub use metadata::{ENCODING_KEY, MemoryMetadata, MetadataStore};
pub use newline::NewlineType;
pub use save::{DocumentSaver, SaveFlags, SaveProgress, SavedDocument, SaverConfig};
