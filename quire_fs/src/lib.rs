//! # quire_fs - Document streaming for the quire editor
//!
//! Turns stored bytes into validated UTF-8 text and back: encoding detection
//! over a ranked candidate list, charset conversion, newline detection,
//! transparent gzip, `\XX` escapes for undecodable bytes, and atomic
//! cancellable saves.
//!
//! Modules:
//! - `encoding` for the charset registry and converters
//! - `stream` for the decode and encode pipelines
//! - `file` for locations and the chunked loader/saver

pub mod cancel;
pub mod document;
pub mod encoding;
pub mod error;
pub mod file;
pub mod stream;

pub use cancel::Cancellable;
pub use document::{Document, TextSink, TextSource};
pub use encoding::Encoding;
pub use error::{DocumentError, DocumentResult};
pub use file::{
    DocumentLoader, DocumentSaver, FileInfo, LoadedDocument, LoaderConfig, LocalFile, Location,
    NewlineType, SaveFlags, SavedDocument, SaverConfig, StreamLocation,
};
pub use stream::{CompressionType, DecodeStream, DocumentInputStream, EncodeStream};
