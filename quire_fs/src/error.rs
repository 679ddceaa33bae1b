//! Error taxonomy shared by the loader, the saver and the streaming pipeline.

use std::io;

use thiserror::Error;

/// Errors that cross the loader/saver boundary.
///
/// Conditions handled inside the pipeline (illegal or incomplete sequences,
/// rejected detection candidates) never surface here; they become fallback
/// escapes or move detection on to the next candidate.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The conversion backend cannot handle this charset pair.
    #[error("conversion from {from} to {to} is not supported")]
    UnsupportedConversion { from: String, to: String },

    /// Non-empty, non-UTF-8 input and no candidate encodings at all.
    #[error("unable to detect the character encoding")]
    EncodingAutoDetectionFailed,

    /// Informational: some bytes were rendered as `\XX` escapes.
    #[error("{count} byte(s) could not be decoded and were escaped")]
    ConversionFallback { count: usize },

    /// The document still carries invalid-span tags from a lossy load.
    #[error("the document contains invalid characters")]
    ContainsInvalidCharacters,

    /// A character has no representation in the target charset.
    #[error("character {character:?} cannot be represented in {charset}")]
    UnrepresentableCharacter {
        character: char,
        charset: &'static str,
    },

    /// Source is a directory or special file.
    #[error("not a regular file")]
    NotRegularFile,

    /// The enclosing volume is still not mounted after one mount attempt.
    #[error("the enclosing volume is not mounted")]
    NotMounted,

    /// The mount collaborator failed.
    #[error("mounting the enclosing volume failed: {0}")]
    MountFailed(#[source] io::Error),

    /// The destination changed on disk since the document was loaded.
    #[error("the file was modified externally")]
    ExternallyModified,

    /// The cumulative byte counter overflowed or exceeded the configured limit.
    #[error("file is too big")]
    TooBig,

    /// Held bytes remain when the decode stream is closed.
    #[error("incomplete UTF-8 sequence at end of input")]
    IncompleteFinalSequence,

    /// The backup copy of the destination could not be written.
    #[error("could not create a backup copy: {0}")]
    CantCreateBackup(#[source] io::Error),

    /// A loader or saver instance was started twice.
    #[error("a loader or saver can only be used once")]
    AlreadyUsed,

    /// Write on a decode stream that was already closed.
    #[error("stream is already closed")]
    Closed,

    /// The operation observed a cancellation request and stopped.
    #[error("operation was cancelled")]
    Cancelled,

    /// I/O error from the byte source or sink, unchanged.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DocumentError {
    /// True for the cooperative-cancellation outcome, which callers should
    /// not report as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DocumentError::Cancelled)
    }
}

/// Result type for document streaming operations
pub type DocumentResult<T> = Result<T, DocumentError>;
