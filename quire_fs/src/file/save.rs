//! Chunked, cancellable saving of a text source with atomic replace.

use std::io::{self, Read};
use std::time::SystemTime;

use tokio::sync::watch;

use super::info::FileInfo;
use super::load::{LoadedDocument, mount};
use super::location::{AccessError, Location, MountOperation, ReplaceStream};
use super::newline::NewlineType;
use crate::cancel::Cancellable;
use crate::document::TextSource;
use crate::encoding::{self, Encoding};
use crate::error::{DocumentError, DocumentResult};
use crate::stream::compression::CompressionType;
use crate::stream::encode::{DocumentInputStream, EncodeStream};

/// Configuration for saving
#[derive(Debug, Clone)]
pub struct SaverConfig {
    /// Target charset (default: UTF-8)
    pub encoding: &'static Encoding,
    pub newline: NewlineType,
    pub compression: CompressionType,
    /// Terminate the last line (default: true)
    pub ensure_trailing_newline: bool,
    /// Keep a copy of the previous content (default: false)
    pub create_backup_copy: bool,
    /// Bytes of text read per step (default: 8KB)
    pub chunk_size: usize,
}

impl Default for SaverConfig {
    fn default() -> Self {
        SaverConfig {
            encoding: encoding::utf8(),
            newline: NewlineType::default(),
            compression: CompressionType::None,
            ensure_trailing_newline: true,
            create_backup_copy: false,
            chunk_size: 8 * 1024,
        }
    }
}

impl SaverConfig {
    /// Save back the way a document was loaded.
    pub fn from_loaded(loaded: &LoadedDocument) -> Self {
        SaverConfig {
            encoding: loaded.encoding,
            newline: loaded.newline,
            compression: loaded.compression,
            ..SaverConfig::default()
        }
    }
}

/// Per-save switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveFlags {
    /// Overwrite even if the destination changed since it was loaded
    pub ignore_mtime: bool,
    /// Never write a backup copy
    pub ignore_backup: bool,
    /// Leave an existing backup untouched
    pub preserve_backup: bool,
    /// Save documents that still carry escaped bytes
    pub ignore_invalid_chars: bool,
}

/// Sampled progress of a running save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveProgress {
    pub bytes_written: u64,
    /// Text size of the source, an estimate of the output
    pub total: u64,
}

/// Outcome of a successful save.
#[derive(Debug, Clone)]
pub struct SavedDocument {
    pub bytes_written: u64,
    /// Destination info queried after the replace
    pub info: FileInfo,
}

/// Single-use saver for one location.
pub struct DocumentSaver<L: Location> {
    location: L,
    config: SaverConfig,
    flags: SaveFlags,
    old_mtime: Option<SystemTime>,
    mount_operation: Option<Box<dyn MountOperation>>,
    mount_attempted: bool,
    cancellable: Cancellable,
    progress: watch::Sender<SaveProgress>,
    used: bool,
}

impl<L: Location> DocumentSaver<L> {
    pub fn new(location: L, config: SaverConfig) -> Self {
        let (progress, _) = watch::channel(SaveProgress::default());
        DocumentSaver {
            location,
            config,
            flags: SaveFlags::default(),
            old_mtime: None,
            mount_operation: None,
            mount_attempted: false,
            cancellable: Cancellable::new(),
            progress,
            used: false,
        }
    }

    pub fn with_flags(mut self, flags: SaveFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Modification time recorded when the document was loaded.
    pub fn with_old_mtime(mut self, mtime: Option<SystemTime>) -> Self {
        self.old_mtime = mtime;
        self
    }

    pub fn with_mount_operation(mut self, operation: impl MountOperation + 'static) -> Self {
        self.mount_operation = Some(Box::new(operation));
        self
    }

    /// Share `cancellable` with other operations instead of a private token.
    pub fn with_cancellable(mut self, cancellable: Cancellable) -> Self {
        self.cancellable = cancellable;
        self
    }

    pub fn cancellable(&self) -> Cancellable {
        self.cancellable.clone()
    }

    pub fn progress(&self) -> watch::Receiver<SaveProgress> {
        self.progress.subscribe()
    }

    pub fn location(&self) -> &L {
        &self.location
    }

    /// Encode `source` and atomically replace the destination with it.
    ///
    /// Any failure after the destination was opened discards the temporary
    /// content, leaving the previous file intact.
    pub async fn save<T: TextSource + ?Sized>(&mut self, source: &T) -> DocumentResult<SavedDocument> {
        if self.used {
            return Err(DocumentError::AlreadyUsed);
        }
        self.used = true;

        if source.has_invalid_chars() && !self.flags.ignore_invalid_chars {
            return Err(DocumentError::ContainsInvalidCharacters);
        }

        self.cancellable.check()?;
        self.check_modification().await?;

        let mut encoder = EncodeStream::new(self.config.encoding, self.config.compression)?;
        let make_backup = self.make_backup();

        self.cancellable.check()?;
        let mut writer = self.open_writer(make_backup).await?;

        let bytes_written = match self.write_document(source, &mut encoder, &mut writer).await {
            Ok(bytes) => bytes,
            Err(err) => {
                if let Err(close_err) = writer.close(true).await {
                    tracing::warn!(error = %close_err, "discarding partial save failed");
                }
                return Err(err);
            }
        };
        writer.close(false).await?;

        let info = self.location.query_info().await?;
        tracing::info!(
            location = %self.location.display_name(),
            encoding = self.config.encoding.charset(),
            newline = %self.config.newline,
            compression = %self.config.compression,
            bytes = bytes_written,
            "document saved"
        );
        Ok(SavedDocument { bytes_written, info })
    }

    fn make_backup(&self) -> bool {
        self.config.create_backup_copy && !self.flags.ignore_backup && !self.flags.preserve_backup
    }

    /// Fail if the destination changed since it was loaded. A destination
    /// that does not exist yet passes.
    async fn check_modification(&mut self) -> DocumentResult<()> {
        if self.flags.ignore_mtime {
            return Ok(());
        }

        let info = match self.location.query_info().await {
            Err(AccessError::NotMounted) => {
                self.recover_mount().await?;
                self.location.query_info().await
            }
            other => other,
        };

        match info {
            Ok(info) if !info.is_regular() => Err(DocumentError::NotRegularFile),
            Ok(info) if info.is_modified_since(self.old_mtime) => Err(DocumentError::ExternallyModified),
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn open_writer(&mut self, make_backup: bool) -> DocumentResult<L::Writer> {
        match self.location.replace(make_backup).await {
            Err(AccessError::NotMounted) => {
                self.recover_mount().await?;
                self.cancellable.check()?;
                Ok(self.location.replace(make_backup).await?)
            }
            other => Ok(other?),
        }
    }

    /// One mount per save; a second request means the volume stays away.
    async fn recover_mount(&mut self) -> DocumentResult<()> {
        if self.mount_attempted {
            return Err(DocumentError::NotMounted);
        }
        self.mount_attempted = true;
        mount(&mut self.location, self.mount_operation.as_mut()).await
    }

    async fn write_document<T: TextSource + ?Sized>(
        &self,
        source: &T,
        encoder: &mut EncodeStream,
        writer: &mut L::Writer,
    ) -> DocumentResult<u64> {
        let mut input = DocumentInputStream::new(source, self.config.newline, self.config.ensure_trailing_newline);
        let total = input.total_size();
        let mut chunk = vec![0u8; self.config.chunk_size.max(1)];
        let mut encoded = Vec::new();

        loop {
            self.cancellable.check()?;
            let n = input.read(&mut chunk)?;

            encoded.clear();
            if n == 0 {
                encoder.finish(&mut encoded)?;
            } else {
                encoder.encode(&chunk[..n], &mut encoded)?;
            }
            write_fully(writer, &encoded).await?;

            self.progress.send_replace(SaveProgress {
                bytes_written: encoder.bytes_produced(),
                total,
            });
            tracing::debug!(chunk = n, written = encoder.bytes_produced(), "chunk written");

            if n == 0 {
                break;
            }
        }

        self.cancellable.check()?;
        Ok(encoder.bytes_produced())
    }
}

/// Write all of `bytes`, looping over partial writes.
async fn write_fully<W: ReplaceStream>(writer: &mut W, mut bytes: &[u8]) -> DocumentResult<()> {
    while !bytes.is_empty() {
        let n = writer.write(bytes).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "destination accepted no bytes").into());
        }
        bytes = &bytes[n..];
    }
    Ok(())
}
