//! Chunked, cancellable loading of a location into a text sink.

use tokio::io::AsyncReadExt;
use tokio::sync::watch;

use super::info::FileInfo;
use super::location::{AccessError, Location, MountOperation};
use super::metadata::{ENCODING_KEY, MetadataStore};
use super::newline::NewlineType;
use crate::cancel::Cancellable;
use crate::document::TextSink;
use crate::encoding::{self, Encoding};
use crate::error::{DocumentError, DocumentResult};
use crate::stream::compression::{CompressionType, Decompressor, SNIFF_LEN};
use crate::stream::decode::DecodeStream;

/// Candidate charsets tried when nothing else is configured.
pub const DEFAULT_CANDIDATES: [&str; 4] = ["UTF-8", encoding::CURRENT_LOCALE_TOKEN, "ISO-8859-15", "UTF-16"];

/// Configuration for loading
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Ranked encodings for auto-detection
    pub candidates: Vec<&'static Encoding>,
    /// Drop one trailing newline from the loaded text (default: true)
    pub ensure_trailing_newline: bool,
    /// Read size per step (default: 8KB)
    pub chunk_size: usize,
    /// Refuse sources larger than this many stored bytes
    pub max_size: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            candidates: encoding::resolve_candidates(&DEFAULT_CANDIDATES),
            ensure_trailing_newline: true,
            chunk_size: 8 * 1024,
            max_size: None,
        }
    }
}

/// Sampled progress of a running load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadProgress {
    pub bytes_read: u64,
    /// Stored size when the location reports one
    pub total: Option<u64>,
}

/// Outcome of a successful load.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub encoding: &'static Encoding,
    pub newline: NewlineType,
    pub compression: CompressionType,
    /// Stored bytes read from the location, before decompression
    pub bytes_read: u64,
    pub fallbacks: usize,
    pub info: FileInfo,
}

impl LoadedDocument {
    /// Non-fatal condition worth showing to the user.
    pub fn warning(&self) -> Option<DocumentError> {
        (self.fallbacks > 0).then_some(DocumentError::ConversionFallback {
            count: self.fallbacks,
        })
    }
}

/// Single-use loader for one location.
pub struct DocumentLoader<L: Location> {
    location: L,
    config: LoaderConfig,
    forced: Option<&'static Encoding>,
    metadata: Option<Box<dyn MetadataStore>>,
    mount_operation: Option<Box<dyn MountOperation>>,
    cancellable: Cancellable,
    progress: watch::Sender<LoadProgress>,
    used: bool,
}

impl<L: Location> DocumentLoader<L> {
    pub fn new(location: L, config: LoaderConfig) -> Self {
        let (progress, _) = watch::channel(LoadProgress::default());
        DocumentLoader {
            location,
            config,
            forced: None,
            metadata: None,
            mount_operation: None,
            cancellable: Cancellable::new(),
            progress,
            used: false,
        }
    }

    /// Skip detection and decode with `encoding`.
    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.forced = Some(encoding);
        self
    }

    /// Consult `store` for the charset of a previous load.
    pub fn with_metadata(mut self, store: impl MetadataStore + 'static) -> Self {
        self.metadata = Some(Box::new(store));
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

    /// Token that cancels this load.
    pub fn cancellable(&self) -> Cancellable {
        self.cancellable.clone()
    }

    /// Subscribe to progress updates.
    pub fn progress(&self) -> watch::Receiver<LoadProgress> {
        self.progress.subscribe()
    }

    pub fn location(&self) -> &L {
        &self.location
    }

    /// Load the location into `sink`, replacing its content.
    ///
    /// Text is inserted as chunks decode, so a failed load can leave partial
    /// content behind. A cancelled load returns [`DocumentError::Cancelled`].
    pub async fn load<S: TextSink>(&mut self, sink: &mut S) -> DocumentResult<LoadedDocument> {
        if self.used {
            return Err(DocumentError::AlreadyUsed);
        }
        self.used = true;

        let name = self.location.display_name();
        let candidates = self.candidates(&name);
        tracing::debug!(location = %name, candidates = candidates.len(), "starting load");

        self.cancellable.check()?;
        let mut reader = self.open_reader().await?;

        self.cancellable.check()?;
        let info = self.location.query_info().await?;
        if !info.is_regular() {
            return Err(DocumentError::NotRegularFile);
        }
        self.progress.send_replace(LoadProgress {
            bytes_read: 0,
            total: info.size,
        });

        let mut compression = info
            .content_type
            .as_deref()
            .map(CompressionType::from_content_type);
        let mut decompressor: Option<Decompressor> = None;
        let mut stream = DecodeStream::new(sink, candidates, self.config.ensure_trailing_newline);
        let mut buffer = vec![0u8; self.config.chunk_size.max(1)];
        // Bytes held back until enough are seen to sniff the compression.
        let mut prefix: Vec<u8> = Vec::new();
        let mut bytes_read: u64 = 0;

        loop {
            self.cancellable.check()?;
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            bytes_read = bytes_read
                .checked_add(n as u64)
                .ok_or(DocumentError::TooBig)?;
            if self.config.max_size.is_some_and(|max| bytes_read > max) {
                return Err(DocumentError::TooBig);
            }
            self.progress.send_replace(LoadProgress {
                bytes_read,
                total: info.size,
            });

            let chunk = &buffer[..n];
            match compression {
                Some(kind) => feed(kind, &mut decompressor, &mut stream, chunk)?,
                None => {
                    prefix.extend_from_slice(chunk);
                    if prefix.len() >= SNIFF_LEN {
                        let kind = CompressionType::sniff(&prefix);
                        compression = Some(kind);
                        feed(kind, &mut decompressor, &mut stream, &std::mem::take(&mut prefix))?;
                    }
                }
            }
            tracing::debug!(chunk = n, bytes_read, "chunk decoded");
        }

        self.cancellable.check()?;
        if compression.is_none() && !prefix.is_empty() {
            let kind = CompressionType::sniff(&prefix);
            compression = Some(kind);
            feed(kind, &mut decompressor, &mut stream, &prefix)?;
        }
        if let Some(decompressor) = decompressor.take() {
            stream.write(&decompressor.finish()?)?;
        }
        stream.flush()?;
        let summary = stream.close()?;

        let loaded = LoadedDocument {
            encoding: summary.encoding,
            newline: summary.newline,
            compression: compression.unwrap_or_default(),
            bytes_read,
            fallbacks: summary.fallbacks,
            info,
        };
        tracing::info!(
            location = %name,
            encoding = loaded.encoding.charset(),
            newline = %loaded.newline,
            compression = %loaded.compression,
            bytes = loaded.bytes_read,
            "document loaded"
        );
        Ok(loaded)
    }

    fn candidates(&self, name: &str) -> Vec<&'static Encoding> {
        if let Some(forced) = self.forced {
            return vec![forced];
        }

        let mut list = Vec::with_capacity(self.config.candidates.len() + 1);
        if let Some(charset) = self.metadata.as_ref().and_then(|m| m.get(name, ENCODING_KEY)) {
            match encoding::lookup(&charset) {
                Some(stored) => list.push(stored),
                None => tracing::warn!(charset = %charset, "ignoring unknown charset in metadata"),
            }
        }
        for &candidate in &self.config.candidates {
            encoding::push_unique(&mut list, candidate);
        }
        list
    }

    /// Open the location, mounting its volume once if required.
    async fn open_reader(&mut self) -> DocumentResult<L::Reader> {
        match self.location.open_read().await {
            Err(AccessError::NotMounted) => {
                mount(&mut self.location, self.mount_operation.as_mut()).await?;
                self.cancellable.check()?;
                Ok(self.location.open_read().await?)
            }
            other => Ok(other?),
        }
    }
}

/// Pass stored bytes to the decode stream, inflating them first when gzipped.
fn feed<S: TextSink>(
    kind: CompressionType,
    decompressor: &mut Option<Decompressor>,
    stream: &mut DecodeStream<'_, S>,
    bytes: &[u8],
) -> DocumentResult<()> {
    if kind == CompressionType::Gzip {
        let inflated = decompressor
            .get_or_insert_with(Decompressor::new)
            .decompress(bytes)?;
        stream.write(&inflated)
    } else {
        stream.write(bytes)
    }
}

/// Run the one-shot mount step shared by loads and saves.
pub(crate) async fn mount<L: Location>(
    location: &mut L,
    operation: Option<&mut Box<dyn MountOperation>>,
) -> DocumentResult<()> {
    tracing::debug!(location = %location.display_name(), "mounting enclosing volume");
    let operation: Option<&mut dyn MountOperation> = match operation {
        Some(operation) => Some(operation.as_mut()),
        None => None,
    };
    location
        .mount_enclosing_volume(operation)
        .await
        .map_err(DocumentError::MountFailed)
}
