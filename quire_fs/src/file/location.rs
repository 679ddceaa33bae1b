//! Byte sources and destinations the loader and saver drive.
//!
//! A [`Location`] opens streams for reading and for atomic replacement.
//! [`LocalFile`] is the filesystem implementation and [`StreamLocation`]
//! adapts an already-open reader.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use super::info::FileInfo;
use crate::error::DocumentError;
use crate::stream::compression::{CompressionType, GZIP_CONTENT_TYPE};

/// Errors reported by a location.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The enclosing volume must be mounted first.
    #[error("the enclosing volume is not mounted")]
    NotMounted,

    #[error("could not create a backup copy: {0}")]
    Backup(#[source] io::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AccessError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AccessError::Io(err) if err.kind() == io::ErrorKind::NotFound)
    }
}

impl From<AccessError> for DocumentError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::NotMounted => DocumentError::NotMounted,
            AccessError::Backup(err) => DocumentError::CantCreateBackup(err),
            AccessError::Io(err) => DocumentError::Io(err),
        }
    }
}

/// Credentials handed to a mount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: String,
}

/// Interactive collaborator consulted while mounting a volume.
pub trait MountOperation {
    /// Ask for credentials for `location`. `None` aborts the mount.
    fn ask_password(&mut self, location: &str, message: &str) -> Option<Credentials>;
}

/// A place documents are read from and written to.
#[allow(async_fn_in_trait)]
pub trait Location {
    type Reader: AsyncRead + Unpin;
    type Writer: ReplaceStream;

    /// Name used in log output.
    fn display_name(&self) -> String;

    async fn query_info(&self) -> Result<FileInfo, AccessError>;

    async fn open_read(&mut self) -> Result<Self::Reader, AccessError>;

    /// Open for atomic replace-on-close, optionally keeping a backup of the
    /// current content.
    async fn replace(&mut self, make_backup: bool) -> Result<Self::Writer, AccessError>;

    /// Mount the volume holding this location.
    async fn mount_enclosing_volume(
        &mut self,
        operation: Option<&mut (dyn MountOperation + '_)>,
    ) -> io::Result<()> {
        let _ = operation;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "location has no mountable volume",
        ))
    }
}

/// Destination stream with replace-on-close semantics.
#[allow(async_fn_in_trait)]
pub trait ReplaceStream {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Commit the new content, or with `cancelled` discard it and leave the
    /// destination as it was.
    async fn close(self, cancelled: bool) -> io::Result<()>;
}

/// Options for local file replacement.
#[derive(Debug, Clone)]
pub struct LocalFileConfig {
    /// Suffix of the temporary file written next to the destination
    pub temp_suffix: String,
    /// Suffix of the backup copy
    pub backup_suffix: String,
    /// Whether the destination's permissions carry over to the new file
    pub preserve_permissions: bool,
}

impl Default for LocalFileConfig {
    fn default() -> Self {
        LocalFileConfig {
            temp_suffix: ".tmp".to_string(),
            backup_suffix: "~".to_string(),
            preserve_permissions: true,
        }
    }
}

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    config: LocalFileConfig,
}

impl LocalFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_config(path, LocalFileConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(path: P, config: LocalFileConfig) -> Self {
        LocalFile {
            path: path.as_ref().to_path_buf(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        sibling_path(&self.path, &self.config.backup_suffix)
    }

    async fn guess_content_type(&self) -> String {
        if CompressionType::from_path(&self.path) == CompressionType::Gzip {
            return GZIP_CONTENT_TYPE.to_string();
        }

        let mut magic = [0u8; 2];
        let sniffed = match File::open(&self.path).await {
            Ok(mut file) => file.read_exact(&mut magic).await.is_ok(),
            Err(_) => false,
        };
        if sniffed && CompressionType::sniff(&magic) == CompressionType::Gzip {
            GZIP_CONTENT_TYPE.to_string()
        } else {
            "text/plain".to_string()
        }
    }
}

impl Location for LocalFile {
    type Reader = File;
    type Writer = LocalReplace;

    fn display_name(&self) -> String {
        self.path.display().to_string()
    }

    async fn query_info(&self) -> Result<FileInfo, AccessError> {
        let metadata = fs::metadata(&self.path).await?;
        let mut info = FileInfo::from_metadata(&metadata);
        if info.is_regular() {
            info.content_type = Some(self.guess_content_type().await);
        }
        Ok(info)
    }

    async fn open_read(&mut self) -> Result<Self::Reader, AccessError> {
        Ok(File::open(&self.path).await?)
    }

    async fn replace(&mut self, make_backup: bool) -> Result<Self::Writer, AccessError> {
        if make_backup && fs::try_exists(&self.path).await? {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup).await.map_err(AccessError::Backup)?;
            tracing::debug!(backup = %backup.display(), "backup copy written");
        }

        let (file, temp) = create_temp(&self.path, &self.config.temp_suffix).await?;

        Ok(LocalReplace {
            file: Some(file),
            temp,
            target: self.path.clone(),
            preserve_permissions: self.config.preserve_permissions,
        })
    }

    async fn mount_enclosing_volume(
        &mut self,
        _operation: Option<&mut (dyn MountOperation + '_)>,
    ) -> io::Result<()> {
        // Local paths are always reachable.
        Ok(())
    }
}

/// Temporary file that becomes the destination on a successful close.
#[derive(Debug)]
pub struct LocalReplace {
    file: Option<File>,
    temp: PathBuf,
    target: PathBuf,
    preserve_permissions: bool,
}

impl LocalReplace {
    async fn commit(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        if self.preserve_permissions {
            if let Ok(metadata) = fs::metadata(&self.target).await {
                fs::set_permissions(&self.temp, metadata.permissions()).await?;
            }
        }

        fs::rename(&self.temp, &self.target).await
    }

    async fn discard(&mut self) {
        self.file.take();
        if let Err(err) = fs::remove_file(&self.temp).await {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.temp.display(), error = %err, "could not remove temporary file");
            }
        }
    }
}

impl ReplaceStream for LocalReplace {
    async fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.write(bytes).await,
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream is closed")),
        }
    }

    async fn close(mut self, cancelled: bool) -> io::Result<()> {
        if cancelled {
            self.discard().await;
            return Ok(());
        }

        let result = self.commit().await;
        if result.is_err() {
            self.discard().await;
        }
        result
    }
}

impl Drop for LocalReplace {
    fn drop(&mut self) {
        // Dropped without close: never let the temporary file linger.
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// Read-only location over an already-open stream.
///
/// Its info carries no content type, so the loader sniffs compression from
/// the first bytes.
pub struct StreamLocation<R> {
    reader: Option<R>,
    name: String,
}

impl<R: AsyncRead + Unpin> StreamLocation<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        StreamLocation {
            reader: Some(reader),
            name: name.into(),
        }
    }
}

/// Writer type of locations that cannot be written.
#[derive(Debug)]
pub enum Unwritable {}

impl ReplaceStream for Unwritable {
    async fn write(&mut self, _bytes: &[u8]) -> io::Result<usize> {
        match *self {}
    }

    async fn close(self, _cancelled: bool) -> io::Result<()> {
        match self {}
    }
}

impl<R: AsyncRead + Unpin> Location for StreamLocation<R> {
    type Reader = R;
    type Writer = Unwritable;

    fn display_name(&self) -> String {
        self.name.clone()
    }

    async fn query_info(&self) -> Result<FileInfo, AccessError> {
        Ok(FileInfo::for_stream())
    }

    async fn open_read(&mut self) -> Result<Self::Reader, AccessError> {
        self.reader.take().ok_or_else(|| {
            AccessError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream was already consumed",
            ))
        })
    }

    async fn replace(&mut self, _make_backup: bool) -> Result<Self::Writer, AccessError> {
        Err(AccessError::Io(io::Error::new(
            io::ErrorKind::Unsupported,
            "streams cannot be written",
        )))
    }
}

/// Attempts at finding an unused temporary name before giving up.
const MAX_TEMP_ATTEMPTS: u32 = 64;

/// Create a fresh `<name>.<pid>-<n><suffix>` next to `target`.
///
/// Existing files are never opened, so a user's own `<name>.tmp` survives.
async fn create_temp(target: &Path, suffix: &str) -> io::Result<(File, PathBuf)> {
    let pid = std::process::id();
    for attempt in 0..MAX_TEMP_ATTEMPTS {
        let temp = sibling_path(target, &format!(".{}-{}{}", pid, attempt, suffix));
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .await
        {
            Ok(file) => return Ok((file, temp)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free temporary name next to {}", target.display()),
    ))
}

/// `<name><suffix>` next to `original`.
fn sibling_path(original: &Path, suffix: &str) -> PathBuf {
    let mut path = original.to_path_buf();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    path.set_file_name(format!("{}{}", name, suffix));
    path
}
