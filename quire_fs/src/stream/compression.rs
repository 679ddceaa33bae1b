//! Transparent gzip handling for loads and saves.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::{GzDecoder, GzEncoder};

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Leading bytes [`CompressionType::sniff`] needs to see.
pub const SNIFF_LEN: usize = GZIP_MAGIC.len();

/// Content type reported for gzip data.
pub const GZIP_CONTENT_TYPE: &str = "application/x-gzip";

/// Compression applied to the stored bytes of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
}

impl CompressionType {
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            GZIP_CONTENT_TYPE | "application/gzip" => CompressionType::Gzip,
            _ => CompressionType::None,
        }
    }

    /// Guess from leading bytes.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(&GZIP_MAGIC) {
            CompressionType::Gzip
        } else {
            CompressionType::None
        }
    }

    /// Guess from a `.gz` extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => CompressionType::Gzip,
            _ => CompressionType::None,
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionType::None => write!(f, "none"),
            CompressionType::Gzip => write!(f, "gzip"),
        }
    }
}

/// Incremental gzip decompressor: chunks in, decompressed bytes out.
pub struct Decompressor {
    inner: GzDecoder<Vec<u8>>,
}

impl Decompressor {
    pub fn new() -> Self {
        Decompressor {
            inner: GzDecoder::new(Vec::new()),
        }
    }

    pub fn decompress(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        self.inner.write_all(chunk)?;
        Ok(std::mem::take(self.inner.get_mut()))
    }

    /// Remaining output once the compressed stream has ended.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        self.inner.finish()
    }
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Incremental gzip compressor.
pub struct Compressor {
    inner: GzEncoder<Vec<u8>>,
}

impl Compressor {
    pub fn new() -> Self {
        Compressor {
            inner: GzEncoder::new(Vec::new(), Compression::default()),
        }
    }

    pub fn compress(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        self.inner.write_all(chunk)?;
        Ok(std::mem::take(self.inner.get_mut()))
    }

    /// Write the gzip trailer and return the remaining output.
    pub fn finish(self) -> io::Result<Vec<u8>> {
        self.inner.finish()
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection() {
        assert_eq!(CompressionType::sniff(&[0x1F, 0x8B, 0x08]), CompressionType::Gzip);
        assert_eq!(CompressionType::sniff(b"plain"), CompressionType::None);
        assert_eq!(
            CompressionType::from_content_type("application/x-gzip"),
            CompressionType::Gzip
        );
        assert_eq!(CompressionType::from_content_type("text/plain"), CompressionType::None);
        assert_eq!(CompressionType::from_path(Path::new("a.txt.GZ")), CompressionType::Gzip);
        assert_eq!(CompressionType::from_path(Path::new("a.txt")), CompressionType::None);
    }

    #[test]
    fn test_chunked_round_trip() {
        let text = "streamed through gzip\n".repeat(200);

        let mut compressor = Compressor::new();
        let mut packed = Vec::new();
        for chunk in text.as_bytes().chunks(100) {
            packed.extend(compressor.compress(chunk).expect("compress"));
        }
        packed.extend(compressor.finish().expect("finish"));
        assert_eq!(CompressionType::sniff(&packed), CompressionType::Gzip);

        let mut decompressor = Decompressor::new();
        let mut unpacked = Vec::new();
        for chunk in packed.chunks(7) {
            unpacked.extend(decompressor.decompress(chunk).expect("decompress"));
        }
        unpacked.extend(decompressor.finish().expect("finish"));
        assert_eq!(unpacked, text.as_bytes());
    }
}
