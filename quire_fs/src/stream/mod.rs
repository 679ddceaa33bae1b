//! Chunk-at-a-time byte/text conversion engines.

pub mod compression;
pub mod decode;
pub mod encode;

pub use compression::{CompressionType, Compressor, Decompressor};
pub use decode::{DETECTION_SAMPLE_SIZE, DecodeStream, DecodeSummary};
pub use encode::{DocumentInputStream, EncodeStream};
