//! Encode pipeline: document text out as bytes in the target charset,
//! newline style and compression.

use std::io::{self, Read};
use std::mem;

use super::compression::{CompressionType, Compressor};
use crate::document::TextSource;
use crate::encoding::{self, ConversionStatus, Converter, Encoding};
use crate::error::{DocumentError, DocumentResult};
use crate::file::newline::{NewlineType, strip_terminator};

/// Byte view over a [`TextSource`] that renders newlines on the fly.
///
/// Every `\n`, `\r\n` or `\r` terminator is written in the requested style.
/// With `ensure_trailing_newline` a non-empty document also gets a newline
/// after its last line. The stream only restarts from the beginning.
pub struct DocumentInputStream<'a, T: TextSource + ?Sized> {
    source: &'a T,
    newline: NewlineType,
    ensure_trailing_newline: bool,
    line: usize,
    buffer: Vec<u8>,
    offset: usize,
    position: u64,
}

impl<'a, T: TextSource + ?Sized> DocumentInputStream<'a, T> {
    pub fn new(source: &'a T, newline: NewlineType, ensure_trailing_newline: bool) -> Self {
        DocumentInputStream {
            source,
            newline,
            ensure_trailing_newline,
            line: 0,
            buffer: Vec::new(),
            offset: 0,
            position: 0,
        }
    }

    /// Bytes produced so far.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// Size estimate for progress reporting.
    pub fn total_size(&self) -> u64 {
        self.source.len_bytes() as u64
    }

    /// Start over from the first line.
    pub fn reset(&mut self) {
        self.line = 0;
        self.buffer.clear();
        self.offset = 0;
        self.position = 0;
    }

    /// Render the next line into the buffer. `false` once all lines are out.
    fn fill(&mut self) -> bool {
        self.buffer.clear();
        self.offset = 0;

        let lines = self.source.len_lines();
        if self.line >= lines {
            return false;
        }

        let text = self.source.line(self.line);
        let (content, terminated) = strip_terminator(&text);
        self.buffer.extend_from_slice(content.as_bytes());

        let is_last = self.line + 1 == lines;
        let add_final = is_last && self.ensure_trailing_newline && self.source.len_bytes() > 0;
        if terminated || add_final {
            self.buffer.extend_from_slice(self.newline.as_bytes());
        }

        self.line += 1;
        true
    }
}

impl<T: TextSource + ?Sized> Read for DocumentInputStream<'_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.offset == self.buffer.len() && !self.fill() {
                break;
            }
            let available = &self.buffer[self.offset..];
            let n = available.len().min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&available[..n]);
            self.offset += n;
            written += n;
        }

        self.position += written as u64;
        Ok(written)
    }
}

/// Per-save encode session: charset conversion then optional gzip.
pub struct EncodeStream {
    encoding: &'static Encoding,
    converter: Option<Converter>,
    compressor: Option<Compressor>,
    carry: Vec<u8>,
    produced: u64,
}

impl EncodeStream {
    /// No converter is opened when the target is UTF-8.
    pub fn new(encoding: &'static Encoding, compression: CompressionType) -> DocumentResult<Self> {
        let converter = if encoding.is_utf8() {
            None
        } else {
            Some(Converter::new(encoding::utf8(), encoding)?)
        };
        let compressor = match compression {
            CompressionType::Gzip => Some(Compressor::new()),
            CompressionType::None => None,
        };

        Ok(EncodeStream {
            encoding,
            converter,
            compressor,
            carry: Vec::new(),
            produced: 0,
        })
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Bytes handed out so far.
    pub fn bytes_produced(&self) -> u64 {
        self.produced
    }

    /// Encode a chunk of UTF-8 text, appending the output to `out`.
    ///
    /// A chunk may end inside a character; the partial bytes are carried to
    /// the next call.
    pub fn encode(&mut self, text: &[u8], out: &mut Vec<u8>) -> DocumentResult<()> {
        let converted = self.convert(text, false)?;
        self.emit(&converted, out)
    }

    /// Flush the converter and the compressor.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> DocumentResult<()> {
        let converted = self.convert(&[], true)?;
        self.emit(&converted, out)?;

        if let Some(compressor) = self.compressor.take() {
            let tail = compressor.finish()?;
            self.produced += tail.len() as u64;
            out.extend_from_slice(&tail);
        }
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8], out: &mut Vec<u8>) -> DocumentResult<()> {
        let start = out.len();
        match self.compressor.as_mut() {
            Some(compressor) => out.extend(compressor.compress(bytes)?),
            None => out.extend_from_slice(bytes),
        }
        self.produced += (out.len() - start) as u64;
        Ok(())
    }

    fn convert(&mut self, text: &[u8], last: bool) -> DocumentResult<Vec<u8>> {
        let Some(converter) = self.converter.as_mut() else {
            return Ok(text.to_vec());
        };

        let mut joined = mem::take(&mut self.carry);
        joined.extend_from_slice(text);

        let mut input: &[u8] = &joined;
        let mut encoded = Vec::with_capacity(input.len());
        loop {
            let step = converter.convert(input, &mut encoded, last);
            input = &input[step.consumed..];

            match step.status {
                ConversionStatus::Continue | ConversionStatus::Finished => {
                    if input.is_empty() || step.consumed == 0 {
                        break;
                    }
                }
                ConversionStatus::IncompleteSequence => {
                    self.carry = input.to_vec();
                    break;
                }
                ConversionStatus::Unmappable(character) => {
                    return Err(DocumentError::UnrepresentableCharacter {
                        character,
                        charset: self.encoding.charset(),
                    });
                }
                ConversionStatus::IllegalSequence(_) => {
                    return Err(DocumentError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "document text is not valid UTF-8",
                    )));
                }
            }
        }

        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::encoding::lookup;

    fn render(doc: &Document, newline: NewlineType, ensure: bool) -> Vec<u8> {
        let mut stream = DocumentInputStream::new(doc, newline, ensure);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).expect("read");
        out
    }

    #[test]
    fn test_render_crlf() {
        let doc = Document::from_text("line1\nline2");
        assert_eq!(render(&doc, NewlineType::CrLf, false), b"line1\r\nline2");
        assert_eq!(render(&doc, NewlineType::CrLf, true), b"line1\r\nline2\r\n");
    }

    #[test]
    fn test_render_mixed_terminators_normalized() {
        let doc = Document::from_text("a\r\nb\rc\n");
        assert_eq!(render(&doc, NewlineType::Lf, false), b"a\nb\nc\n");
        assert_eq!(render(&doc, NewlineType::Lf, true), b"a\nb\nc\n\n");
    }

    #[test]
    fn test_empty_document_gets_no_newline() {
        let doc = Document::new();
        assert!(render(&doc, NewlineType::Lf, true).is_empty());
    }

    #[test]
    fn test_small_reads_and_tell() {
        let doc = Document::from_text("abc\ndef");
        let mut stream = DocumentInputStream::new(&doc, NewlineType::CrLf, false);
        let mut buf = [0u8; 3];
        let mut out = Vec::new();
        loop {
            let n = stream.read(&mut buf).expect("read");
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abc\r\ndef");
        assert_eq!(stream.tell(), 8);
        assert_eq!(stream.total_size(), 7);

        stream.reset();
        assert_eq!(stream.tell(), 0);
        let mut again = Vec::new();
        stream.read_to_end(&mut again).expect("read");
        assert_eq!(again, out);
    }

    #[test]
    fn test_encode_carries_split_character() {
        let latin9 = lookup("ISO-8859-15").expect("latin9");
        let mut stream = EncodeStream::new(latin9, CompressionType::None).expect("stream");
        let bytes = "x€y".as_bytes();
        let mut out = Vec::new();
        stream.encode(&bytes[..2], &mut out).expect("encode");
        stream.encode(&bytes[2..], &mut out).expect("encode");
        stream.finish(&mut out).expect("finish");
        assert_eq!(out, vec![b'x', 0xA4, b'y']);
        assert_eq!(stream.bytes_produced(), 3);
    }

    #[test]
    fn test_encode_unrepresentable() {
        let latin1 = lookup("ISO-8859-1").expect("latin1");
        let mut stream = EncodeStream::new(latin1, CompressionType::None).expect("stream");
        let mut out = Vec::new();
        let err = stream.encode("price: €".as_bytes(), &mut out).unwrap_err();
        assert!(matches!(
            err,
            DocumentError::UnrepresentableCharacter { character: '€', charset: "ISO-8859-1" }
        ));
    }

    #[test]
    fn test_utf8_passthrough() {
        let mut stream = EncodeStream::new(encoding::utf8(), CompressionType::None).expect("stream");
        let mut out = Vec::new();
        stream.encode("héllo".as_bytes(), &mut out).expect("encode");
        stream.finish(&mut out).expect("finish");
        assert_eq!(out, "héllo".as_bytes());
    }
}
