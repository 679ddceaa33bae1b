//! Decode pipeline: raw byte chunks in, validated UTF-8 text out.
//!
//! The stream picks an encoding from a ranked candidate list on the first
//! [`DETECTION_SAMPLE_SIZE`] bytes, converts every chunk with it and
//! validates the result before anything reaches the sink. Bytes that cannot
//! be decoded are rendered as `\XX` and tagged invalid in the sink.
//!
//! Up to one incomplete multi-byte sequence or one trailing `\r` is held back
//! between chunks, so splitting the input at any offset yields the same text.

use std::borrow::Cow;
use std::mem;

use crate::document::TextSink;
use crate::encoding::utf8::{MAX_UNICHAR_LEN, Utf8Fault, is_valid_utf8, split_valid};
use crate::encoding::{self, ConversionStatus, Converter, Encoding};
use crate::error::{DocumentError, DocumentResult};
use crate::file::newline::{NewlineType, classify_first_line};

/// Number of leading bytes encoding detection looks at.
pub const DETECTION_SAMPLE_SIZE: usize = 8192;

/// Final outcome of a decode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    pub encoding: &'static Encoding,
    pub newline: NewlineType,
    pub fallbacks: usize,
}

enum State {
    /// Collecting the detection sample.
    Sampling(Vec<u8>),
    /// Input is UTF-8; validate only.
    Utf8,
    Converting(Converter),
}

/// Writes validated text into the sink and tracks escapes.
struct Insertion<'a, S: TextSink> {
    sink: &'a mut S,
    /// Incomplete UTF-8 tail or a held `\r`; never both.
    pending: Vec<u8>,
    cursor: usize,
    fallbacks: usize,
    error_offset: Option<usize>,
}

impl<S: TextSink> Insertion<'_, S> {
    fn validate_and_insert(&mut self, text: &[u8], hold_cr: bool) {
        if text.is_empty() && (self.pending.is_empty() || hold_cr) {
            return;
        }

        let joined: Cow<'_, [u8]> = if self.pending.is_empty() {
            Cow::Borrowed(text)
        } else {
            let mut joined = mem::take(&mut self.pending);
            joined.extend_from_slice(text);
            Cow::Owned(joined)
        };

        let mut rest: &[u8] = &joined;
        while !rest.is_empty() {
            let (valid, fault) = split_valid(rest);
            match fault {
                None => {
                    match valid.strip_suffix('\r') {
                        Some(head) if hold_cr => {
                            self.insert_text(head);
                            self.pending.push(b'\r');
                        }
                        _ => self.insert_text(valid),
                    }
                    break;
                }
                Some(Utf8Fault::Incomplete) => {
                    self.insert_text(valid);
                    self.pending.extend_from_slice(&rest[valid.len()..]);
                    break;
                }
                Some(Utf8Fault::Invalid(len)) => {
                    self.insert_text(valid);
                    let bad_end = valid.len() + len;
                    for &byte in &rest[valid.len()..bad_end] {
                        self.insert_fallback(byte);
                    }
                    rest = &rest[bad_end..];
                }
            }
        }
    }

    fn insert_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.apply_error_tag();
        self.sink.insert(self.cursor, text);
        self.cursor += text.chars().count();
    }

    fn insert_fallback(&mut self, byte: u8) {
        if self.error_offset.is_none() {
            self.error_offset = Some(self.cursor);
        }
        let escaped = format!("\\{:02X}", byte);
        self.sink.insert(self.cursor, &escaped);
        self.cursor += escaped.len();
        self.fallbacks += 1;
    }

    fn apply_error_tag(&mut self) {
        if let Some(start) = self.error_offset.take() {
            if self.cursor > start {
                self.sink.mark_invalid(start..self.cursor);
            }
        }
    }

    /// End of stream: a held `\r` is real text, anything else held is an
    /// incomplete sequence that will never complete.
    fn drain_pending(&mut self) {
        let pending = mem::take(&mut self.pending);
        if pending == b"\r" {
            self.insert_text("\r");
        } else {
            for byte in pending {
                self.insert_fallback(byte);
            }
        }
        self.apply_error_tag();
    }

    fn remove_ending_newline(&mut self) {
        let len = self.sink.len_chars();
        let last = len.checked_sub(1).and_then(|i| self.sink.char_at(i));
        let start = match last {
            Some('\n') if len >= 2 && self.sink.char_at(len - 2) == Some('\r') => len - 2,
            Some('\n') | Some('\r') => len - 1,
            _ => return,
        };
        self.sink.delete(start..len);
        self.cursor = self.cursor.min(start);
    }
}

/// Per-load decode session. Single use: create, `write` chunks, `flush`,
/// then `close`.
pub struct DecodeStream<'a, S: TextSink> {
    out: Insertion<'a, S>,
    state: State,
    candidates: Vec<&'static Encoding>,
    encoding: Option<&'static Encoding>,
    newline: NewlineType,
    ensure_trailing_newline: bool,
    flushed: bool,
    closed: bool,
}

impl<'a, S: TextSink> DecodeStream<'a, S> {
    /// Start a session writing into `sink`, which is cleared first.
    ///
    /// The whole session runs inside one atomic edit of the sink.
    pub fn new(sink: &'a mut S, candidates: Vec<&'static Encoding>, ensure_trailing_newline: bool) -> Self {
        sink.begin_atomic_edit();
        let len = sink.len_chars();
        if len > 0 {
            sink.delete(0..len);
        }

        DecodeStream {
            out: Insertion {
                sink,
                pending: Vec::new(),
                cursor: 0,
                fallbacks: 0,
                error_offset: None,
            },
            state: State::Sampling(Vec::new()),
            candidates,
            encoding: None,
            newline: NewlineType::default(),
            ensure_trailing_newline,
            flushed: false,
            closed: false,
        }
    }

    /// Feed the next chunk of raw bytes.
    pub fn write(&mut self, chunk: &[u8]) -> DocumentResult<()> {
        if self.closed || self.flushed {
            return Err(DocumentError::Closed);
        }
        if chunk.is_empty() {
            return Ok(());
        }

        let trivial = self.detection_is_trivial();
        if let State::Sampling(sample) = &mut self.state {
            sample.extend_from_slice(chunk);
            if !trivial && sample.len() < DETECTION_SAMPLE_SIZE {
                return Ok(());
            }
            let data = mem::take(sample);
            self.detect(&data, false)?;
            self.process(&data, false);
            return Ok(());
        }

        self.process(chunk, false);
        Ok(())
    }

    /// Signal end of input: drain the converter and the held bytes, close
    /// any open invalid span and classify the newline style.
    pub fn flush(&mut self) -> DocumentResult<()> {
        if self.closed {
            return Err(DocumentError::Closed);
        }
        if self.flushed {
            return Ok(());
        }

        if let State::Sampling(sample) = &mut self.state {
            let data = mem::take(sample);
            self.detect(&data, true)?;
            self.process(&data, false);
        }
        self.process(&[], true);
        self.out.drain_pending();

        self.newline = classify_first_line(&self.out.sink.first_line());
        self.flushed = true;

        if self.out.fallbacks > 0 {
            tracing::warn!(
                charset = self.guessed_encoding().charset(),
                fallbacks = self.out.fallbacks,
                "undecodable bytes were escaped"
            );
        }
        Ok(())
    }

    /// Finish the session.
    ///
    /// Trims one trailing newline when `ensure_trailing_newline` is set and
    /// ends the atomic edit. Fails with `IncompleteFinalSequence` when bytes
    /// are still held, i.e. `flush` was not called.
    pub fn close(mut self) -> DocumentResult<DecodeSummary> {
        let incomplete = !self.out.pending.is_empty()
            || matches!(&self.state, State::Sampling(sample) if !sample.is_empty());

        if self.ensure_trailing_newline {
            self.out.remove_ending_newline();
        }
        self.end_edit();

        if incomplete {
            return Err(DocumentError::IncompleteFinalSequence);
        }
        Ok(DecodeSummary {
            encoding: self.guessed_encoding(),
            newline: self.newline,
            fallbacks: self.out.fallbacks,
        })
    }

    /// Encoding in use; UTF-8 until detection has run.
    pub fn guessed_encoding(&self) -> &'static Encoding {
        self.encoding.unwrap_or_else(encoding::utf8)
    }

    /// Newline style, known after `flush`.
    pub fn newline_type(&self) -> NewlineType {
        self.newline
    }

    pub fn fallback_count(&self) -> usize {
        self.out.fallbacks
    }

    pub fn is_utf8(&self) -> bool {
        matches!(self.state, State::Utf8)
    }

    fn detection_is_trivial(&self) -> bool {
        self.candidates.len() == 1
    }

    fn detect(&mut self, sample: &[u8], complete: bool) -> DocumentResult<()> {
        if sample.is_empty() {
            return self.pin(encoding::utf8());
        }

        let first = match self.candidates.first() {
            Some(&first) => first,
            None => return Err(DocumentError::EncodingAutoDetectionFailed),
        };
        if self.detection_is_trivial() {
            return self.pin(first);
        }

        let sample = &sample[..sample.len().min(DETECTION_SAMPLE_SIZE)];
        match self
            .candidates
            .iter()
            .copied()
            .find(|&candidate| accepts(candidate, sample, complete))
        {
            Some(encoding) => self.pin(encoding),
            None => {
                tracing::debug!(
                    charset = first.charset(),
                    "no candidate decoded the sample cleanly, using the first"
                );
                self.pin(first)
            }
        }
    }

    fn pin(&mut self, encoding: &'static Encoding) -> DocumentResult<()> {
        self.state = if encoding.is_utf8() {
            State::Utf8
        } else {
            State::Converting(Converter::new(encoding, encoding::utf8())?)
        };
        self.encoding = Some(encoding);
        tracing::debug!(charset = encoding.charset(), "encoding selected");
        Ok(())
    }

    fn process(&mut self, bytes: &[u8], last: bool) {
        match &mut self.state {
            State::Utf8 => self.out.validate_and_insert(bytes, !last),
            State::Converting(converter) => convert_into(converter, &mut self.out, bytes, last),
            State::Sampling(_) => {}
        }
    }

    fn end_edit(&mut self) {
        if !self.closed {
            self.closed = true;
            self.out.sink.end_atomic_edit();
        }
    }
}

impl<S: TextSink> Drop for DecodeStream<'_, S> {
    fn drop(&mut self) {
        self.end_edit();
    }
}

fn convert_into<S: TextSink>(converter: &mut Converter, out: &mut Insertion<'_, S>, input: &[u8], last: bool) {
    let mut input = input;
    let mut text = Vec::with_capacity(input.len() * 2);

    loop {
        let step = converter.convert(input, &mut text, last);
        input = &input[step.consumed..];

        match step.status {
            ConversionStatus::IllegalSequence(bytes) => {
                out.validate_and_insert(&text, false);
                text.clear();
                for byte in bytes {
                    out.insert_fallback(byte);
                }
            }
            ConversionStatus::Continue | ConversionStatus::Finished => {
                if input.is_empty() || (step.consumed == 0 && step.produced == 0) {
                    break;
                }
            }
            ConversionStatus::IncompleteSequence | ConversionStatus::Unmappable(_) => break,
        }
    }

    out.validate_and_insert(&text, !last);
}

/// Whether `candidate` decodes the detection sample cleanly.
///
/// A `complete` sample is the whole input and must decode in full; a
/// truncated one may end inside a multi-byte unit.
fn accepts(candidate: &'static Encoding, sample: &[u8], complete: bool) -> bool {
    if candidate.is_utf8() {
        return match split_valid(sample) {
            (_, None) => true,
            (valid, Some(_)) => !complete && sample.len() - valid.len() < MAX_UNICHAR_LEN,
        };
    }

    let Ok(mut converter) = Converter::new(candidate, encoding::utf8()) else {
        return false;
    };

    let mut output = Vec::with_capacity(sample.len() * 2);
    let mut input = sample;
    loop {
        let step = converter.convert(input, &mut output, complete);
        input = &input[step.consumed..];
        match step.status {
            ConversionStatus::IllegalSequence(_) | ConversionStatus::Unmappable(_) => return false,
            ConversionStatus::IncompleteSequence => break,
            ConversionStatus::Continue | ConversionStatus::Finished => {
                if input.is_empty() || step.consumed == 0 {
                    break;
                }
            }
        }
    }

    is_valid_utf8(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::encoding::lookup;

    fn enc(charset: &str) -> &'static Encoding {
        lookup(charset).expect("charset in catalog")
    }

    fn decode(chunks: &[&[u8]], candidates: Vec<&'static Encoding>, ensure: bool) -> (Document, DecodeSummary) {
        let mut doc = Document::new();
        let mut stream = DecodeStream::new(&mut doc, candidates, ensure);
        for chunk in chunks {
            stream.write(chunk).expect("write");
        }
        stream.flush().expect("flush");
        let summary = stream.close().expect("close");
        (doc, summary)
    }

    #[test]
    fn test_utf8_only_list_passes_bytes_through() {
        let (doc, summary) = decode(&[b"hello\nworld"], vec![encoding::utf8()], false);
        assert_eq!(doc.text(), "hello\nworld");
        assert!(summary.encoding.is_utf8());
        assert_eq!(summary.fallbacks, 0);
    }

    #[test]
    fn test_sink_is_cleared_and_edit_closed() {
        let mut doc = Document::from_text("stale");
        {
            let mut stream = DecodeStream::new(&mut doc, vec![encoding::utf8()], false);
            stream.write(b"fresh").expect("write");
            stream.flush().expect("flush");
            stream.close().expect("close");
        }
        assert_eq!(doc.text(), "fresh");
        assert!(!doc.in_atomic_edit());
    }

    #[test]
    fn test_drop_ends_atomic_edit() {
        let mut doc = Document::new();
        {
            let mut stream = DecodeStream::new(&mut doc, vec![encoding::utf8()], false);
            stream.write(b"partial").expect("write");
        }
        assert!(!doc.in_atomic_edit());
        assert_eq!(doc.text(), "partial");
    }

    #[test]
    fn test_incomplete_sequence_across_chunks() {
        let bytes = "a日b".as_bytes();
        let (doc, summary) = decode(&[&bytes[..2], &bytes[2..]], vec![encoding::utf8()], false);
        assert_eq!(doc.text(), "a日b");
        assert_eq!(summary.fallbacks, 0);
    }

    #[test]
    fn test_truncated_sequence_at_eof_is_escaped() {
        let bytes = "a日".as_bytes();
        let (doc, summary) = decode(&[&bytes[..3]], vec![encoding::utf8()], false);
        assert_eq!(doc.text(), "a\\E6\\97");
        assert_eq!(summary.fallbacks, 2);
        assert_eq!(doc.invalid_ranges(), &[1..7]);
    }

    #[test]
    fn test_nul_is_escaped() {
        let (doc, summary) = decode(&[b"a\0b"], vec![encoding::utf8()], false);
        assert_eq!(doc.text(), "a\\00b");
        assert_eq!(summary.fallbacks, 1);
    }

    #[test]
    fn test_held_cr_flushed_at_eof() {
        let (doc, summary) = decode(&[b"one\r"], vec![encoding::utf8()], false);
        assert_eq!(doc.text(), "one\r");
        assert_eq!(summary.newline, NewlineType::Cr);
    }

    #[test]
    fn test_close_without_flush_reports_held_bytes() {
        let mut doc = Document::new();
        let mut stream = DecodeStream::new(&mut doc, vec![encoding::utf8()], false);
        stream.write(b"abc\xE6").expect("write");
        let err = stream.close().unwrap_err();
        assert!(matches!(err, DocumentError::IncompleteFinalSequence));
    }

    #[test]
    fn test_write_after_flush_fails() {
        let mut doc = Document::new();
        let mut stream = DecodeStream::new(&mut doc, vec![encoding::utf8()], false);
        stream.flush().expect("flush");
        assert!(matches!(stream.write(b"x"), Err(DocumentError::Closed)));
    }

    #[test]
    fn test_empty_input_is_utf8() {
        let (doc, summary) = decode(&[], vec![enc("ISO-8859-15")], true);
        assert!(doc.is_empty());
        assert!(summary.encoding.is_utf8());
    }

    #[test]
    fn test_no_candidates_fails_detection() {
        let mut doc = Document::new();
        let mut stream = DecodeStream::new(&mut doc, Vec::new(), false);
        stream.write(b"data").expect("buffered");
        assert!(matches!(
            stream.flush(),
            Err(DocumentError::EncodingAutoDetectionFailed)
        ));
    }

    #[test]
    fn test_falls_back_to_first_candidate() {
        // NUL disqualifies every candidate
        let (doc, summary) = decode(&[b"a\0\xFF"], vec![encoding::utf8(), enc("ISO-8859-15")], false);
        assert!(summary.encoding.is_utf8());
        assert_eq!(doc.text(), "a\\00\\FF");
        assert_eq!(summary.fallbacks, 2);
    }

    #[test]
    fn test_truncated_sample_tolerates_split_tail() {
        let mut input = vec![b'a'; DETECTION_SAMPLE_SIZE - 1];
        input.extend_from_slice("é".as_bytes());
        let (doc, summary) = decode(&[&input], vec![encoding::utf8(), enc("ISO-8859-15")], false);
        assert!(summary.encoding.is_utf8());
        assert!(doc.text().ends_with('é'));
        assert_eq!(summary.fallbacks, 0);
    }

    #[test]
    fn test_forced_encoding_converts() {
        let (doc, summary) = decode(&[b"\xA4"], vec![enc("ISO-8859-15")], false);
        assert_eq!(doc.text(), "€");
        assert_eq!(summary.encoding.charset(), "ISO-8859-15");
    }

    #[test]
    fn test_utf16_detected_after_nul_rejection() {
        let bytes: Vec<u8> = "hi\n".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let candidates = vec![encoding::utf8(), enc("ISO-8859-15"), enc("UTF-16LE")];
        let (doc, summary) = decode(&[&bytes], candidates, true);
        assert_eq!(summary.encoding.charset(), "UTF-16LE");
        assert_eq!(doc.text(), "hi");
    }

    #[test]
    fn test_converter_illegal_byte_escaped() {
        // 0x82 followed by a non-trail byte is malformed in Shift_JIS
        let (doc, summary) = decode(&[b"a\x82\x20b"], vec![enc("SHIFT_JIS")], false);
        assert!(doc.text().starts_with("a\\82"));
        assert!(doc.text().ends_with('b'));
        assert_eq!(summary.fallbacks, 1);
        assert_eq!(doc.invalid_ranges()[0], 1..4);
    }

    #[test]
    fn test_trailing_newline_trimmed() {
        let (doc, _) = decode(&[b"a\r\n"], vec![encoding::utf8()], true);
        assert_eq!(doc.text(), "a");
        let (doc, _) = decode(&[b"a\n\n"], vec![encoding::utf8()], true);
        assert_eq!(doc.text(), "a\n");
    }

    #[test]
    fn test_newline_classified_before_trim() {
        let (_, summary) = decode(&[b"a\r\n"], vec![encoding::utf8()], true);
        assert_eq!(summary.newline, NewlineType::CrLf);
    }
}
