//! Streaming conversion between one charset and UTF-8.

use encoding_rs::{DecoderResult, EncoderResult};

use super::{Codec, Encoding};
use crate::error::{DocumentError, DocumentResult};

/// Consumed input bytes remembered so that malformed sequences reported
/// after the decoder buffered them can still be escaped byte by byte.
const HISTORY_LEN: usize = 16;

/// Outcome of one [`Converter::convert`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionStatus {
    /// All input consumed; call again with more input.
    Continue,
    /// All input consumed and the converter is drained (`last` was set).
    Finished,
    /// These bytes cannot be decoded. They have been consumed; the caller
    /// escapes them and resumes with the rest of its input.
    IllegalSequence(Vec<u8>),
    /// The unconsumed tail is a valid prefix of a longer unit. The caller
    /// keeps it and prepends it to the next input.
    IncompleteSequence,
    /// Encode direction only: the target charset has no mapping for this
    /// character. It has been consumed.
    Unmappable(char),
}

/// How much one call consumed and produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    pub consumed: usize,
    pub produced: usize,
    pub status: ConversionStatus,
}

enum Engine {
    /// UTF-8 to UTF-8, validation only.
    Validate,
    DecodeLatin1,
    Decode {
        decoder: encoding_rs::Decoder,
        history: Vec<u8>,
    },
    EncodeLatin1,
    EncodeUtf16 {
        big_endian: bool,
        bom_pending: bool,
    },
    Encode(encoding_rs::Encoder),
}

/// A converter for one fixed (from, to) pair where one side is UTF-8.
pub struct Converter {
    from: &'static Encoding,
    to: &'static Encoding,
    engine: Engine,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("from", &self.from.charset())
            .field("to", &self.to.charset())
            .finish()
    }
}

impl Converter {
    /// Open a converter.
    ///
    /// Fails with [`DocumentError::UnsupportedConversion`] when neither side
    /// is UTF-8 or the backend does not know the other charset.
    pub fn new(from: &'static Encoding, to: &'static Encoding) -> DocumentResult<Self> {
        let unsupported = || DocumentError::UnsupportedConversion {
            from: from.charset().to_string(),
            to: to.charset().to_string(),
        };

        let engine = if to.is_utf8() {
            match from.codec() {
                Codec::Utf8 => Engine::Validate,
                Codec::Latin1 => Engine::DecodeLatin1,
                Codec::Utf16 { big_endian, bom } => {
                    let backend = if big_endian {
                        encoding_rs::UTF_16BE
                    } else {
                        encoding_rs::UTF_16LE
                    };
                    let decoder = if bom {
                        backend.new_decoder()
                    } else {
                        backend.new_decoder_without_bom_handling()
                    };
                    Engine::Decode {
                        decoder,
                        history: Vec::with_capacity(HISTORY_LEN),
                    }
                }
                Codec::Whatwg(label) => {
                    let backend = encoding_rs::Encoding::for_label_no_replacement(label.as_bytes())
                        .ok_or_else(unsupported)?;
                    Engine::Decode {
                        decoder: backend.new_decoder_without_bom_handling(),
                        history: Vec::with_capacity(HISTORY_LEN),
                    }
                }
            }
        } else if from.is_utf8() {
            match to.codec() {
                Codec::Utf8 => Engine::Validate,
                Codec::Latin1 => Engine::EncodeLatin1,
                Codec::Utf16 { big_endian, bom } => Engine::EncodeUtf16 {
                    big_endian,
                    bom_pending: bom,
                },
                Codec::Whatwg(label) => {
                    let backend = encoding_rs::Encoding::for_label_no_replacement(label.as_bytes())
                        .filter(|backend| backend.output_encoding() == *backend)
                        .ok_or_else(unsupported)?;
                    Engine::Encode(backend.new_encoder())
                }
            }
        } else {
            return Err(unsupported());
        };

        Ok(Converter { from, to, engine })
    }

    pub fn from_encoding(&self) -> &'static Encoding {
        self.from
    }

    pub fn to_encoding(&self) -> &'static Encoding {
        self.to
    }

    /// Convert `input`, appending to `output`.
    ///
    /// With `last` unset the converter may keep state for the next call;
    /// with `last` set it drains that state, reporting anything left over as
    /// an illegal sequence.
    pub fn convert(&mut self, input: &[u8], output: &mut Vec<u8>, last: bool) -> Conversion {
        let start = output.len();
        let (consumed, status) = match &mut self.engine {
            Engine::Validate => convert_validate(input, output, last),
            Engine::DecodeLatin1 => {
                output.reserve(input.len() * 2);
                for &byte in input {
                    let mut buf = [0u8; 2];
                    output.extend_from_slice(char::from(byte).encode_utf8(&mut buf).as_bytes());
                }
                (input.len(), finished(last))
            }
            Engine::Decode { decoder, history } => decode(decoder, history, input, output, last),
            Engine::EncodeLatin1 => encode_utf8_with(input, output, last, encode_latin1),
            Engine::EncodeUtf16 {
                big_endian,
                bom_pending,
            } => {
                let big_endian = *big_endian;
                encode_utf8_with(input, output, last, |text, out, _| {
                    if std::mem::take(&mut *bom_pending) {
                        let bom: u16 = 0xFEFF;
                        out.extend_from_slice(&to_bytes(bom, big_endian));
                    }
                    for unit in text.encode_utf16() {
                        out.extend_from_slice(&to_bytes(unit, big_endian));
                    }
                    (text.len(), None)
                })
            }
            Engine::Encode(encoder) => encode_utf8_with(input, output, last, |text, out, last| {
                encode_whatwg(encoder, text, out, last)
            }),
        };

        Conversion {
            consumed,
            produced: output.len() - start,
            status,
        }
    }

    /// Drain internal state at end of stream.
    pub fn flush(&mut self, output: &mut Vec<u8>) -> Conversion {
        self.convert(&[], output, true)
    }
}

fn finished(last: bool) -> ConversionStatus {
    if last {
        ConversionStatus::Finished
    } else {
        ConversionStatus::Continue
    }
}

fn to_bytes(unit: u16, big_endian: bool) -> [u8; 2] {
    if big_endian {
        unit.to_be_bytes()
    } else {
        unit.to_le_bytes()
    }
}

fn convert_validate(input: &[u8], output: &mut Vec<u8>, last: bool) -> (usize, ConversionStatus) {
    match std::str::from_utf8(input) {
        Ok(text) => {
            output.extend_from_slice(text.as_bytes());
            (input.len(), finished(last))
        }
        Err(err) => {
            let valid = err.valid_up_to();
            output.extend_from_slice(&input[..valid]);
            match err.error_len() {
                Some(len) => (
                    valid + len,
                    ConversionStatus::IllegalSequence(input[valid..valid + len].to_vec()),
                ),
                None if last => (
                    input.len(),
                    ConversionStatus::IllegalSequence(input[valid..].to_vec()),
                ),
                None => (valid, ConversionStatus::IncompleteSequence),
            }
        }
    }
}

fn decode(
    decoder: &mut encoding_rs::Decoder,
    history: &mut Vec<u8>,
    input: &[u8],
    output: &mut Vec<u8>,
    last: bool,
) -> (usize, ConversionStatus) {
    let start = output.len();
    let room = decoder
        .max_utf8_buffer_length_without_replacement(input.len())
        .unwrap_or(input.len() * 3 + 16);
    output.resize(start + room, 0);

    let (result, read, written) =
        decoder.decode_to_utf8_without_replacement(input, &mut output[start..], last);
    output.truncate(start + written);

    let status = match result {
        DecoderResult::InputEmpty => finished(last),
        DecoderResult::OutputFull => ConversionStatus::Continue,
        DecoderResult::Malformed(bad_len, bytes_after) => {
            let end_back = usize::from(bytes_after);
            let start_back = end_back + usize::from(bad_len);
            ConversionStatus::IllegalSequence(recent_bytes(
                history,
                &input[..read],
                start_back,
                end_back,
            ))
        }
    };

    remember(history, &input[..read]);
    (read, status)
}

/// Bytes between `start_back` and `end_back` positions from the end of the
/// consumed stream (`history` followed by `consumed`).
fn recent_bytes(history: &[u8], consumed: &[u8], start_back: usize, end_back: usize) -> Vec<u8> {
    let total = history.len() + consumed.len();
    let from = total.saturating_sub(start_back);
    let to = total.saturating_sub(end_back);

    (from..to)
        .map(|i| {
            if i < history.len() {
                history[i]
            } else {
                consumed[i - history.len()]
            }
        })
        .collect()
}

fn remember(history: &mut Vec<u8>, consumed: &[u8]) {
    history.extend_from_slice(consumed);
    if history.len() > HISTORY_LEN {
        let excess = history.len() - HISTORY_LEN;
        history.drain(..excess);
    }
}

/// Validate the UTF-8 side of an encode call and hand complete text to
/// `encode`, which returns how many text bytes it consumed and the
/// unmappable character that stopped it, if any.
fn encode_utf8_with<F>(input: &[u8], output: &mut Vec<u8>, last: bool, mut encode: F) -> (usize, ConversionStatus)
where
    F: FnMut(&str, &mut Vec<u8>, bool) -> (usize, Option<char>),
{
    let (text, fault) = match std::str::from_utf8(input) {
        Ok(text) => (text, None),
        Err(err) => (
            std::str::from_utf8(&input[..err.valid_up_to()]).unwrap_or_default(),
            Some(err.error_len()),
        ),
    };

    let (read, unmappable) = encode(text, output, last && fault.is_none());
    if let Some(character) = unmappable {
        return (read, ConversionStatus::Unmappable(character));
    }

    let valid = text.len();
    match fault {
        None => (valid, finished(last)),
        Some(Some(len)) => (
            valid + len,
            ConversionStatus::IllegalSequence(input[valid..valid + len].to_vec()),
        ),
        Some(None) if last => (
            input.len(),
            ConversionStatus::IllegalSequence(input[valid..].to_vec()),
        ),
        Some(None) => (valid, ConversionStatus::IncompleteSequence),
    }
}

fn encode_latin1(text: &str, output: &mut Vec<u8>, _last: bool) -> (usize, Option<char>) {
    for (index, character) in text.char_indices() {
        match u8::try_from(u32::from(character)) {
            Ok(byte) => output.push(byte),
            Err(_) => return (index + character.len_utf8(), Some(character)),
        }
    }
    (text.len(), None)
}

fn encode_whatwg(
    encoder: &mut encoding_rs::Encoder,
    text: &str,
    output: &mut Vec<u8>,
    last: bool,
) -> (usize, Option<char>) {
    let mut read_total = 0;
    loop {
        let pending = &text[read_total..];
        let start = output.len();
        let room = encoder
            .max_buffer_length_from_utf8_without_replacement(pending.len())
            .unwrap_or(pending.len() * 4 + 16);
        output.resize(start + room, 0);

        let (result, read, written) =
            encoder.encode_from_utf8_without_replacement(pending, &mut output[start..], last);
        output.truncate(start + written);
        read_total += read;

        match result {
            EncoderResult::InputEmpty => return (read_total, None),
            EncoderResult::Unmappable(character) => return (read_total, Some(character)),
            EncoderResult::OutputFull => continue,
        }
    }
}
