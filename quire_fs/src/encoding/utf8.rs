//! UTF-8 validation as the text sink understands it.
//!
//! Besides malformed sequences, U+0000 is rejected: a NUL cannot be stored in
//! the document and is escaped like any other undecodable byte.

/// Longest sequence that can be held back as a possible incomplete character.
pub const MAX_UNICHAR_LEN: usize = 6;

/// What stopped validation before the end of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utf8Fault {
    /// The input ends inside a multi-byte sequence that more bytes could complete.
    Incomplete,
    /// This many bytes at the fault position can never start valid text.
    Invalid(usize),
}

/// Split `bytes` into its longest acceptable prefix and the fault that ended it.
pub fn split_valid(bytes: &[u8]) -> (&str, Option<Utf8Fault>) {
    let (text, fault) = match std::str::from_utf8(bytes) {
        Ok(text) => (text, None),
        Err(err) => {
            let text = std::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or_default();
            let fault = match err.error_len() {
                Some(len) => Utf8Fault::Invalid(len),
                None => Utf8Fault::Incomplete,
            };
            (text, Some(fault))
        }
    };

    match text.find('\0') {
        Some(nul) => (&text[..nul], Some(Utf8Fault::Invalid(1))),
        None => (text, fault),
    }
}

/// Whether `bytes` is entirely acceptable text.
pub fn is_valid_utf8(bytes: &[u8]) -> bool {
    matches!(split_valid(bytes), (_, None))
}
