//! Newline style classification and rendering.

use std::fmt;
use std::str::FromStr;

/// Line terminator convention of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NewlineType {
    /// Line Feed (Unix/Linux/macOS) - \n
    #[default]
    Lf,
    /// Carriage Return (classic Mac OS) - \r
    Cr,
    /// Carriage Return + Line Feed (Windows) - \r\n
    CrLf,
}

impl NewlineType {
    /// The terminator as written to disk.
    pub fn as_str(self) -> &'static str {
        match self {
            NewlineType::Lf => "\n",
            NewlineType::Cr => "\r",
            NewlineType::CrLf => "\r\n",
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl fmt::Display for NewlineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewlineType::Lf => write!(f, "LF"),
            NewlineType::Cr => write!(f, "CR"),
            NewlineType::CrLf => write!(f, "CRLF"),
        }
    }
}

impl FromStr for NewlineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lf" | "unix" => Ok(NewlineType::Lf),
            "cr" | "mac" => Ok(NewlineType::Cr),
            "crlf" | "windows" | "dos" => Ok(NewlineType::CrLf),
            other => Err(format!("unknown newline style '{}'", other)),
        }
    }
}

/// Classify the terminator of the first line of `text`.
///
/// Looks at the first `\r` or `\n`: `\r\n` is CRLF, a lone `\r` is CR and
/// `\n` is LF. Text without any terminator yields the default (LF).
pub fn classify_first_line(text: &str) -> NewlineType {
    let bytes = text.as_bytes();
    match bytes.iter().position(|&b| b == b'\r' || b == b'\n') {
        Some(i) if bytes[i] == b'\r' => {
            if bytes.get(i + 1) == Some(&b'\n') {
                NewlineType::CrLf
            } else {
                NewlineType::Cr
            }
        }
        Some(_) => NewlineType::Lf,
        None => NewlineType::default(),
    }
}

/// Split a line into its content and whether it ended in a terminator.
///
/// Only `\n`, `\r\n` and `\r` count; other Unicode separators stay part of
/// the content.
pub fn strip_terminator(line: &str) -> (&str, bool) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, true)
    } else if let Some(content) = line.strip_suffix(['\n', '\r']) {
        (content, true)
    } else {
        (line, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_lf() {
        assert_eq!(classify_first_line("line1\nline2\r\n"), NewlineType::Lf);
    }

    #[test]
    fn test_classify_crlf() {
        assert_eq!(classify_first_line("line1\r\nline2\n"), NewlineType::CrLf);
    }

    #[test]
    fn test_classify_cr() {
        assert_eq!(classify_first_line("line1\rline2"), NewlineType::Cr);
    }

    #[test]
    fn test_classify_cr_at_end_of_text() {
        assert_eq!(classify_first_line("only\r"), NewlineType::Cr);
    }

    #[test]
    fn test_classify_no_terminator() {
        assert_eq!(classify_first_line("single line"), NewlineType::Lf);
        assert_eq!(classify_first_line(""), NewlineType::Lf);
    }

    #[test]
    fn test_strip_terminator() {
        assert_eq!(strip_terminator("a\r\n"), ("a", true));
        assert_eq!(strip_terminator("a\n"), ("a", true));
        assert_eq!(strip_terminator("a\r"), ("a", true));
        assert_eq!(strip_terminator("a"), ("a", false));
        assert_eq!(strip_terminator("a\u{2028}"), ("a\u{2028}", false));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("CRLF".parse::<NewlineType>(), Ok(NewlineType::CrLf));
        assert_eq!("lf".parse::<NewlineType>(), Ok(NewlineType::Lf));
        assert!("nope".parse::<NewlineType>().is_err());
        assert_eq!(NewlineType::Cr.to_string(), "CR");
        assert_eq!(NewlineType::CrLf.as_bytes(), b"\r\n");
    }
}
