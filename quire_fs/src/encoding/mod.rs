//! Encoding registry: the fixed, ordered catalog of charsets the pipeline
//! can detect, decode and encode.

use std::fmt;
use std::sync::LazyLock;

pub mod converter;
pub mod utf8;

pub use converter::{Conversion, ConversionStatus, Converter};

/// How an encoding is converted to and from UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Codec {
    /// No conversion, validation only.
    Utf8,
    /// Byte value equals code point.
    Latin1,
    /// UTF-16 with fixed byte order; `bom` writes and sniffs a byte order mark.
    Utf16 { big_endian: bool, bom: bool },
    /// Served by `encoding_rs`, looked up by this WHATWG label.
    Whatwg(&'static str),
}

/// A named character encoding from the static catalog.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Encoding {
    charset: &'static str,
    name: &'static str,
    aliases: &'static [&'static str],
    codec: Codec,
}

impl Encoding {
    /// Canonical charset identifier, e.g. `"ISO-8859-15"`.
    pub fn charset(&self) -> &'static str {
        self.charset
    }

    /// Human readable name, e.g. `"Western"`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_utf8(&self) -> bool {
        self.codec == Codec::Utf8
    }

    /// Whether this entry is the one selected for the process locale.
    pub fn is_current_locale(&self) -> bool {
        std::ptr::eq(self, current_locale())
    }

    pub(crate) fn codec(&self) -> Codec {
        self.codec
    }

    fn matches(&self, charset: &str) -> bool {
        self.charset == charset || self.aliases.contains(&charset)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.charset)
    }
}

macro_rules! whatwg {
    ($charset:literal, $name:literal, $label:literal, [$($alias:literal),*]) => {
        Encoding {
            charset: $charset,
            name: $name,
            aliases: &[$($alias),*],
            codec: Codec::Whatwg($label),
        }
    };
}

static ENCODINGS: &[Encoding] = &[
    Encoding {
        charset: "UTF-8",
        name: "Unicode",
        aliases: &["utf-8", "UTF8", "utf8"],
        codec: Codec::Utf8,
    },
    Encoding {
        charset: "UTF-16",
        name: "Unicode",
        aliases: &["utf-16", "UTF16", "utf16"],
        codec: Codec::Utf16 { big_endian: true, bom: true },
    },
    Encoding {
        charset: "UTF-16BE",
        name: "Unicode",
        aliases: &["utf-16be", "UTF-16-BE"],
        codec: Codec::Utf16 { big_endian: true, bom: false },
    },
    Encoding {
        charset: "UTF-16LE",
        name: "Unicode",
        aliases: &["utf-16le", "UTF-16-LE"],
        codec: Codec::Utf16 { big_endian: false, bom: false },
    },
    Encoding {
        charset: "ISO-8859-1",
        name: "Western",
        aliases: &["iso-8859-1", "ISO8859-1", "ISO_8859-1", "LATIN1", "latin1"],
        codec: Codec::Latin1,
    },
    whatwg!("ISO-8859-2", "Central European", "iso-8859-2", ["iso-8859-2", "ISO8859-2", "LATIN2"]),
    whatwg!("ISO-8859-3", "South European", "iso-8859-3", ["iso-8859-3", "ISO8859-3", "LATIN3"]),
    whatwg!("ISO-8859-4", "Baltic", "iso-8859-4", ["iso-8859-4", "ISO8859-4", "LATIN4"]),
    whatwg!("ISO-8859-5", "Cyrillic", "iso-8859-5", ["iso-8859-5", "ISO8859-5"]),
    whatwg!("ISO-8859-6", "Arabic", "iso-8859-6", ["iso-8859-6", "ISO8859-6"]),
    whatwg!("ISO-8859-7", "Greek", "iso-8859-7", ["iso-8859-7", "ISO8859-7"]),
    whatwg!("ISO-8859-8", "Hebrew Visual", "iso-8859-8", ["iso-8859-8", "ISO8859-8"]),
    whatwg!("ISO-8859-8-I", "Hebrew", "iso-8859-8-i", ["iso-8859-8-i"]),
    whatwg!("ISO-8859-9", "Turkish", "iso-8859-9", ["iso-8859-9", "ISO8859-9", "LATIN5"]),
    whatwg!("ISO-8859-10", "Nordic", "iso-8859-10", ["iso-8859-10", "ISO8859-10", "LATIN6"]),
    whatwg!("ISO-8859-13", "Baltic", "iso-8859-13", ["iso-8859-13", "ISO8859-13", "LATIN7"]),
    whatwg!("ISO-8859-14", "Celtic", "iso-8859-14", ["iso-8859-14", "ISO8859-14", "LATIN8"]),
    whatwg!("ISO-8859-15", "Western", "iso-8859-15", ["iso-8859-15", "ISO8859-15", "LATIN-9"]),
    whatwg!("ISO-8859-16", "Romanian", "iso-8859-16", ["iso-8859-16", "ISO8859-16", "LATIN10"]),
    whatwg!("BIG5", "Chinese Traditional", "big5", ["Big5", "big5"]),
    whatwg!("EUC-JP", "Japanese", "euc-jp", ["euc-jp", "EUCJP"]),
    whatwg!("EUC-KR", "Korean", "euc-kr", ["euc-kr", "EUCKR"]),
    whatwg!("GB18030", "Chinese Simplified", "gb18030", ["gb18030"]),
    whatwg!("GBK", "Chinese Simplified", "gbk", ["gbk", "CP936"]),
    whatwg!("ISO-2022-JP", "Japanese", "iso-2022-jp", ["iso-2022-jp"]),
    whatwg!("KOI8-R", "Cyrillic", "koi8-r", ["koi8-r", "KOI8R"]),
    whatwg!("KOI8-U", "Cyrillic/Ukrainian", "koi8-u", ["koi8-u", "KOI8U"]),
    whatwg!("SHIFT_JIS", "Japanese", "shift_jis", ["Shift_JIS", "shift_jis", "SJIS"]),
    whatwg!("IBM866", "Cyrillic/Russian", "ibm866", ["ibm866", "CP866"]),
    whatwg!("WINDOWS-874", "Thai", "windows-874", ["windows-874", "CP874"]),
    whatwg!("WINDOWS-1250", "Central European", "windows-1250", ["windows-1250", "CP1250"]),
    whatwg!("WINDOWS-1251", "Cyrillic", "windows-1251", ["windows-1251", "CP1251"]),
    whatwg!("WINDOWS-1252", "Western", "windows-1252", ["windows-1252", "CP1252"]),
    whatwg!("WINDOWS-1253", "Greek", "windows-1253", ["windows-1253", "CP1253"]),
    whatwg!("WINDOWS-1254", "Turkish", "windows-1254", ["windows-1254", "CP1254"]),
    whatwg!("WINDOWS-1255", "Hebrew", "windows-1255", ["windows-1255", "CP1255"]),
    whatwg!("WINDOWS-1256", "Arabic", "windows-1256", ["windows-1256", "CP1256"]),
    whatwg!("WINDOWS-1257", "Baltic", "windows-1257", ["windows-1257", "CP1257"]),
    whatwg!("WINDOWS-1258", "Vietnamese", "windows-1258", ["windows-1258", "CP1258"]),
    whatwg!("MACINTOSH", "Western", "macintosh", ["MAC_ROMAN", "macintosh"]),
    whatwg!("MAC_CYRILLIC", "Cyrillic", "x-mac-cyrillic", ["x-mac-cyrillic"]),
];

/// Placeholder name in configured candidate lists for the locale charset.
pub const CURRENT_LOCALE_TOKEN: &str = "CURRENT";

static CURRENT_LOCALE: LazyLock<&'static Encoding> = LazyLock::new(|| {
    let codeset = ["LC_ALL", "LC_CTYPE", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .and_then(|locale| locale_codeset(&locale));

    match codeset.as_deref().and_then(lookup) {
        Some(encoding) => encoding,
        None => {
            tracing::debug!(codeset = ?codeset, "locale charset not in catalog, using UTF-8");
            utf8()
        }
    }
});

/// Iterate the catalog in order.
pub fn all() -> impl Iterator<Item = &'static Encoding> {
    ENCODINGS.iter()
}

/// Find an encoding by its charset name or one of its aliases.
///
/// Matching is exact and case-sensitive. Unknown names yield `None`; callers
/// reading charsets from untrusted places (file metadata) must fall back to a
/// safe default themselves.
pub fn lookup(charset: &str) -> Option<&'static Encoding> {
    all().find(|encoding| encoding.matches(charset))
}

/// The designated UTF-8 entry.
pub fn utf8() -> &'static Encoding {
    &ENCODINGS[0]
}

/// The entry matching the process locale's codeset, UTF-8 when unknown.
pub fn current_locale() -> &'static Encoding {
    *CURRENT_LOCALE
}

/// Build a candidate list from configured charset names.
///
/// `"CURRENT"` resolves to [`current_locale`], unknown names are skipped and
/// duplicates keep their first position.
pub fn resolve_candidates<S: AsRef<str>>(names: &[S]) -> Vec<&'static Encoding> {
    let mut candidates: Vec<&'static Encoding> = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref();
        let encoding = if name == CURRENT_LOCALE_TOKEN {
            Some(current_locale())
        } else {
            lookup(name)
        };

        match encoding {
            Some(encoding) => push_unique(&mut candidates, encoding),
            None => tracing::warn!(charset = name, "ignoring unknown charset in candidate list"),
        }
    }

    candidates
}

/// Append `encoding` unless it is already listed.
pub fn push_unique(list: &mut Vec<&'static Encoding>, encoding: &'static Encoding) {
    if !list.iter().any(|e| std::ptr::eq(*e, encoding)) {
        list.push(encoding);
    }
}

/// Extract and normalize the codeset part of a locale string such as
/// `de_DE.ISO8859-15@euro`.
fn locale_codeset(locale: &str) -> Option<String> {
    let (_, rest) = locale.split_once('.')?;
    let codeset = rest.split('@').next()?.to_ascii_uppercase();

    let normalized = if let Some(part) = codeset.strip_prefix("ISO8859-") {
        format!("ISO-8859-{}", part)
    } else if codeset == "UTF8" {
        "UTF-8".to_string()
    } else {
        codeset
    };
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_charset_and_alias() {
        let latin9 = lookup("ISO-8859-15").expect("latin9");
        assert_eq!(latin9.name(), "Western");
        assert!(std::ptr::eq(lookup("ISO8859-15").expect("alias"), latin9));
        assert!(lookup("NOT-A-CHARSET").is_none());
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!(lookup("Iso-8859-15").is_none());
    }

    #[test]
    fn test_utf8_entry() {
        assert!(utf8().is_utf8());
        assert_eq!(utf8().charset(), "UTF-8");
        assert_eq!(utf8().to_string(), "Unicode (UTF-8)");
    }

    #[test]
    fn test_catalog_charsets_are_unique() {
        let charsets: Vec<_> = all().map(Encoding::charset).collect();
        for (i, charset) in charsets.iter().enumerate() {
            assert!(!charsets[i + 1..].contains(charset), "{charset} listed twice");
        }
    }

    #[test]
    fn test_resolve_candidates_dedups_and_skips_unknown() {
        let list = resolve_candidates(&["UTF-8", "BOGUS", "ISO-8859-15", "utf8", "ISO-8859-15"]);
        let charsets: Vec<_> = list.iter().map(|e| e.charset()).collect();
        assert_eq!(charsets, vec!["UTF-8", "ISO-8859-15"]);
    }

    #[test]
    fn test_resolve_candidates_current() {
        let list = resolve_candidates(&[CURRENT_LOCALE_TOKEN]);
        assert_eq!(list.len(), 1);
        assert!(list[0].is_current_locale());
    }

    #[test]
    fn test_locale_codeset() {
        assert_eq!(locale_codeset("en_US.UTF-8").as_deref(), Some("UTF-8"));
        assert_eq!(locale_codeset("en_US.utf8").as_deref(), Some("UTF-8"));
        assert_eq!(
            locale_codeset("de_DE.ISO8859-15@euro").as_deref(),
            Some("ISO-8859-15")
        );
        assert_eq!(locale_codeset("C"), None);
    }
}
