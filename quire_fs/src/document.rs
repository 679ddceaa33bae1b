//! Text buffer collaborators.
//!
//! The decode pipeline writes into a [`TextSink`] and the encode pipeline
//! reads from a [`TextSource`]. [`Document`] implements both on top of a
//! `ropey` rope and is what the loader and saver are usually handed.

use std::borrow::Cow;
use std::fmt;
use std::ops::Range;

use ropey::Rope;

/// Destination of decoded text. Offsets are in characters.
pub trait TextSink {
    /// Group the following edits so they are not individually undoable.
    fn begin_atomic_edit(&mut self);
    fn end_atomic_edit(&mut self);

    fn len_chars(&self) -> usize;
    fn insert(&mut self, char_idx: usize, text: &str);
    fn delete(&mut self, range: Range<usize>);
    fn char_at(&self, char_idx: usize) -> Option<char>;

    /// Tag a range as holding escaped, undecodable input.
    fn mark_invalid(&mut self, range: Range<usize>);

    /// First line including its terminator, if any.
    fn first_line(&self) -> Cow<'_, str>;
}

/// Source of text to encode.
pub trait TextSource {
    /// Size in bytes of the UTF-8 content, used as a progress estimate.
    fn len_bytes(&self) -> usize;
    fn len_lines(&self) -> usize;
    /// Line `index` including its terminator, if any.
    fn line(&self, index: usize) -> Cow<'_, str>;
    /// Whether any range carries an invalid-span tag.
    fn has_invalid_chars(&self) -> bool;
}

/// Rope-backed document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    rope: Rope,
    invalid: Vec<Range<usize>>,
    edit_depth: usize,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Document {
            rope: Rope::from_str(text),
            ..Self::default()
        }
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Character ranges tagged as invalid, in insertion order.
    pub fn invalid_ranges(&self) -> &[Range<usize>] {
        &self.invalid
    }

    pub fn in_atomic_edit(&self) -> bool {
        self.edit_depth > 0
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rope)
    }
}

impl TextSink for Document {
    fn begin_atomic_edit(&mut self) {
        self.edit_depth += 1;
    }

    fn end_atomic_edit(&mut self) {
        self.edit_depth = self.edit_depth.saturating_sub(1);
    }

    fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    fn insert(&mut self, char_idx: usize, text: &str) {
        let len = text.chars().count();
        self.rope.insert(char_idx, text);

        for range in &mut self.invalid {
            if range.start >= char_idx {
                range.start += len;
                range.end += len;
            } else if range.end > char_idx {
                range.end += len;
            }
        }
    }

    fn delete(&mut self, range: Range<usize>) {
        let end = range.end.min(self.rope.len_chars());
        let start = range.start.min(end);
        if start == end {
            return;
        }
        self.rope.remove(start..end);

        let removed = end - start;
        let shift = |offset: usize| {
            if offset >= end {
                offset - removed
            } else {
                offset.min(start)
            }
        };
        for span in &mut self.invalid {
            *span = shift(span.start)..shift(span.end);
        }
        self.invalid.retain(|span| !span.is_empty());
    }

    fn char_at(&self, char_idx: usize) -> Option<char> {
        self.rope.get_char(char_idx)
    }

    fn mark_invalid(&mut self, range: Range<usize>) {
        if !range.is_empty() {
            self.invalid.push(range);
        }
    }

    fn first_line(&self) -> Cow<'_, str> {
        match self.rope.get_line(0) {
            Some(line) => line.into(),
            None => Cow::Borrowed(""),
        }
    }
}

impl TextSource for Document {
    fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    fn line(&self, index: usize) -> Cow<'_, str> {
        match self.rope.get_line(index) {
            Some(line) => line.into(),
            None => Cow::Borrowed(""),
        }
    }

    fn has_invalid_chars(&self) -> bool {
        !self.invalid.is_empty()
    }
}
