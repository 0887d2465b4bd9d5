//! Byte cursor for traversing a source file.
//!
//! The cursor owns a cheap handle to its [`SourceFile`] and maintains the
//! byte position plus 1-based line/column. The preprocessor suspends and
//! resumes whole cursors around `#include`, so the cursor holds an `Rc`
//! rather than a borrowed slice.

use std::rc::Rc;

use qcc_util::span::{FileId, SourceFile};

/// A cursor over one source file's bytes.
pub struct Cursor {
    file: Rc<SourceFile>,
    position: usize,
    line: u32,
    column: u32,
}

impl Cursor {
    /// Create a cursor at the start of a file.
    pub fn new(file: Rc<SourceFile>) -> Self {
        Self {
            file,
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// The file being traversed.
    #[inline]
    pub fn file(&self) -> &Rc<SourceFile> {
        &self.file
    }

    /// The file's id.
    #[inline]
    pub fn file_id(&self) -> FileId {
        self.file.id()
    }

    /// The current byte, or `0` at end of input.
    #[inline]
    pub fn current(&self) -> u8 {
        self.peek(0)
    }

    /// The byte `offset` positions ahead, or `0` past the end.
    #[inline]
    pub fn peek(&self, offset: usize) -> u8 {
        let bytes = self.file.content().as_bytes();
        let pos = self.position + offset;
        if pos < bytes.len() {
            bytes[pos]
        } else {
            0
        }
    }

    /// True once every byte has been consumed.
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.position >= self.file.content().len()
    }

    /// Advance one byte, updating line/column tracking.
    #[inline]
    pub fn advance(&mut self) {
        let bytes = self.file.content().as_bytes();
        if self.position >= bytes.len() {
            return;
        }
        if bytes[self.position] == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.position += 1;
    }

    /// Advance `count` bytes.
    pub fn advance_n(&mut self, count: usize) {
        for _ in 0..count {
            if self.is_at_end() {
                break;
            }
            self.advance();
        }
    }

    /// Consume the expected byte if it is next.
    pub fn match_byte(&mut self, expected: u8) -> bool {
        if self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Current line (1-based).
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Current column (1-based).
    #[inline]
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Current byte offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Slice of the source from `start` to the current position.
    pub fn slice_from(&self, start: usize) -> &str {
        &self.file.content()[start..self.position]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcc_util::SourceMap;

    fn cursor(text: &str) -> Cursor {
        let mut map = SourceMap::new();
        Cursor::new(map.add_file("test.c", text))
    }

    #[test]
    fn test_advance_and_peek() {
        let mut c = cursor("abc");
        assert_eq!(c.current(), b'a');
        assert_eq!(c.peek(1), b'b');
        c.advance();
        assert_eq!(c.current(), b'b');
        c.advance_n(2);
        assert!(c.is_at_end());
        assert_eq!(c.current(), 0);
    }

    #[test]
    fn test_line_column_tracking() {
        let mut c = cursor("ab\ncd");
        assert_eq!((c.line(), c.column()), (1, 1));
        c.advance_n(2);
        assert_eq!((c.line(), c.column()), (1, 3));
        c.advance(); // newline
        assert_eq!((c.line(), c.column()), (2, 1));
        c.advance();
        assert_eq!((c.line(), c.column()), (2, 2));
    }

    #[test]
    fn test_match_byte() {
        let mut c = cursor("=>");
        assert!(c.match_byte(b'='));
        assert!(!c.match_byte(b'='));
        assert!(c.match_byte(b'>'));
    }

    #[test]
    fn test_slice_from() {
        let mut c = cursor("int x;");
        let start = c.position();
        c.advance_n(3);
        assert_eq!(c.slice_from(start), "int");
    }

    #[test]
    fn test_empty_input() {
        let mut c = cursor("");
        assert!(c.is_at_end());
        c.advance();
        assert_eq!(c.position(), 0);
    }
}
