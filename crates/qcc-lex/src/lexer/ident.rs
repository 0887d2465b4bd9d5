//! Identifier scanning and keyword lookup.

use super::Lexer;
use crate::token::{Keyword, Lit, Token, TokenKind};

impl<'h> Lexer<'h> {
    pub(crate) fn lex_identifier(&mut self) -> Token {
        let start = self.cursor.position();
        while is_ident_continue(self.cursor.current()) {
            self.cursor.advance();
        }
        let text = self.cursor.slice_from(start);
        let kind = match Keyword::lookup(text, self.features) {
            Some(kw) => TokenKind::Kw(kw),
            None => TokenKind::Ident,
        };
        self.make_token(kind, Lit::None)
    }
}

#[inline]
pub(crate) fn is_ident_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic()
}

#[inline]
pub(crate) fn is_ident_continue(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ident_charset() {
        assert!(is_ident_start(b'_'));
        assert!(is_ident_start(b'A'));
        assert!(!is_ident_start(b'1'));
        assert!(is_ident_continue(b'1'));
        assert!(!is_ident_continue(b'-'));
    }
}
