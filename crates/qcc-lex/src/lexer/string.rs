//! Character and string literal scanning.
//!
//! Escapes: simple (`\n`, `\t`, ...), octal (up to three digits), hex
//! (any number of digits), and `\u`/`\U` universal names (fixed 4 or 8
//! digits, feature-gated). An unterminated literal is reported at its
//! start and recovery consumes to the end of the physical line.

use qcc_util::Feature;

use super::Lexer;
use crate::token::{Lit, Token, TokenKind};

impl<'h> Lexer<'h> {
    pub(crate) fn lex_char(&mut self) -> Token {
        self.cursor.advance(); // opening quote
        let mut value: u32 = 0;
        let mut count = 0usize;
        loop {
            match self.cursor.current() {
                b'\'' => {
                    self.cursor.advance();
                    break;
                }
                0 if self.cursor.is_at_end() => {
                    self.report_error("unterminated character constant");
                    break;
                }
                b'\n' => {
                    self.report_error("unterminated character constant");
                    break;
                }
                b'\\' => {
                    self.cursor.advance();
                    let c = self.lex_escape();
                    value = (value << 8) | (c & 0xff);
                    count += 1;
                }
                _ => {
                    let c = self.next_scalar();
                    value = (value << 8) | (c & 0xff);
                    count += 1;
                }
            }
        }
        if count == 0 {
            self.report_error("empty character constant");
        } else if count > 1 {
            self.handler
                .warning("multi-character character constant", self.token_span());
        }
        self.make_token(TokenKind::CharLit, Lit::Char(value))
    }

    pub(crate) fn lex_string(&mut self) -> Token {
        self.cursor.advance(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.cursor.current() {
                b'"' => {
                    self.cursor.advance();
                    break;
                }
                0 if self.cursor.is_at_end() => {
                    self.report_error("unterminated string literal");
                    break;
                }
                b'\n' => {
                    self.report_error("unterminated string literal");
                    break;
                }
                b'\\' => {
                    self.cursor.advance();
                    let c = self.lex_escape();
                    push_scalar(&mut bytes, c);
                }
                _ => {
                    let c = self.next_scalar();
                    push_scalar(&mut bytes, c);
                }
            }
        }
        self.make_token(TokenKind::StrLit, Lit::Str(bytes))
    }

    /// Decode one escape sequence; the backslash is already consumed.
    fn lex_escape(&mut self) -> u32 {
        let b = self.cursor.current();
        self.cursor.advance();
        match b {
            b'n' => b'\n' as u32,
            b't' => b'\t' as u32,
            b'r' => b'\r' as u32,
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'v' => 0x0b,
            b'\\' => b'\\' as u32,
            b'\'' => b'\'' as u32,
            b'"' => b'"' as u32,
            b'?' => b'?' as u32,
            b'0'..=b'7' => {
                // Up to three octal digits, first already consumed.
                let mut value = (b - b'0') as u32;
                for _ in 0..2 {
                    let d = self.cursor.current();
                    if !(b'0'..=b'7').contains(&d) {
                        break;
                    }
                    value = value * 8 + (d - b'0') as u32;
                    self.cursor.advance();
                }
                value
            }
            b'x' => {
                let mut value: u32 = 0;
                let mut any = false;
                while self.cursor.current().is_ascii_hexdigit() {
                    any = true;
                    value = value.wrapping_mul(16) + hex_digit(self.cursor.current());
                    self.cursor.advance();
                }
                if !any {
                    self.report_error("\\x used with no following hex digits");
                }
                value
            }
            b'u' | b'U' => {
                if !self.features.contains(Feature::UnicodeEscapes) {
                    self.handler.warning(
                        "universal character names are not recognized in the selected standard",
                        self.token_span(),
                    );
                }
                let want = if b == b'u' { 4 } else { 8 };
                let mut value: u32 = 0;
                for _ in 0..want {
                    let d = self.cursor.current();
                    if !d.is_ascii_hexdigit() {
                        self.report_error("incomplete universal character name");
                        return value;
                    }
                    value = value.wrapping_mul(16) + hex_digit(d);
                    self.cursor.advance();
                }
                value
            }
            0 => {
                self.report_error("unterminated escape sequence");
                0
            }
            other => {
                self.report_error(format!("unknown escape sequence '\\{}'", other as char));
                other as u32
            }
        }
    }

    /// Consume one (possibly multi-byte) character, returning its scalar
    /// value.
    fn next_scalar(&mut self) -> u32 {
        let b = self.cursor.current();
        if b < 0x80 {
            self.cursor.advance();
            return b as u32;
        }
        // Multi-byte UTF-8: take the whole character.
        let rest = &self.cursor.file().content()[self.cursor.position()..];
        let c = rest.chars().next().unwrap_or('\u{fffd}');
        let len = c.len_utf8();
        self.cursor.advance_n(len);
        c as u32
    }
}

fn hex_digit(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => (b - b'0') as u32,
        b'a'..=b'f' => (b - b'a' + 10) as u32,
        _ => (b - b'A' + 10) as u32,
    }
}

fn push_scalar(bytes: &mut Vec<u8>, value: u32) {
    if value < 0x80 {
        bytes.push(value as u8);
    } else if let Some(c) = char::from_u32(value) {
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    } else {
        bytes.push((value & 0xff) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::super::Lexer;
    use crate::token::{Lit, Token, TokenKind};
    use qcc_util::{Handler, SourceMap, Standard};

    fn one(text: &str, std: Standard) -> (Token, Handler) {
        let mut map = SourceMap::new();
        let file = map.add_file("lit.c", text);
        let handler = Handler::new();
        let tok = {
            let mut lexer = Lexer::new(file, std.features(), &handler);
            lexer.next_token()
        };
        (tok, handler)
    }

    #[test]
    fn test_simple_char() {
        let (tok, handler) = one("'a'", Standard::Gnu17);
        assert_eq!(tok.kind, TokenKind::CharLit);
        assert_eq!(tok.lit, Lit::Char('a' as u32));
        assert!(!handler.has_errors());
    }

    #[test]
    fn test_char_escapes() {
        assert_eq!(one(r"'\n'", Standard::Gnu17).0.lit, Lit::Char(10));
        assert_eq!(one(r"'\0'", Standard::Gnu17).0.lit, Lit::Char(0));
        assert_eq!(one(r"'\x41'", Standard::Gnu17).0.lit, Lit::Char(0x41));
        assert_eq!(one(r"'\101'", Standard::Gnu17).0.lit, Lit::Char(0o101));
    }

    #[test]
    fn test_unknown_escape() {
        let (_, handler) = one(r"'\q'", Standard::Gnu17);
        assert!(handler.has_errors());
    }

    #[test]
    fn test_multi_char_warns() {
        let (tok, handler) = one("'ab'", Standard::Gnu17);
        assert_eq!(handler.warning_count(), 1);
        assert_eq!(tok.lit, Lit::Char((('a' as u32) << 8) | 'b' as u32));
    }

    #[test]
    fn test_string_bytes() {
        let (tok, _) = one(r#""hi\n""#, Standard::Gnu17);
        assert_eq!(tok.lit, Lit::Str(vec![b'h', b'i', b'\n']));
    }

    #[test]
    fn test_unicode_escape() {
        let (tok, handler) = one(r#""\u00e9""#, Standard::C99);
        assert!(!handler.has_errors());
        assert_eq!(tok.lit, Lit::Str("é".as_bytes().to_vec()));
    }

    #[test]
    fn test_unicode_escape_gated() {
        let (_, handler) = one(r#""\u00e9""#, Standard::C89);
        assert_eq!(handler.warning_count(), 1);
    }

    #[test]
    fn test_raw_multibyte_character() {
        let (tok, handler) = one(r#""é""#, Standard::Gnu17);
        assert!(!handler.has_errors());
        assert_eq!(tok.lit, Lit::Str("é".as_bytes().to_vec()));
    }

    #[test]
    fn test_unterminated_string_recovers() {
        let (tok, handler) = one("\"oops\nint", Standard::Gnu17);
        assert!(handler.has_errors());
        // Best-effort token still produced; lexing can continue.
        assert_eq!(tok.kind, TokenKind::StrLit);
    }

    #[test]
    fn test_unterminated_char() {
        let (_, handler) = one("'a", Standard::Gnu17);
        assert!(handler.has_errors());
    }
}
