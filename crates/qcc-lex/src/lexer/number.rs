//! Numeric literal scanning.
//!
//! The leading prefix fixes the base (`0x`, `0b`, bare `0` for octal),
//! then digits are scanned (optionally with `'` separators), then an
//! optional fraction and exponent (`e`/`E` decimal, `p`/`P` hex), then
//! the suffix (`u`, `l`, `ll`, `f` in either case).

use qcc_util::Feature;

use super::Lexer;
use crate::token::{IntSuffix, Lit, Token, TokenKind};

impl<'h> Lexer<'h> {
    pub(crate) fn lex_number(&mut self) -> Token {
        if self.cursor.current() == b'0'
            && (self.cursor.peek(1) == b'x' || self.cursor.peek(1) == b'X')
        {
            self.cursor.advance_n(2);
            return self.lex_hex();
        }
        if self.cursor.current() == b'0'
            && (self.cursor.peek(1) == b'b' || self.cursor.peek(1) == b'B')
        {
            if !self.features.contains(Feature::BinaryLiterals) {
                self.handler.warning(
                    "binary literals are not recognized in the selected standard",
                    self.token_span(),
                );
            }
            self.cursor.advance_n(2);
            let digits = self.scan_digits(|b| b == b'0' || b == b'1');
            if digits.is_empty() {
                self.report_error("binary constant has no digits");
            }
            let value = self.parse_int(&digits, 2);
            let suffix = self.lex_int_suffix();
            return self.make_token(TokenKind::IntLit, Lit::Int { value, suffix });
        }

        let leading_zero = self.cursor.current() == b'0';
        let digits = self.scan_digits(|b| b.is_ascii_digit());

        // Fraction or exponent makes it a decimal floating constant.
        let is_float = (self.cursor.current() == b'.' && self.cursor.peek(1) != b'.')
            || self.cursor.current() == b'e'
            || self.cursor.current() == b'E';
        if is_float {
            return self.lex_decimal_float(digits);
        }

        let value = if leading_zero && digits.len() > 1 {
            if digits.bytes().any(|b| b == b'8' || b == b'9') {
                self.report_error("invalid digit in octal constant");
                0
            } else {
                self.parse_int(&digits, 8)
            }
        } else {
            self.parse_int(&digits, 10)
        };
        let suffix = self.lex_int_suffix();
        self.make_token(TokenKind::IntLit, Lit::Int { value, suffix })
    }

    fn lex_hex(&mut self) -> Token {
        let digits = self.scan_digits(|b| b.is_ascii_hexdigit());
        let has_frac = self.cursor.current() == b'.';
        let frac = if has_frac {
            self.cursor.advance();
            self.scan_digits(|b| b.is_ascii_hexdigit())
        } else {
            String::new()
        };
        let has_exp = self.cursor.current() == b'p' || self.cursor.current() == b'P';

        if has_frac || has_exp {
            if !self.features.contains(Feature::HexFloats) {
                self.handler.warning(
                    "hexadecimal floating constants are not recognized in the selected standard",
                    self.token_span(),
                );
            }
            let exp = if has_exp {
                self.cursor.advance();
                self.scan_exponent_digits()
            } else {
                self.report_error("hexadecimal floating constant requires an exponent");
                0
            };
            let mut value = 0.0f64;
            for b in digits.bytes() {
                value = value * 16.0 + hex_value(b) as f64;
            }
            let mut scale = 1.0f64 / 16.0;
            for b in frac.bytes() {
                value += hex_value(b) as f64 * scale;
                scale /= 16.0;
            }
            value *= 2.0f64.powi(exp);
            let is_f32 = self.lex_float_suffix();
            return self.make_token(TokenKind::FloatLit, Lit::Float { value, is_f32 });
        }

        if digits.is_empty() {
            self.report_error("hexadecimal constant has no digits");
        }
        let value = self.parse_int(&digits, 16);
        let suffix = self.lex_int_suffix();
        self.make_token(TokenKind::IntLit, Lit::Int { value, suffix })
    }

    fn lex_decimal_float(&mut self, int_part: String) -> Token {
        let mut repr = int_part;
        if self.cursor.current() == b'.' {
            self.cursor.advance();
            repr.push('.');
            repr.push_str(&self.scan_digits(|b| b.is_ascii_digit()));
        }
        if self.cursor.current() == b'e' || self.cursor.current() == b'E' {
            self.cursor.advance();
            repr.push('e');
            if self.cursor.current() == b'+' || self.cursor.current() == b'-' {
                repr.push(self.cursor.current() as char);
                self.cursor.advance();
            }
            let exp = self.scan_digits(|b| b.is_ascii_digit());
            if exp.is_empty() {
                self.report_error("exponent has no digits");
                repr.push('0');
            } else {
                repr.push_str(&exp);
            }
        }
        let value = repr.parse::<f64>().unwrap_or_else(|_| {
            self.report_error("malformed floating constant");
            0.0
        });
        let is_f32 = self.lex_float_suffix();
        self.make_token(TokenKind::FloatLit, Lit::Float { value, is_f32 })
    }

    /// Scan digits matching `accept`, consuming `'` separators when the
    /// feature allows them. Returns the digits with separators removed.
    fn scan_digits(&mut self, accept: impl Fn(u8) -> bool) -> String {
        let separators = self.features.contains(Feature::DigitSeparators);
        let mut out = String::new();
        loop {
            let b = self.cursor.current();
            if accept(b) {
                out.push(b as char);
                self.cursor.advance();
            } else if separators && b == b'\'' && accept(self.cursor.peek(1)) {
                self.cursor.advance();
            } else {
                break;
            }
        }
        out
    }

    fn scan_exponent_digits(&mut self) -> i32 {
        let negative = match self.cursor.current() {
            b'-' => {
                self.cursor.advance();
                true
            }
            b'+' => {
                self.cursor.advance();
                false
            }
            _ => false,
        };
        let digits = self.scan_digits(|b| b.is_ascii_digit());
        if digits.is_empty() {
            self.report_error("exponent has no digits");
            return 0;
        }
        let exp = digits.parse::<i32>().unwrap_or(i32::MAX / 2);
        if negative {
            -exp
        } else {
            exp
        }
    }

    fn parse_int(&mut self, digits: &str, base: u64) -> u64 {
        let mut value: u64 = 0;
        let mut overflowed = false;
        for b in digits.bytes() {
            let d = hex_value(b) as u64;
            value = match value.checked_mul(base).and_then(|v| v.checked_add(d)) {
                Some(v) => v,
                None => {
                    overflowed = true;
                    u64::MAX
                }
            };
        }
        if overflowed {
            self.report_error("integer constant is too large");
        }
        value
    }

    fn lex_int_suffix(&mut self) -> IntSuffix {
        let mut suffix = IntSuffix::default();
        loop {
            match self.cursor.current() {
                b'u' | b'U' if !suffix.unsigned => {
                    suffix.unsigned = true;
                    self.cursor.advance();
                }
                b'l' | b'L' if suffix.longs == 0 => {
                    let first = self.cursor.current();
                    self.cursor.advance();
                    suffix.longs = 1;
                    // `ll` must repeat the same letter.
                    if self.cursor.current() == first {
                        self.cursor.advance();
                        suffix.longs = 2;
                        if !self.features.contains(Feature::LongLong) {
                            self.handler.warning(
                                "'long long' constants are not recognized in the selected standard",
                                self.token_span(),
                            );
                        }
                    }
                }
                b if b.is_ascii_alphanumeric() || b == b'_' => {
                    self.report_error("invalid suffix on integer constant");
                    while self.cursor.current().is_ascii_alphanumeric()
                        || self.cursor.current() == b'_'
                    {
                        self.cursor.advance();
                    }
                    break;
                }
                _ => break,
            }
        }
        suffix
    }

    fn lex_float_suffix(&mut self) -> bool {
        match self.cursor.current() {
            b'f' | b'F' => {
                self.cursor.advance();
                true
            }
            b'l' | b'L' => {
                // long double: scanned, represented as f64.
                self.cursor.advance();
                false
            }
            _ => false,
        }
    }
}

fn hex_value(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => (b - b'0') as u32,
        b'a'..=b'f' => (b - b'a' + 10) as u32,
        b'A'..=b'F' => (b - b'A' + 10) as u32,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::super::Lexer;
    use crate::token::{Lit, Token, TokenKind};
    use qcc_util::{Handler, SourceMap, Standard};

    fn one(text: &str, std: Standard) -> (Token, Handler) {
        let mut map = SourceMap::new();
        let file = map.add_file("num.c", text);
        let handler = Handler::new();
        let tok = {
            let mut lexer = Lexer::new(file, std.features(), &handler);
            lexer.next_token()
        };
        (tok, handler)
    }

    fn int_value(text: &str) -> u64 {
        let (tok, handler) = one(text, Standard::Gnu23);
        assert_eq!(tok.kind, TokenKind::IntLit, "lexing {:?}", text);
        assert!(!handler.has_errors(), "errors lexing {:?}", text);
        match tok.lit {
            Lit::Int { value, .. } => value,
            other => panic!("expected int payload, got {:?}", other),
        }
    }

    #[test]
    fn test_bases() {
        assert_eq!(int_value("42"), 42);
        assert_eq!(int_value("0x2a"), 42);
        assert_eq!(int_value("052"), 42);
        assert_eq!(int_value("0b101010"), 42);
        assert_eq!(int_value("0"), 0);
    }

    #[test]
    fn test_digit_separators() {
        assert_eq!(int_value("1'000'000"), 1_000_000);
        // Without the feature the quote ends the constant.
        let (tok, _) = one("1'000'000", Standard::C89);
        assert_eq!(tok.kind, TokenKind::IntLit);
        assert_eq!(tok.lit, Lit::Int { value: 1, suffix: Default::default() });
    }

    #[test]
    fn test_suffixes() {
        let (tok, _) = one("10ul", Standard::Gnu17);
        match tok.lit {
            Lit::Int { value, suffix } => {
                assert_eq!(value, 10);
                assert!(suffix.unsigned);
                assert_eq!(suffix.longs, 1);
            }
            _ => panic!(),
        }
        let (tok, _) = one("10LL", Standard::Gnu17);
        match tok.lit {
            Lit::Int { suffix, .. } => assert_eq!(suffix.longs, 2),
            _ => panic!(),
        }
    }

    #[test]
    fn test_bad_suffix() {
        let (_, handler) = one("10q", Standard::Gnu17);
        assert!(handler.has_errors());
    }

    #[test]
    fn test_decimal_floats() {
        let (tok, _) = one("3.25", Standard::Gnu17);
        assert_eq!(tok.lit, Lit::Float { value: 3.25, is_f32: false });
        let (tok, _) = one("1e3", Standard::Gnu17);
        assert_eq!(tok.lit, Lit::Float { value: 1000.0, is_f32: false });
        let (tok, _) = one("2.5f", Standard::Gnu17);
        assert_eq!(tok.lit, Lit::Float { value: 2.5, is_f32: true });
        let (tok, _) = one(".5", Standard::Gnu17);
        assert_eq!(tok.lit, Lit::Float { value: 0.5, is_f32: false });
    }

    #[test]
    fn test_hex_float() {
        // 0x1.8p3 = 1.5 * 8 = 12
        let (tok, handler) = one("0x1.8p3", Standard::C99);
        assert!(!handler.has_errors());
        assert_eq!(tok.lit, Lit::Float { value: 12.0, is_f32: false });
    }

    #[test]
    fn test_hex_float_requires_exponent() {
        let (_, handler) = one("0x1.8", Standard::C99);
        assert!(handler.has_errors());
    }

    #[test]
    fn test_overflow_reported() {
        let (_, handler) = one("99999999999999999999999999", Standard::Gnu17);
        assert!(handler.has_errors());
    }

    #[test]
    fn test_octal_bad_digit() {
        let (_, handler) = one("098", Standard::Gnu17);
        assert!(handler.has_errors());
    }
}
