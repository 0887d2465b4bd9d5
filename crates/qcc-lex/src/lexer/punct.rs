//! Punctuation scanning with greedy maximal munch.
//!
//! Three-character operators (`<<=`, `>>=`, `...`) are tried before
//! two-character ones, which are tried before single characters.
//! Digraphs map to their primary spellings when the feature is enabled.

use qcc_util::Feature;

use super::Lexer;
use crate::token::{Lit, Token, TokenKind};

impl<'h> Lexer<'h> {
    pub(crate) fn lex_punct(&mut self) -> Token {
        use TokenKind::*;
        let digraphs = self.features.contains(Feature::Digraphs);
        let b = self.cursor.current();
        let kind = match b {
            b'(' => self.one(LParen),
            b')' => self.one(RParen),
            b'{' => self.one(LBrace),
            b'}' => self.one(RBrace),
            b'[' => self.one(LBracket),
            b']' => self.one(RBracket),
            b';' => self.one(Semi),
            b',' => self.one(Comma),
            b'?' => self.one(Question),
            b'~' => self.one(Tilde),
            b':' => {
                if digraphs && self.cursor.peek(1) == b'>' {
                    self.two(RBracket)
                } else {
                    self.one(Colon)
                }
            }
            b'.' => {
                if self.cursor.peek(1) == b'.' && self.cursor.peek(2) == b'.' {
                    self.three(Ellipsis)
                } else {
                    self.one(Dot)
                }
            }
            b'+' => match self.cursor.peek(1) {
                b'+' => self.two(PlusPlus),
                b'=' => self.two(PlusEq),
                _ => self.one(Plus),
            },
            b'-' => match self.cursor.peek(1) {
                b'-' => self.two(MinusMinus),
                b'=' => self.two(MinusEq),
                b'>' => self.two(Arrow),
                _ => self.one(Minus),
            },
            b'*' => match self.cursor.peek(1) {
                b'=' => self.two(StarEq),
                _ => self.one(Star),
            },
            b'/' => match self.cursor.peek(1) {
                b'=' => self.two(SlashEq),
                _ => self.one(Slash),
            },
            b'%' => match self.cursor.peek(1) {
                b'=' => self.two(PercentEq),
                b'>' if digraphs => self.two(RBrace),
                b':' if digraphs => {
                    // `%:%:` is the `##` digraph.
                    if self.cursor.peek(2) == b'%' && self.cursor.peek(3) == b':' {
                        self.cursor.advance_n(4);
                        HashHash
                    } else {
                        self.two(Hash)
                    }
                }
                _ => self.one(Percent),
            },
            b'=' => match self.cursor.peek(1) {
                b'=' => self.two(EqEq),
                _ => self.one(Eq),
            },
            b'!' => match self.cursor.peek(1) {
                b'=' => self.two(Ne),
                _ => self.one(Bang),
            },
            b'<' => match self.cursor.peek(1) {
                b'<' => {
                    if self.cursor.peek(2) == b'=' {
                        self.three(ShlEq)
                    } else {
                        self.two(Shl)
                    }
                }
                b'=' => self.two(Le),
                b':' if digraphs => self.two(LBracket),
                b'%' if digraphs => self.two(LBrace),
                _ => self.one(Lt),
            },
            b'>' => match self.cursor.peek(1) {
                b'>' => {
                    if self.cursor.peek(2) == b'=' {
                        self.three(ShrEq)
                    } else {
                        self.two(Shr)
                    }
                }
                b'=' => self.two(Ge),
                _ => self.one(Gt),
            },
            b'&' => match self.cursor.peek(1) {
                b'&' => self.two(AmpAmp),
                b'=' => self.two(AmpEq),
                _ => self.one(Amp),
            },
            b'|' => match self.cursor.peek(1) {
                b'|' => self.two(PipePipe),
                b'=' => self.two(PipeEq),
                _ => self.one(Pipe),
            },
            b'^' => match self.cursor.peek(1) {
                b'=' => self.two(CaretEq),
                _ => self.one(Caret),
            },
            b'#' => match self.cursor.peek(1) {
                b'#' => self.two(HashHash),
                _ => self.one(Hash),
            },
            other => {
                self.cursor.advance();
                self.report_error(format!("unknown character '{}'", other as char));
                // Skip the byte and carry on with the next token.
                return self.next_token();
            }
        };
        self.make_token(kind, Lit::None)
    }

    fn one(&mut self, kind: TokenKind) -> TokenKind {
        self.cursor.advance();
        kind
    }

    fn two(&mut self, kind: TokenKind) -> TokenKind {
        self.cursor.advance_n(2);
        kind
    }

    fn three(&mut self, kind: TokenKind) -> TokenKind {
        self.cursor.advance_n(3);
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::super::Lexer;
    use crate::token::TokenKind;
    use qcc_util::{Handler, SourceMap, Standard};

    fn kinds(text: &str) -> (Vec<TokenKind>, Handler) {
        let mut map = SourceMap::new();
        let file = map.add_file("p.c", text);
        let handler = Handler::new();
        let toks = {
            let mut lexer = Lexer::new(file, Standard::Gnu17.features(), &handler);
            lexer.tokenize().into_iter().map(|t| t.kind).collect()
        };
        (toks, handler)
    }

    #[test]
    fn test_compound_assignment_operators() {
        use TokenKind::*;
        let (ks, _) = kinds("+= -= *= /= %= &= |= ^= <<= >>=");
        assert_eq!(
            ks,
            vec![PlusEq, MinusEq, StarEq, SlashEq, PercentEq, AmpEq, PipeEq, CaretEq, ShlEq, ShrEq]
        );
    }

    #[test]
    fn test_shift_vs_relational() {
        use TokenKind::*;
        let (ks, _) = kinds("< << <= <<= > >> >= >>=");
        assert_eq!(ks, vec![Lt, Shl, Le, ShlEq, Gt, Shr, Ge, ShrEq]);
    }

    #[test]
    fn test_hash_tokens() {
        use TokenKind::*;
        let (ks, _) = kinds("# ##");
        assert_eq!(ks, vec![Hash, HashHash]);
    }

    #[test]
    fn test_unknown_character_skipped() {
        use TokenKind::*;
        let (ks, handler) = kinds("a @ b");
        assert!(handler.has_errors());
        assert_eq!(ks, vec![Ident, Ident]);
    }
}
