//! Core lexer implementation.
//!
//! The lexer turns one source file's bytes into [`Token`]s, one at a
//! time. Scanning order per call: skip horizontal whitespace and comments
//! (recording *has-space*), then classify by leading byte. Newlines are
//! returned as distinct tokens because the preprocessor is line-oriented;
//! the parser never sees them.
//!
//! Construct gating comes from the effective [`FeatureSet`]: `//`
//! comments, digit separators, binary literals, hex floats, digraphs and
//! unicode escapes each check their feature bit and, where a construct is
//! recognizable but foreign to the selected standard, emit a warning and
//! accept it anyway.

mod ident;
mod number;
mod punct;
mod string;

use std::rc::Rc;

use qcc_util::span::SourceFile;
use qcc_util::{Feature, FeatureSet, Handler, Span, Symbol};

use crate::cursor::Cursor;
use crate::token::{Lit, Token, TokenKind};

/// Lexer over one source file.
pub struct Lexer<'h> {
    pub(crate) cursor: Cursor,
    pub(crate) features: FeatureSet,
    pub(crate) handler: &'h Handler,

    /// Starting byte offset of the current token.
    token_start: usize,
    /// Line where the current token starts (1-based).
    token_line: u32,
    /// Column where the current token starts (1-based).
    token_column: u32,

    /// The next token is the first on its physical line.
    line_start: bool,
    /// Whitespace or a comment immediately precedes the next token.
    space: bool,
}

impl<'h> Lexer<'h> {
    /// Create a lexer over the given file.
    pub fn new(file: Rc<SourceFile>, features: FeatureSet, handler: &'h Handler) -> Self {
        Self {
            cursor: Cursor::new(file),
            features,
            handler,
            token_start: 0,
            token_line: 1,
            token_column: 1,
            line_start: true,
            space: false,
        }
    }

    /// Returns the next token, or an EOF token at end of input.
    pub fn next_token(&mut self) -> Token {
        self.space = false;
        self.skip_space_and_comments();

        self.token_start = self.cursor.position();
        self.token_line = self.cursor.line();
        self.token_column = self.cursor.column();

        if self.cursor.is_at_end() {
            let mut tok = Token::eof(self.token_span());
            tok.at_line_start = self.line_start;
            tok.has_space = self.space;
            return tok;
        }

        match self.cursor.current() {
            b'\n' => {
                self.cursor.advance();
                let tok = self.make_token(TokenKind::Newline, Lit::None);
                // The token after a newline begins a line.
                self.line_start = true;
                tok
            }
            c if ident::is_ident_start(c) => self.lex_identifier(),
            c if c.is_ascii_digit() => self.lex_number(),
            b'.' if self.cursor.peek(1).is_ascii_digit() => self.lex_number(),
            b'\'' => self.lex_char(),
            b'"' => self.lex_string(),
            _ => self.lex_punct(),
        }
    }

    /// The file this lexer reads.
    pub fn source_file(&self) -> &Rc<SourceFile> {
        self.cursor.file()
    }

    /// Collect every remaining token, excluding the final EOF.
    ///
    /// Convenience for tests and for callers that want the whole stream
    /// at once; the preprocessor pulls tokens one at a time instead.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token();
            if tok.is_eof() {
                break;
            }
            tokens.push(tok);
        }
        tokens
    }

    /// Skip horizontal whitespace, line splices, and comments.
    ///
    /// Newlines are not consumed here; they become tokens.
    fn skip_space_and_comments(&mut self) {
        loop {
            match self.cursor.current() {
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => {
                    self.cursor.advance();
                    self.space = true;
                }
                // Backslash-newline splices the physical line.
                b'\\' if self.cursor.peek(1) == b'\n' => {
                    self.cursor.advance_n(2);
                    self.space = true;
                }
                b'/' if self.cursor.peek(1) == b'*' => {
                    self.skip_block_comment();
                    self.space = true;
                }
                b'/' if self.cursor.peek(1) == b'/' => {
                    if !self.features.contains(Feature::LineComments) {
                        self.handler.warning(
                            "'//' comments are not recognized in the selected standard",
                            self.here(),
                        );
                    }
                    while !self.cursor.is_at_end() && self.cursor.current() != b'\n' {
                        self.cursor.advance();
                    }
                    self.space = true;
                }
                _ => break,
            }
        }
    }

    fn skip_block_comment(&mut self) {
        let open = self.here();
        self.cursor.advance_n(2);
        loop {
            if self.cursor.is_at_end() {
                self.handler.error("unterminated comment", open);
                return;
            }
            if self.cursor.current() == b'*' && self.cursor.peek(1) == b'/' {
                self.cursor.advance_n(2);
                return;
            }
            self.cursor.advance();
        }
    }

    /// Finish the current token with the given kind and payload.
    pub(crate) fn make_token(&mut self, kind: TokenKind, lit: Lit) -> Token {
        let text = Symbol::intern(self.cursor.slice_from(self.token_start));
        let tok = Token {
            kind,
            text,
            lit,
            span: self.token_span(),
            at_line_start: self.line_start,
            has_space: self.space,
        };
        self.line_start = false;
        tok
    }

    /// Span of the token currently being scanned.
    pub(crate) fn token_span(&self) -> Span {
        Span::new(
            self.token_start,
            self.cursor.position(),
            self.cursor.file_id(),
            self.token_line,
            self.token_column,
        )
    }

    /// A point span at the current cursor position.
    fn here(&self) -> Span {
        Span::point(self.cursor.file_id(), self.cursor.line(), self.cursor.column())
    }

    /// Report a lexical error anchored at the current token's start.
    pub(crate) fn report_error(&self, message: impl Into<String>) {
        self.handler.error(message, self.token_span());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Keyword;
    use qcc_util::{SourceMap, Standard};

    fn lex_with(text: &str, std: Standard) -> (Vec<Token>, Handler) {
        let mut map = SourceMap::new();
        let file = map.add_file("test.c", text);
        let handler = Handler::new();
        let tokens = {
            let mut lexer = Lexer::new(file, std.features(), &handler);
            lexer.tokenize()
        };
        (tokens, handler)
    }

    fn lex(text: &str) -> Vec<Token> {
        lex_with(text, Standard::Gnu17).0
    }

    fn kinds(text: &str) -> Vec<TokenKind> {
        lex(text).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        let toks = lex("int main");
        assert_eq!(toks[0].kind, TokenKind::Kw(Keyword::Int));
        assert_eq!(toks[1].kind, TokenKind::Ident);
        assert_eq!(toks[1].text.as_str(), "main");
    }

    #[test]
    fn test_maximal_munch() {
        assert_eq!(
            kinds("a <<= b -> c ... >>= ++"),
            vec![
                TokenKind::Ident,
                TokenKind::ShlEq,
                TokenKind::Ident,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::Ellipsis,
                TokenKind::ShrEq,
                TokenKind::PlusPlus,
            ]
        );
    }

    #[test]
    fn test_newline_is_a_token() {
        let toks = lex("a\nb");
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Ident, TokenKind::Newline, TokenKind::Ident]
        );
        assert!(toks[0].at_line_start);
        assert!(toks[2].at_line_start);
    }

    #[test]
    fn test_has_space_flag() {
        let toks = lex("f (x)");
        assert!(!toks[0].has_space);
        assert!(toks[1].has_space, "space before '('");
        assert!(!toks[2].has_space);
    }

    #[test]
    fn test_comments_are_whitespace() {
        let toks = lex("a/*c*/b");
        assert_eq!(toks.len(), 2);
        assert!(toks[1].has_space);
    }

    #[test]
    fn test_line_comment_gated() {
        let (toks, handler) = lex_with("a // trailing\nb", Standard::C89);
        // Warned but accepted.
        assert_eq!(handler.warning_count(), 1);
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Ident, TokenKind::Newline, TokenKind::Ident]
        );
    }

    #[test]
    fn test_unterminated_comment() {
        let (_, handler) = lex_with("a /* no end", Standard::Gnu17);
        assert!(handler.has_errors());
    }

    #[test]
    fn test_line_splice() {
        let toks = lex("ab\\\ncd");
        // Splice joins the physical lines: two identifiers, no newline token.
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[0].text.as_str(), "ab");
        assert_eq!(toks[1].text.as_str(), "cd");
    }

    #[test]
    fn test_digraphs_gated() {
        let (toks, _) = lex_with("<: :> <% %> %:", Standard::C99);
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::LBracket,
                TokenKind::RBracket,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Hash,
            ]
        );
        let (toks, _) = lex_with("<:", Standard::C89);
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::Lt, TokenKind::Colon]
        );
    }

    #[test]
    fn test_spelling_preserved() {
        let src = "x<<=0x1fUL";
        let toks = lex(src);
        let spelled: String = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(spelled, src);
    }

    #[test]
    fn test_relex_fixpoint() {
        // Re-lexing the space-joined spelling of a token stream gives the
        // same kinds and spellings (round-trip modulo comment removal).
        let src = "int f(void){return 1+2*x;}/*gone*/ // gone too\n";
        let toks = lex(src);
        let spelled: String = toks
            .iter()
            .map(|t| {
                let mut s = String::new();
                if t.has_space {
                    s.push(' ');
                }
                s.push_str(if t.kind == TokenKind::Newline { "\n" } else { t.text.as_str() });
                s
            })
            .collect();
        let again = lex(&spelled);
        assert_eq!(
            toks.iter().map(|t| (t.kind, t.text)).collect::<Vec<_>>(),
            again.iter().map(|t| (t.kind, t.text)).collect::<Vec<_>>()
        );
    }
}
