//! qcc-par - Parser (Syntactic Analyzer)
//!
//! A recursive-descent parser with precedence climbing for binary
//! operators. It consumes the preprocessed token stream with one-token
//! look-ahead (newline tokens are discarded at this layer) and produces
//! the typed AST of [`ast`].
//!
//! # Disambiguation
//!
//! The C grammar is context-sensitive: an identifier is a typedef-name
//! iff a visible `typedef` declaration says so. The parser maintains a
//! scoped side table of typedef names and consults it wherever the
//! grammar branches on "type vs expression" (casts, `sizeof`,
//! declaration starts, parameter lists). Struct/union/enum tags live in
//! their own namespace and never collide with it.
//!
//! # Error recovery
//!
//! On a hard mismatch the parser reports a diagnostic, enters *panic
//! mode* (suppressing cascading reports), and synchronizes by advancing
//! to the next statement or declaration start, or just past the next
//! `;`. Panic mode is then cleared.
//!
//! # Example
//!
//! ```
//! use qcc_lex::Lexer;
//! use qcc_par::Parser;
//! use qcc_util::{Handler, SourceMap, Standard};
//!
//! let mut sources = SourceMap::new();
//! let file = sources.add_file("demo.c", "int add(int a, int b) { return a + b; }");
//! let handler = Handler::new();
//! let features = Standard::Gnu17.features();
//! let tokens = Lexer::new(file, features, &handler).tokenize();
//!
//! let mut parser = Parser::new(tokens, features, &handler);
//! let unit = parser.parse();
//! assert_eq!(unit.decls.len(), 1);
//! assert!(!handler.has_errors());
//! ```

pub mod ast;
mod decl;
mod expr;
mod stmt;

pub use ast::*;

use rustc_hash::FxHashSet;

use qcc_lex::{Keyword, Token, TokenKind};
use qcc_util::{FeatureSet, Handler, Span, Symbol};

/// One lexical scope of the parser's disambiguation environment.
#[derive(Default)]
struct ParseScope {
    /// Names registered by `typedef` in this scope.
    typedefs: FxHashSet<Symbol>,
    /// Ordinary declarations that shadow an outer typedef name.
    shadowed: FxHashSet<Symbol>,
}

/// Recursive-descent parser over a preprocessed token stream.
pub struct Parser<'h> {
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) handler: &'h Handler,
    pub(crate) features: FeatureSet,
    scopes: Vec<ParseScope>,
    next_id: NodeId,
    panic_mode: bool,
}

impl<'h> Parser<'h> {
    /// Create a parser. Newline tokens are discarded here; the stream is
    /// terminated with an EOF token if one is missing.
    pub fn new(tokens: Vec<Token>, features: FeatureSet, handler: &'h Handler) -> Self {
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| t.kind != TokenKind::Newline)
            .collect();
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or(Span::DUMMY);
            tokens.push(Token::eof(span));
        }
        Self {
            tokens,
            pos: 0,
            handler,
            features,
            scopes: vec![ParseScope::default()],
            next_id: 0,
            panic_mode: false,
        }
    }

    /// Parse a whole translation unit.
    pub fn parse(&mut self) -> TranslationUnit {
        let mut unit = TranslationUnit::default();
        while !self.check(TokenKind::Eof) {
            let before = self.pos;
            let mut decls = self.parse_external_decl();
            unit.decls.append(&mut decls);
            if self.panic_mode {
                self.synchronize();
            }
            // Never loop without progress.
            if self.pos == before && !self.check(TokenKind::Eof) {
                self.bump();
            }
        }
        unit
    }

    // =========================================================================
    // TOKEN HELPERS
    // =========================================================================

    pub(crate) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    /// Kind of the token `n` positions ahead.
    pub(crate) fn look(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    /// Text of the token `n` positions ahead.
    pub(crate) fn look_text(&self, n: usize) -> Symbol {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.text)
            .unwrap_or_else(|| Symbol::intern(""))
    }

    pub(crate) fn span(&self) -> Span {
        self.peek().span
    }

    pub(crate) fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn check_kw(&self, kw: Keyword) -> bool {
        self.peek_kind() == TokenKind::Kw(kw)
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_kw(&mut self, kw: Keyword) -> bool {
        self.eat(TokenKind::Kw(kw))
    }

    /// Consume a token of the given kind or report an error and enter
    /// panic mode.
    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.check(kind) {
            Some(self.bump())
        } else {
            self.error_here(format!("expected {}", what));
            None
        }
    }

    /// Current position for save/restore during declarator re-parsing.
    pub(crate) fn mark(&self) -> usize {
        self.pos
    }

    pub(crate) fn rewind(&mut self, mark: usize) {
        self.pos = mark;
    }

    // =========================================================================
    // DIAGNOSTICS AND RECOVERY
    // =========================================================================

    /// Report a syntax error at the current token unless already in
    /// panic mode, then enter panic mode.
    pub(crate) fn error_here(&mut self, message: impl Into<String>) {
        if !self.panic_mode {
            let found = describe_token(self.peek());
            self.handler
                .error(format!("{}, found {}", message.into(), found), self.span());
        }
        self.panic_mode = true;
    }

    /// Report an error at a specific span (not a recovery point).
    pub(crate) fn error_at(&mut self, message: impl Into<String>, span: Span) {
        if !self.panic_mode {
            self.handler.error(message, span);
        }
        self.panic_mode = true;
    }

    pub(crate) fn in_panic(&self) -> bool {
        self.panic_mode
    }

    pub(crate) fn clear_panic(&mut self) {
        self.panic_mode = false;
    }

    /// Skip to the next statement or declaration start, or just past the
    /// next `;`, then clear panic mode.
    pub(crate) fn synchronize(&mut self) {
        self.panic_mode = false;
        while !self.check(TokenKind::Eof) {
            if self.eat(TokenKind::Semi) {
                return;
            }
            if self.check(TokenKind::RBrace) {
                return;
            }
            if let TokenKind::Kw(kw) = self.peek_kind() {
                if matches!(
                    kw,
                    Keyword::If
                        | Keyword::While
                        | Keyword::For
                        | Keyword::Do
                        | Keyword::Switch
                        | Keyword::Return
                        | Keyword::Break
                        | Keyword::Continue
                        | Keyword::Goto
                        | Keyword::Typedef
                        | Keyword::Extern
                        | Keyword::Static
                        | Keyword::Struct
                        | Keyword::Union
                        | Keyword::Enum
                        | Keyword::Void
                        | Keyword::Char
                        | Keyword::Int
                        | Keyword::Long
                        | Keyword::Short
                        | Keyword::Float
                        | Keyword::Double
                ) {
                    return;
                }
            }
            self.bump();
        }
    }

    // =========================================================================
    // DISAMBIGUATION ENVIRONMENT
    // =========================================================================

    pub(crate) fn enter_scope(&mut self) {
        self.scopes.push(ParseScope::default());
    }

    pub(crate) fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Register a typedef name in the current scope.
    pub(crate) fn define_typedef(&mut self, name: Symbol) {
        let top = self.scopes.last_mut().expect("scope stack never empty");
        top.shadowed.remove(&name);
        top.typedefs.insert(name);
    }

    /// Register an ordinary declaration, which shadows any outer typedef
    /// of the same name.
    pub(crate) fn define_ordinary(&mut self, name: Symbol) {
        let top = self.scopes.last_mut().expect("scope stack never empty");
        top.typedefs.remove(&name);
        top.shadowed.insert(name);
    }

    /// Is this identifier currently a typedef name?
    pub(crate) fn is_typedef_name(&self, name: Symbol) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.typedefs.contains(&name) {
                return true;
            }
            if scope.shadowed.contains(&name) {
                return false;
            }
        }
        false
    }

    /// Allocate the next expression node id.
    pub(crate) fn fresh_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn mk_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.fresh_id(),
            kind,
            span,
        }
    }
}

/// Human-readable description of a token for diagnostics.
fn describe_token(tok: &Token) -> String {
    match tok.kind {
        TokenKind::Eof => "end of file".to_owned(),
        TokenKind::Ident | TokenKind::IntLit | TokenKind::FloatLit => {
            format!("'{}'", tok.text.as_str())
        }
        TokenKind::StrLit => "string literal".to_owned(),
        TokenKind::CharLit => "character constant".to_owned(),
        _ => format!("'{}'", tok.text.as_str()),
    }
}
