//! qcc-pp - Preprocessor
//!
//! Transforms a lexed token stream into a preprocessed token stream:
//! directive execution, macro definition and expansion, conditional
//! compilation, and `#include` handling.
//!
//! The preprocessor owns one active [`Lexer`] plus a stack of suspended
//! ones, one per open `#include`. It keeps a macro table, a conditional
//! stack, and an actively-expanding stack which implements the "blue
//! paint" re-entry guard: while a macro's expansion is in progress,
//! recursive mentions of the *same* macro name are emitted verbatim.
//!
//! Newline tokens survive preprocessing (the `-E` printer wants line
//! structure); the parser discards them.
//!
//! # Example
//!
//! ```
//! use qcc_pp::{Preprocessor, FsLoader};
//! use qcc_util::{Handler, SourceMap, Standard};
//!
//! let mut sources = SourceMap::new();
//! let file = sources.add_file("demo.c", "#define ANSWER 42\nint x = ANSWER;\n");
//! let handler = Handler::new();
//! let loader = FsLoader::default();
//! let pp = Preprocessor::new(file, Standard::Gnu17.features(), &handler, &mut sources, &loader);
//! let tokens = pp.run();
//!
//! let spelled: Vec<_> = tokens
//!     .iter()
//!     .filter(|t| !t.is_eof() && t.kind != qcc_lex::TokenKind::Newline)
//!     .map(|t| t.text.as_str())
//!     .collect();
//! assert_eq!(spelled, ["int", "x", "=", "42", ";"]);
//! ```

mod cond;
mod eval;
mod include;
mod macros;
mod predefined;

pub use include::{FileLoader, FsLoader, MemoryLoader};
pub use macros::Macro;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use qcc_lex::{Keyword, Lexer, Lit, Token, TokenKind};
use qcc_util::span::SourceFile;
use qcc_util::{FeatureSet, Handler, SourceMap, Span, Symbol};

use cond::CondFrame;

/// Maximum `#include` nesting depth.
const MAX_INCLUDE_DEPTH: usize = 64;

/// The preprocessor for one translation unit.
pub struct Preprocessor<'a> {
    pub(crate) handler: &'a Handler,
    pub(crate) features: FeatureSet,
    pub(crate) sources: &'a mut SourceMap,
    loader: &'a dyn FileLoader,
    include_paths: Vec<PathBuf>,

    /// Macro definitions, in definition order.
    pub(crate) macros: IndexMap<Symbol, Macro>,
    /// Conditional-compilation stack.
    pub(crate) cond_stack: Vec<CondFrame>,
    /// Suspended lexers, one per open `#include`.
    include_stack: Vec<Lexer<'a>>,
    /// The active lexer.
    lexer: Lexer<'a>,
    /// Tokens pushed back onto the stream.
    pending: VecDeque<Token>,
    /// Actively-expanding macro names (the re-entry guard).
    pub(crate) expanding: Vec<Symbol>,
    /// Files marked `#pragma once`.
    once_files: FxHashSet<String>,

    /// `#line` adjustment applied to `__LINE__`.
    line_delta: i64,
    /// `#line` override applied to `__FILE__`.
    file_override: Option<Symbol>,

    out: Vec<Token>,
}

impl<'a> Preprocessor<'a> {
    /// Create a preprocessor over the main file of a translation unit.
    ///
    /// Standard-mandated macros (`__STDC__`, `__FILE__`, ...) are
    /// injected here; command-line definitions layer on top via
    /// [`define_cmdline`](Self::define_cmdline).
    pub fn new(
        file: Rc<SourceFile>,
        features: FeatureSet,
        handler: &'a Handler,
        sources: &'a mut SourceMap,
        loader: &'a dyn FileLoader,
    ) -> Self {
        let lexer = Lexer::new(file, features, handler);
        let mut pp = Self {
            handler,
            features,
            sources,
            loader,
            include_paths: Vec::new(),
            macros: IndexMap::new(),
            cond_stack: Vec::new(),
            include_stack: Vec::new(),
            lexer,
            pending: VecDeque::new(),
            expanding: Vec::new(),
            once_files: FxHashSet::default(),
            line_delta: 0,
            file_override: None,
            out: Vec::new(),
        };
        pp.define_predefined();
        pp
    }

    /// Prepend a user include search path (`-I`).
    pub fn add_include_path(&mut self, path: impl Into<PathBuf>) {
        self.include_paths.push(path.into());
    }

    /// Run to end of input, producing the preprocessed stream.
    ///
    /// The stream ends with a single EOF token.
    pub fn run(mut self) -> Vec<Token> {
        loop {
            let tok = self.next_stream_token();
            if tok.is_eof() {
                if let Some(frame) = self.cond_stack.last() {
                    self.handler
                        .error("unterminated conditional directive", frame.loc);
                }
                self.out.push(tok);
                break;
            }
            match tok.kind {
                TokenKind::Hash if tok.at_line_start => self.directive(),
                TokenKind::Newline => {
                    if !self.skipping() {
                        self.out.push(tok);
                    }
                }
                TokenKind::Ident if !self.skipping() => self.expand_at_top(tok),
                _ => {
                    if !self.skipping() {
                        self.out.push(tok);
                    }
                }
            }
        }
        self.out
    }

    /// Is token emission currently suppressed by a false conditional?
    pub(crate) fn skipping(&self) -> bool {
        self.cond_stack.iter().any(|frame| !frame.active)
    }

    /// Next token from the pushback queue or the lexer stack.
    pub(crate) fn next_stream_token(&mut self) -> Token {
        if let Some(tok) = self.pending.pop_front() {
            return tok;
        }
        loop {
            let tok = self.lexer.next_token();
            if tok.is_eof() {
                if let Some(prev) = self.include_stack.pop() {
                    self.lexer = prev;
                    continue;
                }
            }
            return tok;
        }
    }

    /// Push a token back onto the stream.
    pub(crate) fn push_back(&mut self, tok: Token) {
        self.pending.push_front(tok);
    }

    /// Consume tokens through the end of the current line. The newline
    /// itself is consumed; EOF is pushed back for the main loop.
    pub(crate) fn skip_line(&mut self) {
        loop {
            let tok = self.next_stream_token();
            match tok.kind {
                TokenKind::Newline => return,
                TokenKind::Eof => {
                    self.push_back(tok);
                    return;
                }
                _ => {}
            }
        }
    }

    /// Collect the rest of the current line as tokens. The terminating
    /// newline is consumed but not included.
    pub(crate) fn read_line_tokens(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_stream_token();
            match tok.kind {
                TokenKind::Newline => return tokens,
                TokenKind::Eof => {
                    self.push_back(tok);
                    return tokens;
                }
                _ => tokens.push(tok),
            }
        }
    }

    // =========================================================================
    // DIRECTIVES
    // =========================================================================

    /// Dispatch a directive; the `#` token is already consumed.
    fn directive(&mut self) {
        let name_tok = self.next_stream_token();
        let name = match directive_name(&name_tok) {
            Some(name) => name,
            None => {
                if name_tok.kind == TokenKind::Newline {
                    // Null directive: `#` alone on a line.
                    return;
                }
                if !self.skipping() {
                    self.handler
                        .error("expected directive name after '#'", name_tok.span);
                }
                self.skip_line();
                return;
            }
        };

        match name {
            // Conditional directives execute even while skipping, so the
            // matching #endif is found.
            "if" => self.directive_if(name_tok.span),
            "ifdef" => self.directive_ifdef(name_tok.span, false),
            "ifndef" => self.directive_ifdef(name_tok.span, true),
            "elif" => self.directive_elif(name_tok.span),
            "else" => self.directive_else(name_tok.span),
            "endif" => self.directive_endif(name_tok.span),
            _ if self.skipping() => self.skip_line(),
            "define" => self.directive_define(),
            "undef" => self.directive_undef(),
            "include" => self.directive_include(),
            "error" => self.directive_message(name_tok.span, true),
            "warning" => self.directive_message(name_tok.span, false),
            "line" => self.directive_line(),
            "pragma" => self.directive_pragma(),
            other => {
                self.handler.error(
                    format!("unknown preprocessing directive '#{}'", other),
                    name_tok.span,
                );
                self.skip_line();
            }
        }
    }

    fn directive_undef(&mut self) {
        let tok = self.next_stream_token();
        if tok.kind == TokenKind::Ident {
            self.macros.shift_remove(&tok.text);
        } else {
            self.handler
                .error("expected macro name after #undef", tok.span);
        }
        self.skip_line();
    }

    fn directive_message(&mut self, span: Span, is_error: bool) {
        let tokens = self.read_line_tokens();
        let text = spell_tokens(&tokens);
        if is_error {
            self.handler.error(format!("#error {}", text), span);
        } else {
            self.handler.warning(format!("#warning {}", text), span);
        }
    }

    fn directive_line(&mut self) {
        let tokens = self.read_line_tokens();
        let mut iter = tokens.iter();
        let Some(line_tok) = iter.next() else {
            self.handler
                .error("expected line number after #line", Span::DUMMY);
            return;
        };
        let target = match &line_tok.lit {
            Lit::Int { value, .. } => *value as i64,
            _ => {
                self.handler
                    .error("expected line number after #line", line_tok.span);
                return;
            }
        };
        // The directive names the line number of the *next* line.
        let physical_next = line_tok.span.line as i64 + 1;
        self.line_delta = target - physical_next;
        if let Some(file_tok) = iter.next() {
            if let Lit::Str(bytes) = &file_tok.lit {
                self.file_override =
                    Some(Symbol::intern(&String::from_utf8_lossy(bytes)));
            }
        }
    }

    fn directive_pragma(&mut self) {
        let tokens = self.read_line_tokens();
        if let Some(first) = tokens.first() {
            if first.is_ident("once") {
                let name = self.lexer.source_file().name().to_owned();
                self.once_files.insert(name);
            }
            // Other pragmas are accepted and ignored.
        }
    }

    fn directive_include(&mut self) {
        let tok = self.next_stream_token();
        let (name, angled) = match tok.kind {
            TokenKind::StrLit => {
                let name = match &tok.lit {
                    Lit::Str(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                    _ => String::new(),
                };
                (name, false)
            }
            TokenKind::Lt => {
                let mut name = String::new();
                loop {
                    let part = self.next_stream_token();
                    match part.kind {
                        TokenKind::Gt => break,
                        TokenKind::Newline | TokenKind::Eof => {
                            self.handler
                                .error("expected '>' to close #include file name", tok.span);
                            self.push_back(part);
                            break;
                        }
                        _ => name.push_str(part.text.as_str()),
                    }
                }
                (name, true)
            }
            _ => {
                self.handler
                    .error("expected file name after #include", tok.span);
                self.skip_line();
                return;
            }
        };
        self.skip_line();

        if self.include_stack.len() + 1 >= MAX_INCLUDE_DEPTH {
            self.handler
                .error(format!("#include nested too deeply (limit {})", MAX_INCLUDE_DEPTH), tok.span);
            return;
        }

        let including = self.lexer.source_file().name().to_owned();
        let resolved = include::resolve_include(
            self.loader,
            &including,
            &self.include_paths,
            &name,
            angled,
        );
        let Some(path) = resolved else {
            self.handler
                .error(format!("'{}' file not found", name), tok.span);
            return;
        };
        let path_str = path.to_string_lossy().into_owned();
        if self.once_files.contains(&path_str) {
            return;
        }
        let content = match self.loader.load(&path) {
            Ok(content) => content,
            Err(err) => {
                self.handler
                    .error(format!("cannot read '{}': {}", path_str, err), tok.span);
                return;
            }
        };
        let file = self.sources.add_file(path_str, content);
        let fresh = Lexer::new(file, self.features, self.handler);
        let suspended = std::mem::replace(&mut self.lexer, fresh);
        self.include_stack.push(suspended);
    }

    // =========================================================================
    // DYNAMIC BUILT-INS AND COMMAND-LINE DEFINITIONS
    // =========================================================================

    /// `__FILE__` and `__LINE__` resolve at their expansion site.
    pub(crate) fn dynamic_builtin(&mut self, tok: &Token) -> Option<Token> {
        let name = tok.text.as_str();
        match name {
            "__LINE__" => {
                let line = (tok.span.line as i64 + self.line_delta).max(0) as u64;
                Some(make_int_token(line, tok))
            }
            "__FILE__" => {
                let file = self
                    .file_override
                    .map(|sym| sym.as_str().to_owned())
                    .unwrap_or_else(|| self.lexer.source_file().name().to_owned());
                Some(make_str_token(&file, tok))
            }
            _ => None,
        }
    }

    /// Define a macro from a `-D name[=value]` argument.
    pub fn define_cmdline(&mut self, spec: &str) {
        let (name, value) = match spec.split_once('=') {
            Some((name, value)) => (name, value),
            None => (spec, "1"),
        };
        self.define_object(name, value, "<command line>");
    }

    /// Define an object-like macro whose body is lexed from `value`.
    pub(crate) fn define_object(&mut self, name: &str, value: &str, origin: &str) {
        let file = self.sources.add_file(origin, value.to_owned());
        let mut lexer = Lexer::new(file, self.features, self.handler);
        let body = lexer.tokenize();
        let name_sym = Symbol::intern(name);
        self.macros.insert(
            name_sym,
            Macro {
                name: name_sym,
                function_like: false,
                variadic: false,
                params: Vec::new(),
                body,
                loc: Span::DUMMY,
            },
        );
    }

    /// Lex `text` expecting exactly one token; used by `##` pasting.
    pub(crate) fn relex_one(&mut self, text: &str, site: Span) -> Option<Token> {
        let file = self.sources.add_file("<paste>", text.to_owned());
        let mut lexer = Lexer::new(file, self.features, self.handler);
        let mut tokens = lexer.tokenize();
        if tokens.len() == 1 {
            let mut tok = tokens.pop().expect("len checked");
            tok.span = site;
            tok.at_line_start = false;
            Some(tok)
        } else {
            None
        }
    }
}

/// The directive spelling of a token, if it can name a directive.
fn directive_name(tok: &Token) -> Option<&'static str> {
    match tok.kind {
        TokenKind::Ident => Some(tok.text.as_str()),
        TokenKind::Kw(Keyword::If) => Some("if"),
        TokenKind::Kw(Keyword::Else) => Some("else"),
        _ => None,
    }
}

/// Re-spell a token sequence with single spaces where the source had
/// whitespace.
pub fn spell_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, tok) in tokens.iter().enumerate() {
        if i > 0 && tok.has_space {
            out.push(' ');
        }
        match tok.kind {
            TokenKind::Newline => out.push('\n'),
            _ => out.push_str(tok.text.as_str()),
        }
    }
    out
}

pub(crate) fn make_int_token(value: u64, like: &Token) -> Token {
    Token {
        kind: TokenKind::IntLit,
        text: Symbol::intern(&value.to_string()),
        lit: Lit::Int {
            value,
            suffix: Default::default(),
        },
        span: like.span,
        at_line_start: false,
        has_space: like.has_space,
    }
}

pub(crate) fn make_str_token(value: &str, like: &Token) -> Token {
    Token {
        kind: TokenKind::StrLit,
        text: Symbol::intern(&format!("\"{}\"", value.escape_default())),
        lit: Lit::Str(value.as_bytes().to_vec()),
        span: like.span,
        at_line_start: false,
        has_space: like.has_space,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcc_util::Standard;

    pub(crate) fn preprocess_with(
        text: &str,
        std: Standard,
        loader: &MemoryLoader,
    ) -> (Vec<Token>, Handler) {
        let mut sources = SourceMap::new();
        let file = sources.add_file("main.c", text);
        let handler = Handler::new();
        let tokens = {
            let pp = Preprocessor::new(file, std.features(), &handler, &mut sources, loader);
            pp.run()
        };
        (tokens, handler)
    }

    pub(crate) fn preprocess(text: &str) -> (Vec<Token>, Handler) {
        let loader = MemoryLoader::new();
        preprocess_with(text, Standard::Gnu17, &loader)
    }

    /// Spellings of the significant (non-newline, non-EOF) tokens.
    pub(crate) fn spellings(tokens: &[Token]) -> Vec<&'static str> {
        tokens
            .iter()
            .filter(|t| t.kind != TokenKind::Newline && !t.is_eof())
            .map(|t| t.text.as_str())
            .collect()
    }

    #[test]
    fn test_plain_passthrough() {
        let (toks, handler) = preprocess("int x = 1;\n");
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "x", "=", "1", ";"]);
    }

    #[test]
    fn test_object_macro() {
        let (toks, handler) = preprocess("#define N 10\nint a[N];\n");
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "a", "[", "10", "]", ";"]);
    }

    #[test]
    fn test_undef() {
        let (toks, _) = preprocess("#define N 10\n#undef N\nint a = N;\n");
        assert_eq!(spellings(&toks), ["int", "a", "=", "N", ";"]);
    }

    #[test]
    fn test_null_directive() {
        let (toks, handler) = preprocess("#\nint x;\n");
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "x", ";"]);
    }

    #[test]
    fn test_unknown_directive() {
        let (_, handler) = preprocess("#frobnicate\n");
        assert!(handler.has_errors());
    }

    #[test]
    fn test_error_directive() {
        let (_, handler) = preprocess("#error bad configuration\n");
        assert!(handler.has_errors());
        let rendered = handler.diagnostics();
        assert!(rendered[0].message.contains("bad configuration"));
    }

    #[test]
    fn test_warning_directive() {
        let (_, handler) = preprocess("#warning check me\n");
        assert_eq!(handler.warning_count(), 1);
    }

    #[test]
    fn test_include_quoted() {
        let mut loader = MemoryLoader::new();
        loader.add("defs.h", "#define N 3\n");
        let (toks, handler) =
            preprocess_with("#include \"defs.h\"\nint a = N;\n", Standard::Gnu17, &loader);
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "a", "=", "3", ";"]);
    }

    #[test]
    fn test_include_angled() {
        let mut loader = MemoryLoader::new();
        loader.add("sys/defs.h", "int from_header;\n");
        let mut sources = SourceMap::new();
        let file = sources.add_file("main.c", "#include <defs.h>\n");
        let handler = Handler::new();
        let tokens = {
            let mut pp = Preprocessor::new(
                file,
                Standard::Gnu17.features(),
                &handler,
                &mut sources,
                &loader,
            );
            pp.add_include_path("sys");
            pp.run()
        };
        assert!(!handler.has_errors());
        assert_eq!(spellings(&tokens), ["int", "from_header", ";"]);
    }

    #[test]
    fn test_include_not_found() {
        let (_, handler) = preprocess("#include \"nope.h\"\n");
        assert!(handler.has_errors());
    }

    #[test]
    fn test_pragma_once() {
        let mut loader = MemoryLoader::new();
        loader.add("h.h", "#pragma once\nint one_copy;\n");
        let (toks, handler) = preprocess_with(
            "#include \"h.h\"\n#include \"h.h\"\n",
            Standard::Gnu17,
            &loader,
        );
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "one_copy", ";"]);
    }

    #[test]
    fn test_line_directive_updates_line_macro() {
        let (toks, _) = preprocess("#line 100\nint x = __LINE__;\n");
        assert_eq!(spellings(&toks), ["int", "x", "=", "100", ";"]);
    }

    #[test]
    fn test_file_macro() {
        let (toks, _) = preprocess("const char *f = __FILE__;\n");
        assert!(spellings(&toks).contains(&"\"main.c\""));
    }

    #[test]
    fn test_cmdline_define() {
        let loader = MemoryLoader::new();
        let mut sources = SourceMap::new();
        let file = sources.add_file("main.c", "int v = VALUE;\n");
        let handler = Handler::new();
        let tokens = {
            let mut pp = Preprocessor::new(
                file,
                Standard::Gnu17.features(),
                &handler,
                &mut sources,
                &loader,
            );
            pp.define_cmdline("VALUE=7");
            pp.run()
        };
        assert_eq!(spellings(&tokens), ["int", "v", "=", "7", ";"]);
    }

    #[test]
    fn test_idempotent_on_directive_free_output() {
        let (first, handler) = preprocess("#define TWICE(x) ((x)+(x))\nint y = TWICE(3);\n");
        assert!(!handler.has_errors());
        let rendered: String = first
            .iter()
            .filter(|t| !t.is_eof())
            .map(|t| {
                let mut s = String::new();
                if t.has_space {
                    s.push(' ');
                }
                s.push_str(if t.kind == TokenKind::Newline { "\n" } else { t.text.as_str() });
                s
            })
            .collect();
        let (second, handler2) = preprocess(&rendered);
        assert!(!handler2.has_errors());
        assert_eq!(spellings(&first), spellings(&second));
    }
}
