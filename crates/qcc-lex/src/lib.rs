//! qcc-lex - Lexical Analyzer
//!
//! Transforms a source file's bytes into a stream of [`Token`]s. The
//! lexer is feature-gated: the effective [`FeatureSet`](qcc_util::FeatureSet)
//! decides whether `//` comments, digit separators, binary literals, hex
//! floats, digraphs, and unicode escapes are recognized silently,
//! accepted with a warning, or split differently.
//!
//! Unlike most lexers, newlines are real tokens here: the preprocessor
//! is line-oriented and needs them for directive recognition. Tokens
//! also carry the two flags the preprocessor consumes,
//! *at-beginning-of-line* and *has-whitespace-before*.
//!
//! # Example
//!
//! ```
//! use qcc_lex::{Lexer, TokenKind};
//! use qcc_util::{Handler, SourceMap, Standard};
//!
//! let mut sources = SourceMap::new();
//! let file = sources.add_file("demo.c", "int x = 42;");
//! let handler = Handler::new();
//! let mut lexer = Lexer::new(file, Standard::Gnu17.features(), &handler);
//!
//! let tokens = lexer.tokenize();
//! assert_eq!(tokens.len(), 5);
//! assert_eq!(tokens[1].text.as_str(), "x");
//! assert!(!handler.has_errors());
//! ```

pub mod cursor;
pub mod lexer;
pub mod token;

pub use cursor::Cursor;
pub use lexer::Lexer;
pub use token::{IntSuffix, Keyword, Lit, Token, TokenKind};
