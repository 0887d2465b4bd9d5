//! Property tests for the lexer.
//!
//! Re-lexing the space-joined spelling of a token stream yields the
//! same kinds and spellings: tokenization is a fixpoint over its own
//! output (the round-trip property, modulo comment removal).

use proptest::prelude::*;

use qcc_lex::{Lexer, TokenKind};
use qcc_util::{Handler, SourceMap, Standard};

fn lex(text: &str) -> (Vec<(TokenKind, String)>, Handler) {
    let mut sources = SourceMap::new();
    let file = sources.add_file("prop.c", text);
    let handler = Handler::new();
    let tokens = {
        let mut lexer = Lexer::new(file, Standard::Gnu17.features(), &handler);
        lexer
            .tokenize()
            .into_iter()
            .map(|t| (t.kind, t.text.as_str().to_owned()))
            .collect()
    };
    (tokens, handler)
}

fn vocabulary() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("int"),
        Just("return"),
        Just("while"),
        Just("x"),
        Just("count"),
        Just("_tmp1"),
        Just("0"),
        Just("42"),
        Just("0x1f"),
        Just("0755"),
        Just("1.5"),
        Just("2e3"),
        Just("10uL"),
        Just("'c'"),
        Just("\"str\""),
        Just("+"),
        Just("-"),
        Just("*"),
        Just("/"),
        Just("%"),
        Just("<<="),
        Just(">>"),
        Just("->"),
        Just("..."),
        Just("&&"),
        Just("|"),
        Just("=="),
        Just("="),
        Just("("),
        Just(")"),
        Just("{"),
        Just("}"),
        Just("["),
        Just("]"),
        Just(";"),
        Just(","),
        Just("?"),
        Just(":"),
    ]
}

proptest! {
    #[test]
    fn test_relex_fixpoint(words in proptest::collection::vec(vocabulary(), 0..48)) {
        let source = words.join(" ");
        let (first, handler) = lex(&source);
        prop_assert!(!handler.has_errors(), "vocabulary inputs lex cleanly");

        let spelled = first
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let (second, handler2) = lex(&spelled);
        prop_assert!(!handler2.has_errors());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_spelling_concatenation_reproduces_input(words in proptest::collection::vec(vocabulary(), 0..48)) {
        // With the recorded leading whitespace restored, concatenating
        // raw token text reproduces the input exactly.
        let source = words.join(" ");
        let mut sources = SourceMap::new();
        let file = sources.add_file("prop.c", source.clone());
        let handler = Handler::new();
        let tokens = Lexer::new(file, Standard::Gnu17.features(), &handler).tokenize();

        let mut rebuilt = String::new();
        for (i, tok) in tokens.iter().enumerate() {
            if i > 0 && tok.has_space {
                rebuilt.push(' ');
            }
            rebuilt.push_str(tok.text.as_str());
        }
        prop_assert_eq!(rebuilt, source);
    }
}
