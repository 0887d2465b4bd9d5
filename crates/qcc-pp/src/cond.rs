//! Conditional compilation (`#if` family).
//!
//! Every `#if`/`#ifdef`/`#ifndef` pushes a frame; `#elif` flips the
//! current branch only if no prior branch of the frame was true; `#else`
//! takes the remainder; `#endif` pops. Global *skip mode* is the OR of
//! all frames' inactive bits: token emission is suppressed while any
//! frame is false, but directives still execute so the matching `#endif`
//! is found.

use qcc_lex::TokenKind;
use qcc_util::Span;

use crate::Preprocessor;

/// One open conditional.
#[derive(Debug)]
pub(crate) struct CondFrame {
    /// The current branch is emitting tokens.
    pub(crate) active: bool,
    /// Some branch of this frame has been true.
    pub(crate) any_true: bool,
    /// `#else` has been seen; further `#elif`/`#else` are errors.
    pub(crate) seen_else: bool,
    /// The enclosing context was emitting when this frame opened.
    pub(crate) parent_active: bool,
    /// Location of the opening directive.
    pub(crate) loc: Span,
}

impl<'a> Preprocessor<'a> {
    pub(crate) fn directive_if(&mut self, loc: Span) {
        let parent_active = !self.skipping();
        let tokens = self.read_line_tokens();
        let truth = if parent_active {
            if tokens.is_empty() {
                self.handler.error("#if with no expression", loc);
                false
            } else {
                self.eval_condition(&tokens) != 0
            }
        } else {
            false
        };
        self.cond_stack.push(CondFrame {
            active: parent_active && truth,
            any_true: truth,
            seen_else: false,
            parent_active,
            loc,
        });
    }

    pub(crate) fn directive_ifdef(&mut self, loc: Span, negated: bool) {
        let parent_active = !self.skipping();
        let tok = self.next_stream_token();
        let defined = match tok.kind {
            TokenKind::Ident => self.macros.contains_key(&tok.text),
            _ => {
                if parent_active {
                    self.handler
                        .error("expected macro name after #ifdef/#ifndef", tok.span);
                }
                false
            }
        };
        self.skip_line();
        let truth = defined != negated;
        self.cond_stack.push(CondFrame {
            active: parent_active && truth,
            any_true: parent_active && truth,
            seen_else: false,
            parent_active,
            loc,
        });
    }

    pub(crate) fn directive_elif(&mut self, loc: Span) {
        let tokens = self.read_line_tokens();
        let Some(frame_idx) = self.cond_stack.len().checked_sub(1) else {
            self.handler.error("#elif without #if", loc);
            return;
        };
        let (parent_active, any_true, seen_else) = {
            let frame = &self.cond_stack[frame_idx];
            (frame.parent_active, frame.any_true, frame.seen_else)
        };
        if seen_else {
            self.handler.error("#elif after #else", loc);
            return;
        }
        let truth = if parent_active && !any_true {
            !tokens.is_empty() && self.eval_condition(&tokens) != 0
        } else {
            false
        };
        let frame = &mut self.cond_stack[frame_idx];
        frame.active = truth;
        frame.any_true |= truth;
    }

    pub(crate) fn directive_else(&mut self, loc: Span) {
        self.skip_line();
        let Some(frame) = self.cond_stack.last_mut() else {
            self.handler.error("#else without #if", loc);
            return;
        };
        if frame.seen_else {
            self.handler.error("#else after #else", loc);
            return;
        }
        frame.seen_else = true;
        frame.active = frame.parent_active && !frame.any_true;
        frame.any_true = true;
    }

    pub(crate) fn directive_endif(&mut self, loc: Span) {
        self.skip_line();
        if self.cond_stack.pop().is_none() {
            self.handler.error("#endif without #if", loc);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::tests::{preprocess, spellings};

    #[test]
    fn test_if_true_branch() {
        let (toks, handler) =
            preprocess("#define FOO 1\n#if FOO\nint x = 10;\n#else\nint x = 20;\n#endif\n");
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "x", "=", "10", ";"]);
    }

    #[test]
    fn test_if_false_branch() {
        let (toks, handler) =
            preprocess("#define FOO 0\n#if FOO\nint x = 10;\n#else\nint x = 20;\n#endif\n");
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "x", "=", "20", ";"]);
    }

    #[test]
    fn test_ifdef() {
        let (toks, _) = preprocess("#define YES\n#ifdef YES\nint a;\n#endif\n#ifdef NO\nint b;\n#endif\n");
        assert_eq!(spellings(&toks), ["int", "a", ";"]);
    }

    #[test]
    fn test_ifndef() {
        let (toks, _) = preprocess("#ifndef NOPE\nint a;\n#endif\n");
        assert_eq!(spellings(&toks), ["int", "a", ";"]);
    }

    #[test]
    fn test_elif_chain_first_true_wins() {
        let src = "#define V 2\n#if V == 1\nint a;\n#elif V == 2\nint b;\n#elif V == 2\nint c;\n#else\nint d;\n#endif\n";
        let (toks, handler) = preprocess(src);
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "b", ";"]);
    }

    #[test]
    fn test_nested_conditionals_in_skipped_region() {
        let src = "#if 0\n#if 1\nint a;\n#endif\nint b;\n#else\nint c;\n#endif\n";
        let (toks, handler) = preprocess(src);
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "c", ";"]);
    }

    #[test]
    fn test_directives_execute_while_skipping() {
        // The #define inside the dead branch must not take effect.
        let src = "#if 0\n#define N 1\n#endif\n#ifdef N\nint yes;\n#else\nint no;\n#endif\n";
        let (toks, _) = preprocess(src);
        assert_eq!(spellings(&toks), ["int", "no", ";"]);
    }

    #[test]
    fn test_unterminated_conditional() {
        let (_, handler) = preprocess("#if 1\nint x;\n");
        assert!(handler.has_errors());
    }

    #[test]
    fn test_unmatched_else_endif() {
        let (_, handler) = preprocess("#else\n");
        assert!(handler.has_errors());
        let (_, handler) = preprocess("#endif\n");
        assert!(handler.has_errors());
        let (_, handler) = preprocess("#elif 1\n");
        assert!(handler.has_errors());
    }

    #[test]
    fn test_double_else() {
        let (_, handler) = preprocess("#if 1\n#else\n#else\n#endif\n");
        assert!(handler.has_errors());
    }
}
