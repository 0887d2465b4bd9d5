//! `#if` expression evaluation.
//!
//! A recursive-descent evaluator over the same binary/unary/ternary
//! precedence as C, computing a 64-bit signed integer. `defined(name)`
//! and `defined name` are primitives handled before macro expansion;
//! identifiers that survive expansion evaluate to 0. Division or modulo
//! by zero reports an error and yields 0.

use qcc_lex::{Lit, Token, TokenKind};
use qcc_util::{Span, Symbol};

use crate::{make_int_token, Preprocessor};

impl<'a> Preprocessor<'a> {
    /// Evaluate a `#if`/`#elif` controlling expression.
    pub(crate) fn eval_condition(&mut self, tokens: &[Token]) -> i64 {
        let resolved = self.resolve_defined(tokens);
        let expanded = self.expand_list(&resolved);
        let mut eval = CondEval {
            pp: self,
            tokens: &expanded,
            pos: 0,
        };
        let value = eval.ternary();
        if eval.pos < expanded.len() {
            let span = expanded[eval.pos].span;
            self.handler
                .error("extra tokens after #if expression", span);
        }
        value
    }

    /// Replace `defined X` / `defined(X)` with 1 or 0 before macro
    /// expansion touches the operand.
    fn resolve_defined(&mut self, tokens: &[Token]) -> Vec<Token> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            if tok.kind == TokenKind::Ident && tok.text.as_str() == "defined" {
                let (name, next) = if tokens.get(i + 1).map(|t| t.kind) == Some(TokenKind::LParen) {
                    let name = tokens.get(i + 2);
                    let close = tokens.get(i + 3);
                    if close.map(|t| t.kind) != Some(TokenKind::RParen) {
                        self.handler
                            .error("missing ')' after 'defined'", tok.span);
                    }
                    (name, i + 4)
                } else {
                    (tokens.get(i + 1), i + 2)
                };
                let value = match name {
                    Some(name_tok) if name_tok.kind == TokenKind::Ident => {
                        self.macros.contains_key(&name_tok.text) as u64
                    }
                    _ => {
                        self.handler
                            .error("operand of 'defined' must be an identifier", tok.span);
                        0
                    }
                };
                out.push(make_int_token(value, tok));
                i = next;
            } else {
                out.push(tok.clone());
                i += 1;
            }
        }
        out
    }
}

struct CondEval<'p, 'a> {
    pp: &'p Preprocessor<'a>,
    tokens: &'p [Token],
    pos: usize,
}

impl<'p, 'a> CondEval<'p, 'a> {
    fn peek(&self) -> TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| t.span)
            .unwrap_or(Span::DUMMY)
    }

    fn bump(&mut self) -> Option<&'p Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) {
        self.pp.handler.error(message, self.span());
    }

    fn ternary(&mut self) -> i64 {
        let cond = self.logical_or();
        if self.eat(TokenKind::Question) {
            let then = self.ternary();
            if !self.eat(TokenKind::Colon) {
                self.error("expected ':' in conditional expression");
            }
            let otherwise = self.ternary();
            return if cond != 0 { then } else { otherwise };
        }
        cond
    }

    fn logical_or(&mut self) -> i64 {
        let mut value = self.logical_and();
        while self.eat(TokenKind::PipePipe) {
            let rhs = self.logical_and();
            value = ((value != 0) || (rhs != 0)) as i64;
        }
        value
    }

    fn logical_and(&mut self) -> i64 {
        let mut value = self.bit_or();
        while self.eat(TokenKind::AmpAmp) {
            let rhs = self.bit_or();
            value = ((value != 0) && (rhs != 0)) as i64;
        }
        value
    }

    fn bit_or(&mut self) -> i64 {
        let mut value = self.bit_xor();
        while self.eat(TokenKind::Pipe) {
            value |= self.bit_xor();
        }
        value
    }

    fn bit_xor(&mut self) -> i64 {
        let mut value = self.bit_and();
        while self.eat(TokenKind::Caret) {
            value ^= self.bit_and();
        }
        value
    }

    fn bit_and(&mut self) -> i64 {
        let mut value = self.equality();
        while self.eat(TokenKind::Amp) {
            value &= self.equality();
        }
        value
    }

    fn equality(&mut self) -> i64 {
        let mut value = self.relational();
        loop {
            if self.eat(TokenKind::EqEq) {
                value = (value == self.relational()) as i64;
            } else if self.eat(TokenKind::Ne) {
                value = (value != self.relational()) as i64;
            } else {
                return value;
            }
        }
    }

    fn relational(&mut self) -> i64 {
        let mut value = self.shift();
        loop {
            if self.eat(TokenKind::Lt) {
                value = (value < self.shift()) as i64;
            } else if self.eat(TokenKind::Le) {
                value = (value <= self.shift()) as i64;
            } else if self.eat(TokenKind::Gt) {
                value = (value > self.shift()) as i64;
            } else if self.eat(TokenKind::Ge) {
                value = (value >= self.shift()) as i64;
            } else {
                return value;
            }
        }
    }

    fn shift(&mut self) -> i64 {
        let mut value = self.additive();
        loop {
            if self.eat(TokenKind::Shl) {
                value = value.wrapping_shl(self.additive() as u32);
            } else if self.eat(TokenKind::Shr) {
                value = value.wrapping_shr(self.additive() as u32);
            } else {
                return value;
            }
        }
    }

    fn additive(&mut self) -> i64 {
        let mut value = self.multiplicative();
        loop {
            if self.eat(TokenKind::Plus) {
                value = value.wrapping_add(self.multiplicative());
            } else if self.eat(TokenKind::Minus) {
                value = value.wrapping_sub(self.multiplicative());
            } else {
                return value;
            }
        }
    }

    fn multiplicative(&mut self) -> i64 {
        let mut value = self.unary();
        loop {
            if self.eat(TokenKind::Star) {
                value = value.wrapping_mul(self.unary());
            } else if self.eat(TokenKind::Slash) {
                let rhs = self.unary();
                if rhs == 0 {
                    self.error("division by zero in #if expression");
                    value = 0;
                } else {
                    value = value.wrapping_div(rhs);
                }
            } else if self.eat(TokenKind::Percent) {
                let rhs = self.unary();
                if rhs == 0 {
                    self.error("remainder by zero in #if expression");
                    value = 0;
                } else {
                    value = value.wrapping_rem(rhs);
                }
            } else {
                return value;
            }
        }
    }

    fn unary(&mut self) -> i64 {
        if self.eat(TokenKind::Minus) {
            return self.unary().wrapping_neg();
        }
        if self.eat(TokenKind::Plus) {
            return self.unary();
        }
        if self.eat(TokenKind::Bang) {
            return (self.unary() == 0) as i64;
        }
        if self.eat(TokenKind::Tilde) {
            return !self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> i64 {
        if self.eat(TokenKind::LParen) {
            let value = self.ternary();
            if !self.eat(TokenKind::RParen) {
                self.error("expected ')' in #if expression");
            }
            return value;
        }
        let Some(tok) = self.bump() else {
            self.error("expected expression in #if");
            return 0;
        };
        match (&tok.kind, &tok.lit) {
            (TokenKind::IntLit, Lit::Int { value, .. }) => *value as i64,
            (TokenKind::CharLit, Lit::Char(code)) => *code as i64,
            // Unknown identifiers (and stray keywords) evaluate to 0.
            (TokenKind::Ident, _) | (TokenKind::Kw(_), _) => 0,
            (TokenKind::FloatLit, _) => {
                self.error("floating constants are not permitted in #if");
                0
            }
            _ => {
                self.pp
                    .handler
                    .error("invalid token in #if expression", tok.span);
                0
            }
        }
    }
}

// Referenced for the `defined` rewrite; keeps the symbol crate-local.
#[allow(dead_code)]
fn _symbol_anchor(_s: Symbol) {}

#[cfg(test)]
mod tests {
    use crate::tests::{preprocess, spellings};

    fn branch_taken(expr: &str) -> bool {
        let src = format!("#if {}\nint yes;\n#else\nint no;\n#endif\n", expr);
        let (toks, _) = preprocess(&src);
        spellings(&toks) == ["int", "yes", ";"]
    }

    #[test]
    fn test_arithmetic() {
        assert!(branch_taken("1 + 2 * 3 == 7"));
        assert!(branch_taken("(1 + 2) * 3 == 9"));
        assert!(branch_taken("10 / 3 == 3"));
        assert!(branch_taken("10 % 3 == 1"));
        assert!(branch_taken("-2 + 3 == 1"));
    }

    #[test]
    fn test_precedence_and_logic() {
        assert!(branch_taken("1 << 3 == 8"));
        assert!(branch_taken("(3 & 1) == 1"));
        assert!(branch_taken("1 || 0"));
        assert!(!branch_taken("1 && 0"));
        assert!(branch_taken("!0"));
        assert!(branch_taken("~0 == -1"));
    }

    #[test]
    fn test_ternary() {
        assert!(branch_taken("1 ? 1 : 0"));
        assert!(!branch_taken("0 ? 1 : 0"));
    }

    #[test]
    fn test_unknown_identifier_is_zero() {
        assert!(!branch_taken("TOTALLY_UNDEFINED"));
        assert!(branch_taken("TOTALLY_UNDEFINED == 0"));
    }

    #[test]
    fn test_defined_forms() {
        let src = "#define X 1\n#if defined(X) && defined X && !defined(Y)\nint yes;\n#endif\n";
        let (toks, handler) = preprocess(src);
        assert!(!handler.has_errors());
        assert_eq!(spellings(&toks), ["int", "yes", ";"]);
    }

    #[test]
    fn test_defined_operand_not_expanded() {
        // X expands to Y; `defined X` must test X itself.
        let src = "#define X Y\n#if defined(X)\nint yes;\n#endif\n";
        let (toks, _) = preprocess(src);
        assert_eq!(spellings(&toks), ["int", "yes", ";"]);
    }

    #[test]
    fn test_macro_expansion_in_condition() {
        let src = "#define LIMIT 10\n#if LIMIT > 5\nint yes;\n#endif\n";
        let (toks, _) = preprocess(src);
        assert_eq!(spellings(&toks), ["int", "yes", ";"]);
    }

    #[test]
    fn test_division_by_zero() {
        let src = "#if 1 / 0\nint yes;\n#else\nint no;\n#endif\n";
        let (toks, handler) = preprocess(src);
        assert!(handler.has_errors());
        // Yields 0: the else branch is taken.
        assert_eq!(spellings(&toks), ["int", "no", ";"]);
    }

    #[test]
    fn test_char_constant() {
        assert!(branch_taken("'A' == 65"));
    }

    #[test]
    fn test_stdc_predefined() {
        assert!(branch_taken("__STDC__"));
        assert!(branch_taken("__STDC_VERSION__ == 201710L"));
    }
}
