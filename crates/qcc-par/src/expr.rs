//! Expression parsing using precedence climbing.
//!
//! # Operator precedence (lowest to highest)
//!
//! | Level | Operators | Associativity |
//! |-------|-----------|---------------|
//! | 1 | `,` | Left |
//! | 2 | `=` and compound assignment | Right |
//! | 3 | `?:` | Right |
//! | 4 | `\|\|` | Left |
//! | 5 | `&&` | Left |
//! | 6 | `\|` | Left |
//! | 7 | `^` | Left |
//! | 8 | `&` | Left |
//! | 9 | `==`, `!=` | Left |
//! | 10 | `<`, `<=`, `>`, `>=` | Left |
//! | 11 | `<<`, `>>` | Left |
//! | 12 | `+`, `-` | Left |
//! | 13 | `*`, `/`, `%` | Left |
//!
//! Unary, cast, and postfix operators bind above all of these.

use qcc_lex::{Keyword, Lit, TokenKind};
use qcc_util::{Feature, Symbol};

use crate::ast::*;
use crate::Parser;

/// Binding power levels for the climbing loop. Higher binds tighter.
mod bp {
    pub const MIN: u8 = 0;
    pub const LOGICAL_OR: u8 = 2;
    pub const LOGICAL_AND: u8 = 4;
    pub const BITWISE_OR: u8 = 6;
    pub const BITWISE_XOR: u8 = 8;
    pub const BITWISE_AND: u8 = 10;
    pub const EQUALITY: u8 = 12;
    pub const RELATIONAL: u8 = 14;
    pub const SHIFT: u8 = 16;
    pub const ADDITIVE: u8 = 18;
    pub const MULTIPLICATIVE: u8 = 20;
}

/// Binary operator and its left binding power for a token kind.
fn binary_op(kind: TokenKind) -> Option<(BinOp, u8)> {
    use bp::*;
    Some(match kind {
        TokenKind::PipePipe => (BinOp::LogOr, LOGICAL_OR),
        TokenKind::AmpAmp => (BinOp::LogAnd, LOGICAL_AND),
        TokenKind::Pipe => (BinOp::BitOr, BITWISE_OR),
        TokenKind::Caret => (BinOp::BitXor, BITWISE_XOR),
        TokenKind::Amp => (BinOp::BitAnd, BITWISE_AND),
        TokenKind::EqEq => (BinOp::Eq, EQUALITY),
        TokenKind::Ne => (BinOp::Ne, EQUALITY),
        TokenKind::Lt => (BinOp::Lt, RELATIONAL),
        TokenKind::Le => (BinOp::Le, RELATIONAL),
        TokenKind::Gt => (BinOp::Gt, RELATIONAL),
        TokenKind::Ge => (BinOp::Ge, RELATIONAL),
        TokenKind::Shl => (BinOp::Shl, SHIFT),
        TokenKind::Shr => (BinOp::Shr, SHIFT),
        TokenKind::Plus => (BinOp::Add, ADDITIVE),
        TokenKind::Minus => (BinOp::Sub, ADDITIVE),
        TokenKind::Star => (BinOp::Mul, MULTIPLICATIVE),
        TokenKind::Slash => (BinOp::Div, MULTIPLICATIVE),
        TokenKind::Percent => (BinOp::Rem, MULTIPLICATIVE),
        _ => return None,
    })
}

/// Compound-assignment operator for a token kind.
fn assign_op(kind: TokenKind) -> Option<Option<BinOp>> {
    Some(match kind {
        TokenKind::Eq => None,
        TokenKind::PlusEq => Some(BinOp::Add),
        TokenKind::MinusEq => Some(BinOp::Sub),
        TokenKind::StarEq => Some(BinOp::Mul),
        TokenKind::SlashEq => Some(BinOp::Div),
        TokenKind::PercentEq => Some(BinOp::Rem),
        TokenKind::AmpEq => Some(BinOp::BitAnd),
        TokenKind::PipeEq => Some(BinOp::BitOr),
        TokenKind::CaretEq => Some(BinOp::BitXor),
        TokenKind::ShlEq => Some(BinOp::Shl),
        TokenKind::ShrEq => Some(BinOp::Shr),
        _ => return None,
    })
}

impl<'h> Parser<'h> {
    /// Full expression, including the comma operator.
    pub(crate) fn parse_expr(&mut self) -> Expr {
        let mut lhs = self.parse_assign_expr();
        while self.check(TokenKind::Comma) {
            let span = self.bump().span;
            let rhs = self.parse_assign_expr();
            lhs = self.mk_expr(
                ExprKind::Comma {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        lhs
    }

    /// Assignment expression (right-associative).
    pub(crate) fn parse_assign_expr(&mut self) -> Expr {
        let lhs = self.parse_conditional_expr();
        if let Some(op) = assign_op(self.peek_kind()) {
            let span = self.bump().span;
            let rhs = self.parse_assign_expr();
            return self.mk_expr(
                ExprKind::Assign {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        lhs
    }

    /// Conditional expression (`?:`, right-associative).
    pub(crate) fn parse_conditional_expr(&mut self) -> Expr {
        let cond = self.parse_binary_expr(bp::MIN);
        if !self.check(TokenKind::Question) {
            return cond;
        }
        let span = self.bump().span;
        let then = self.parse_expr();
        self.expect(TokenKind::Colon, "':' in conditional expression");
        let otherwise = self.parse_conditional_expr();
        self.mk_expr(
            ExprKind::Cond {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span,
        )
    }

    /// The precedence-climbing core. Only operators with left binding
    /// power >= `min_bp` are consumed; left associativity comes from
    /// re-entering with `lbp + 1`.
    fn parse_binary_expr(&mut self, min_bp: u8) -> Expr {
        let mut lhs = self.parse_unary_expr();
        loop {
            let Some((op, lbp)) = binary_op(self.peek_kind()) else {
                return lhs;
            };
            if lbp < min_bp {
                return lhs;
            }
            let span = self.bump().span;
            let rhs = self.parse_binary_expr(lbp + 1);
            lhs = self.mk_expr(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
    }

    /// Unary and cast expressions.
    fn parse_unary_expr(&mut self) -> Expr {
        let span = self.span();
        let op = match self.peek_kind() {
            TokenKind::Plus => Some(UnOp::Plus),
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            TokenKind::Tilde => Some(UnOp::BitNot),
            TokenKind::Star => Some(UnOp::Deref),
            TokenKind::Amp => Some(UnOp::AddrOf),
            TokenKind::PlusPlus => Some(UnOp::PreInc),
            TokenKind::MinusMinus => Some(UnOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary_expr();
            return self.mk_expr(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            );
        }

        if self.check_kw(Keyword::Sizeof) {
            self.bump();
            if self.check(TokenKind::LParen) && self.token_starts_type(1) {
                self.bump();
                let ty = self
                    .parse_type_name()
                    .unwrap_or_else(|| TyExpr::int(span));
                self.expect(TokenKind::RParen, "')' after sizeof type");
                return self.mk_expr(ExprKind::SizeofType(ty), span);
            }
            let operand = self.parse_unary_expr();
            return self.mk_expr(ExprKind::SizeofExpr(Box::new(operand)), span);
        }

        // A parenthesized type name is a cast.
        if self.check(TokenKind::LParen) && self.token_starts_type(1) {
            self.bump();
            let ty = self
                .parse_type_name()
                .unwrap_or_else(|| TyExpr::int(span));
            self.expect(TokenKind::RParen, "')' after cast type");
            let operand = self.parse_unary_expr();
            return self.mk_expr(
                ExprKind::Cast {
                    ty,
                    operand: Box::new(operand),
                },
                span,
            );
        }

        self.parse_postfix_expr()
    }

    /// Does the token `n` ahead start a type name?
    pub(crate) fn token_starts_type(&self, n: usize) -> bool {
        match self.look(n) {
            TokenKind::Kw(kw) => matches!(
                kw,
                Keyword::Void
                    | Keyword::Char
                    | Keyword::Short
                    | Keyword::Int
                    | Keyword::Long
                    | Keyword::Float
                    | Keyword::Double
                    | Keyword::Signed
                    | Keyword::Unsigned
                    | Keyword::Bool
                    | Keyword::Struct
                    | Keyword::Union
                    | Keyword::Enum
                    | Keyword::Const
                    | Keyword::Volatile
                    | Keyword::Restrict
                    | Keyword::Atomic
                    | Keyword::Typeof
            ),
            TokenKind::Ident => self.is_typedef_name(self.look_text(n)),
            _ => false,
        }
    }

    /// Postfix expressions: calls, subscripts, member access,
    /// post-increment/decrement.
    fn parse_postfix_expr(&mut self) -> Expr {
        let mut expr = self.parse_primary_expr();
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let span = self.bump().span;
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_assign_expr());
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')' after call arguments");
                    expr = self.mk_expr(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    let span = self.bump().span;
                    let index = self.parse_expr();
                    self.expect(TokenKind::RBracket, "']' after subscript");
                    expr = self.mk_expr(
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = self.peek_kind() == TokenKind::Arrow;
                    let span = self.bump().span;
                    let field = self
                        .expect(TokenKind::Ident, "member name")
                        .map(|t| t.text)
                        .unwrap_or_else(|| Symbol::intern("<error>"));
                    expr = self.mk_expr(
                        ExprKind::Member {
                            base: Box::new(expr),
                            field,
                            arrow,
                        },
                        span,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let inc = self.peek_kind() == TokenKind::PlusPlus;
                    let span = self.bump().span;
                    expr = self.mk_expr(
                        ExprKind::PostIncDec {
                            inc,
                            operand: Box::new(expr),
                        },
                        span,
                    );
                }
                _ => return expr,
            }
        }
    }

    fn parse_primary_expr(&mut self) -> Expr {
        let span = self.span();
        match self.peek_kind() {
            TokenKind::IntLit => {
                let tok = self.bump();
                let (value, suffix) = match tok.lit {
                    Lit::Int { value, suffix } => (value, suffix),
                    _ => (0, Default::default()),
                };
                self.mk_expr(ExprKind::IntLit { value, suffix }, span)
            }
            TokenKind::FloatLit => {
                let tok = self.bump();
                let (value, is_f32) = match tok.lit {
                    Lit::Float { value, is_f32 } => (value, is_f32),
                    _ => (0.0, false),
                };
                self.mk_expr(ExprKind::FloatLit { value, is_f32 }, span)
            }
            TokenKind::CharLit => {
                let tok = self.bump();
                let code = match tok.lit {
                    Lit::Char(code) => code,
                    _ => 0,
                };
                self.mk_expr(ExprKind::CharLit(code), span)
            }
            TokenKind::StrLit => {
                // Adjacent string literals concatenate.
                let mut bytes = Vec::new();
                while self.check(TokenKind::StrLit) {
                    let tok = self.bump();
                    if let Lit::Str(part) = tok.lit {
                        bytes.extend_from_slice(&part);
                    }
                }
                self.mk_expr(ExprKind::StrLit(bytes), span)
            }
            TokenKind::Ident => {
                let tok = self.bump();
                self.mk_expr(ExprKind::Ident(tok.text), span)
            }
            TokenKind::Kw(Keyword::Generic) => self.parse_generic_selection(),
            TokenKind::LParen => {
                // GNU statement expression: `({ ... })`.
                if self.look(1) == TokenKind::LBrace {
                    if !self.features.contains(Feature::StmtExpr) {
                        self.handler.warning(
                            "statement expressions are not recognized in the selected standard",
                            span,
                        );
                    }
                    self.bump();
                    self.expect(TokenKind::LBrace, "'{'");
                    self.enter_scope();
                    let items = self.parse_block_items();
                    self.exit_scope();
                    self.expect(TokenKind::RBrace, "'}' to close statement expression");
                    self.expect(TokenKind::RParen, "')' to close statement expression");
                    return self.mk_expr(ExprKind::StmtExpr(items), span);
                }
                self.bump();
                let expr = self.parse_expr();
                self.expect(TokenKind::RParen, "')'");
                expr
            }
            _ => {
                self.error_here("expected expression".to_owned());
                // Neutral recovery node.
                self.mk_expr(
                    ExprKind::IntLit {
                        value: 0,
                        suffix: Default::default(),
                    },
                    span,
                )
            }
        }
    }

    /// `_Generic(controlling, type: expr, ..., default: expr)`.
    fn parse_generic_selection(&mut self) -> Expr {
        let span = self.bump().span;
        self.expect(TokenKind::LParen, "'(' after _Generic");
        let controlling = self.parse_assign_expr();
        let mut assocs = Vec::new();
        while self.eat(TokenKind::Comma) {
            let ty = if self.check_kw(Keyword::Default) {
                self.bump();
                None
            } else {
                self.parse_type_name()
            };
            self.expect(TokenKind::Colon, "':' in _Generic association");
            let expr = self.parse_assign_expr();
            assocs.push(GenericAssoc { ty, expr });
        }
        self.expect(TokenKind::RParen, "')' to close _Generic");
        self.mk_expr(
            ExprKind::Generic {
                controlling: Box::new(controlling),
                assocs,
            },
            span,
        )
    }
}
