//! Statement parsing.
//!
//! Statements map directly onto [`StmtKind`]s. `for` may introduce a
//! declaration in its init slot when the effective standard permits it.

use qcc_lex::{Keyword, TokenKind};
use qcc_util::Feature;

use crate::ast::*;
use crate::Parser;

impl<'h> Parser<'h> {
    /// Parse a `{ ... }` compound statement; the `{` is the current
    /// token.
    pub(crate) fn parse_compound_stmt(&mut self) -> Stmt {
        let open = self.span();
        self.expect(TokenKind::LBrace, "'{'");
        self.enter_scope();
        let items = self.parse_block_items();
        self.exit_scope();
        self.expect(TokenKind::RBrace, "'}'");
        Stmt {
            kind: StmtKind::Compound(items),
            span: open,
        }
    }

    /// Parse block items up to (not including) the closing `}`.
    pub(crate) fn parse_block_items(&mut self) -> Vec<BlockItem> {
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let before = self.mark();
            if self.is_decl_start() {
                for decl in self.parse_declaration(false) {
                    items.push(BlockItem::Decl(decl));
                }
            } else {
                items.push(BlockItem::Stmt(self.parse_stmt()));
            }
            if self.in_panic() {
                self.synchronize();
            }
            if self.mark() == before && !self.check(TokenKind::RBrace) {
                // Defensive progress guarantee.
                self.bump();
            }
        }
        items
    }

    /// Parse one statement.
    pub(crate) fn parse_stmt(&mut self) -> Stmt {
        let span = self.span();
        match self.peek_kind() {
            TokenKind::LBrace => self.parse_compound_stmt(),
            TokenKind::Semi => {
                self.bump();
                Stmt {
                    kind: StmtKind::Null,
                    span,
                }
            }
            TokenKind::Kw(Keyword::If) => self.parse_if_stmt(),
            TokenKind::Kw(Keyword::While) => self.parse_while_stmt(),
            TokenKind::Kw(Keyword::Do) => self.parse_do_stmt(),
            TokenKind::Kw(Keyword::For) => self.parse_for_stmt(),
            TokenKind::Kw(Keyword::Switch) => self.parse_switch_stmt(),
            TokenKind::Kw(Keyword::Case) => {
                self.bump();
                let value = self.parse_conditional_expr();
                self.expect(TokenKind::Colon, "':' after case label");
                let body = self.parse_stmt();
                Stmt {
                    kind: StmtKind::Case {
                        value,
                        body: Box::new(body),
                    },
                    span,
                }
            }
            TokenKind::Kw(Keyword::Default) => {
                self.bump();
                self.expect(TokenKind::Colon, "':' after default label");
                let body = self.parse_stmt();
                Stmt {
                    kind: StmtKind::Default {
                        body: Box::new(body),
                    },
                    span,
                }
            }
            TokenKind::Kw(Keyword::Break) => {
                self.bump();
                self.expect(TokenKind::Semi, "';' after break");
                Stmt {
                    kind: StmtKind::Break,
                    span,
                }
            }
            TokenKind::Kw(Keyword::Continue) => {
                self.bump();
                self.expect(TokenKind::Semi, "';' after continue");
                Stmt {
                    kind: StmtKind::Continue,
                    span,
                }
            }
            TokenKind::Kw(Keyword::Return) => {
                self.bump();
                let value = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr())
                };
                self.expect(TokenKind::Semi, "';' after return");
                Stmt {
                    kind: StmtKind::Return(value),
                    span,
                }
            }
            TokenKind::Kw(Keyword::Goto) => {
                self.bump();
                let label = self
                    .expect(TokenKind::Ident, "label name after goto")
                    .map(|t| t.text)
                    .unwrap_or_else(|| qcc_util::Symbol::intern("<error>"));
                self.expect(TokenKind::Semi, "';' after goto");
                Stmt {
                    kind: StmtKind::Goto(label),
                    span,
                }
            }
            // `name:` labels a statement.
            TokenKind::Ident if self.look(1) == TokenKind::Colon => {
                let name = self.bump().text;
                self.bump();
                let body = self.parse_stmt();
                Stmt {
                    kind: StmtKind::Label {
                        name,
                        body: Box::new(body),
                    },
                    span,
                }
            }
            _ => {
                let expr = self.parse_expr();
                self.expect(TokenKind::Semi, "';' after expression");
                Stmt {
                    kind: StmtKind::Expr(expr),
                    span,
                }
            }
        }
    }

    fn parse_if_stmt(&mut self) -> Stmt {
        let span = self.span();
        self.bump();
        self.expect(TokenKind::LParen, "'(' after if");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, "')' after if condition");
        let then = self.parse_stmt();
        let otherwise = if self.eat_kw(Keyword::Else) {
            Some(Box::new(self.parse_stmt()))
        } else {
            None
        };
        Stmt {
            kind: StmtKind::If {
                cond,
                then: Box::new(then),
                otherwise,
            },
            span,
        }
    }

    fn parse_while_stmt(&mut self) -> Stmt {
        let span = self.span();
        self.bump();
        self.expect(TokenKind::LParen, "'(' after while");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, "')' after while condition");
        let body = self.parse_stmt();
        Stmt {
            kind: StmtKind::While {
                cond,
                body: Box::new(body),
            },
            span,
        }
    }

    fn parse_do_stmt(&mut self) -> Stmt {
        let span = self.span();
        self.bump();
        let body = self.parse_stmt();
        if !self.eat_kw(Keyword::While) {
            self.error_here("expected 'while' after do body".to_owned());
        }
        self.expect(TokenKind::LParen, "'(' after while");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, "')' after do condition");
        self.expect(TokenKind::Semi, "';' after do statement");
        Stmt {
            kind: StmtKind::DoWhile {
                body: Box::new(body),
                cond,
            },
            span,
        }
    }

    fn parse_for_stmt(&mut self) -> Stmt {
        let span = self.span();
        self.bump();
        self.expect(TokenKind::LParen, "'(' after for");
        // The init declaration's names live in the loop's scope.
        self.enter_scope();

        let init = if self.eat(TokenKind::Semi) {
            None
        } else if self.is_decl_start() {
            if !self.features.contains(Feature::ForDecl) {
                self.handler.warning(
                    "declarations in for-loop initializers are not recognized in the selected standard",
                    self.span(),
                );
            }
            // parse_declaration consumes the ';'.
            let mut decls = self.parse_declaration(false);
            if decls.len() != 1 {
                self.error_at("for-loop initializer declares more than one name", span);
            }
            decls.pop().map(|d| ForInit::Decl(Box::new(d)))
        } else {
            let expr = self.parse_expr();
            self.expect(TokenKind::Semi, "';' after for initializer");
            Some(ForInit::Expr(expr))
        };

        let cond = if self.check(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect(TokenKind::Semi, "';' after for condition");

        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect(TokenKind::RParen, "')' after for clauses");

        let body = self.parse_stmt();
        self.exit_scope();
        Stmt {
            kind: StmtKind::For {
                init,
                cond,
                step,
                body: Box::new(body),
            },
            span,
        }
    }

    fn parse_switch_stmt(&mut self) -> Stmt {
        let span = self.span();
        self.bump();
        self.expect(TokenKind::LParen, "'(' after switch");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, "')' after switch expression");
        let body = self.parse_stmt();
        Stmt {
            kind: StmtKind::Switch {
                cond,
                body: Box::new(body),
            },
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::test_util::{parse_ok, parse_with};
    use qcc_util::Standard;

    fn body_of(unit: &TranslationUnit) -> &Vec<BlockItem> {
        for decl in &unit.decls {
            if let DeclKind::Function(f) = &decl.kind {
                if let Some(Stmt {
                    kind: StmtKind::Compound(items),
                    ..
                }) = &f.body
                {
                    return items;
                }
            }
        }
        panic!("no function body found");
    }

    #[test]
    fn test_if_else() {
        let unit = parse_ok("void f(int x) { if (x) x = 1; else x = 2; }");
        let items = body_of(&unit);
        assert!(matches!(
            items[0],
            BlockItem::Stmt(Stmt {
                kind: StmtKind::If { otherwise: Some(_), .. },
                ..
            })
        ));
    }

    #[test]
    fn test_dangling_else_binds_inner() {
        let unit = parse_ok("void f(int a, int b) { if (a) if (b) a = 1; else a = 2; }");
        let items = body_of(&unit);
        match &items[0] {
            BlockItem::Stmt(Stmt {
                kind: StmtKind::If { then, otherwise, .. },
                ..
            }) => {
                assert!(otherwise.is_none(), "else belongs to the inner if");
                assert!(matches!(
                    then.kind,
                    StmtKind::If { otherwise: Some(_), .. }
                ));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_while_and_do() {
        parse_ok("void f(void) { while (1) ; do ; while (0); }");
    }

    #[test]
    fn test_for_with_declaration() {
        let unit = parse_ok("int f(int n) { for (int i = 0; i < n; i = i + 1) ; return 0; }");
        let items = body_of(&unit);
        match &items[0] {
            BlockItem::Stmt(Stmt {
                kind: StmtKind::For { init, cond, step, .. },
                ..
            }) => {
                assert!(matches!(init, Some(ForInit::Decl(_))));
                assert!(cond.is_some());
                assert!(step.is_some());
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_for_decl_gated_in_c89() {
        let (_, handler) = parse_with("void f(void) { for (int i = 0; ; ) ; }", Standard::C89);
        assert!(handler.warning_count() >= 1);
    }

    #[test]
    fn test_empty_for() {
        parse_ok("void f(void) { for (;;) break; }");
    }

    #[test]
    fn test_switch_case_default() {
        let unit = parse_ok(
            "int f(int x) { switch (x) { case 1: return 10; default: return 0; } }",
        );
        let items = body_of(&unit);
        assert!(matches!(
            items[0],
            BlockItem::Stmt(Stmt {
                kind: StmtKind::Switch { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_goto_and_label() {
        let unit = parse_ok("void f(void) { goto done; done: ; }");
        let items = body_of(&unit);
        assert!(matches!(
            items[0],
            BlockItem::Stmt(Stmt {
                kind: StmtKind::Goto(_),
                ..
            })
        ));
        assert!(matches!(
            items[1],
            BlockItem::Stmt(Stmt {
                kind: StmtKind::Label { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_local_declarations_split() {
        let unit = parse_ok("void f(void) { int a = 1, b = 2; }");
        let items = body_of(&unit);
        assert_eq!(items.len(), 2);
    }
}
