//! Declaration parsing.
//!
//! Declarations are parsed as storage class + type specifiers (building
//! a base [`TyExpr`]), then one or more declarators. Declarators apply
//! pointer, array, and function modifiers onto the base type
//! right-to-left around the name; nested declarators like `int (*fp)(void)`
//! are handled by skipping the inner declarator, applying the outer
//! suffixes, and re-parsing the inner tokens against the completed type.

use qcc_lex::{Keyword, TokenKind};
use qcc_util::{Feature, Span, Symbol};

use crate::ast::*;
use crate::Parser;

/// Accumulated declaration specifiers.
pub(crate) struct DeclSpec {
    pub storage: Option<StorageClass>,
    pub is_typedef: bool,
    pub is_inline: bool,
    pub base: TyExpr,
}

impl<'h> Parser<'h> {
    /// Parse one external declaration, which may expand to several
    /// [`Decl`]s (`int a, b;`).
    pub(crate) fn parse_external_decl(&mut self) -> Vec<Decl> {
        self.parse_declaration(true)
    }

    /// Parse a declaration; `external` permits function definitions.
    pub(crate) fn parse_declaration(&mut self, external: bool) -> Vec<Decl> {
        let start = self.span();
        let Some(spec) = self.parse_decl_specifiers() else {
            self.error_here("expected declaration".to_owned());
            return Vec::new();
        };

        // `struct S { ... };` or `enum E;` with no declarator.
        if self.check(TokenKind::Semi) {
            self.bump();
            match spec.base.kind {
                TyExprKind::Record { .. } | TyExprKind::Enum { .. } => {
                    return vec![Decl {
                        kind: DeclKind::Tag(spec.base),
                        span: start,
                    }];
                }
                _ => {
                    self.handler
                        .warning("declaration does not declare anything", start);
                    return Vec::new();
                }
            }
        }

        let mut decls = Vec::new();
        loop {
            let (name, ty, dspan) = self.parse_declarator(spec.base.clone());
            let Some(name) = name else {
                self.error_here("expected identifier in declaration".to_owned());
                break;
            };

            if spec.is_typedef {
                self.define_typedef(name);
                decls.push(Decl {
                    kind: DeclKind::Typedef(TypedefDecl { name, ty }),
                    span: dspan,
                });
            } else if ty.is_function() {
                self.define_ordinary(name);
                // A `{` after the declarator makes this a definition.
                if self.check(TokenKind::LBrace) {
                    if !external {
                        self.error_here("function definition is not allowed here".to_owned());
                    }
                    if !decls.is_empty() {
                        self.error_at(
                            "function definition cannot follow other declarators",
                            dspan,
                        );
                    }
                    let body = self.parse_function_body(&ty);
                    decls.push(Decl {
                        kind: DeclKind::Function(FnDecl {
                            name,
                            ty,
                            storage: spec.storage,
                            is_inline: spec.is_inline,
                            body: Some(body),
                        }),
                        span: dspan,
                    });
                    return decls;
                }
                decls.push(Decl {
                    kind: DeclKind::Function(FnDecl {
                        name,
                        ty,
                        storage: spec.storage,
                        is_inline: spec.is_inline,
                        body: None,
                    }),
                    span: dspan,
                });
            } else {
                self.define_ordinary(name);
                let init = if self.eat(TokenKind::Eq) {
                    Some(self.parse_initializer())
                } else {
                    None
                };
                decls.push(Decl {
                    kind: DeclKind::Var(VarDecl {
                        id: self.fresh_id(),
                        name,
                        ty,
                        storage: spec.storage,
                        init,
                    }),
                    span: dspan,
                });
            }

            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semi, "';' after declaration");
        decls
    }

    /// Parse the body of a function definition: a scope holding the
    /// parameter names around the compound statement.
    fn parse_function_body(&mut self, fn_ty: &TyExpr) -> Stmt {
        self.enter_scope();
        if let TyExprKind::Function { params, .. } = &fn_ty.kind {
            let names: Vec<Symbol> = params.iter().filter_map(|p| p.name).collect();
            for name in names {
                self.define_ordinary(name);
            }
        }
        let body = self.parse_compound_stmt();
        self.exit_scope();
        body
    }

    // =========================================================================
    // DECLARATION SPECIFIERS
    // =========================================================================

    /// Does the current token start a declaration?
    pub(crate) fn is_decl_start(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Kw(kw) => matches!(
                kw,
                Keyword::Typedef
                    | Keyword::Extern
                    | Keyword::Static
                    | Keyword::Auto
                    | Keyword::Register
                    | Keyword::Const
                    | Keyword::Volatile
                    | Keyword::Restrict
                    | Keyword::Atomic
                    | Keyword::Inline
                    | Keyword::Void
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
                    | Keyword::Typeof
            ),
            TokenKind::Ident => self.is_typedef_name(self.peek().text),
            _ => false,
        }
    }

    /// Does the current token start a type name (cast, `sizeof`)?
    pub(crate) fn is_type_name_start(&self) -> bool {
        self.is_decl_start()
    }

    /// Parse declaration specifiers into a [`DeclSpec`]. Returns `None`
    /// if the current token cannot begin one.
    pub(crate) fn parse_decl_specifiers(&mut self) -> Option<DeclSpec> {
        let start = self.span();
        let mut storage: Option<StorageClass> = None;
        let mut is_typedef = false;
        let mut is_inline = false;
        let mut quals = Quals::default();

        let mut base: Option<TyExpr> = None;
        let mut signed: Option<bool> = None;
        let mut short = false;
        let mut longs: u8 = 0;
        let mut consumed = false;

        loop {
            let kind = self.peek_kind();
            match kind {
                TokenKind::Kw(Keyword::Typedef) => {
                    self.bump();
                    is_typedef = true;
                }
                TokenKind::Kw(Keyword::Extern) => {
                    self.set_storage(&mut storage, StorageClass::Extern);
                }
                TokenKind::Kw(Keyword::Static) => {
                    self.set_storage(&mut storage, StorageClass::Static);
                }
                TokenKind::Kw(Keyword::Auto) => {
                    self.set_storage(&mut storage, StorageClass::Auto);
                }
                TokenKind::Kw(Keyword::Register) => {
                    self.set_storage(&mut storage, StorageClass::Register);
                }
                TokenKind::Kw(Keyword::Const) => {
                    self.bump();
                    quals.is_const = true;
                }
                TokenKind::Kw(Keyword::Volatile) => {
                    self.bump();
                    quals.is_volatile = true;
                }
                TokenKind::Kw(Keyword::Restrict) => {
                    self.bump();
                    quals.is_restrict = true;
                }
                TokenKind::Kw(Keyword::Atomic) => {
                    self.bump();
                    quals.is_atomic = true;
                }
                TokenKind::Kw(Keyword::Inline) => {
                    self.bump();
                    is_inline = true;
                }
                TokenKind::Kw(Keyword::Void) => self.set_base(&mut base, TyExprKind::Void),
                TokenKind::Kw(Keyword::Char) => {
                    self.set_base(&mut base, TyExprKind::Char { signed: None })
                }
                TokenKind::Kw(Keyword::Int) => self.set_base(
                    &mut base,
                    TyExprKind::Int {
                        width: IntWidth::Int,
                        unsigned: false,
                    },
                ),
                TokenKind::Kw(Keyword::Float) => self.set_base(&mut base, TyExprKind::Float),
                TokenKind::Kw(Keyword::Double) => self.set_base(&mut base, TyExprKind::Double),
                TokenKind::Kw(Keyword::Bool) => self.set_base(&mut base, TyExprKind::Bool),
                TokenKind::Kw(Keyword::Short) => {
                    self.bump();
                    short = true;
                }
                TokenKind::Kw(Keyword::Long) => {
                    self.bump();
                    longs = longs.saturating_add(1);
                }
                TokenKind::Kw(Keyword::Signed) => {
                    self.bump();
                    signed = Some(true);
                }
                TokenKind::Kw(Keyword::Unsigned) => {
                    self.bump();
                    signed = Some(false);
                }
                TokenKind::Kw(Keyword::Struct) => {
                    let ty = self.parse_record_specifier(RecordKind::Struct);
                    self.put_base(&mut base, ty);
                }
                TokenKind::Kw(Keyword::Union) => {
                    let ty = self.parse_record_specifier(RecordKind::Union);
                    self.put_base(&mut base, ty);
                }
                TokenKind::Kw(Keyword::Enum) => {
                    let ty = self.parse_enum_specifier();
                    self.put_base(&mut base, ty);
                }
                TokenKind::Kw(Keyword::Typeof) => {
                    let ty = self.parse_typeof_specifier();
                    self.put_base(&mut base, ty);
                }
                TokenKind::Ident
                    if base.is_none()
                        && signed.is_none()
                        && !short
                        && longs == 0
                        && self.is_typedef_name(self.peek().text) =>
                {
                    let tok = self.bump();
                    base = Some(TyExpr {
                        kind: TyExprKind::Named(tok.text),
                        quals: Quals::default(),
                        span: tok.span,
                    });
                }
                _ => break,
            }
            consumed = true;
        }

        if !consumed {
            return None;
        }

        let mut ty = self.combine_specifiers(base, signed, short, longs, start);
        ty.quals = quals;
        Some(DeclSpec {
            storage,
            is_typedef,
            is_inline,
            base: ty,
        })
    }

    fn set_storage(&mut self, slot: &mut Option<StorageClass>, sc: StorageClass) {
        let span = self.span();
        self.bump();
        if slot.replace(sc).is_some() {
            self.handler
                .error("multiple storage classes in declaration", span);
        }
    }

    fn set_base(&mut self, base: &mut Option<TyExpr>, kind: TyExprKind) {
        let tok = self.bump();
        let ty = TyExpr {
            kind,
            quals: Quals::default(),
            span: tok.span,
        };
        self.put_base_at(base, ty, tok.span);
    }

    fn put_base(&mut self, base: &mut Option<TyExpr>, ty: TyExpr) {
        let span = ty.span;
        self.put_base_at(base, ty, span);
    }

    fn put_base_at(&mut self, base: &mut Option<TyExpr>, ty: TyExpr, span: Span) {
        if base.replace(ty).is_some() {
            self.handler
                .error("two or more data types in declaration specifiers", span);
        }
    }

    /// Merge `signed`/`unsigned`/`short`/`long` into the base specifier.
    fn combine_specifiers(
        &mut self,
        base: Option<TyExpr>,
        signed: Option<bool>,
        short: bool,
        longs: u8,
        start: Span,
    ) -> TyExpr {
        let unsigned = signed == Some(false);
        let width = if short {
            IntWidth::Short
        } else {
            match longs {
                0 => IntWidth::Int,
                1 => IntWidth::Long,
                _ => {
                    if !self.features.contains(Feature::LongLong) {
                        self.handler.warning(
                            "'long long' is not recognized in the selected standard",
                            start,
                        );
                    }
                    IntWidth::LongLong
                }
            }
        };

        match base {
            None => {
                if signed.is_none() && !short && longs == 0 {
                    // Storage class or qualifiers alone: implicit int.
                    self.handler
                        .warning("type specifier missing, defaults to 'int'", start);
                }
                TyExpr {
                    kind: TyExprKind::Int { width, unsigned },
                    quals: Quals::default(),
                    span: start,
                }
            }
            Some(ty) => match ty.kind {
                TyExprKind::Int { .. } => TyExpr {
                    kind: TyExprKind::Int { width, unsigned },
                    ..ty
                },
                TyExprKind::Char { .. } => {
                    if short || longs > 0 {
                        self.handler
                            .error("invalid width modifier for 'char'", start);
                    }
                    TyExpr {
                        kind: TyExprKind::Char { signed },
                        ..ty
                    }
                }
                TyExprKind::Double if longs == 1 => TyExpr {
                    kind: TyExprKind::LongDouble,
                    ..ty
                },
                _ => {
                    if signed.is_some() || short || longs > 0 {
                        self.handler
                            .error("invalid specifier combination in declaration", start);
                    }
                    ty
                }
            },
        }
    }

    // =========================================================================
    // TAG SPECIFIERS
    // =========================================================================

    fn parse_record_specifier(&mut self, kind: RecordKind) -> TyExpr {
        let kw = self.bump();
        let tag = if self.check(TokenKind::Ident) {
            Some(self.bump().text)
        } else {
            None
        };
        let fields = if self.eat(TokenKind::LBrace) {
            Some(self.parse_field_list())
        } else {
            None
        };
        if tag.is_none() && fields.is_none() {
            self.error_here("expected identifier or '{' after struct/union".to_owned());
        }
        TyExpr {
            kind: TyExprKind::Record { kind, tag, fields },
            quals: Quals::default(),
            span: kw.span,
        }
    }

    fn parse_field_list(&mut self) -> Vec<FieldDecl> {
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let Some(spec) = self.parse_decl_specifiers() else {
                self.error_here("expected field declaration".to_owned());
                self.synchronize();
                continue;
            };
            if spec.storage.is_some() || spec.is_typedef {
                self.error_at("storage class in struct/union member", spec.base.span);
            }

            // Anonymous struct/union member: `struct { ... };`
            if self.check(TokenKind::Semi)
                && matches!(spec.base.kind, TyExprKind::Record { .. })
            {
                let span = spec.base.span;
                self.bump();
                fields.push(FieldDecl {
                    name: None,
                    ty: spec.base,
                    bit_width: None,
                    span,
                });
                continue;
            }

            loop {
                let (name, ty, span) = if self.check(TokenKind::Colon) {
                    // Anonymous bit-field: `int : 3;`
                    (None, spec.base.clone(), self.span())
                } else {
                    self.parse_declarator(spec.base.clone())
                };
                let bit_width = if self.eat(TokenKind::Colon) {
                    Some(self.parse_conditional_expr())
                } else {
                    None
                };
                if name.is_none() && bit_width.is_none() {
                    self.error_here("expected field name".to_owned());
                }
                fields.push(FieldDecl {
                    name,
                    ty,
                    bit_width,
                    span,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Semi, "';' after field declaration");
            if self.in_panic() {
                self.synchronize();
            }
        }
        self.expect(TokenKind::RBrace, "'}' to close field list");
        fields
    }

    fn parse_enum_specifier(&mut self) -> TyExpr {
        let kw = self.bump();
        let tag = if self.check(TokenKind::Ident) {
            Some(self.bump().text)
        } else {
            None
        };
        let enumerators = if self.eat(TokenKind::LBrace) {
            let mut list = Vec::new();
            while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
                let Some(name_tok) = self.expect(TokenKind::Ident, "enumerator name") else {
                    break;
                };
                let value = if self.eat(TokenKind::Eq) {
                    Some(self.parse_conditional_expr())
                } else {
                    None
                };
                // Enumerators join the ordinary namespace and can shadow
                // a typedef name.
                self.define_ordinary(name_tok.text);
                list.push(Enumerator {
                    name: name_tok.text,
                    value,
                    span: name_tok.span,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, "'}' to close enumerator list");
            Some(list)
        } else {
            None
        };
        if tag.is_none() && enumerators.is_none() {
            self.error_here("expected identifier or '{' after enum".to_owned());
        }
        TyExpr {
            kind: TyExprKind::Enum { tag, enumerators },
            quals: Quals::default(),
            span: kw.span,
        }
    }

    fn parse_typeof_specifier(&mut self) -> TyExpr {
        let kw = self.bump();
        self.expect(TokenKind::LParen, "'(' after typeof");
        let expr = self.parse_expr();
        self.expect(TokenKind::RParen, "')' after typeof operand");
        TyExpr {
            kind: TyExprKind::Typeof(Box::new(expr)),
            quals: Quals::default(),
            span: kw.span,
        }
    }

    // =========================================================================
    // DECLARATORS
    // =========================================================================

    /// Parse a (possibly abstract) declarator around `base`.
    pub(crate) fn parse_declarator(&mut self, base: TyExpr) -> (Option<Symbol>, TyExpr, Span) {
        let start = self.span();
        let mut ty = base;
        while self.check(TokenKind::Star) {
            let star = self.bump();
            let mut quals = Quals::default();
            loop {
                match self.peek_kind() {
                    TokenKind::Kw(Keyword::Const) => {
                        self.bump();
                        quals.is_const = true;
                    }
                    TokenKind::Kw(Keyword::Volatile) => {
                        self.bump();
                        quals.is_volatile = true;
                    }
                    TokenKind::Kw(Keyword::Restrict) => {
                        self.bump();
                        quals.is_restrict = true;
                    }
                    _ => break,
                }
            }
            ty = TyExpr {
                kind: TyExprKind::Pointer(Box::new(ty)),
                quals,
                span: star.span,
            };
        }
        self.parse_direct_declarator(ty, start)
    }

    fn parse_direct_declarator(
        &mut self,
        ty: TyExpr,
        start: Span,
    ) -> (Option<Symbol>, TyExpr, Span) {
        if self.check(TokenKind::LParen) && self.nested_declarator_ahead() {
            // `(declarator)` grouping: skip the inner declarator, apply
            // the outer suffixes to the base type, then re-parse the
            // inner tokens against the completed type.
            self.bump();
            let inner_start = self.mark();
            self.skip_balanced_until_rparen();
            let ty = self.parse_declarator_suffixes(ty);
            let resume = self.mark();
            self.rewind(inner_start);
            let result = self.parse_declarator(ty);
            self.rewind(resume);
            return result;
        }

        let name = if self.check(TokenKind::Ident) {
            Some(self.bump().text)
        } else {
            None
        };
        let ty = self.parse_declarator_suffixes(ty);
        (name, ty, start)
    }

    /// Does `(` open a nested declarator rather than a parameter list?
    ///
    /// `int (*fp)(void)` and `int ((x))` nest; `int f(T)` with a typedef
    /// name, `int f(void)`, and `int f()` do not.
    fn nested_declarator_ahead(&self) -> bool {
        match self.look(1) {
            TokenKind::Star | TokenKind::LParen => true,
            TokenKind::Ident => {
                let name = self.look_text(1);
                !self.is_typedef_name(name)
            }
            _ => false,
        }
    }

    /// Skip tokens until the `)` matching an already-consumed `(`,
    /// consuming it.
    fn skip_balanced_until_rparen(&mut self) {
        let mut depth = 1usize;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.bump();
                    depth += 1;
                }
                TokenKind::RParen => {
                    self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Eof => {
                    self.error_here("unclosed '(' in declarator".to_owned());
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Array and function suffixes bind right-to-left around the name:
    /// the suffix parsed first is the outermost type constructor.
    fn parse_declarator_suffixes(&mut self, ty: TyExpr) -> TyExpr {
        if self.check(TokenKind::LBracket) {
            let open = self.bump();
            let len = if self.check(TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_conditional_expr()))
            };
            self.expect(TokenKind::RBracket, "']' to close array declarator");
            let elem = self.parse_declarator_suffixes(ty);
            return TyExpr {
                kind: TyExprKind::Array {
                    elem: Box::new(elem),
                    len,
                },
                quals: Quals::default(),
                span: open.span,
            };
        }
        if self.check(TokenKind::LParen) {
            let open = self.bump();
            let (params, variadic) = self.parse_param_list();
            let ret = self.parse_declarator_suffixes(ty);
            return TyExpr {
                kind: TyExprKind::Function {
                    ret: Box::new(ret),
                    params,
                    variadic,
                },
                quals: Quals::default(),
                span: open.span,
            };
        }
        ty
    }

    /// Parse a parameter list; the `(` is already consumed.
    fn parse_param_list(&mut self) -> (Vec<ParamDecl>, bool) {
        if self.eat(TokenKind::RParen) {
            return (Vec::new(), false);
        }
        // `(void)` means exactly zero parameters.
        if self.check_kw(Keyword::Void) && self.look(1) == TokenKind::RParen {
            self.bump();
            self.bump();
            return (Vec::new(), false);
        }

        let mut params = Vec::new();
        let mut variadic = false;
        loop {
            if self.eat(TokenKind::Ellipsis) {
                variadic = true;
                break;
            }
            let Some(spec) = self.parse_decl_specifiers() else {
                self.error_here("expected parameter declaration".to_owned());
                break;
            };
            let (name, ty, span) = self.parse_declarator(spec.base);
            params.push(ParamDecl { name, ty, span });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')' to close parameter list");
        (params, variadic)
    }

    /// Parse a type name (cast, `sizeof`): specifiers plus an abstract
    /// declarator.
    pub(crate) fn parse_type_name(&mut self) -> Option<TyExpr> {
        let spec = self.parse_decl_specifiers()?;
        let (name, ty, span) = self.parse_declarator(spec.base);
        if name.is_some() {
            self.error_at("type name cannot declare an identifier", span);
        }
        Some(ty)
    }

    // =========================================================================
    // INITIALIZERS
    // =========================================================================

    pub(crate) fn parse_initializer(&mut self) -> Init {
        if !self.eat(TokenKind::LBrace) {
            return Init::Expr(self.parse_assign_expr());
        }
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let designator = self.parse_designator();
            if designator.is_some() {
                self.expect(TokenKind::Eq, "'=' after designator");
            }
            let init = self.parse_initializer();
            items.push(InitItem { designator, init });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}' to close initializer list");
        Init::List(items)
    }

    fn parse_designator(&mut self) -> Option<Designator> {
        if self.check(TokenKind::Dot) {
            let dot = self.bump();
            if !self.features.contains(Feature::DesignatedInit) {
                self.handler.warning(
                    "designated initializers are not recognized in the selected standard",
                    dot.span,
                );
            }
            let field = self.expect(TokenKind::Ident, "field name after '.'")?;
            return Some(Designator::Field(field.text));
        }
        if self.check(TokenKind::LBracket) {
            let open = self.bump();
            if !self.features.contains(Feature::DesignatedInit) {
                self.handler.warning(
                    "designated initializers are not recognized in the selected standard",
                    open.span,
                );
            }
            let index = self.parse_conditional_expr();
            self.expect(TokenKind::RBracket, "']' after designator index");
            return Some(Designator::Index(index));
        }
        None
    }
}
