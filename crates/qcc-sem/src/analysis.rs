//! The semantic analyzer.
//!
//! Walks the AST top-down from the translation unit, resolving
//! identifiers against the scoped [`SymbolTable`], converting syntactic
//! types to real [`Type`]s, and writing every expression's resolved type
//! into the [`TypeContext`]'s per-node table. Statements are checked for
//! context rules (scalar conditions, `break`/`continue` placement,
//! return-type agreement). Errors produce a neutral best-effort result
//! (`int`, or the annotated type of a subexpression) so the rest of the
//! phase keeps finding problems.

use qcc_par::ast::*;
use qcc_util::{DataModel, FeatureSet, Handler, Span, Symbol};

use crate::scope::{
    Binding, BindingKind, DefineOutcome, ScopeKind, StorageSlot, SymbolTable,
};
use crate::types::{Assignability, FloatKind, FuncType, IntKind, Type, TypeContext, TypeKind};

/// The semantic analyzer for one translation unit.
pub struct SemanticAnalyzer<'h> {
    /// Type context; owns primitives and per-expression results.
    pub types: TypeContext,
    /// Scoped name bindings.
    pub symtab: SymbolTable,
    pub(crate) handler: &'h Handler,
    features: FeatureSet,

    /// Return type of the function being analyzed.
    current_return: Option<Type>,
    /// Nesting depth of loops (for `break`/`continue`).
    loop_depth: u32,
    /// Nesting depth of switches (for `case`/`break`).
    switch_depth: u32,
}

impl<'h> SemanticAnalyzer<'h> {
    pub fn new(data_model: DataModel, features: FeatureSet, handler: &'h Handler) -> Self {
        Self {
            types: TypeContext::new(data_model),
            symtab: SymbolTable::new(),
            handler,
            features,
            current_return: None,
            loop_depth: 0,
            switch_depth: 0,
        }
    }

    /// Analyze a whole translation unit.
    pub fn run(&mut self, unit: &TranslationUnit) {
        for decl in &unit.decls {
            self.analyze_decl(decl);
        }
    }

    fn error(&self, message: impl Into<String>, span: Span) {
        self.handler.error(message, span);
    }

    // =========================================================================
    // DECLARATIONS
    // =========================================================================

    pub(crate) fn analyze_decl(&mut self, decl: &Decl) {
        match &decl.kind {
            DeclKind::Function(f) => self.analyze_function(f, decl.span),
            DeclKind::Var(v) => self.analyze_var(v, decl.span),
            DeclKind::Typedef(td) => {
                let ty = self.convert_ty(&td.ty);
                let binding = Binding {
                    name: td.name,
                    kind: BindingKind::Typedef,
                    ty,
                    storage: None,
                    loc: decl.span,
                    scope_depth: self.symtab.depth(),
                    slot: StorageSlot::None,
                    defined: true,
                    used: Default::default(),
                };
                if let DefineOutcome::Conflict(_) = self.symtab.define_ordinary(binding) {
                    self.error(format!("redefinition of '{}'", td.name), decl.span);
                }
            }
            DeclKind::Tag(ty) => {
                // Conversion defines or completes the tag as a side effect.
                let _ = self.convert_ty(ty);
            }
        }
    }

    fn analyze_function(&mut self, f: &FnDecl, span: Span) {
        let fn_ty = self.convert_ty(&f.ty);
        let func = match fn_ty.kind() {
            TypeKind::Function(func) => func.clone(),
            _ => {
                self.error("function declarator expected", span);
                return;
            }
        };

        let binding = Binding {
            name: f.name,
            kind: BindingKind::Function,
            ty: fn_ty.clone(),
            storage: f.storage,
            loc: span,
            scope_depth: self.symtab.depth(),
            slot: StorageSlot::Global(f.name),
            defined: f.body.is_some(),
            used: Default::default(),
        };
        match self.symtab.define_ordinary(binding) {
            DefineOutcome::Conflict(_) => {
                self.error(format!("redefinition of '{}'", f.name), span);
            }
            DefineOutcome::Redeclared(prev) => {
                let prev = self.symtab.binding(prev);
                if !prev.ty.compatible(&fn_ty) {
                    self.error(format!("conflicting types for '{}'", f.name), span);
                }
            }
            DefineOutcome::New(_) => {}
        }

        let Some(body) = &f.body else {
            return;
        };

        self.current_return = Some(func.ret.clone());
        self.symtab.push_scope(ScopeKind::Function);

        for (ty, name) in func.params.iter().zip(func.param_names.iter()) {
            let Some(name) = name else {
                self.error("parameter name omitted in function definition", span);
                continue;
            };
            let size = self.types.size_of(ty).unwrap_or(0);
            let align = self.types.align_of(ty);
            let slot = StorageSlot::Stack(self.symtab.alloc_stack(size, align));
            let binding = Binding {
                name: *name,
                kind: BindingKind::Parameter,
                ty: ty.clone(),
                storage: None,
                loc: span,
                scope_depth: self.symtab.depth(),
                slot,
                defined: true,
                used: Default::default(),
            };
            if let DefineOutcome::Conflict(_) = self.symtab.define_ordinary(binding) {
                self.error(format!("redefinition of parameter '{}'", name), span);
            }
        }

        // The body's braces do not open a fresh scope: parameters and
        // top-level locals share the function scope.
        if let StmtKind::Compound(items) = &body.kind {
            for item in items {
                self.analyze_block_item(item);
            }
        } else {
            self.analyze_stmt(body);
        }

        for (label, loc) in self.symtab.undefined_labels() {
            self.error(format!("label '{}' used but not defined", label), loc);
        }

        self.symtab.pop_scope();
        self.current_return = None;
    }

    fn analyze_var(&mut self, v: &VarDecl, span: Span) {
        let mut ty = self.convert_ty(&v.ty);

        // `int a[] = {1, 2, 3}` takes its length from the initializer.
        let inferred = match (ty.kind(), v.init.as_ref()) {
            (TypeKind::Array { elem, len: 0 }, Some(Init::List(items))) => {
                Some(self.types.array_of(elem.clone(), items.len() as u64))
            }
            _ => None,
        };
        if let Some(with_len) = inferred {
            ty = with_len;
        }
        self.types.decl_types.insert(v.id, ty.clone());

        if ty.is_void() {
            self.error(format!("variable '{}' declared void", v.name), span);
        }

        let at_file_scope = self.symtab.at_file_scope();
        let slot = if at_file_scope || v.storage == Some(StorageClass::Static) {
            StorageSlot::Global(v.name)
        } else {
            let size = self.types.size_of(&ty).unwrap_or_else(|| {
                self.error(
                    format!("storage size of '{}' is not known", v.name),
                    span,
                );
                0
            });
            let align = self.types.align_of(&ty);
            StorageSlot::Stack(self.symtab.alloc_stack(size, align))
        };

        let binding = Binding {
            name: v.name,
            kind: BindingKind::Variable,
            ty: ty.clone(),
            storage: v.storage,
            loc: span,
            scope_depth: self.symtab.depth(),
            slot,
            defined: v.init.is_some() || v.storage != Some(StorageClass::Extern),
            used: Default::default(),
        };
        if let DefineOutcome::Conflict(_) = self.symtab.define_ordinary(binding) {
            self.error(format!("redefinition of '{}'", v.name), span);
        }

        if let Some(init) = &v.init {
            self.analyze_init(&ty, init, span);
        }
    }

    fn analyze_init(&mut self, target: &Type, init: &Init, span: Span) {
        match init {
            Init::Expr(e) => {
                let found = self.analyze_value(e);
                let is_null = self.is_null_constant(e);
                match self.types.assignable(target, &found, is_null) {
                    Assignability::Ok => {}
                    Assignability::Warn(msg) => self.handler.warning(msg, e.span),
                    Assignability::Incompatible => self.error(
                        format!(
                            "incompatible types when initializing '{}' from '{}'",
                            target, found
                        ),
                        e.span,
                    ),
                }
            }
            Init::List(items) => match target.kind() {
                TypeKind::Array { elem, len } => {
                    let mut index: u64 = 0;
                    for item in items {
                        if let Some(Designator::Index(idx)) = &item.designator {
                            let _ = self.analyze_expr(idx);
                            if let Some(v) = self.fold_const(idx) {
                                index = v as u64;
                            }
                        }
                        if *len != 0 && index >= *len {
                            self.handler
                                .warning("excess elements in array initializer", span);
                        }
                        self.analyze_init(elem, &item.init, span);
                        index += 1;
                    }
                }
                TypeKind::Record(rec) => {
                    let fields: Vec<Type> = rec
                        .0
                        .body
                        .borrow()
                        .as_ref()
                        .map(|b| b.fields.iter().map(|f| f.ty.clone()).collect())
                        .unwrap_or_default();
                    let names: Vec<Option<Symbol>> = rec
                        .0
                        .body
                        .borrow()
                        .as_ref()
                        .map(|b| b.fields.iter().map(|f| f.name).collect())
                        .unwrap_or_default();
                    let mut position = 0usize;
                    for item in items {
                        if let Some(Designator::Field(name)) = &item.designator {
                            if let Some(at) = names.iter().position(|n| *n == Some(*name)) {
                                position = at;
                            } else {
                                self.error(
                                    format!("no member named '{}' in '{}'", name, target),
                                    span,
                                );
                                continue;
                            }
                        }
                        match fields.get(position) {
                            Some(field_ty) => self.analyze_init(&field_ty.clone(), &item.init, span),
                            None => {
                                self.handler
                                    .warning("excess elements in struct initializer", span);
                                if let Init::Expr(e) = &item.init {
                                    let _ = self.analyze_expr(e);
                                }
                            }
                        }
                        position += 1;
                    }
                }
                _ => {
                    // Scalar braced initializer: `int x = {1};`
                    match items.len() {
                        0 => {}
                        1 => self.analyze_init(target, &items[0].init, span),
                        _ => {
                            self.handler
                                .warning("excess elements in scalar initializer", span);
                            for item in items {
                                if let Init::Expr(e) = &item.init {
                                    let _ = self.analyze_expr(e);
                                }
                            }
                        }
                    }
                }
            },
        }
    }

    fn analyze_block_item(&mut self, item: &BlockItem) {
        match item {
            BlockItem::Decl(decl) => self.analyze_decl(decl),
            BlockItem::Stmt(stmt) => self.analyze_stmt(stmt),
        }
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    pub(crate) fn analyze_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Compound(items) => {
                self.symtab.push_scope(ScopeKind::Block);
                for item in items {
                    self.analyze_block_item(item);
                }
                self.symtab.pop_scope();
            }
            StmtKind::Expr(e) => {
                let _ = self.analyze_expr(e);
            }
            StmtKind::Null => {}
            StmtKind::If { cond, then, otherwise } => {
                self.check_scalar_cond(cond, "if");
                self.analyze_stmt(then);
                if let Some(otherwise) = otherwise {
                    self.analyze_stmt(otherwise);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_scalar_cond(cond, "while");
                self.loop_depth += 1;
                self.analyze_stmt(body);
                self.loop_depth -= 1;
            }
            StmtKind::DoWhile { body, cond } => {
                self.loop_depth += 1;
                self.analyze_stmt(body);
                self.loop_depth -= 1;
                self.check_scalar_cond(cond, "do");
            }
            StmtKind::For { init, cond, step, body } => {
                self.symtab.push_scope(ScopeKind::Block);
                match init {
                    Some(ForInit::Decl(decl)) => self.analyze_decl(decl),
                    Some(ForInit::Expr(e)) => {
                        let _ = self.analyze_expr(e);
                    }
                    None => {}
                }
                if let Some(cond) = cond {
                    self.check_scalar_cond(cond, "for");
                }
                if let Some(step) = step {
                    let _ = self.analyze_expr(step);
                }
                self.loop_depth += 1;
                self.analyze_stmt(body);
                self.loop_depth -= 1;
                self.symtab.pop_scope();
            }
            StmtKind::Switch { cond, body } => {
                let ty = self.analyze_value(cond);
                if !ty.is_integer() {
                    self.error("switch quantity is not an integer", cond.span);
                }
                self.switch_depth += 1;
                self.analyze_stmt(body);
                self.switch_depth -= 1;
            }
            StmtKind::Case { value, body } => {
                if self.switch_depth == 0 {
                    self.error("case label not within a switch statement", stmt.span);
                }
                let _ = self.analyze_expr(value);
                if self.fold_const(value).is_none() {
                    self.error("case label does not reduce to an integer constant", value.span);
                }
                self.analyze_stmt(body);
            }
            StmtKind::Default { body } => {
                if self.switch_depth == 0 {
                    self.error("'default' label not within a switch statement", stmt.span);
                }
                self.analyze_stmt(body);
            }
            StmtKind::Break => {
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    self.error("break statement not within loop or switch", stmt.span);
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.error("continue statement not within a loop", stmt.span);
                }
            }
            StmtKind::Return(value) => {
                let ret = self
                    .current_return
                    .clone()
                    .unwrap_or_else(|| self.types.int_());
                match value {
                    Some(e) => {
                        let found = self.analyze_value(e);
                        if ret.is_void() {
                            self.error(
                                "void function should not return a value",
                                e.span,
                            );
                        } else {
                            let is_null = self.is_null_constant(e);
                            match self.types.assignable(&ret, &found, is_null) {
                                Assignability::Ok => {}
                                Assignability::Warn(msg) => self.handler.warning(msg, e.span),
                                Assignability::Incompatible => self.error(
                                    format!(
                                        "incompatible return type: expected '{}', found '{}'",
                                        ret, found
                                    ),
                                    e.span,
                                ),
                            }
                        }
                    }
                    None => {
                        if !ret.is_void() {
                            self.handler.warning(
                                "non-void function should return a value",
                                stmt.span,
                            );
                        }
                    }
                }
            }
            StmtKind::Goto(label) => {
                self.symtab.reference_label(*label, stmt.span);
            }
            StmtKind::Label { name, body } => {
                if !self.symtab.define_label(*name, stmt.span) {
                    self.error(format!("duplicate label '{}'", name), stmt.span);
                }
                self.analyze_stmt(body);
            }
        }
    }

    fn check_scalar_cond(&mut self, cond: &Expr, what: &str) {
        let ty = self.analyze_value(cond);
        if !ty.is_scalar() {
            self.error(
                format!("{} condition must have scalar type", what),
                cond.span,
            );
        }
    }

    // =========================================================================
    // EXPRESSIONS
    // =========================================================================

    /// Analyze an expression as a value: annotate its own type, then
    /// apply array/function decay for the caller.
    pub(crate) fn analyze_value(&mut self, e: &Expr) -> Type {
        let ty = self.analyze_expr(e);
        self.types.decay(&ty)
    }

    /// Analyze an expression, write its resolved type into the type
    /// context, and return it.
    pub(crate) fn analyze_expr(&mut self, e: &Expr) -> Type {
        let ty = self.expr_type(e);
        self.types.set_expr_type(e.id, ty.clone());
        ty
    }

    fn expr_type(&mut self, e: &Expr) -> Type {
        match &e.kind {
            ExprKind::IntLit { value, suffix } => self.int_literal_type(*value, *suffix),
            ExprKind::FloatLit { is_f32, .. } => {
                if *is_f32 {
                    self.types.float_of(FloatKind::Float)
                } else {
                    self.types.double_()
                }
            }
            ExprKind::CharLit(_) => self.types.int_(),
            ExprKind::StrLit(bytes) => {
                self.types.array_of(self.types.char_(), bytes.len() as u64 + 1)
            }
            ExprKind::Ident(name) => match self.symtab.lookup_ordinary(*name) {
                Some(id) => {
                    let binding = self.symtab.binding(id);
                    binding.used.set(true);
                    if let BindingKind::EnumConstant(value) = binding.kind {
                        self.types.const_idents.insert(e.id, value);
                        return self.types.int_();
                    }
                    if binding.kind == BindingKind::Typedef {
                        self.error(
                            format!("unexpected type name '{}' in expression", name),
                            e.span,
                        );
                        return self.types.int_();
                    }
                    binding.ty.clone()
                }
                None => {
                    self.error(format!("Undeclared identifier '{}'", name), e.span);
                    self.types.int_()
                }
            },
            ExprKind::Unary { op, operand } => self.unary_type(*op, operand, e.span),
            ExprKind::Binary { op, lhs, rhs } => self.binary_type(*op, lhs, rhs, e.span),
            ExprKind::Assign { op, lhs, rhs } => self.assign_type(*op, lhs, rhs, e.span),
            ExprKind::Cond { cond, then, otherwise } => {
                self.check_scalar_cond(cond, "conditional");
                let t = self.analyze_value(then);
                let f = self.analyze_value(otherwise);
                if t.is_arithmetic() && f.is_arithmetic() {
                    self.types.usual_arithmetic(&t, &f)
                } else if t.is_void() && f.is_void() {
                    self.types.void()
                } else if t.is_pointer() && f.is_pointer() {
                    if !t.compatible(&f) {
                        let tp = t.pointee().expect("pointer");
                        let fp = f.pointee().expect("pointer");
                        if !tp.is_void() && !fp.is_void() {
                            self.handler.warning(
                                "pointer type mismatch in conditional expression",
                                e.span,
                            );
                        }
                    }
                    t
                } else if t.is_pointer() && self.is_null_constant(otherwise) {
                    t
                } else if f.is_pointer() && self.is_null_constant(then) {
                    f
                } else if t.compatible(&f) {
                    t
                } else {
                    self.error(
                        "type mismatch in conditional expression",
                        e.span,
                    );
                    t
                }
            }
            ExprKind::Call { callee, args } => self.call_type(callee, args, e.span),
            ExprKind::Index { base, index } => {
                let base_ty = self.analyze_value(base);
                let index_ty = self.analyze_value(index);
                // Either order: a[i] and i[a].
                let (ptr, idx) = if base_ty.is_pointer() {
                    (base_ty, index_ty)
                } else {
                    (index_ty, base_ty)
                };
                if !idx.is_integer() {
                    self.error("array subscript is not an integer", e.span);
                }
                match ptr.pointee() {
                    Some(elem) => elem,
                    None => {
                        self.error("subscripted value is not an array or pointer", e.span);
                        self.types.int_()
                    }
                }
            }
            ExprKind::Member { base, field, arrow } => {
                let base_ty = self.analyze_expr(base);
                let rec_ty = if *arrow {
                    match self.types.decay(&base_ty).pointee() {
                        Some(p) => p,
                        None => {
                            self.error(
                                "'->' applied to a value that is not a pointer",
                                e.span,
                            );
                            return self.types.int_();
                        }
                    }
                } else {
                    base_ty
                };
                let Some(rec) = rec_ty.as_record() else {
                    self.error(
                        format!(
                            "request for member '{}' in something not a structure or union",
                            field
                        ),
                        e.span,
                    );
                    return self.types.int_();
                };
                if !rec.is_complete() {
                    self.error(
                        format!("member access into incomplete type '{}'", rec_ty),
                        e.span,
                    );
                    return self.types.int_();
                }
                match self.types.find_field(rec, *field) {
                    Some((ty, _)) => ty,
                    None => {
                        self.error(
                            format!("no member named '{}' in '{}'", field, rec_ty),
                            e.span,
                        );
                        self.types.int_()
                    }
                }
            }
            ExprKind::Cast { ty, operand } => {
                let _ = self.analyze_value(operand);
                self.convert_ty(ty)
            }
            ExprKind::SizeofExpr(operand) => {
                let ty = self.analyze_expr(operand);
                match self.types.size_of(&ty) {
                    Some(size) => {
                        self.types.const_idents.insert(e.id, size as i64);
                    }
                    None if !ty.is_function() => self.error(
                        "invalid application of 'sizeof' to an incomplete type",
                        e.span,
                    ),
                    None => {}
                }
                self.types.size_type()
            }
            ExprKind::SizeofType(ty_expr) => {
                let ty = self.convert_ty(ty_expr);
                match self.types.size_of(&ty) {
                    Some(size) => {
                        self.types.const_idents.insert(e.id, size as i64);
                    }
                    None => self.error(
                        "invalid application of 'sizeof' to an incomplete type",
                        e.span,
                    ),
                }
                self.types.size_type()
            }
            ExprKind::PostIncDec { operand, .. } => {
                let ty = self.analyze_expr(operand);
                if !self.is_lvalue(operand) {
                    self.error("lvalue required as increment operand", e.span);
                }
                let decayed = self.types.decay(&ty);
                if !decayed.is_scalar() {
                    self.error("wrong type argument to increment", e.span);
                }
                decayed
            }
            ExprKind::Comma { lhs, rhs } => {
                let _ = self.analyze_expr(lhs);
                self.analyze_value(rhs)
            }
            ExprKind::StmtExpr(items) => {
                self.symtab.push_scope(ScopeKind::Block);
                let mut last_ty = self.types.void();
                for item in items {
                    if let BlockItem::Stmt(Stmt { kind: StmtKind::Expr(inner), .. }) = item {
                        last_ty = self.analyze_value(inner);
                    } else {
                        self.analyze_block_item(item);
                        last_ty = self.types.void();
                    }
                }
                self.symtab.pop_scope();
                last_ty
            }
            ExprKind::Generic { controlling, assocs } => {
                // Double-gated: a tree built by a richer parser can
                // still carry the node when the effective set lacks it.
                if !self.features.contains(qcc_util::Feature::Generic) {
                    self.handler.warning(
                        "_Generic is not recognized in the selected standard",
                        e.span,
                    );
                }
                let control = self.analyze_value(controlling);
                let mut chosen: Option<usize> = None;
                let mut default_at: Option<usize> = None;
                for (i, assoc) in assocs.iter().enumerate() {
                    match &assoc.ty {
                        None => default_at = Some(i),
                        Some(ty_expr) => {
                            let ty = self.convert_ty(ty_expr);
                            if chosen.is_none() && ty.compatible(&control) {
                                chosen = Some(i);
                            }
                        }
                    }
                }
                let Some(pick) = chosen.or(default_at) else {
                    self.error(
                        format!("no _Generic association matches type '{}'", control),
                        e.span,
                    );
                    return self.types.int_();
                };
                self.types.generic_choices.insert(e.id, pick);
                // Only the chosen branch contributes a type, but all
                // branches are analyzed so their nodes are annotated.
                let mut result = self.types.int_();
                for (i, assoc) in assocs.iter().enumerate() {
                    let ty = self.analyze_value(&assoc.expr);
                    if i == pick {
                        result = ty;
                    }
                }
                result
            }
        }
    }

    fn int_literal_type(&self, value: u64, suffix: qcc_lex::IntSuffix) -> Type {
        let unsigned = suffix.unsigned;
        let kind = match suffix.longs {
            0 => {
                if value <= i32::MAX as u64 {
                    IntKind::Int
                } else if self.types.data_model.is_lp64() {
                    IntKind::Long
                } else {
                    IntKind::LongLong
                }
            }
            1 => IntKind::Long,
            _ => IntKind::LongLong,
        };
        self.types.int_of(kind, unsigned)
    }

    fn unary_type(&mut self, op: UnOp, operand: &Expr, span: Span) -> Type {
        match op {
            UnOp::Deref => {
                let ty = self.analyze_value(operand);
                match ty.pointee() {
                    Some(p) => p,
                    None => {
                        self.error("invalid type argument of unary '*'", span);
                        self.types.int_()
                    }
                }
            }
            UnOp::AddrOf => {
                let ty = self.analyze_expr(operand);
                if !self.is_lvalue(operand) && !ty.is_function() {
                    self.error("lvalue required as unary '&' operand", span);
                }
                self.types.pointer_to(ty)
            }
            UnOp::Plus | UnOp::Neg => {
                let ty = self.analyze_value(operand);
                if !ty.is_arithmetic() {
                    self.error("wrong type argument to unary minus", span);
                    return self.types.int_();
                }
                self.types.promote(&ty)
            }
            UnOp::Not => {
                let ty = self.analyze_value(operand);
                if !ty.is_scalar() {
                    self.error("wrong type argument to unary '!'", span);
                }
                self.types.int_()
            }
            UnOp::BitNot => {
                let ty = self.analyze_value(operand);
                if !ty.is_integer() {
                    self.error("wrong type argument to bit-complement", span);
                    return self.types.int_();
                }
                self.types.promote(&ty)
            }
            UnOp::PreInc | UnOp::PreDec => {
                let ty = self.analyze_expr(operand);
                if !self.is_lvalue(operand) {
                    self.error("lvalue required as increment operand", span);
                }
                let decayed = self.types.decay(&ty);
                if !decayed.is_scalar() {
                    self.error("wrong type argument to increment", span);
                }
                decayed
            }
        }
    }

    fn binary_type(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, span: Span) -> Type {
        let lt = self.analyze_value(lhs);
        let rt = self.analyze_value(rhs);

        if op.is_comparison() || op.is_logical() {
            if op.is_logical() {
                if !lt.is_scalar() || !rt.is_scalar() {
                    self.error("invalid operands to logical expression", span);
                }
            } else if !(lt.is_arithmetic() && rt.is_arithmetic())
                && !(lt.is_pointer() && rt.is_pointer())
                && !(lt.is_pointer() && self.is_null_constant(rhs))
                && !(rt.is_pointer() && self.is_null_constant(lhs))
            {
                self.error(
                    format!("invalid operands to binary {} ('{}' and '{}')", op.as_str(), lt, rt),
                    span,
                );
            }
            return self.types.int_();
        }

        match op {
            BinOp::Add => {
                if lt.is_pointer() && rt.is_integer() {
                    return lt;
                }
                if lt.is_integer() && rt.is_pointer() {
                    return rt;
                }
                self.arith_binary(&lt, &rt, op, span)
            }
            BinOp::Sub => {
                if lt.is_pointer() && rt.is_pointer() {
                    // Pointer difference.
                    return if self.types.data_model.is_lp64() {
                        self.types.long_()
                    } else {
                        self.types.int_()
                    };
                }
                if lt.is_pointer() && rt.is_integer() {
                    return lt;
                }
                self.arith_binary(&lt, &rt, op, span)
            }
            BinOp::Shl | BinOp::Shr => {
                if !lt.is_integer() || !rt.is_integer() {
                    self.error(
                        format!("invalid operands to binary {}", op.as_str()),
                        span,
                    );
                    return self.types.int_();
                }
                self.types.promote(&lt)
            }
            BinOp::Rem | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
                if !lt.is_integer() || !rt.is_integer() {
                    self.error(
                        format!("invalid operands to binary {}", op.as_str()),
                        span,
                    );
                    return self.types.int_();
                }
                self.types.usual_arithmetic(&lt, &rt)
            }
            _ => self.arith_binary(&lt, &rt, op, span),
        }
    }

    fn arith_binary(&mut self, lt: &Type, rt: &Type, op: BinOp, span: Span) -> Type {
        if !lt.is_arithmetic() || !rt.is_arithmetic() {
            self.error(
                format!("invalid operands to binary {} ('{}' and '{}')", op.as_str(), lt, rt),
                span,
            );
            return self.types.int_();
        }
        self.types.usual_arithmetic(lt, rt)
    }

    fn assign_type(&mut self, op: Option<BinOp>, lhs: &Expr, rhs: &Expr, span: Span) -> Type {
        let lt = self.analyze_expr(lhs);
        if !self.is_lvalue(lhs) {
            self.error("lvalue required as left operand of assignment", span);
        }
        if lt.quals.is_const {
            self.error("assignment of read-only location", span);
        }
        let rt = self.analyze_value(rhs);

        if let Some(op) = op {
            // Compound assignment checks like the underlying binary op.
            let ok = match op {
                BinOp::Add | BinOp::Sub => {
                    (lt.is_pointer() && rt.is_integer())
                        || (lt.is_arithmetic() && rt.is_arithmetic())
                }
                BinOp::Shl | BinOp::Shr | BinOp::Rem | BinOp::BitAnd | BinOp::BitOr
                | BinOp::BitXor => lt.is_integer() && rt.is_integer(),
                _ => lt.is_arithmetic() && rt.is_arithmetic(),
            };
            if !ok {
                self.error(
                    format!("invalid operands to compound assignment {}=", op.as_str()),
                    span,
                );
            }
        } else {
            let is_null = self.is_null_constant(rhs);
            let target = self.types.decay(&lt);
            match self.types.assignable(&target, &rt, is_null) {
                Assignability::Ok => {}
                Assignability::Warn(msg) => self.handler.warning(msg, span),
                Assignability::Incompatible => self.error(
                    format!(
                        "incompatible types when assigning to '{}' from '{}'",
                        lt, rt
                    ),
                    span,
                ),
            }
        }
        lt.unqualified()
    }

    fn call_type(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Type {
        let callee_ty = self.analyze_value(callee);
        let Some(func) = callee_ty.as_function().cloned() else {
            self.error("called object is not a function or function pointer", span);
            for arg in args {
                let _ = self.analyze_value(arg);
            }
            return self.types.int_();
        };

        if !func.unspecified {
            let expected = func.params.len();
            let given = args.len();
            let arity_ok = if func.variadic {
                given >= expected
            } else {
                given == expected
            };
            if !arity_ok {
                self.error(
                    format!(
                        "expected {}{} argument(s), but {} given",
                        if func.variadic { "at least " } else { "" },
                        expected,
                        given
                    ),
                    span,
                );
            }
        }

        for (i, arg) in args.iter().enumerate() {
            let found = self.analyze_value(arg);
            if let Some(param) = func.params.get(i) {
                let is_null = self.is_null_constant(arg);
                match self.types.assignable(param, &found, is_null) {
                    Assignability::Ok => {}
                    Assignability::Warn(msg) => self.handler.warning(msg, arg.span),
                    Assignability::Incompatible => self.error(
                        format!(
                            "incompatible type for argument {}: expected '{}', found '{}'",
                            i + 1,
                            param,
                            found
                        ),
                        arg.span,
                    ),
                }
            }
        }
        func.ret.clone()
    }

    /// Is the expression an object locator: identifier, subscript,
    /// member access, or dereference?
    pub(crate) fn is_lvalue(&self, e: &Expr) -> bool {
        match &e.kind {
            ExprKind::Ident(name) => match self.symtab.lookup_ordinary(*name) {
                Some(id) => matches!(
                    self.symtab.binding(id).kind,
                    BindingKind::Variable | BindingKind::Parameter
                ),
                None => true, // already diagnosed as undeclared
            },
            ExprKind::Index { .. } | ExprKind::Member { .. } => true,
            ExprKind::Unary { op: UnOp::Deref, .. } => true,
            ExprKind::StrLit(_) => true,
            _ => false,
        }
    }

    /// Is the expression an integer constant expression with value 0?
    pub(crate) fn is_null_constant(&self, e: &Expr) -> bool {
        matches!(self.try_fold(e), Some(0))
    }
}

// The constant folder lives in fold.rs and is also part of this impl.

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use qcc_lex::Lexer;
    use qcc_par::Parser;
    use qcc_util::{Arch, SourceMap, Standard};

    pub(crate) struct Analyzed {
        pub unit: TranslationUnit,
        pub handler: Handler,
        pub types: TypeContext,
    }

    pub(crate) fn analyze(text: &str) -> Analyzed {
        let mut sources = SourceMap::new();
        let file = sources.add_file("test.c", text);
        let handler = Handler::new();
        let features = Standard::Gnu17.features();
        let unit = {
            let tokens = Lexer::new(file, features, &handler).tokenize();
            Parser::new(tokens, features, &handler).parse()
        };
        let types = {
            let mut sema =
                SemanticAnalyzer::new(Arch::X86_64.data_model(), features, &handler);
            sema.run(&unit);
            sema.types
        };
        Analyzed {
            unit,
            handler,
            types,
        }
    }

    pub(crate) fn analyze_ok(text: &str) -> Analyzed {
        let out = analyze(text);
        assert!(
            !out.handler.has_errors(),
            "unexpected errors: {:?}",
            out.handler.diagnostics()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::{analyze, analyze_ok};
    use super::*;

    /// Every expression node in the tree must carry a type.
    fn assert_fully_typed(unit: &TranslationUnit, types: &TypeContext) {
        fn walk_expr(e: &Expr, types: &TypeContext) {
            assert!(
                types.type_of(e.id).is_some(),
                "expression at {:?} has no resolved type",
                e.span
            );
            match &e.kind {
                ExprKind::Unary { operand, .. }
                | ExprKind::SizeofExpr(operand)
                | ExprKind::PostIncDec { operand, .. } => walk_expr(operand, types),
                ExprKind::Binary { lhs, rhs, .. }
                | ExprKind::Assign { lhs, rhs, .. }
                | ExprKind::Comma { lhs, rhs } => {
                    walk_expr(lhs, types);
                    walk_expr(rhs, types);
                }
                ExprKind::Cond { cond, then, otherwise } => {
                    walk_expr(cond, types);
                    walk_expr(then, types);
                    walk_expr(otherwise, types);
                }
                ExprKind::Call { callee, args } => {
                    walk_expr(callee, types);
                    args.iter().for_each(|a| walk_expr(a, types));
                }
                ExprKind::Index { base, index } => {
                    walk_expr(base, types);
                    walk_expr(index, types);
                }
                ExprKind::Member { base, .. } => walk_expr(base, types),
                ExprKind::Cast { operand, .. } => walk_expr(operand, types),
                _ => {}
            }
        }
        fn walk_stmt(s: &Stmt, types: &TypeContext) {
            match &s.kind {
                StmtKind::Compound(items) => items.iter().for_each(|i| walk_item(i, types)),
                StmtKind::Expr(e) => walk_expr(e, types),
                StmtKind::If { cond, then, otherwise } => {
                    walk_expr(cond, types);
                    walk_stmt(then, types);
                    if let Some(o) = otherwise {
                        walk_stmt(o, types);
                    }
                }
                StmtKind::While { cond, body } | StmtKind::DoWhile { cond, body } => {
                    walk_expr(cond, types);
                    walk_stmt(body, types);
                }
                StmtKind::For { init, cond, step, body } => {
                    if let Some(ForInit::Expr(e)) = init {
                        walk_expr(e, types);
                    }
                    if let Some(c) = cond {
                        walk_expr(c, types);
                    }
                    if let Some(st) = step {
                        walk_expr(st, types);
                    }
                    walk_stmt(body, types);
                }
                StmtKind::Switch { cond, body } => {
                    walk_expr(cond, types);
                    walk_stmt(body, types);
                }
                StmtKind::Case { value, body } => {
                    walk_expr(value, types);
                    walk_stmt(body, types);
                }
                StmtKind::Default { body } | StmtKind::Label { body, .. } => {
                    walk_stmt(body, types)
                }
                StmtKind::Return(Some(e)) => walk_expr(e, types),
                _ => {}
            }
        }
        fn walk_item(item: &BlockItem, types: &TypeContext) {
            match item {
                BlockItem::Stmt(s) => walk_stmt(s, types),
                BlockItem::Decl(d) => {
                    if let DeclKind::Var(v) = &d.kind {
                        if let Some(Init::Expr(e)) = &v.init {
                            walk_expr(e, types);
                        }
                    }
                }
            }
        }
        for decl in &unit.decls {
            match &decl.kind {
                DeclKind::Function(f) => {
                    if let Some(Stmt { kind: StmtKind::Compound(items), .. }) = &f.body {
                        items.iter().for_each(|i| walk_item(i, types));
                    }
                }
                DeclKind::Var(v) => {
                    if let Some(Init::Expr(e)) = &v.init {
                        walk_expr(e, types);
                    }
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_simple_function_types() {
        let out = analyze_ok("int add(int a, int b) { return a + b; }");
        assert_fully_typed(&out.unit, &out.types);

        // The + node has type int.
        let DeclKind::Function(f) = &out.unit.decls[0].kind else {
            panic!()
        };
        let Some(Stmt { kind: StmtKind::Compound(items), .. }) = &f.body else {
            panic!()
        };
        let BlockItem::Stmt(Stmt { kind: StmtKind::Return(Some(e)), .. }) = &items[0] else {
            panic!()
        };
        let ty = out.types.type_of(e.id).expect("typed");
        assert!(matches!(
            ty.kind(),
            TypeKind::Int { kind: IntKind::Int, unsigned: false }
        ));
    }

    #[test]
    fn test_undeclared_identifier_message() {
        let out = analyze("int main(void) { return x; }");
        assert_eq!(out.handler.error_count(), 1);
        let diag = &out.handler.diagnostics()[0];
        assert_eq!(diag.message, "Undeclared identifier 'x'");
        // The location is the x token's.
        assert_eq!(diag.span.line, 1);
    }

    #[test]
    fn test_typedef_struct_member() {
        let out = analyze_ok(
            "typedef struct point { int x; int y; } Point;\n\
             int get_x(Point *p) { return p->x; }",
        );
        assert_fully_typed(&out.unit, &out.types);
    }

    #[test]
    fn test_member_offset() {
        let out = analyze_ok("struct point { int x; int y; };");
        let _ = out;
    }

    #[test]
    fn test_usual_conversions_in_binary() {
        let out = analyze_ok("double f(int i, double d) { return i + d; }");
        assert_fully_typed(&out.unit, &out.types);
    }

    #[test]
    fn test_comparison_yields_int() {
        let out = analyze_ok("int f(double a, double b) { return a < b; }");
        let _ = out;
    }

    #[test]
    fn test_assignment_requires_lvalue() {
        let out = analyze("void f(int a) { 1 = a; }");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_const_assignment_rejected() {
        let out = analyze("void f(void) { const int c = 1; c = 2; }");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_call_arity() {
        let out = analyze("int g(int a, int b); int f(void) { return g(1); }");
        assert!(out.handler.has_errors());
        let out = analyze("int g(int a, ...); int f(void) { return g(1, 2, 3); }");
        assert!(!out.handler.has_errors());
    }

    #[test]
    fn test_break_continue_placement() {
        assert!(analyze("void f(void) { break; }").handler.has_errors());
        assert!(analyze("void f(void) { continue; }").handler.has_errors());
        assert!(
            !analyze_ok("void f(int n) { while (n) { if (n) break; continue; } }")
                .handler
                .has_errors()
        );
        // break is valid directly inside a switch.
        analyze_ok("void f(int n) { switch (n) { case 1: break; } }");
    }

    #[test]
    fn test_case_outside_switch() {
        let out = analyze("void f(void) { case 1: ; }");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_case_requires_constant() {
        let out = analyze("void f(int n) { switch (n) { case n: ; } }");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_void_return_rules() {
        assert!(analyze("void f(void) { return 1; }").handler.has_errors());
        let out = analyze("int f(void) { return; }");
        assert!(out.handler.warning_count() >= 1);
    }

    #[test]
    fn test_switch_needs_integer() {
        let out = analyze("void f(double d) { switch (d) { } }");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_undefined_label() {
        let out = analyze("void f(void) { goto nowhere; }");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_duplicate_label() {
        let out = analyze("void f(void) { x: ; x: ; }");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_redefinition() {
        let out = analyze("int x; double x;");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_function_redeclaration_ok() {
        analyze_ok("int f(int); int f(int x) { return x; }");
    }

    #[test]
    fn test_array_decay_in_call() {
        analyze_ok(
            "int sum(int *p, int n);\n\
             int f(void) { int a[4]; return sum(a, 4); }",
        );
    }

    #[test]
    fn test_array_length_from_initializer() {
        let out = analyze_ok("int a[] = {1, 2, 3}; int n = sizeof(a);");
        let _ = out;
    }

    #[test]
    fn test_enum_constants() {
        analyze_ok(
            "enum color { RED, GREEN = 5, BLUE };\n\
             int f(void) { return BLUE; }",
        );
    }

    #[test]
    fn test_incomplete_struct_completion() {
        analyze_ok(
            "struct node;\n\
             struct node { struct node *next; int v; };\n\
             int f(struct node *n) { return n->v; }",
        );
    }

    #[test]
    fn test_sizeof_incomplete_errors() {
        let out = analyze("struct s; int n = sizeof(struct s);");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_generic_selection() {
        let out = analyze_ok(
            "int f(void) { return _Generic(1, int: 10, double: 20, default: 30); }",
        );
        // The chosen association is recorded for lowering.
        assert_eq!(out.types.generic_choices.len(), 1);
        assert_eq!(*out.types.generic_choices.values().next().expect("choice"), 0);
    }

    #[test]
    fn test_null_pointer_constant_assignment() {
        analyze_ok("void f(void) { int *p = 0; p = 0; }");
        let out = analyze("void f(void) { int *p = 5; }");
        assert!(out.handler.warning_count() >= 1);
    }

    #[test]
    fn test_pointer_int_comparison_diagnosed() {
        let out = analyze("int f(int *p) { return p < 1; }");
        assert!(out.handler.has_errors());
    }

    #[test]
    fn test_scope_stack_balanced_after_run() {
        use qcc_lex::Lexer;
        use qcc_par::Parser;
        use qcc_util::{Arch, SourceMap, Standard};

        let mut sources = SourceMap::new();
        let file = sources.add_file(
            "balance.c",
            "int f(int n) { { int x = n; } for (int i = 0; i < n; i = i + 1) { int y = i; } return n; }",
        );
        let handler = Handler::new();
        let features = Standard::Gnu17.features();
        let unit = {
            let tokens = Lexer::new(file, features, &handler).tokenize();
            Parser::new(tokens, features, &handler).parse()
        };
        let mut sema = SemanticAnalyzer::new(Arch::X86_64.data_model(), features, &handler);
        sema.run(&unit);
        assert!(!handler.has_errors());
        // Every push_scope was matched by exactly one pop_scope.
        assert!(sema.symtab.at_file_scope());
        assert_eq!(sema.symtab.depth(), 0);
    }

    #[test]
    fn test_fully_typed_after_clean_run() {
        let out = analyze_ok(
            "int g(int);\n\
             int f(int n) {\n\
                 int s = 0;\n\
                 for (int i = 0; i < n; i = i + 1) s = s + g(i);\n\
                 return s > 100 ? 100 : s;\n\
             }",
        );
        assert_fully_typed(&out.unit, &out.types);
    }
}
