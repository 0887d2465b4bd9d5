//! AST dumping (`-ast-dump`).
//!
//! A line-per-node indented tree: node kind, source location in
//! `filename:line:col` form, and kind-specific attributes (operator,
//! identifier name, literal value, resolved type where the analyzer
//! recorded one).

use qcc_par::ast::*;
use qcc_sem::TypeContext;
use qcc_util::{SourceMap, Span};

pub(crate) fn dump_unit(unit: &TranslationUnit, types: &TypeContext, sources: &SourceMap) -> String {
    let mut out = String::new();
    out.push_str("TranslationUnit\n");
    let d = Dumper { types, sources };
    for decl in &unit.decls {
        d.decl(&mut out, decl, 1);
    }
    out
}

struct Dumper<'a> {
    types: &'a TypeContext,
    sources: &'a SourceMap,
}

impl<'a> Dumper<'a> {
    fn loc(&self, span: Span) -> String {
        format!(
            "{}:{}:{}",
            self.sources.name_of(span.file_id),
            span.line,
            span.column
        )
    }

    fn line(&self, out: &mut String, depth: usize, text: &str) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(text);
        out.push('\n');
    }

    fn decl(&self, out: &mut String, decl: &Decl, depth: usize) {
        match &decl.kind {
            DeclKind::Function(f) => {
                self.line(
                    out,
                    depth,
                    &format!(
                        "FunctionDecl '{}' {} {}",
                        f.name,
                        self.loc(decl.span),
                        if f.body.is_some() { "definition" } else { "prototype" }
                    ),
                );
                if let TyExprKind::Function { params, .. } = &f.ty.kind {
                    for param in params {
                        let name = param
                            .name
                            .map(|n| n.as_str())
                            .unwrap_or("<anonymous>");
                        self.line(
                            out,
                            depth + 1,
                            &format!("Param '{}' {}", name, self.loc(param.span)),
                        );
                    }
                }
                if let Some(body) = &f.body {
                    self.stmt(out, body, depth + 1);
                }
            }
            DeclKind::Var(v) => {
                self.line(
                    out,
                    depth,
                    &format!("VarDecl '{}' {}", v.name, self.loc(decl.span)),
                );
                match &v.init {
                    Some(Init::Expr(e)) => self.expr(out, e, depth + 1),
                    Some(Init::List(items)) => {
                        self.line(out, depth + 1, "InitList");
                        for item in items {
                            if let Init::Expr(e) = &item.init {
                                self.expr(out, e, depth + 2);
                            }
                        }
                    }
                    None => {}
                }
            }
            DeclKind::Typedef(td) => {
                self.line(
                    out,
                    depth,
                    &format!("TypedefDecl '{}' {}", td.name, self.loc(decl.span)),
                );
            }
            DeclKind::Tag(ty) => {
                let what = match &ty.kind {
                    TyExprKind::Record { kind: RecordKind::Struct, tag, .. } => {
                        format!("StructDecl{}", tag_suffix(tag))
                    }
                    TyExprKind::Record { kind: RecordKind::Union, tag, .. } => {
                        format!("UnionDecl{}", tag_suffix(tag))
                    }
                    TyExprKind::Enum { tag, .. } => format!("EnumDecl{}", tag_suffix(tag)),
                    _ => "TagDecl".to_owned(),
                };
                self.line(out, depth, &format!("{} {}", what, self.loc(decl.span)));
            }
        }
    }

    fn stmt(&self, out: &mut String, stmt: &Stmt, depth: usize) {
        let loc = self.loc(stmt.span);
        match &stmt.kind {
            StmtKind::Compound(items) => {
                self.line(out, depth, &format!("CompoundStmt {}", loc));
                for item in items {
                    match item {
                        BlockItem::Decl(decl) => self.decl(out, decl, depth + 1),
                        BlockItem::Stmt(stmt) => self.stmt(out, stmt, depth + 1),
                    }
                }
            }
            StmtKind::Expr(e) => {
                self.line(out, depth, &format!("ExprStmt {}", loc));
                self.expr(out, e, depth + 1);
            }
            StmtKind::Null => self.line(out, depth, &format!("NullStmt {}", loc)),
            StmtKind::If { cond, then, otherwise } => {
                self.line(out, depth, &format!("IfStmt {}", loc));
                self.expr(out, cond, depth + 1);
                self.stmt(out, then, depth + 1);
                if let Some(otherwise) = otherwise {
                    self.stmt(out, otherwise, depth + 1);
                }
            }
            StmtKind::While { cond, body } => {
                self.line(out, depth, &format!("WhileStmt {}", loc));
                self.expr(out, cond, depth + 1);
                self.stmt(out, body, depth + 1);
            }
            StmtKind::DoWhile { body, cond } => {
                self.line(out, depth, &format!("DoStmt {}", loc));
                self.stmt(out, body, depth + 1);
                self.expr(out, cond, depth + 1);
            }
            StmtKind::For { init, cond, step, body } => {
                self.line(out, depth, &format!("ForStmt {}", loc));
                match init {
                    Some(ForInit::Decl(decl)) => self.decl(out, decl, depth + 1),
                    Some(ForInit::Expr(e)) => self.expr(out, e, depth + 1),
                    None => {}
                }
                if let Some(cond) = cond {
                    self.expr(out, cond, depth + 1);
                }
                if let Some(step) = step {
                    self.expr(out, step, depth + 1);
                }
                self.stmt(out, body, depth + 1);
            }
            StmtKind::Switch { cond, body } => {
                self.line(out, depth, &format!("SwitchStmt {}", loc));
                self.expr(out, cond, depth + 1);
                self.stmt(out, body, depth + 1);
            }
            StmtKind::Case { value, body } => {
                self.line(out, depth, &format!("CaseStmt {}", loc));
                self.expr(out, value, depth + 1);
                self.stmt(out, body, depth + 1);
            }
            StmtKind::Default { body } => {
                self.line(out, depth, &format!("DefaultStmt {}", loc));
                self.stmt(out, body, depth + 1);
            }
            StmtKind::Break => self.line(out, depth, &format!("BreakStmt {}", loc)),
            StmtKind::Continue => self.line(out, depth, &format!("ContinueStmt {}", loc)),
            StmtKind::Return(value) => {
                self.line(out, depth, &format!("ReturnStmt {}", loc));
                if let Some(value) = value {
                    self.expr(out, value, depth + 1);
                }
            }
            StmtKind::Goto(label) => {
                self.line(out, depth, &format!("GotoStmt '{}' {}", label, loc))
            }
            StmtKind::Label { name, body } => {
                self.line(out, depth, &format!("LabelStmt '{}' {}", name, loc));
                self.stmt(out, body, depth + 1);
            }
        }
    }

    fn expr(&self, out: &mut String, e: &Expr, depth: usize) {
        let loc = self.loc(e.span);
        let ty = self
            .types
            .type_of(e.id)
            .map(|t| format!(" '{}'", t))
            .unwrap_or_default();
        let head = match &e.kind {
            ExprKind::IntLit { value, .. } => format!("IntLit {}{}", value, ty),
            ExprKind::FloatLit { value, .. } => format!("FloatLit {}{}", value, ty),
            ExprKind::CharLit(code) => format!("CharLit {}{}", code, ty),
            ExprKind::StrLit(bytes) => format!(
                "StrLit \"{}\"{}",
                String::from_utf8_lossy(bytes).escape_default(),
                ty
            ),
            ExprKind::Ident(name) => format!("Ident '{}'{}", name, ty),
            ExprKind::Unary { op, .. } => format!("UnaryExpr '{:?}'{}", op, ty),
            ExprKind::Binary { op, .. } => format!("BinaryExpr '{}'{}", op.as_str(), ty),
            ExprKind::Assign { op, .. } => match op {
                Some(op) => format!("AssignExpr '{}='{}", op.as_str(), ty),
                None => format!("AssignExpr '='{}", ty),
            },
            ExprKind::Cond { .. } => format!("ConditionalExpr{}", ty),
            ExprKind::Call { .. } => format!("CallExpr{}", ty),
            ExprKind::Index { .. } => format!("IndexExpr{}", ty),
            ExprKind::Member { field, arrow, .. } => format!(
                "MemberExpr '{}{}'{}",
                if *arrow { "->" } else { "." },
                field,
                ty
            ),
            ExprKind::Cast { .. } => format!("CastExpr{}", ty),
            ExprKind::SizeofExpr(_) => format!("SizeofExpr{}", ty),
            ExprKind::SizeofType(_) => format!("SizeofType{}", ty),
            ExprKind::PostIncDec { inc, .. } => format!(
                "PostfixExpr '{}'{}",
                if *inc { "++" } else { "--" },
                ty
            ),
            ExprKind::Comma { .. } => format!("CommaExpr{}", ty),
            ExprKind::StmtExpr(_) => format!("StmtExpr{}", ty),
            ExprKind::Generic { .. } => format!("GenericSelection{}", ty),
        };
        self.line(out, depth, &format!("{} {}", head, loc));

        match &e.kind {
            ExprKind::Unary { operand, .. }
            | ExprKind::SizeofExpr(operand)
            | ExprKind::PostIncDec { operand, .. }
            | ExprKind::Cast { operand, .. } => self.expr(out, operand, depth + 1),
            ExprKind::Binary { lhs, rhs, .. }
            | ExprKind::Assign { lhs, rhs, .. }
            | ExprKind::Comma { lhs, rhs } => {
                self.expr(out, lhs, depth + 1);
                self.expr(out, rhs, depth + 1);
            }
            ExprKind::Cond { cond, then, otherwise } => {
                self.expr(out, cond, depth + 1);
                self.expr(out, then, depth + 1);
                self.expr(out, otherwise, depth + 1);
            }
            ExprKind::Call { callee, args } => {
                self.expr(out, callee, depth + 1);
                for arg in args {
                    self.expr(out, arg, depth + 1);
                }
            }
            ExprKind::Index { base, index } => {
                self.expr(out, base, depth + 1);
                self.expr(out, index, depth + 1);
            }
            ExprKind::Member { base, .. } => self.expr(out, base, depth + 1),
            ExprKind::Generic { controlling, assocs } => {
                self.expr(out, controlling, depth + 1);
                for assoc in assocs {
                    self.expr(out, &assoc.expr, depth + 1);
                }
            }
            _ => {}
        }
    }
}

fn tag_suffix(tag: &Option<qcc_util::Symbol>) -> String {
    match tag {
        Some(tag) => format!(" '{}'", tag),
        None => String::new(),
    }
}
