//! The optimization passes.
//!
//! Every pass is a bottom-up rewrite returning its mutation count.
//! Passes that replace an expression reuse an existing node's id (their
//! own, or a consumed child's), so the semantic analyzer's per-node type
//! table stays valid across rewrites.

use qcc_par::ast::*;
use qcc_sem::TypeContext;

use crate::PassId;

pub(crate) fn run_pass(
    id: PassId,
    unit: &mut TranslationUnit,
    sema: Option<&TypeContext>,
) -> u64 {
    match id {
        PassId::Normalize => walk_unit_exprs(unit, &mut normalize_expr),
        PassId::IdentityOps => walk_unit_exprs(unit, &mut identity_expr),
        PassId::ConstFold => walk_unit_exprs(unit, &mut fold_expr),
        PassId::DeadCode => dead_code_unit(unit),
        PassId::StrengthReduce => {
            let sema = sema.expect("strength-reduce requires semantic info");
            walk_unit_exprs(unit, &mut |e| strength_reduce_expr(e, sema))
        }
    }
}

// =============================================================================
// EXPRESSION WALKER
// =============================================================================

fn walk_unit_exprs(unit: &mut TranslationUnit, f: &mut dyn FnMut(&mut Expr) -> u64) -> u64 {
    let mut n = 0;
    for decl in &mut unit.decls {
        n += walk_decl_exprs(decl, f);
    }
    n
}

fn walk_decl_exprs(decl: &mut Decl, f: &mut dyn FnMut(&mut Expr) -> u64) -> u64 {
    match &mut decl.kind {
        DeclKind::Function(func) => match &mut func.body {
            Some(body) => walk_stmt_exprs(body, f),
            None => 0,
        },
        DeclKind::Var(var) => match &mut var.init {
            Some(init) => walk_init_exprs(init, f),
            None => 0,
        },
        _ => 0,
    }
}

fn walk_init_exprs(init: &mut Init, f: &mut dyn FnMut(&mut Expr) -> u64) -> u64 {
    match init {
        Init::Expr(e) => walk_expr(e, f),
        Init::List(items) => items
            .iter_mut()
            .map(|item| walk_init_exprs(&mut item.init, f))
            .sum(),
    }
}

fn walk_stmt_exprs(stmt: &mut Stmt, f: &mut dyn FnMut(&mut Expr) -> u64) -> u64 {
    let mut n = 0;
    match &mut stmt.kind {
        StmtKind::Compound(items) => {
            for item in items {
                n += match item {
                    BlockItem::Decl(decl) => walk_decl_exprs(decl, f),
                    BlockItem::Stmt(stmt) => walk_stmt_exprs(stmt, f),
                };
            }
        }
        StmtKind::Expr(e) => n += walk_expr(e, f),
        StmtKind::If { cond, then, otherwise } => {
            n += walk_expr(cond, f);
            n += walk_stmt_exprs(then, f);
            if let Some(otherwise) = otherwise {
                n += walk_stmt_exprs(otherwise, f);
            }
        }
        StmtKind::While { cond, body } | StmtKind::DoWhile { cond, body } => {
            n += walk_expr(cond, f);
            n += walk_stmt_exprs(body, f);
        }
        StmtKind::For { init, cond, step, body } => {
            match init {
                Some(ForInit::Decl(decl)) => n += walk_decl_exprs(decl, f),
                Some(ForInit::Expr(e)) => n += walk_expr(e, f),
                None => {}
            }
            if let Some(cond) = cond {
                n += walk_expr(cond, f);
            }
            if let Some(step) = step {
                n += walk_expr(step, f);
            }
            n += walk_stmt_exprs(body, f);
        }
        StmtKind::Switch { cond, body } => {
            n += walk_expr(cond, f);
            n += walk_stmt_exprs(body, f);
        }
        StmtKind::Case { value, body } => {
            n += walk_expr(value, f);
            n += walk_stmt_exprs(body, f);
        }
        StmtKind::Default { body } | StmtKind::Label { body, .. } => {
            n += walk_stmt_exprs(body, f);
        }
        StmtKind::Return(Some(e)) => n += walk_expr(e, f),
        _ => {}
    }
    n
}

/// Children first, then the node itself.
fn walk_expr(e: &mut Expr, f: &mut dyn FnMut(&mut Expr) -> u64) -> u64 {
    let mut n = 0;
    match &mut e.kind {
        ExprKind::Unary { operand, .. }
        | ExprKind::SizeofExpr(operand)
        | ExprKind::PostIncDec { operand, .. }
        | ExprKind::Cast { operand, .. } => n += walk_expr(operand, f),
        ExprKind::Binary { lhs, rhs, .. }
        | ExprKind::Assign { lhs, rhs, .. }
        | ExprKind::Comma { lhs, rhs } => {
            n += walk_expr(lhs, f);
            n += walk_expr(rhs, f);
        }
        ExprKind::Cond { cond, then, otherwise } => {
            n += walk_expr(cond, f);
            n += walk_expr(then, f);
            n += walk_expr(otherwise, f);
        }
        ExprKind::Call { callee, args } => {
            n += walk_expr(callee, f);
            for arg in args {
                n += walk_expr(arg, f);
            }
        }
        ExprKind::Index { base, index } => {
            n += walk_expr(base, f);
            n += walk_expr(index, f);
        }
        ExprKind::Member { base, .. } => n += walk_expr(base, f),
        ExprKind::StmtExpr(items) => {
            for item in items {
                n += match item {
                    BlockItem::Decl(decl) => walk_decl_exprs(decl, f),
                    BlockItem::Stmt(stmt) => walk_stmt_exprs(stmt, f),
                };
            }
        }
        ExprKind::Generic { controlling, assocs } => {
            n += walk_expr(controlling, f);
            for assoc in assocs {
                n += walk_expr(&mut assoc.expr, f);
            }
        }
        _ => {}
    }
    n + f(e)
}

fn int_lit(value: u64) -> ExprKind {
    ExprKind::IntLit {
        value,
        suffix: Default::default(),
    }
}

fn as_int_lit(e: &Expr) -> Option<u64> {
    match e.kind {
        ExprKind::IntLit { value, .. } => Some(value),
        _ => None,
    }
}

/// Replace `e` with one of its children, keeping the child's node id.
fn replace_with(e: &mut Expr, child: Expr) {
    *e = child;
}

// =============================================================================
// NORMALIZE
// =============================================================================

/// `!!x` becomes `x != 0`; commutative operations move their constant
/// operand to the right.
fn normalize_expr(e: &mut Expr) -> u64 {
    // Double negation: `!!x` -> `x != 0`. The inner `!` node's id is
    // recycled for the new literal.
    let is_double_not = matches!(
        &e.kind,
        ExprKind::Unary { op: UnOp::Not, operand }
            if matches!(operand.kind, ExprKind::Unary { op: UnOp::Not, .. })
    );
    if is_double_not {
        let ExprKind::Unary { operand, .. } = std::mem::replace(&mut e.kind, int_lit(0)) else {
            unreachable!("shape checked above");
        };
        let inner = *operand;
        let inner_id = inner.id;
        let ExprKind::Unary { operand: x, .. } = inner.kind else {
            unreachable!("shape checked above");
        };
        e.kind = ExprKind::Binary {
            op: BinOp::Ne,
            lhs: x,
            rhs: Box::new(Expr {
                id: inner_id,
                kind: int_lit(0),
                span: e.span,
            }),
        };
        return 1;
    }

    // Commutative constant to the right: `1 + x` -> `x + 1`.
    if let ExprKind::Binary { op, lhs, rhs } = &mut e.kind {
        let commutative = matches!(
            op,
            BinOp::Add | BinOp::Mul | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor
        );
        if commutative && as_int_lit(lhs).is_some() && as_int_lit(rhs).is_none() {
            std::mem::swap(lhs, rhs);
            return 1;
        }
    }
    0
}

// =============================================================================
// IDENTITY OPERATIONS
// =============================================================================

/// `x+0`, `x-0`, `x*1`, `x/1`, `x<<0`, `x>>0`, `x|0`, `x^0` reduce to
/// `x`.
fn identity_expr(e: &mut Expr) -> u64 {
    let ExprKind::Binary { op, lhs, rhs } = &mut e.kind else {
        return 0;
    };
    let Some(value) = as_int_lit(rhs) else {
        return 0;
    };
    let is_identity = match op {
        BinOp::Add | BinOp::Sub | BinOp::Shl | BinOp::Shr | BinOp::BitOr | BinOp::BitXor => {
            value == 0
        }
        BinOp::Mul | BinOp::Div => value == 1,
        _ => false,
    };
    if !is_identity {
        return 0;
    }
    let x = std::mem::replace(
        lhs.as_mut(),
        Expr {
            id: e.id,
            kind: int_lit(0),
            span: e.span,
        },
    );
    replace_with(e, x);
    1
}

// =============================================================================
// CONSTANT FOLDING
// =============================================================================

/// Evaluate literal integer arithmetic, reusing the folded node's id.
fn fold_expr(e: &mut Expr) -> u64 {
    let folded = match &e.kind {
        ExprKind::Unary { op, operand } => {
            let v = match as_int_lit(operand) {
                Some(v) => v as i64,
                None => return 0,
            };
            match op {
                UnOp::Plus => Some(v),
                UnOp::Neg => Some(v.wrapping_neg()),
                UnOp::Not => Some((v == 0) as i64),
                UnOp::BitNot => Some(!v),
                _ => None,
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let (l, r) = match (as_int_lit(lhs), as_int_lit(rhs)) {
                (Some(l), Some(r)) => (l as i64, r as i64),
                _ => return 0,
            };
            match op {
                BinOp::Add => Some(l.wrapping_add(r)),
                BinOp::Sub => Some(l.wrapping_sub(r)),
                BinOp::Mul => Some(l.wrapping_mul(r)),
                BinOp::Div if r != 0 => Some(l.wrapping_div(r)),
                BinOp::Rem if r != 0 => Some(l.wrapping_rem(r)),
                // Division by zero is left for the semantic diagnostics.
                BinOp::Div | BinOp::Rem => None,
                BinOp::Shl => Some(l.wrapping_shl(r as u32)),
                BinOp::Shr => Some(l.wrapping_shr(r as u32)),
                BinOp::BitAnd => Some(l & r),
                BinOp::BitOr => Some(l | r),
                BinOp::BitXor => Some(l ^ r),
                BinOp::Lt => Some((l < r) as i64),
                BinOp::Le => Some((l <= r) as i64),
                BinOp::Gt => Some((l > r) as i64),
                BinOp::Ge => Some((l >= r) as i64),
                BinOp::Eq => Some((l == r) as i64),
                BinOp::Ne => Some((l != r) as i64),
                BinOp::LogAnd => Some(((l != 0) && (r != 0)) as i64),
                BinOp::LogOr => Some(((l != 0) || (r != 0)) as i64),
            }
        }
        ExprKind::Cond { cond, then, otherwise } => match as_int_lit(cond) {
            Some(c) => {
                let branch = if c != 0 { then } else { otherwise };
                match as_int_lit(branch) {
                    Some(v) => Some(v as i64),
                    None => return 0,
                }
            }
            None => return 0,
        },
        _ => return 0,
    };
    match folded {
        Some(v) => {
            e.kind = int_lit(v as u64);
            1
        }
        None => 0,
    }
}

// =============================================================================
// DEAD CODE ELIMINATION
// =============================================================================

fn dead_code_unit(unit: &mut TranslationUnit) -> u64 {
    let mut n = 0;
    for decl in &mut unit.decls {
        if let DeclKind::Function(func) = &mut decl.kind {
            if let Some(body) = &mut func.body {
                n += dead_code_stmt(body);
            }
        }
    }
    n
}

fn dead_code_stmt(stmt: &mut Stmt) -> u64 {
    let mut n = 0;
    match &mut stmt.kind {
        StmtKind::Compound(items) => {
            for item in items.iter_mut() {
                if let BlockItem::Stmt(inner) = item {
                    n += dead_code_stmt(inner);
                }
            }
            n += truncate_after_jump(items);
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::Switch { body, .. }
        | StmtKind::Default { body }
        | StmtKind::Case { body, .. }
        | StmtKind::Label { body, .. } => {
            n += dead_code_stmt(body);
        }
        StmtKind::If { cond, then, otherwise } => {
            n += dead_code_stmt(then);
            if let Some(otherwise) = otherwise {
                n += dead_code_stmt(otherwise);
            }
            // A literal condition selects one branch statically, unless
            // the dropped branch holds a label someone can jump to.
            if let Some(value) = as_int_lit(cond) {
                let dropped_has_label = if value != 0 {
                    otherwise.as_deref().map(contains_label).unwrap_or(false)
                } else {
                    contains_label(then)
                };
                if !dropped_has_label {
                    let replacement = if value != 0 {
                        std::mem::replace(then.as_mut(), null_stmt(stmt.span)).kind
                    } else {
                        match otherwise {
                            Some(otherwise) => {
                                std::mem::replace(otherwise.as_mut(), null_stmt(stmt.span)).kind
                            }
                            None => StmtKind::Null,
                        }
                    };
                    stmt.kind = replacement;
                    n += 1;
                }
            }
        }
        _ => {}
    }
    n
}

/// Drop statements after an unconditional `return`/`break`/`continue`/
/// `goto`, unless the tail contains a label (it may still be reachable).
fn truncate_after_jump(items: &mut Vec<BlockItem>) -> u64 {
    let jump_at = items.iter().position(|item| {
        matches!(
            item,
            BlockItem::Stmt(Stmt {
                kind: StmtKind::Return(_)
                    | StmtKind::Break
                    | StmtKind::Continue
                    | StmtKind::Goto(_),
                ..
            })
        )
    });
    let Some(at) = jump_at else {
        return 0;
    };
    if at + 1 >= items.len() {
        return 0;
    }
    let tail_reachable = items[at + 1..].iter().any(|item| match item {
        BlockItem::Stmt(stmt) => contains_label(stmt),
        BlockItem::Decl(_) => false,
    });
    if tail_reachable {
        return 0;
    }
    let removed = items.len() - at - 1;
    items.truncate(at + 1);
    removed as u64
}

fn contains_label(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Label { .. } | StmtKind::Case { .. } | StmtKind::Default { .. } => true,
        StmtKind::Compound(items) => items.iter().any(|item| match item {
            BlockItem::Stmt(stmt) => contains_label(stmt),
            BlockItem::Decl(_) => false,
        }),
        StmtKind::If { then, otherwise, .. } => {
            contains_label(then)
                || otherwise.as_deref().map(contains_label).unwrap_or(false)
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::Switch { body, .. } => contains_label(body),
        _ => false,
    }
}

fn null_stmt(span: qcc_util::Span) -> Stmt {
    Stmt {
        kind: StmtKind::Null,
        span,
    }
}

// =============================================================================
// STRENGTH REDUCTION
// =============================================================================

/// `x * 2ⁿ` becomes `x << n`; `x / 2ⁿ` becomes `x >> n` for unsigned
/// `x`. The constant operand's node is rewritten in place to hold the
/// shift amount, so no fresh node ids are needed.
fn strength_reduce_expr(e: &mut Expr, sema: &TypeContext) -> u64 {
    let ExprKind::Binary { op, lhs, rhs } = &mut e.kind else {
        return 0;
    };
    let Some(value) = as_int_lit(rhs) else {
        return 0;
    };
    if value < 2 || !value.is_power_of_two() {
        return 0;
    }
    let Some(lhs_ty) = sema.type_of(lhs.id) else {
        return 0;
    };
    let shift = value.trailing_zeros() as u64;
    match op {
        BinOp::Mul if lhs_ty.is_integer() => {
            *op = BinOp::Shl;
            rhs.kind = int_lit(shift);
            1
        }
        BinOp::Div if lhs_ty.is_unsigned_integer() => {
            *op = BinOp::Shr;
            rhs.kind = int_lit(shift);
            1
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OptLevel, PassManager};
    use qcc_lex::Lexer;
    use qcc_par::Parser;
    use qcc_sem::SemanticAnalyzer;
    use qcc_util::{Arch, Handler, SourceMap, Standard};

    fn parse_and_analyze(text: &str) -> (TranslationUnit, TypeContext) {
        let mut sources = SourceMap::new();
        let file = sources.add_file("opt.c", text);
        let handler = Handler::new();
        let features = Standard::Gnu17.features();
        let unit = {
            let tokens = Lexer::new(file, features, &handler).tokenize();
            Parser::new(tokens, features, &handler).parse()
        };
        let mut sema = SemanticAnalyzer::new(Arch::X86_64.data_model(), features, &handler);
        sema.run(&unit);
        assert!(
            !handler.has_errors(),
            "test input must analyze cleanly: {:?}",
            handler.diagnostics()
        );
        (unit, sema.types)
    }

    fn first_fn_return_expr(unit: &TranslationUnit) -> &Expr {
        for decl in &unit.decls {
            if let DeclKind::Function(f) = &decl.kind {
                if let Some(Stmt { kind: StmtKind::Compound(items), .. }) = &f.body {
                    for item in items {
                        if let BlockItem::Stmt(Stmt {
                            kind: StmtKind::Return(Some(e)),
                            ..
                        }) = item
                        {
                            return e;
                        }
                    }
                }
            }
        }
        panic!("no return expression found");
    }

    #[test]
    fn test_const_fold_literal_arithmetic() {
        let (mut unit, types) = parse_and_analyze("int f(void) { return 2 + 3 * 4; }");
        let mut pm = PassManager::new(OptLevel::L1);
        let total = pm.run(&mut unit, Some(&types));
        assert!(total >= 2);
        assert!(matches!(
            first_fn_return_expr(&unit).kind,
            ExprKind::IntLit { value: 14, .. }
        ));
    }

    #[test]
    fn test_macro_style_fold_to_16() {
        // ((3+1)*(3+1)) folds to 16 at L1 and above.
        let (mut unit, types) = parse_and_analyze("int f(void) { return ((3+1)*(3+1)); }");
        let mut pm = PassManager::new(OptLevel::L1);
        pm.run(&mut unit, Some(&types));
        assert!(matches!(
            first_fn_return_expr(&unit).kind,
            ExprKind::IntLit { value: 16, .. }
        ));
    }

    #[test]
    fn test_identity_ops() {
        let (mut unit, types) = parse_and_analyze("int f(int x) { return x * 1 + 0; }");
        let mut pm = PassManager::new(OptLevel::L1);
        pm.run(&mut unit, Some(&types));
        assert!(matches!(
            first_fn_return_expr(&unit).kind,
            ExprKind::Ident(_)
        ));
    }

    #[test]
    fn test_normalize_constant_to_right_enables_identity() {
        let (mut unit, types) = parse_and_analyze("int f(int x) { return 0 + x; }");
        let mut pm = PassManager::new(OptLevel::L1);
        pm.run(&mut unit, Some(&types));
        assert!(matches!(
            first_fn_return_expr(&unit).kind,
            ExprKind::Ident(_)
        ));
    }

    #[test]
    fn test_double_negation_normalized() {
        let (mut unit, types) = parse_and_analyze("int f(int x) { return !!x; }");
        let mut pm = PassManager::new(OptLevel::L0);
        pm.run(&mut unit, Some(&types));
        match &first_fn_return_expr(&unit).kind {
            ExprKind::Binary { op: BinOp::Ne, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::IntLit { value: 0, .. }));
            }
            other => panic!("expected x != 0, got {:?}", other),
        }
    }

    #[test]
    fn test_strength_reduction_mul() {
        let (mut unit, types) = parse_and_analyze("int f(int x) { return x * 8; }");
        let mut pm = PassManager::new(OptLevel::L2);
        pm.run(&mut unit, Some(&types));
        match &first_fn_return_expr(&unit).kind {
            ExprKind::Binary { op: BinOp::Shl, rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::IntLit { value: 3, .. }));
            }
            other => panic!("expected x << 3, got {:?}", other),
        }
    }

    #[test]
    fn test_strength_reduction_div_unsigned_only() {
        let (mut unit, types) =
            parse_and_analyze("unsigned f(unsigned x) { return x / 4; }");
        let mut pm = PassManager::new(OptLevel::L2);
        pm.run(&mut unit, Some(&types));
        assert!(matches!(
            first_fn_return_expr(&unit).kind,
            ExprKind::Binary { op: BinOp::Shr, .. }
        ));

        // Signed division keeps its division (shifting would round wrong
        // for negatives).
        let (mut unit, types) = parse_and_analyze("int f(int x) { return x / 4; }");
        let mut pm = PassManager::new(OptLevel::L2);
        pm.run(&mut unit, Some(&types));
        assert!(matches!(
            first_fn_return_expr(&unit).kind,
            ExprKind::Binary { op: BinOp::Div, .. }
        ));
    }

    #[test]
    fn test_float_mul_not_strength_reduced() {
        let (mut unit, types) = parse_and_analyze("double f(double x) { return x * 8; }");
        let mut pm = PassManager::new(OptLevel::L3);
        pm.run(&mut unit, Some(&types));
        assert!(matches!(
            first_fn_return_expr(&unit).kind,
            ExprKind::Binary { op: BinOp::Mul, .. }
        ));
    }

    #[test]
    fn test_dead_code_after_return() {
        let (mut unit, types) =
            parse_and_analyze("int f(int x) { return x; x = 1; x = 2; }");
        let mut pm = PassManager::new(OptLevel::L2);
        let total = pm.run(&mut unit, Some(&types));
        assert!(total >= 2);
        let DeclKind::Function(f) = &unit.decls[0].kind else { panic!() };
        let Some(Stmt { kind: StmtKind::Compound(items), .. }) = &f.body else {
            panic!()
        };
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_if_false_branch_dropped() {
        let (mut unit, types) =
            parse_and_analyze("int f(int x) { if (0) x = 1; else x = 2; return x; }");
        let mut pm = PassManager::new(OptLevel::L2);
        pm.run(&mut unit, Some(&types));
        let DeclKind::Function(f) = &unit.decls[0].kind else { panic!() };
        let Some(Stmt { kind: StmtKind::Compound(items), .. }) = &f.body else {
            panic!()
        };
        // The if collapsed into its else branch.
        assert!(matches!(
            items[0],
            BlockItem::Stmt(Stmt { kind: StmtKind::Expr(_), .. })
        ));
    }

    #[test]
    fn test_labelelled_tail_survives() {
        let src = "int f(int x) { goto out; x = 1; out: return x; }";
        let (mut unit, types) = parse_and_analyze(src);
        let mut pm = PassManager::new(OptLevel::L2);
        pm.run(&mut unit, Some(&types));
        let DeclKind::Function(f) = &unit.decls[0].kind else { panic!() };
        let Some(Stmt { kind: StmtKind::Compound(items), .. }) = &f.body else {
            panic!()
        };
        assert_eq!(items.len(), 3, "labelled tail must not be truncated");
    }

    #[test]
    fn test_fixpoint_terminates_and_monotone() {
        let (mut unit, types) = parse_and_analyze(
            "int f(int x) { return ((1+1) * (2+2)) + x * 1; }",
        );
        let mut pm = PassManager::new(OptLevel::L3);
        pm.run(&mut unit, Some(&types));
        assert!(pm.iterations <= 10);
        let per_pass: u64 = pm.pass_counters.iter().sum();
        assert_eq!(per_pass, pm.total_mutations);
    }
}
