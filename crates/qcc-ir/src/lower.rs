//! Lowering from the analyzed AST to SSA IR.
//!
//! One IR function per AST function definition. Parameters and locals
//! become `alloca` slots recorded in a per-function environment keyed by
//! name; expression lowering is split into an rvalue path and an lvalue
//! (address) path; arithmetic dispatches on the resolved operand types
//! into signed, unsigned, or floating opcodes; short-circuit operators
//! and the ternary produce explicit control flow merged by `phi`.
//!
//! `switch` lowers as a compare-and-branch cascade in the switch head:
//! the controlling value is evaluated once, each `case` constant gets a
//! comparison routing to its own block, and the final miss edge goes to
//! `default` or past the statement.

use qcc_par::ast::*;
use qcc_sem::{FuncType, SymbolTable, Type, TypeContext, TypeKind};
use qcc_util::Symbol;
use rustc_hash::FxHashMap;

use crate::builder::FunctionBuilder;
use crate::ir::*;

/// Lower a translation unit. `types` and `symtab` are the semantic
/// analyzer's results; the unit must have analyzed without errors.
pub fn lower_unit(
    unit: &TranslationUnit,
    types: &TypeContext,
    symtab: &SymbolTable,
    module_name: &str,
) -> Module {
    let mut module = Module::new(module_name);
    for decl in &unit.decls {
        match &decl.kind {
            DeclKind::Function(f) => {
                if f.body.is_some() {
                    let func = lower_function(f, types, symtab, &mut module);
                    module.functions.push(func);
                }
            }
            DeclKind::Var(v) => {
                if let Some(global) = lower_global(v, types, symtab, &mut module) {
                    module.globals.push(global);
                }
            }
            _ => {}
        }
    }
    module
}

fn lower_global(
    v: &VarDecl,
    types: &TypeContext,
    symtab: &SymbolTable,
    module: &mut Module,
) -> Option<Global> {
    let binding = symtab
        .lookup_ordinary(v.name)
        .map(|id| symtab.binding(id))?;
    if !binding.defined {
        // `extern` declaration without a definition: nothing to emit.
        return None;
    }
    let linkage = if v.storage == Some(StorageClass::Static) {
        Linkage::Internal
    } else {
        Linkage::Public
    };
    let init = match &v.init {
        None => GlobalInit::Zero,
        Some(Init::Expr(e)) => global_init_value(e, types, module),
        Some(Init::List(_)) => GlobalInit::Zero,
    };
    Some(Global {
        name: v.name,
        ty: binding.ty.clone(),
        linkage,
        init,
    })
}

fn global_init_value(e: &Expr, types: &TypeContext, module: &mut Module) -> GlobalInit {
    if let Some(v) = const_value(e, types) {
        return GlobalInit::Int(v);
    }
    match &e.kind {
        ExprKind::FloatLit { value, .. } => GlobalInit::Float(*value),
        ExprKind::StrLit(bytes) => GlobalInit::Str(module.add_string(bytes.clone())),
        ExprKind::Unary { op: UnOp::Neg, operand } => match &operand.kind {
            ExprKind::FloatLit { value, .. } => GlobalInit::Float(-value),
            _ => GlobalInit::Zero,
        },
        _ => GlobalInit::Zero,
    }
}

/// Literal-and-enum constant evaluation available at lowering time.
fn const_value(e: &Expr, types: &TypeContext) -> Option<i64> {
    if let Some(v) = types.const_idents.get(&e.id) {
        return Some(*v);
    }
    match &e.kind {
        ExprKind::IntLit { value, .. } => Some(*value as i64),
        ExprKind::CharLit(code) => Some(*code as i64),
        ExprKind::Unary { op, operand } => {
            let v = const_value(operand, types)?;
            Some(match op {
                UnOp::Plus => v,
                UnOp::Neg => v.wrapping_neg(),
                UnOp::Not => (v == 0) as i64,
                UnOp::BitNot => !v,
                _ => return None,
            })
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let l = const_value(lhs, types)?;
            let r = const_value(rhs, types)?;
            Some(match op {
                BinOp::Add => l.wrapping_add(r),
                BinOp::Sub => l.wrapping_sub(r),
                BinOp::Mul => l.wrapping_mul(r),
                BinOp::Div if r != 0 => l.wrapping_div(r),
                BinOp::Rem if r != 0 => l.wrapping_rem(r),
                BinOp::Shl => l.wrapping_shl(r as u32),
                BinOp::Shr => l.wrapping_shr(r as u32),
                BinOp::BitAnd => l & r,
                BinOp::BitOr => l | r,
                BinOp::BitXor => l ^ r,
                _ => return None,
            })
        }
        _ => None,
    }
}

fn lower_function(
    f: &FnDecl,
    types: &TypeContext,
    symtab: &SymbolTable,
    module: &mut Module,
) -> Function {
    let func_ty = symtab
        .lookup_ordinary(f.name)
        .map(|id| symtab.binding(id).ty.clone())
        .and_then(|ty| match ty.kind() {
            TypeKind::Function(func) => Some(func.clone()),
            _ => None,
        })
        .unwrap_or_else(|| FuncType {
            ret: types.int_(),
            params: Vec::new(),
            param_names: Vec::new(),
            variadic: false,
            unspecified: false,
        });
    let linkage = if f.storage == Some(StorageClass::Static) {
        Linkage::Internal
    } else {
        Linkage::Public
    };

    let mut lower = FnLower {
        b: FunctionBuilder::new(f.name, func_ty.clone(), linkage),
        types,
        module,
        env: vec![FxHashMap::default()],
        break_targets: Vec::new(),
        continue_targets: Vec::new(),
        switches: Vec::new(),
        labels: FxHashMap::default(),
        ret_ty: func_ty.ret.clone(),
    };

    // Parameters: allocate a slot, spill the incoming value, record the
    // slot under the parameter's name.
    for (i, (ty, name)) in func_ty
        .params
        .iter()
        .zip(func_ty.param_names.iter())
        .enumerate()
    {
        let slot = lower.b.push_value(Opcode::Alloca, ty.clone(), vec![]);
        lower.b.push(
            Opcode::Store,
            types.void(),
            vec![Value::Param(i as u32), slot.clone()],
        );
        if let Some(name) = name {
            lower.define_local(*name, slot, ty.clone());
        }
    }

    if let Some(body) = &f.body {
        if let StmtKind::Compound(items) = &body.kind {
            for item in items {
                lower.block_item(item);
            }
        } else {
            lower.stmt(body);
        }
    }

    // Implicit return on the fall-through path.
    if !lower.b.is_terminated() {
        if lower.ret_ty.is_void() {
            lower.b.ret_void(types.void());
        } else {
            let zero = Value::ConstInt {
                value: 0,
                ty: lower.ret_ty.clone(),
            };
            let ret_ty = lower.ret_ty.clone();
            lower.b.ret(zero, ret_ty);
        }
    }

    lower.b.build()
}

struct LocalSlot {
    ptr: Value,
    ty: Type,
}

struct SwitchCtx {
    cond: Value,
    cond_ty: Type,
    head: BlockId,
    end: BlockId,
    cases: Vec<(i64, BlockId)>,
    default: Option<BlockId>,
}

struct FnLower<'a> {
    b: FunctionBuilder,
    types: &'a TypeContext,
    module: &'a mut Module,
    env: Vec<FxHashMap<Symbol, LocalSlot>>,
    break_targets: Vec<BlockId>,
    continue_targets: Vec<BlockId>,
    switches: Vec<SwitchCtx>,
    labels: FxHashMap<Symbol, BlockId>,
    ret_ty: Type,
}

impl<'a> FnLower<'a> {
    /// Resolved type of an expression node; `int` is the recovery type.
    fn ety(&self, e: &Expr) -> Type {
        self.types
            .type_of(e.id)
            .cloned()
            .unwrap_or_else(|| self.types.int_())
    }

    fn void(&self) -> Type {
        self.types.void()
    }

    fn int_const(&self, value: i64) -> Value {
        Value::ConstInt {
            value,
            ty: self.types.int_(),
        }
    }

    fn define_local(&mut self, name: Symbol, ptr: Value, ty: Type) {
        self.env
            .last_mut()
            .expect("environment never empty")
            .insert(name, LocalSlot { ptr, ty });
    }

    fn lookup_local(&self, name: Symbol) -> Option<&LocalSlot> {
        self.env.iter().rev().find_map(|scope| scope.get(&name))
    }

    fn label_block(&mut self, name: Symbol) -> BlockId {
        if let Some(&blk) = self.labels.get(&name) {
            return blk;
        }
        let blk = self.b.new_block(&format!("label.{}", name));
        self.labels.insert(name, blk);
        blk
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    fn block_item(&mut self, item: &BlockItem) {
        match item {
            BlockItem::Decl(decl) => self.local_decl(decl),
            BlockItem::Stmt(stmt) => self.stmt(stmt),
        }
    }

    fn local_decl(&mut self, decl: &Decl) {
        let DeclKind::Var(v) = &decl.kind else {
            return;
        };
        if v.storage == Some(StorageClass::Extern) {
            // Block-scope extern refers to a linkage object; references
            // resolve through the global path.
            return;
        }
        let ty = self
            .types
            .decl_types
            .get(&v.id)
            .cloned()
            .unwrap_or_else(|| self.types.int_());
        let slot = self.b.push_value(Opcode::Alloca, ty.clone(), vec![]);
        self.define_local(v.name, slot.clone(), ty.clone());
        if let Some(init) = &v.init {
            self.store_init(&slot, &ty, init);
        }
    }

    fn store_init(&mut self, ptr: &Value, ty: &Type, init: &Init) {
        match init {
            Init::Expr(e) => {
                let value = self.rvalue(e);
                let value = self.coerce(value, &self.ety(e), ty);
                self.b
                    .push(Opcode::Store, self.void(), vec![value, ptr.clone()]);
            }
            Init::List(items) => match ty.kind() {
                TypeKind::Array { elem, .. } => {
                    let mut index: i64 = 0;
                    for item in items {
                        if let Some(Designator::Index(idx)) = &item.designator {
                            if let Some(v) = const_value(idx, self.types) {
                                index = v;
                            }
                        }
                        let at = self.b.push_value(
                            Opcode::Gep,
                            elem.clone(),
                            vec![ptr.clone(), self.int_const(index)],
                        );
                        self.store_init(&at, &elem.clone(), &item.init);
                        index += 1;
                    }
                }
                TypeKind::Record(rec) => {
                    let fields: Vec<(Option<Symbol>, Type, u64)> = rec
                        .0
                        .body
                        .borrow()
                        .as_ref()
                        .map(|body| {
                            body.fields
                                .iter()
                                .map(|f| (f.name, f.ty.clone(), f.offset))
                                .collect()
                        })
                        .unwrap_or_default();
                    let mut position = 0usize;
                    for item in items {
                        if let Some(Designator::Field(name)) = &item.designator {
                            if let Some(at) =
                                fields.iter().position(|(n, _, _)| *n == Some(*name))
                            {
                                position = at;
                            }
                        }
                        let Some((_, field_ty, offset)) = fields.get(position) else {
                            break;
                        };
                        let long = self.types.long_();
                        let at = self.b.push_value(
                            Opcode::FieldPtr,
                            field_ty.clone(),
                            vec![
                                ptr.clone(),
                                Value::ConstInt {
                                    value: *offset as i64,
                                    ty: long,
                                },
                            ],
                        );
                        self.store_init(&at, &field_ty.clone(), &item.init);
                        position += 1;
                    }
                }
                _ => {
                    if let Some(first) = items.first() {
                        self.store_init(ptr, ty, &first.init);
                    }
                }
            },
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Compound(items) => {
                self.env.push(FxHashMap::default());
                for item in items {
                    self.block_item(item);
                }
                self.env.pop();
            }
            StmtKind::Expr(e) => {
                let _ = self.rvalue(e);
            }
            StmtKind::Null => {}
            StmtKind::If { cond, then, otherwise } => {
                let c = self.rvalue(cond);
                let then_b = self.b.new_block("if.then");
                let else_b = otherwise.as_ref().map(|_| self.b.new_block("if.else"));
                let end_b = self.b.new_block("if.end");
                let false_target = else_b.unwrap_or(end_b);
                self.b.cond_br(c, then_b, false_target, self.types.void());

                self.b.switch_to(then_b);
                self.stmt(then);
                if !self.b.is_terminated() {
                    self.b.br(end_b, self.types.void());
                }
                if let (Some(else_b), Some(otherwise)) = (else_b, otherwise) {
                    self.b.switch_to(else_b);
                    self.stmt(otherwise);
                    if !self.b.is_terminated() {
                        self.b.br(end_b, self.types.void());
                    }
                }
                self.b.switch_to(end_b);
            }
            StmtKind::While { cond, body } => {
                let cond_b = self.b.new_block("while.cond");
                let body_b = self.b.new_block("while.body");
                let end_b = self.b.new_block("while.end");
                self.b.br(cond_b, self.types.void());

                self.b.switch_to(cond_b);
                let c = self.rvalue(cond);
                self.b.cond_br(c, body_b, end_b, self.types.void());

                self.b.switch_to(body_b);
                self.continue_targets.push(cond_b);
                self.break_targets.push(end_b);
                self.stmt(body);
                self.continue_targets.pop();
                self.break_targets.pop();
                if !self.b.is_terminated() {
                    self.b.br(cond_b, self.types.void());
                }
                self.b.switch_to(end_b);
            }
            StmtKind::DoWhile { body, cond } => {
                let body_b = self.b.new_block("do.body");
                let cond_b = self.b.new_block("do.cond");
                let end_b = self.b.new_block("do.end");
                self.b.br(body_b, self.types.void());

                self.b.switch_to(body_b);
                self.continue_targets.push(cond_b);
                self.break_targets.push(end_b);
                self.stmt(body);
                self.continue_targets.pop();
                self.break_targets.pop();
                if !self.b.is_terminated() {
                    self.b.br(cond_b, self.types.void());
                }

                self.b.switch_to(cond_b);
                let c = self.rvalue(cond);
                self.b.cond_br(c, body_b, end_b, self.types.void());
                self.b.switch_to(end_b);
            }
            StmtKind::For { init, cond, step, body } => {
                self.env.push(FxHashMap::default());
                match init {
                    Some(ForInit::Decl(decl)) => self.local_decl(decl),
                    Some(ForInit::Expr(e)) => {
                        let _ = self.rvalue(e);
                    }
                    None => {}
                }
                let cond_b = self.b.new_block("for.cond");
                let body_b = self.b.new_block("for.body");
                let incr_b = self.b.new_block("for.incr");
                let end_b = self.b.new_block("for.end");
                self.b.br(cond_b, self.types.void());

                self.b.switch_to(cond_b);
                match cond {
                    Some(cond) => {
                        let c = self.rvalue(cond);
                        self.b.cond_br(c, body_b, end_b, self.types.void());
                    }
                    None => self.b.br(body_b, self.types.void()),
                }

                self.b.switch_to(body_b);
                self.continue_targets.push(incr_b);
                self.break_targets.push(end_b);
                self.stmt(body);
                self.continue_targets.pop();
                self.break_targets.pop();
                if !self.b.is_terminated() {
                    self.b.br(incr_b, self.types.void());
                }

                self.b.switch_to(incr_b);
                if let Some(step) = step {
                    let _ = self.rvalue(step);
                }
                self.b.br(cond_b, self.types.void());

                self.b.switch_to(end_b);
                self.env.pop();
            }
            StmtKind::Switch { cond, body } => self.lower_switch(cond, body),
            StmtKind::Case { value, body } => {
                let blk = self.b.new_block("case");
                if !self.b.is_terminated() {
                    // Fall through from the previous case.
                    self.b.br(blk, self.types.void());
                }
                self.b.switch_to(blk);
                let v = const_value(value, self.types).unwrap_or(0);
                if let Some(ctx) = self.switches.last_mut() {
                    ctx.cases.push((v, blk));
                }
                self.stmt(body);
            }
            StmtKind::Default { body } => {
                let blk = self.b.new_block("default");
                if !self.b.is_terminated() {
                    self.b.br(blk, self.types.void());
                }
                self.b.switch_to(blk);
                if let Some(ctx) = self.switches.last_mut() {
                    ctx.default = Some(blk);
                }
                self.stmt(body);
            }
            StmtKind::Break => {
                if let Some(&target) = self.break_targets.last() {
                    self.b.br(target, self.types.void());
                }
            }
            StmtKind::Continue => {
                if let Some(&target) = self.continue_targets.last() {
                    self.b.br(target, self.types.void());
                }
            }
            StmtKind::Return(value) => match value {
                Some(e) => {
                    let v = self.rvalue(e);
                    let v = self.coerce(v, &self.ety(e), &self.ret_ty.clone());
                    let ret_ty = self.ret_ty.clone();
                    self.b.ret(v, ret_ty);
                }
                None => self.b.ret_void(self.types.void()),
            },
            StmtKind::Goto(name) => {
                let blk = self.label_block(*name);
                self.b.br(blk, self.types.void());
            }
            StmtKind::Label { name, body } => {
                let blk = self.label_block(*name);
                if !self.b.is_terminated() {
                    self.b.br(blk, self.types.void());
                }
                self.b.switch_to(blk);
                self.stmt(body);
            }
        }
    }

    /// Evaluate the controlling value once in the head block, lower the
    /// body (cases register themselves), then emit the compare cascade
    /// back in the head.
    fn lower_switch(&mut self, cond: &Expr, body: &Stmt) {
        let cond_ty = self.ety(cond);
        let c = self.rvalue(cond);
        let head = self.b.current_block();
        let end = self.b.new_block("switch.end");

        self.switches.push(SwitchCtx {
            cond: c,
            cond_ty,
            head,
            end,
            cases: Vec::new(),
            default: None,
        });

        // Body statements land in their own blocks; anything before the
        // first case label is unreachable, matching C.
        let body_b = self.b.new_block("switch.body");
        self.b.switch_to(body_b);
        self.break_targets.push(end);
        self.stmt(body);
        self.break_targets.pop();
        if !self.b.is_terminated() {
            self.b.br(end, self.types.void());
        }

        let ctx = self.switches.pop().expect("pushed above");

        // The cascade: one equality test per case, in source order.
        self.b.switch_to(ctx.head);
        for (value, target) in &ctx.cases {
            let probe = Value::ConstInt {
                value: *value,
                ty: ctx.cond_ty.clone(),
            };
            let cmp = self.b.push_value(
                Opcode::ICmp(ICmp::Eq),
                self.types.int_(),
                vec![ctx.cond.clone(), probe],
            );
            let next = self.b.new_block("switch.next");
            self.b.cond_br(cmp, *target, next, self.types.void());
            self.b.switch_to(next);
        }
        let miss = ctx.default.unwrap_or(ctx.end);
        self.b.br(miss, self.types.void());
        self.b.switch_to(ctx.end);
    }

    // =========================================================================
    // EXPRESSIONS: RVALUES
    // =========================================================================

    fn rvalue(&mut self, e: &Expr) -> Value {
        let ty = self.ety(e);
        match &e.kind {
            ExprKind::IntLit { value, .. } => Value::ConstInt {
                value: *value as i64,
                ty,
            },
            ExprKind::FloatLit { value, .. } => Value::ConstFloat { value: *value, ty },
            ExprKind::CharLit(code) => Value::ConstInt {
                value: *code as i64,
                ty,
            },
            ExprKind::StrLit(bytes) => {
                Value::ConstStr(self.module.add_string(bytes.clone()))
            }
            ExprKind::Ident(name) => {
                if let Some(&value) = self.types.const_idents.get(&e.id) {
                    return self.int_const(value);
                }
                let local = self
                    .lookup_local(*name)
                    .map(|slot| (slot.ptr.clone(), slot.ty.clone()));
                match local {
                    Some((ptr, slot_ty)) => self.load_place(ptr, &slot_ty),
                    None => {
                        if ty.is_function() {
                            Value::Func(*name)
                        } else if ty.is_array() {
                            Value::Global(*name)
                        } else {
                            self.b
                                .push_value(Opcode::Load, ty, vec![Value::Global(*name)])
                        }
                    }
                }
            }
            ExprKind::Unary { op, operand } => self.unary(*op, operand, &ty),
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, &ty),
            ExprKind::Assign { op, lhs, rhs } => self.assign(*op, lhs, rhs),
            ExprKind::Cond { cond, then, otherwise } => {
                self.ternary(cond, then, otherwise, &ty)
            }
            ExprKind::Call { callee, args } => {
                let callee_v = self.rvalue(callee);
                let mut operands = vec![callee_v];
                let param_tys: Vec<Option<Type>> = {
                    let callee_ty = self.ety(callee);
                    let func = callee_ty.as_function().cloned();
                    (0..args.len())
                        .map(|i| func.as_ref().and_then(|f| f.params.get(i).cloned()))
                        .collect()
                };
                for (arg, param_ty) in args.iter().zip(param_tys) {
                    let v = self.rvalue(arg);
                    let v = match param_ty {
                        Some(param_ty) => self.coerce(v, &self.ety(arg), &param_ty),
                        None => v,
                    };
                    operands.push(v);
                }
                self.b.push_value(Opcode::Call, ty, operands)
            }
            ExprKind::Index { base, index } => {
                let (ptr, elem_ty) = self.element_ptr(base, index, &ty);
                self.load_place_from(ptr, &elem_ty)
            }
            ExprKind::Member { base, field, arrow } => {
                let ptr = self.member_ptr(base, *field, *arrow, &ty);
                self.load_place_from(ptr, &ty)
            }
            ExprKind::Cast { operand, .. } => {
                let v = self.rvalue(operand);
                self.coerce(v, &self.ety(operand), &ty)
            }
            ExprKind::SizeofExpr(_) | ExprKind::SizeofType(_) => {
                let value = self.types.const_idents.get(&e.id).copied().unwrap_or(0);
                Value::ConstInt { value, ty }
            }
            ExprKind::PostIncDec { inc, operand } => {
                let ptr = self.lvalue(operand);
                let operand_ty = self.ety(operand);
                let old = self
                    .b
                    .push_value(Opcode::Load, operand_ty.clone(), vec![ptr.clone()]);
                let stepped = self.step_by_one(old.clone(), &operand_ty, *inc);
                self.b
                    .push(Opcode::Store, self.void(), vec![stepped, ptr]);
                old
            }
            ExprKind::Comma { lhs, rhs } => {
                let _ = self.rvalue(lhs);
                self.rvalue(rhs)
            }
            ExprKind::StmtExpr(items) => {
                self.env.push(FxHashMap::default());
                let mut last = self.int_const(0);
                for item in items {
                    match item {
                        BlockItem::Stmt(Stmt { kind: StmtKind::Expr(inner), .. }) => {
                            last = self.rvalue(inner);
                        }
                        other => {
                            self.block_item(other);
                            last = self.int_const(0);
                        }
                    }
                }
                self.env.pop();
                last
            }
            ExprKind::Generic { assocs, .. } => {
                // The controlling expression is not evaluated.
                let pick = self
                    .types
                    .generic_choices
                    .get(&e.id)
                    .copied()
                    .unwrap_or(0);
                match assocs.get(pick) {
                    Some(assoc) => self.rvalue(&assoc.expr),
                    None => self.int_const(0),
                }
            }
        }
    }

    /// Load through a local slot, honoring array/function decay.
    fn load_place(&mut self, ptr: Value, ty: &Type) -> Value {
        if ty.is_array() || ty.is_function() {
            return ptr;
        }
        self.b.push_value(Opcode::Load, ty.clone(), vec![ptr])
    }

    /// Load through a computed address, honoring array decay.
    fn load_place_from(&mut self, ptr: Value, ty: &Type) -> Value {
        if ty.is_array() || ty.is_function() {
            return ptr;
        }
        self.b.push_value(Opcode::Load, ty.clone(), vec![ptr])
    }

    fn unary(&mut self, op: UnOp, operand: &Expr, result_ty: &Type) -> Value {
        match op {
            UnOp::Deref => {
                let ptr = self.rvalue(operand);
                self.load_place_from(ptr, result_ty)
            }
            UnOp::AddrOf => self.lvalue(operand),
            UnOp::Plus => self.rvalue(operand),
            UnOp::Neg => {
                let v = self.rvalue(operand);
                if result_ty.is_float() {
                    let zero = Value::ConstFloat {
                        value: 0.0,
                        ty: result_ty.clone(),
                    };
                    self.b
                        .push_value(Opcode::FSub, result_ty.clone(), vec![zero, v])
                } else {
                    let zero = Value::ConstInt {
                        value: 0,
                        ty: result_ty.clone(),
                    };
                    self.b
                        .push_value(Opcode::Sub, result_ty.clone(), vec![zero, v])
                }
            }
            UnOp::Not => {
                let v = self.rvalue(operand);
                let operand_ty = self.ety(operand);
                let zero = if operand_ty.is_float() {
                    Value::ConstFloat {
                        value: 0.0,
                        ty: operand_ty,
                    }
                } else {
                    Value::ConstInt {
                        value: 0,
                        ty: operand_ty,
                    }
                };
                let op = if self.ety(operand).is_float() {
                    Opcode::FCmp(FCmp::Eq)
                } else {
                    Opcode::ICmp(ICmp::Eq)
                };
                self.b.push_value(op, self.types.int_(), vec![v, zero])
            }
            UnOp::BitNot => {
                let v = self.rvalue(operand);
                let all_ones = Value::ConstInt {
                    value: -1,
                    ty: result_ty.clone(),
                };
                self.b
                    .push_value(Opcode::Xor, result_ty.clone(), vec![v, all_ones])
            }
            UnOp::PreInc | UnOp::PreDec => {
                let ptr = self.lvalue(operand);
                let operand_ty = self.ety(operand);
                let old = self
                    .b
                    .push_value(Opcode::Load, operand_ty.clone(), vec![ptr.clone()]);
                let stepped = self.step_by_one(old, &operand_ty, op == UnOp::PreInc);
                self.b
                    .push(Opcode::Store, self.void(), vec![stepped.clone(), ptr]);
                stepped
            }
        }
    }

    /// `x + 1` / `x - 1` for increment operators, with pointer stepping
    /// via `gep`.
    fn step_by_one(&mut self, value: Value, ty: &Type, inc: bool) -> Value {
        if let Some(pointee) = ty.pointee() {
            let delta = self.int_const(if inc { 1 } else { -1 });
            return self
                .b
                .push_value(Opcode::Gep, pointee, vec![value, delta]);
        }
        if ty.is_float() {
            let one = Value::ConstFloat {
                value: 1.0,
                ty: ty.clone(),
            };
            let op = if inc { Opcode::FAdd } else { Opcode::FSub };
            return self.b.push_value(op, ty.clone(), vec![value, one]);
        }
        let one = Value::ConstInt {
            value: 1,
            ty: ty.clone(),
        };
        let op = if inc { Opcode::Add } else { Opcode::Sub };
        self.b.push_value(op, ty.clone(), vec![value, one])
    }

    fn binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, result_ty: &Type) -> Value {
        if op.is_logical() {
            return self.short_circuit(op, lhs, rhs);
        }

        let lt = self.types.decay(&self.ety(lhs));
        let rt = self.types.decay(&self.ety(rhs));

        // Pointer arithmetic routes through gep.
        if op == BinOp::Add || op == BinOp::Sub {
            if let Some(pointee) = lt.pointee() {
                if rt.is_integer() {
                    let base = self.rvalue(lhs);
                    let mut index = self.rvalue(rhs);
                    if op == BinOp::Sub {
                        let zero = self.int_const(0);
                        index = self.b.push_value(
                            Opcode::Sub,
                            self.types.int_(),
                            vec![zero, index],
                        );
                    }
                    return self.b.push_value(Opcode::Gep, pointee, vec![base, index]);
                }
                if op == BinOp::Sub && rt.is_pointer() {
                    // Pointer difference: byte distance divided by the
                    // element size.
                    let a = self.rvalue(lhs);
                    let b_ = self.rvalue(rhs);
                    let diff = self.b.push_value(
                        Opcode::Sub,
                        result_ty.clone(),
                        vec![a, b_],
                    );
                    let elem = self.types.size_of(&pointee).unwrap_or(1) as i64;
                    let size = Value::ConstInt {
                        value: elem,
                        ty: result_ty.clone(),
                    };
                    return self.b.push_value(
                        Opcode::SDiv,
                        result_ty.clone(),
                        vec![diff, size],
                    );
                }
            }
            if op == BinOp::Add && rt.pointee().is_some() && lt.is_integer() {
                let pointee = rt.pointee().expect("checked");
                let index = self.rvalue(lhs);
                let base = self.rvalue(rhs);
                return self.b.push_value(Opcode::Gep, pointee, vec![base, index]);
            }
        }

        if op.is_comparison() {
            return self.comparison(op, lhs, rhs, &lt, &rt);
        }

        // Arithmetic: coerce both sides to the result (usual-conversion)
        // type, then dispatch on it.
        let lv = self.rvalue(lhs);
        let lv = self.coerce(lv, &lt, result_ty);
        let rv = self.rvalue(rhs);
        let rv = self.coerce(rv, &rt, result_ty);
        let opcode = arith_opcode(op, result_ty);
        self.b.push_value(opcode, result_ty.clone(), vec![lv, rv])
    }

    fn comparison(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, lt: &Type, rt: &Type) -> Value {
        let (common, float) = if lt.is_arithmetic() && rt.is_arithmetic() {
            let common = self.types.usual_arithmetic(lt, rt);
            let float = common.is_float();
            (common, float)
        } else {
            // Pointer comparisons are unsigned address comparisons.
            (lt.clone(), false)
        };
        let lv = self.rvalue(lhs);
        let rv = self.rvalue(rhs);
        let (lv, rv) = if common.is_arithmetic() {
            (
                self.coerce(lv, lt, &common),
                self.coerce(rv, rt, &common),
            )
        } else {
            (lv, rv)
        };
        let unsigned = common.is_unsigned_integer() || common.is_pointer();
        let opcode = if float {
            Opcode::FCmp(match op {
                BinOp::Eq => FCmp::Eq,
                BinOp::Ne => FCmp::Ne,
                BinOp::Lt => FCmp::Lt,
                BinOp::Le => FCmp::Le,
                BinOp::Gt => FCmp::Gt,
                _ => FCmp::Ge,
            })
        } else {
            Opcode::ICmp(match (op, unsigned) {
                (BinOp::Eq, _) => ICmp::Eq,
                (BinOp::Ne, _) => ICmp::Ne,
                (BinOp::Lt, false) => ICmp::Slt,
                (BinOp::Le, false) => ICmp::Sle,
                (BinOp::Gt, false) => ICmp::Sgt,
                (BinOp::Ge, false) => ICmp::Sge,
                (BinOp::Lt, true) => ICmp::Ult,
                (BinOp::Le, true) => ICmp::Ule,
                (BinOp::Gt, true) => ICmp::Ugt,
                (BinOp::Ge, true) => ICmp::Uge,
                _ => unreachable!("comparison() is only called for comparison operators"),
            })
        };
        self.b
            .push_value(opcode, self.types.int_(), vec![lv, rv])
    }

    /// `&&`/`||`: evaluate the left side, branch, evaluate the right in
    /// its own block, and merge a 0/1 with a phi selecting by edge.
    fn short_circuit(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Value {
        let int = self.types.int_();
        let lv = self.rvalue(lhs);
        let lcond = self.truthy(lv, &self.ety(lhs));
        let lhs_block = self.b.current_block();

        let rhs_b = self.b.new_block("sc.rhs");
        let end_b = self.b.new_block("sc.end");

        let short_value = match op {
            BinOp::LogAnd => {
                self.b.cond_br(lcond, rhs_b, end_b, self.types.void());
                0
            }
            _ => {
                self.b.cond_br(lcond, end_b, rhs_b, self.types.void());
                1
            }
        };

        self.b.switch_to(rhs_b);
        let rv = self.rvalue(rhs);
        let rcond = self.truthy(rv, &self.ety(rhs));
        let rhs_block = self.b.current_block();
        self.b.br(end_b, self.types.void());

        self.b.switch_to(end_b);
        self.b.phi(
            int.clone(),
            vec![
                (
                    Value::ConstInt {
                        value: short_value,
                        ty: int.clone(),
                    },
                    lhs_block,
                ),
                (rcond, rhs_block),
            ],
        )
    }

    /// Boolean test: `v != 0` as an int-valued comparison.
    fn truthy(&mut self, v: Value, ty: &Type) -> Value {
        if ty.is_float() {
            let zero = Value::ConstFloat {
                value: 0.0,
                ty: ty.clone(),
            };
            self.b
                .push_value(Opcode::FCmp(FCmp::Ne), self.types.int_(), vec![v, zero])
        } else {
            let zero = Value::ConstInt {
                value: 0,
                ty: ty.clone(),
            };
            self.b
                .push_value(Opcode::ICmp(ICmp::Ne), self.types.int_(), vec![v, zero])
        }
    }

    fn ternary(&mut self, cond: &Expr, then: &Expr, otherwise: &Expr, ty: &Type) -> Value {
        let c = self.rvalue(cond);
        let then_b = self.b.new_block("cond.then");
        let else_b = self.b.new_block("cond.else");
        let end_b = self.b.new_block("cond.end");
        self.b.cond_br(c, then_b, else_b, self.types.void());

        self.b.switch_to(then_b);
        let tv = self.rvalue(then);
        let tv = self.coerce(tv, &self.ety(then), ty);
        let then_end = self.b.current_block();
        self.b.br(end_b, self.types.void());

        self.b.switch_to(else_b);
        let ev = self.rvalue(otherwise);
        let ev = self.coerce(ev, &self.ety(otherwise), ty);
        let else_end = self.b.current_block();
        self.b.br(end_b, self.types.void());

        self.b.switch_to(end_b);
        if ty.is_void() {
            return self.int_const(0);
        }
        self.b
            .phi(ty.clone(), vec![(tv, then_end), (ev, else_end)])
    }

    fn assign(&mut self, op: Option<BinOp>, lhs: &Expr, rhs: &Expr) -> Value {
        let lhs_ty = self.ety(lhs);
        let ptr = self.lvalue(lhs);
        match op {
            None => {
                let v = self.rvalue(rhs);
                let v = self.coerce(v, &self.ety(rhs), &lhs_ty);
                self.b
                    .push(Opcode::Store, self.void(), vec![v.clone(), ptr]);
                v
            }
            Some(op) => {
                // Compound assignment shares the lvalue between the load
                // and the store.
                let old = self
                    .b
                    .push_value(Opcode::Load, lhs_ty.clone(), vec![ptr.clone()]);
                let result = if let Some(pointee) = lhs_ty.pointee() {
                    let mut index = self.rvalue(rhs);
                    if op == BinOp::Sub {
                        let zero = self.int_const(0);
                        index = self.b.push_value(
                            Opcode::Sub,
                            self.types.int_(),
                            vec![zero, index],
                        );
                    }
                    self.b.push_value(Opcode::Gep, pointee, vec![old, index])
                } else {
                    let rv = self.rvalue(rhs);
                    let rv = self.coerce(rv, &self.ety(rhs), &lhs_ty);
                    let opcode = arith_opcode(op, &lhs_ty);
                    self.b
                        .push_value(opcode, lhs_ty.clone(), vec![old, rv])
                };
                self.b
                    .push(Opcode::Store, self.void(), vec![result.clone(), ptr]);
                result
            }
        }
    }

    // =========================================================================
    // EXPRESSIONS: LVALUES
    // =========================================================================

    /// Lower to the address of the designated object.
    fn lvalue(&mut self, e: &Expr) -> Value {
        match &e.kind {
            ExprKind::Ident(name) => match self.lookup_local(*name) {
                Some(slot) => slot.ptr.clone(),
                None => {
                    let ty = self.ety(e);
                    if ty.is_function() {
                        Value::Func(*name)
                    } else {
                        Value::Global(*name)
                    }
                }
            },
            ExprKind::Unary { op: UnOp::Deref, operand } => self.rvalue(operand),
            ExprKind::Index { base, index } => {
                let elem_ty = self.ety(e);
                let (ptr, _) = self.element_ptr(base, index, &elem_ty);
                ptr
            }
            ExprKind::Member { base, field, arrow } => {
                let field_ty = self.ety(e);
                self.member_ptr(base, *field, *arrow, &field_ty)
            }
            ExprKind::StrLit(bytes) => Value::ConstStr(self.module.add_string(bytes.clone())),
            _ => {
                // Not an lvalue (already diagnosed): spill to a fresh
                // slot so lowering can continue.
                let ty = self.ety(e);
                let v = self.rvalue(e);
                let slot = self.b.push_value(Opcode::Alloca, ty, vec![]);
                self.b
                    .push(Opcode::Store, self.void(), vec![v, slot.clone()]);
                slot
            }
        }
    }

    /// Address of `base[index]` (in either spelling order).
    fn element_ptr(&mut self, base: &Expr, index: &Expr, elem_ty: &Type) -> (Value, Type) {
        let base_ty = self.types.decay(&self.ety(base));
        let (ptr_e, idx_e) = if base_ty.is_pointer() {
            (base, index)
        } else {
            (index, base)
        };
        let ptr = self.rvalue(ptr_e);
        let idx = self.rvalue(idx_e);
        let at = self
            .b
            .push_value(Opcode::Gep, elem_ty.clone(), vec![ptr, idx]);
        (at, elem_ty.clone())
    }

    /// Address of `base.field` / `base->field`.
    fn member_ptr(&mut self, base: &Expr, field: Symbol, arrow: bool, field_ty: &Type) -> Value {
        let base_ptr = if arrow {
            self.rvalue(base)
        } else {
            self.lvalue(base)
        };
        let base_ty = self.ety(base);
        let rec_ty = if arrow {
            self.types.decay(&base_ty).pointee().unwrap_or(base_ty)
        } else {
            base_ty
        };
        let offset = rec_ty
            .as_record()
            .and_then(|rec| self.types.find_field(rec, field))
            .map(|(_, offset)| offset)
            .unwrap_or(0);
        let long = self.types.long_();
        self.b.push_value(
            Opcode::FieldPtr,
            field_ty.clone(),
            vec![
                base_ptr,
                Value::ConstInt {
                    value: offset as i64,
                    ty: long,
                },
            ],
        )
    }

    // =========================================================================
    // COERCIONS
    // =========================================================================

    /// Emit a cast when `from` and `to` differ in representation.
    fn coerce(&mut self, v: Value, from: &Type, to: &Type) -> Value {
        if from.compatible(to) || to.is_void() {
            return v;
        }
        let kind = match (
            from.is_float(),
            to.is_float(),
            from.is_pointer() || from.is_array(),
            to.is_pointer(),
        ) {
            (true, true, _, _) => CastKind::FloatToFloat,
            (false, true, _, _) => CastKind::IntToFloat,
            (true, false, _, _) => CastKind::FloatToInt,
            (_, _, true, _) | (_, _, _, true) => CastKind::Bitcast,
            _ => CastKind::IntToInt,
        };
        // Same-size integer changes are representation-free.
        if kind == CastKind::IntToInt {
            let from_size = self.types.size_of(from).unwrap_or(4);
            let to_size = self.types.size_of(to).unwrap_or(4);
            if from_size == to_size {
                return v;
            }
        }
        if kind == CastKind::Bitcast && (from.is_pointer() || from.is_array()) && to.is_pointer()
        {
            return v;
        }
        self.b.push_value(Opcode::Cast(kind), to.clone(), vec![v])
    }
}

/// Opcode for an arithmetic/bitwise operator over the given result
/// type: floating types route to `f`-prefixed instructions, unsigned
/// integers to the unsigned division/remainder/shift variants.
fn arith_opcode(op: BinOp, ty: &Type) -> Opcode {
    let float = ty.is_float();
    let unsigned = ty.is_unsigned_integer();
    match op {
        BinOp::Add => {
            if float {
                Opcode::FAdd
            } else {
                Opcode::Add
            }
        }
        BinOp::Sub => {
            if float {
                Opcode::FSub
            } else {
                Opcode::Sub
            }
        }
        BinOp::Mul => {
            if float {
                Opcode::FMul
            } else {
                Opcode::Mul
            }
        }
        BinOp::Div => {
            if float {
                Opcode::FDiv
            } else if unsigned {
                Opcode::UDiv
            } else {
                Opcode::SDiv
            }
        }
        BinOp::Rem => {
            if unsigned {
                Opcode::URem
            } else {
                Opcode::SRem
            }
        }
        BinOp::BitAnd => Opcode::And,
        BinOp::BitOr => Opcode::Or,
        BinOp::BitXor => Opcode::Xor,
        BinOp::Shl => Opcode::Shl,
        BinOp::Shr => {
            if unsigned {
                Opcode::LShr
            } else {
                Opcode::AShr
            }
        }
        // Comparisons and logicals never reach here.
        _ => Opcode::Add,
    }
}
