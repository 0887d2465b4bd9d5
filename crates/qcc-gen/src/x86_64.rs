//! x86-64 assembly emitter (AT&T syntax).
//!
//! A deliberately naive template: every SSA value gets an 8-byte frame
//! slot, instructions load their operands into scratch registers, and
//! phi merges are resolved by writing the incoming value into the phi's
//! slot on each predecessor edge before the branch. Floating arithmetic
//! round-trips through the SSE registers; everything else lives in
//! `%rax`/`%rcx`/`%rdx`.
//!
//! Calls follow a simplified internal convention: the first six
//! arguments in the System V integer registers (bit patterns for
//! floats), results in `%rax`.

use qcc_ir::{
    BlockId, CastKind, FCmp, Function, Global, GlobalInit, ICmp, Inst, InstId, Linkage, Module,
    Opcode, Value,
};
use qcc_sem::{Type, TypeContext};
use qcc_util::{Arch, Idx};
use rustc_hash::FxHashMap;

use crate::{Backend, GenError};

const ARG_REGS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// The x86-64 backend.
pub struct X86_64Backend;

impl Backend for X86_64Backend {
    fn name(&self) -> &'static str {
        "x86_64"
    }

    fn arch(&self) -> Arch {
        Arch::X86_64
    }

    fn emit(&self, module: &Module) -> Result<Vec<u8>, GenError> {
        let types = TypeContext::new(self.data_model());
        let mut out = String::new();

        out.push_str(&format!("\t.file\t\"{}\"\n", module.name));

        if !module.strings.is_empty() {
            out.push_str("\t.section\t.rodata\n");
            for (i, bytes) in module.strings.iter().enumerate() {
                out.push_str(&format!(".Lstr{}:\n", i));
                let list: Vec<String> = bytes
                    .iter()
                    .chain(std::iter::once(&0u8))
                    .map(|b| b.to_string())
                    .collect();
                out.push_str(&format!("\t.byte\t{}\n", list.join(", ")));
            }
        }

        for global in &module.globals {
            emit_global(&mut out, global, &types);
        }

        out.push_str("\t.text\n");
        for func in &module.functions {
            let mut emitter = FnEmitter::new(func, &types, &mut out);
            emitter.run()?;
        }
        Ok(out.into_bytes())
    }
}

fn emit_global(out: &mut String, global: &Global, types: &TypeContext) {
    let name = global.name.as_str();
    let size = types.size_of(&global.ty).unwrap_or(8).max(1);
    let align = types.align_of(&global.ty).max(1);
    out.push_str("\t.data\n");
    if global.linkage == Linkage::Public {
        out.push_str(&format!("\t.globl\t{}\n", name));
    }
    out.push_str(&format!("\t.align\t{}\n", align));
    out.push_str(&format!("{}:\n", name));
    match &global.init {
        GlobalInit::Zero => out.push_str(&format!("\t.zero\t{}\n", size)),
        GlobalInit::Int(v) => match size {
            1 => out.push_str(&format!("\t.byte\t{}\n", v)),
            2 => out.push_str(&format!("\t.value\t{}\n", v)),
            4 => out.push_str(&format!("\t.long\t{}\n", v)),
            _ => out.push_str(&format!("\t.quad\t{}\n", v)),
        },
        GlobalInit::Float(v) => {
            if size == 4 {
                out.push_str(&format!("\t.long\t{}\n", (*v as f32).to_bits()));
            } else {
                out.push_str(&format!("\t.quad\t{}\n", v.to_bits()));
            }
        }
        GlobalInit::Str(i) => out.push_str(&format!("\t.quad\t.Lstr{}\n", i)),
    }
}

struct FnEmitter<'a> {
    func: &'a Function,
    types: &'a TypeContext,
    out: &'a mut String,

    /// rbp-relative slot of every result-producing instruction.
    slots: FxHashMap<InstId, i64>,
    /// rbp-relative backing storage of every alloca.
    alloca_storage: FxHashMap<InstId, i64>,
    /// rbp-relative home of each incoming parameter.
    param_homes: Vec<i64>,
    frame_size: i64,
    /// Phi copies owed on each outgoing edge: block -> (phi, value).
    phi_copies: FxHashMap<BlockId, Vec<(InstId, Value)>>,
}

impl<'a> FnEmitter<'a> {
    fn new(func: &'a Function, types: &'a TypeContext, out: &'a mut String) -> Self {
        Self {
            func,
            types,
            out,
            slots: FxHashMap::default(),
            alloca_storage: FxHashMap::default(),
            param_homes: Vec::new(),
            frame_size: 0,
            phi_copies: FxHashMap::default(),
        }
    }

    fn run(&mut self) -> Result<(), GenError> {
        self.assign_frame();
        self.collect_phi_copies();

        let name = self.func.name.as_str();
        if self.func.linkage == Linkage::Public {
            self.out.push_str(&format!("\t.globl\t{}\n", name));
        }
        self.out.push_str(&format!("{}:\n", name));
        self.line("pushq\t%rbp");
        self.line("movq\t%rsp, %rbp");
        self.line(&format!("subq\t${}, %rsp", self.frame_size));

        // Spill incoming parameters to their homes.
        for (i, home) in self.param_homes.clone().into_iter().enumerate() {
            if i >= ARG_REGS.len() {
                return Err(GenError::Emit(format!(
                    "function '{}' has more than {} parameters",
                    name,
                    ARG_REGS.len()
                )));
            }
            self.line(&format!("movq\t{}, {}(%rbp)", ARG_REGS[i], home));
        }

        for (id, block) in self.func.blocks.iter_enumerated() {
            self.out.push_str(&format!("{}:\n", self.block_label(id)));
            let insts: Vec<InstId> = block.insts.clone();
            for inst_id in insts {
                self.emit_inst(inst_id)?;
            }
        }
        Ok(())
    }

    /// Lay out the frame: parameter homes, one 8-byte slot per result,
    /// then alloca backing storage, rounded to 16 for call alignment.
    fn assign_frame(&mut self) {
        let mut offset: i64 = 0;
        for _ in &self.func.ty.params {
            offset -= 8;
            self.param_homes.push(offset);
        }
        for block in self.func.blocks.iter() {
            for &inst_id in &block.insts {
                let inst = &self.func.insts[inst_id];
                if inst.op.has_result() {
                    offset -= 8;
                    self.slots.insert(inst_id, offset);
                }
                if inst.op == Opcode::Alloca {
                    let size = self.types.size_of(&inst.ty).unwrap_or(8).max(1) as i64;
                    let rounded = (size + 7) / 8 * 8;
                    offset -= rounded;
                    self.alloca_storage.insert(inst_id, offset);
                }
            }
        }
        self.frame_size = (-offset + 15) / 16 * 16;
    }

    /// On every edge into a block with phis, the predecessor owes a
    /// write of the incoming value into the phi's slot before branching.
    fn collect_phi_copies(&mut self) {
        for block in self.func.blocks.iter() {
            for &inst_id in &block.insts {
                let inst = &self.func.insts[inst_id];
                if inst.op != Opcode::Phi {
                    continue;
                }
                for pair in inst.operands.chunks(2) {
                    let [value, Value::Label(pred)] = pair else {
                        continue;
                    };
                    self.phi_copies
                        .entry(*pred)
                        .or_default()
                        .push((inst_id, value.clone()));
                }
            }
        }
    }

    fn block_label(&self, id: BlockId) -> String {
        format!(".L{}_{}", self.func.name, id.index())
    }

    fn line(&mut self, text: &str) {
        self.out.push('\t');
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn slot(&self, id: InstId) -> i64 {
        *self.slots.get(&id).expect("result instruction has a slot")
    }

    /// Materialize a value into `%rax`.
    fn value_to_rax(&mut self, v: &Value) -> Result<(), GenError> {
        match v {
            Value::ConstInt { value, .. } => {
                if *value >= i32::MIN as i64 && *value <= i32::MAX as i64 {
                    self.line(&format!("movq\t${}, %rax", value));
                } else {
                    self.line(&format!("movabsq\t${}, %rax", value));
                }
            }
            Value::ConstFloat { value, ty } => {
                let bits = if self.types.size_of(ty) == Some(4) {
                    (*value as f32).to_bits() as u64
                } else {
                    value.to_bits()
                };
                self.line(&format!("movabsq\t${}, %rax", bits as i64));
            }
            Value::ConstStr(i) => self.line(&format!("leaq\t.Lstr{}(%rip), %rax", i)),
            Value::Null(_) => self.line("xorl\t%eax, %eax"),
            Value::Param(i) => {
                let home = self.param_homes[*i as usize];
                self.line(&format!("movq\t{}(%rbp), %rax", home));
            }
            Value::Inst(id) => {
                let slot = self.slot(*id);
                self.line(&format!("movq\t{}(%rbp), %rax", slot));
            }
            Value::Func(name) | Value::Global(name) => {
                self.line(&format!("leaq\t{}(%rip), %rax", name));
            }
            Value::Label(_) => {
                return Err(GenError::Emit("label used as a value".into()));
            }
        }
        Ok(())
    }

    /// Materialize a value into `%rcx` via `%rax`.
    fn value_to_rcx(&mut self, v: &Value) -> Result<(), GenError> {
        self.value_to_rax(v)?;
        self.line("movq\t%rax, %rcx");
        Ok(())
    }

    fn store_result(&mut self, id: InstId) {
        let slot = self.slot(id);
        self.line(&format!("movq\t%rax, {}(%rbp)", slot));
    }

    /// The static type of a value, when recoverable.
    fn value_type(&self, v: &Value) -> Option<Type> {
        match v {
            Value::ConstInt { ty, .. } | Value::ConstFloat { ty, .. } => Some(ty.clone()),
            Value::Inst(id) => Some(self.func.insts[*id].ty.clone()),
            Value::Param(i) => self.func.ty.params.get(*i as usize).cloned(),
            _ => None,
        }
    }

    /// Emit the phi-slot writes owed by `block`, just before its
    /// terminator's jump.
    fn flush_phi_copies(&mut self, block: BlockId) -> Result<(), GenError> {
        let copies = self.phi_copies.get(&block).cloned().unwrap_or_default();
        for (phi, value) in copies {
            self.value_to_rax(&value)?;
            let slot = self.slot(phi);
            self.line(&format!("movq\t%rax, {}(%rbp)", slot));
        }
        Ok(())
    }

    /// Which block holds this instruction (terminators need their own
    /// block for phi-edge copies).
    fn block_of(&self, inst: InstId) -> BlockId {
        for (id, block) in self.func.blocks.iter_enumerated() {
            if block.insts.contains(&inst) {
                return id;
            }
        }
        self.func.entry
    }

    fn emit_inst(&mut self, id: InstId) -> Result<(), GenError> {
        let inst: Inst = self.func.insts[id].clone();
        match inst.op {
            Opcode::Alloca => {
                let storage = *self
                    .alloca_storage
                    .get(&id)
                    .expect("alloca has backing storage");
                self.line(&format!("leaq\t{}(%rbp), %rax", storage));
                self.store_result(id);
            }
            Opcode::Load => {
                self.value_to_rax(&inst.operands[0])?;
                self.line("movq\t%rax, %rcx");
                let size = self.types.size_of(&inst.ty).unwrap_or(8);
                let unsigned = inst.ty.is_unsigned_integer();
                if inst.ty.is_float() || inst.ty.is_pointer() {
                    match size {
                        4 => self.line("movl\t(%rcx), %eax"),
                        _ => self.line("movq\t(%rcx), %rax"),
                    }
                } else {
                    match (size, unsigned) {
                        (1, false) => self.line("movsbq\t(%rcx), %rax"),
                        (1, true) => self.line("movzbq\t(%rcx), %rax"),
                        (2, false) => self.line("movswq\t(%rcx), %rax"),
                        (2, true) => self.line("movzwq\t(%rcx), %rax"),
                        (4, false) => self.line("movslq\t(%rcx), %rax"),
                        (4, true) => self.line("movl\t(%rcx), %eax"),
                        _ => self.line("movq\t(%rcx), %rax"),
                    }
                }
                self.store_result(id);
            }
            Opcode::Store => {
                let value_ty = self.value_type(&inst.operands[0]);
                self.value_to_rcx(&inst.operands[1])?;
                self.line("movq\t%rcx, %rdx");
                self.value_to_rax(&inst.operands[0])?;
                let size = value_ty
                    .as_ref()
                    .and_then(|ty| self.types.size_of(ty))
                    .unwrap_or(8);
                match size {
                    1 => self.line("movb\t%al, (%rdx)"),
                    2 => self.line("movw\t%ax, (%rdx)"),
                    4 => self.line("movl\t%eax, (%rdx)"),
                    _ => self.line("movq\t%rax, (%rdx)"),
                }
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor => {
                self.value_to_rax(&inst.operands[0])?;
                self.line("movq\t%rax, %rdx");
                self.value_to_rcx(&inst.operands[1])?;
                self.line("movq\t%rdx, %rax");
                let mnemonic = match inst.op {
                    Opcode::Add => "addq",
                    Opcode::Sub => "subq",
                    Opcode::Mul => "imulq",
                    Opcode::And => "andq",
                    Opcode::Or => "orq",
                    _ => "xorq",
                };
                self.line(&format!("{}\t%rcx, %rax", mnemonic));
                self.store_result(id);
            }
            Opcode::SDiv | Opcode::SRem => {
                self.value_to_rax(&inst.operands[0])?;
                self.line("movq\t%rax, %rdx");
                self.value_to_rcx(&inst.operands[1])?;
                self.line("movq\t%rdx, %rax");
                self.line("cqto");
                self.line("idivq\t%rcx");
                if inst.op == Opcode::SRem {
                    self.line("movq\t%rdx, %rax");
                }
                self.store_result(id);
            }
            Opcode::UDiv | Opcode::URem => {
                self.value_to_rax(&inst.operands[0])?;
                self.line("movq\t%rax, %r10");
                self.value_to_rcx(&inst.operands[1])?;
                self.line("movq\t%r10, %rax");
                self.line("xorl\t%edx, %edx");
                self.line("divq\t%rcx");
                if inst.op == Opcode::URem {
                    self.line("movq\t%rdx, %rax");
                }
                self.store_result(id);
            }
            Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => {
                let single = self.types.size_of(&inst.ty) == Some(4);
                self.value_to_rax(&inst.operands[0])?;
                self.line("movq\t%rax, %xmm0");
                self.value_to_rcx(&inst.operands[1])?;
                self.line("movq\t%rcx, %xmm1");
                let mnemonic = match (inst.op, single) {
                    (Opcode::FAdd, false) => "addsd",
                    (Opcode::FSub, false) => "subsd",
                    (Opcode::FMul, false) => "mulsd",
                    (Opcode::FDiv, false) => "divsd",
                    (Opcode::FAdd, true) => "addss",
                    (Opcode::FSub, true) => "subss",
                    (Opcode::FMul, true) => "mulss",
                    _ => "divss",
                };
                self.line(&format!("{}\t%xmm1, %xmm0", mnemonic));
                self.line("movq\t%xmm0, %rax");
                self.store_result(id);
            }
            Opcode::Shl | Opcode::AShr | Opcode::LShr => {
                self.value_to_rax(&inst.operands[0])?;
                self.line("movq\t%rax, %rdx");
                self.value_to_rcx(&inst.operands[1])?;
                self.line("movq\t%rdx, %rax");
                let mnemonic = match inst.op {
                    Opcode::Shl => "shlq",
                    Opcode::AShr => "sarq",
                    _ => "shrq",
                };
                self.line(&format!("{}\t%cl, %rax", mnemonic));
                self.store_result(id);
            }
            Opcode::ICmp(pred) => {
                self.value_to_rax(&inst.operands[0])?;
                self.line("movq\t%rax, %rdx");
                self.value_to_rcx(&inst.operands[1])?;
                self.line("cmpq\t%rcx, %rdx");
                let cc = match pred {
                    ICmp::Eq => "e",
                    ICmp::Ne => "ne",
                    ICmp::Slt => "l",
                    ICmp::Sle => "le",
                    ICmp::Sgt => "g",
                    ICmp::Sge => "ge",
                    ICmp::Ult => "b",
                    ICmp::Ule => "be",
                    ICmp::Ugt => "a",
                    ICmp::Uge => "ae",
                };
                self.line(&format!("set{}\t%al", cc));
                self.line("movzbq\t%al, %rax");
                self.store_result(id);
            }
            Opcode::FCmp(pred) => {
                self.value_to_rax(&inst.operands[0])?;
                self.line("movq\t%rax, %xmm0");
                self.value_to_rcx(&inst.operands[1])?;
                self.line("movq\t%rcx, %xmm1");
                self.line("ucomisd\t%xmm1, %xmm0");
                let cc = match pred {
                    FCmp::Eq => "e",
                    FCmp::Ne => "ne",
                    FCmp::Lt => "b",
                    FCmp::Le => "be",
                    FCmp::Gt => "a",
                    FCmp::Ge => "ae",
                };
                self.line(&format!("set{}\t%al", cc));
                self.line("movzbq\t%al, %rax");
                self.store_result(id);
            }
            Opcode::Cast(kind) => {
                let src_ty = self.value_type(&inst.operands[0]);
                self.value_to_rax(&inst.operands[0])?;
                match kind {
                    CastKind::Bitcast => {}
                    CastKind::IntToInt => {
                        let size = self.types.size_of(&inst.ty).unwrap_or(8);
                        let unsigned = inst.ty.is_unsigned_integer();
                        match (size, unsigned) {
                            (1, false) => self.line("movsbq\t%al, %rax"),
                            (1, true) => self.line("movzbq\t%al, %rax"),
                            (2, false) => self.line("movswq\t%ax, %rax"),
                            (2, true) => self.line("movzwq\t%ax, %rax"),
                            (4, false) => self.line("movslq\t%eax, %rax"),
                            (4, true) => self.line("movl\t%eax, %eax"),
                            _ => {}
                        }
                    }
                    CastKind::IntToFloat => {
                        if self.types.size_of(&inst.ty) == Some(4) {
                            self.line("cvtsi2ssq\t%rax, %xmm0");
                            self.line("movd\t%xmm0, %eax");
                        } else {
                            self.line("cvtsi2sdq\t%rax, %xmm0");
                            self.line("movq\t%xmm0, %rax");
                        }
                    }
                    CastKind::FloatToInt => {
                        let src_single = src_ty
                            .as_ref()
                            .and_then(|ty| self.types.size_of(ty))
                            == Some(4);
                        self.line("movq\t%rax, %xmm0");
                        if src_single {
                            self.line("cvttss2siq\t%xmm0, %rax");
                        } else {
                            self.line("cvttsd2siq\t%xmm0, %rax");
                        }
                    }
                    CastKind::FloatToFloat => {
                        let to_single = self.types.size_of(&inst.ty) == Some(4);
                        self.line("movq\t%rax, %xmm0");
                        if to_single {
                            self.line("cvtsd2ss\t%xmm0, %xmm0");
                            self.line("movd\t%xmm0, %eax");
                        } else {
                            self.line("cvtss2sd\t%xmm0, %xmm0");
                            self.line("movq\t%xmm0, %rax");
                        }
                    }
                }
                self.store_result(id);
            }
            Opcode::Gep => {
                let elem_size = self.types.size_of(&inst.ty).unwrap_or(1).max(1);
                self.value_to_rax(&inst.operands[0])?;
                self.line("movq\t%rax, %rdx");
                self.value_to_rcx(&inst.operands[1])?;
                self.line(&format!("imulq\t${}, %rcx", elem_size));
                self.line("leaq\t(%rdx,%rcx), %rax");
                self.store_result(id);
            }
            Opcode::FieldPtr => {
                self.value_to_rax(&inst.operands[0])?;
                if let Value::ConstInt { value, .. } = &inst.operands[1] {
                    if *value != 0 {
                        self.line(&format!("addq\t${}, %rax", value));
                    }
                } else {
                    self.value_to_rcx(&inst.operands[1])?;
                    self.line("addq\t%rcx, %rax");
                }
                self.store_result(id);
            }
            Opcode::Phi => {
                // Resolved on the incoming edges; the slot already holds
                // the merged value.
                let slot = self.slot(id);
                self.line(&format!("movq\t{}(%rbp), %rax", slot));
                self.store_result(id);
            }
            Opcode::Call => {
                let args = &inst.operands[1..];
                if args.len() > ARG_REGS.len() {
                    return Err(GenError::Emit(format!(
                        "call with more than {} arguments",
                        ARG_REGS.len()
                    )));
                }
                for (i, arg) in args.iter().enumerate() {
                    self.value_to_rax(arg)?;
                    self.line(&format!("movq\t%rax, {}", ARG_REGS[i]));
                }
                match &inst.operands[0] {
                    Value::Func(name) => self.line(&format!("call\t{}", name)),
                    callee => {
                        self.value_to_rax(callee)?;
                        self.line("movq\t%rax, %r10");
                        self.line("call\t*%r10");
                    }
                }
                self.store_result(id);
            }
            Opcode::Br => {
                let block = self.block_of(id);
                self.flush_phi_copies(block)?;
                let Value::Label(target) = &inst.operands[0] else {
                    return Err(GenError::Emit("br without a label".into()));
                };
                let label = self.block_label(*target);
                self.line(&format!("jmp\t{}", label));
            }
            Opcode::CondBr => {
                let block = self.block_of(id);
                self.flush_phi_copies(block)?;
                self.value_to_rax(&inst.operands[0])?;
                self.line("testq\t%rax, %rax");
                let (Value::Label(then), Value::Label(otherwise)) =
                    (&inst.operands[1], &inst.operands[2])
                else {
                    return Err(GenError::Emit("cond_br without labels".into()));
                };
                let then_label = self.block_label(*then);
                let else_label = self.block_label(*otherwise);
                self.line(&format!("jne\t{}", then_label));
                self.line(&format!("jmp\t{}", else_label));
            }
            Opcode::Ret => {
                self.value_to_rax(&inst.operands[0])?;
                self.line("leave");
                self.line("ret");
            }
            Opcode::RetVoid => {
                self.line("leave");
                self.line("ret");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcc_ir::lower_unit;
    use qcc_lex::Lexer;
    use qcc_par::Parser;
    use qcc_sem::SemanticAnalyzer;
    use qcc_util::{Handler, SourceMap, Standard};

    fn emit(text: &str) -> String {
        let mut sources = SourceMap::new();
        let file = sources.add_file("gen.c", text);
        let handler = Handler::new();
        let features = Standard::Gnu17.features();
        let unit = {
            let tokens = Lexer::new(file, features, &handler).tokenize();
            Parser::new(tokens, features, &handler).parse()
        };
        let mut sema =
            SemanticAnalyzer::new(Arch::X86_64.data_model(), features, &handler);
        sema.run(&unit);
        assert!(!handler.has_errors(), "{:?}", handler.diagnostics());
        let module = lower_unit(&unit, &sema.types, &sema.symtab, "gen.c");
        let bytes = X86_64Backend.emit(&module).expect("emission succeeds");
        String::from_utf8(bytes).expect("assembly is text")
    }

    #[test]
    fn test_function_skeleton() {
        let asm = emit("int main(void) { return 0; }");
        assert!(asm.contains(".globl\tmain"));
        assert!(asm.contains("main:"));
        assert!(asm.contains("pushq\t%rbp"));
        assert!(asm.contains("leave"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn test_arithmetic_selection() {
        let asm = emit(
            "int s(int a, int b) { return a / b; }\n\
             unsigned u(unsigned a, unsigned b) { return a / b; }\n\
             double d(double a, double b) { return a / b; }",
        );
        assert!(asm.contains("idivq"));
        assert!(asm.contains("divq"));
        assert!(asm.contains("divsd"));
    }

    #[test]
    fn test_branches_emit_labels() {
        let asm = emit("int f(int c) { if (c) return 1; return 2; }");
        assert!(asm.contains("testq\t%rax, %rax"));
        assert!(asm.contains("jne\t.Lf_"));
        assert!(asm.contains("jmp\t.Lf_"));
    }

    #[test]
    fn test_globals_and_strings() {
        let asm = emit(
            "int counter = 7;\n\
             const char *msg = \"hey\";\n\
             int main(void) { return counter; }",
        );
        assert!(asm.contains(".globl\tcounter"));
        assert!(asm.contains(".long\t7"));
        assert!(asm.contains(".Lstr0:"));
        assert!(asm.contains(".byte\t104, 101, 121, 0"));
    }

    #[test]
    fn test_static_global_not_exported() {
        let asm = emit("static int hidden = 1; int main(void) { return hidden; }");
        assert!(!asm.contains(".globl\thidden"));
        assert!(asm.contains("hidden:"));
    }

    #[test]
    fn test_call_uses_arg_registers() {
        let asm = emit(
            "int add(int a, int b) { return a + b; }\n\
             int main(void) { return add(2, 3); }",
        );
        assert!(asm.contains("movq\t%rax, %rdi"));
        assert!(asm.contains("movq\t%rax, %rsi"));
        assert!(asm.contains("call\tadd"));
    }

    #[test]
    fn test_frame_alignment() {
        let asm = emit("int f(int a) { int b = a; return b; }");
        for line in asm.lines() {
            if let Some(rest) = line.trim().strip_prefix("subq\t$") {
                let n: i64 = rest
                    .split(',')
                    .next()
                    .expect("operand")
                    .parse()
                    .expect("numeric frame");
                assert_eq!(n % 16, 0, "frame must stay 16-byte aligned");
            }
        }
    }

    #[test]
    fn test_phi_resolved_on_edges() {
        let asm = emit("int f(int a, int b) { return a && b; }");
        // Both predecessors write the merge slot before jumping.
        assert!(asm.contains("jmp"));
        assert!(asm.matches("setne").count() >= 2);
    }
}
