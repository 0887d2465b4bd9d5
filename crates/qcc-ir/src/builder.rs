//! Function builder.
//!
//! Appends instructions to a current block, enforcing the terminator
//! invariant: once a block is closed, further instructions are created
//! but not appended (they are unreachable and dropped from the block),
//! and a second terminator never lands.

use qcc_sem::{FuncType, Type};
use qcc_util::{IndexVec, Symbol};

use crate::ir::*;

/// Incremental constructor for one [`Function`].
pub struct FunctionBuilder {
    pub func: Function,
    current: BlockId,
}

impl FunctionBuilder {
    /// Create a builder with an `entry` block selected.
    pub fn new(name: Symbol, ty: FuncType, linkage: Linkage) -> Self {
        let mut blocks = IndexVec::new();
        let entry = blocks.push(Block {
            name: Symbol::intern("entry"),
            insts: Vec::new(),
        });
        Self {
            func: Function {
                name,
                ty,
                linkage,
                blocks,
                insts: IndexVec::new(),
                entry,
            },
            current: entry,
        }
    }

    /// Create a new block named after `hint` with a unique suffix.
    pub fn new_block(&mut self, hint: &str) -> BlockId {
        let n = self.func.blocks.len();
        self.func.blocks.push(Block {
            name: Symbol::intern(&format!("{}{}", hint, n)),
            insts: Vec::new(),
        })
    }

    /// Select the block receiving subsequent instructions.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// The block currently selected.
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    /// Is the current block already closed?
    pub fn is_terminated(&self) -> bool {
        self.func.is_terminated(self.current)
    }

    /// Append an instruction; returns its id. Instructions pushed after
    /// the current block's terminator are dropped from the block.
    pub fn push(&mut self, op: Opcode, ty: Type, operands: Vec<Value>) -> InstId {
        let id = self.func.insts.push(Inst { op, ty, operands });
        if !self.func.is_terminated(self.current) {
            self.func.blocks[self.current].insts.push(id);
        }
        id
    }

    /// Append and use the result as a [`Value`].
    pub fn push_value(&mut self, op: Opcode, ty: Type, operands: Vec<Value>) -> Value {
        debug_assert!(op.has_result(), "{:?} produces no value", op);
        Value::Inst(self.push(op, ty, operands))
    }

    // Convenience terminators.

    pub fn br(&mut self, target: BlockId, void_ty: Type) {
        self.push(Opcode::Br, void_ty, vec![Value::Label(target)]);
    }

    pub fn cond_br(&mut self, cond: Value, then: BlockId, otherwise: BlockId, void_ty: Type) {
        self.push(
            Opcode::CondBr,
            void_ty,
            vec![cond, Value::Label(then), Value::Label(otherwise)],
        );
    }

    pub fn ret(&mut self, value: Value, ty: Type) {
        self.push(Opcode::Ret, ty, vec![value]);
    }

    pub fn ret_void(&mut self, void_ty: Type) {
        self.push(Opcode::RetVoid, void_ty, vec![]);
    }

    /// A phi merge: one `(value, predecessor)` pair per incoming edge.
    pub fn phi(&mut self, ty: Type, incoming: Vec<(Value, BlockId)>) -> Value {
        let mut operands = Vec::with_capacity(incoming.len() * 2);
        for (value, block) in incoming {
            operands.push(value);
            operands.push(Value::Label(block));
        }
        self.push_value(Opcode::Phi, ty, operands)
    }

    /// Finish construction.
    pub fn build(self) -> Function {
        self.func
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcc_sem::TypeContext;
    use qcc_util::Arch;

    fn builder() -> (FunctionBuilder, TypeContext) {
        let types = TypeContext::new(Arch::X86_64.data_model());
        let ty = FuncType {
            ret: types.int_(),
            params: vec![],
            param_names: vec![],
            variadic: false,
            unspecified: false,
        };
        (
            FunctionBuilder::new(Symbol::intern("t"), ty, Linkage::Public),
            types,
        )
    }

    #[test]
    fn test_single_terminator() {
        let (mut b, types) = builder();
        let zero = Value::ConstInt {
            value: 0,
            ty: types.int_(),
        };
        b.ret(zero.clone(), types.int_());
        // A second terminator is dropped.
        b.ret(zero, types.int_());
        let func = b.build();
        assert_eq!(func.blocks[func.entry].insts.len(), 1);
        assert!(func.is_terminated(func.entry));
    }

    #[test]
    fn test_insts_after_terminator_dropped() {
        let (mut b, types) = builder();
        b.ret_void(types.void());
        b.push(
            Opcode::Add,
            types.int_(),
            vec![
                Value::ConstInt { value: 1, ty: types.int_() },
                Value::ConstInt { value: 2, ty: types.int_() },
            ],
        );
        let func = b.build();
        assert_eq!(func.blocks[func.entry].insts.len(), 1);
    }

    #[test]
    fn test_predecessors_and_successors() {
        let (mut b, types) = builder();
        let then = b.new_block("then");
        let done = b.new_block("done");
        let cond = Value::ConstInt { value: 1, ty: types.int_() };
        b.cond_br(cond, then, done, types.void());
        b.switch_to(then);
        b.br(done, types.void());
        b.switch_to(done);
        b.ret_void(types.void());
        let func = b.build();

        assert_eq!(func.successors(func.entry), vec![then, done]);
        let mut preds = func.predecessors(done);
        preds.sort_by_key(|b| b.0);
        assert_eq!(preds, vec![func.entry, then]);
    }

    #[test]
    fn test_each_value_defined_once() {
        let (mut b, types) = builder();
        let one = Value::ConstInt { value: 1, ty: types.int_() };
        let a = b.push_value(Opcode::Add, types.int_(), vec![one.clone(), one.clone()]);
        let b2 = b.push_value(Opcode::Add, types.int_(), vec![a.clone(), one]);
        assert_ne!(a, b2);
        b.ret(b2, types.int_());
        let func = b.build();
        // Ids are unique across the arena by construction.
        assert_eq!(func.insts.len(), 3);
    }
}
