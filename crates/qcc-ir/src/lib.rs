//! qcc-ir - SSA Intermediate Representation and Lowering
//!
//! The target-independent layer between the analyzed AST and the
//! assembly backends:
//!
//! - [`ir`]: the data model — [`Module`], [`Function`], basic blocks
//!   with single terminators, typed instructions, and SSA [`Value`]s
//! - [`builder`]: the [`FunctionBuilder`] enforcing the terminator
//!   discipline while blocks are grown
//! - [`lower`]: the AST walk producing one IR function per definition
//!
//! The lowering layer does not depend on any backend; a completed
//! [`Module`] is handed to whichever backend the session selected.

pub mod builder;
pub mod ir;
pub mod lower;

pub use builder::FunctionBuilder;
pub use ir::{
    Block, BlockId, CastKind, FCmp, Function, Global, GlobalInit, ICmp, Inst, InstId, Linkage,
    Module, Opcode, Value,
};
pub use lower::lower_unit;

#[cfg(test)]
mod tests {
    use super::*;
    use qcc_lex::Lexer;
    use qcc_par::Parser;
    use qcc_sem::SemanticAnalyzer;
    use qcc_util::{Arch, Handler, SourceMap, Standard};

    fn lower(text: &str) -> Module {
        let mut sources = SourceMap::new();
        let file = sources.add_file("ir.c", text);
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
        lower_unit(&unit, &sema.types, &sema.symtab, "ir.c")
    }

    fn count_ops(func: &Function, pred: impl Fn(&Opcode) -> bool) -> usize {
        func.blocks
            .iter()
            .flat_map(|b| b.insts.iter())
            .filter(|id| pred(&func.insts[**id].op))
            .count()
    }

    /// Every block ends with exactly one terminator; no terminator
    /// appears mid-block.
    fn assert_blocks_terminated(func: &Function) {
        for (id, block) in func.blocks.iter_enumerated() {
            if block.insts.is_empty() {
                continue; // unreferenced scratch block
            }
            let last = *block.insts.last().expect("non-empty");
            assert!(
                func.insts[last].op.is_terminator(),
                "block {:?} of {:?} lacks a terminator",
                id,
                func.name
            );
            for inst_id in &block.insts[..block.insts.len() - 1] {
                assert!(
                    !func.insts[*inst_id].op.is_terminator(),
                    "terminator mid-block in {:?}",
                    func.name
                );
            }
        }
    }

    /// SSA: each instruction id appears in at most one block, once.
    fn assert_single_definition(func: &Function) {
        let mut seen = std::collections::HashSet::new();
        for block in func.blocks.iter() {
            for inst in &block.insts {
                assert!(seen.insert(*inst), "instruction listed twice: {:?}", inst);
            }
        }
    }

    #[test]
    fn test_add_function_shape() {
        let module = lower("int add(int a, int b) { return a + b; }");
        assert_eq!(module.functions.len(), 1);
        let f = &module.functions[0];
        assert_eq!(f.name.as_str(), "add");

        // Entry: two allocas, two stores of params, two loads, an add,
        // and a ret.
        assert_eq!(count_ops(f, |op| *op == Opcode::Alloca), 2);
        assert_eq!(count_ops(f, |op| *op == Opcode::Store), 2);
        assert_eq!(count_ops(f, |op| *op == Opcode::Load), 2);
        assert_eq!(count_ops(f, |op| *op == Opcode::Add), 1);
        assert_eq!(count_ops(f, |op| *op == Opcode::Ret), 1);
        assert_blocks_terminated(f);
        assert_single_definition(f);
    }

    #[test]
    fn test_for_loop_block_shape() {
        let module =
            lower("int f(int n) { int s = 0; for (int i = 0; i < n; i = i + 1) s = s + i; return s; }");
        let f = &module.functions[0];
        assert_blocks_terminated(f);
        assert_single_definition(f);

        let names: Vec<&str> = f
            .blocks
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert!(names[0] == "entry");
        assert!(names.iter().any(|n| n.starts_with("for.cond")));
        assert!(names.iter().any(|n| n.starts_with("for.body")));
        assert!(names.iter().any(|n| n.starts_with("for.incr")));
        assert!(names.iter().any(|n| n.starts_with("for.end")));

        // The back edge runs body -> incr -> cond.
        let find = |prefix: &str| {
            f.blocks
                .iter_enumerated()
                .find(|(_, b)| b.name.as_str().starts_with(prefix))
                .map(|(id, _)| id)
                .expect("block exists")
        };
        let cond = find("for.cond");
        let body = find("for.body");
        let incr = find("for.incr");
        assert_eq!(f.successors(body), vec![incr]);
        assert_eq!(f.successors(incr), vec![cond]);
    }

    #[test]
    fn test_break_continue_targets() {
        let module = lower(
            "int f(int n) { int s = 0; for (int i = 0; i < n; i = i + 1) { if (i == 2) continue; if (i == 5) break; s = s + 1; } return s; }",
        );
        let f = &module.functions[0];
        assert_blocks_terminated(f);
        let find = |prefix: &str| {
            f.blocks
                .iter_enumerated()
                .find(|(_, b)| b.name.as_str().starts_with(prefix))
                .map(|(id, _)| id)
                .expect("block exists")
        };
        let incr = find("for.incr");
        let end = find("for.end");
        // Some block branches straight to incr (the continue), and some
        // block other than cond branches to end (the break).
        assert!(f.predecessors(incr).len() >= 2);
        assert!(f.predecessors(end).len() >= 2);
    }

    #[test]
    fn test_short_circuit_phi() {
        let module = lower("int f(int a, int b) { return a && b; }");
        let f = &module.functions[0];
        assert_eq!(count_ops(f, |op| *op == Opcode::Phi), 1);
        assert_blocks_terminated(f);

        // The phi has two incoming edges.
        let phi = f
            .blocks
            .iter()
            .flat_map(|b| b.insts.iter())
            .map(|id| &f.insts[*id])
            .find(|i| i.op == Opcode::Phi)
            .expect("phi exists");
        assert_eq!(phi.operands.len(), 4, "two (value, label) pairs");
    }

    #[test]
    fn test_ternary_phi() {
        let module = lower("int f(int c) { return c ? 1 : 2; }");
        let f = &module.functions[0];
        assert_eq!(count_ops(f, |op| *op == Opcode::Phi), 1);
    }

    #[test]
    fn test_unsigned_signed_float_dispatch() {
        let module = lower(
            "unsigned u(unsigned a, unsigned b) { return a / b; }\n\
             int s(int a, int b) { return a / b; }\n\
             double d(double a, double b) { return a / b; }",
        );
        assert_eq!(count_ops(&module.functions[0], |op| *op == Opcode::UDiv), 1);
        assert_eq!(count_ops(&module.functions[1], |op| *op == Opcode::SDiv), 1);
        assert_eq!(count_ops(&module.functions[2], |op| *op == Opcode::FDiv), 1);
    }

    #[test]
    fn test_shift_signedness() {
        let module = lower(
            "unsigned u(unsigned a) { return a >> 1; }\n\
             int s(int a) { return a >> 1; }",
        );
        assert_eq!(count_ops(&module.functions[0], |op| *op == Opcode::LShr), 1);
        assert_eq!(count_ops(&module.functions[1], |op| *op == Opcode::AShr), 1);
    }

    #[test]
    fn test_comparison_signedness() {
        let module = lower(
            "int u(unsigned a, unsigned b) { return a < b; }\n\
             int s(int a, int b) { return a < b; }",
        );
        assert_eq!(
            count_ops(&module.functions[0], |op| *op == Opcode::ICmp(ICmp::Ult)),
            1
        );
        assert_eq!(
            count_ops(&module.functions[1], |op| *op == Opcode::ICmp(ICmp::Slt)),
            1
        );
    }

    #[test]
    fn test_switch_cascade() {
        let module = lower(
            "int f(int x) { switch (x) { case 1: return 10; case 2: return 20; default: return 0; } }",
        );
        let f = &module.functions[0];
        assert_blocks_terminated(f);
        // One equality test per case in the dispatch chain.
        assert_eq!(count_ops(f, |op| *op == Opcode::ICmp(ICmp::Eq)), 2);
        // Each case body is its own block with a return, plus the
        // implicit `ret 0` on the fall-through path after the switch.
        assert_eq!(count_ops(f, |op| *op == Opcode::Ret), 4);
    }

    #[test]
    fn test_switch_fallthrough() {
        let module = lower(
            "int f(int x) { int r = 0; switch (x) { case 1: r = 1; case 2: r = r + 2; break; } return r; }",
        );
        let f = &module.functions[0];
        assert_blocks_terminated(f);
        let case_blocks: Vec<_> = f
            .blocks
            .iter_enumerated()
            .filter(|(_, b)| b.name.as_str().starts_with("case"))
            .map(|(id, _)| id)
            .collect();
        assert_eq!(case_blocks.len(), 2);
        // case 1 falls through into case 2.
        assert_eq!(f.successors(case_blocks[0]), vec![case_blocks[1]]);
    }

    #[test]
    fn test_goto_label() {
        let module = lower("int f(void) { int x = 0; goto out; x = 1; out: return x; }");
        let f = &module.functions[0];
        assert_blocks_terminated(f);
        assert!(f
            .blocks
            .iter()
            .any(|b| b.name.as_str().starts_with("label.out")));
    }

    #[test]
    fn test_prototype_then_definition_keeps_param_names() {
        let module = lower(
            "int add(int, int);\n\
             int add(int a, int b) { return a + b; }\n\
             int main(void) { return add(1, 2); }",
        );
        let f = &module.functions[0];
        assert_eq!(f.name.as_str(), "add");
        // The definition's named parameters are spilled and reloaded;
        // a lost name would surface as a global load instead.
        assert_eq!(count_ops(f, |op| *op == Opcode::Load), 2);
        let loads_globals = f
            .blocks
            .iter()
            .flat_map(|b| b.insts.iter())
            .map(|id| &f.insts[*id])
            .filter(|i| i.op == Opcode::Load)
            .any(|i| matches!(i.operands[0], Value::Global(_)));
        assert!(!loads_globals);
    }

    #[test]
    fn test_implicit_return() {
        let module = lower("void v(void) { } int i(int c) { if (c) return 1; }");
        let v = &module.functions[0];
        assert_eq!(count_ops(v, |op| *op == Opcode::RetVoid), 1);
        let i = &module.functions[1];
        // The fall-through path returns 0 implicitly.
        assert_eq!(count_ops(i, |op| *op == Opcode::Ret), 2);
        assert_blocks_terminated(i);
    }

    #[test]
    fn test_member_access_offsets() {
        let module = lower(
            "struct point { int x; int y; };\n\
             int get_y(struct point *p) { return p->y; }",
        );
        let f = &module.functions[0];
        let field = f
            .blocks
            .iter()
            .flat_map(|b| b.insts.iter())
            .map(|id| &f.insts[*id])
            .find(|i| i.op == Opcode::FieldPtr)
            .expect("field access lowers to FieldPtr");
        assert!(matches!(
            field.operands[1],
            Value::ConstInt { value: 4, .. }
        ));
    }

    #[test]
    fn test_pointer_arithmetic_gep() {
        let module = lower("int f(int *p, int i) { return p[i] + *(p + 1); }");
        let f = &module.functions[0];
        assert_eq!(count_ops(f, |op| *op == Opcode::Gep), 2);
    }

    #[test]
    fn test_globals() {
        let module = lower("int answer = 42; static int hidden; extern int elsewhere;");
        assert_eq!(module.globals.len(), 2, "extern declaration is not emitted");
        assert_eq!(module.globals[0].init, GlobalInit::Int(42));
        assert_eq!(module.globals[0].linkage, Linkage::Public);
        assert_eq!(module.globals[1].init, GlobalInit::Zero);
        assert_eq!(module.globals[1].linkage, Linkage::Internal);
    }

    #[test]
    fn test_string_literals_pooled() {
        let module = lower(
            "const char *a = \"hi\"; const char *b = \"hi\";\n\
             int main(void) { return 0; }",
        );
        assert_eq!(module.strings.len(), 1);
    }

    #[test]
    fn test_compound_assignment_shares_lvalue() {
        let module = lower("int f(int x) { x += 5; return x; }");
        let f = &module.functions[0];
        // load x, add, store back, then the return's load.
        assert_eq!(count_ops(f, |op| *op == Opcode::Add), 1);
        assert!(count_ops(f, |op| *op == Opcode::Store) >= 2);
    }

    #[test]
    fn test_no_ir_blocks_unterminated_in_larger_program() {
        let module = lower(
            "int fib(int n) {\n\
                 if (n < 2) return n;\n\
                 int a = 0; int b = 1;\n\
                 for (int i = 2; i <= n; i = i + 1) {\n\
                     int t = a + b; a = b; b = t;\n\
                 }\n\
                 return b;\n\
             }\n\
             int main(void) { return fib(10); }",
        );
        for f in &module.functions {
            assert_blocks_terminated(f);
            assert_single_definition(f);
        }
    }
}
