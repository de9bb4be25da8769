use std::collections::HashSet;

use tolc_codewriter::codegen::flag::ACC_PUBLIC;
use tolc_codewriter::codegen::label::Labels;
use tolc_codewriter::codegen::max_stack::resolve_max_stack;
use tolc_codewriter::codegen::opcodes::*;
use tolc_codewriter::codegen::{ConstantPool, MethodWriter};
use tolc_codewriter::Config;

mod common;
use common::*;

/// Deterministic generator for the synthetic block graphs
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u32) -> u32 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as u32) % bound
    }
}

/// Max stack computation tests
///
/// Graph-level checks run the resolver on generated acyclic block graphs and
/// compare with a plain reachability walk; writer-level checks build small
/// methods and look at the computed `max_stack`.
#[cfg(test)]
mod max_stack_tests {
    use super::*;

    #[test]
    fn test_generated_graphs_match_reachable_maximum() {
        let mut rng = Lcg(0x5eed);
        for round in 0..50 {
            let count = 2 + rng.next(30) as usize;
            // absolute entry depth and relative peak of every block
            let depth: Vec<i32> = (0..count)
                .map(|i| if i == 0 { 0 } else { rng.next(12) as i32 })
                .collect();
            let peak: Vec<i32> = (0..count).map(|_| rng.next(6) as i32).collect();

            let mut labels = Labels::new();
            let blocks: Vec<_> = (0..count).map(|_| labels.new_label()).collect();
            let mut successors = vec![Vec::new(); count];
            for (i, &block) in blocks.iter().enumerate() {
                labels.node_mut(block).unwrap().block.max_relative = peak[i];
                for j in i + 1..count {
                    if rng.next(4) == 0 {
                        labels.add_edge(block, blocks[j], depth[j] - depth[i]).unwrap();
                        successors[i].push(j);
                    }
                }
            }

            let mut seen = HashSet::from([0usize]);
            let mut stack = vec![0usize];
            while let Some(i) = stack.pop() {
                for &j in &successors[i] {
                    if seen.insert(j) {
                        stack.push(j);
                    }
                }
            }
            let expected = seen.iter().map(|&i| depth[i] + peak[i]).max().unwrap();

            let actual = resolve_max_stack(&mut labels, &[(blocks[0], 0)]).unwrap();
            assert_eq!(actual, expected, "round {} with {} blocks", round, count);
            for (i, &block) in blocks.iter().enumerate() {
                let begin = labels.node(block).unwrap().block.begin_stack_size;
                assert_eq!(begin, seen.contains(&i).then_some(depth[i]), "block {} of round {}", i, round);
            }
        }
    }

    #[test]
    fn test_diamond_takes_deeper_arm() {
        init_logging();
        let mut pool = ConstantPool::new();
        let mut mw = static_writer(&mut pool, "(I)I");
        let (other, join) = (mw.new_label(), mw.new_label());
        mw.emit_var_insn(ILOAD, 0).unwrap();
        mw.emit_jump(IFEQ, other).unwrap();
        mw.emit_insn(ICONST_1).unwrap();
        mw.emit_insn(ICONST_2).unwrap();
        mw.emit_insn(IADD).unwrap();
        mw.emit_jump(GOTO, join).unwrap();
        mw.place_label(other).unwrap();
        mw.emit_insn(ICONST_0).unwrap();
        mw.emit_insn(ICONST_0).unwrap();
        mw.emit_insn(ICONST_0).unwrap();
        mw.emit_insn(POP2).unwrap();
        mw.place_label(join).unwrap();
        mw.emit_insn(IRETURN).unwrap();
        let code = mw.finish().unwrap();
        assert_eq!(code.max_stack, 3);
        assert_eq!(code.max_locals, 1);
    }

    #[test]
    fn test_handler_starts_with_exception_on_stack() {
        let mut pool = ConstantPool::new();
        let mut mw = static_writer(&mut pool, "()V");
        let (start, end, handler, after) = (mw.new_label(), mw.new_label(), mw.new_label(), mw.new_label());
        mw.place_label(start).unwrap();
        mw.emit_insn(ICONST_0).unwrap();
        mw.emit_insn(POP).unwrap();
        mw.place_label(end).unwrap();
        mw.emit_jump(GOTO, after).unwrap();
        mw.place_label(handler).unwrap();
        mw.emit_insn(DUP).unwrap();
        mw.emit_insn(POP).unwrap();
        mw.emit_insn(ATHROW).unwrap();
        mw.place_label(after).unwrap();
        mw.emit_insn(RETURN).unwrap();
        mw.add_exception_handler(start, end, handler, Some("java/lang/Exception")).unwrap();
        let code = mw.finish().unwrap();

        assert_eq!(code.max_stack, 2);
        assert_eq!(code.exception_table.len(), 1);
        let entry = code.exception_table[0];
        assert_eq!((entry.start_pc, entry.end_pc, entry.handler_pc), (0, 2, 5));
        assert_ne!(entry.catch_type, 0);
    }

    #[test]
    fn test_subroutine_entry_holds_return_address() {
        let mut pool = ConstantPool::new();
        let mut mw = static_writer(&mut pool, "()V");
        let sub = mw.new_label();
        mw.emit_jump(JSR, sub).unwrap();
        mw.emit_insn(RETURN).unwrap();
        mw.place_label(sub).unwrap();
        mw.emit_var_insn(ASTORE, 0).unwrap();
        mw.emit_var_insn(RET, 0).unwrap();
        let code = mw.finish().unwrap();
        assert_eq!(code.code, vec![JSR, 0, 4, RETURN, ASTORE_0, RET, 0]);
        assert_eq!(code.max_stack, 1);
        assert_eq!(code.max_locals, 1);
    }

    #[test]
    fn test_wide_values_take_two_slots() {
        let mut pool = ConstantPool::new();
        let mut mw = static_writer(&mut pool, "(JD)D");
        mw.emit_var_insn(DLOAD, 2).unwrap();
        mw.emit_var_insn(LLOAD, 0).unwrap();
        mw.emit_insn(L2D).unwrap();
        mw.emit_insn(DADD).unwrap();
        mw.emit_insn(DRETURN).unwrap();
        let code = mw.finish().unwrap();
        assert_eq!(code.max_stack, 4);
        assert_eq!(code.max_locals, 4);
    }

    #[test]
    fn test_invoke_pops_receiver_and_arguments() {
        let mut pool = ConstantPool::new();
        let mut mw = MethodWriter::new(&mut pool, ACC_PUBLIC, "()J", Config::default()).unwrap();
        mw.emit_var_insn(ALOAD, 0).unwrap();
        mw.emit_insn(ICONST_1).unwrap();
        mw.emit_insn(LCONST_1).unwrap();
        mw.emit_method_insn(INVOKEVIRTUAL, "A", "f", "(IJ)J").unwrap();
        assert_eq!(mw.stack_size(), 2);
        mw.emit_insn(LRETURN).unwrap();
        let code = mw.finish().unwrap();
        assert_eq!(code.max_stack, 4);
        assert_eq!(code.max_locals, 1);
    }

    #[test]
    fn test_unreachable_block_is_ignored() {
        let mut pool = ConstantPool::new();
        let mut mw = static_writer(&mut pool, "()V");
        let (dead, end) = (mw.new_label(), mw.new_label());
        mw.emit_jump(GOTO, end).unwrap();
        mw.place_label(dead).unwrap();
        for _ in 0..5 {
            mw.emit_insn(ICONST_0).unwrap();
        }
        mw.emit_insn(POP2).unwrap();
        mw.emit_insn(POP2).unwrap();
        mw.emit_insn(POP).unwrap();
        mw.place_label(end).unwrap();
        mw.emit_insn(RETURN).unwrap();
        let code = mw.finish().unwrap();
        assert_eq!(code.max_stack, 0);
    }

    #[test]
    fn test_loop_terminates() {
        let mut pool = ConstantPool::new();
        let mut mw = static_writer(&mut pool, "(I)V");
        let top = mw.new_label();
        mw.place_label(top).unwrap();
        mw.emit_iinc(0, -1).unwrap();
        mw.emit_var_insn(ILOAD, 0).unwrap();
        mw.emit_jump(IFNE, top).unwrap();
        mw.emit_insn(RETURN).unwrap();
        let code = mw.finish().unwrap();
        assert_eq!(code.max_stack, 1);
        assert_eq!(code.code, vec![IINC, 0, 0xff, ILOAD_0, IFNE, 0xff, 0xfc, RETURN]);
    }
}
