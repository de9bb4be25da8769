// Common test utilities
#![allow(dead_code)]

use tolc_codewriter::codegen::decode::{walk, Switch};
use tolc_codewriter::codegen::flag::ACC_STATIC;
use tolc_codewriter::codegen::opcodes::{self, InsnKind, GOTO_W, NOP};
use tolc_codewriter::codegen::{ConstantPool, MethodWriter};
use tolc_codewriter::Config;

/// Install a debug-level logger that writes through the test harness
pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// Writer for a static method, unwrapping construction errors
pub fn static_writer<'a>(pool: &'a mut ConstantPool, descriptor: &str) -> MethodWriter<'a, ConstantPool> {
    MethodWriter::new(pool, ACC_STATIC, descriptor, Config::default()).unwrap()
}

/// Emit `nop` until the writer reaches `offset`
pub fn pad_to(mw: &mut MethodWriter<'_, ConstantPool>, offset: usize) {
    assert!(mw.offset() <= offset, "already past {}", offset);
    while mw.offset() < offset {
        mw.emit_insn(NOP).unwrap();
    }
}

/// Every real branch/switch target in `code`, in instruction order. The
/// inverted conditional that only skips a following `goto_w` is left out
/// since its target is not a label.
pub fn branch_targets(code: &[u8]) -> Vec<usize> {
    let insns = walk(code).unwrap();
    let mut targets = Vec::new();
    for (i, insn) in insns.iter().enumerate() {
        let skips_goto_w = opcodes::is_conditional(insn.opcode)
            && insn.branch_offset(code).unwrap() == 8
            && insns.get(i + 1).map(|next| next.opcode) == Some(GOTO_W);
        if skips_goto_w {
            continue;
        }
        targets.extend(insn.targets(code).unwrap());
    }
    targets
}

/// Positions of switch instructions and their operand alignment
pub fn switch_positions(code: &[u8]) -> Vec<(usize, Switch)> {
    walk(code)
        .unwrap()
        .into_iter()
        .filter(|insn| matches!(insn.kind, InsnKind::TableSwitch | InsnKind::LookupSwitch))
        .map(|insn| (insn.pc, Switch::read(code, insn.pc).unwrap()))
        .collect()
}
