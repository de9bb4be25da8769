//! Instruction walker over an encoded code buffer

use super::byte_vector::{read_i16, read_i32};
use super::opcodes::{self, InsnKind};
use crate::common::error::{Error, Result};

/// Padding after a switch opcode at `pc` that 4-byte aligns its operands
pub fn switch_padding(pc: usize) -> usize {
    3 - (pc & 3)
}

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insn {
    pub pc: usize,
    pub opcode: u8,
    pub kind: InsnKind,
    pub len: usize,
}

impl Insn {
    pub fn end(&self) -> usize {
        self.pc + self.len
    }

    pub fn mnemonic(&self) -> &'static str {
        opcodes::mnemonic(self.opcode)
    }

    pub fn is_switch(&self) -> bool {
        matches!(self.kind, InsnKind::TableSwitch | InsnKind::LookupSwitch)
    }

    /// Offset stored in a branch instruction
    pub fn branch_offset(&self, code: &[u8]) -> Result<i32> {
        match self.kind {
            InsnKind::Jump => read_i16(code, self.pc + 1).map(i32::from),
            InsnKind::JumpWide => read_i32(code, self.pc + 1),
            _ => return Err(Error::malformed(self.pc, "not a branch")),
        }
        .ok_or_else(|| Error::malformed(self.pc, "truncated branch"))
    }

    /// Absolute targets of a branch or switch; empty for other instructions
    pub fn targets(&self, code: &[u8]) -> Result<Vec<usize>> {
        let offsets = match self.kind {
            InsnKind::Jump | InsnKind::JumpWide => vec![self.branch_offset(code)?],
            InsnKind::TableSwitch | InsnKind::LookupSwitch => {
                let switch = Switch::read(code, self.pc)?;
                std::iter::once(switch.default).chain(switch.offsets).collect()
            }
            _ => return Ok(Vec::new()),
        };
        offsets
            .into_iter()
            .map(|offset| {
                let target = self.pc as i64 + offset as i64;
                usize::try_from(target).map_err(|_| Error::malformed(self.pc, "branch before start of code"))
            })
            .collect()
    }
}

/// Switch operands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    pub default: i32,
    /// `(low, high)` for `tableswitch`, `None` for `lookupswitch`
    pub range: Option<(i32, i32)>,
    /// Match keys of a `lookupswitch`
    pub keys: Vec<i32>,
    pub offsets: Vec<i32>,
}

impl Switch {
    pub fn read(code: &[u8], pc: usize) -> Result<Self> {
        let truncated = || Error::malformed(pc, "truncated switch");
        let mut at = pc + 1 + switch_padding(pc);
        let mut next = || -> Result<i32> {
            let value = read_i32(code, at).ok_or_else(truncated)?;
            at += 4;
            Ok(value)
        };
        let default = next()?;
        match code.get(pc).copied() {
            Some(opcodes::TABLESWITCH) => {
                let low = next()?;
                let high = next()?;
                if high < low {
                    return Err(Error::malformed(pc, "tableswitch high below low"));
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                let remaining = code.len().saturating_sub(pc + 1 + switch_padding(pc) + 12);
                if count.checked_mul(4).map_or(true, |len| len > remaining) {
                    return Err(truncated());
                }
                let offsets = (0..count).map(|_| next()).collect::<Result<Vec<_>>>()?;
                Ok(Self { default, range: Some((low, high)), keys: Vec::new(), offsets })
            }
            Some(opcodes::LOOKUPSWITCH) => {
                let npairs = next()?;
                let npairs = usize::try_from(npairs).map_err(|_| Error::malformed(pc, "negative npairs"))?;
                // each pair is 8 bytes; refuse counts the buffer cannot hold
                let remaining = code.len().saturating_sub(pc + 1 + switch_padding(pc) + 8);
                if npairs.checked_mul(8).map_or(true, |len| len > remaining) {
                    return Err(truncated());
                }
                let mut keys = Vec::with_capacity(npairs);
                let mut offsets = Vec::with_capacity(npairs);
                for _ in 0..npairs {
                    keys.push(next()?);
                    offsets.push(next()?);
                }
                Ok(Self { default, range: None, keys, offsets })
            }
            _ => Err(Error::malformed(pc, "not a switch")),
        }
    }

    /// Encoded size of the switch when its opcode sits at `pc`
    pub fn encoded_len(&self, pc: usize) -> usize {
        let body = match self.range {
            Some(_) => 12 + 4 * self.offsets.len(),
            None => 8 + 8 * self.offsets.len(),
        };
        1 + switch_padding(pc) + body
    }
}

/// Decode the instruction starting at `pc`
pub fn decode_at(code: &[u8], pc: usize) -> Result<Insn> {
    let opcode = *code.get(pc).ok_or_else(|| Error::malformed(pc, "pc past end of code"))?;
    let kind = opcodes::kind(opcode);
    let len = match kind {
        InsnKind::Invalid => return Err(Error::malformed(pc, format!("invalid opcode 0x{:02x}", opcode))),
        InsnKind::Wide => match code.get(pc + 1) {
            Some(&opcodes::IINC) => 6,
            Some(_) => 4,
            None => return Err(Error::malformed(pc, "truncated wide")),
        },
        InsnKind::TableSwitch | InsnKind::LookupSwitch => Switch::read(code, pc)?.encoded_len(pc),
        _ => kind.fixed_size().unwrap_or(1),
    };
    if pc + len > code.len() {
        return Err(Error::malformed(pc, format!("truncated {}", opcodes::mnemonic(opcode))));
    }
    Ok(Insn { pc, opcode, kind, len })
}

/// Decode a whole buffer
pub fn walk(code: &[u8]) -> Result<Vec<Insn>> {
    let mut insns = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let insn = decode_at(code, pc)?;
        pc = insn.end();
        insns.push(insn);
    }
    Ok(insns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::opcodes::*;

    #[test]
    fn test_walk_fixed_width() {
        let code = [BIPUSH, 5, SIPUSH, 1, 0, IADD, ILOAD_0, WIDE, IINC, 1, 0, 0, 1, RETURN];
        let insns = walk(&code).unwrap();
        let pcs: Vec<usize> = insns.iter().map(|i| i.pc).collect();
        assert_eq!(pcs, vec![0, 2, 5, 6, 7, 13]);
        assert_eq!(insns[4].len, 6);
    }

    #[test]
    fn test_branch_targets() {
        let code = [NOP, GOTO, 0xff, 0xff, RETURN];
        let insns = walk(&code).unwrap();
        assert_eq!(insns[1].targets(&code).unwrap(), vec![0]);
    }

    #[test]
    fn test_tableswitch_layout() {
        // opcode at 1, padding 2, default, low 0, high 1, two offsets
        let mut code = vec![NOP, TABLESWITCH, 0, 0];
        for v in [27i32, 0, 1, 23, 25] {
            code.extend_from_slice(&v.to_be_bytes());
        }
        code.extend_from_slice(&[RETURN, RETURN, RETURN, RETURN]);
        let insn = decode_at(&code, 1).unwrap();
        assert_eq!(insn.len, 23);
        assert_eq!(insn.targets(&code).unwrap(), vec![28, 24, 26]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(walk(&[0xee]).is_err());
        assert!(walk(&[GOTO, 0]).is_err());
        assert!(walk(&[LOOKUPSWITCH, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn test_switch_counts_past_end_of_code() {
        let huge_lookup = [LOOKUPSWITCH, 0, 0, 0, 0, 0, 0, 0, 0x7f, 0xff, 0xff, 0xff];
        assert!(matches!(walk(&huge_lookup), Err(Error::MalformedCode { pc: 0, .. })));

        // low i32::MIN, high i32::MAX
        let mut huge_table = vec![TABLESWITCH, 0, 0, 0, 0, 0, 0, 0];
        huge_table.extend_from_slice(&i32::MIN.to_be_bytes());
        huge_table.extend_from_slice(&i32::MAX.to_be_bytes());
        assert!(matches!(walk(&huge_table), Err(Error::MalformedCode { pc: 0, .. })));

        // one pair claimed, none present
        let short_lookup = [LOOKUPSWITCH, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        assert!(walk(&short_lookup).is_err());
    }
}
