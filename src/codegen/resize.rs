//! Fixed-point branch offset resizing
//!
//! Short branches are emitted optimistically with 16-bit offsets. When a
//! target ends up out of range the branch must grow: `goto`/`jsr` become
//! `goto_w`/`jsr_w` (+2 bytes) and a conditional becomes the inverted
//! condition jumping over a `goto_w` (+5 bytes). Growing one site shifts
//! everything after it, which can push further branches out of range and
//! move switches to a different 4-byte alignment, so [`plan`] iterates until
//! a pass changes nothing. [`apply`] then rewrites the buffer in one go.

use std::collections::{BTreeSet, HashMap};

use super::byte_vector::{read_i16, ByteVector};
use super::decode::{switch_padding, walk, Insn, Switch};
use super::opcodes::{self, InsnKind, GOTO_W};
use crate::common::error::{Error, Result};

/// Growth of one instruction. `site` is the offset just past the
/// instruction in the original buffer; several entries may share a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeEntry {
    pub site: usize,
    pub delta: i32,
}

/// Outcome of the fixed-point iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizePlan {
    pub entries: Vec<ResizeEntry>,
    /// Original offsets of the short branches that get the long form
    pub widened: BTreeSet<usize>,
    pub passes: usize,
}

impl ResizePlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of bytes added
    pub fn growth(&self) -> i64 {
        self.entries.iter().map(|e| e.delta as i64).sum()
    }

    /// New location of original offset `pos`
    pub fn remap(&self, pos: usize) -> Result<usize> {
        remap(&self.entries, pos)
    }
}

/// Distance from `begin` to `end` once every entry is applied. An entry
/// counts when its site lies in `(begin, end]`, or negatively in
/// `(end, begin]` for backward distances.
pub fn new_offset(entries: &[ResizeEntry], begin: usize, end: usize) -> i64 {
    let mut offset = end as i64 - begin as i64;
    for entry in entries {
        if begin < entry.site && entry.site <= end {
            offset += entry.delta as i64;
        } else if end < entry.site && entry.site <= begin {
            offset -= entry.delta as i64;
        }
    }
    offset
}

/// New location of the original offset `pos`
pub fn remap(entries: &[ResizeEntry], pos: usize) -> Result<usize> {
    let moved = new_offset(entries, 0, pos);
    usize::try_from(moved).map_err(|_| Error::malformed(pos, "offset remapped below zero"))
}

#[derive(Debug, Clone, Copy)]
enum Site {
    Branch {
        pc: usize,
        end: usize,
        target: usize,
        unconditional: bool,
    },
    Switch {
        pc: usize,
        end: usize,
    },
}

/// Real offset of a short branch: the placeholder of an overflowed forward
/// branch holds zero, so those come from `far_jumps`
fn short_offset(code: &[u8], far_jumps: &HashMap<usize, i32>, insn: &Insn) -> Result<i32> {
    if let Some(&offset) = far_jumps.get(&insn.pc) {
        return Ok(offset);
    }
    read_i16(code, insn.pc + 1)
        .map(i32::from)
        .ok_or_else(|| Error::malformed(insn.pc, "truncated branch"))
}

fn target_of(insn: &Insn, offset: i32) -> Result<usize> {
    usize::try_from(insn.pc as i64 + offset as i64)
        .map_err(|_| Error::malformed(insn.pc, "branch before start of code"))
}

fn collect_sites(code: &[u8], far_jumps: &HashMap<usize, i32>) -> Result<Vec<Site>> {
    let mut sites = Vec::new();
    for insn in walk(code)? {
        match insn.kind {
            InsnKind::Jump => {
                let offset = short_offset(code, far_jumps, &insn)?;
                sites.push(Site::Branch {
                    pc: insn.pc,
                    end: insn.end(),
                    target: target_of(&insn, offset)?,
                    unconditional: opcodes::widen_unconditional(insn.opcode).is_some(),
                });
            }
            InsnKind::TableSwitch | InsnKind::LookupSwitch => sites.push(Site::Switch {
                pc: insn.pc,
                end: insn.end(),
            }),
            _ => {}
        }
    }
    Ok(sites)
}

/// Find every site that has to grow (or re-pad) so that all offsets fit.
/// Gives up with `ResizeDidNotConverge` after `max_passes` passes, or a
/// bound derived from the number of sites when `None`.
pub fn plan(code: &[u8], far_jumps: &HashMap<usize, i32>, max_passes: Option<usize>) -> Result<ResizePlan> {
    let sites = collect_sites(code, far_jumps)?;
    let max_passes = max_passes.unwrap_or(2 * (sites.len() + 1) + 1);

    let mut entries: Vec<ResizeEntry> = Vec::new();
    let mut widened = BTreeSet::new();
    // switch pc -> index of its padding entry
    let mut padding: HashMap<usize, usize> = HashMap::new();
    let mut passes = 0;

    loop {
        if passes == max_passes {
            return Err(Error::ResizeDidNotConverge { passes });
        }
        passes += 1;
        let mut changed = false;

        for site in &sites {
            match *site {
                Site::Branch { pc, end, target, unconditional } => {
                    if widened.contains(&pc) {
                        continue;
                    }
                    let offset = new_offset(&entries, pc, target);
                    if offset < i16::MIN as i64 || offset > i16::MAX as i64 {
                        let delta = if unconditional { 2 } else { 5 };
                        log::trace!("resize pass {}: branch at {} needs {} bytes (offset {})", passes, pc, delta, offset);
                        entries.push(ResizeEntry { site: end, delta });
                        widened.insert(pc);
                        changed = true;
                    }
                }
                Site::Switch { pc, end } => {
                    let moved = remap(&entries, pc)?;
                    let wanted = switch_padding(moved) as i32 - switch_padding(pc) as i32;
                    match padding.get(&pc).copied() {
                        Some(index) if entries[index].delta != wanted => {
                            log::trace!("resize pass {}: switch at {} padding delta {} -> {}", passes, pc, entries[index].delta, wanted);
                            entries[index].delta = wanted;
                            changed = true;
                        }
                        Some(_) => {}
                        None if wanted != 0 => {
                            log::trace!("resize pass {}: switch at {} padding delta {}", passes, pc, wanted);
                            padding.insert(pc, entries.len());
                            entries.push(ResizeEntry { site: end, delta: wanted });
                            changed = true;
                        }
                        None => {}
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    entries.retain(|e| e.delta != 0);
    log::debug!(
        "resize converged after {} passes: {} entries, {} widened branches",
        passes,
        entries.len(),
        widened.len()
    );
    Ok(ResizePlan { entries, widened, passes })
}

fn fit_i32(offset: i64) -> Result<i32> {
    i32::try_from(offset).map_err(|_| Error::OffsetOverflow { offset })
}

/// Rewrite `code` according to `plan`: widen the planned branches, re-pad
/// switches and recompute every branch and switch offset.
pub fn apply(code: &[u8], far_jumps: &HashMap<usize, i32>, plan: &ResizePlan) -> Result<Vec<u8>> {
    let entries = &plan.entries;
    let capacity = (code.len() as i64 + plan.growth()).max(0) as usize;
    let mut out = ByteVector::with_capacity(capacity);

    for insn in walk(code)? {
        let new_pc = out.len();
        if new_pc != remap(entries, insn.pc)? {
            return Err(Error::malformed(insn.pc, "resize plan does not match code layout"));
        }
        match insn.kind {
            InsnKind::Jump => {
                let target = target_of(&insn, short_offset(code, far_jumps, &insn)?)?;
                let offset = new_offset(entries, insn.pc, target);
                if plan.widened.contains(&insn.pc) {
                    if let Some(wide) = opcodes::widen_unconditional(insn.opcode) {
                        out.put1(wide).put_i32(fit_i32(offset)?);
                    } else {
                        let inverted = opcodes::negate(insn.opcode)
                            .ok_or_else(|| Error::malformed(insn.pc, "branch cannot be inverted"))?;
                        // inverted branch skips itself (3) and the goto_w (5)
                        out.put1(inverted).put_i16(8);
                        out.put1(GOTO_W).put_i32(fit_i32(offset - 3)?);
                    }
                } else {
                    let short = i16::try_from(offset)
                        .map_err(|_| Error::malformed(insn.pc, "short branch out of range after resize"))?;
                    out.put1(insn.opcode).put_i16(short);
                }
            }
            InsnKind::JumpWide => {
                let target = target_of(&insn, insn.branch_offset(code)?)?;
                out.put1(insn.opcode).put_i32(fit_i32(new_offset(entries, insn.pc, target))?);
            }
            InsnKind::TableSwitch | InsnKind::LookupSwitch => {
                let switch = Switch::read(code, insn.pc)?;
                let relocate = |offset: i32| -> Result<i32> {
                    let target = target_of(&insn, offset)?;
                    fit_i32(new_offset(entries, insn.pc, target))
                };
                out.put1(insn.opcode).put_zeros(switch_padding(new_pc));
                out.put_i32(relocate(switch.default)?);
                match switch.range {
                    Some((low, high)) => {
                        out.put_i32(low).put_i32(high);
                        for &offset in &switch.offsets {
                            out.put_i32(relocate(offset)?);
                        }
                    }
                    None => {
                        out.put_i32(switch.offsets.len() as i32);
                        for (&key, &offset) in switch.keys.iter().zip(&switch.offsets) {
                            out.put_i32(key).put_i32(relocate(offset)?);
                        }
                    }
                }
            }
            _ => {
                out.put_bytes(&code[insn.pc..insn.end()]);
            }
        }
    }

    let expected = code.len() as i64 + plan.growth();
    if out.len() as i64 != expected {
        return Err(Error::malformed(code.len(), "resized code length mismatch"));
    }
    Ok(out.into_vec())
}
