//! Labels: branch targets, forward-reference chains and basic-block metadata
//!
//! All labels of one method body live in a single [`Labels`] arena and are
//! named by copyable [`Label`] handles. A label starts out
//! [`Position::Pending`], collecting the sites that jump to it, and turns
//! [`Position::Resolved`] exactly once when it is placed; at that moment every
//! collected site is back-patched. Each label also opens a basic block whose
//! relative stack maximum and outgoing edges feed the max-stack resolver.

use std::sync::atomic::{AtomicU32, Ordering};

use super::byte_vector::ByteVector;
use crate::common::error::{Error, Result};

/// Source of arena tags; lets a writer reject labels created by another one
static NEXT_OWNER: AtomicU32 = AtomicU32::new(1);

/// Handle to a label in a [`Labels`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    owner: u32,
    index: u32,
}

impl Label {
    /// Position of the label in its arena
    pub fn index(self) -> u32 {
        self.index
    }
}

/// A branch or switch operand waiting for its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRef {
    /// Offset of the instruction the branch is relative to
    pub source: usize,
    /// Offset of the operand placeholder
    pub patch_at: usize,
    /// 4-byte operand; 2-byte otherwise
    pub wide: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    Resolved(usize),
    Pending(Vec<PendingRef>),
}

/// Control-flow arc from a block to the block opened by `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub target: Label,
    /// Stack size relative to the start of the source block when jumping
    pub stack_size: i32,
}

/// Stack metadata of the basic block a label opens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockInfo {
    /// Absolute stack size on entry, set once by the resolver
    pub begin_stack_size: Option<i32>,
    /// Highest stack size reached in the block, relative to its start
    pub max_relative: i32,
    pub successors: Vec<Edge>,
}

#[derive(Debug, Clone)]
pub struct LabelNode {
    pub position: Position,
    pub block: BlockInfo,
}

/// A short forward branch whose offset overflowed 16 bits when its target
/// was placed. The operand is left as a placeholder and the real offset is
/// kept here for the resizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarJump {
    pub source: usize,
    pub offset: i32,
}

/// Per-method label arena
#[derive(Debug)]
pub struct Labels {
    owner: u32,
    nodes: Vec<LabelNode>,
}

impl Default for Labels {
    fn default() -> Self {
        Self::new()
    }
}

impl Labels {
    pub fn new() -> Self {
        Self {
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
        }
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label {
            owner: self.owner,
            index: self.nodes.len() as u32,
        };
        self.nodes.push(LabelNode {
            position: Position::Pending(Vec::new()),
            block: BlockInfo::default(),
        });
        label
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn slot(&self, label: Label) -> Result<usize> {
        if label.owner != self.owner || label.index as usize >= self.nodes.len() {
            return Err(Error::ForeignLabel { label: label.index });
        }
        Ok(label.index as usize)
    }

    pub fn node(&self, label: Label) -> Result<&LabelNode> {
        let slot = self.slot(label)?;
        Ok(&self.nodes[slot])
    }

    pub fn node_mut(&mut self, label: Label) -> Result<&mut LabelNode> {
        let slot = self.slot(label)?;
        Ok(&mut self.nodes[slot])
    }

    /// Placed offset, `None` while pending
    pub fn position(&self, label: Label) -> Result<Option<usize>> {
        Ok(match self.node(label)?.position {
            Position::Resolved(pos) => Some(pos),
            Position::Pending(_) => None,
        })
    }

    /// Placed offset, or `UnresolvedLabel`
    pub fn resolved(&self, label: Label) -> Result<usize> {
        self.position(label)?
            .ok_or(Error::UnresolvedLabel { label: label.index })
    }

    /// Write the operand of a branch at `source` that targets `label`.
    /// A placed label gets its offset directly; otherwise a placeholder is
    /// written and the site is remembered.
    pub fn add_reference(
        &mut self,
        label: Label,
        source: usize,
        code: &mut ByteVector,
        wide: bool,
    ) -> Result<()> {
        let patch_at = code.len();
        match &mut self.node_mut(label)?.position {
            Position::Resolved(pos) => {
                let offset = *pos as i64 - source as i64;
                if wide {
                    code.put_i32(i32::try_from(offset).map_err(|_| Error::OffsetOverflow { offset })?);
                } else {
                    code.put_i16(i16::try_from(offset).map_err(|_| Error::OffsetOverflow { offset })?);
                }
            }
            Position::Pending(refs) => {
                refs.push(PendingRef { source, patch_at, wide });
                code.put_zeros(if wide { 4 } else { 2 });
            }
        }
        Ok(())
    }

    /// Resolve `label` at `position` and back-patch its pending references.
    /// Short references that no longer fit are returned instead of patched.
    pub fn place(&mut self, label: Label, position: usize, code: &mut ByteVector) -> Result<Vec<FarJump>> {
        let node = self.node_mut(label)?;
        let refs = match std::mem::replace(&mut node.position, Position::Resolved(position)) {
            Position::Pending(refs) => refs,
            Position::Resolved(previous) => {
                node.position = Position::Resolved(previous);
                return Err(Error::LabelAlreadyPlaced {
                    label: label.index,
                    position: previous,
                });
            }
        };
        let mut far = Vec::new();
        for r in refs {
            let offset = position as i64 - r.source as i64;
            if r.wide {
                let offset = i32::try_from(offset).map_err(|_| Error::OffsetOverflow { offset })?;
                code.patch4(r.patch_at, offset);
            } else if let Ok(short) = i16::try_from(offset) {
                code.patch2(r.patch_at, short);
            } else {
                let offset = i32::try_from(offset).map_err(|_| Error::OffsetOverflow { offset })?;
                far.push(FarJump { source: r.source, offset });
            }
        }
        Ok(far)
    }

    pub fn add_edge(&mut self, from: Label, to: Label, stack_size: i32) -> Result<()> {
        self.slot(to)?;
        self.node_mut(from)?
            .block
            .successors
            .push(Edge { target: to, stack_size });
        Ok(())
    }

    /// First label that still has references waiting on it
    pub fn first_unresolved(&self) -> Option<Label> {
        self.nodes
            .iter()
            .position(|n| matches!(&n.position, Position::Pending(refs) if !refs.is_empty()))
            .map(|index| Label {
                owner: self.owner,
                index: index as u32,
            })
    }

    /// Move every placed label through `remap`
    pub fn remap_positions(&mut self, mut remap: impl FnMut(usize) -> Result<usize>) -> Result<()> {
        for node in &mut self.nodes {
            if let Position::Resolved(pos) = &mut node.position {
                *pos = remap(*pos)?;
            }
        }
        Ok(())
    }

    /// Final offsets of all labels, `None` for those never placed
    pub fn positions(&self) -> Vec<Option<usize>> {
        self.nodes
            .iter()
            .map(|n| match n.position {
                Position::Resolved(pos) => Some(pos),
                Position::Pending(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_reference_is_patched_on_place() {
        let mut labels = Labels::new();
        let mut code = ByteVector::new();
        let target = labels.new_label();
        code.put1(0xa7);
        labels.add_reference(target, 0, &mut code, false).unwrap();
        code.put_zeros(7);
        let far = labels.place(target, code.len(), &mut code).unwrap();
        assert!(far.is_empty());
        assert_eq!(code.get2(1), Some(10));
        assert_eq!(labels.position(target).unwrap(), Some(10));
    }

    #[test]
    fn test_backward_reference_written_immediately() {
        let mut labels = Labels::new();
        let mut code = ByteVector::new();
        let top = labels.new_label();
        labels.place(top, 0, &mut code).unwrap();
        code.put_zeros(5);
        code.put1(0xc8);
        labels.add_reference(top, 5, &mut code, true).unwrap();
        assert_eq!(code.get4(6), Some(-5));
    }

    #[test]
    fn test_overflowing_short_reference_is_reported() {
        let mut labels = Labels::new();
        let mut code = ByteVector::new();
        let target = labels.new_label();
        code.put1(0x99);
        labels.add_reference(target, 0, &mut code, false).unwrap();
        code.put_zeros(40_000);
        let far = labels.place(target, code.len(), &mut code).unwrap();
        assert_eq!(far, vec![FarJump { source: 0, offset: 40_003 }]);
        assert_eq!(code.get2(1), Some(0));
    }

    #[test]
    fn test_place_twice_fails() {
        let mut labels = Labels::new();
        let mut code = ByteVector::new();
        let label = labels.new_label();
        labels.place(label, 0, &mut code).unwrap();
        assert!(matches!(
            labels.place(label, 3, &mut code),
            Err(Error::LabelAlreadyPlaced { position: 0, .. })
        ));
        assert_eq!(labels.position(label).unwrap(), Some(0));
    }

    #[test]
    fn test_foreign_label_rejected() {
        let mut mine = Labels::new();
        let mut theirs = Labels::new();
        mine.new_label();
        let foreign = theirs.new_label();
        assert!(matches!(mine.position(foreign), Err(Error::ForeignLabel { .. })));
    }

    #[test]
    fn test_first_unresolved() {
        let mut labels = Labels::new();
        let mut code = ByteVector::new();
        let unused = labels.new_label();
        let referenced = labels.new_label();
        code.put1(0xa7);
        labels.add_reference(referenced, 0, &mut code, false).unwrap();
        assert_eq!(labels.first_unresolved(), Some(referenced));
        assert_ne!(labels.first_unresolved(), Some(unused));
    }
}
