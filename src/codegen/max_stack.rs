//! Maximum operand stack depth from per-block relative maxima

use super::label::{Label, Labels};
use crate::common::error::Result;

/// Walk the block graph from `roots` (each with its absolute entry depth)
/// and return the deepest stack reached anywhere.
///
/// A block's entry depth is taken from the first edge that reaches it; for
/// verifiable code every path into a block carries the same depth. Edges are
/// consumed by the walk.
pub fn resolve_max_stack(labels: &mut Labels, roots: &[(Label, i32)]) -> Result<i32> {
    let mut worklist = Vec::with_capacity(roots.len());
    for &(label, begin) in roots {
        let block = &mut labels.node_mut(label)?.block;
        if block.begin_stack_size.is_none() {
            block.begin_stack_size = Some(begin);
            worklist.push(label);
        }
    }

    let mut max = 0;
    let mut visited = 0usize;
    while let Some(label) = worklist.pop() {
        visited += 1;
        let block = &mut labels.node_mut(label)?.block;
        let begin = block.begin_stack_size.unwrap_or_default();
        max = max.max(begin + block.max_relative);
        let successors = std::mem::take(&mut block.successors);
        for edge in successors {
            let target = &mut labels.node_mut(edge.target)?.block;
            if target.begin_stack_size.is_none() {
                target.begin_stack_size = Some(begin + edge.stack_size);
                worklist.push(edge.target);
            }
        }
    }
    log::trace!("max stack {} over {} reachable blocks", max, visited);
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(labels: &mut Labels, max_relative: i32) -> Label {
        let label = labels.new_label();
        labels.node_mut(label).unwrap().block.max_relative = max_relative;
        label
    }

    #[test]
    fn test_single_block() {
        let mut labels = Labels::new();
        let entry = block(&mut labels, 3);
        assert_eq!(resolve_max_stack(&mut labels, &[(entry, 0)]).unwrap(), 3);
    }

    #[test]
    fn test_depth_accumulates_along_edges() {
        let mut labels = Labels::new();
        let a = block(&mut labels, 2);
        let b = block(&mut labels, 1);
        let c = block(&mut labels, 4);
        labels.add_edge(a, b, 2).unwrap();
        labels.add_edge(b, c, 1).unwrap();
        // c starts at 3 and reaches 3 + 4
        assert_eq!(resolve_max_stack(&mut labels, &[(a, 0)]).unwrap(), 7);
        assert_eq!(labels.node(c).unwrap().block.begin_stack_size, Some(3));
    }

    #[test]
    fn test_first_edge_wins_and_loops_terminate() {
        let mut labels = Labels::new();
        let entry = block(&mut labels, 1);
        let head = block(&mut labels, 2);
        let body = block(&mut labels, 1);
        labels.add_edge(entry, head, 0).unwrap();
        labels.add_edge(head, body, 0).unwrap();
        labels.add_edge(body, head, 0).unwrap();
        assert_eq!(resolve_max_stack(&mut labels, &[(entry, 0)]).unwrap(), 2);
    }

    #[test]
    fn test_handler_root_and_unreachable_block() {
        let mut labels = Labels::new();
        let entry = block(&mut labels, 1);
        let handler = block(&mut labels, 2);
        let dead = block(&mut labels, 50);
        assert_eq!(
            resolve_max_stack(&mut labels, &[(entry, 0), (handler, 1)]).unwrap(),
            3
        );
        assert_eq!(labels.node(dead).unwrap().block.begin_stack_size, None);
    }
}
