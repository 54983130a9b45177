//! Dominators and natural-loop nesting depths.
//!
//! Loop depths feed operand weighting: sites inside loops are costlier to
//! spill. Depths are computed from back edges over an iterative RPO
//! dominator fixpoint.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec;
use alloc::vec::Vec;

use crate::analysis::cfg::ControlFlowGraph;
use crate::entity::{Block, EntityRef};
use crate::method::Method;

const UNDEF: usize = usize::MAX;

/// Immediate-dominator table computed with the iterative RPO algorithm.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// `idom[entry] == entry`; unreachable blocks hold `UNDEF`.
    idom: Vec<usize>,
    rpo_numbers: Vec<u32>,
    entry: usize,
}

impl DominatorTree {
    /// Compute the dominator tree of a CFG snapshot.
    pub fn from_cfg(cfg: &ControlFlowGraph) -> Self {
        let num_blocks = cfg.num_blocks();
        let entry = cfg.entry();
        let rpo = cfg.reverse_post_order();

        // 1-based RPO numbers; 0 marks unreachable blocks.
        let mut rpo_numbers = vec![0u32; num_blocks];
        for (i, &block) in rpo.iter().enumerate() {
            rpo_numbers[block] = (i + 1) as u32;
        }

        let mut idom = vec![UNDEF; num_blocks];
        idom[entry] = entry;
        let mut changed = true;
        while changed {
            changed = false;
            for &block in &rpo {
                if block == entry {
                    continue;
                }
                let mut new_idom = UNDEF;
                for &pred in cfg.predecessors(block) {
                    if rpo_numbers[pred] == 0 || idom[pred] == UNDEF {
                        continue;
                    }
                    new_idom = if new_idom == UNDEF {
                        pred
                    } else {
                        Self::intersect(&idom, &rpo_numbers, pred, new_idom)
                    };
                }
                if new_idom != UNDEF && idom[block] != new_idom {
                    idom[block] = new_idom;
                    changed = true;
                }
            }
        }

        Self {
            idom,
            rpo_numbers,
            entry,
        }
    }

    fn intersect(idom: &[usize], rpo_numbers: &[u32], mut a: usize, mut b: usize) -> usize {
        while a != b {
            while rpo_numbers[a] > rpo_numbers[b] {
                a = idom[a];
            }
            while rpo_numbers[b] > rpo_numbers[a] {
                b = idom[b];
            }
        }
        a
    }

    /// Check if `a` dominates `b`.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        if !self.is_reachable(b) || self.idom[b] == UNDEF && b != self.entry {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            if current == self.entry {
                return false;
            }
            current = self.idom[current];
        }
    }

    /// The immediate dominator of `block`; `None` for the entry and for
    /// unreachable blocks.
    pub fn idom(&self, block: usize) -> Option<usize> {
        if block == self.entry || self.idom[block] == UNDEF {
            None
        } else {
            Some(self.idom[block])
        }
    }

    /// Check if `block` is reachable from the entry.
    pub fn is_reachable(&self, block: usize) -> bool {
        self.rpo_numbers[block] != 0
    }
}

/// Compute natural-loop nesting depths and store them on the blocks.
///
/// Each loop header groups its back edges; the loop body is the union of
/// blocks that reach a back-edge source without passing through the header.
/// A block's depth is the number of loop bodies containing it.
pub fn compute_loop_depths(method: &mut Method) {
    let cfg = ControlFlowGraph::from_method(method);
    let domtree = DominatorTree::from_cfg(&cfg);

    // header -> back edge sources
    let mut back_edges: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for block in 0..cfg.num_blocks() {
        if !domtree.is_reachable(block) {
            continue;
        }
        for &succ in cfg.successors(block) {
            if domtree.is_reachable(succ) && domtree.dominates(succ, block) {
                back_edges.entry(succ).or_default().push(block);
            }
        }
    }

    let mut depths = vec![0u32; cfg.num_blocks()];
    for (&header, sources) in &back_edges {
        let mut body = BTreeSet::new();
        body.insert(header);
        let mut worklist: Vec<usize> = sources.clone();
        while let Some(block) = worklist.pop() {
            if body.insert(block) {
                worklist.extend(cfg.predecessors(block).iter().copied());
            }
        }
        for &block in &body {
            depths[block] += 1;
        }
    }

    for (index, depth) in depths.into_iter().enumerate() {
        method.set_loop_nesting_depth(Block::from_index(index), depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockRole;
    use crate::inst::InstKind;
    use crate::kind::Kind;

    #[test]
    fn test_dominators_of_diamond() {
        let mut method = Method::new();
        let b0 = method.create_block(BlockRole::Normal);
        let b1 = method.create_block(BlockRole::Normal);
        let b2 = method.create_block(BlockRole::Normal);
        let b3 = method.create_block(BlockRole::Normal);
        let cond = method.create_variable(Kind::Int);
        method.append_branch(b0, cond, b1, b2);
        method.append_jump(b1, b3);
        method.append_jump(b2, b3);
        method.append_simple(b3, InstKind::Return);

        let cfg = ControlFlowGraph::from_method(&method);
        let domtree = DominatorTree::from_cfg(&cfg);
        assert!(domtree.dominates(b0.index(), b3.index()));
        assert!(!domtree.dominates(b1.index(), b3.index()));
        assert_eq!(domtree.idom(b3.index()), Some(b0.index()));
    }

    #[test]
    fn test_loop_depths_single_loop() {
        // b0 -> b1 -> b2 -> b1 (loop), b2 -> b3 (exit)
        let mut method = Method::new();
        let b0 = method.create_block(BlockRole::Normal);
        let b1 = method.create_block(BlockRole::Normal);
        let b2 = method.create_block(BlockRole::Normal);
        let b3 = method.create_block(BlockRole::Normal);
        let cond = method.create_variable(Kind::Int);
        method.append_jump(b0, b1);
        method.append_jump(b1, b2);
        method.append_branch(b2, cond, b1, b3);
        method.append_simple(b3, InstKind::Return);

        compute_loop_depths(&mut method);
        assert_eq!(method.block(b0).loop_nesting_depth(), 0);
        assert_eq!(method.block(b1).loop_nesting_depth(), 1);
        assert_eq!(method.block(b2).loop_nesting_depth(), 1);
        assert_eq!(method.block(b3).loop_nesting_depth(), 0);
    }

    #[test]
    fn test_loop_depths_nested() {
        // b0 -> b1 (outer header) -> b2 (inner header) -> b2, b2 -> b1, b1 -> b3
        let mut method = Method::new();
        let b0 = method.create_block(BlockRole::Normal);
        let b1 = method.create_block(BlockRole::Normal);
        let b2 = method.create_block(BlockRole::Normal);
        let b3 = method.create_block(BlockRole::Normal);
        let c1 = method.create_variable(Kind::Int);
        let c2 = method.create_variable(Kind::Int);
        method.append_jump(b0, b1);
        method.append_branch(b1, c1, b2, b3);
        method.append_branch(b2, c2, b2, b1);
        method.append_simple(b3, InstKind::Return);

        compute_loop_depths(&mut method);
        assert_eq!(method.block(b1).loop_nesting_depth(), 1);
        assert_eq!(method.block(b2).loop_nesting_depth(), 2);
        assert_eq!(method.block(b3).loop_nesting_depth(), 0);
    }
}
