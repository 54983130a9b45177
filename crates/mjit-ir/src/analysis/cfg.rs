//! Control flow graph snapshot and traversals.

use alloc::collections::BTreeSet;
use alloc::vec;
use alloc::vec::Vec;

use crate::entity::{Block, EntityRef};
use crate::method::Method;

/// An immutable snapshot of a method's block graph.
///
/// Edges include exceptional edges (try → catch), so reachability covers
/// exception dispatchers. The snapshot is keyed by block entity index and
/// goes stale if edges are mutated afterwards.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    predecessors: Vec<BTreeSet<usize>>,
    successors: Vec<BTreeSet<usize>>,
    entry: usize,
    num_blocks: usize,
}

impl ControlFlowGraph {
    /// Build a CFG snapshot from a method.
    pub fn from_method(method: &Method) -> Self {
        let num_blocks = method.block_count();
        let mut predecessors = vec![BTreeSet::new(); num_blocks];
        let mut successors = vec![BTreeSet::new(); num_blocks];

        for &block in method.block_order() {
            for succ in method.collect_all_successors(block) {
                successors[block.index()].insert(succ.index());
                predecessors[succ.index()].insert(block.index());
            }
        }

        let entry = method.entry_block().map(|b| b.index()).unwrap_or(0);
        Self {
            predecessors,
            successors,
            entry,
            num_blocks,
        }
    }

    /// Number of blocks in the snapshot.
    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// The entry block index.
    pub fn entry(&self) -> usize {
        self.entry
    }

    /// Predecessors of a block.
    pub fn predecessors(&self, block: usize) -> &BTreeSet<usize> {
        &self.predecessors[block]
    }

    /// Successors of a block.
    pub fn successors(&self, block: usize) -> &BTreeSet<usize> {
        &self.successors[block]
    }

    /// Blocks in reverse post-order from the entry.
    pub fn reverse_post_order(&self) -> Vec<usize> {
        let mut visited = BTreeSet::new();
        let mut post_order = Vec::new();
        self.post_order_from(self.entry, &mut visited, &mut post_order);
        post_order.reverse();
        post_order
    }

    fn post_order_from(
        &self,
        block: usize,
        visited: &mut BTreeSet<usize>,
        post_order: &mut Vec<usize>,
    ) {
        if !visited.insert(block) {
            return;
        }
        for &succ in self.successors(block) {
            self.post_order_from(succ, visited, post_order);
        }
        post_order.push(block);
    }

    /// Check if a block is reachable from the entry.
    pub fn is_reachable(&self, block: usize) -> bool {
        if block >= self.num_blocks {
            return false;
        }
        let mut visited = BTreeSet::new();
        let mut worklist = vec![self.entry];
        while let Some(current) = worklist.pop() {
            if current == block {
                return true;
            }
            if visited.insert(current) {
                worklist.extend(self.successors(current).iter().copied());
            }
        }
        false
    }

    /// Map an index back to its block entity.
    pub fn block(&self, index: usize) -> Block {
        Block::from_index(index)
    }
}
