//! Basic blocks.

use alloc::vec::Vec;
use core::fmt;

use crate::entity::{Block, Inst};
use crate::pool::PoolSet;

/// The role a block plays in the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRole {
    Normal,
    /// Entry block of an exception handler; reached only by exceptional
    /// edges.
    ExceptionDispatcher,
}

/// Per-block data.
///
/// Successor lists are derived from the block's instructions and cached;
/// any edge mutation clears the caches on both endpoints. Predecessors are
/// maintained explicitly as an insertion-stable list.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub(crate) role: BlockRole,
    /// Position in the method's block order; reassigned by block layout.
    pub(crate) serial: u32,
    pub(crate) insts: Vec<Inst>,
    pub(crate) predecessors: Vec<Block>,
    pub(crate) loop_nesting_depth: u32,
    pub(crate) cached_normal_successors: Option<Vec<Block>>,
    pub(crate) cached_all_successors: Option<Vec<Block>>,
    /// Liveness pool-sets for the block-granular dataflow pass.
    pub(crate) live_in: Option<PoolSet>,
    pub(crate) live_out: Option<PoolSet>,
    pub(crate) live_gen: Option<PoolSet>,
    pub(crate) live_kill: Option<PoolSet>,
}

impl BlockData {
    pub(crate) fn new(role: BlockRole, serial: u32) -> Self {
        Self {
            role,
            serial,
            insts: Vec::new(),
            predecessors: Vec::new(),
            loop_nesting_depth: 0,
            cached_normal_successors: None,
            cached_all_successors: None,
            live_in: None,
            live_out: None,
            live_gen: None,
            live_kill: None,
        }
    }

    /// The role of this block.
    pub fn role(&self) -> BlockRole {
        self.role
    }

    /// The block's serial in the method's current block order.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Instructions in order.
    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    /// Number of instructions.
    pub fn inst_count(&self) -> usize {
        self.insts.len()
    }

    /// Predecessor blocks, in insertion order.
    pub fn predecessors(&self) -> &[Block] {
        &self.predecessors
    }

    /// How many loops enclose this block.
    pub fn loop_nesting_depth(&self) -> u32 {
        self.loop_nesting_depth
    }

    /// Variables live on entry, if block liveness has been computed.
    pub fn live_in(&self) -> Option<&PoolSet> {
        self.live_in.as_ref()
    }

    /// Variables live on exit, if block liveness has been computed.
    pub fn live_out(&self) -> Option<&PoolSet> {
        self.live_out.as_ref()
    }

    /// Variables read before being written in this block.
    pub fn live_gen(&self) -> Option<&PoolSet> {
        self.live_gen.as_ref()
    }

    /// Variables written in this block.
    pub fn live_kill(&self) -> Option<&PoolSet> {
        self.live_kill.as_ref()
    }

    pub(crate) fn clear_successor_caches(&mut self) {
        self.cached_normal_successors = None;
        self.cached_all_successors = None;
    }
}

impl fmt::Display for BlockRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRole::Normal => write!(f, "normal"),
            BlockRole::ExceptionDispatcher => write!(f, "dispatcher"),
        }
    }
}
