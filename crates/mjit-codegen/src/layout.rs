//! Block layout.
//!
//! Reorders blocks for fall-through-optimal code: runs of blocks linked by
//! unconditional jumps are chained into straight lines, exception
//! dispatchers are laid out before the remaining normal blocks, and the
//! block holding the shared epilogue goes last. Edge semantics are
//! untouched; only the order (and the serials that mirror it) changes.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use mjit_ir::{Block, BlockRole, InstKind, Method};

use crate::methodgen::MethodGeneration;

/// Reorder the method's blocks and reassign serials 0..N-1.
pub fn rearrange_blocks(generation: &mut MethodGeneration) {
    let epilogue = generation.epilogue_block();
    let method = generation.method_mut();
    let original: Vec<Block> = method.block_order().to_vec();
    if original.is_empty() {
        return;
    }

    let mut rest: BTreeSet<Block> = original.iter().copied().collect();
    let mut result: Vec<Block> = Vec::new();

    let head = gather_unconditional_successors(method, original[0], &mut rest, &mut result);

    let mut tail: Vec<Block> = Vec::new();
    if let Some(epilogue) = epilogue {
        gather_unconditional_predecessors(method, epilogue, &mut rest, &mut tail);
    }
    if let Some(head) = head {
        gather_successors(method, head, &mut rest, &mut result);
    }

    for &block in &original {
        if method.block(block).role() == BlockRole::ExceptionDispatcher {
            let last = gather_unconditional_successors(method, block, &mut rest, &mut result);
            if let Some(last) = last {
                gather_successors(method, last, &mut rest, &mut result);
            }
        }
    }
    for &block in &original {
        if method.block(block).role() != BlockRole::ExceptionDispatcher {
            let last = gather_unconditional_successors(method, block, &mut rest, &mut result);
            if let Some(last) = last {
                gather_successors(method, last, &mut rest, &mut result);
            }
        }
    }

    result.extend(tail);
    #[cfg(feature = "debug-codegen")]
    crate::debug_codegen!("rearrange_blocks: {} blocks reordered", result.len());
    method.set_block_order(result);
}

/// The jump target of `block`'s last instruction, if it ends in an
/// unconditional jump.
fn unconditional_target(method: &Method, block: Block) -> Option<Block> {
    let last = *method.block(block).insts().last()?;
    match method.inst(last).kind() {
        InstKind::Jump { target } => Some(*target),
        _ => None,
    }
}

/// The successor the last instruction of `block` would prefer to fall
/// through to, restricted to unplaced blocks.
fn select_successor(method: &Method, block: Block, rest: &BTreeSet<Block>) -> Option<Block> {
    let last = *method.block(block).insts().last()?;
    match method.inst(last).kind() {
        InstKind::Jump { target } if rest.contains(target) => Some(*target),
        InstKind::Branch {
            target_true,
            target_false,
            ..
        } => {
            // The false edge is the natural fall-through.
            if rest.contains(target_false) {
                Some(*target_false)
            } else if rest.contains(target_true) {
                Some(*target_true)
            } else {
                None
            }
        }
        InstKind::Switch(data) => {
            if rest.contains(&data.default_target) {
                Some(data.default_target)
            } else {
                data.targets.iter().copied().find(|t| rest.contains(t))
            }
        }
        _ => None,
    }
}

/// Chain through unconditional jumps starting at `start`, appending every
/// unplaced block on the way. Returns the block whose successors should be
/// gathered next.
fn gather_unconditional_successors(
    method: &Method,
    start: Block,
    rest: &mut BTreeSet<Block>,
    result: &mut Vec<Block>,
) -> Option<Block> {
    let mut block = start;
    while rest.remove(&block) {
        result.push(block);
        match unconditional_target(method, block) {
            Some(target) => block = target,
            None => return select_successor(method, block, rest),
        }
    }
    select_successor(method, block, rest)
}

/// Append preferred-successor chains starting at `start`.
fn gather_successors(
    method: &Method,
    start: Block,
    rest: &mut BTreeSet<Block>,
    result: &mut Vec<Block>,
) {
    let mut block = start;
    while rest.remove(&block) {
        result.push(block);
        match select_successor(method, block, rest) {
            Some(next) => block = next,
            None => break,
        }
    }
}

/// An unplaced predecessor that reaches `block` through an unconditional
/// jump, if any.
fn select_unconditional_predecessor(
    method: &Method,
    block: Block,
    rest: &BTreeSet<Block>,
) -> Option<Block> {
    for &pred in method.block(block).predecessors() {
        if rest.contains(&pred) && unconditional_target(method, pred) == Some(block) {
            return Some(pred);
        }
    }
    None
}

/// Build the tail chain ending at `end`: predecessors linked by
/// unconditional jumps are prepended so the epilogue run stays
/// straight-line.
fn gather_unconditional_predecessors(
    method: &Method,
    end: Block,
    rest: &mut BTreeSet<Block>,
    tail: &mut Vec<Block>,
) {
    let mut block = end;
    loop {
        if !rest.remove(&block) {
            break;
        }
        tail.insert(0, block);
        match select_unconditional_predecessor(method, block, rest) {
            Some(pred) => block = pred,
            None => break,
        }
    }
}
