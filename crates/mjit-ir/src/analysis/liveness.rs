//! Live range computation.
//!
//! Liveness is recorded per variable as a bit-set per block of length
//! `inst_count + 1`; the trailing bit means "live past the block's last
//! instruction into every successor". The protocol is two-phase: all
//! definition sites are recorded first, then every use site extends a
//! covered run backwards, recursing into predecessors when a run reaches
//! the block entry. [`compute_liveness`] is the single entry point and
//! orders the phases internally.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::mem;

use crate::entity::{Block, Value};
use crate::inst::InstPoint;
use crate::method::Method;
use crate::pool::BitVec;

/// The set of program points at which one variable is live.
#[derive(Debug, Clone, Default)]
pub struct LiveRange {
    coverage: BTreeMap<Block, BitVec>,
}

impl LiveRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.coverage.clear();
    }

    /// Check if the range covers instruction `index` of `block`. Index
    /// `inst_count` queries the live-out bit.
    pub fn covers(&self, block: Block, index: usize) -> bool {
        self.coverage
            .get(&block)
            .is_some_and(|bits| bits.contains(index))
    }

    /// Check if the variable is live past the last instruction of `block`.
    pub fn is_live_out(&self, block: Block, inst_count: usize) -> bool {
        self.covers(block, inst_count)
    }

    /// Check if the range touches `block` at all.
    pub fn covers_block(&self, block: Block) -> bool {
        self.coverage.get(&block).is_some_and(|bits| !bits.is_empty())
    }

    /// Blocks with any coverage, in block order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.coverage
            .iter()
            .filter(|(_, bits)| !bits.is_empty())
            .map(|(b, _)| *b)
    }

    /// The per-block bits, if the block is touched.
    pub fn block_bits(&self, block: Block) -> Option<&BitVec> {
        self.coverage.get(&block)
    }

    fn set(&mut self, block: Block, index: usize) {
        self.coverage.entry(block).or_default().insert(index);
    }

    /// Union `other` into this range: bit-set OR per shared block, plus
    /// adoption of blocks present only in `other`.
    pub fn add(&mut self, other: &LiveRange) {
        for (&block, bits) in &other.coverage {
            self.coverage.entry(block).or_default().union_with(bits);
        }
    }

    /// Exact equality: identical block coverage and identical bits per
    /// block.
    pub fn same_as(&self, other: &LiveRange) -> bool {
        let empty = BitVec::new();
        let keys = self.coverage.keys().chain(other.coverage.keys());
        for &block in keys {
            let a = self.coverage.get(&block).unwrap_or(&empty);
            let b = other.coverage.get(&block).unwrap_or(&empty);
            if !a.same_bits(b) {
                return false;
            }
        }
        true
    }
}

/// Record a definition of `variable` at `at`. All definitions of a
/// variable must be recorded before any of its uses.
pub fn record_definition(method: &mut Method, variable: Value, at: InstPoint) {
    let mut range = take_range(method, variable);
    range.set(at.block, at.index);
    put_range(method, variable, range);
}

/// Record a use of `variable` at `at`, extending covered runs backwards
/// and propagating into predecessors when a run reaches a block entry.
/// Aliased variables are transitively marked used at the same point.
pub fn record_use(method: &mut Method, variable: Value, at: InstPoint) {
    let mut closure = Vec::new();
    alias_closure(method, variable, &mut closure);
    for value in closure {
        record_use_one(method, value, at);
    }
}

fn alias_closure(method: &Method, variable: Value, out: &mut Vec<Value>) {
    if out.contains(&variable) {
        return;
    }
    out.push(variable);
    let aliases: Vec<Value> = method
        .value(variable)
        .variable()
        .map(|v| v.aliases().to_vec())
        .unwrap_or_default();
    for alias in aliases {
        alias_closure(method, alias, out);
    }
}

fn record_use_one(method: &mut Method, variable: Value, at: InstPoint) {
    let mut range = take_range(method, variable);
    let mut worklist = alloc::vec![(at.block, at.index)];
    while let Some((block, start)) = worklist.pop() {
        let mut index = start;
        loop {
            if range.covers(block, index) {
                break;
            }
            range.set(block, index);
            if index == 0 {
                for &pred in method.block(block).predecessors() {
                    let live_out_bit = method.block(pred).inst_count();
                    worklist.push((pred, live_out_bit));
                }
                break;
            }
            index -= 1;
        }
    }
    put_range(method, variable, range);
}

fn take_range(method: &mut Method, variable: Value) -> LiveRange {
    let data = method
        .value_mut(variable)
        .variable_mut()
        .expect("live ranges are only recorded for variables");
    mem::take(&mut data.live_range)
}

fn put_range(method: &mut Method, variable: Value, range: LiveRange) {
    let data = method
        .value_mut(variable)
        .variable_mut()
        .expect("live ranges are only recorded for variables");
    data.live_range = range;
}

/// Recompute every variable's live range and every instruction's
/// live-variable set from the operands currently in the method.
///
/// Definition sites are recorded before use sites regardless of iteration
/// order, so callers cannot get the phase ordering wrong.
pub fn compute_liveness(method: &mut Method) {
    // Reset.
    for i in 0..method.variables().len() {
        let variable = method.variables()[i];
        let data = method
            .value_mut(variable)
            .variable_mut()
            .expect("variable pool entry is not a variable");
        data.live_range.clear();
    }

    // Collect all operand sites.
    let mut definitions: Vec<(Value, InstPoint)> = Vec::new();
    let mut uses: Vec<(Value, InstPoint)> = Vec::new();
    for &block in &method.block_order().to_vec() {
        for index in 0..method.block(block).inst_count() {
            let inst = method.inst_at(block, index);
            let at = InstPoint::new(block, index);
            for op in method.inst(inst).kind().operands() {
                let data = method.operand(op);
                let Some(value) = data.value() else { continue };
                if !method.value(value).is_variable() {
                    continue;
                }
                if data.effect().writes() {
                    definitions.push((value, at));
                }
                if data.effect().reads() {
                    uses.push((value, at));
                }
            }
        }
    }

    // Phase 1: definitions. Phase 2: uses.
    for (value, at) in definitions {
        record_definition(method, value, at);
    }
    for (value, at) in uses {
        record_use(method, value, at);
    }

    populate_instruction_live_sets(method);
}

/// Rebuild each instruction's live-variable set from the variables' live
/// ranges.
fn populate_instruction_live_sets(method: &mut Method) {
    let order: Vec<Block> = method.block_order().to_vec();
    for &block in &order {
        for index in 0..method.block(block).inst_count() {
            let inst = method.inst_at(block, index);
            let empty = method.new_pool_set();
            method.inst_mut(inst).live_variables = Some(empty);
        }
    }
    for i in 0..method.variables().len() {
        let variable = method.variables()[i];
        let serial = method
            .value(variable)
            .variable()
            .expect("variable pool entry is not a variable")
            .serial();
        let covered: Vec<(Block, Vec<usize>)> = {
            let range = &method
                .value(variable)
                .variable()
                .expect("variable pool entry is not a variable")
                .live_range;
            range
                .blocks()
                .map(|b| {
                    let bits = range.block_bits(b).expect("covered block without bits");
                    (b, bits.iter().collect())
                })
                .collect()
        };
        for (block, indices) in covered {
            let inst_count = method.block(block).inst_count();
            for index in indices {
                if index < inst_count {
                    let inst = method.inst_at(block, index);
                    method
                        .inst_mut(inst)
                        .live_variables
                        .as_mut()
                        .expect("live set was just installed")
                        .insert(serial);
                }
            }
        }
    }
}

/// Compute block-granular liveness (gen/kill/in/out pool-sets) with a
/// backward fixpoint, for per-block allocator snapshots.
pub fn compute_block_liveness(method: &mut Method) {
    let order: Vec<Block> = method.block_order().to_vec();

    // Local gen/kill per block.
    for &block in &order {
        let mut gen = method.new_pool_set();
        let mut kill = method.new_pool_set();
        for index in 0..method.block(block).inst_count() {
            let inst = method.inst_at(block, index);
            for op in method.inst(inst).kind().operands() {
                let data = method.operand(op);
                let Some(value) = data.value() else { continue };
                let Some(variable) = method.value(value).variable() else {
                    continue;
                };
                let serial = variable.serial();
                if data.effect().reads() && !kill.contains(serial) {
                    gen.insert(serial);
                }
                if data.effect().writes() {
                    kill.insert(serial);
                }
            }
        }
        let empty_in = method.new_pool_set();
        let empty_out = method.new_pool_set();
        let block_data = method.block_data_mut(block);
        block_data.live_gen = Some(gen);
        block_data.live_kill = Some(kill);
        block_data.live_in = Some(empty_in);
        block_data.live_out = Some(empty_out);
    }

    // Backward fixpoint: out = union of successors' in; in = gen | (out - kill).
    let mut changed = true;
    while changed {
        changed = false;
        for &block in order.iter().rev() {
            let mut out = method.new_pool_set();
            for succ in method.collect_all_successors(block) {
                out.union_with(
                    method
                        .block(succ)
                        .live_in()
                        .expect("live-in was just installed"),
                );
            }
            let mut live_in = method
                .block(block)
                .live_gen()
                .expect("gen was just installed")
                .clone();
            {
                let kill = method
                    .block(block)
                    .live_kill()
                    .expect("kill was just installed");
                for serial in out.iter() {
                    if !kill.contains(serial) {
                        live_in.insert(serial);
                    }
                }
            }
            if method.block(block).live_out() != Some(&out) {
                method.block_data_mut(block).live_out = Some(out);
                changed = true;
            }
            if method.block(block).live_in() != Some(&live_in) {
                method.block_data_mut(block).live_in = Some(live_in);
                changed = true;
            }
        }
    }
}
