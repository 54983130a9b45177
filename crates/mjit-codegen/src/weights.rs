//! Operand and variable weighting for spill ranking.
//!
//! Each operand site is weighted by its effect and the loop nesting depth
//! of its block; a variable's weight is the sum over its operand sites.
//! Higher-weight variables get placed first by the allocator.

use mjit_ir::{Effect, Method, Value};

const LOOP_WEIGHT_FACTOR: u32 = 8;

fn effect_weight(effect: Effect) -> u32 {
    match effect {
        Effect::Definition => 2,
        Effect::Use => 3,
        Effect::Update => 4,
    }
}

/// Weigh every operand site and every variable. Loop depths must be
/// current (see [`compute_loop_depths`]).
///
/// [`compute_loop_depths`]: mjit_ir::analysis::loops::compute_loop_depths
pub fn weigh_operands(method: &mut Method) {
    for block in method.block_order().to_vec() {
        let depth_factor = method.block(block).loop_nesting_depth() * LOOP_WEIGHT_FACTOR + 1;
        for index in 0..method.block(block).inst_count() {
            let inst = method.inst_at(block, index);
            for op in method.inst(inst).kind().operands() {
                let weight = effect_weight(method.operand(op).effect()) * depth_factor;
                method.set_operand_weight(op, weight);
            }
        }
    }

    let variables: alloc::vec::Vec<Value> = method.variables().to_vec();
    for variable in variables {
        let weight = method
            .value(variable)
            .operands()
            .iter()
            .map(|&op| method.operand(op).weight())
            .sum();
        method.set_variable_weight(variable, weight);
    }
}
