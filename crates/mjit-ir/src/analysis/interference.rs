//! Interference between variables.
//!
//! Two variables interfere when one is written at an instruction the other
//! is live at. The relation is derived from live ranges; the per-variable
//! interference sets are a materialization that can be rebuilt or
//! incrementally re-tested after live ranges change.

use alloc::vec::Vec;

use crate::entity::Value;
use crate::method::Method;

/// The asymmetric half of the interference predicate: does `a` have a
/// writing operand inside `b`'s live range?
pub fn interferes_one_way(method: &Method, a: Value, b: Value) -> bool {
    let Some(b_data) = method.value(b).variable() else {
        return false;
    };
    for &op in method.value(a).operands() {
        let data = method.operand(op);
        if !data.effect().writes() {
            continue;
        }
        let at = method.inst_point(data.inst());
        if b_data.live_range().covers(at.block, at.index) {
            return true;
        }
    }
    false
}

/// Check if `a` and `b` interfere. Symmetric by construction.
pub fn interferes(method: &Method, a: Value, b: Value) -> bool {
    a != b && (interferes_one_way(method, a, b) || interferes_one_way(method, b, a))
}

/// Record `a` and `b` as interfering in both variables' sets.
pub fn be_interfering(method: &mut Method, a: Value, b: Value) {
    let generation = method.pool_generation();
    let serial_a = serial_of(method, a);
    let serial_b = serial_of(method, b);
    insert_neighbor(method, a, serial_b, generation);
    insert_neighbor(method, b, serial_a, generation);
}

/// Remove the interference record between `a` and `b` in both sets.
pub fn be_not_interfering(method: &mut Method, a: Value, b: Value) {
    let generation = method.pool_generation();
    let serial_a = serial_of(method, a);
    let serial_b = serial_of(method, b);
    remove_neighbor(method, a, serial_b, generation);
    remove_neighbor(method, b, serial_a, generation);
}

/// The variables currently recorded as interfering with `variable`.
pub fn interfering_variables(method: &Method, variable: Value) -> Vec<Value> {
    let data = method
        .value(variable)
        .variable()
        .expect("interference is only tracked on variables");
    match &data.interferences {
        Some(set) => {
            set.check_generation(method.pool_generation());
            set.iter().map(|s| method.variable_by_serial(s)).collect()
        }
        None => Vec::new(),
    }
}

/// Check if `a` and `b` are recorded as interfering.
pub fn is_recorded_interfering(method: &Method, a: Value, b: Value) -> bool {
    let serial_b = method
        .value(b)
        .variable()
        .expect("interference is only tracked on variables")
        .serial();
    let data = method
        .value(a)
        .variable()
        .expect("interference is only tracked on variables");
    data.interferences.as_ref().is_some_and(|set| {
        set.check_generation(method.pool_generation());
        set.contains(serial_b)
    })
}

/// Rebuild every variable's interference set from the per-instruction
/// live sets. Requires liveness to be current.
pub fn compute_interferences(method: &mut Method) {
    // Reset all sets to empty for the current generation.
    for i in 0..method.variables().len() {
        let variable = method.variables()[i];
        let empty = method.new_pool_set();
        method
            .value_mut(variable)
            .variable_mut()
            .expect("variable pool entry is not a variable")
            .interferences = Some(empty);
    }

    let variables: Vec<Value> = method.variables().to_vec();
    for &a in &variables {
        // Writing sites of `a`.
        let write_sites: Vec<crate::entity::Inst> = method
            .value(a)
            .operands()
            .iter()
            .filter(|&&op| method.operand(op).effect().writes())
            .map(|&op| method.operand(op).inst())
            .collect();
        for inst in write_sites {
            let neighbors: Vec<Value> = match method.inst(inst).live_variables() {
                Some(live) => {
                    method.check_pool_set(live);
                    live.iter().map(|s| method.variable_by_serial(s)).collect()
                }
                None => Vec::new(),
            };
            for b in neighbors {
                if b != a {
                    be_interfering(method, a, b);
                }
            }
        }
    }
}

/// Re-test every recorded neighbor of `variable` and drop the pairs that
/// no longer interfere. Used after splitting or coalescing changed live
/// ranges.
pub fn update_interferences(method: &mut Method, variable: Value) {
    let neighbors = interfering_variables(method, variable);
    for neighbor in neighbors {
        if !interferes(method, variable, neighbor) {
            be_not_interfering(method, variable, neighbor);
        }
    }
}

fn serial_of(method: &Method, variable: Value) -> u32 {
    method
        .value(variable)
        .variable()
        .expect("interference is only tracked on variables")
        .serial()
}

fn insert_neighbor(method: &mut Method, variable: Value, serial: u32, generation: u32) {
    let data = method
        .value_mut(variable)
        .variable_mut()
        .expect("interference is only tracked on variables");
    let set = data
        .interferences
        .get_or_insert_with(|| crate::pool::PoolSet::empty(generation));
    set.check_generation(generation);
    set.insert(serial);
}

fn remove_neighbor(method: &mut Method, variable: Value, serial: u32, generation: u32) {
    let data = method
        .value_mut(variable)
        .variable_mut()
        .expect("interference is only tracked on variables");
    if let Some(set) = data.interferences.as_mut() {
        set.check_generation(generation);
        set.remove(serial);
    }
}
