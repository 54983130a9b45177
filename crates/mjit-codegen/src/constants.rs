//! Constant materialization.
//!
//! Every constant must end up with a concrete location: an immediate of
//! some width, or a literal pool entry. A constant whose operands agree on
//! a category is materialized once; disagreeing operands get per-category
//! clones sharing the payload, and operands that can take neither an
//! immediate nor a literal are split through a fresh variable. Splitting
//! and cloning enqueue new constants, so the pass runs the queue to a
//! fixed point.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;

use mjit_ir::{
    AssignmentReason, CategorySet, ConstantValue, ImmWidth, InstKind, Kind, Location,
    LocationCategory, Operand, Value,
};

use crate::methodgen::MethodGeneration;

/// Assign a location to every constant, cloning or splitting as needed.
/// Idempotent: re-running on an allocated method changes nothing.
pub fn allocate_constants(generation: &mut MethodGeneration) {
    let mut queue: VecDeque<Value> = generation.method().constants().iter().copied().collect();
    #[cfg(feature = "debug-codegen")]
    crate::debug_codegen!("allocate_constants: {} constants queued", queue.len());
    while let Some(constant) = queue.pop_front() {
        allocate_constant(generation, constant, &mut queue);
    }
    debug_assert!(generation.constants_allocated());
}

fn allocate_constant(
    generation: &mut MethodGeneration,
    constant: Value,
    queue: &mut VecDeque<Value>,
) {
    let value = generation
        .method()
        .value(constant)
        .constant_value()
        .expect("constant registry entry is not a constant");

    let mut operands: Vec<Operand> = generation.method().value(constant).operands().to_vec();
    let mut categories: Vec<Option<LocationCategory>> = operands
        .iter()
        .map(|&op| {
            decide_constant_location_category(value, generation.method().operand(op).categories())
        })
        .collect();

    for &op in &operands {
        generation.method_mut().unbind(op);
    }
    debug_assert!(generation.method().value(constant).operands().is_empty());

    // Operands that can take neither an immediate nor a literal are routed
    // through a fresh variable; the inserted copy's source operand can.
    for i in 0..operands.len() {
        if categories[i].is_none() {
            operands[i] = split_constant_at_use(generation, constant, operands[i]);
            categories[i] = decide_constant_location_category(
                value,
                generation.method().operand(operands[i]).categories(),
            );
            assert!(
                categories[i].is_some(),
                "split constant operand still has no usable category"
            );
        }
    }

    let mut original = Some(constant);
    let mut by_category: BTreeMap<LocationCategory, Value> = BTreeMap::new();
    for i in 0..operands.len() {
        let category = categories[i].expect("category resolved above");
        let materialized = match by_category.get(&category) {
            Some(&existing) => existing,
            None => {
                let chosen = match original.take() {
                    Some(first) => first,
                    None => {
                        let clone = generation.method_mut().create_constant(value);
                        queue.push_back(clone);
                        clone
                    }
                };
                let location = constant_location(generation, value, category);
                generation.method_mut().set_location(chosen, Some(location));
                by_category.insert(category, chosen);
                chosen
            }
        };
        generation.method_mut().bind(operands[i], materialized);
    }
}

/// The location category satisfying `operand_categories` for `value`:
/// the narrowest fitting immediate, widening while the walk stays inside
/// the immediate categories, then the literal pool, else `None`
/// (over-constrained).
pub fn decide_constant_location_category(
    value: ConstantValue,
    operand_categories: CategorySet,
) -> Option<LocationCategory> {
    if value.kind() != Kind::Reference || value.is_zero() {
        let mut category = LocationCategory::immediate_from_width(value.signed_effective_width());
        loop {
            if operand_categories.contains(category) {
                return Some(category);
            }
            match category.next() {
                Some(next) if CategorySet::I.contains(next) => category = next,
                _ => break,
            }
        }
    }
    if operand_categories.contains(LocationCategory::Literal) {
        return Some(LocationCategory::Literal);
    }
    None
}

fn constant_location(
    generation: &mut MethodGeneration,
    value: ConstantValue,
    category: LocationCategory,
) -> Location {
    match category {
        LocationCategory::Immediate8 => Location::Immediate(ImmWidth::W8, value),
        LocationCategory::Immediate16 => Location::Immediate(ImmWidth::W16, value),
        LocationCategory::Immediate32 => Location::Immediate(ImmWidth::W32, value),
        LocationCategory::Immediate64 => Location::Immediate(ImmWidth::W64, value),
        LocationCategory::Literal => generation.literal_pool_mut().make_literal(value),
        other => unreachable!("constants cannot be materialized as {:?}", other),
    }
}

/// Insert `destination := constant` before the operand's instruction and
/// rebind the operand to the destination. Returns the copy's source
/// operand, which accepts immediates and literals and re-attaches the
/// constant for the distribution pass.
fn split_constant_at_use(
    generation: &mut MethodGeneration,
    constant: Value,
    operand: Operand,
) -> Operand {
    let kind = generation.method().value(constant).kind();
    let destination = generation.create_variable(kind);
    let at = generation.method().operand(operand).inst();
    let copy = generation.introduce_assignment_before(
        at,
        kind,
        destination,
        constant,
        AssignmentReason::FixedSplit,
    );
    generation.method_mut().bind(operand, destination);
    match generation.method().inst(copy).kind() {
        InstKind::Assignment { src, .. } => *src,
        other => unreachable!("introduced copy is not an assignment: {:?}", other),
    }
}
