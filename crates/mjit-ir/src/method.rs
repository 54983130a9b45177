//! The per-method IR container.
//!
//! `Method` owns the arenas for blocks, instructions, operands and values,
//! and is the single mutation point for the relationships between them:
//! operand binding, instruction placement and renumbering, and
//! predecessor/successor edges. One method is compiled by one thread; there
//! are no suspension points in this tier.

use alloc::vec::Vec;
use core::fmt;

use crate::block::{BlockData, BlockRole};
use crate::constant::{ConstantValue, MethodRef};
use crate::entity::{Block, Inst, Operand, Value};
use crate::entity_map::PrimaryMap;
use crate::inst::{FrameDescriptor, InstData, InstKind, InstPoint};
use crate::kind::Kind;
use crate::location::{CategorySet, Location, LocationCategory};
use crate::operand::{Effect, OperandData};
use crate::pool::PoolSet;
use crate::value::{ValueData, ValuePayload, VariableData};

/// Every category a value could ever occupy.
const ALL_CATEGORIES: CategorySet = CategorySet::of(&[
    LocationCategory::IntegerRegister,
    LocationCategory::FloatRegister,
    LocationCategory::Immediate8,
    LocationCategory::Immediate16,
    LocationCategory::Immediate32,
    LocationCategory::Immediate64,
    LocationCategory::Block,
    LocationCategory::Method,
    LocationCategory::StackSlot,
    LocationCategory::Literal,
]);

/// Where a newly built instruction goes.
#[derive(Debug, Clone, Copy)]
pub enum Placement {
    /// At the end of the block.
    Append(Block),
    /// Before the instruction currently at `index`, shifting it and its
    /// successors up.
    Before(Block, usize),
    /// Overwriting the redundant instruction currently at `index`.
    Replace(Block, usize),
}

/// Category set for the destination of an assignment of the given kind.
pub fn assignment_dest_categories(kind: Kind) -> CategorySet {
    if kind.is_float() {
        CategorySet::F_S
    } else {
        CategorySet::G_S
    }
}

/// Category set for the source of an assignment of the given kind.
pub fn assignment_src_categories(kind: Kind) -> CategorySet {
    if kind.is_float() {
        CategorySet::F_S.with(LocationCategory::Literal)
    } else {
        CategorySet::G_S
            .union(CategorySet::I)
            .with(LocationCategory::Literal)
    }
}

/// The IR of one method under compilation.
#[derive(Debug, Clone, Default)]
pub struct Method {
    blocks: PrimaryMap<Block, BlockData>,
    insts: PrimaryMap<Inst, InstData>,
    operands: PrimaryMap<Operand, OperandData>,
    values: PrimaryMap<Value, ValueData>,
    /// Current block order; serials mirror positions here.
    order: Vec<Block>,
    /// Variable pool; a variable's serial is its index here.
    variables: Vec<Value>,
    constants: Vec<Value>,
    pool_generation: u32,
}

impl Method {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Blocks

    /// Create a new block at the end of the block order.
    pub fn create_block(&mut self, role: BlockRole) -> Block {
        let serial = self.order.len() as u32;
        let block = self.blocks.push(BlockData::new(role, serial));
        self.order.push(block);
        block
    }

    /// The block data for `block`.
    pub fn block(&self, block: Block) -> &BlockData {
        &self.blocks[block]
    }

    /// Blocks in current order.
    pub fn block_order(&self) -> &[Block] {
        &self.order
    }

    /// Number of blocks.
    pub fn block_count(&self) -> usize {
        self.order.len()
    }

    /// The entry block, if any blocks exist.
    pub fn entry_block(&self) -> Option<Block> {
        self.order.first().copied()
    }

    /// Replace the block order. The new order must be a permutation of the
    /// old one; serials are reassigned to match.
    pub fn set_block_order(&mut self, order: Vec<Block>) {
        assert_eq!(
            order.len(),
            self.order.len(),
            "block order must be a permutation of the existing blocks"
        );
        for (serial, &block) in order.iter().enumerate() {
            self.blocks[block].serial = serial as u32;
        }
        self.order = order;
    }

    /// Record `pred` as a predecessor of `block`.
    pub fn add_predecessor(&mut self, block: Block, pred: Block) {
        let preds = &mut self.blocks[block].predecessors;
        if !preds.contains(&pred) {
            preds.push(pred);
        }
    }

    /// Set the loop nesting depth of a block.
    pub fn set_loop_nesting_depth(&mut self, block: Block, depth: u32) {
        self.blocks[block].loop_nesting_depth = depth;
    }

    /// Successors reached by normal control flow, computed from the
    /// block's instructions (first-occurrence order, deduplicated).
    pub fn collect_normal_successors(&self, block: Block) -> Vec<Block> {
        let mut out = Vec::new();
        for &inst in &self.blocks[block].insts {
            for target in self.insts[inst].kind.normal_successors() {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        }
        out
    }

    /// All successors including exceptional edges.
    pub fn collect_all_successors(&self, block: Block) -> Vec<Block> {
        let mut out = Vec::new();
        for &inst in &self.blocks[block].insts {
            for target in self.insts[inst].kind.all_successors() {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        }
        out
    }

    /// Cached variant of [`collect_normal_successors`].
    ///
    /// [`collect_normal_successors`]: Method::collect_normal_successors
    pub fn normal_successors(&mut self, block: Block) -> Vec<Block> {
        if let Some(cached) = &self.blocks[block].cached_normal_successors {
            return cached.clone();
        }
        let computed = self.collect_normal_successors(block);
        self.blocks[block].cached_normal_successors = Some(computed.clone());
        computed
    }

    /// Cached variant of [`collect_all_successors`].
    ///
    /// [`collect_all_successors`]: Method::collect_all_successors
    pub fn all_successors(&mut self, block: Block) -> Vec<Block> {
        if let Some(cached) = &self.blocks[block].cached_all_successors {
            return cached.clone();
        }
        let computed = self.collect_all_successors(block);
        self.blocks[block].cached_all_successors = Some(computed.clone());
        computed
    }

    // ------------------------------------------------------------------
    // Instructions

    /// The instruction data for `inst`.
    pub fn inst(&self, inst: Inst) -> &InstData {
        &self.insts[inst]
    }

    /// The program point of `inst`.
    pub fn inst_point(&self, inst: Inst) -> InstPoint {
        let data = &self.insts[inst];
        InstPoint::new(data.block, data.index as usize)
    }

    /// The instruction at a given point.
    pub fn inst_at(&self, block: Block, index: usize) -> Inst {
        self.blocks[block].insts[index]
    }

    /// Build a new instruction at `placement`. The closure creates the
    /// instruction's operands (against the fresh id it is handed) and
    /// returns the instruction kind.
    pub fn build_inst<F>(&mut self, placement: Placement, f: F) -> Inst
    where
        F: FnOnce(&mut Method, Inst) -> InstKind,
    {
        let (block, index) = match placement {
            Placement::Append(b) => (b, self.blocks[b].insts.len()),
            Placement::Before(b, i) => (b, i),
            Placement::Replace(b, i) => (b, i),
        };
        let inst = self
            .insts
            .push(InstData::new(block, index as u32, InstKind::Filler));
        match placement {
            Placement::Append(_) => self.blocks[block].insts.push(inst),
            Placement::Before(..) => {
                self.blocks[block].insts.insert(index, inst);
                self.renumber_from(block, index);
            }
            Placement::Replace(..) => {
                let old = self.blocks[block].insts[index];
                assert!(
                    self.is_redundant(old),
                    "overwriting a non-redundant instruction at {}[{}]",
                    block,
                    index
                );
                self.detach_inst(old);
                self.blocks[block].insts[index] = inst;
            }
        }
        let kind = f(self, inst);
        debug_assert!(
            kind.operands().iter().all(|&op| self.operands[op].inst == inst),
            "instruction kind references operands of another instruction"
        );
        let successors = kind.all_successors();
        self.insts[inst].kind = kind;
        for target in successors {
            self.add_predecessor(target, block);
        }
        self.blocks[block].clear_successor_caches();
        inst
    }

    /// Append an instruction without operands.
    pub fn append_simple(&mut self, block: Block, kind: InstKind) -> Inst {
        debug_assert!(kind.operands().is_empty());
        self.build_inst(Placement::Append(block), |_, _| kind)
    }

    /// Append `dest := src`.
    pub fn append_assignment(
        &mut self,
        block: Block,
        kind: Kind,
        dest: Value,
        src: Value,
        reason: crate::inst::AssignmentReason,
    ) -> Inst {
        self.build_assignment(Placement::Append(block), kind, dest, src, reason)
    }

    /// Build `dest := src` at an explicit placement.
    pub fn build_assignment(
        &mut self,
        placement: Placement,
        kind: Kind,
        dest: Value,
        src: Value,
        reason: crate::inst::AssignmentReason,
    ) -> Inst {
        self.build_inst(placement, |m, inst| {
            let dest_op = m.make_operand(inst, Effect::Definition, assignment_dest_categories(kind));
            m.bind(dest_op, dest);
            let src_op = m.make_operand(inst, Effect::Use, assignment_src_categories(kind));
            m.bind(src_op, src);
            InstKind::Assignment {
                kind,
                dest: dest_op,
                src: src_op,
                reason,
            }
        })
    }

    /// Append an unconditional jump.
    pub fn append_jump(&mut self, block: Block, target: Block) -> Inst {
        self.append_simple(block, InstKind::Jump { target })
    }

    /// Append a two-way conditional branch on `cond`.
    pub fn append_branch(
        &mut self,
        block: Block,
        cond: Value,
        target_true: Block,
        target_false: Block,
    ) -> Inst {
        self.build_inst(Placement::Append(block), |m, inst| {
            let cond_op = m.make_operand(inst, Effect::Use, CategorySet::G);
            m.bind(cond_op, cond);
            InstKind::Branch {
                cond: cond_op,
                target_true,
                target_false,
            }
        })
    }

    /// Append a multi-way switch. `matches` must be constants sorted
    /// ascending, parallel to `targets`.
    pub fn append_switch(
        &mut self,
        block: Block,
        tag: Value,
        matches: Vec<Value>,
        targets: Vec<Block>,
        default_target: Block,
    ) -> Inst {
        assert_eq!(matches.len(), targets.len());
        self.build_inst(Placement::Append(block), |m, inst| {
            let tag_op = m.make_operand(inst, Effect::Use, CategorySet::G);
            m.bind(tag_op, tag);
            let match_cats = CategorySet::I.with(LocationCategory::Literal);
            let match_ops = matches
                .iter()
                .map(|&v| {
                    let op = m.make_operand(inst, Effect::Use, match_cats);
                    m.bind(op, v);
                    op
                })
                .collect();
            InstKind::Switch(crate::inst::SwitchData {
                tag: tag_op,
                matches: match_ops,
                targets,
                default_target,
            })
        })
    }

    /// Unbind every operand of `inst` and clean up the edges its kind
    /// declared. The instruction keeps its slot.
    fn detach_inst(&mut self, inst: Inst) {
        for op in self.insts[inst].kind.operands() {
            self.unbind(op);
        }
        let block = self.insts[inst].block;
        let old_successors = self.insts[inst].kind.all_successors();
        self.insts[inst].kind = InstKind::Filler;
        for target in old_successors {
            let still_targeted = self.blocks[block]
                .insts
                .iter()
                .any(|&i| self.insts[i].kind.all_successors().contains(&target));
            if !still_targeted {
                self.blocks[target].predecessors.retain(|&p| p != block);
            }
        }
        self.blocks[block].clear_successor_caches();
    }

    /// Turn `inst` into a filler in place: operands unbound, no renumbering.
    pub fn make_filler(&mut self, inst: Inst) {
        self.detach_inst(inst);
    }

    /// Remove `inst` from its block, renumbering subsequent instructions.
    pub fn remove_inst(&mut self, inst: Inst) {
        self.detach_inst(inst);
        let block = self.insts[inst].block;
        let index = self.insts[inst].index as usize;
        self.blocks[block].insts.remove(index);
        self.renumber_from(block, index);
    }

    fn renumber_from(&mut self, block: Block, from: usize) {
        for i in from..self.blocks[block].insts.len() {
            let inst = self.blocks[block].insts[i];
            self.insts[inst].index = i as u32;
        }
    }

    /// Check if `inst` can be deleted or overwritten without changing the
    /// program: fillers, assignments whose source and destination already
    /// share a location, and try instructions that re-establish the
    /// current handler with no intervening call.
    pub fn is_redundant(&self, inst: Inst) -> bool {
        match &self.insts[inst].kind {
            InstKind::Filler => true,
            InstKind::Assignment { dest, src, .. } => {
                let dest_loc = self.operands[*dest]
                    .value
                    .and_then(|v| self.values[v].location);
                let src_loc = self.operands[*src]
                    .value
                    .and_then(|v| self.values[v].location);
                dest_loc.is_some() && dest_loc == src_loc
            }
            InstKind::Try { catch } => {
                let block = self.insts[inst].block;
                let index = self.insts[inst].index as usize;
                for i in (0..index).rev() {
                    match &self.insts[self.blocks[block].insts[i]].kind {
                        InstKind::Call(_) => return false,
                        InstKind::Try { catch: prior } => return prior == catch,
                        _ => {}
                    }
                }
                catch.is_none()
            }
            _ => false,
        }
    }

    /// Attach a frame descriptor to a stop instruction.
    pub fn set_frame_descriptor(&mut self, inst: Inst, descriptor: FrameDescriptor) {
        self.insts[inst].frame_descriptor = Some(descriptor);
    }

    /// Append an operand to a prologue's definition list or an epilogue's
    /// use list. Other instruction kinds have fixed operand shapes.
    pub fn append_operand_to(&mut self, inst: Inst, op: Operand) {
        debug_assert_eq!(self.operands[op].inst, inst);
        match &mut self.insts[inst].kind {
            InstKind::Prologue { defs } => defs.push(op),
            InstKind::Epilogue { uses } => uses.push(op),
            other => panic!(
                "cannot grow the operand list of {:?}",
                core::mem::discriminant(other)
            ),
        }
    }

    pub(crate) fn inst_mut(&mut self, inst: Inst) -> &mut InstData {
        &mut self.insts[inst]
    }

    pub(crate) fn block_data_mut(&mut self, block: Block) -> &mut BlockData {
        &mut self.blocks[block]
    }

    // ------------------------------------------------------------------
    // Operands

    /// Create a fresh unbound operand owned by `inst`.
    pub fn make_operand(&mut self, inst: Inst, effect: Effect, categories: CategorySet) -> Operand {
        self.operands.push(OperandData::new(inst, effect, categories))
    }

    /// The operand data for `op`.
    pub fn operand(&self, op: Operand) -> &OperandData {
        &self.operands[op]
    }

    /// Pin an operand to a calling-convention location.
    pub fn set_required_location(&mut self, op: Operand, location: Location) {
        assert!(
            self.operands[op].categories.contains(location.category()),
            "required location {} outside the operand's categories {}",
            location,
            self.operands[op].categories
        );
        self.operands[op].required_location = Some(location);
    }

    /// Set the allocation weight of an operand site.
    pub fn set_operand_weight(&mut self, op: Operand, weight: u32) {
        self.operands[op].weight = weight;
    }

    /// Bind `op` to `value`, detaching it from any previously bound value
    /// first. If the value's location is fixed it must lie within the
    /// operand's allowed categories; a violation is a programming error and
    /// aborts.
    pub fn bind(&mut self, op: Operand, value: Value) {
        self.unbind(op);
        let data = &self.values[value];
        if data.location_fixed {
            let location = data.location.expect("fixed value without a location");
            assert!(
                self.operands[op].categories.contains(location.category()),
                "binding operand {} (categories {}) to value fixed at {}",
                op,
                self.operands[op].categories,
                location
            );
        }
        self.operands[op].value = Some(value);
        let effect = self.operands[op].effect;
        let data = &mut self.values[value];
        data.operands.push(op);
        match effect {
            Effect::Use => data.num_uses += 1,
            Effect::Update => data.num_updates += 1,
            Effect::Definition => data.num_definitions += 1,
        }
        data.categories_cache = None;
    }

    /// Detach `op` from its value, if bound.
    pub fn unbind(&mut self, op: Operand) {
        if let Some(value) = self.operands[op].value.take() {
            let effect = self.operands[op].effect;
            let data = &mut self.values[value];
            data.operands.retain(|&o| o != op);
            match effect {
                Effect::Use => data.num_uses -= 1,
                Effect::Update => data.num_updates -= 1,
                Effect::Definition => data.num_definitions -= 1,
            }
            data.categories_cache = None;
        }
    }

    // ------------------------------------------------------------------
    // Values

    /// The value data for `value`.
    pub fn value(&self, value: Value) -> &ValueData {
        &self.values[value]
    }

    /// Iterate all values ever created.
    pub fn values(&self) -> impl Iterator<Item = Value> {
        self.values.keys()
    }

    /// Create a fresh variable of `kind`. Its serial is its position in
    /// the variable pool.
    pub fn create_variable(&mut self, kind: Kind) -> Value {
        let serial = self.variables.len() as u32;
        let value = self.values.push(ValueData::new(
            kind,
            ValuePayload::Variable(VariableData::new(serial)),
        ));
        self.variables.push(value);
        value
    }

    /// Create a constant. Constants are registered for materialization.
    pub fn create_constant(&mut self, constant: ConstantValue) -> Value {
        let value = self
            .values
            .push(ValueData::new(constant.kind(), ValuePayload::Constant(constant)));
        self.constants.push(value);
        value
    }

    /// Create a value fixed to `location` at creation.
    pub fn create_preallocated(&mut self, location: Location, kind: Kind) -> Value {
        let value = self
            .values
            .push(ValueData::new(kind, ValuePayload::Preallocated));
        self.fix_location(value, location);
        value
    }

    /// Create a symbolic callee value.
    pub fn create_method_value(&mut self, method: MethodRef) -> Value {
        let value = self
            .values
            .push(ValueData::new(Kind::Word, ValuePayload::Method(method)));
        self.fix_location(value, Location::Method(method));
        value
    }

    /// Create an undefined sentinel value of `kind`.
    pub fn create_undefined(&mut self, kind: Kind) -> Value {
        let value = self
            .values
            .push(ValueData::new(kind, ValuePayload::Undefined));
        self.fix_location(value, Location::Undefined);
        value
    }

    /// Assign or clear a value's location. Not permitted on fixed values.
    pub fn set_location(&mut self, value: Value, location: Option<Location>) {
        let data = &mut self.values[value];
        assert!(
            !data.location_fixed,
            "cannot reassign the fixed location of {}",
            value
        );
        data.location = location;
    }

    /// Fix a value's location permanently.
    pub fn fix_location(&mut self, value: Value, location: Location) {
        let data = &mut self.values[value];
        assert!(
            data.location.is_none() || data.location == Some(location),
            "refixing {} from {:?} to {}",
            value,
            data.location,
            location
        );
        data.location = Some(location);
        data.location_fixed = true;
    }

    /// The intersection of the category sets of every operand bound to
    /// `value` (all categories when no operand is bound). Cached;
    /// invalidated by every bind/unbind.
    pub fn value_categories(&mut self, value: Value) -> CategorySet {
        if let Some(cached) = self.values[value].categories_cache {
            return cached;
        }
        let mut categories = ALL_CATEGORIES;
        for i in 0..self.values[value].operands.len() {
            let op = self.values[value].operands[i];
            categories = categories.intersection(self.operands[op].categories);
        }
        self.values[value].categories_cache = Some(categories);
        categories
    }

    /// Register `alias` to be marked used whenever `value` is used.
    pub fn add_alias(&mut self, value: Value, alias: Value) {
        let data = self.values[value]
            .variable_mut()
            .expect("aliases are only tracked on variables");
        if !data.aliases.contains(&alias) {
            data.aliases.push(alias);
        }
    }

    /// Set a variable's allocation weight.
    pub fn set_variable_weight(&mut self, value: Value, weight: u32) {
        self.values[value]
            .variable_mut()
            .expect("weights are only tracked on variables")
            .weight = weight;
    }

    pub(crate) fn value_mut(&mut self, value: Value) -> &mut ValueData {
        &mut self.values[value]
    }

    // ------------------------------------------------------------------
    // Variable pool

    /// The variable pool, in serial order.
    pub fn variables(&self) -> &[Value] {
        &self.variables
    }

    /// All constants registered so far.
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// The variable at `serial` in the current pool.
    pub fn variable_by_serial(&self, serial: u32) -> Value {
        self.variables[serial as usize]
    }

    /// The current variable pool generation.
    pub fn pool_generation(&self) -> u32 {
        self.pool_generation
    }

    /// A fresh empty pool-set for the current generation.
    pub fn new_pool_set(&self) -> PoolSet {
        PoolSet::empty(self.pool_generation)
    }

    /// Abort if `set` was created against an older pool generation.
    pub fn check_pool_set(&self, set: &PoolSet) {
        set.check_generation(self.pool_generation);
    }

    /// Rebuild the variable pool from `survivors`, renumbering serials and
    /// bumping the pool generation. Every outstanding pool-set becomes
    /// stale.
    pub fn set_variables(&mut self, survivors: Vec<Value>) {
        for (serial, &value) in survivors.iter().enumerate() {
            self.values[value]
                .variable_mut()
                .expect("variable pool entry is not a variable")
                .serial = serial as u32;
        }
        self.variables = survivors;
        self.pool_generation += 1;
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method {{")?;
        for &block in &self.order {
            let data = &self.blocks[block];
            write!(f, "{}", block)?;
            if data.role == BlockRole::ExceptionDispatcher {
                write!(f, " dispatcher")?;
            }
            writeln!(f, ":")?;
            for &inst in &data.insts {
                writeln!(f, "    {}", InstDisplay { method: self, inst })?;
            }
        }
        writeln!(f, "}}")
    }
}

/// Human-readable rendering of one instruction.
pub struct InstDisplay<'a> {
    pub method: &'a Method,
    pub inst: Inst,
}

impl InstDisplay<'_> {
    fn value_name(&self, op: Operand) -> alloc::string::String {
        use alloc::string::ToString;
        match self.method.operands[op].value {
            Some(v) => match &self.method.values[v].payload {
                ValuePayload::Variable(var) => alloc::format!("v{}", var.serial),
                ValuePayload::Constant(c) => alloc::format!("({})", c),
                ValuePayload::Preallocated => alloc::format!(
                    "fixed[{}]",
                    self.method.values[v]
                        .location
                        .expect("preallocated value without location")
                ),
                ValuePayload::Method(m) => m.to_string(),
                ValuePayload::Undefined => "undef".to_string(),
            },
            None => "_".to_string(),
        }
    }
}

impl fmt::Display for InstDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method.insts[self.inst].kind {
            InstKind::Assignment { dest, src, .. } => {
                write!(f, "{} = {}", self.value_name(*dest), self.value_name(*src))
            }
            InstKind::Jump { target } => write!(f, "jump {}", target),
            InstKind::Branch {
                cond,
                target_true,
                target_false,
            } => write!(
                f,
                "branch {}, {}, {}",
                self.value_name(*cond),
                target_true,
                target_false
            ),
            InstKind::Call(data) => {
                write!(f, "call {}(", self.value_name(data.function))?;
                for (i, &arg) in data.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.value_name(arg))?;
                }
                write!(f, ")")?;
                if let Some(result) = data.result {
                    write!(f, " -> {}", self.value_name(result))?;
                }
                Ok(())
            }
            InstKind::Switch(data) => {
                write!(f, "switch {} [", self.value_name(data.tag))?;
                for (i, (&m, &t)) in data.matches.iter().zip(data.targets.iter()).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} -> {}", self.value_name(m), t)?;
                }
                write!(f, "] default {}", data.default_target)
            }
            InstKind::Try { catch: Some(b) } => write!(f, "try {}", b),
            InstKind::Try { catch: None } => write!(f, "try"),
            InstKind::Catch { .. } => write!(f, "catch"),
            InstKind::Prologue { .. } => write!(f, "prologue"),
            InstKind::Epilogue { .. } => write!(f, "epilogue"),
            InstKind::Infopoint { kind, dest } => match (kind, dest) {
                (crate::inst::InfopointKind::Safepoint, _) => write!(f, "safepoint"),
                (crate::inst::InfopointKind::Here, Some(d)) => {
                    write!(f, "{} = here", self.value_name(*d))
                }
                (crate::inst::InfopointKind::Here, None) => write!(f, "here"),
            },
            InstKind::Return => write!(f, "return"),
            InstKind::Filler => write!(f, "filler"),
            InstKind::Marker => write!(f, "marker"),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::inst::AssignmentReason;

    fn two_vars(method: &mut Method) -> (Value, Value) {
        (
            method.create_variable(Kind::Int),
            method.create_variable(Kind::Int),
        )
    }

    #[test]
    fn test_block_creation_and_serials() {
        let mut method = Method::new();
        let b0 = method.create_block(BlockRole::Normal);
        let b1 = method.create_block(BlockRole::ExceptionDispatcher);
        assert_eq!(method.block(b0).serial(), 0);
        assert_eq!(method.block(b1).serial(), 1);
        assert_eq!(method.entry_block(), Some(b0));
        assert_eq!(method.block(b1).role(), BlockRole::ExceptionDispatcher);
    }

    #[test]
    fn test_set_block_order_reassigns_serials() {
        let mut method = Method::new();
        let b0 = method.create_block(BlockRole::Normal);
        let b1 = method.create_block(BlockRole::Normal);
        method.set_block_order(vec![b1, b0]);
        assert_eq!(method.block(b1).serial(), 0);
        assert_eq!(method.block(b0).serial(), 1);
        assert_eq!(method.entry_block(), Some(b1));
    }

    #[test]
    fn test_instruction_indices_after_insert_and_remove() {
        let mut method = Method::new();
        let b = method.create_block(BlockRole::Normal);
        let (v0, v1) = two_vars(&mut method);
        let i0 = method.append_assignment(b, Kind::Int, v1, v0, AssignmentReason::Normal);
        let i1 = method.append_simple(b, InstKind::Return);
        assert_eq!(method.inst(i0).index(), 0);
        assert_eq!(method.inst(i1).index(), 1);

        let i2 = method.build_assignment(
            Placement::Before(b, 0),
            Kind::Int,
            v0,
            v1,
            AssignmentReason::Normal,
        );
        assert_eq!(method.inst(i2).index(), 0);
        assert_eq!(method.inst(i0).index(), 1);
        assert_eq!(method.inst(i1).index(), 2);

        method.remove_inst(i2);
        assert_eq!(method.inst(i0).index(), 0);
        assert_eq!(method.inst(i1).index(), 1);
    }

    #[test]
    fn test_operand_counts_track_bindings() {
        let mut method = Method::new();
        let b = method.create_block(BlockRole::Normal);
        let (v0, v1) = two_vars(&mut method);
        method.append_assignment(b, Kind::Int, v1, v0, AssignmentReason::Normal);
        method.append_assignment(b, Kind::Int, v1, v0, AssignmentReason::Normal);

        assert_eq!(method.value(v0).num_uses(), 2);
        assert_eq!(method.value(v0).num_definitions(), 0);
        assert_eq!(method.value(v1).num_definitions(), 2);
        assert_eq!(method.value(v0).operands().len(), 2);

        // operand/value consistency after rebinding
        let op = method.value(v0).operands()[0];
        method.bind(op, v1);
        assert_eq!(method.value(v0).num_uses(), 1);
        assert_eq!(method.value(v1).num_uses(), 1);
        assert_eq!(
            method.value(v1).num_uses()
                + method.value(v1).num_updates()
                + method.value(v1).num_definitions(),
            method.value(v1).operands().len() as u32
        );
    }

    #[test]
    #[should_panic(expected = "binding operand")]
    fn test_bind_rejects_incompatible_fixed_location() {
        let mut method = Method::new();
        let b = method.create_block(BlockRole::Normal);
        let v = method.create_variable(Kind::Int);
        let fixed = method.create_preallocated(
            Location::IntegerRegister(crate::location::IntReg(0)),
            Kind::Int,
        );
        let inst = method.append_simple(b, InstKind::Marker);
        // A float-register-only operand cannot take an integer register value.
        let op = method.make_operand(inst, Effect::Use, CategorySet::F);
        let _ = v;
        method.bind(op, fixed);
    }

    #[test]
    fn test_value_categories_intersection_and_invalidation() {
        let mut method = Method::new();
        let b = method.create_block(BlockRole::Normal);
        let v = method.create_variable(Kind::Int);
        let inst = method.append_simple(b, InstKind::Marker);

        let op1 = method.make_operand(inst, Effect::Use, CategorySet::G_S);
        method.bind(op1, v);
        assert_eq!(method.value_categories(v), CategorySet::G_S);

        let op2 = method.make_operand(inst, Effect::Use, CategorySet::G);
        method.bind(op2, v);
        assert_eq!(method.value_categories(v), CategorySet::G);

        method.unbind(op2);
        assert_eq!(method.value_categories(v), CategorySet::G_S);
    }

    #[test]
    fn test_successor_and_predecessor_maintenance() {
        let mut method = Method::new();
        let b0 = method.create_block(BlockRole::Normal);
        let b1 = method.create_block(BlockRole::Normal);
        let b2 = method.create_block(BlockRole::Normal);
        let v = method.create_variable(Kind::Int);

        method.append_branch(b0, v, b1, b2);
        assert_eq!(method.normal_successors(b0), [b1, b2]);
        assert_eq!(method.block(b1).predecessors(), [b0]);
        assert_eq!(method.block(b2).predecessors(), [b0]);

        // Removing the branch drops the edges.
        let branch = method.inst_at(b0, 0);
        method.remove_inst(branch);
        assert!(method.normal_successors(b0).is_empty());
        assert!(method.block(b1).predecessors().is_empty());
    }

    #[test]
    fn test_try_redundancy() {
        let mut method = Method::new();
        let b = method.create_block(BlockRole::Normal);
        let handler = method.create_block(BlockRole::ExceptionDispatcher);

        let t1 = method.append_simple(
            b,
            InstKind::Try {
                catch: Some(handler),
            },
        );
        let t2 = method.append_simple(
            b,
            InstKind::Try {
                catch: Some(handler),
            },
        );
        assert!(!method.is_redundant(t1));
        assert!(method.is_redundant(t2));
    }

    #[test]
    fn test_try_not_redundant_across_call() {
        let mut method = Method::new();
        let b = method.create_block(BlockRole::Normal);
        let handler = method.create_block(BlockRole::ExceptionDispatcher);
        let callee = method.create_method_value(MethodRef(1));

        method.append_simple(
            b,
            InstKind::Try {
                catch: Some(handler),
            },
        );
        method.build_inst(Placement::Append(b), |m, inst| {
            let f_cats = CategorySet::G.with(LocationCategory::Method);
            let function = m.make_operand(inst, Effect::Use, f_cats);
            m.bind(function, callee);
            InstKind::Call(crate::inst::CallData {
                function,
                result: None,
                args: vec![],
                caller_save_defs: vec![],
                native: false,
            })
        });
        let t2 = method.append_simple(
            b,
            InstKind::Try {
                catch: Some(handler),
            },
        );
        assert!(!method.is_redundant(t2));
    }

    #[test]
    fn test_replace_filler_keeps_indices() {
        let mut method = Method::new();
        let b = method.create_block(BlockRole::Normal);
        let (v0, v1) = two_vars(&mut method);
        method.append_simple(b, InstKind::Filler);
        let ret = method.append_simple(b, InstKind::Return);

        let assign = method.build_assignment(
            Placement::Replace(b, 0),
            Kind::Int,
            v1,
            v0,
            AssignmentReason::Normal,
        );
        assert_eq!(method.inst(assign).index(), 0);
        assert_eq!(method.inst(ret).index(), 1);
        assert_eq!(method.block(b).inst_count(), 2);
    }

    #[test]
    fn test_pool_renumbering_reassigns_serials() {
        let mut method = Method::new();
        let _v0 = method.create_variable(Kind::Int);
        let v1 = method.create_variable(Kind::Int);
        assert_eq!(method.value(v1).variable().unwrap().serial(), 1);
        method.set_variables(vec![v1]);
        assert_eq!(method.value(v1).variable().unwrap().serial(), 0);
        assert_eq!(method.pool_generation(), 1);
    }

    #[test]
    #[should_panic(expected = "pool set from generation")]
    fn test_pool_renumbering_invalidates_sets() {
        let mut method = Method::new();
        let v1 = method.create_variable(Kind::Int);
        let stale = method.new_pool_set();
        method.set_variables(vec![v1]);
        method.check_pool_set(&stale);
    }

    #[test]
    fn test_fix_location_is_permanent() {
        let mut method = Method::new();
        let fixed = method.create_preallocated(
            Location::IntegerRegister(crate::location::IntReg(3)),
            Kind::Word,
        );
        assert!(method.value(fixed).is_location_fixed());
    }

    #[test]
    #[should_panic(expected = "cannot reassign the fixed location")]
    fn test_set_location_rejects_fixed_values() {
        let mut method = Method::new();
        let fixed = method.create_preallocated(
            Location::IntegerRegister(crate::location::IntReg(3)),
            Kind::Word,
        );
        method.set_location(fixed, None);
    }
}
