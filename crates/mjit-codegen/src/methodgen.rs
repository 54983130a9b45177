//! Per-method generation state.
//!
//! `MethodGeneration` owns the IR of the method being compiled together
//! with everything creation-order dependent: canonical stack slots, the
//! literal pool, interned preallocated values, the shared epilogue, and
//! the ABI the method is compiled under. The register allocator drives it
//! through the split primitives; the emitter consumes the result.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use mjit_abi::{Abi, ParameterPurpose, RegisterRole};
use mjit_ir::{
    AnyReg, AssignmentReason, Block, BlockRole, CallData, CategorySet, ConstantValue, Effect,
    Inst, InstKind, Kind, Location, Method, Operand, Placement, SlotPurpose, StackSlot, Value,
};

use crate::literal::LiteralPool;

/// Generation state for one method.
pub struct MethodGeneration {
    method: Method,
    abi: Box<dyn Abi>,
    literal_pool: LiteralPool,
    /// Slots in this method's frame, canonical by slot index.
    local_stack_slots: Vec<StackSlot>,
    /// Slots in the caller's frame holding incoming parameters.
    parameter_stack_slots: Vec<StackSlot>,
    /// Interning table for preallocated values, keyed by location.
    location_values: BTreeMap<Location, Value>,
    /// One variable per physical register, created on demand.
    register_variables: BTreeMap<AnyReg, Value>,
    epilogue_block: Option<Block>,
    epilogue_inst: Option<Inst>,
    /// Bytes reserved in the frame through stack allocation requests.
    stack_blocks_size: u32,
    is_template: bool,
    uses_shared_epilogue: bool,
}

impl MethodGeneration {
    pub fn new(abi: Box<dyn Abi>, is_template: bool, uses_shared_epilogue: bool) -> Self {
        let word_bytes = abi.word_bytes();
        Self {
            method: Method::new(),
            abi,
            literal_pool: LiteralPool::new(word_bytes),
            local_stack_slots: Vec::new(),
            parameter_stack_slots: Vec::new(),
            location_values: BTreeMap::new(),
            register_variables: BTreeMap::new(),
            epilogue_block: None,
            epilogue_inst: None,
            stack_blocks_size: 0,
            is_template,
            uses_shared_epilogue,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    pub fn abi(&self) -> &dyn Abi {
        &*self.abi
    }

    pub fn literal_pool(&self) -> &LiteralPool {
        &self.literal_pool
    }

    pub(crate) fn literal_pool_mut(&mut self) -> &mut LiteralPool {
        &mut self.literal_pool
    }

    pub fn is_template(&self) -> bool {
        self.is_template
    }

    pub fn uses_shared_epilogue(&self) -> bool {
        self.uses_shared_epilogue
    }

    // ------------------------------------------------------------------
    // Creation

    pub fn create_block(&mut self, role: BlockRole) -> Block {
        self.method.create_block(role)
    }

    pub fn create_variable(&mut self, kind: Kind) -> Value {
        self.method.create_variable(kind)
    }

    pub fn create_constant(&mut self, value: ConstantValue) -> Value {
        self.method.create_constant(value)
    }

    /// Append a jump from `block` to `target`.
    pub fn add_jump(&mut self, block: Block, target: Block) -> Inst {
        self.method.append_jump(block, target)
    }

    /// Append `dest := src`.
    pub fn create_assignment(
        &mut self,
        block: Block,
        kind: Kind,
        dest: Value,
        src: Value,
    ) -> Inst {
        self.method
            .append_assignment(block, kind, dest, src, AssignmentReason::Normal)
    }

    /// The interned value fixed to `location`.
    pub fn preallocate(&mut self, location: Location, kind: Kind) -> Value {
        if let Some(&value) = self.location_values.get(&location) {
            return value;
        }
        let value = self.method.create_preallocated(location, kind);
        self.location_values.insert(location, value);
        value
    }

    /// The variable pinned to physical register `reg`, created on first
    /// request.
    pub fn make_register_variable(&mut self, reg: AnyReg) -> Value {
        if let Some(&value) = self.register_variables.get(&reg) {
            return value;
        }
        let kind = match reg {
            AnyReg::Int(_) => Kind::Word,
            AnyReg::Fp(_) => Kind::Double,
        };
        let value = self.method.create_variable(kind);
        self.method.fix_location(value, reg.location());
        self.register_variables.insert(reg, value);
        value
    }

    fn integer_role_value(&mut self, role: RegisterRole) -> Value {
        let reg = self
            .abi
            .integer_register_acting_as(role)
            .unwrap_or_else(|| panic!("the ABI assigns no integer register to {}", role));
        self.preallocate(Location::IntegerRegister(reg), Kind::Word)
    }

    /// The value pinned to the stack pointer.
    pub fn stack_pointer_value(&mut self) -> Value {
        self.integer_role_value(RegisterRole::StackPointer)
    }

    /// The value pinned to the frame pointer.
    pub fn frame_pointer_value(&mut self) -> Value {
        self.integer_role_value(RegisterRole::FramePointer)
    }

    /// The value pinned to the safepoint latch register.
    pub fn safepoint_latch_value(&mut self) -> Value {
        self.integer_role_value(RegisterRole::SafepointLatch)
    }

    // ------------------------------------------------------------------
    // Stack slots and frame

    /// Allocate a fresh spill slot in this method's frame.
    pub fn allocate_spill_stack_slot(&mut self) -> StackSlot {
        let offset = self.local_stack_slots.len() as u32 * self.abi.stack_slot_size();
        let slot = StackSlot::new(SlotPurpose::Local, offset);
        self.local_stack_slots.push(slot);
        slot
    }

    /// The local slot at `index`, materializing any missing slots below
    /// it.
    pub fn local_stack_slot_from_index(&mut self, index: usize) -> StackSlot {
        let slot_size = self.abi.stack_slot_size();
        while self.local_stack_slots.len() <= index {
            let offset = self.local_stack_slots.len() as u32 * slot_size;
            self.local_stack_slots
                .push(StackSlot::new(SlotPurpose::Local, offset));
        }
        self.local_stack_slots[index]
    }

    /// The canonical slot for `slot`'s (purpose, offset), registering it
    /// and any slot below it in the owning table.
    pub fn canonicalize_stack_slot(&mut self, slot: StackSlot) -> StackSlot {
        assert!(
            slot.purpose != SlotPurpose::Block,
            "frame-allocated blocks are not canonicalized as slots"
        );
        let slot_size = self.abi.stack_slot_size();
        let index = (slot.offset / slot_size) as usize;
        let table = match slot.purpose {
            SlotPurpose::Parameter => &mut self.parameter_stack_slots,
            SlotPurpose::Local => &mut self.local_stack_slots,
            SlotPurpose::Block => unreachable!(),
        };
        while table.len() <= index {
            let offset = table.len() as u32 * slot_size;
            table.push(StackSlot::new(slot.purpose, offset));
        }
        table[index]
    }

    /// Number of local slots allocated so far.
    pub fn local_stack_slot_count(&self) -> usize {
        self.local_stack_slots.len()
    }

    /// Local slots in slot order.
    pub fn allocated_stack_slots(&self) -> &[StackSlot] {
        &self.local_stack_slots
    }

    /// Current frame size, per the ABI's rounding.
    pub fn frame_size(&self) -> u32 {
        self.abi
            .frame_size(self.local_stack_slots.len() as u32, self.stack_blocks_size)
    }

    /// Reserve `size` bytes of frame memory. Returns the offset of the
    /// reserved block from the top of the frame.
    pub fn add_stack_allocation(&mut self, size: u32) -> u32 {
        assert!(
            size % self.abi.word_bytes() == 0,
            "stack allocations must be word aligned"
        );
        self.stack_blocks_size += size;
        self.stack_blocks_size
    }

    /// Total bytes reserved through [`add_stack_allocation`].
    ///
    /// [`add_stack_allocation`]: MethodGeneration::add_stack_allocation
    pub fn stack_blocks_size(&self) -> u32 {
        self.stack_blocks_size
    }

    // ------------------------------------------------------------------
    // Prologue, epilogue, calls

    /// Append the prologue to `block`: callee-saved registers and the
    /// method's parameters become defined at their ABI locations.
    pub fn create_prologue(&mut self, block: Block, parameters: &[Value]) -> Inst {
        let kinds: Vec<Kind> = parameters
            .iter()
            .map(|&p| self.method.value(p).kind())
            .collect();
        let locations = self
            .abi
            .parameter_locations(ParameterPurpose::IncomingParameter, &kinds);
        let callee_saved: Vec<AnyReg> = self.abi.callee_saved().to_vec();

        let mut bindings: Vec<(Value, Location)> = Vec::new();
        for reg in callee_saved {
            let value = self.make_register_variable(reg);
            bindings.push((value, reg.location()));
        }
        for (&parameter, location) in parameters.iter().zip(locations) {
            let location = self.canonicalize_parameter_location(location);
            bindings.push((parameter, location));
        }

        self.method.build_inst(Placement::Append(block), |m, inst| {
            let defs = bindings
                .into_iter()
                .map(|(value, location)| {
                    let categories = CategorySet::of(&[location.category()]);
                    let op = m.make_operand(inst, Effect::Definition, categories);
                    m.set_required_location(op, location);
                    m.bind(op, value);
                    op
                })
                .collect();
            InstKind::Prologue { defs }
        })
    }

    fn canonicalize_parameter_location(&mut self, location: Location) -> Location {
        match location {
            Location::StackSlot(slot) => Location::StackSlot(self.canonicalize_stack_slot(slot)),
            other => other,
        }
    }

    /// The block holding the shared epilogue, created on first request.
    pub fn make_epilogue_block(&mut self) -> Block {
        if let Some(block) = self.epilogue_block {
            return block;
        }
        let block = self.method.create_block(BlockRole::Normal);
        self.epilogue_block = Some(block);
        block
    }

    pub fn epilogue_block(&self) -> Option<Block> {
        self.epilogue_block
    }

    /// The shared epilogue instruction, created (with its return) on first
    /// request. Callee-saved registers become used here; template methods
    /// get no return since they end in a jump to the next template.
    pub fn make_epilogue(&mut self) -> Inst {
        if let Some(inst) = self.epilogue_inst {
            return inst;
        }
        let block = self.make_epilogue_block();
        let callee_saved: Vec<AnyReg> = self.abi.callee_saved().to_vec();
        let mut bindings: Vec<(Value, Location)> = Vec::new();
        for reg in callee_saved {
            let value = self.make_register_variable(reg);
            bindings.push((value, reg.location()));
        }
        let inst = self.method.build_inst(Placement::Append(block), |m, inst| {
            let uses = bindings
                .into_iter()
                .map(|(value, location)| {
                    let categories = CategorySet::of(&[location.category()]);
                    let op = m.make_operand(inst, Effect::Use, categories);
                    m.set_required_location(op, location);
                    m.bind(op, value);
                    op
                })
                .collect();
            InstKind::Epilogue { uses }
        });
        if !self.is_template {
            self.method.append_simple(block, InstKind::Return);
        }
        self.epilogue_inst = Some(inst);
        inst
    }

    /// Record that the epilogue uses `value` at its ABI result location.
    /// For non-void methods this pins the returned value.
    pub fn add_epilogue_result(&mut self, value: Value) {
        let kind = self.method.value(value).kind();
        let location = self
            .abi
            .result_location(Some(kind))
            .expect("result location for a non-void kind");
        self.add_epilogue_use_at(value, Some(location));
    }

    /// Record an additional epilogue use, optionally pinned to a location.
    pub fn add_epilogue_use_at(&mut self, value: Value, location: Option<Location>) {
        let epilogue = self.make_epilogue();
        let categories = match location {
            Some(location) => CategorySet::of(&[location.category()]),
            None => mjit_ir::assignment_src_categories(self.method.value(value).kind()),
        };
        let op = self.method.make_operand(epilogue, Effect::Use, categories);
        if let Some(location) = location {
            self.method.set_required_location(op, location);
        }
        self.method.bind(op, value);
        self.method.append_operand_to(epilogue, op);
    }

    /// Append a call to `block`.
    ///
    /// Arguments and the result are pinned to their ABI locations;
    /// oversized argument lists overflow into canonical stack slots. One
    /// synthetic definition per caller-saved register models the clobber,
    /// excluding the register holding the result.
    pub fn create_call(
        &mut self,
        block: Block,
        function: Value,
        arguments: &[Value],
        result: Option<Value>,
        native: bool,
    ) -> Inst {
        let arg_kinds: Vec<Kind> = arguments
            .iter()
            .map(|&a| self.method.value(a).kind())
            .collect();
        let arg_locations: Vec<Location> = self
            .abi
            .parameter_locations(ParameterPurpose::OutgoingCall, &arg_kinds)
            .into_iter()
            .map(|location| self.canonicalize_parameter_location(location))
            .collect();
        let result_location = result.map(|r| {
            let kind = self.method.value(r).kind();
            self.abi
                .result_location(Some(kind))
                .expect("result location for a non-void kind")
        });
        let clobbers: Vec<(AnyReg, Value)> = self
            .abi
            .caller_saved()
            .to_vec()
            .into_iter()
            .filter(|reg| Some(reg.location()) != result_location)
            .map(|reg| (reg, self.make_register_variable(reg)))
            .collect();

        let result_binding = result.zip(result_location);
        let arg_bindings: Vec<(Value, Location)> = arguments
            .iter()
            .copied()
            .zip(arg_locations)
            .collect();

        self.method.build_inst(Placement::Append(block), |m, inst| {
            let function_categories =
                CategorySet::G.with(mjit_ir::LocationCategory::Method);
            let function_op = m.make_operand(inst, Effect::Use, function_categories);
            m.bind(function_op, function);

            let result_op = result_binding.map(|(value, location)| {
                let categories = CategorySet::of(&[location.category()]);
                let op = m.make_operand(inst, Effect::Definition, categories);
                m.set_required_location(op, location);
                m.bind(op, value);
                op
            });

            let args = arg_bindings
                .into_iter()
                .map(|(value, location)| {
                    let categories = CategorySet::of(&[location.category()]);
                    let op = m.make_operand(inst, Effect::Use, categories);
                    m.set_required_location(op, location);
                    m.bind(op, value);
                    op
                })
                .collect();

            let caller_save_defs = clobbers
                .into_iter()
                .map(|(reg, value)| {
                    let categories = CategorySet::of(&[reg.location().category()]);
                    let op = m.make_operand(inst, Effect::Definition, categories);
                    m.set_required_location(op, reg.location());
                    m.bind(op, value);
                    op
                })
                .collect();

            InstKind::Call(CallData {
                function: function_op,
                result: result_op,
                args,
                caller_save_defs,
                native,
            })
        })
    }

    /// Append a catch pseudo-instruction, pinning the exception parameter
    /// to the location the runtime delivers it in.
    pub fn create_catch(
        &mut self,
        block: Block,
        parameter: Option<(Value, Location)>,
    ) -> Inst {
        self.method.build_inst(Placement::Append(block), |m, inst| {
            let parameter = parameter.map(|(value, location)| {
                let categories = CategorySet::of(&[location.category()]);
                let op = m.make_operand(inst, Effect::Definition, categories);
                m.set_required_location(op, location);
                m.bind(op, value);
                op
            });
            InstKind::Catch { parameter }
        })
    }

    /// Append a safepoint.
    pub fn create_safepoint(&mut self, block: Block) -> Inst {
        self.method.append_simple(
            block,
            InstKind::Infopoint {
                kind: mjit_ir::InfopointKind::Safepoint,
                dest: None,
            },
        )
    }

    /// Append an infopoint capturing the current code address into
    /// `dest`.
    pub fn create_here(&mut self, block: Block, dest: Value) -> Inst {
        self.method.build_inst(Placement::Append(block), |m, inst| {
            let categories = mjit_ir::assignment_dest_categories(m.value(dest).kind());
            let op = m.make_operand(inst, Effect::Definition, categories);
            m.bind(op, dest);
            InstKind::Infopoint {
                kind: mjit_ir::InfopointKind::Here,
                dest: Some(op),
            }
        })
    }

    // ------------------------------------------------------------------
    // Instruction placement

    /// Place an assignment before `at`, overwriting an adjacent redundant
    /// instruction instead of shifting indices when possible.
    pub fn introduce_assignment_before(
        &mut self,
        at: Inst,
        kind: Kind,
        dest: Value,
        src: Value,
        reason: AssignmentReason,
    ) -> Inst {
        let point = self.method.inst_point(at);
        let placement = if point.index > 0
            && self
                .method
                .is_redundant(self.method.inst_at(point.block, point.index - 1))
        {
            Placement::Replace(point.block, point.index - 1)
        } else {
            Placement::Before(point.block, point.index)
        };
        self.method
            .build_assignment(placement, kind, dest, src, reason)
    }

    /// Place an assignment after `at`, preferring to overwrite an adjacent
    /// redundant instruction.
    pub fn introduce_assignment_after(
        &mut self,
        at: Inst,
        kind: Kind,
        dest: Value,
        src: Value,
        reason: AssignmentReason,
    ) -> Inst {
        let point = self.method.inst_point(at);
        let next = point.index + 1;
        let placement = if next == self.method.block(point.block).inst_count() {
            Placement::Append(point.block)
        } else if self
            .method
            .is_redundant(self.method.inst_at(point.block, next))
        {
            Placement::Replace(point.block, next)
        } else {
            Placement::Before(point.block, next)
        };
        self.method
            .build_assignment(placement, kind, dest, src, reason)
    }

    // ------------------------------------------------------------------
    // Variable splitting

    /// Split at a definition: insert `variable := source` after the
    /// defining instruction and rebind the operand to the fresh `source`.
    pub fn split_variable_at_definition(&mut self, variable: Value, operand: Operand) -> Value {
        let kind = self.method.value(variable).kind();
        let source = self.create_variable(kind);
        let at = self.method.operand(operand).inst();
        self.introduce_assignment_after(at, kind, variable, source, AssignmentReason::FixedSplit);
        self.method.bind(operand, source);
        source
    }

    /// Split at a use: insert `destination := variable` before the using
    /// instruction and rebind the operand to the fresh `destination`.
    pub fn split_variable_at_use(&mut self, variable: Value, operand: Operand) -> Value {
        let kind = self.method.value(variable).kind();
        let destination = self.create_variable(kind);
        let at = self.method.operand(operand).inst();
        self.introduce_assignment_before(
            at,
            kind,
            destination,
            variable,
            AssignmentReason::FixedSplit,
        );
        self.method.bind(operand, destination);
        destination
    }

    /// Split at an update: copy in before and copy out after, rebinding
    /// the operand to the temporary.
    pub fn split_variable_at_update(&mut self, variable: Value, operand: Operand) -> Value {
        let kind = self.method.value(variable).kind();
        let temporary = self.create_variable(kind);
        let at = self.method.operand(operand).inst();
        self.introduce_assignment_before(
            at,
            kind,
            temporary,
            variable,
            AssignmentReason::FixedSplit,
        );
        self.introduce_assignment_after(at, kind, variable, temporary, AssignmentReason::FixedSplit);
        self.method.bind(operand, temporary);
        temporary
    }

    /// Split at an operand, dispatching on its effect.
    pub fn split_variable_at_operand(&mut self, variable: Value, operand: Operand) -> Value {
        match self.method.operand(operand).effect() {
            Effect::Definition => self.split_variable_at_definition(variable, operand),
            Effect::Use => self.split_variable_at_use(variable, operand),
            Effect::Update => self.split_variable_at_update(variable, operand),
        }
    }

    // ------------------------------------------------------------------
    // Cleanup

    /// Remove an instruction in place, leaving a filler so no renumbering
    /// happens.
    pub fn remove_instruction(&mut self, inst: Inst) {
        self.method.make_filler(inst);
    }

    /// Drop variables without any operands from the pool, renumbering the
    /// survivors and invalidating outstanding pool-sets.
    pub fn clear_empty_variables(&mut self) {
        let has_empty = self
            .method
            .variables()
            .iter()
            .any(|&v| self.method.value(v).operands().is_empty());
        if !has_empty {
            return;
        }
        let survivors: Vec<Value> = self
            .method
            .variables()
            .iter()
            .copied()
            .filter(|&v| !self.method.value(v).operands().is_empty())
            .collect();
        self.method.set_variables(survivors);
    }

    /// Delete redundant instructions (fillers, re-established trys,
    /// same-location assignments) from every block.
    pub fn trim(&mut self) {
        for block in self.method.block_order().to_vec() {
            let mut index = 0;
            while index < self.method.block(block).inst_count() {
                let inst = self.method.inst_at(block, index);
                if self.method.is_redundant(inst) {
                    self.method.remove_inst(inst);
                } else {
                    index += 1;
                }
            }
        }
    }

    /// Check that every operand bound to a constant has a concrete
    /// location assigned.
    pub fn constants_allocated(&self) -> bool {
        for &block in self.method.block_order() {
            for &inst in self.method.block(block).insts() {
                for op in self.method.inst(inst).kind().operands() {
                    if let Some(value) = self.method.operand(op).value() {
                        let data = self.method.value(value);
                        if data.is_constant() && data.location().is_none() {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Abort if any constant-bearing operand lacks a location. The
    /// allocator calls this once the method is fully allocated.
    pub fn assert_fully_allocated(&self) {
        assert!(
            self.constants_allocated(),
            "a constant-bearing operand has no location"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mjit_abi::testing::TestAbi;
    use mjit_ir::MethodRef;

    fn new_generation() -> MethodGeneration {
        MethodGeneration::new(Box::new(TestAbi::new()), false, true)
    }

    #[test]
    fn test_preallocate_interns_by_location() {
        let mut generation = new_generation();
        let sp1 = generation.stack_pointer_value();
        let sp2 = generation.stack_pointer_value();
        assert_eq!(sp1, sp2);
        let fp = generation.frame_pointer_value();
        assert_ne!(sp1, fp);
    }

    #[test]
    fn test_register_variables_are_shared() {
        let mut generation = new_generation();
        let reg = AnyReg::Int(mjit_ir::IntReg(8));
        let a = generation.make_register_variable(reg);
        let b = generation.make_register_variable(reg);
        assert_eq!(a, b);
        assert_eq!(
            generation.method().value(a).location(),
            Some(reg.location())
        );
    }

    #[test]
    fn test_stack_slot_canonicalization() {
        let mut generation = new_generation();
        let slot_size = generation.abi().stack_slot_size();
        let slot = generation.canonicalize_stack_slot(StackSlot::new(
            SlotPurpose::Local,
            2 * slot_size,
        ));
        let again =
            generation.canonicalize_stack_slot(StackSlot::new(SlotPurpose::Local, 2 * slot_size));
        assert_eq!(slot, again);
        // Slots below the requested one are materialized.
        assert_eq!(generation.local_stack_slot_count(), 3);
    }

    #[test]
    fn test_spill_slot_offsets_and_frame_size() {
        let mut generation = new_generation();
        let slot_size = generation.abi().stack_slot_size();
        let s0 = generation.allocate_spill_stack_slot();
        let s1 = generation.allocate_spill_stack_slot();
        assert_eq!(s0.offset, 0);
        assert_eq!(s1.offset, slot_size);
        let frame = generation.frame_size();
        assert!(frame >= 2 * slot_size);
        assert_eq!(frame % generation.abi().frame_alignment(), 0);

        generation.add_stack_allocation(generation.abi().word_bytes() * 2);
        assert!(generation.frame_size() > frame);
    }

    #[test]
    fn test_prologue_defines_parameters_at_abi_locations() {
        let mut generation = new_generation();
        let entry = generation.create_block(BlockRole::Normal);
        let p0 = generation.create_variable(Kind::Int);
        let p1 = generation.create_variable(Kind::Double);
        let prologue = generation.create_prologue(entry, &[p0, p1]);

        let method = generation.method();
        match method.inst(prologue).kind() {
            InstKind::Prologue { defs } => {
                let callee_saved = generation.abi().callee_saved().len();
                assert_eq!(defs.len(), callee_saved + 2);
                // The parameter operands are pinned and bound.
                let p0_op = defs[callee_saved];
                assert_eq!(method.operand(p0_op).value(), Some(p0));
                assert!(matches!(
                    method.operand(p0_op).required_location(),
                    Some(Location::IntegerRegister(_))
                ));
                let p1_op = defs[callee_saved + 1];
                assert!(matches!(
                    method.operand(p1_op).required_location(),
                    Some(Location::FloatRegister(_))
                ));
            }
            other => panic!("expected prologue, got {:?}", other),
        }
        assert_eq!(method.value(p0).num_definitions(), 1);
    }

    #[test]
    fn test_call_clobbers_caller_saved_except_result() {
        let mut generation = new_generation();
        let block = generation.create_block(BlockRole::Normal);
        let callee = generation.method_mut().create_method_value(MethodRef(3));
        let arg = generation.create_variable(Kind::Int);
        let result = generation.create_variable(Kind::Int);
        let call = generation.create_call(block, callee, &[arg], Some(result), false);

        let method = generation.method();
        let result_location = generation.abi().result_location(Some(Kind::Int)).unwrap();
        match method.inst(call).kind() {
            InstKind::Call(data) => {
                assert!(!data.native);
                assert_eq!(data.args.len(), 1);
                // every caller-saved register except the result register
                assert_eq!(
                    data.caller_save_defs.len(),
                    generation.abi().caller_saved().len() - 1
                );
                for &clobber in &data.caller_save_defs {
                    let required = method.operand(clobber).required_location().unwrap();
                    assert_ne!(required, result_location);
                    assert_eq!(method.operand(clobber).effect(), Effect::Definition);
                }
                let result_op = data.result.unwrap();
                assert_eq!(
                    method.operand(result_op).required_location(),
                    Some(result_location)
                );
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_call_overflow_arguments_are_canonical_slots() {
        let mut generation = new_generation();
        let block = generation.create_block(BlockRole::Normal);
        let callee = generation.method_mut().create_method_value(MethodRef(3));
        let reg_args = generation.abi().integer_parameter_registers().len();
        let slot_size = generation.abi().stack_slot_size();
        let args: Vec<Value> = (0..reg_args + 2)
            .map(|_| generation.create_variable(Kind::Word))
            .collect();
        let call = generation.create_call(block, callee, &args, None, true);

        let method = generation.method();
        match method.inst(call).kind() {
            InstKind::Call(data) => {
                assert!(data.native);
                // Highest-index argument packs first: the last argument
                // takes the slot at offset 0.
                let first_overflow = data.args[reg_args];
                match method.operand(first_overflow).required_location() {
                    Some(Location::StackSlot(slot)) => {
                        assert_eq!(slot.purpose, SlotPurpose::Local);
                        assert_eq!(slot.offset, slot_size);
                    }
                    other => panic!("expected stack slot, got {:?}", other),
                }
                let last_overflow = data.args[reg_args + 1];
                match method.operand(last_overflow).required_location() {
                    Some(Location::StackSlot(slot)) => {
                        assert_eq!(slot.purpose, SlotPurpose::Local);
                        assert_eq!(slot.offset, 0);
                    }
                    other => panic!("expected stack slot, got {:?}", other),
                }
            }
            other => panic!("expected call, got {:?}", other),
        }
        // Overflow slots are registered in the local table.
        assert!(generation.local_stack_slot_count() >= 2);
    }

    #[test]
    fn test_epilogue_created_once_with_return() {
        let mut generation = new_generation();
        let e1 = generation.make_epilogue();
        let e2 = generation.make_epilogue();
        assert_eq!(e1, e2);
        let block = generation.epilogue_block().unwrap();
        let method = generation.method();
        assert_eq!(method.block(block).inst_count(), 2);
        assert!(matches!(
            method.inst(method.inst_at(block, 1)).kind(),
            InstKind::Return
        ));

        let result = generation.create_variable(Kind::Int);
        generation.add_epilogue_result(result);
        let method = generation.method();
        assert_eq!(method.value(result).num_uses(), 1);
    }

    #[test]
    fn test_template_epilogue_has_no_return() {
        let mut generation = MethodGeneration::new(Box::new(TestAbi::template()), true, true);
        generation.make_epilogue();
        let block = generation.epilogue_block().unwrap();
        assert_eq!(generation.method().block(block).inst_count(), 1);
    }

    #[test]
    fn test_split_at_use_inserts_copy_before() {
        let mut generation = new_generation();
        let block = generation.create_block(BlockRole::Normal);
        let v = generation.create_variable(Kind::Int);
        let w = generation.create_variable(Kind::Int);
        generation.create_assignment(block, Kind::Int, v, w); // 0: v := w
        let use_inst = generation.create_assignment(block, Kind::Int, w, v); // 1: w := v
        let use_op = match generation.method().inst(use_inst).kind() {
            InstKind::Assignment { src, .. } => *src,
            _ => unreachable!(),
        };

        let fresh = generation.split_variable_at_use(v, use_op);
        let method = generation.method();
        // new: v:=w ; fresh:=v ; w:=fresh
        assert_eq!(method.block(block).inst_count(), 3);
        assert_eq!(method.operand(use_op).value(), Some(fresh));
        let copy = method.inst_at(block, 1);
        match method.inst(copy).kind() {
            InstKind::Assignment { reason, dest, src, .. } => {
                assert_eq!(*reason, AssignmentReason::FixedSplit);
                assert_eq!(method.operand(*dest).value(), Some(fresh));
                assert_eq!(method.operand(*src).value(), Some(v));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_split_at_definition_inserts_copy_after() {
        let mut generation = new_generation();
        let block = generation.create_block(BlockRole::Normal);
        let v = generation.create_variable(Kind::Int);
        let w = generation.create_variable(Kind::Int);
        let def_inst = generation.create_assignment(block, Kind::Int, v, w); // 0: v := w
        generation.create_assignment(block, Kind::Int, w, v); // 1: w := v
        let def_op = match generation.method().inst(def_inst).kind() {
            InstKind::Assignment { dest, .. } => *dest,
            _ => unreachable!(),
        };

        let source = generation.split_variable_at_definition(v, def_op);
        let method = generation.method();
        // new: source:=w ; v:=source ; w:=v
        assert_eq!(method.operand(def_op).value(), Some(source));
        let copy = method.inst_at(block, 1);
        match method.inst(copy).kind() {
            InstKind::Assignment { dest, src, .. } => {
                assert_eq!(method.operand(*dest).value(), Some(v));
                assert_eq!(method.operand(*src).value(), Some(source));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_split_at_update_wraps_instruction() {
        let mut generation = new_generation();
        let block = generation.create_block(BlockRole::Normal);
        let v = generation.create_variable(Kind::Int);
        // An epilogue-style instruction with an update operand.
        let inst = generation.method_mut().build_inst(
            Placement::Append(block),
            |m, inst| {
                let op = m.make_operand(inst, Effect::Update, CategorySet::G_S);
                m.bind(op, v);
                InstKind::Epilogue {
                    uses: alloc::vec![op],
                }
            },
        );
        let op = match generation.method().inst(inst).kind() {
            InstKind::Epilogue { uses } => uses[0],
            _ => unreachable!(),
        };

        let temp = generation.split_variable_at_update(v, op);
        let method = generation.method();
        assert_eq!(method.block(block).inst_count(), 3);
        assert_eq!(method.operand(op).value(), Some(temp));
        // temp := v before, v := temp after
        assert_eq!(method.inst(method.inst_at(block, 1)).index(), 1);
        match method.inst(method.inst_at(block, 0)).kind() {
            InstKind::Assignment { dest, src, .. } => {
                assert_eq!(method.operand(*dest).value(), Some(temp));
                assert_eq!(method.operand(*src).value(), Some(v));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
        match method.inst(method.inst_at(block, 2)).kind() {
            InstKind::Assignment { dest, src, .. } => {
                assert_eq!(method.operand(*dest).value(), Some(v));
                assert_eq!(method.operand(*src).value(), Some(temp));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_split_prefers_overwriting_fillers() {
        let mut generation = new_generation();
        let block = generation.create_block(BlockRole::Normal);
        let v = generation.create_variable(Kind::Int);
        let w = generation.create_variable(Kind::Int);
        generation.create_assignment(block, Kind::Int, v, w); // 0
        generation
            .method_mut()
            .append_simple(block, InstKind::Filler); // 1
        let use_inst = generation.create_assignment(block, Kind::Int, w, v); // 2
        let use_op = match generation.method().inst(use_inst).kind() {
            InstKind::Assignment { src, .. } => *src,
            _ => unreachable!(),
        };

        generation.split_variable_at_use(v, use_op);
        // The filler was overwritten; no index shift happened.
        let method = generation.method();
        assert_eq!(method.block(block).inst_count(), 3);
        assert_eq!(method.inst(use_inst).index(), 2);
    }

    #[test]
    fn test_clear_empty_variables_renumbers() {
        let mut generation = new_generation();
        let block = generation.create_block(BlockRole::Normal);
        let dead = generation.create_variable(Kind::Int);
        let v = generation.create_variable(Kind::Int);
        let w = generation.create_variable(Kind::Int);
        generation.create_assignment(block, Kind::Int, v, w);

        let old_generation = generation.method().pool_generation();
        generation.clear_empty_variables();
        let method = generation.method();
        assert_eq!(method.variables().len(), 2);
        assert!(method.pool_generation() > old_generation);
        assert_eq!(method.value(v).variable().unwrap().serial(), 0);
        let _ = dead;

        // Idempotent when nothing is empty.
        let pool_generation = generation.method().pool_generation();
        generation.clear_empty_variables();
        assert_eq!(generation.method().pool_generation(), pool_generation);
    }

    #[test]
    fn test_trim_removes_fillers_and_redundant_trys() {
        let mut generation = new_generation();
        let block = generation.create_block(BlockRole::Normal);
        let handler = generation.create_block(BlockRole::ExceptionDispatcher);
        generation
            .method_mut()
            .append_simple(block, InstKind::Filler);
        generation.method_mut().append_simple(
            block,
            InstKind::Try {
                catch: Some(handler),
            },
        );
        generation.method_mut().append_simple(
            block,
            InstKind::Try {
                catch: Some(handler),
            },
        );
        generation
            .method_mut()
            .append_simple(block, InstKind::Return);

        generation.trim();
        let method = generation.method();
        assert_eq!(method.block(block).inst_count(), 2);
        assert!(matches!(
            method.inst(method.inst_at(block, 0)).kind(),
            InstKind::Try { .. }
        ));
    }
}
