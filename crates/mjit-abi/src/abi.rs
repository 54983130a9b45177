//! The ABI policy trait.

use alloc::vec::Vec;

use mjit_ir::{AnyReg, FpReg, IntReg, Kind, Location, SlotPurpose, StackSlot};

use crate::role::RegisterRole;

/// Whether parameter locations are being resolved for the method's own
/// incoming parameters or for the arguments of a call site it contains.
/// Determines which frame the overflow stack slots belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterPurpose {
    /// Incoming parameters, in the caller's frame.
    IncomingParameter,
    /// Outgoing call arguments, in this method's frame.
    OutgoingCall,
}

impl ParameterPurpose {
    /// The stack-slot purpose overflow arguments are canonicalized under.
    pub fn slot_purpose(self) -> SlotPurpose {
        match self {
            ParameterPurpose::IncomingParameter => SlotPurpose::Parameter,
            ParameterPurpose::OutgoingCall => SlotPurpose::Local,
        }
    }
}

fn align_to(size: u32, alignment: u32) -> u32 {
    (size + alignment - 1) & !(alignment - 1)
}

/// Per-platform calling-convention policy.
///
/// Implementations are immutable after construction and may be shared
/// freely across compilation threads.
pub trait Abi {
    /// Machine word size in bytes.
    fn word_bytes(&self) -> u32;

    /// Size of one stack slot in bytes.
    fn stack_slot_size(&self) -> u32;

    /// Frame size alignment in bytes.
    fn frame_alignment(&self) -> u32;

    /// Total frame size for a method with `local_slot_count` local slots
    /// and `stack_block_bytes` of frame-allocated memory.
    fn frame_size(&self, local_slot_count: u32, stack_block_bytes: u32) -> u32 {
        align_to(
            local_slot_count * self.stack_slot_size() + stack_block_bytes,
            self.frame_alignment(),
        )
    }

    /// The integer register acting in `role`, if the platform assigns one.
    fn integer_register_acting_as(&self, role: RegisterRole) -> Option<IntReg>;

    /// The floating point register acting in `role`, if any.
    fn float_register_acting_as(&self, role: RegisterRole) -> Option<FpReg>;

    /// Where a callee of this convention produces a result of `kind`.
    /// `None` kind (void) has no location.
    fn result_location(&self, kind: Option<Kind>) -> Option<Location> {
        self.role_location(RegisterRole::Result, kind)
    }

    /// Where a caller observes a returned value of `kind`.
    fn return_location(&self, kind: Option<Kind>) -> Option<Location> {
        self.role_location(RegisterRole::Return, kind)
    }

    /// Dispatch a role to a register location by value kind.
    fn role_location(&self, role: RegisterRole, kind: Option<Kind>) -> Option<Location> {
        let kind = kind?;
        if kind.is_float() {
            self.float_register_acting_as(role)
                .map(Location::FloatRegister)
        } else {
            self.integer_register_acting_as(role)
                .map(Location::IntegerRegister)
        }
    }

    /// The scratch register for temporaries of `kind`.
    fn scratch_register(&self, kind: Kind) -> Option<AnyReg> {
        if kind.is_float() {
            self.float_register_acting_as(RegisterRole::Scratch)
                .map(AnyReg::Fp)
        } else {
            self.integer_register_acting_as(RegisterRole::Scratch)
                .map(AnyReg::Int)
        }
    }

    /// Integer registers used for parameter passing, in order.
    fn integer_parameter_registers(&self) -> &[IntReg];

    /// Floating point registers used for parameter passing, in order.
    fn float_parameter_registers(&self) -> &[FpReg];

    /// One location per parameter kind: register-first, overflowing to
    /// stack slots at slot-size-aligned offsets, packed highest-index
    /// argument first. The last overflowing argument sits at offset 0.
    fn parameter_locations(&self, purpose: ParameterPurpose, kinds: &[Kind]) -> Vec<Location> {
        let mut registers: Vec<Option<Location>> = Vec::with_capacity(kinds.len());
        let mut next_int = 0usize;
        let mut next_float = 0usize;
        for &kind in kinds {
            let register = if kind.is_float() {
                let reg = self
                    .float_parameter_registers()
                    .get(next_float)
                    .map(|&r| Location::FloatRegister(r));
                next_float += 1;
                reg
            } else {
                let reg = self
                    .integer_parameter_registers()
                    .get(next_int)
                    .map(|&r| Location::IntegerRegister(r));
                next_int += 1;
                reg
            };
            registers.push(register);
        }
        let mut remaining = registers.iter().filter(|r| r.is_none()).count() as u32;
        registers
            .into_iter()
            .map(|register| {
                register.unwrap_or_else(|| {
                    remaining -= 1;
                    Location::StackSlot(StackSlot::new(
                        purpose.slot_purpose(),
                        remaining * self.stack_slot_size(),
                    ))
                })
            })
            .collect()
    }

    /// Registers a callee may clobber, in a fixed platform order.
    fn caller_saved(&self) -> &[AnyReg];

    /// Registers a callee must preserve, in a fixed platform order.
    fn callee_saved(&self) -> &[AnyReg];

    /// Integer registers the allocator may hand out.
    fn allocatable_integer_registers(&self) -> &[IntReg];

    /// Floating point registers the allocator may hand out.
    fn allocatable_float_registers(&self) -> &[FpReg];

    /// Size of the integer register file (register reference maps carry
    /// one bit per ordinal).
    fn integer_register_count(&self) -> u32;

    /// Size of the floating point register file.
    fn float_register_count(&self) -> u32;

    /// Whether this convention targets interpreter templates: generated
    /// code ends in a jump to the next template rather than a return.
    fn targets_templates(&self) -> bool {
        false
    }
}
