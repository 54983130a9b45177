//! A synthetic calling convention for unit tests.
//!
//! Sixteen integer registers and eight float registers on a 64-bit word.
//! Not modeled on any shipped platform; the numbers are chosen so tests
//! can exercise register exhaustion and overflow without long kind lists.

use mjit_ir::{AnyReg, FpReg, IntReg, Kind};

use crate::abi::Abi;
use crate::role::RegisterRole;

/// Test ABI.
///
/// Register plan: r1..r4 carry parameters, r0 carries results, r11 is the
/// scratch register, r13 the safepoint latch, r12 the literal base, r14
/// the frame pointer and r15 the stack pointer. f1..f4 carry float
/// parameters and f0 float results; f7 is the float scratch.
#[derive(Debug, Clone)]
pub struct TestAbi {
    template: bool,
}

const INT_PARAMS: [IntReg; 4] = [IntReg(1), IntReg(2), IntReg(3), IntReg(4)];
const FLOAT_PARAMS: [FpReg; 4] = [FpReg(1), FpReg(2), FpReg(3), FpReg(4)];

const CALLER_SAVED: [AnyReg; 14] = [
    AnyReg::Int(IntReg(0)),
    AnyReg::Int(IntReg(1)),
    AnyReg::Int(IntReg(2)),
    AnyReg::Int(IntReg(3)),
    AnyReg::Int(IntReg(4)),
    AnyReg::Int(IntReg(5)),
    AnyReg::Int(IntReg(6)),
    AnyReg::Int(IntReg(7)),
    AnyReg::Fp(FpReg(0)),
    AnyReg::Fp(FpReg(1)),
    AnyReg::Fp(FpReg(2)),
    AnyReg::Fp(FpReg(3)),
    AnyReg::Fp(FpReg(4)),
    AnyReg::Fp(FpReg(5)),
];

const CALLEE_SAVED: [AnyReg; 4] = [
    AnyReg::Int(IntReg(8)),
    AnyReg::Int(IntReg(9)),
    AnyReg::Int(IntReg(10)),
    AnyReg::Fp(FpReg(6)),
];

const ALLOCATABLE_INT: [IntReg; 11] = [
    IntReg(0),
    IntReg(1),
    IntReg(2),
    IntReg(3),
    IntReg(4),
    IntReg(5),
    IntReg(6),
    IntReg(7),
    IntReg(8),
    IntReg(9),
    IntReg(10),
];

const ALLOCATABLE_FLOAT: [FpReg; 7] = [
    FpReg(0),
    FpReg(1),
    FpReg(2),
    FpReg(3),
    FpReg(4),
    FpReg(5),
    FpReg(6),
];

impl TestAbi {
    pub fn new() -> Self {
        Self { template: false }
    }

    /// A template-targeting variant for scheme tests.
    pub fn template() -> Self {
        Self { template: true }
    }
}

impl Default for TestAbi {
    fn default() -> Self {
        Self::new()
    }
}

impl Abi for TestAbi {
    fn word_bytes(&self) -> u32 {
        8
    }

    fn stack_slot_size(&self) -> u32 {
        8
    }

    fn frame_alignment(&self) -> u32 {
        16
    }

    fn integer_register_acting_as(&self, role: RegisterRole) -> Option<IntReg> {
        match role {
            RegisterRole::StackPointer => Some(IntReg(15)),
            RegisterRole::FramePointer => Some(IntReg(14)),
            RegisterRole::Result | RegisterRole::Return => Some(IntReg(0)),
            RegisterRole::Scratch => Some(IntReg(11)),
            RegisterRole::SafepointLatch => Some(IntReg(13)),
            RegisterRole::LiteralBase => Some(IntReg(12)),
        }
    }

    fn float_register_acting_as(&self, role: RegisterRole) -> Option<FpReg> {
        match role {
            RegisterRole::Result | RegisterRole::Return => Some(FpReg(0)),
            RegisterRole::Scratch => Some(FpReg(7)),
            _ => None,
        }
    }

    fn integer_parameter_registers(&self) -> &[IntReg] {
        &INT_PARAMS
    }

    fn float_parameter_registers(&self) -> &[FpReg] {
        &FLOAT_PARAMS
    }

    fn caller_saved(&self) -> &[AnyReg] {
        &CALLER_SAVED
    }

    fn callee_saved(&self) -> &[AnyReg] {
        &CALLEE_SAVED
    }

    fn allocatable_integer_registers(&self) -> &[IntReg] {
        &ALLOCATABLE_INT
    }

    fn allocatable_float_registers(&self) -> &[FpReg] {
        &ALLOCATABLE_FLOAT
    }

    fn integer_register_count(&self) -> u32 {
        16
    }

    fn float_register_count(&self) -> u32 {
        8
    }

    fn targets_templates(&self) -> bool {
        self.template
    }
}
