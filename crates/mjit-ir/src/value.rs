//! Abstract values: variables, constants, preallocated locations and
//! method references.

use alloc::vec::Vec;
use core::fmt;

use crate::analysis::liveness::LiveRange;
use crate::constant::{ConstantValue, MethodRef};
use crate::entity::{Operand, Value};
use crate::kind::Kind;
use crate::location::{CategorySet, Location};
use crate::pool::PoolSet;

/// Per-variable state.
///
/// Variables are the only values with live ranges and interference sets.
/// The serial is the variable's index in the method's variable pool and is
/// reassigned when dead variables are pruned; any pool-set taken before a
/// renumbering is rejected by its generation tag afterwards.
#[derive(Debug, Clone)]
pub struct VariableData {
    pub(crate) serial: u32,
    pub(crate) weight: u32,
    pub(crate) live_range: LiveRange,
    pub(crate) interferences: Option<PoolSet>,
    pub(crate) aliases: Vec<Value>,
}

impl VariableData {
    pub(crate) fn new(serial: u32) -> Self {
        Self {
            serial,
            weight: 0,
            live_range: LiveRange::new(),
            interferences: None,
            aliases: Vec::new(),
        }
    }

    /// The variable's serial in the method's variable pool.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Allocation priority; higher-weight variables are placed first.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// The variable's live range.
    pub fn live_range(&self) -> &LiveRange {
        &self.live_range
    }

    /// Variables that must also be marked used whenever this variable is
    /// recorded as used. One-directional.
    pub fn aliases(&self) -> &[Value] {
        &self.aliases
    }
}

/// What a value is.
#[derive(Debug, Clone)]
pub enum ValuePayload {
    /// Allocatable variable.
    Variable(VariableData),
    /// Immutable constant; the payload may be shared by per-category
    /// clones created during constant materialization.
    Constant(ConstantValue),
    /// Value fixed to a specific location at creation, e.g. a calling
    /// convention register.
    Preallocated,
    /// Symbolic callee.
    Method(MethodRef),
    /// Sentinel for "no value".
    Undefined,
}

/// Per-value data: kind, payload, location state, and the operand sites
/// currently bound to this value.
#[derive(Debug, Clone)]
pub struct ValueData {
    pub(crate) kind: Kind,
    pub(crate) payload: ValuePayload,
    pub(crate) location: Option<Location>,
    pub(crate) location_fixed: bool,
    /// Insertion-stable set of operands bound to this value.
    pub(crate) operands: Vec<Operand>,
    pub(crate) num_uses: u32,
    pub(crate) num_updates: u32,
    pub(crate) num_definitions: u32,
    /// Cached intersection of all operands' category sets; invalidated on
    /// every operand attach/detach.
    pub(crate) categories_cache: Option<CategorySet>,
}

impl ValueData {
    pub(crate) fn new(kind: Kind, payload: ValuePayload) -> Self {
        Self {
            kind,
            payload,
            location: None,
            location_fixed: false,
            operands: Vec::new(),
            num_uses: 0,
            num_updates: 0,
            num_definitions: 0,
            categories_cache: None,
        }
    }

    /// The kind of this value.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The payload of this value.
    pub fn payload(&self) -> &ValuePayload {
        &self.payload
    }

    /// The assigned location, if any.
    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Check if the location is fixed (set once, immutable thereafter).
    pub fn is_location_fixed(&self) -> bool {
        self.location_fixed
    }

    /// Operands currently bound to this value, in binding order.
    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    /// Number of USE operands bound.
    pub fn num_uses(&self) -> u32 {
        self.num_uses
    }

    /// Number of UPDATE operands bound.
    pub fn num_updates(&self) -> u32 {
        self.num_updates
    }

    /// Number of DEFINITION operands bound.
    pub fn num_definitions(&self) -> u32 {
        self.num_definitions
    }

    /// Check if this value is a variable.
    pub fn is_variable(&self) -> bool {
        matches!(self.payload, ValuePayload::Variable(_))
    }

    /// Check if this value is a constant.
    pub fn is_constant(&self) -> bool {
        matches!(self.payload, ValuePayload::Constant(_))
    }

    /// The constant payload, if this value is a constant.
    pub fn constant_value(&self) -> Option<ConstantValue> {
        match self.payload {
            ValuePayload::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// The variable state, if this value is a variable.
    pub fn variable(&self) -> Option<&VariableData> {
        match &self.payload {
            ValuePayload::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn variable_mut(&mut self) -> Option<&mut VariableData> {
        match &mut self.payload {
            ValuePayload::Variable(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ValuePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValuePayload::Variable(v) => write!(f, "v{}", v.serial),
            ValuePayload::Constant(c) => write!(f, "const({})", c),
            ValuePayload::Preallocated => write!(f, "preallocated"),
            ValuePayload::Method(m) => write!(f, "{}", m),
            ValuePayload::Undefined => write!(f, "undefined"),
        }
    }
}
