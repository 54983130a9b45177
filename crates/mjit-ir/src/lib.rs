//! Method-JIT intermediate representation.
//!
//! This crate defines the IR a method JIT's middle tier operates on:
//! - Kinds and storage locations (registers, stack slots, immediates,
//!   literals)
//! - Abstract values and the operands recording each use/definition site
//! - Instructions and basic blocks, organized into a per-method container
//! - Pool-indexed bit-sets with generation tagging
//! - Liveness, interference, CFG and loop analyses
//! - A textual form for tests and diagnostics

#![no_std]

extern crate alloc;

pub mod analysis;
mod block;
mod constant;
mod entity;
mod entity_map;
mod inst;
mod kind;
mod location;
mod method;
mod operand;
mod parser;
mod pool;
mod value;

pub use block::{BlockData, BlockRole};
pub use constant::{ConstantValue, ImmWidth, MethodRef, RefValue};
pub use entity::{Block, EntityRef, Inst, Operand, Value};
pub use entity_map::PrimaryMap;
pub use inst::{
    AssignmentReason, CallData, FrameDescriptor, InfopointKind, InstData, InstKind, InstPoint,
    SwitchData, SwitchStrategy, COMPARE_AND_BRANCH_MAX_KEYS, TABLE_SWITCH_MIN_DENSITY_PERCENT,
};
pub use kind::Kind;
pub use location::{
    AnyReg, CategorySet, FpReg, IntReg, Location, LocationCategory, SlotPurpose, StackSlot,
    CATEGORY_COUNT,
};
pub use method::{
    assignment_dest_categories, assignment_src_categories, InstDisplay, Method, Placement,
};
pub use operand::{Effect, OperandData};
pub use parser::{parse_method, ParseError};
pub use pool::{BitVec, PoolSet};
pub use value::{ValueData, ValuePayload, VariableData};
