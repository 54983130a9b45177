//! Method generation, block layout and target lowering.
//!
//! This crate drives a method's IR from front-end construction to the form
//! an instruction encoder consumes:
//! - `MethodGeneration`: block/variable/constant creation, stack-frame and
//!   slot bookkeeping, constant materialization, variable splitting
//! - Operand weighting for spill ranking
//! - Block layout for fall-through-optimal code order
//! - Emission: linearization plus the call-site/safepoint/exception-range
//!   and reference-map side tables the runtime consumes

#![no_std]

extern crate alloc;

mod constants;
mod debug;
pub mod emit;
mod layout;
mod literal;
mod methodgen;
mod weights;

pub use constants::allocate_constants;
pub use layout::rearrange_blocks;
pub use literal::{LiteralPool, ScalarLiteral};
pub use methodgen::MethodGeneration;
pub use weights::weigh_operands;
