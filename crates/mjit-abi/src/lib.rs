//! Calling-convention abstraction.
//!
//! This crate defines the policy surface the method generator and emitter
//! consume: register roles, per-kind result/parameter/scratch location
//! queries, caller/callee-saved register sets, frame sizing, and the
//! per-method-kind ABI scheme. Platform ports implement [`Abi`]; nothing
//! in this crate hard-codes one platform's constants.

#![no_std]

extern crate alloc;

mod abi;
mod role;
mod scheme;
pub mod testing;

pub use abi::{Abi, ParameterPurpose};
pub use role::RegisterRole;
pub use scheme::{AbiScheme, MethodKind};
