//! Register roles.

use core::fmt;

/// Distinguished duties a platform register can be assigned by the calling
/// convention. The ABI maps each role to a concrete register (or to none,
/// when the platform does not reserve one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterRole {
    /// The CPU stack pointer.
    StackPointer,
    /// The frame pointer, when the convention maintains one.
    FramePointer,
    /// Where results are produced by the callee.
    Result,
    /// Where callers observe results. Usually the same register as
    /// `Result`; interpreter-style conventions may differ.
    Return,
    /// Reserved for short-lived code-generation temporaries.
    Scratch,
    /// Holds the safepoint latch the runtime uses to stop threads.
    SafepointLatch,
    /// Base register for literal pool addressing, when the platform uses
    /// one.
    LiteralBase,
}

impl RegisterRole {
    /// All roles.
    pub const ALL: [RegisterRole; 7] = [
        RegisterRole::StackPointer,
        RegisterRole::FramePointer,
        RegisterRole::Result,
        RegisterRole::Return,
        RegisterRole::Scratch,
        RegisterRole::SafepointLatch,
        RegisterRole::LiteralBase,
    ];
}

impl fmt::Display for RegisterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegisterRole::StackPointer => "stack-pointer",
            RegisterRole::FramePointer => "frame-pointer",
            RegisterRole::Result => "result",
            RegisterRole::Return => "return",
            RegisterRole::Scratch => "scratch",
            RegisterRole::SafepointLatch => "safepoint-latch",
            RegisterRole::LiteralBase => "literal-base",
        };
        write!(f, "{}", name)
    }
}
