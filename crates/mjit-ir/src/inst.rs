//! IR instructions.
//!
//! Instructions are a closed set of variants, each with a fixed operand
//! shape. Control transfer variants declare their successor blocks; stop
//! variants (calls, safepoints) may carry a frame descriptor and the set of
//! variables live at that point.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::entity::{Block, Operand};
use crate::kind::Kind;
use crate::location::Location;
use crate::pool::PoolSet;

/// Why an assignment instruction exists. Diagnostic classification only;
/// never load-bearing for semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentReason {
    Normal,
    IntervalSplit,
    DataFlowResolved,
    FixedSplit,
    ExceptionEdgeRescued,
    ExceptionEdgeResolved,
    SpillSlotDefinition,
}

/// Distinguishes the two flavors of infopoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfopointKind {
    /// Poll point for the runtime; contributes to reference maps.
    Safepoint,
    /// Captures the code address of this point into a value.
    Here,
}

/// Call payload.
#[derive(Debug, Clone)]
pub struct CallData {
    /// Callee (USE). A method value for direct calls, an address-bearing
    /// value for indirect calls.
    pub function: Operand,
    /// Result (DEFINITION), pinned to the ABI result location. None for
    /// void calls.
    pub result: Option<Operand>,
    /// Arguments (USE), pinned to ABI argument locations.
    pub args: Vec<Operand>,
    /// One synthetic DEFINITION per caller-saved register, excluding the
    /// register holding the result. Models the clobber.
    pub caller_save_defs: Vec<Operand>,
    /// Whether this calls out to native code.
    pub native: bool,
}

/// Switch payload. Match values are sorted ascending.
#[derive(Debug, Clone)]
pub struct SwitchData {
    /// Discriminant (USE, register only).
    pub tag: Operand,
    /// Match constants (USE, immediate/literal), one per target.
    pub matches: Vec<Operand>,
    /// Target blocks, parallel to `matches`.
    pub targets: Vec<Block>,
    pub default_target: Block,
}

/// How a switch is realized in generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStrategy {
    CompareAndBranch,
    TableSwitch,
    LookupSwitch,
}

pub const COMPARE_AND_BRANCH_MAX_KEYS: usize = 3;
pub const TABLE_SWITCH_MIN_DENSITY_PERCENT: f64 = 25.0;

impl SwitchData {
    /// Select the lowering strategy for a switch with `key_count` keys
    /// spanning `table_span` table elements (`max - min + 1`).
    ///
    /// This is a pure function of the two inputs. The small-but-sparse
    /// fallback deliberately readmits `key_count == 4` after a failed
    /// density test; downstream code relies on the exact boundary.
    pub fn select_strategy(key_count: usize, table_span: u64) -> SwitchStrategy {
        if key_count <= COMPARE_AND_BRANCH_MAX_KEYS {
            SwitchStrategy::CompareAndBranch
        } else {
            let density_percent = (100.0 * key_count as f64) / table_span as f64;
            if density_percent >= TABLE_SWITCH_MIN_DENSITY_PERCENT {
                SwitchStrategy::TableSwitch
            } else if key_count <= COMPARE_AND_BRANCH_MAX_KEYS + 1 {
                SwitchStrategy::CompareAndBranch
            } else {
                SwitchStrategy::LookupSwitch
            }
        }
    }
}

/// The instruction variants.
#[derive(Debug, Clone)]
pub enum InstKind {
    /// `dest := src`
    Assignment {
        kind: Kind,
        dest: Operand,
        src: Operand,
        reason: AssignmentReason,
    },
    /// Unconditional transfer.
    Jump { target: Block },
    /// Two-way conditional transfer; the generic form comparisons are
    /// lowered into.
    Branch {
        cond: Operand,
        target_true: Block,
        target_false: Block,
    },
    Call(CallData),
    Switch(SwitchData),
    /// Directs exceptional control flow of subsequent instructions to
    /// `catch`; `None` clears the handler.
    Try { catch: Option<Block> },
    /// Pins the exception parameter to its fixed location at the start of
    /// a dispatcher block. Emits no code.
    Catch { parameter: Option<Operand> },
    /// Defines callee-saved register values and parameters at their ABI
    /// locations. The one instruction where parameters become defined.
    Prologue { defs: Vec<Operand> },
    /// Uses callee-saved register values and the result value at its ABI
    /// location. Placeholder for frame teardown.
    Epilogue { uses: Vec<Operand> },
    Infopoint {
        kind: InfopointKind,
        /// Set for `Here`: the captured code address.
        dest: Option<Operand>,
    },
    Return,
    /// Deleted instruction kept in place to avoid renumbering. Emits no
    /// code and is always redundant.
    Filler,
    /// Zero-cost hook whose resolved address the emitter can report.
    Marker,
}

impl InstKind {
    /// Successor blocks reached by normal control flow.
    pub fn normal_successors(&self) -> Vec<Block> {
        match self {
            InstKind::Jump { target } => alloc::vec![*target],
            InstKind::Branch {
                target_true,
                target_false,
                ..
            } => alloc::vec![*target_true, *target_false],
            InstKind::Switch(data) => {
                let mut out = data.targets.clone();
                out.push(data.default_target);
                out
            }
            _ => Vec::new(),
        }
    }

    /// All successor blocks, including exceptional ones.
    pub fn all_successors(&self) -> Vec<Block> {
        match self {
            InstKind::Try { catch: Some(b) } => alloc::vec![*b],
            other => other.normal_successors(),
        }
    }

    /// Operands owned by this instruction, in a fixed per-variant order.
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            InstKind::Assignment { dest, src, .. } => alloc::vec![*dest, *src],
            InstKind::Branch { cond, .. } => alloc::vec![*cond],
            InstKind::Call(data) => {
                let mut out = alloc::vec![data.function];
                out.extend(data.result);
                out.extend_from_slice(&data.args);
                out.extend_from_slice(&data.caller_save_defs);
                out
            }
            InstKind::Switch(data) => {
                let mut out = alloc::vec![data.tag];
                out.extend_from_slice(&data.matches);
                out
            }
            InstKind::Catch { parameter } => parameter.iter().copied().collect(),
            InstKind::Prologue { defs } => defs.clone(),
            InstKind::Epilogue { uses } => uses.clone(),
            InstKind::Infopoint { dest, .. } => dest.iter().copied().collect(),
            InstKind::Jump { .. }
            | InstKind::Try { .. }
            | InstKind::Return
            | InstKind::Filler
            | InstKind::Marker => Vec::new(),
        }
    }

    /// Check if this instruction is a stop: a point the runtime may observe
    /// the frame at.
    pub fn is_stop(&self) -> bool {
        matches!(
            self,
            InstKind::Call(_)
                | InstKind::Infopoint {
                    kind: InfopointKind::Safepoint,
                    ..
                }
        )
    }

    /// Check if this instruction occupies a position in the emitted stream.
    pub fn emits_code(&self) -> bool {
        !matches!(
            self,
            InstKind::Try { .. } | InstKind::Catch { .. } | InstKind::Filler | InstKind::Marker
        )
    }
}

/// A snapshot of the interpreter-visible frame at a stop: local variables
/// and operand-stack entries as locations, with the frames of inlined
/// callers chained through `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub parent: Option<Box<FrameDescriptor>>,
    pub locals: Vec<Location>,
    pub stack: Vec<Location>,
}

impl FrameDescriptor {
    pub fn new(locals: Vec<Location>, stack: Vec<Location>) -> Self {
        Self {
            parent: None,
            locals,
            stack,
        }
    }
}

/// Per-instruction data.
#[derive(Debug, Clone)]
pub struct InstData {
    pub(crate) block: Block,
    /// Position in the owning block's instruction list. Maintained by
    /// every insertion/removal/replacement.
    pub(crate) index: u32,
    pub(crate) kind: InstKind,
    /// Variables live at this instruction; populated by liveness analysis.
    pub(crate) live_variables: Option<PoolSet>,
    /// Frame snapshot for stops.
    pub(crate) frame_descriptor: Option<FrameDescriptor>,
}

impl InstData {
    pub(crate) fn new(block: Block, index: u32, kind: InstKind) -> Self {
        Self {
            block,
            index,
            kind,
            live_variables: None,
            frame_descriptor: None,
        }
    }

    /// The block owning this instruction.
    pub fn block(&self) -> Block {
        self.block
    }

    /// The instruction's index in its block.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// The instruction variant and payload.
    pub fn kind(&self) -> &InstKind {
        &self.kind
    }

    /// Variables live at this instruction, if liveness has been computed.
    pub fn live_variables(&self) -> Option<&PoolSet> {
        self.live_variables.as_ref()
    }

    /// The frame snapshot carried by this stop, if any.
    pub fn frame_descriptor(&self) -> Option<&FrameDescriptor> {
        self.frame_descriptor.as_ref()
    }
}

/// A program point: an instruction position within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstPoint {
    pub block: Block,
    pub index: usize,
}

impl InstPoint {
    pub fn new(block: Block, index: usize) -> Self {
        Self { block, index }
    }
}
