//! Observable execution state.

use core::fmt;

use skiff_asm::{Opcode, Word};

/// One of the five pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    /// Instruction fetch.
    Fetch,
    /// Decode and hazard check.
    Decode,
    /// ALU, branch resolution, and stack access.
    Execute,
    /// Data memory access.
    Memory,
    /// Register writeback and dependency release.
    Writeback,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetch => "fetch",
            Self::Decode => "decode",
            Self::Execute => "execute",
            Self::Memory => "memory",
            Self::Writeback => "writeback",
        };

        write!(f, "{name}")
    }
}

/// Resulting state of a [`step`](crate::pipeline::Pipeline::step) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RunState {
    /// The requested cycles elapsed with the machine still live.
    Running,
    /// An `END` retired and the pipeline has drained.
    Halted,
    /// Execution paused before the instruction at this address.
    Breakpoint(Word),
}

impl RunState {
    /// Whether stepping further can still make progress.
    pub const fn should_continue(&self) -> bool {
        !matches!(self, Self::Halted)
    }
}

/// The instruction resident in one pipeline stage, as seen between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StageView {
    /// The stage being observed.
    pub stage: Stage,
    /// Fetch address of the resident instruction, if the stage is not a
    /// bubble.
    pub pc: Option<Word>,
    /// Opcode of the resident instruction, if any.
    pub opcode: Option<Opcode>,
}

impl fmt::Display for StageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.pc, self.opcode) {
            (Some(pc), Some(opcode)) => write!(f, "{}: {opcode} @ {pc}", self.stage),
            (Some(pc), None) => write!(f, "{}: ? @ {pc}", self.stage),
            _ => write!(f, "{}: -", self.stage),
        }
    }
}
