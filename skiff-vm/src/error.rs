//! Simulator error taxonomy.
//!
//! Pipeline stalls are deliberately absent: back-pressure is an ordinary
//! value ([`Access::Stall`](crate::memory::Access)) consumed within the
//! tick that observed it. Everything here halts the simulator.

use core::fmt;

use skiff_asm::{DecodeError, LayoutError, RegisterId, Word};
use thiserror::Error;

use crate::state::Stage;

/// Fatal simulator errors.
#[derive(Debug, Error)]
pub enum VmError {
    /// The fetched word does not decode to a defined instruction.
    #[error("cannot decode {word:#010x} at pc {pc}: {source}")]
    Decode {
        /// Fetch address of the offending word.
        pc: Word,
        /// The offending word.
        word: Word,
        /// The underlying decode failure.
        source: DecodeError,
    },

    /// A field assignment exceeded its mask; indicates a codegen bug.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// A memory access left the address space.
    #[error("address {addr:#x} out of range in {stage} stage at pc {pc}, cycle {cycle}")]
    AddressOutOfRange {
        /// Stage that issued the access.
        stage: Stage,
        /// Fetch address of the instruction that issued it.
        pc: Word,
        /// Cycle at which it was issued.
        cycle: u64,
        /// The offending address.
        addr: Word,
    },

    /// A program failed to load; the simulator state is unchanged.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// Decode accepted an instruction despite an in-use conflict.
    #[error("register r{reg} claimed twice; the hazard check let a dependent instruction through")]
    ClaimConflict {
        /// The doubly claimed register.
        reg: RegisterId,
    },
}

impl VmError {
    /// Attach stage and cycle context to a raw [`AddressError`].
    pub(crate) fn out_of_range(stage: Stage, pc: Word, cycle: u64, e: AddressError) -> Self {
        Self::AddressOutOfRange {
            stage,
            pc,
            cycle,
            addr: e.addr,
        }
    }

    /// Attach the fetch address to a raw [`DecodeError`].
    pub(crate) fn decode(pc: Word, word: Word, source: DecodeError) -> Self {
        Self::Decode { pc, word, source }
    }
}

/// Program binary ingestion failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// A non-blank line is not exactly 32 characters of `0`/`1`.
    #[error("line {line}: expected 32 binary digits")]
    BadLine {
        /// 1-based source line number.
        line: usize,
    },

    /// The program does not fit in RAM at the requested base.
    #[error("{words}-word program does not fit at base {base} in {space} words of memory")]
    TooLarge {
        /// Number of instruction words parsed.
        words: usize,
        /// Requested load base address.
        base: Word,
        /// Size of the address space in words.
        space: usize,
    },
}

/// An address outside the device's address space, before pipeline context
/// is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressError {
    /// The offending address.
    pub addr: Word,
    /// Size of the address space in words.
    pub space: usize,
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "address {:#x} outside the {}-word address space",
            self.addr, self.space
        )
    }
}

impl std::error::Error for AddressError {}
