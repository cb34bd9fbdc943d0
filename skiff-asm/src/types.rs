//! Base types shared by the encoding layer and the machine.

/// A machine word. Every memory cell, register cell, and instruction
/// encoding is one word.
pub type Word = u32;

/// Register address inside an instruction field.
pub type RegisterId = usize;

/// Immediate with 10 bits (memory and branch offsets).
pub type Immediate10 = u16;

/// Immediate with 15 bits (ALU operands, load literals, branch targets).
pub type Immediate15 = u16;

/// Number of bits in a [`Word`].
pub const WORD_BITS: usize = 32;

/// Number of registers addressable by the 5-bit instruction fields.
pub const REGISTER_COUNT: usize = 32;

/// Always reads zero; writes are discarded.
pub const REG_ZR: RegisterId = 28;

/// Stack pointer. Initialized to the stack base.
pub const REG_SP: RegisterId = 29;

/// Stack base. Holds the highest valid word address at reset.
pub const REG_BP: RegisterId = 30;

/// Link register, written by `BL`.
pub const REG_LR: RegisterId = 31;
