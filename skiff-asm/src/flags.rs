//! CPU condition flags.

use bitflags::bitflags;

use crate::types::Word;

bitflags! {
    /// Condition flags written by `CMP` and read by conditional branches.
    #[derive(Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Flags: u8 {
        /// Sign bit of the truncated comparison result.
        const N = 0b0001;
        /// The truncated comparison result was zero.
        const Z = 0b0010;
        /// Unsigned carry: the subtraction did not borrow.
        const C = 0b0100;
        /// Signed overflow: the exact difference does not fit in 32 bits.
        const V = 0b1000;
    }
}

impl Flags {
    /// Derive the flags of `op1 - op2`.
    ///
    /// The subtraction is evaluated exactly, wide enough to never wrap:
    /// N and Z quantize the 32-bit truncated result, C is the carry-out of
    /// the two's-complement sum (set iff no borrow occurred), and V is set
    /// when the exact signed difference falls outside `[-2^31, 2^31)`.
    pub fn from_cmp(op1: Word, op2: Word) -> Self {
        let truncated = op1.wrapping_sub(op2);
        let exact = i64::from(op1 as i32) - i64::from(op2 as i32);

        let mut flags = Flags::empty();

        flags.set(Flags::N, truncated & 0x8000_0000 != 0);
        flags.set(Flags::Z, truncated == 0);
        flags.set(Flags::C, op1 >= op2);
        flags.set(Flags::V, !(-(1i64 << 31)..1i64 << 31).contains(&exact));

        flags
    }
}
