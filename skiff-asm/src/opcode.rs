//! The opcode map.

use core::fmt;

use crate::instruction::DecodeError;
use crate::types::Word;

/// Number of bits the opcode occupies.
pub(crate) const OPCODE_BITS: u8 = 6;

/// First bit of the opcode field.
pub(crate) const OPCODE_START: u8 = 26;

/// 6-bit opcode representation.
///
/// The `*AK` and `AES*` slots are reserved: they decode successfully but
/// carry no semantics and execute as `NOOP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Opcode {
    NOOP = 0x00,
    LSL = 0x01,
    LSR = 0x02,
    ASR = 0x03,
    MOV = 0x04,
    ADD = 0x05,
    SUB = 0x06,
    CMP = 0x07,
    MULT = 0x08,
    DIV = 0x09,
    MOD = 0x0a,
    AND = 0x0b,
    XOR = 0x0c,
    ORR = 0x0d,
    MVN = 0x0e,
    LDR = 0x0f,
    STR = 0x10,
    PUSH = 0x11,
    POP = 0x12,
    MOVAK = 0x13,
    LDRAK = 0x14,
    STRAK = 0x15,
    PUSAK = 0x16,
    POPAK = 0x17,
    AESE = 0x18,
    AESD = 0x19,
    AESMC = 0x1a,
    AESIC = 0x1b,
    AESSR = 0x1c,
    AESIR = 0x1d,
    AESGE = 0x1e,
    AESDE = 0x1f,
    B = 0x20,
    BL = 0x21,
    END = 0x22,
}

/// Instruction category, selecting the field layout and the per-stage
/// behavior of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Register/immediate arithmetic and logic, including `MOV` and `MVN`.
    Alu,
    /// `CMP`: flag-setting comparison without a destination.
    Compare,
    /// `LDR` in both its literal and base+offset forms.
    Load,
    /// `STR`.
    Store,
    /// `B` and `BL`.
    Branch,
    /// `PUSH` and `POP`.
    Stack,
    /// `NOOP`.
    Noop,
    /// `END`.
    End,
    /// Reserved slots with no defined semantics.
    Reserved,
}

impl Opcode {
    /// The category this opcode dispatches through.
    pub const fn category(self) -> Category {
        use Opcode::*;

        match self {
            LSL | LSR | ASR | MOV | ADD | SUB | MULT | DIV | MOD | AND | XOR | ORR | MVN => {
                Category::Alu
            }
            CMP => Category::Compare,
            LDR => Category::Load,
            STR => Category::Store,
            B | BL => Category::Branch,
            PUSH | POP => Category::Stack,
            NOOP => Category::Noop,
            END => Category::End,
            MOVAK | LDRAK | STRAK | PUSAK | POPAK | AESE | AESD | AESMC | AESIC | AESSR
            | AESIR | AESGE | AESDE => Category::Reserved,
        }
    }

    /// Whether this opcode is one of the reserved slots.
    pub const fn is_reserved(self) -> bool {
        matches!(self.category(), Category::Reserved)
    }

    /// Opcode bits of a raw instruction word.
    pub const fn bits_of(word: Word) -> Word {
        (word >> OPCODE_START) & ((1 << OPCODE_BITS) - 1)
    }
}

impl TryFrom<Word> for Opcode {
    type Error = DecodeError;

    fn try_from(bits: Word) -> Result<Self, Self::Error> {
        use Opcode::*;

        match bits {
            0x00 => Ok(NOOP),
            0x01 => Ok(LSL),
            0x02 => Ok(LSR),
            0x03 => Ok(ASR),
            0x04 => Ok(MOV),
            0x05 => Ok(ADD),
            0x06 => Ok(SUB),
            0x07 => Ok(CMP),
            0x08 => Ok(MULT),
            0x09 => Ok(DIV),
            0x0a => Ok(MOD),
            0x0b => Ok(AND),
            0x0c => Ok(XOR),
            0x0d => Ok(ORR),
            0x0e => Ok(MVN),
            0x0f => Ok(LDR),
            0x10 => Ok(STR),
            0x11 => Ok(PUSH),
            0x12 => Ok(POP),
            0x13 => Ok(MOVAK),
            0x14 => Ok(LDRAK),
            0x15 => Ok(STRAK),
            0x16 => Ok(PUSAK),
            0x17 => Ok(POPAK),
            0x18 => Ok(AESE),
            0x19 => Ok(AESD),
            0x1a => Ok(AESMC),
            0x1b => Ok(AESIC),
            0x1c => Ok(AESSR),
            0x1d => Ok(AESIR),
            0x1e => Ok(AESGE),
            0x1f => Ok(AESDE),
            0x20 => Ok(B),
            0x21 => Ok(BL),
            0x22 => Ok(END),
            _ => Err(DecodeError::Opcode { bits }),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn bits_round_trip() {
        for opcode in Opcode::iter() {
            assert_eq!(Opcode::try_from(opcode as Word).unwrap(), opcode);
        }
    }

    #[test]
    fn undefined_bits_are_rejected() {
        for bits in (Opcode::END as Word + 1)..(1 << OPCODE_BITS) {
            assert_eq!(
                Opcode::try_from(bits).unwrap_err(),
                DecodeError::Opcode { bits }
            );
        }
    }

    #[test]
    fn reserved_slots() {
        let reserved = Opcode::iter().filter(|op| op.is_reserved()).count();

        assert_eq!(reserved, 13);
    }
}
