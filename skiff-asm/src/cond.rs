//! Branch condition codes.

use core::fmt;

use crate::flags::Flags;
use crate::instruction::DecodeError;
use crate::types::Word;

/// 4-bit condition code evaluated against the flags to gate a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Cond {
    /// Equal (`Z`).
    EQ = 0x0,
    /// Not equal (`!Z`).
    NE = 0x1,
    /// Carry set / unsigned higher or same (`C`).
    CS = 0x2,
    /// Carry clear / unsigned lower (`!C`).
    CC = 0x3,
    /// Minus / negative (`N`).
    MI = 0x4,
    /// Plus / positive or zero (`!N`).
    PL = 0x5,
    /// Signed overflow (`V`).
    VS = 0x6,
    /// No signed overflow (`!V`).
    VC = 0x7,
    /// Unsigned higher (`C && !Z`).
    HI = 0x8,
    /// Unsigned lower or same (`!C || Z`).
    LS = 0x9,
    /// Signed greater or equal (`N == V`).
    GE = 0xa,
    /// Signed less than (`N != V`).
    LT = 0xb,
    /// Signed greater than (`!Z && N == V`).
    GT = 0xc,
    /// Signed less or equal (`Z || N != V`).
    LE = 0xd,
    /// Always taken.
    AL = 0xe,
}

impl Cond {
    /// Evaluate the predicate against the current flags.
    pub fn holds(self, flags: Flags) -> bool {
        let n = flags.contains(Flags::N);
        let z = flags.contains(Flags::Z);
        let c = flags.contains(Flags::C);
        let v = flags.contains(Flags::V);

        match self {
            Self::EQ => z,
            Self::NE => !z,
            Self::CS => c,
            Self::CC => !c,
            Self::MI => n,
            Self::PL => !n,
            Self::VS => v,
            Self::VC => !v,
            Self::HI => c && !z,
            Self::LS => !c || z,
            Self::GE => n == v,
            Self::LT => n != v,
            Self::GT => !z && n == v,
            Self::LE => z || n != v,
            Self::AL => true,
        }
    }
}

impl TryFrom<Word> for Cond {
    type Error = DecodeError;

    fn try_from(bits: Word) -> Result<Self, Self::Error> {
        use Cond::*;

        match bits {
            0x0 => Ok(EQ),
            0x1 => Ok(NE),
            0x2 => Ok(CS),
            0x3 => Ok(CC),
            0x4 => Ok(MI),
            0x5 => Ok(PL),
            0x6 => Ok(VS),
            0x7 => Ok(VC),
            0x8 => Ok(HI),
            0x9 => Ok(LS),
            0xa => Ok(GE),
            0xb => Ok(LT),
            0xc => Ok(GT),
            0xd => Ok(LE),
            0xe => Ok(AL),
            _ => Err(DecodeError::Condition { bits }),
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[test]
    fn round_trip() {
        for cond in Cond::iter() {
            assert_eq!(Cond::try_from(cond as Word).unwrap(), cond);
        }

        assert!(Cond::try_from(0xf).is_err());
    }

    #[rstest]
    #[case::eq_on_equal(Cond::EQ, 5, 5, true)]
    #[case::eq_on_unequal(Cond::EQ, 5, 6, false)]
    #[case::ne(Cond::NE, 5, 6, true)]
    #[case::cs_no_borrow(Cond::CS, 6, 5, true)]
    #[case::cc_borrow(Cond::CC, 5, 6, true)]
    #[case::mi(Cond::MI, 4, 9, true)]
    #[case::pl(Cond::PL, 9, 4, true)]
    #[case::hi(Cond::HI, 9, 4, true)]
    #[case::hi_on_equal(Cond::HI, 4, 4, false)]
    #[case::ls_on_equal(Cond::LS, 4, 4, true)]
    #[case::ge_positive(Cond::GE, 9, 4, true)]
    #[case::lt_negative(Cond::LT, 4, 9, true)]
    #[case::lt_signed(Cond::LT, 0xffff_ffff, 1, true)]
    #[case::gt_unsigned_wrap(Cond::GT, 1, 0xffff_ffff, true)]
    #[case::le_on_equal(Cond::LE, 3, 3, true)]
    #[case::al_always(Cond::AL, 0, 0, true)]
    fn predicates_after_cmp(
        #[case] cond: Cond,
        #[case] op1: Word,
        #[case] op2: Word,
        #[case] taken: bool,
    ) {
        assert_eq!(cond.holds(Flags::from_cmp(op1, op2)), taken);
    }
}
