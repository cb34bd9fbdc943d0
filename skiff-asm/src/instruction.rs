//! Raw instruction words and their typed, decoded representation.

use core::fmt;
use std::sync::OnceLock;

use crate::cond::Cond;
use crate::layout::{Field, Layout, LayoutError};
use crate::opcode::{Category, Opcode, OPCODE_BITS, OPCODE_START};
use crate::types::{RegisterId, Word, REG_LR, REG_SP, REG_ZR};

/// A raw 32-bit instruction word.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction(Word);

impl Instruction {
    /// Wrap a raw word.
    pub const fn new(word: Word) -> Self {
        Self(word)
    }

    /// The raw word.
    pub const fn word(self) -> Word {
        self.0
    }

    /// The opcode, failing on undefined opcode bits.
    pub fn opcode(self) -> Result<Opcode, DecodeError> {
        Opcode::try_from(Opcode::bits_of(self.0))
    }
}

impl From<Word> for Instruction {
    fn from(word: Word) -> Self {
        Self(word)
    }
}

impl From<Instruction> for Word {
    fn from(instruction: Instruction) -> Word {
        instruction.0
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032b}", self.0)
    }
}

/// An ALU operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum AluOp {
    Lsl,
    Lsr,
    Asr,
    Add,
    Sub,
    Mult,
    Div,
    Mod,
    And,
    Xor,
    Orr,
}

/// Second operand of an ALU operation or comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// Read the value from a register.
    Reg(RegisterId),
    /// Use the immediate value directly.
    Imm(Word),
}

/// Where a load takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadSource {
    /// The literal itself is the loaded value.
    Literal(Word),
    /// Load from memory at `reg[base] + offset`.
    Address {
        /// Base address register.
        base: RegisterId,
        /// Unsigned word offset.
        offset: Word,
    },
}

/// Where a branch goes when taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BranchTarget {
    /// Signed word offset relative to the branch's own address.
    Relative(i32),
    /// Absolute target at `reg[base] + offset`.
    Indirect {
        /// Base address register.
        base: RegisterId,
        /// Unsigned word offset.
        offset: Word,
    },
}

/// A decoded instruction: the typed fields of one opcode category.
///
/// `MOV` decodes as [`AluOp::Add`] with `op1 = ZR`, and `MVN` as
/// [`AluOp::Xor`] with a synthetic all-ones second operand, so the
/// executor only ever dispatches over these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    /// No effect; also the value of squashed pipeline slots.
    Noop,
    /// Arithmetic/logic with a destination register.
    Alu {
        /// Operation selector.
        op: AluOp,
        /// Destination register.
        dest: RegisterId,
        /// First operand register.
        op1: RegisterId,
        /// Second operand.
        op2: Operand,
    },
    /// Flag-setting comparison.
    Cmp {
        /// First operand register.
        op1: RegisterId,
        /// Second operand.
        op2: Operand,
    },
    /// Load a literal or a memory word into a register.
    Load {
        /// Destination register.
        dest: RegisterId,
        /// Literal or effective-address form.
        source: LoadSource,
    },
    /// Store a register into memory at `reg[base] + offset`.
    Store {
        /// Source register.
        src: RegisterId,
        /// Base address register.
        base: RegisterId,
        /// Unsigned word offset.
        offset: Word,
    },
    /// Conditional (or `AL`) branch, optionally linking.
    Branch {
        /// Gating condition code.
        cond: Cond,
        /// Whether to write the return address to `LR` (`BL`).
        link: bool,
        /// Taken-branch target.
        target: BranchTarget,
    },
    /// Push a register onto the stack.
    Push {
        /// Source register.
        src: RegisterId,
    },
    /// Pop the top of the stack into a register.
    Pop {
        /// Destination register.
        dest: RegisterId,
    },
    /// Reserved opcode with no defined semantics; executes as `NOOP`.
    Reserved(Opcode),
    /// Stop fetching and drain the pipeline.
    End,
}

/// Field handles of the ALU/compare layout.
struct AluFields {
    layout: Layout,
    dest: Field,
    op1: Field,
    imm: Field,
    op2: Field,
    immediate: Field,
}

/// Field handles of the load/store layout.
struct MemFields {
    layout: Layout,
    reg: Field,
    lit: Field,
    literal: Field,
    base: Field,
    offset: Field,
}

/// Field handles of the branch layout.
struct BranchFields {
    layout: Layout,
    cond: Field,
    imm: Field,
    base: Field,
    offset: Field,
    immediate: Field,
}

fn base_layout() -> Layout {
    Layout::new(32)
        .with_field("opcode", OPCODE_START, OPCODE_BITS)
        .expect("opcode field fits the word")
}

fn alu_fields() -> &'static AluFields {
    static FIELDS: OnceLock<AluFields> = OnceLock::new();

    FIELDS.get_or_init(|| {
        let layout = base_layout()
            .subtype()
            .with_field("dest", 21, 5)
            .and_then(|l| l.with_field("op1", 16, 5))
            .and_then(|l| l.with_field("imm", 15, 1))
            .and_then(|l| l.with_field("op2", 10, 5))
            .and_then(|l| l.with_overlapping_field("immediate", 0, 15))
            .expect("ALU layout is well-formed");

        AluFields {
            dest: layout.field("dest").expect("defined above"),
            op1: layout.field("op1").expect("defined above"),
            imm: layout.field("imm").expect("defined above"),
            op2: layout.field("op2").expect("defined above"),
            immediate: layout.field("immediate").expect("defined above"),
            layout,
        }
    })
}

fn mem_fields() -> &'static MemFields {
    static FIELDS: OnceLock<MemFields> = OnceLock::new();

    FIELDS.get_or_init(|| {
        let layout = base_layout()
            .subtype()
            .with_field("reg", 21, 5)
            .and_then(|l| l.with_field("lit", 15, 1))
            .and_then(|l| l.with_field("base", 10, 5))
            .and_then(|l| l.with_overlapping_field("offset", 0, 10))
            .and_then(|l| l.with_overlapping_field("literal", 0, 15))
            .expect("memory layout is well-formed");

        MemFields {
            reg: layout.field("reg").expect("defined above"),
            lit: layout.field("lit").expect("defined above"),
            literal: layout.field("literal").expect("defined above"),
            base: layout.field("base").expect("defined above"),
            offset: layout.field("offset").expect("defined above"),
            layout,
        }
    })
}

fn branch_fields() -> &'static BranchFields {
    static FIELDS: OnceLock<BranchFields> = OnceLock::new();

    FIELDS.get_or_init(|| {
        let layout = base_layout()
            .subtype()
            .with_field("cond", 22, 4)
            .and_then(|l| l.with_field("imm", 15, 1))
            .and_then(|l| l.with_field("base", 10, 5))
            .and_then(|l| l.with_overlapping_field("offset", 0, 10))
            .and_then(|l| l.with_overlapping_field("immediate", 0, 15))
            .expect("branch layout is well-formed");

        BranchFields {
            cond: layout.field("cond").expect("defined above"),
            imm: layout.field("imm").expect("defined above"),
            base: layout.field("base").expect("defined above"),
            offset: layout.field("offset").expect("defined above"),
            immediate: layout.field("immediate").expect("defined above"),
            layout,
        }
    })
}

/// Sign-extend a 15-bit branch displacement.
const fn extend_disp(raw: Word) -> i32 {
    ((raw as i32) << 17) >> 17
}

impl Operation {
    /// Decode a raw instruction word into its typed representation.
    pub fn decode(raw: Instruction) -> Result<Self, DecodeError> {
        let word = raw.word();
        let opcode = raw.opcode()?;

        let operation = match opcode.category() {
            Category::Noop => Self::Noop,
            Category::End => Self::End,
            Category::Reserved => Self::Reserved(opcode),
            Category::Alu => Self::decode_alu(opcode, word),
            Category::Compare => {
                let f = alu_fields();
                Self::Cmp {
                    op1: f.op1.get(word) as RegisterId,
                    op2: Self::decode_operand(word),
                }
            }
            Category::Load => {
                let f = mem_fields();
                let source = if f.lit.get(word) != 0 {
                    LoadSource::Literal(f.literal.get(word))
                } else {
                    LoadSource::Address {
                        base: f.base.get(word) as RegisterId,
                        offset: f.offset.get(word),
                    }
                };

                Self::Load {
                    dest: f.reg.get(word) as RegisterId,
                    source,
                }
            }
            Category::Store => {
                let f = mem_fields();
                Self::Store {
                    src: f.reg.get(word) as RegisterId,
                    base: f.base.get(word) as RegisterId,
                    offset: f.offset.get(word),
                }
            }
            Category::Branch => {
                let f = branch_fields();
                let target = if f.imm.get(word) != 0 {
                    BranchTarget::Relative(extend_disp(f.immediate.get(word)))
                } else {
                    BranchTarget::Indirect {
                        base: f.base.get(word) as RegisterId,
                        offset: f.offset.get(word),
                    }
                };

                Self::Branch {
                    cond: Cond::try_from(f.cond.get(word))?,
                    link: opcode == Opcode::BL,
                    target,
                }
            }
            Category::Stack => {
                let f = mem_fields();
                let reg = f.reg.get(word) as RegisterId;

                if opcode == Opcode::PUSH {
                    Self::Push { src: reg }
                } else {
                    Self::Pop { dest: reg }
                }
            }
        };

        Ok(operation)
    }

    fn decode_operand(word: Word) -> Operand {
        let f = alu_fields();

        if f.imm.get(word) != 0 {
            Operand::Imm(f.immediate.get(word))
        } else {
            Operand::Reg(f.op2.get(word) as RegisterId)
        }
    }

    fn decode_alu(opcode: Opcode, word: Word) -> Self {
        let f = alu_fields();
        let dest = f.dest.get(word) as RegisterId;

        match opcode {
            // MOV dest, (op2 | #imm) is ADD with an implicit zero operand.
            Opcode::MOV => Self::Alu {
                op: AluOp::Add,
                dest,
                op1: REG_ZR,
                op2: Self::decode_operand(word),
            },
            // MVN dest, op1 is XOR with a synthetic all-ones operand; the
            // 15-bit immediate field cannot hold it, hence synthetic.
            Opcode::MVN => Self::Alu {
                op: AluOp::Xor,
                dest,
                op1: f.op1.get(word) as RegisterId,
                op2: Operand::Imm(Word::MAX),
            },
            _ => Self::Alu {
                op: Self::alu_op(opcode),
                dest,
                op1: f.op1.get(word) as RegisterId,
                op2: Self::decode_operand(word),
            },
        }
    }

    const fn alu_op(opcode: Opcode) -> AluOp {
        match opcode {
            Opcode::LSL => AluOp::Lsl,
            Opcode::LSR => AluOp::Lsr,
            Opcode::ASR => AluOp::Asr,
            Opcode::SUB => AluOp::Sub,
            Opcode::MULT => AluOp::Mult,
            Opcode::DIV => AluOp::Div,
            Opcode::MOD => AluOp::Mod,
            Opcode::AND => AluOp::And,
            Opcode::XOR => AluOp::Xor,
            Opcode::ORR => AluOp::Orr,
            _ => AluOp::Add,
        }
    }

    const fn opcode_of(op: AluOp) -> Opcode {
        match op {
            AluOp::Lsl => Opcode::LSL,
            AluOp::Lsr => Opcode::LSR,
            AluOp::Asr => Opcode::ASR,
            AluOp::Add => Opcode::ADD,
            AluOp::Sub => Opcode::SUB,
            AluOp::Mult => Opcode::MULT,
            AluOp::Div => Opcode::DIV,
            AluOp::Mod => Opcode::MOD,
            AluOp::And => Opcode::AND,
            AluOp::Xor => Opcode::XOR,
            AluOp::Orr => Opcode::ORR,
        }
    }

    /// Encode this operation back into a raw instruction word.
    ///
    /// Fails when a field value exceeds its mask, e.g. an immediate wider
    /// than 15 bits or a displacement outside the signed 15-bit range.
    pub fn encode(&self) -> Result<Instruction, LayoutError> {
        let word = match *self {
            Self::Noop => opcode_word(Opcode::NOOP),
            Self::End => opcode_word(Opcode::END),
            Self::Reserved(opcode) => opcode_word(opcode),
            Self::Alu { op, dest, op1, op2 } => {
                let f = alu_fields();
                let mut word = opcode_word(Self::opcode_of(op));
                word = f.layout.set(word, "dest", dest as Word)?;
                word = f.layout.set(word, "op1", op1 as Word)?;
                set_operand(&f.layout, word, op2)?
            }
            Self::Cmp { op1, op2 } => {
                let f = alu_fields();
                let word = opcode_word(Opcode::CMP);
                let word = f.layout.set(word, "op1", op1 as Word)?;
                set_operand(&f.layout, word, op2)?
            }
            Self::Load { dest, source } => {
                let f = mem_fields();
                let mut word = opcode_word(Opcode::LDR);
                word = f.layout.set(word, "reg", dest as Word)?;
                match source {
                    LoadSource::Literal(value) => {
                        word = f.layout.set(word, "lit", 1)?;
                        f.layout.set(word, "literal", value)?
                    }
                    LoadSource::Address { base, offset } => {
                        word = f.layout.set(word, "base", base as Word)?;
                        f.layout.set(word, "offset", offset)?
                    }
                }
            }
            Self::Store { src, base, offset } => {
                let f = mem_fields();
                let mut word = opcode_word(Opcode::STR);
                word = f.layout.set(word, "reg", src as Word)?;
                word = f.layout.set(word, "base", base as Word)?;
                f.layout.set(word, "offset", offset)?
            }
            Self::Branch { cond, link, target } => {
                let f = branch_fields();
                let opcode = if link { Opcode::BL } else { Opcode::B };
                let mut word = opcode_word(opcode);
                word = f.layout.set(word, "cond", cond as Word)?;
                match target {
                    BranchTarget::Relative(disp) => {
                        if !(-(1 << 14)..1 << 14).contains(&disp) {
                            return Err(LayoutError::Overflow {
                                name: "immediate",
                                value: disp as Word,
                                max: (1 << 15) - 1,
                            });
                        }
                        word = f.layout.set(word, "imm", 1)?;
                        f.layout
                            .set(word, "immediate", (disp as Word) & 0x7fff)?
                    }
                    BranchTarget::Indirect { base, offset } => {
                        word = f.layout.set(word, "base", base as Word)?;
                        f.layout.set(word, "offset", offset)?
                    }
                }
            }
            Self::Push { src } => {
                let f = mem_fields();
                let word = opcode_word(Opcode::PUSH);
                f.layout.set(word, "reg", src as Word)?
            }
            Self::Pop { dest } => {
                let f = mem_fields();
                let word = opcode_word(Opcode::POP);
                f.layout.set(word, "reg", dest as Word)?
            }
        };

        Ok(Instruction::new(word))
    }

    /// Registers this operation reads.
    pub fn inputs(&self) -> Vec<RegisterId> {
        let mut regs = Vec::new();

        match *self {
            Self::Alu { op1, op2, .. } => {
                regs.push(op1);
                if let Operand::Reg(r) = op2 {
                    regs.push(r);
                }
            }
            Self::Cmp { op1, op2 } => {
                regs.push(op1);
                if let Operand::Reg(r) = op2 {
                    regs.push(r);
                }
            }
            Self::Load {
                source: LoadSource::Address { base, .. },
                ..
            } => regs.push(base),
            Self::Store { src, base, .. } => {
                regs.push(src);
                regs.push(base);
            }
            Self::Branch {
                target: BranchTarget::Indirect { base, .. },
                ..
            } => regs.push(base),
            Self::Push { src } => {
                regs.push(src);
                regs.push(REG_SP);
            }
            Self::Pop { .. } => regs.push(REG_SP),
            _ => {}
        }

        regs
    }

    /// Registers this operation writes.
    pub fn outputs(&self) -> Vec<RegisterId> {
        match *self {
            Self::Alu { dest, .. } | Self::Load { dest, .. } => vec![dest],
            Self::Pop { dest } => vec![dest, REG_SP],
            Self::Push { .. } => vec![REG_SP],
            Self::Branch { link: true, .. } => vec![REG_LR],
            _ => Vec::new(),
        }
    }

    /// The dependency set: reads and writes combined, deduplicated, with
    /// `ZR` excluded since it is never a real dependency.
    pub fn dependencies(&self) -> Vec<RegisterId> {
        let mut regs = self.inputs();
        regs.extend(self.outputs());
        regs.retain(|r| *r != REG_ZR);
        regs.sort_unstable();
        regs.dedup();
        regs
    }
}

fn opcode_word(opcode: Opcode) -> Word {
    (opcode as Word) << OPCODE_START
}

fn set_operand(layout: &Layout, word: Word, op2: Operand) -> Result<Word, LayoutError> {
    match op2 {
        Operand::Reg(r) => layout.set(word, "op2", r as Word),
        Operand::Imm(value) => {
            let word = layout.set(word, "imm", 1)?;
            layout.set(word, "immediate", value)
        }
    }
}

/// Errors raised while decoding a raw instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeError {
    /// The opcode bits map to no defined opcode.
    Opcode {
        /// The offending opcode bits.
        bits: Word,
    },
    /// The condition bits map to no defined condition code.
    Condition {
        /// The offending condition bits.
        bits: Word,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opcode { bits } => write!(f, "unrecognized opcode {bits:#04x}"),
            Self::Condition { bits } => write!(f, "unrecognized condition code {bits:#03x}"),
        }
    }
}

impl std::error::Error for DecodeError {}
