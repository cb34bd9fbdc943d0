//! The five-stage in-order pipeline executor.
//!
//! Each tick runs the stage functions in reverse order (writeback,
//! memory, execute, decode, fetch) and then shifts the
//! inter-stage latches. Running in reverse order means every stage reads
//! the latch state its downstream neighbor produced on the previous
//! tick, and stall decisions made downstream are visible upstream within
//! the same tick.
//!
//! Stalls come in three strengths, each freezing a longer prefix of the
//! pipeline:
//!
//! - a *dependency* stall holds fetch/decode while a bubble enters
//!   execute;
//! - an *execute* stall (stack access waiting on memory, or a
//!   breakpoint) additionally holds the execute input;
//! - a *memory* stall freezes everything upstream of writeback.

use itertools::Itertools;

use skiff_asm::{Flags, Instruction, Operation, RegisterId, Word, REGISTER_COUNT};

use crate::debugger::Debugger;
use crate::error::VmError;
use crate::loader;
use crate::memory::{MemoryConfig, MemorySubsystem};
use crate::ram::Ram;
use crate::registers::RegisterFile;
use crate::state::{RunState, Stage, StageView};

mod decode;
mod execute;
mod fetch;
mod memory;
mod writeback;

/// A fetched word waiting to be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fetched {
    pub(crate) pc: Word,
    pub(crate) raw: Instruction,
}

/// An instruction in flight between decode and writeback.
///
/// Carries only its decoded fields, its register claims, and a result
/// slot; all machine state lives in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InFlight {
    pub(crate) pc: Word,
    pub(crate) raw: Instruction,
    pub(crate) op: Operation,
    pub(crate) claimed: Vec<RegisterId>,
    pub(crate) computed: Option<Word>,
}

/// An inter-stage latch: the current-cycle output and the next-cycle
/// input slot. `None` is a bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Latch<T> {
    pub(crate) current: Option<T>,
    pub(crate) next: Option<T>,
}

impl<T> Latch<T> {
    const fn empty() -> Self {
        Self {
            current: None,
            next: None,
        }
    }

    /// Advance one cycle: next becomes current, next empties.
    fn shift(&mut self) {
        self.current = self.next.take();
    }
}

/// The simulator core: pipeline, register file, flags, and the memory
/// hierarchy, advanced only by explicit [`step`](Self::step) calls.
#[derive(Debug, Clone)]
pub struct Pipeline {
    memory: MemorySubsystem,
    registers: RegisterFile,
    flags: Flags,
    debugger: Debugger,

    pc: Word,
    cycles: u64,
    retired: u64,
    finished: bool,
    halted: bool,

    fd: Latch<Fetched>,
    de: Latch<InFlight>,
    em: Latch<InFlight>,
    mw: Latch<InFlight>,

    /// Address of the fetch request currently in flight.
    pending_fetch: Option<Word>,
    /// Breakpoint reached during the last tick.
    pending_break: Option<Word>,

    stalled_memory: bool,
    stalled_execute: bool,
    dependency_stall: bool,
}

impl Pipeline {
    /// Build a pipeline over an existing memory subsystem.
    ///
    /// The stack base (initial `SP` and `BP`) is the highest valid word
    /// address.
    pub fn with_memory(memory: MemorySubsystem) -> Self {
        let stack_base = (memory.ram().capacity() - 1) as Word;

        Self {
            memory,
            registers: RegisterFile::with_stack_base(stack_base),
            flags: Flags::empty(),
            debugger: Debugger::default(),
            pc: 0,
            cycles: 0,
            retired: 0,
            finished: false,
            halted: false,
            fd: Latch::empty(),
            de: Latch::empty(),
            em: Latch::empty(),
            mw: Latch::empty(),
            pending_fetch: None,
            pending_break: None,
            stalled_memory: false,
            stalled_execute: false,
            dependency_stall: false,
        }
    }

    /// Build a pipeline with a fresh hierarchy from a memory
    /// configuration.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self::with_memory(MemorySubsystem::with_config(config))
    }

    /// Advance the machine by at most `cycles` ticks.
    ///
    /// Stops early at a breakpoint or when an `END` retires. Stalls are
    /// consumed internally and never surface here.
    pub fn step(&mut self, cycles: u64) -> Result<RunState, VmError> {
        for _ in 0..cycles {
            if self.halted {
                break;
            }

            self.tick()?;

            if let Some(pc) = self.pending_break.take() {
                self.debugger.pause_at(pc);

                return Ok(RunState::Breakpoint(pc));
            }
        }

        Ok(if self.halted {
            RunState::Halted
        } else {
            RunState::Running
        })
    }

    /// Run until halt, breakpoint, or the cycle bound.
    pub fn run(&mut self, max_cycles: u64) -> Result<RunState, VmError> {
        self.step(max_cycles)
    }

    /// One cycle: stage functions in reverse stage order, then the latch
    /// shift.
    fn tick(&mut self) -> Result<(), VmError> {
        self.dependency_stall = false;
        self.stalled_execute = false;
        self.stalled_memory = false;

        self.stage_writeback();
        self.stage_memory()?;
        self.stage_execute()?;
        self.stage_decode()?;
        self.stage_fetch()?;

        self.advance();
        self.cycles += 1;

        Ok(())
    }

    /// Shift the latches, honoring back-pressure: the strongest stall
    /// freezes the longest prefix of the pipeline.
    fn advance(&mut self) {
        if self.stalled_memory {
            self.mw.shift();
        } else if self.stalled_execute {
            self.em.shift();
            self.mw.shift();
        } else if self.dependency_stall {
            self.de.shift();
            self.em.shift();
            self.mw.shift();
        } else {
            self.fd.shift();
            self.de.shift();
            self.em.shift();
            self.mw.shift();
        }
    }

    /// Discard everything younger than a taken branch and reseat the PC.
    ///
    /// Squashed decoded instructions release their register claims; a
    /// fetch still in flight is cancelled so the redirected fetch can use
    /// the read slot.
    pub(crate) fn squash(&mut self, target: Word) {
        tracing::debug!(pc = target, "taken branch, squashing fetch and decode");

        self.fd.current = None;
        self.fd.next = None;

        for slot in [self.de.current.take(), self.de.next.take()] {
            if let Some(instr) = slot {
                self.release(&instr);
            }
        }

        if let Some(addr) = self.pending_fetch.take() {
            self.memory.cancel_read(addr);
        }

        self.pc = target;
    }

    /// Free every register an instruction claimed.
    pub(crate) fn release(&mut self, instr: &InFlight) {
        for reg in &instr.claimed {
            self.registers.free(*reg);
        }
    }

    pub(crate) fn operand(&self, op2: skiff_asm::Operand) -> Word {
        match op2 {
            skiff_asm::Operand::Reg(reg) => self.registers.read(reg),
            skiff_asm::Operand::Imm(value) => value,
        }
    }

    /// Load assembler output into RAM at `base`.
    ///
    /// The program text is parsed and bounds-checked before anything is
    /// written; on error the machine is unchanged.
    pub fn load_program(&mut self, source: &str, base: Word) -> Result<usize, VmError> {
        let words = loader::parse_program(source)?;

        loader::load_words(self.memory.ram_mut(), &words, base)?;

        Ok(words.len())
    }

    /// Load already-encoded instructions into RAM at `base`.
    pub fn load_instructions(
        &mut self,
        program: &[Instruction],
        base: Word,
    ) -> Result<usize, VmError> {
        let words: Vec<Word> = program.iter().map(|i| i.word()).collect();

        loader::load_words(self.memory.ram_mut(), &words, base)?;

        Ok(words.len())
    }

    /// The program counter: address of the next fetch.
    pub const fn pc(&self) -> Word {
        self.pc
    }

    /// Elapsed cycles.
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Instructions retired through writeback, bubbles excluded.
    pub const fn retired(&self) -> u64 {
        self.retired
    }

    /// Whether an `END` has retired and the pipeline has drained.
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Current condition flags.
    pub const fn flags(&self) -> Flags {
        self.flags
    }

    /// All register values.
    pub const fn registers(&self) -> &[Word; REGISTER_COUNT] {
        self.registers.registers()
    }

    /// Read one register.
    pub fn read_register(&self, reg: RegisterId) -> Word {
        self.registers.read(reg)
    }

    /// Write one register between ticks, for test setup and debugger
    /// pokes.
    pub fn write_register(&mut self, reg: RegisterId, value: Word) {
        self.registers.write(reg, value);
    }

    /// Read memory through the coherent RAM view.
    pub fn read_memory(&self, addr: Word) -> Result<Word, crate::error::AddressError> {
        self.memory.ram().read(addr)
    }

    /// The memory hierarchy.
    pub const fn memory(&self) -> &MemorySubsystem {
        &self.memory
    }

    /// Mutable memory hierarchy, for data preloading.
    pub fn memory_mut(&mut self) -> &mut MemorySubsystem {
        &mut self.memory
    }

    /// The backing RAM.
    pub fn ram(&self) -> &Ram {
        self.memory.ram()
    }

    /// Breakpoint handler.
    pub const fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    /// Mutable breakpoint handler.
    pub fn debugger_mut(&mut self) -> &mut Debugger {
        &mut self.debugger
    }

    /// The instruction resident in each stage, valid between ticks.
    pub fn stages(&self) -> [StageView; 5] {
        let fetching = self
            .pending_fetch
            .map(|pc| StageView {
                stage: Stage::Fetch,
                pc: Some(pc),
                opcode: None,
            })
            .or_else(|| {
                self.fd.next.map(|f| StageView {
                    stage: Stage::Fetch,
                    pc: Some(f.pc),
                    opcode: f.raw.opcode().ok(),
                })
            })
            .unwrap_or(StageView {
                stage: Stage::Fetch,
                pc: None,
                opcode: None,
            });

        [
            fetching,
            view(Stage::Decode, self.fd.current.as_ref().map(|f| (f.pc, f.raw))),
            view(Stage::Execute, self.de.current.as_ref().map(|i| (i.pc, i.raw))),
            view(Stage::Memory, self.em.current.as_ref().map(|i| (i.pc, i.raw))),
            view(
                Stage::Writeback,
                self.mw.current.as_ref().map(|i| (i.pc, i.raw)),
            ),
        ]
    }
}

fn view(stage: Stage, slot: Option<(Word, Instruction)>) -> StageView {
    match slot {
        Some((pc, raw)) => StageView {
            stage,
            pc: Some(pc),
            opcode: raw.opcode().ok(),
        },
        None => StageView {
            stage,
            pc: None,
            opcode: None,
        },
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::with_config(MemoryConfig::default())
    }
}

impl core::fmt::Display for Pipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        writeln!(
            f,
            "cycle {} pc {} retired {} flags {:?}",
            self.cycles, self.pc, self.retired, self.flags
        )?;

        write!(f, "{}", self.stages().iter().join("\n"))
    }
}
