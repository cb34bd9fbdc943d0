//! Execute stage: ALU, comparison, branch resolution, and stack access.

use skiff_asm::{
    BranchTarget, Flags, LoadSource, Operation, Word, REG_LR, REG_SP,
};

use super::Pipeline;
use crate::alu;
use crate::error::VmError;
use crate::memory::Access;
use crate::state::Stage;

impl Pipeline {
    /// Execute the instruction at the head of the DE latch.
    ///
    /// `PUSH` and `POP` perform their stack access here and honor memory
    /// stalls by holding the DE latch; everything else completes in one
    /// cycle. A taken branch squashes the younger stages and reseats the
    /// PC before decode and fetch run this tick.
    pub(crate) fn stage_execute(&mut self) -> Result<(), VmError> {
        if self.stalled_memory {
            return Ok(());
        }

        let Some(cur) = self.de.current.as_ref() else {
            return Ok(());
        };
        let pc = cur.pc;
        let op = cur.op;

        if self.debugger.eval(pc) {
            tracing::debug!(pc, "breakpoint");
            self.pending_break = Some(pc);
            self.stalled_execute = true;

            return Ok(());
        }

        match op {
            Operation::Alu { op, op1, op2, .. } => {
                let a = self.registers.read(op1);
                let b = self.operand(op2);

                self.retire_to_memory(Some(alu::eval(op, a, b)));
            }

            Operation::Cmp { op1, op2 } => {
                let a = self.registers.read(op1);
                let b = self.operand(op2);

                self.flags = Flags::from_cmp(a, b);
                self.retire_to_memory(None);
            }

            // the literal form forwards its literal; the address form
            // resolves its effective address for the memory stage
            Operation::Load { source, .. } => {
                let computed = match source {
                    LoadSource::Literal(value) => value,
                    LoadSource::Address { base, offset } => {
                        self.registers.read(base).wrapping_add(offset)
                    }
                };

                self.retire_to_memory(Some(computed));
            }

            Operation::Store { base, offset, .. } => {
                let ea = self.registers.read(base).wrapping_add(offset);

                self.retire_to_memory(Some(ea));
            }

            Operation::Branch { cond, link, target } => {
                let taken = cond.holds(self.flags);

                if taken {
                    let destination = match target {
                        BranchTarget::Relative(disp) => pc.wrapping_add(disp as Word),
                        BranchTarget::Indirect { base, offset } => {
                            self.registers.read(base).wrapping_add(offset)
                        }
                    };

                    // the link register captures the instruction after
                    // the BL, so an indirect branch through LR returns
                    // past the call site
                    if link {
                        self.registers.write(REG_LR, pc.wrapping_add(1));
                    }

                    self.retire_to_memory(None);
                    self.squash(destination);
                } else {
                    self.retire_to_memory(None);
                }
            }

            Operation::Push { src } => {
                let sp = self.registers.read(REG_SP);
                let value = self.registers.read(src);
                let access = self
                    .memory
                    .write(sp, value)
                    .map_err(|e| VmError::out_of_range(Stage::Execute, pc, self.cycles, e))?;

                match access {
                    Access::Stall => self.stalled_execute = true,
                    Access::Ready(()) => {
                        self.registers.write(REG_SP, sp.wrapping_sub(1));
                        self.retire_to_memory(None);
                    }
                }
            }

            Operation::Pop { .. } => {
                let sp = self.registers.read(REG_SP).wrapping_add(1);
                let access = self
                    .memory
                    .read(sp)
                    .map_err(|e| VmError::out_of_range(Stage::Execute, pc, self.cycles, e))?;

                match access {
                    Access::Stall => self.stalled_execute = true,
                    Access::Ready(value) => {
                        self.registers.write(REG_SP, sp);
                        self.retire_to_memory(Some(value));
                    }
                }
            }

            Operation::Reserved(opcode) => {
                tracing::warn!(%opcode, pc, "reserved opcode has no semantics, executing as noop");
                self.retire_to_memory(None);
            }

            Operation::Noop | Operation::End => self.retire_to_memory(None),
        }

        Ok(())
    }

    /// Move the executing instruction into the EM latch with its result.
    fn retire_to_memory(&mut self, computed: Option<Word>) {
        if let Some(mut instr) = self.de.current.take() {
            if computed.is_some() {
                instr.computed = computed;
            }

            self.em.next = Some(instr);
        }
    }
}
