//! Writeback stage: register update and dependency release.

use skiff_asm::Operation;

use super::Pipeline;

impl Pipeline {
    /// Retire the instruction at the head of the MW latch.
    ///
    /// ALU results, loaded values, and popped values reach the register
    /// file here; comparisons, stores, and branches retire without a
    /// register write. Every register the instruction claimed at decode
    /// is released.
    pub(crate) fn stage_writeback(&mut self) {
        let Some(instr) = self.mw.current.take() else {
            return;
        };

        match instr.op {
            Operation::Alu { dest, .. }
            | Operation::Load { dest, .. }
            | Operation::Pop { dest } => {
                if let Some(value) = instr.computed {
                    self.registers.write(dest, value);
                }
            }
            _ => {}
        }

        self.release(&instr);
        self.retired += 1;

        if instr.op == Operation::End {
            self.halted = true;
            tracing::debug!(
                cycles = self.cycles,
                retired = self.retired,
                "end retired, machine halted"
            );
        }
    }
}
