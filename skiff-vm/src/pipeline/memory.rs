//! Memory stage: data-side reads and writes through the hierarchy.

use skiff_asm::{LoadSource, Operation};

use super::Pipeline;
use crate::error::VmError;
use crate::memory::Access;
use crate::state::Stage;

impl Pipeline {
    /// Perform the data access of the instruction at the head of the EM
    /// latch.
    ///
    /// On a stall the instruction holds its latch, a bubble propagates to
    /// writeback, and every upstream stage freezes until the subsystem
    /// completes. Loads of the literal form already carry their value and
    /// pass straight through, as does everything that is not a load or
    /// store.
    pub(crate) fn stage_memory(&mut self) -> Result<(), VmError> {
        let Some(cur) = self.em.current.as_ref() else {
            return Ok(());
        };
        let pc = cur.pc;
        let op = cur.op;
        let computed = cur.computed;

        match (op, computed) {
            (
                Operation::Load {
                    source: LoadSource::Address { .. },
                    ..
                },
                Some(ea),
            ) => {
                let access = self
                    .memory
                    .read(ea)
                    .map_err(|e| VmError::out_of_range(Stage::Memory, pc, self.cycles, e))?;

                match access {
                    Access::Stall => self.stalled_memory = true,
                    Access::Ready(value) => self.retire_to_writeback(Some(value)),
                }
            }

            (Operation::Store { src, .. }, Some(ea)) => {
                let value = self.registers.read(src);
                let access = self
                    .memory
                    .write(ea, value)
                    .map_err(|e| VmError::out_of_range(Stage::Memory, pc, self.cycles, e))?;

                match access {
                    Access::Stall => self.stalled_memory = true,
                    Access::Ready(()) => self.retire_to_writeback(None),
                }
            }

            _ => self.retire_to_writeback(None),
        }

        Ok(())
    }

    /// Move the instruction into the MW latch, replacing its computed
    /// slot with the loaded value when one arrived.
    fn retire_to_writeback(&mut self, loaded: Option<skiff_asm::Word>) {
        if let Some(mut instr) = self.em.current.take() {
            if loaded.is_some() {
                instr.computed = loaded;
            }

            self.mw.next = Some(instr);
        }
    }
}
