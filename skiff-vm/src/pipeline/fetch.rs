//! Fetch stage.

use skiff_asm::Instruction;

use super::{Fetched, Pipeline};
use crate::error::VmError;
use crate::memory::Access;
use crate::state::Stage;

impl Pipeline {
    /// Request the word at PC from the memory subsystem, honoring stalls.
    ///
    /// An in-flight request is retried unconditionally, even while
    /// upstream holds are in force: the read slot must drain so data-side
    /// reads can make progress, and a completed word parks in the held FD
    /// latch until the stall clears.
    pub(crate) fn stage_fetch(&mut self) -> Result<(), VmError> {
        if self.finished {
            // END has decoded; drop anything still in flight
            if let Some(addr) = self.pending_fetch.take() {
                self.memory.cancel_read(addr);
            }

            return Ok(());
        }

        if let Some(addr) = self.pending_fetch {
            let access = self
                .memory
                .read(addr)
                .map_err(|e| VmError::out_of_range(Stage::Fetch, addr, self.cycles, e))?;

            if let Access::Ready(word) = access {
                self.pending_fetch = None;
                self.fd.next = Some(Fetched {
                    pc: addr,
                    raw: Instruction::new(word),
                });
                self.pc = addr.wrapping_add(1);
            }

            return Ok(());
        }

        if self.dependency_stall || self.stalled_execute || self.stalled_memory {
            return Ok(());
        }

        if self.fd.next.is_some() {
            // a completed fetch is already parked behind a held latch
            return Ok(());
        }

        let pc = self.pc;
        let access = self
            .memory
            .read(pc)
            .map_err(|e| VmError::out_of_range(Stage::Fetch, pc, self.cycles, e))?;

        match access {
            Access::Stall => self.pending_fetch = Some(pc),
            Access::Ready(word) => {
                self.fd.next = Some(Fetched {
                    pc,
                    raw: Instruction::new(word),
                });
                self.pc = pc.wrapping_add(1);
            }
        }

        Ok(())
    }
}
