//! Decode stage: variant dispatch and the hazard check.

use skiff_asm::Operation;

use super::{InFlight, Pipeline};
use crate::error::VmError;

impl Pipeline {
    /// Decode the fetched instruction and claim its dependency set.
    ///
    /// If any dependency register is claimed by an instruction farther
    /// down the pipeline, the instruction stalls in place and a bubble
    /// enters execute instead. There is no operand forwarding: a true
    /// data hazard always waits for the writer's writeback.
    pub(crate) fn stage_decode(&mut self) -> Result<(), VmError> {
        if self.stalled_memory || self.stalled_execute {
            return Ok(());
        }

        let Some(fetched) = self.fd.current else {
            return Ok(());
        };

        let op = Operation::decode(fetched.raw)
            .map_err(|e| VmError::decode(fetched.pc, fetched.raw.word(), e))?;

        if op == Operation::End {
            // stop fetching and discard the wrong-path word already in
            // flight; instructions ahead of END keep draining
            self.finished = true;
            self.fd.next = None;

            if let Some(addr) = self.pending_fetch.take() {
                self.memory.cancel_read(addr);
            }

            tracing::debug!(pc = fetched.pc, "end decoded, fetch stopped");
        }

        let claimed = op.dependencies();

        if self.registers.any_claimed(&claimed) {
            self.dependency_stall = true;

            return Ok(());
        }

        for reg in &claimed {
            self.registers.claim(*reg)?;
        }

        self.fd.current = None;
        self.de.next = Some(InFlight {
            pc: fetched.pc,
            raw: fetched.raw,
            op,
            claimed,
            computed: None,
        });

        Ok(())
    }
}
