//! The L1 → L2 → RAM memory subsystem.
//!
//! Every access runs a small state machine: the first request probes the
//! hierarchy, charges the hit level's latency in stall cycles, and the
//! caller retries with identical arguments each tick until the operation
//! completes. At most one read and one write are in flight at a time;
//! unrelated requests observe a stall without disturbing the in-flight
//! operation.

use skiff_asm::Word;

use crate::cache::CacheLevel;
use crate::consts::{
    ADDRESS_BITS, L1_INDEX_BITS, L1_LATENCY, L2_INDEX_BITS, L2_LATENCY, RAM_LATENCY,
};
use crate::error::AddressError;
use crate::ram::Ram;

/// Outcome of a memory request on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Access<T> {
    /// The operation completed with this value.
    Ready(T),
    /// Retry next tick with identical arguments.
    Stall,
}

impl<T> Access<T> {
    /// Whether this access stalled.
    pub const fn is_stall(&self) -> bool {
        matches!(self, Self::Stall)
    }
}

/// Geometry and latency parameters of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Bits in the address space; RAM holds `2^address_bits` words.
    pub address_bits: usize,
    /// Index bits of the L1 cache.
    pub l1_index_bits: usize,
    /// Index bits of the L2 cache.
    pub l2_index_bits: usize,
    /// Stall cycles charged on an L1 hit.
    pub l1_latency: u32,
    /// Stall cycles charged on an L2 hit.
    pub l2_latency: u32,
    /// Stall cycles charged on a full miss.
    pub ram_latency: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            address_bits: ADDRESS_BITS,
            l1_index_bits: L1_INDEX_BITS,
            l2_index_bits: L2_INDEX_BITS,
            l1_latency: L1_LATENCY,
            l2_latency: L2_LATENCY,
            ram_latency: RAM_LATENCY,
        }
    }
}

impl MemoryConfig {
    /// Configuration with every access completing on the cycle it is
    /// issued. Keeps pipeline tests free of memory timing noise.
    pub fn instant() -> Self {
        Self {
            l1_latency: 0,
            l2_latency: 0,
            ram_latency: 0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    addr: Word,
    value: Word,
    remaining: u32,
}

/// The memory hierarchy façade the pipeline talks to.
#[derive(Debug, Clone)]
pub struct MemorySubsystem {
    ram: Ram,
    l1: CacheLevel,
    l2: CacheLevel,
    ram_latency: u32,
    read_op: Option<Pending>,
    write_op: Option<Pending>,
    read_stalls: u64,
    write_stalls: u64,
}

impl MemorySubsystem {
    /// Build the hierarchy from a configuration.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            ram: Ram::with_address_bits(config.address_bits),
            l1: CacheLevel::new(config.l1_index_bits, config.l1_latency),
            l2: CacheLevel::new(config.l2_index_bits, config.l2_latency),
            ram_latency: config.ram_latency,
            read_op: None,
            write_op: None,
            read_stalls: 0,
            write_stalls: 0,
        }
    }

    /// Latency of the level `addr` would hit right now.
    fn probe(&self, addr: Word) -> u32 {
        if self.l1.check_hit(addr) {
            self.l1.latency()
        } else if self.l2.check_hit(addr) {
            self.l2.latency()
        } else {
            self.ram_latency
        }
    }

    /// Request a read of `addr`, or retry an outstanding one.
    pub fn read(&mut self, addr: Word) -> Result<Access<Word>, AddressError> {
        self.check(addr)?;

        match self.read_op {
            None => {
                let remaining = self.probe(addr);

                if remaining == 0 {
                    return Ok(Access::Ready(self.complete_read(addr)?));
                }

                tracing::trace!(addr, stalls = remaining, "read accepted");
                self.read_op = Some(Pending {
                    addr,
                    value: 0,
                    remaining,
                });
                self.read_stalls += 1;

                Ok(Access::Stall)
            }
            Some(op) if op.addr == addr => {
                let remaining = op.remaining - 1;

                if remaining == 0 {
                    self.read_op = None;

                    Ok(Access::Ready(self.complete_read(addr)?))
                } else {
                    self.read_op = Some(Pending { remaining, ..op });
                    self.read_stalls += 1;

                    Ok(Access::Stall)
                }
            }
            // a different read is in flight
            Some(_) => {
                self.read_stalls += 1;

                Ok(Access::Stall)
            }
        }
    }

    /// Request a write of `value` to `addr`, or retry an outstanding one.
    pub fn write(&mut self, addr: Word, value: Word) -> Result<Access<()>, AddressError> {
        self.check(addr)?;

        match self.write_op {
            None => {
                let remaining = self.probe(addr);

                if remaining == 0 {
                    self.complete_write(addr, value)?;

                    return Ok(Access::Ready(()));
                }

                tracing::trace!(addr, stalls = remaining, "write accepted");
                self.write_op = Some(Pending {
                    addr,
                    value,
                    remaining,
                });
                self.write_stalls += 1;

                Ok(Access::Stall)
            }
            Some(op) if op.addr == addr && op.value == value => {
                let remaining = op.remaining - 1;

                if remaining == 0 {
                    self.write_op = None;
                    self.complete_write(addr, value)?;

                    Ok(Access::Ready(()))
                } else {
                    self.write_op = Some(Pending { remaining, ..op });
                    self.write_stalls += 1;

                    Ok(Access::Stall)
                }
            }
            Some(_) => {
                self.write_stalls += 1;

                Ok(Access::Stall)
            }
        }
    }

    /// Drop the outstanding read of `addr`, if any.
    ///
    /// A taken branch redirects fetch while its request may still be in
    /// flight; without cancellation the abandoned request would hold the
    /// read slot forever.
    pub fn cancel_read(&mut self, addr: Word) {
        if matches!(self.read_op, Some(op) if op.addr == addr) {
            self.read_op = None;
        }
    }

    /// Finish a read: serve an L1 hit directly, otherwise fill L2 then L1
    /// from RAM (write-through keeps RAM coherent) and serve from the
    /// fresh block.
    fn complete_read(&mut self, addr: Word) -> Result<Word, AddressError> {
        if let Some(value) = self.l1.read(addr) {
            return Ok(value);
        }

        let block = self.ram.read_block(addr)?;

        self.l2.replace(addr, block);
        self.l1.replace(addr, block);

        Ok(block[addr as usize % block.len()])
    }

    /// Finish a write: write-through to RAM, update every level holding
    /// the block, fill L1 on an L2 hit it missed, and touch no cache on a
    /// full miss (no allocate).
    fn complete_write(&mut self, addr: Word, value: Word) -> Result<(), AddressError> {
        self.ram.write(addr, value)?;

        let l1_hit = self.l1.write(addr, value);
        let l2_hit = self.l2.write(addr, value);

        if !l1_hit && l2_hit {
            let block = self.ram.read_block(addr)?;
            self.l1.replace(addr, block);
        }

        Ok(())
    }

    fn check(&self, addr: Word) -> Result<(), AddressError> {
        if (addr as usize) < self.ram.capacity() {
            Ok(())
        } else {
            Err(AddressError {
                addr,
                space: self.ram.capacity(),
            })
        }
    }

    /// The backing store, the coherent view of memory under write-through.
    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    /// Mutable backing store, for program loading and debugger pokes.
    pub fn ram_mut(&mut self) -> &mut Ram {
        &mut self.ram
    }

    /// The L1 cache.
    pub fn l1(&self) -> &CacheLevel {
        &self.l1
    }

    /// The L2 cache.
    pub fn l2(&self) -> &CacheLevel {
        &self.l2
    }

    /// Total stall cycles observed by read requests.
    pub const fn read_stalls(&self) -> u64 {
        self.read_stalls
    }

    /// Total stall cycles observed by write requests.
    pub const fn write_stalls(&self) -> u64 {
        self.write_stalls
    }
}
