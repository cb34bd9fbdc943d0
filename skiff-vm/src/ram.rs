//! Word-addressable main memory.

use core::fmt;

use itertools::Itertools;
use skiff_asm::Word;

use crate::consts::WORDS_PER_BLOCK;
use crate::error::AddressError;

/// Flat, zero-initialized word store.
///
/// Access latencies live in the [`MemorySubsystem`](crate::memory)
/// state machine; the store itself answers immediately.
#[derive(Debug, Clone)]
pub struct Ram {
    words: Vec<Word>,
    bits: usize,
}

impl Ram {
    /// Zeroed memory of `2^bits` words.
    pub fn with_address_bits(bits: usize) -> Self {
        Self {
            words: vec![0; 1 << bits],
            bits,
        }
    }

    /// Number of addressable words.
    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Number of bits in the address space.
    pub const fn address_bits(&self) -> usize {
        self.bits
    }

    fn check(&self, addr: Word) -> Result<usize, AddressError> {
        let index = addr as usize;

        if index < self.words.len() {
            Ok(index)
        } else {
            Err(AddressError {
                addr,
                space: self.words.len(),
            })
        }
    }

    /// Read one word.
    pub fn read(&self, addr: Word) -> Result<Word, AddressError> {
        Ok(self.words[self.check(addr)?])
    }

    /// Read the four-word block containing `addr`, in ascending address
    /// order.
    pub fn read_block(&self, addr: Word) -> Result<[Word; WORDS_PER_BLOCK], AddressError> {
        let base = self.check(addr & !(WORDS_PER_BLOCK as Word - 1))?;
        self.check(base as Word + WORDS_PER_BLOCK as Word - 1)?;

        let mut block = [0; WORDS_PER_BLOCK];
        block.copy_from_slice(&self.words[base..base + WORDS_PER_BLOCK]);

        Ok(block)
    }

    /// Write one word.
    pub fn write(&mut self, addr: Word, value: Word) -> Result<(), AddressError> {
        let index = self.check(addr)?;
        self.words[index] = value;

        Ok(())
    }

    /// Render `count` words starting at `start`, one row per block.
    pub fn dump(&self, start: Word, count: usize) -> String {
        let start = (start as usize).min(self.words.len());
        let end = (start + count).min(self.words.len());

        self.words[start..end]
            .chunks(WORDS_PER_BLOCK)
            .enumerate()
            .map(|(row, block)| {
                let base = start + row * WORDS_PER_BLOCK;
                let cells = block.iter().enumerate().format_with(" ", |(i, word), f| {
                    f(&format_args!("[{:#06x}] {:#010x}", base + i, word))
                });

                cells.to_string()
            })
            .join("\n")
    }
}

impl fmt::Display for Ram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dump(0, self.words.len()))
    }
}
