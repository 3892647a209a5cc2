//! Memories visible to the harness.
//!
//! - [`BackingMemory`]: large main memory holding the canonical input
//!   buffers, reached only through DMA.
//! - [`Scratchpad`]: cluster-local fast memory, carved up by a bump
//!   allocator and shared by every core.
//!
//! Both implement [`ByteMemory`] so the DMA engine can copy between them in
//! either direction. Words are 32-bit little-endian.

pub mod backing;
pub mod scratchpad;

pub use backing::{BackingMemory, HostAddr, MemoryRegion};
pub use scratchpad::{Allocation, ScratchPtr, Scratchpad};

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Size of one data word in bytes.
pub const WORD_BYTES: usize = 4;

/// Which memory an address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    /// Main memory behind the DMA.
    Backing,
    /// Cluster-local scratchpad.
    Scratchpad,
}

impl std::fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemorySpace::Backing => write!(f, "backing"),
            MemorySpace::Scratchpad => write!(f, "scratchpad"),
        }
    }
}

/// Error type for memory operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Access falls outside the memory.
    #[error("{space} access of {len} bytes at 0x{address:08X} is out of bounds")]
    OutOfBounds {
        /// Memory accessed.
        space: MemorySpace,
        /// Start address.
        address: u64,
        /// Access length in bytes.
        len: usize,
    },

    /// Allocator exhausted.
    #[error("{space} exhausted: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Memory allocated from.
        space: MemorySpace,
        /// Bytes requested.
        requested: usize,
        /// Bytes left.
        available: usize,
    },

    /// A named region already exists.
    #[error("region '{0}' already exists")]
    DuplicateRegion(String),
}

/// Byte-addressed memory that DMA and the vector unit can access.
pub trait ByteMemory {
    /// Which memory this is.
    fn space(&self) -> MemorySpace;

    /// Copy `buf.len()` bytes starting at `address` into `buf`.
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Copy `data` into memory starting at `address`.
    fn write_bytes(&mut self, address: u64, data: &[u8]) -> Result<(), MemoryError>;

    /// Check that `[address, address + len)` lies inside this memory.
    fn check_range(&self, address: u64, len: usize) -> Result<(), MemoryError>;

    /// Read `count` 32-bit words.
    fn read_words(&self, address: u64, count: usize) -> Result<Vec<i32>, MemoryError> {
        let mut bytes = vec![0u8; count * WORD_BYTES];
        self.read_bytes(address, &mut bytes)?;
        let mut words = vec![0i32; count];
        LittleEndian::read_i32_into(&bytes, &mut words);
        Ok(words)
    }

    /// Write 32-bit words.
    fn write_words(&mut self, address: u64, words: &[i32]) -> Result<(), MemoryError> {
        let mut bytes = vec![0u8; words.len() * WORD_BYTES];
        LittleEndian::write_i32_into(words, &mut bytes);
        self.write_bytes(address, &bytes)
    }
}

/// Translate an absolute address into an offset inside `[base, base + size)`.
pub(crate) fn translate(
    space: MemorySpace,
    base: u64,
    size: usize,
    address: u64,
    len: usize,
) -> Result<usize, MemoryError> {
    let out_of_bounds = MemoryError::OutOfBounds { space, address, len };
    let offset = address.checked_sub(base).ok_or_else(|| out_of_bounds.clone())?;
    let end = offset.checked_add(len as u64).ok_or_else(|| out_of_bounds.clone())?;
    if end > size as u64 {
        return Err(out_of_bounds);
    }
    Ok(offset as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_bounds() {
        assert_eq!(translate(MemorySpace::Backing, 0x100, 64, 0x100, 64), Ok(0));
        assert_eq!(translate(MemorySpace::Backing, 0x100, 64, 0x120, 16), Ok(0x20));
        assert!(translate(MemorySpace::Backing, 0x100, 64, 0x0FC, 4).is_err());
        assert!(translate(MemorySpace::Backing, 0x100, 64, 0x13C, 8).is_err());
        assert!(translate(MemorySpace::Backing, 0x100, 64, u64::MAX, 8).is_err());
    }
}
