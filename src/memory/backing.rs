//! Simulated main memory behind the cluster DMA.
//!
//! In the real system the input patterns live in DRAM and only reach the
//! cluster through DMA. This module simulates that DRAM. Buffers are
//! placed in named regions so they can be tracked and reported.
//!
//! # Usage
//!
//! ```
//! use dimc_probe::memory::{BackingMemory, ByteMemory};
//!
//! let mut mem = BackingMemory::new();
//! let input = mem.place_words("filter", &[42, 43, 44, 45]).unwrap();
//!
//! assert_eq!(mem.read_words(input.get(), 4).unwrap(), vec![42, 43, 44, 45]);
//! assert_eq!(mem.region("filter").unwrap().size, 16);
//! ```

use std::fmt;

use super::{translate, ByteMemory, MemoryError, MemorySpace, WORD_BYTES};

/// Address in backing memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostAddr(u64);

impl HostAddr {
    /// Wrap a raw address.
    pub const fn new(address: u64) -> Self {
        Self(address)
    }

    /// Raw address.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// A named memory region for tracking.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    /// Human-readable name (e.g., "filter", "zeros")
    pub name: String,
    /// Base address
    pub base_address: u64,
    /// Size in bytes
    pub size: usize,
}

impl MemoryRegion {
    /// Check if an address falls within this region.
    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base_address && addr < self.base_address + self.size as u64
    }
}

/// Simulated backing memory.
///
/// Storage is dense and grows as regions are placed. Regions are laid out
/// back to back, each aligned to [`BackingMemory::ALIGN`].
pub struct BackingMemory {
    base: u64,
    data: Vec<u8>,
    regions: Vec<MemoryRegion>,
    total_bytes_written: u64,
    total_bytes_read: std::cell::Cell<u64>,
}

impl Default for BackingMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackingMemory {
    /// Default base address (start of DRAM).
    pub const DEFAULT_BASE: u64 = 0x8000_0000;

    /// Region alignment in bytes.
    pub const ALIGN: usize = 64;

    /// Create an empty backing memory at the default base.
    pub fn new() -> Self {
        Self::with_base(Self::DEFAULT_BASE)
    }

    /// Create an empty backing memory at `base`.
    pub fn with_base(base: u64) -> Self {
        Self {
            base,
            data: Vec::new(),
            regions: Vec::new(),
            total_bytes_written: 0,
            total_bytes_read: std::cell::Cell::new(0),
        }
    }

    /// Reserve a zero-filled named region.
    pub fn reserve(&mut self, name: impl Into<String>, size: usize) -> Result<HostAddr, MemoryError> {
        let name = name.into();
        if self.region(&name).is_some() {
            return Err(MemoryError::DuplicateRegion(name));
        }

        let offset = self.data.len().next_multiple_of(Self::ALIGN);
        self.data.resize(offset + size, 0);

        let base_address = self.base + offset as u64;
        log::debug!("backing region '{}' at 0x{:08X} ({} bytes)", name, base_address, size);
        self.regions.push(MemoryRegion { name, base_address, size });
        Ok(HostAddr(base_address))
    }

    /// Reserve a named region and fill it with `words`.
    pub fn place_words(&mut self, name: impl Into<String>, words: &[i32]) -> Result<HostAddr, MemoryError> {
        let addr = self.reserve(name, words.len() * WORD_BYTES)?;
        self.write_words(addr.get(), words)?;
        Ok(addr)
    }

    /// Find a region by name.
    pub fn region(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    /// Find the region containing an address.
    pub fn region_at(&self, addr: u64) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.contains(addr))
    }

    /// All regions in placement order.
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// Total bytes written since creation.
    pub fn total_bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    /// Total bytes read since creation.
    pub fn total_bytes_read(&self) -> u64 {
        self.total_bytes_read.get()
    }
}

impl ByteMemory for BackingMemory {
    fn space(&self) -> MemorySpace {
        MemorySpace::Backing
    }

    fn check_range(&self, address: u64, len: usize) -> Result<(), MemoryError> {
        translate(MemorySpace::Backing, self.base, self.data.len(), address, len).map(|_| ())
    }

    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        let offset = translate(MemorySpace::Backing, self.base, self.data.len(), address, buf.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        self.total_bytes_read.set(self.total_bytes_read.get() + buf.len() as u64);
        Ok(())
    }

    fn write_bytes(&mut self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        let offset = translate(MemorySpace::Backing, self.base, self.data.len(), address, data.len())?;
        self.data[offset..offset + data.len()].copy_from_slice(data);
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}
