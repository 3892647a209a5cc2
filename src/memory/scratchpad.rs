//! Cluster-local scratchpad and its allocator.
//!
//! The scratchpad is the low-latency memory every core in the cluster can
//! reach with ordinary loads and stores. It is filled from backing memory
//! by explicit DMA. Allocation is a bump pointer: regions are never freed
//! individually, only by [`Scratchpad::reset`] between runs.
//!
//! Fresh scratchpad contents are not zeroed. The model fills them with a
//! poison byte so a read that races an incomplete DMA shows up as garbage
//! instead of as plausible zeros.

use std::fmt;

use super::{translate, ByteMemory, MemoryError, MemorySpace};

/// Address in the scratchpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScratchPtr(u32);

impl ScratchPtr {
    /// Wrap a raw address.
    pub const fn new(address: u32) -> Self {
        Self(address)
    }

    /// Raw address.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Address as a 64-bit value for [`ByteMemory`] calls.
    pub const fn addr(self) -> u64 {
        self.0 as u64
    }
}

impl fmt::Display for ScratchPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// A region handed out by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Start of the region.
    pub ptr: ScratchPtr,
    /// Requested size in bytes.
    pub size: usize,
}

/// Cluster-local scratchpad memory.
pub struct Scratchpad {
    base: u32,
    data: Vec<u8>,
    /// Next free offset.
    next: usize,
    allocations: Vec<Allocation>,
    fill: u8,
}

impl Scratchpad {
    /// Default base address of the scratchpad.
    pub const DEFAULT_BASE: u32 = 0x1000_0000;

    /// Allocation alignment in bytes (one 64-bit bank word).
    pub const ALIGN: usize = 8;

    /// Create a scratchpad of `size` bytes filled with `fill`.
    pub fn new(size: usize, fill: u8) -> Self {
        Self {
            base: Self::DEFAULT_BASE,
            data: vec![fill; size],
            next: 0,
            allocations: Vec::new(),
            fill,
        }
    }

    /// Allocate `bytes` bytes.
    ///
    /// The returned region is not initialized.
    pub fn allocate(&mut self, bytes: usize) -> Result<ScratchPtr, MemoryError> {
        let offset = self.next.next_multiple_of(Self::ALIGN);
        let end = offset.checked_add(bytes).filter(|&end| end <= self.data.len());
        let Some(end) = end else {
            return Err(MemoryError::OutOfMemory {
                space: MemorySpace::Scratchpad,
                requested: bytes,
                available: self.available(),
            });
        };

        self.next = end;
        let ptr = ScratchPtr(self.base + offset as u32);
        self.allocations.push(Allocation { ptr, size: bytes });
        log::debug!("scratchpad: allocated {} bytes at {}", bytes, ptr);
        Ok(ptr)
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.next
    }

    /// Bytes still available to an aligned allocation.
    pub fn available(&self) -> usize {
        self.data
            .len()
            .saturating_sub(self.next.next_multiple_of(Self::ALIGN))
    }

    /// Regions allocated so far, in order.
    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Poison byte used for uninitialized memory.
    pub fn fill_byte(&self) -> u8 {
        self.fill
    }

    /// Drop all allocations and re-poison the memory.
    pub fn reset(&mut self) {
        self.data.fill(self.fill);
        self.next = 0;
        self.allocations.clear();
    }
}

impl ByteMemory for Scratchpad {
    fn space(&self) -> MemorySpace {
        MemorySpace::Scratchpad
    }

    fn check_range(&self, address: u64, len: usize) -> Result<(), MemoryError> {
        translate(MemorySpace::Scratchpad, self.base as u64, self.data.len(), address, len).map(|_| ())
    }

    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        let offset = translate(MemorySpace::Scratchpad, self.base as u64, self.data.len(), address, buf.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_bytes(&mut self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        let offset = translate(MemorySpace::Scratchpad, self.base as u64, self.data.len(), address, data.len())?;
        self.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_aligned() {
        let mut spm = Scratchpad::new(256, 0);
        let a = spm.allocate(12).unwrap();
        let b = spm.allocate(4).unwrap();

        assert_eq!(a.get(), Scratchpad::DEFAULT_BASE);
        assert_eq!(b.get(), Scratchpad::DEFAULT_BASE + 16);
        assert_eq!(spm.allocations().len(), 2);
        assert_eq!(spm.used(), 20);
    }

    #[test]
    fn test_no_zero_initialization() {
        let mut spm = Scratchpad::new(64, 0xA5);
        let a = spm.allocate(8).unwrap();
        let words = spm.read_words(a.addr(), 2).unwrap();
        assert_eq!(words, vec![0xA5A5_A5A5u32 as i32; 2]);
    }

    #[test]
    fn test_out_of_memory() {
        let mut spm = Scratchpad::new(32, 0);
        spm.allocate(24).unwrap();
        assert_eq!(
            spm.allocate(16),
            Err(MemoryError::OutOfMemory {
                space: MemorySpace::Scratchpad,
                requested: 16,
                available: 8,
            })
        );
    }

    #[test]
    fn test_word_access_round_trip() {
        let mut spm = Scratchpad::new(64, 0);
        let a = spm.allocate(16).unwrap();
        spm.write_words(a.addr(), &[-1, 0, 7, i32::MAX]).unwrap();
        assert_eq!(spm.read_words(a.addr(), 4).unwrap(), vec![-1, 0, 7, i32::MAX]);
    }

    #[test]
    fn test_reset_repoisons() {
        let mut spm = Scratchpad::new(16, 0x5A);
        let a = spm.allocate(4).unwrap();
        spm.write_words(a.addr(), &[0]).unwrap();
        spm.reset();

        assert!(spm.allocations().is_empty());
        let b = spm.allocate(4).unwrap();
        assert_eq!(a, b);
        assert_eq!(spm.read_words(b.addr(), 1).unwrap(), vec![0x5A5A_5A5A]);
    }
}
