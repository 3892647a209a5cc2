//! Per-core vector unit.
//!
//! The unit owns one [`VectorRegisterFile`] and the active [`VType`]. It
//! moves fixed-size blocks between memory and registers `v0..vN-1`.
//!
//! # Block layout
//!
//! Every size is derived from the *granted* vector length, never from the
//! request passed to `configure`:
//!
//! ```text
//! vl                  = granted
//! registers_per_slice = ceil(vl / lanes)
//! slices              = ceil(elements / vl)
//! stride              = vl * 4 bytes
//!
//! slice 0  ──► v0 .. v(rps-1)
//! slice 1  ──► v(rps) .. v(2·rps-1)
//! ...
//! ```
//!
//! A layout needing more than 32 registers is rejected up front.
//!
//! # Usage
//!
//! ```
//! use dimc_probe::memory::{ByteMemory, Scratchpad};
//! use dimc_probe::vector::{Lmul, Sew, VectorUnit};
//!
//! let mut spm = Scratchpad::new(1024, 0);
//! let a = spm.allocate(32).unwrap();
//! spm.write_words(a.addr(), &[42, 43, 44, 45, 46, 47, 48, 49]).unwrap();
//!
//! let mut vu = VectorUnit::new(512).unwrap();
//! assert_eq!(vu.configure(Sew::E32, Lmul::M8, 8), 8);
//!
//! let layout = vu.layout(8).unwrap();
//! vu.load_block(&spm, a.addr(), &layout).unwrap();
//! assert_eq!(vu.registers().read_lane(0, 7), 49);
//! ```

pub mod registers;
pub mod vtype;

pub use registers::{VectorRegisterFile, NUM_VECTOR_REGS};
pub use vtype::{vlmax, Lmul, Sew, VType};

use thiserror::Error;

use crate::memory::{ByteMemory, MemoryError, WORD_BYTES};

/// Default vector register width in bits.
pub const DEFAULT_VLEN: usize = 512;

/// Vector unit errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VectorError {
    /// VLEN is not a power of two in range.
    #[error("unsupported VLEN {0} (expected a power of two in 32..=65536)")]
    InvalidVlen(usize),

    /// Block transfer before `configure`.
    #[error("vector unit used before configure")]
    NotConfigured,

    /// Block transfers move 32-bit words only.
    #[error("block transfer needs e32, configured {0}")]
    UnsupportedElementWidth(Sew),

    /// Configure granted zero elements.
    #[error("granted vector length is zero")]
    ZeroVectorLength,

    /// Layout needs more registers than exist.
    #[error("{slices} slices x {registers_per_slice} registers exceeds the {available}-register file")]
    RegisterFileExhausted {
        /// Slices needed.
        slices: usize,
        /// Registers per slice.
        registers_per_slice: usize,
        /// Registers available.
        available: usize,
    },

    /// Layout was derived under a different configuration.
    #[error("block layout does not match the active vector configuration")]
    StaleLayout,

    /// Memory range check failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// How a buffer maps onto the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Total elements moved.
    pub elements: usize,
    /// Elements per slice (the granted VL).
    pub vl: usize,
    /// Registers consumed by one slice.
    pub registers_per_slice: usize,
    /// Number of slices.
    pub slices: usize,
    /// Byte distance between slices in memory.
    pub stride: usize,
}

impl BlockLayout {
    /// Derive a layout for `elements` words from the granted VL.
    pub fn for_elements(vl: usize, lanes: usize, elements: usize) -> Result<Self, VectorError> {
        if vl == 0 || lanes == 0 {
            return Err(VectorError::ZeroVectorLength);
        }
        let registers_per_slice = vl.div_ceil(lanes);
        let slices = elements.div_ceil(vl);
        if slices * registers_per_slice > NUM_VECTOR_REGS {
            return Err(VectorError::RegisterFileExhausted {
                slices,
                registers_per_slice,
                available: NUM_VECTOR_REGS,
            });
        }
        Ok(Self {
            elements,
            vl,
            registers_per_slice,
            slices,
            stride: vl * WORD_BYTES,
        })
    }

    /// Registers touched: `v0..registers_used()`.
    pub fn registers_used(&self) -> usize {
        self.slices * self.registers_per_slice
    }

    /// Bytes covered in memory.
    pub fn byte_len(&self) -> usize {
        self.elements * WORD_BYTES
    }

    /// Elements moved by slice `index`; only the last slice may be short.
    pub fn slice_len(&self, index: usize) -> usize {
        self.vl.min(self.elements.saturating_sub(index * self.vl))
    }

    /// First register of slice `index`.
    pub fn slice_register(&self, index: usize) -> usize {
        index * self.registers_per_slice
    }
}

/// Load/store counters.
#[derive(Debug, Clone, Default)]
pub struct VectorStats {
    /// `configure` calls.
    pub configures: u64,
    /// Slice loads issued.
    pub slice_loads: u64,
    /// Slice stores issued.
    pub slice_stores: u64,
}

/// One core's vector unit.
pub struct VectorUnit {
    vlen: usize,
    vtype: Option<VType>,
    regs: VectorRegisterFile,
    stats: VectorStats,
}

impl VectorUnit {
    /// Create a unit with `vlen_bits` wide registers.
    pub fn new(vlen_bits: usize) -> Result<Self, VectorError> {
        if !vlen_bits.is_power_of_two() || !(32..=65536).contains(&vlen_bits) {
            return Err(VectorError::InvalidVlen(vlen_bits));
        }
        Ok(Self {
            vlen: vlen_bits,
            vtype: None,
            regs: VectorRegisterFile::new(vlen_bits / 32),
            stats: VectorStats::default(),
        })
    }

    /// Register width in bits.
    pub fn vlen(&self) -> usize {
        self.vlen
    }

    /// 32-bit lanes per register.
    pub fn lanes(&self) -> usize {
        self.regs.lanes()
    }

    /// Set element width and grouping; returns the granted VL.
    pub fn configure(&mut self, sew: Sew, lmul: Lmul, requested: usize) -> usize {
        let vtype = VType::configure(self.vlen, sew, lmul, requested);
        log::debug!("vsetvli: requested {} -> {}", requested, vtype);
        self.vtype = Some(vtype);
        self.stats.configures += 1;
        vtype.vl
    }

    /// Active configuration.
    pub fn vtype(&self) -> Option<VType> {
        self.vtype
    }

    /// Granted VL of the active configuration.
    pub fn granted_vl(&self) -> Option<usize> {
        self.vtype.map(|vt| vt.vl)
    }

    /// Layout for `elements` words under the active configuration.
    pub fn layout(&self, elements: usize) -> Result<BlockLayout, VectorError> {
        let vtype = self.block_vtype()?;
        BlockLayout::for_elements(vtype.vl, self.lanes(), elements)
    }

    fn block_vtype(&self) -> Result<VType, VectorError> {
        let vtype = self.vtype.ok_or(VectorError::NotConfigured)?;
        if vtype.sew != Sew::E32 {
            return Err(VectorError::UnsupportedElementWidth(vtype.sew));
        }
        Ok(vtype)
    }

    fn check_layout(&self, layout: &BlockLayout) -> Result<(), VectorError> {
        let vtype = self.block_vtype()?;
        // Layout must come from the current configuration
        let expected = BlockLayout::for_elements(vtype.vl, self.lanes(), layout.elements)?;
        if expected != *layout {
            return Err(VectorError::StaleLayout);
        }
        Ok(())
    }

    /// Load `layout.elements` words from `base` into `v0..`.
    ///
    /// The memory range is checked before any register is written.
    pub fn load_block(&mut self, mem: &dyn ByteMemory, base: u64, layout: &BlockLayout) -> Result<(), VectorError> {
        self.check_layout(layout)?;
        mem.check_range(base, layout.byte_len())?;

        for slice in 0..layout.slices {
            let len = layout.slice_len(slice);
            let words = mem.read_words(base + (slice * layout.stride) as u64, len)?;
            let first = layout.slice_register(slice);
            for (chunk_index, chunk) in words.chunks(self.lanes()).enumerate() {
                let lanes: Vec<u32> = chunk.iter().map(|&w| w as u32).collect();
                self.regs.write((first + chunk_index) as u8, &lanes);
            }
            self.stats.slice_loads += 1;
        }
        log::trace!("vle32: {} slices from 0x{:08X}", layout.slices, base);
        Ok(())
    }

    /// Store `v0..` to `layout.elements` words at `dest`.
    ///
    /// The memory range is checked before anything is written.
    pub fn store_block(&mut self, mem: &mut dyn ByteMemory, dest: u64, layout: &BlockLayout) -> Result<(), VectorError> {
        self.check_layout(layout)?;
        mem.check_range(dest, layout.byte_len())?;

        let lanes = self.lanes();
        for slice in 0..layout.slices {
            let len = layout.slice_len(slice);
            let first = layout.slice_register(slice);
            let words: Vec<i32> = (0..len)
                .map(|i| self.regs.read_lane((first + i / lanes) as u8, i % lanes) as i32)
                .collect();
            mem.write_words(dest + (slice * layout.stride) as u64, &words)?;
            self.stats.slice_stores += 1;
        }
        log::trace!("vse32: {} slices to 0x{:08X}", layout.slices, dest);
        Ok(())
    }

    /// Register file.
    pub fn registers(&self) -> &VectorRegisterFile {
        &self.regs
    }

    /// Mutable register file, used by accelerator ports writing v0.
    pub fn registers_mut(&mut self) -> &mut VectorRegisterFile {
        &mut self.regs
    }

    /// Statistics.
    pub fn stats(&self) -> &VectorStats {
        &self.stats
    }
}
