//! Vector register file.
//!
//! 32 architectural registers (v0-v31), each `VLEN / 32` 32-bit lanes
//! wide. Lanes are stored as raw `u32`; the DIMC data path is signed so
//! callers convert at the edges.

use std::fmt;

/// Number of vector registers.
pub const NUM_VECTOR_REGS: usize = 32;

/// Vector register file with a runtime lane count.
#[derive(Clone)]
pub struct VectorRegisterFile {
    lanes: usize,
    /// Register-major: `regs[reg * lanes + lane]`.
    regs: Vec<u32>,
}

impl VectorRegisterFile {
    /// Create a zeroed register file with `lanes` 32-bit lanes per register.
    pub fn new(lanes: usize) -> Self {
        Self {
            lanes,
            regs: vec![0; lanes * NUM_VECTOR_REGS],
        }
    }

    /// Lanes per register.
    pub fn lanes(&self) -> usize {
        self.lanes
    }

    /// Read a whole register.
    #[inline]
    pub fn read(&self, reg: u8) -> &[u32] {
        let start = (reg & 0x1F) as usize * self.lanes;
        &self.regs[start..start + self.lanes]
    }

    /// Overwrite the leading lanes of a register. Remaining lanes are
    /// undisturbed.
    #[inline]
    pub fn write(&mut self, reg: u8, values: &[u32]) {
        let start = (reg & 0x1F) as usize * self.lanes;
        let n = values.len().min(self.lanes);
        self.regs[start..start + n].copy_from_slice(&values[..n]);
    }

    /// Read a single lane.
    #[inline]
    pub fn read_lane(&self, reg: u8, lane: usize) -> u32 {
        self.regs[(reg & 0x1F) as usize * self.lanes + lane % self.lanes]
    }

    /// Write a single lane.
    #[inline]
    pub fn write_lane(&mut self, reg: u8, lane: usize, value: u32) {
        self.regs[(reg & 0x1F) as usize * self.lanes + lane % self.lanes] = value;
    }
}

impl fmt::Debug for VectorRegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let non_zero: Vec<_> = self
            .regs
            .chunks(self.lanes.max(1))
            .enumerate()
            .filter(|(_, v)| v.iter().any(|x| *x != 0))
            .collect();

        if non_zero.is_empty() {
            write!(f, "VectorRegisterFile {{ all zero }}")
        } else {
            writeln!(f, "VectorRegisterFile {{")?;
            for (reg, val) in non_zero {
                write!(f, "  v{}: [", reg)?;
                for (i, lane) in val.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "0x{:08X}", lane)?;
                }
                writeln!(f, "]")?;
            }
            write!(f, "}}")
        }
    }
}
