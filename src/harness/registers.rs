//! Per-core scalar register file.
//!
//! 32 × 32-bit general purpose registers (x0-x31). x0 reads as zero and
//! ignores writes.

use std::fmt;

use crate::encoding::GpReg;

/// Number of scalar general purpose registers.
pub const NUM_SCALAR_REGS: usize = 32;

/// Scalar general purpose register file.
#[derive(Clone)]
pub struct ScalarRegisterFile {
    regs: [u32; NUM_SCALAR_REGS],
}

impl Default for ScalarRegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalarRegisterFile {
    /// Create a new zeroed register file.
    pub const fn new() -> Self {
        Self {
            regs: [0; NUM_SCALAR_REGS],
        }
    }

    /// Read a register.
    #[inline]
    pub fn read(&self, reg: GpReg) -> u32 {
        self.regs[(reg.index() & 0x1F) as usize]
    }

    /// Write a register. Writes to x0 are dropped.
    #[inline]
    pub fn write(&mut self, reg: GpReg, value: u32) {
        if !reg.is_zero() {
            self.regs[(reg.index() & 0x1F) as usize] = value;
        }
    }

    /// Read as a signed word.
    #[inline]
    pub fn read_i32(&self, reg: GpReg) -> i32 {
        self.read(reg) as i32
    }

    /// Write a signed word.
    #[inline]
    pub fn write_i32(&mut self, reg: GpReg, value: i32) {
        self.write(reg, value as u32);
    }
}

impl fmt::Debug for ScalarRegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only show non-zero registers
        let non_zero: Vec<_> = self
            .regs
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .collect();

        if non_zero.is_empty() {
            write!(f, "ScalarRegisterFile {{ all zero }}")
        } else {
            write!(f, "ScalarRegisterFile {{ ")?;
            for (i, (reg, val)) in non_zero.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "x{}: 0x{:08X}", reg, val)?;
            }
            write!(f, " }}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_read_write() {
        let mut regs = ScalarRegisterFile::new();
        regs.write_i32(GpReg::new(10), -22);
        assert_eq!(regs.read_i32(GpReg::new(10)), -22);
        assert_eq!(regs.read(GpReg::new(10)), 0xFFFF_FFEA);
    }

    #[test]
    fn test_x0_hardwired() {
        let mut regs = ScalarRegisterFile::new();
        regs.write(GpReg::ZERO, 5);
        assert_eq!(regs.read(GpReg::ZERO), 0);
    }

    #[test]
    fn test_scalar_debug_format() {
        let mut regs = ScalarRegisterFile::new();
        assert_eq!(format!("{:?}", regs), "ScalarRegisterFile { all zero }");
        regs.write(GpReg::new(11), 0x16);
        assert_eq!(format!("{:?}", regs), "ScalarRegisterFile { x11: 0x00000016 }");
    }
}
