//! Vector type configuration (`vsetvli` model).
//!
//! `VLMAX = VLEN · LMUL / SEW` elements fit in one register group. A
//! configure request is clamped to that:
//!
//! | VLEN | SEW | LMUL | VLMAX |
//! |------|-----|------|-------|
//! | 512  | 32  | 1    | 16    |
//! | 512  | 32  | 2    | 32    |
//! | 512  | 32  | 8    | 128   |

use std::fmt;

/// Selected element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sew {
    /// 8-bit elements.
    E8,
    /// 16-bit elements.
    E16,
    /// 32-bit elements.
    E32,
}

impl Sew {
    /// Element width in bits.
    pub const fn bits(self) -> usize {
        match self {
            Sew::E8 => 8,
            Sew::E16 => 16,
            Sew::E32 => 32,
        }
    }

    /// Element width in bytes.
    pub const fn bytes(self) -> usize {
        self.bits() / 8
    }
}

impl fmt::Display for Sew {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.bits())
    }
}

/// Register grouping factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lmul {
    M1,
    M2,
    M4,
    M8,
}

impl Lmul {
    /// Number of registers in one group.
    pub const fn factor(self) -> usize {
        match self {
            Lmul::M1 => 1,
            Lmul::M2 => 2,
            Lmul::M4 => 4,
            Lmul::M8 => 8,
        }
    }

    /// Parse a grouping factor (1, 2, 4 or 8).
    pub fn from_factor(factor: usize) -> Option<Self> {
        match factor {
            1 => Some(Lmul::M1),
            2 => Some(Lmul::M2),
            4 => Some(Lmul::M4),
            8 => Some(Lmul::M8),
            _ => None,
        }
    }
}

impl fmt::Display for Lmul {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.factor())
    }
}

/// Active vector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VType {
    /// Element width.
    pub sew: Sew,
    /// Grouping factor.
    pub lmul: Lmul,
    /// Granted vector length in elements.
    pub vl: usize,
}

impl VType {
    /// Apply a configure request against a `vlen_bits` wide register.
    pub fn configure(vlen_bits: usize, sew: Sew, lmul: Lmul, requested: usize) -> Self {
        Self {
            sew,
            lmul,
            vl: requested.min(vlmax(vlen_bits, sew, lmul)),
        }
    }
}

impl fmt::Display for VType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vl={}, {}, {}", self.vl, self.sew, self.lmul)
    }
}

/// Maximum vector length for a configuration.
pub const fn vlmax(vlen_bits: usize, sew: Sew, lmul: Lmul) -> usize {
    vlen_bits * lmul.factor() / sew.bits()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vlmax() {
        assert_eq!(vlmax(512, Sew::E32, Lmul::M1), 16);
        assert_eq!(vlmax(512, Sew::E32, Lmul::M2), 32);
        assert_eq!(vlmax(512, Sew::E32, Lmul::M8), 128);
        assert_eq!(vlmax(128, Sew::E8, Lmul::M4), 64);
    }

    #[test]
    fn test_configure_clamps() {
        let vt = VType::configure(512, Sew::E32, Lmul::M1, 100);
        assert_eq!(vt.vl, 16);
        let vt = VType::configure(512, Sew::E32, Lmul::M8, 8);
        assert_eq!(vt.vl, 8);
        assert_eq!(vt.to_string(), "vl=8, e32, m8");
    }

    #[test]
    fn test_lmul_from_factor() {
        assert_eq!(Lmul::from_factor(2), Some(Lmul::M2));
        assert_eq!(Lmul::from_factor(3), None);
    }
}
