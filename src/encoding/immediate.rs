//! 12-bit DIMC immediates and the accelerator address packing.
//!
//! The immediate of every DIMC instruction is an accelerator address:
//!
//! | Bits  | Field       | Width | Notes                                   |
//! |-------|-------------|-------|-----------------------------------------|
//! | 11:7  | `row_group` | 5     | steps of 0x080; grows with buffer size  |
//! | 6:2   | `row`       | 5     | row inside the group                    |
//! | 1:0   | `section`   | 2     | section / flag bits                     |
//!
//! Probes seen in practice:
//!
//! | Immediate | row_group | row | section |
//! |-----------|-----------|-----|---------|
//! | 0x025     | 0         | 9   | 1       |
//! | 0x080     | 1         | 0   | 0       |
//! | 0x180     | 3         | 0   | 0       |
//! | 0x280     | 5         | 0   | 0       |
//! | 0x780     | 15        | 0   | 0       |
//!
//! # Build-time immediates
//!
//! The instruction format takes the immediate as a literal, so the harness
//! only ever issues immediates fixed at build time. [`imm12!`] and
//! [`dimc_imm!`] expand to a `const` item. An out-of-range value, or one
//! that is not a constant, is rejected by the compiler:
//!
//! ```compile_fail
//! let imm = dimc_probe::imm12!(0x1000);
//! ```
//!
//! ```compile_fail
//! let group = 3u8;
//! let imm = dimc_probe::dimc_imm!(group, 0, 0);
//! ```
//!
//! ```
//! let imm = dimc_probe::dimc_imm!(5, 0, 0);
//! assert_eq!(imm.value(), 0x280);
//! ```

use std::fmt;

use super::EncodeError;

const ROW_GROUP_SHIFT: u16 = 7;
const ROW_SHIFT: u16 = 2;
const ROW_GROUP_MASK: u16 = 0x1F;
const ROW_MASK: u16 = 0x1F;
const SECTION_MASK: u16 = 0x3;

/// A 12-bit immediate operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Imm12(u16);

impl Imm12 {
    /// Width of the immediate field.
    pub const BITS: u32 = 12;

    /// Largest encodable immediate.
    pub const MAX: u16 = (1 << Self::BITS) - 1;

    /// The all-zero immediate (row group 0, row 0, section 0).
    pub const ZERO: Imm12 = Imm12(0);

    /// Create an immediate from a literal.
    ///
    /// Prefer [`imm12!`](crate::imm12) at call sites, which forces const
    /// evaluation. Runtime values go through `Imm12::try_from`.
    ///
    /// # Panics
    ///
    /// Panics when `value` needs more than 12 bits. Inside a `const` the
    /// panic is a build error.
    pub const fn new(value: u16) -> Self {
        assert!(value <= Self::MAX, "DIMC immediate does not fit in 12 bits");
        Self(value)
    }

    /// Pack an accelerator address.
    pub const fn from_address(address: AccelAddress) -> Self {
        Self(address.pack())
    }

    /// Raw 12-bit value.
    #[inline]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Split the immediate back into its address fields.
    #[inline]
    pub const fn address(self) -> AccelAddress {
        AccelAddress::unpack(self.0)
    }
}

impl TryFrom<u16> for Imm12 {
    type Error = EncodeError;

    /// Runtime conversion, used when decoding machine words.
    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value > Self::MAX {
            return Err(EncodeError::ImmediateOutOfRange(value));
        }
        Ok(Self(value))
    }
}

impl From<Imm12> for u32 {
    fn from(imm: Imm12) -> u32 {
        imm.0 as u32
    }
}

impl fmt::Display for Imm12 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:03X}", self.0)
    }
}

/// Logical accelerator address carried in the immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccelAddress {
    row_group: u8,
    row: u8,
    section: u8,
}

impl AccelAddress {
    /// Largest row group (5 bits).
    pub const MAX_ROW_GROUP: u8 = ROW_GROUP_MASK as u8;
    /// Largest row within a group (5 bits).
    pub const MAX_ROW: u8 = ROW_MASK as u8;
    /// Largest section (2 bits).
    pub const MAX_SECTION: u8 = SECTION_MASK as u8;

    /// Create an address, checking every field during const evaluation.
    ///
    /// Use [`dimc_imm!`](crate::dimc_imm) at call sites and
    /// [`AccelAddress::try_new`] for runtime fields.
    ///
    /// # Panics
    ///
    /// Panics when a field exceeds its bit width. Inside a `const` the panic
    /// is a build error.
    pub const fn new(row_group: u8, row: u8, section: u8) -> Self {
        assert!(row_group <= Self::MAX_ROW_GROUP, "DIMC row group exceeds 5 bits");
        assert!(row <= Self::MAX_ROW, "DIMC row exceeds 5 bits");
        assert!(section <= Self::MAX_SECTION, "DIMC section exceeds 2 bits");
        Self { row_group, row, section }
    }

    /// Create an address from runtime values.
    pub fn try_new(row_group: u8, row: u8, section: u8) -> Result<Self, EncodeError> {
        check_field("row_group", row_group, Self::MAX_ROW_GROUP)?;
        check_field("row", row, Self::MAX_ROW)?;
        check_field("section", section, Self::MAX_SECTION)?;
        Ok(Self { row_group, row, section })
    }

    /// Row group (bits 11:7).
    pub const fn row_group(self) -> u8 {
        self.row_group
    }

    /// Row within the group (bits 6:2).
    pub const fn row(self) -> u8 {
        self.row
    }

    /// Section / flag bits (bits 1:0).
    pub const fn section(self) -> u8 {
        self.section
    }

    /// Pack into the low 12 bits.
    pub const fn pack(self) -> u16 {
        ((self.row_group as u16 & ROW_GROUP_MASK) << ROW_GROUP_SHIFT)
            | ((self.row as u16 & ROW_MASK) << ROW_SHIFT)
            | (self.section as u16 & SECTION_MASK)
    }

    /// Unpack the low 12 bits. Higher bits are ignored.
    pub const fn unpack(bits: u16) -> Self {
        Self {
            row_group: ((bits >> ROW_GROUP_SHIFT) & ROW_GROUP_MASK) as u8,
            row: ((bits >> ROW_SHIFT) & ROW_MASK) as u8,
            section: (bits & SECTION_MASK) as u8,
        }
    }

    /// The immediate for this address.
    pub const fn immediate(self) -> Imm12 {
        Imm12::from_address(self)
    }
}

impl fmt::Display for AccelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}.r{}.s{}", self.row_group, self.row, self.section)
    }
}

fn check_field(field: &'static str, value: u8, max: u8) -> Result<(), EncodeError> {
    if value > max {
        return Err(EncodeError::AddressFieldOutOfRange { field, value, max });
    }
    Ok(())
}

/// Build an [`Imm12`] from a literal at compile time.
#[macro_export]
macro_rules! imm12 {
    ($value:expr) => {{
        const IMM: $crate::encoding::Imm12 = $crate::encoding::Imm12::new($value);
        IMM
    }};
}

/// Build an [`Imm12`] from `(row_group, row, section)` at compile time.
#[macro_export]
macro_rules! dimc_imm {
    ($row_group:expr, $row:expr, $section:expr) => {{
        const IMM: $crate::encoding::Imm12 = $crate::encoding::AccelAddress::new(
            $row_group, $row, $section,
        )
        .immediate();
        IMM
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demonstrated_immediates() {
        assert_eq!(dimc_imm!(0, 0, 0).value(), 0x000);
        assert_eq!(dimc_imm!(1, 0, 0).value(), 0x080);
        assert_eq!(dimc_imm!(2, 0, 0).value(), 0x100);
        assert_eq!(dimc_imm!(3, 0, 0).value(), 0x180);
        assert_eq!(dimc_imm!(5, 0, 0).value(), 0x280);
        assert_eq!(dimc_imm!(10, 0, 0).value(), 0x500);
        assert_eq!(dimc_imm!(15, 0, 0).value(), 0x780);
    }

    #[test]
    fn test_row_and_section_packing() {
        // k_row=5, sec=2 => (5 << 2) | 2
        assert_eq!(dimc_imm!(0, 5, 2).value(), 0x16);
        assert_eq!(dimc_imm!(0, 9, 1).value(), 0x25);

        let addr = imm12!(0x25).address();
        assert_eq!(addr.row_group(), 0);
        assert_eq!(addr.row(), 9);
        assert_eq!(addr.section(), 1);
    }

    #[test]
    fn test_address_unpack_inverts_pack() {
        for bits in 0..=Imm12::MAX {
            let addr = AccelAddress::unpack(bits);
            assert_eq!(addr.pack(), bits);
        }
    }

    #[test]
    fn test_runtime_immediate_range() {
        assert_eq!(Imm12::try_from(0xFFF), Ok(imm12!(0xFFF)));
        assert_eq!(
            Imm12::try_from(0x1000),
            Err(EncodeError::ImmediateOutOfRange(0x1000))
        );
    }

    #[test]
    fn test_runtime_address_fields_checked() {
        assert!(AccelAddress::try_new(31, 31, 3).is_ok());
        assert_eq!(
            AccelAddress::try_new(32, 0, 0),
            Err(EncodeError::AddressFieldOutOfRange { field: "row_group", value: 32, max: 31 })
        );
        assert_eq!(
            AccelAddress::try_new(0, 0, 4),
            Err(EncodeError::AddressFieldOutOfRange { field: "section", value: 4, max: 3 })
        );
    }

    #[test]
    #[should_panic(expected = "does not fit in 12 bits")]
    fn test_const_constructor_rejects_wide_value_at_runtime() {
        let wide = std::hint::black_box(0x1000u16);
        let _ = Imm12::new(wide);
    }

    #[test]
    fn test_display() {
        assert_eq!(imm12!(0x25).to_string(), "0x025");
        assert_eq!(AccelAddress::new(5, 1, 2).to_string(), "g5.r1.s2");
    }
}
