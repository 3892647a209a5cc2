//! DIMC instruction descriptors.
//!
//! An [`InstructionDescriptor`] is the logical operation
//! `{selector, immediate, operand shape}`. It is built once per call site
//! (normally as a `const`) and turned into a machine word by
//! [`InstructionDescriptor::assemble`].
//!
//! # Operand shapes
//!
//! | Shape        | rd field | rs1 field | Result goes to |
//! |--------------|----------|-----------|----------------|
//! | In-place     | = rs1    | xN (N≠0)  | xN             |
//! | Distinct     | xM (M≠0) | xN (N≠0, N≠M) | xM         |
//! | Vector-dest  | x0       | xN (N≠0)  | v0             |
//!
//! A scalar DIMC result written to x0 would be discarded, so the encoding
//! reuses `rd = x0` to mark the vector-destination shape. This keeps
//! [`InstructionDescriptor::decode`] an exact inverse of `assemble`.

use std::fmt;

use super::{AccelAddress, DecodeError, EncodeError, Imm12};

/// Major opcode of every DIMC instruction (custom-3).
pub const DIMC_OPCODE: u8 = 0x6B;

const OPCODE_MASK: u32 = 0x7F;
const REG_MASK: u32 = 0x1F;
const FUNCT3_MASK: u32 = 0x7;
const RD_SHIFT: u32 = 7;
const FUNCT3_SHIFT: u32 = 12;
const RS1_SHIFT: u32 = 15;
const IMM_SHIFT: u32 = 20;

/// DIMC sub-operation family, encoded in funct3.
///
/// The names follow the sub-operation families the probes target. The
/// harness attaches no behaviour to them beyond the funct3 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Selector {
    /// Write a row of weight bank A.
    BankAWrite = 1,
    /// Write a row of weight bank B.
    BankBWrite = 2,
    /// Compute and read back.
    ComputeRead = 4,
    /// Compute and store into the array.
    ComputeStore = 5,
}

impl Selector {
    /// Every selector, in funct3 order.
    pub const ALL: [Selector; 4] = [
        Selector::BankAWrite,
        Selector::BankBWrite,
        Selector::ComputeRead,
        Selector::ComputeStore,
    ];

    /// funct3 value.
    #[inline]
    pub const fn funct3(self) -> u8 {
        self as u8
    }

    /// Look up a selector by funct3.
    pub const fn from_funct3(funct3: u8) -> Option<Self> {
        match funct3 {
            1 => Some(Selector::BankAWrite),
            2 => Some(Selector::BankBWrite),
            4 => Some(Selector::ComputeRead),
            5 => Some(Selector::ComputeStore),
            _ => None,
        }
    }

    /// Short name used in reports.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Selector::BankAWrite => "bank_a.wr",
            Selector::BankBWrite => "bank_b.wr",
            Selector::ComputeRead => "compute.rd",
            Selector::ComputeStore => "compute.st",
        }
    }
}

impl TryFrom<u8> for Selector {
    type Error = EncodeError;

    fn try_from(funct3: u8) -> Result<Self, Self::Error> {
        Self::from_funct3(funct3).ok_or(EncodeError::InvalidSelector(funct3))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.funct3())
    }
}

/// General purpose register x0-x31.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GpReg(u8);

impl GpReg {
    /// Hardwired zero register.
    pub const ZERO: GpReg = GpReg(0);

    /// Create a register reference; checked during const evaluation.
    ///
    /// # Panics
    ///
    /// Panics if `index` is 32 or more. In a `const` this is a build error;
    /// runtime indices go through `GpReg::try_from`.
    pub const fn new(index: u8) -> Self {
        assert!(index < 32, "general purpose registers are x0-x31");
        Self(index)
    }

    /// Register number.
    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// True for x0.
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u8> for GpReg {
    type Error = EncodeError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        if index >= 32 {
            return Err(EncodeError::InvalidRegister(index));
        }
        Ok(Self(index))
    }
}

impl fmt::Display for GpReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// How the instruction's operands are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandShape {
    /// One register is both source and destination.
    InPlace {
        /// Source and destination.
        reg: GpReg,
    },
    /// Separate source and destination registers.
    Distinct {
        /// Destination.
        rd: GpReg,
        /// Source, left unmodified.
        rs1: GpReg,
    },
    /// Result lands in vector register v0.
    VectorDest {
        /// Runtime scalar source.
        rs1: GpReg,
    },
}

impl OperandShape {
    /// Register placed in the rd field.
    pub const fn rd(&self) -> GpReg {
        match *self {
            OperandShape::InPlace { reg } => reg,
            OperandShape::Distinct { rd, .. } => rd,
            OperandShape::VectorDest { .. } => GpReg::ZERO,
        }
    }

    /// Register placed in the rs1 field.
    pub const fn rs1(&self) -> GpReg {
        match *self {
            OperandShape::InPlace { reg } => reg,
            OperandShape::Distinct { rs1, .. } => rs1,
            OperandShape::VectorDest { rs1 } => rs1,
        }
    }

    /// Short label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            OperandShape::InPlace { .. } => "in-place",
            OperandShape::Distinct { .. } => "distinct",
            OperandShape::VectorDest { .. } => "vector-dest",
        }
    }

    fn validate(&self) -> Result<(), EncodeError> {
        match *self {
            OperandShape::InPlace { reg } => {
                if reg.is_zero() {
                    return Err(EncodeError::ZeroRegister { role: "in-place" });
                }
            }
            OperandShape::Distinct { rd, rs1 } => {
                if rd.is_zero() {
                    return Err(EncodeError::ZeroRegister { role: "rd" });
                }
                if rs1.is_zero() {
                    return Err(EncodeError::ZeroRegister { role: "rs1" });
                }
                if rd == rs1 {
                    return Err(EncodeError::AliasedOperands(rd.index()));
                }
            }
            OperandShape::VectorDest { rs1 } => {
                if rs1.is_zero() {
                    return Err(EncodeError::ZeroRegister { role: "rs1" });
                }
            }
        }
        Ok(())
    }
}

/// A fully specified DIMC instruction.
///
/// The fields are private so every descriptor goes through a checked
/// constructor, which keeps `decode(assemble(d)) == d`. A struct literal
/// does not compile outside this module:
///
/// ```compile_fail
/// use dimc_probe::encoding::{GpReg, Imm12, InstructionDescriptor, OperandShape, Selector};
///
/// let aliased = InstructionDescriptor {
///     selector: Selector::ComputeRead,
///     immediate: Imm12::ZERO,
///     shape: OperandShape::Distinct { rd: GpReg::new(10), rs1: GpReg::new(10) },
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionDescriptor {
    selector: Selector,
    immediate: Imm12,
    shape: OperandShape,
}

impl InstructionDescriptor {
    /// Build a descriptor from runtime parts.
    pub fn new(selector: Selector, immediate: Imm12, shape: OperandShape) -> Result<Self, EncodeError> {
        shape.validate()?;
        Ok(Self { selector, immediate, shape })
    }

    /// Sub-operation family (funct3).
    #[inline]
    pub const fn selector(&self) -> Selector {
        self.selector
    }

    /// Address / configuration immediate.
    #[inline]
    pub const fn immediate(&self) -> Imm12 {
        self.immediate
    }

    /// Operand wiring.
    #[inline]
    pub const fn shape(&self) -> OperandShape {
        self.shape
    }

    /// In-place form: `reg <- dimc(reg)`.
    ///
    /// # Panics
    ///
    /// Panics if `reg` is x0. In a `const` this is a build error.
    pub const fn in_place(selector: Selector, reg: GpReg, immediate: Imm12) -> Self {
        assert!(!reg.is_zero(), "in-place DIMC operand cannot be x0");
        Self { selector, immediate, shape: OperandShape::InPlace { reg } }
    }

    /// Distinct form: `rd <- dimc(rs1)`.
    ///
    /// # Panics
    ///
    /// Panics if either register is x0 or `rd == rs1`. In a `const` this is
    /// a build error; use [`InstructionDescriptor::new`] for runtime parts.
    pub const fn distinct(selector: Selector, rd: GpReg, rs1: GpReg, immediate: Imm12) -> Self {
        assert!(!rd.is_zero() && !rs1.is_zero(), "distinct DIMC operands cannot be x0");
        assert!(rd.index() != rs1.index(), "distinct DIMC operands must differ");
        Self { selector, immediate, shape: OperandShape::Distinct { rd, rs1 } }
    }

    /// Vector-destination form: `v0 <- dimc(rs1)`.
    ///
    /// # Panics
    ///
    /// Panics if `rs1` is x0. In a `const` this is a build error.
    pub const fn vector_dest(selector: Selector, rs1: GpReg, immediate: Imm12) -> Self {
        assert!(!rs1.is_zero(), "vector-destination DIMC source cannot be x0");
        Self { selector, immediate, shape: OperandShape::VectorDest { rs1 } }
    }

    /// Encode into a 32-bit machine word.
    pub const fn assemble(&self) -> u32 {
        ((self.immediate.value() as u32) << IMM_SHIFT)
            | ((self.shape.rs1().index() as u32) << RS1_SHIFT)
            | ((self.selector.funct3() as u32) << FUNCT3_SHIFT)
            | ((self.shape.rd().index() as u32) << RD_SHIFT)
            | DIMC_OPCODE as u32
    }

    /// Decode a machine word.
    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        let opcode = (word & OPCODE_MASK) as u8;
        if opcode != DIMC_OPCODE {
            return Err(DecodeError::WrongOpcode { found: opcode, expected: DIMC_OPCODE });
        }

        let funct3 = ((word >> FUNCT3_SHIFT) & FUNCT3_MASK) as u8;
        let selector = Selector::from_funct3(funct3).ok_or(DecodeError::UnknownSelector(funct3))?;

        let rd = GpReg(((word >> RD_SHIFT) & REG_MASK) as u8);
        let rs1 = GpReg(((word >> RS1_SHIFT) & REG_MASK) as u8);
        if rs1.is_zero() {
            return Err(DecodeError::ZeroSource(word));
        }

        let immediate = AccelAddress::unpack((word >> IMM_SHIFT) as u16).immediate();

        let shape = if rd.is_zero() {
            OperandShape::VectorDest { rs1 }
        } else if rd == rs1 {
            OperandShape::InPlace { reg: rd }
        } else {
            OperandShape::Distinct { rd, rs1 }
        };

        Ok(Self { selector, immediate, shape })
    }

    /// Assembler-style rendering (`.insn i 0x6B, sel, rd, rs1, imm`).
    pub fn disassemble(&self) -> String {
        let rd = match self.shape {
            OperandShape::VectorDest { .. } => "v0".to_string(),
            _ => self.shape.rd().to_string(),
        };
        format!(
            ".insn i 0x{:02X}, {}, {}, {}, {}",
            DIMC_OPCODE,
            self.selector,
            rd,
            self.shape.rs1(),
            self.immediate
        )
    }
}

impl fmt::Display for InstructionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.disassemble())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dimc_imm, imm12};

    const X10: GpReg = GpReg::new(10);
    const X11: GpReg = GpReg::new(11);

    fn all_shapes() -> [OperandShape; 3] {
        [
            OperandShape::InPlace { reg: X10 },
            OperandShape::Distinct { rd: X11, rs1: X10 },
            OperandShape::VectorDest { rs1: X10 },
        ]
    }

    #[test]
    fn test_assemble_i_type_layout() {
        // .insn i 0x6B, 4, x10, x10, 0x25
        let insn = InstructionDescriptor::in_place(Selector::ComputeRead, X10, imm12!(0x25));
        assert_eq!(insn.assemble(), 0x0255_456B);

        // .insn i 0x6B, 4, x11, x10, 0x25
        let insn = InstructionDescriptor::distinct(Selector::ComputeRead, X11, X10, imm12!(0x25));
        assert_eq!(insn.assemble(), 0x0255_45EB);

        // vector destination leaves rd = x0
        let insn = InstructionDescriptor::vector_dest(Selector::BankAWrite, X10, dimc_imm!(15, 0, 0));
        assert_eq!(insn.assemble(), 0x7805_106B);
    }

    #[test]
    fn test_assemble_is_const() {
        const WORD: u32 =
            InstructionDescriptor::in_place(Selector::BankBWrite, X10, dimc_imm!(1, 0, 0)).assemble();
        assert_eq!(WORD & 0x7F, DIMC_OPCODE as u32);
        assert_eq!(WORD >> 20, 0x080);
    }

    #[test]
    fn test_decode_inverts_assemble() {
        for selector in Selector::ALL {
            for shape in all_shapes() {
                for bits in 0..=Imm12::MAX {
                    let immediate = Imm12::try_from(bits).unwrap();
                    let insn = InstructionDescriptor::new(selector, immediate, shape).unwrap();
                    assert_eq!(InstructionDescriptor::decode(insn.assemble()), Ok(insn));
                }
            }
        }
    }

    #[test]
    fn test_decode_rejects_foreign_words() {
        // addi x10, x10, 1
        assert_eq!(
            InstructionDescriptor::decode(0x0015_0513),
            Err(DecodeError::WrongOpcode { found: 0x13, expected: DIMC_OPCODE })
        );

        // funct3 = 3 is not a selector
        let word = (3 << FUNCT3_SHIFT) | (10 << RS1_SHIFT) | (10 << RD_SHIFT) | DIMC_OPCODE as u32;
        assert_eq!(InstructionDescriptor::decode(word), Err(DecodeError::UnknownSelector(3)));

        // rs1 = x0
        let word = (4 << FUNCT3_SHIFT) | (10 << RD_SHIFT) | DIMC_OPCODE as u32;
        assert_eq!(InstructionDescriptor::decode(word), Err(DecodeError::ZeroSource(word)));
    }

    #[test]
    fn test_runtime_constructor_validates_shape() {
        let imm = Imm12::ZERO;
        assert_eq!(
            InstructionDescriptor::new(
                Selector::BankAWrite,
                imm,
                OperandShape::Distinct { rd: X10, rs1: X10 }
            ),
            Err(EncodeError::AliasedOperands(10))
        );
        assert_eq!(
            InstructionDescriptor::new(
                Selector::BankAWrite,
                imm,
                OperandShape::InPlace { reg: GpReg::ZERO }
            ),
            Err(EncodeError::ZeroRegister { role: "in-place" })
        );
        assert!(InstructionDescriptor::new(
            Selector::ComputeStore,
            imm,
            OperandShape::VectorDest { rs1: X11 }
        )
        .is_ok());
    }

    #[test]
    fn test_aliased_distinct_cannot_be_built() {
        // The only runtime path to a descriptor refuses rd == rs1, which
        // would otherwise encode the same word as the in-place shape.
        let aliased = OperandShape::Distinct { rd: X10, rs1: X10 };
        assert_eq!(
            InstructionDescriptor::new(Selector::ComputeRead, Imm12::ZERO, aliased),
            Err(EncodeError::AliasedOperands(10))
        );

        let in_place = InstructionDescriptor::in_place(Selector::ComputeRead, X10, Imm12::ZERO);
        let back = InstructionDescriptor::decode(in_place.assemble()).unwrap();
        assert_eq!(back, in_place);
        assert_eq!(back.shape(), OperandShape::InPlace { reg: X10 });
        assert_eq!(back.selector(), Selector::ComputeRead);
        assert_eq!(back.immediate(), Imm12::ZERO);
    }

    #[test]
    fn test_decode_accepts_top_immediate() {
        // imm = 0xFFF, rs1 = x10, sel = 5, rd = x11
        let word = (0xFFF << IMM_SHIFT)
            | (10 << RS1_SHIFT)
            | (5 << FUNCT3_SHIFT)
            | (11 << RD_SHIFT)
            | DIMC_OPCODE as u32;
        let insn = InstructionDescriptor::decode(word).unwrap();
        assert_eq!(insn.immediate().value(), Imm12::MAX);
        assert_eq!(insn.shape(), OperandShape::Distinct { rd: X11, rs1: X10 });
        assert_eq!(insn.assemble(), word);
    }

    #[test]
    fn test_selector_funct3() {
        let values: Vec<u8> = Selector::ALL.iter().map(|s| s.funct3()).collect();
        assert_eq!(values, vec![1, 2, 4, 5]);
        assert_eq!(Selector::try_from(3), Err(EncodeError::InvalidSelector(3)));
        assert_eq!(Selector::try_from(5), Ok(Selector::ComputeStore));
    }

    #[test]
    fn test_register_bounds() {
        assert_eq!(GpReg::try_from(31).map(GpReg::index), Ok(31));
        assert_eq!(GpReg::try_from(32), Err(EncodeError::InvalidRegister(32)));
    }

    #[test]
    fn test_disassemble() {
        let insn = InstructionDescriptor::in_place(Selector::ComputeRead, X10, imm12!(0x25));
        assert_eq!(insn.disassemble(), ".insn i 0x6B, 4, x10, x10, 0x025");

        let insn = InstructionDescriptor::vector_dest(Selector::ComputeStore, X11, dimc_imm!(2, 0, 0));
        assert_eq!(insn.to_string(), ".insn i 0x6B, 5, v0, x11, 0x100");
    }
}
