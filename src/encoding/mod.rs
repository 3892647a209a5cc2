//! DIMC instruction encoding.
//!
//! A DIMC operation is an I-type custom instruction (opcode `0x6B`):
//!
//! ```text
//!  31        20 19   15 14  12 11    7 6      0
//! ┌────────────┬───────┬──────┬───────┬────────┐
//! │  imm[11:0] │  rs1  │ sel  │  rd   │ 110_1011│
//! └────────────┴───────┴──────┴───────┴────────┘
//! ```
//!
//! - **sel** (funct3) picks the sub-operation family, one of 1, 2, 4, 5.
//! - **imm** carries the accelerator address, see [`AccelAddress`].
//! - **rd/rs1** select the operand shape, see [`OperandShape`].
//!
//! Encoding is pure: [`InstructionDescriptor::assemble`] produces the
//! machine word and [`InstructionDescriptor::decode`] inverts it. Nothing in
//! this module touches the cluster.

pub mod immediate;
pub mod instruction;

pub use immediate::{AccelAddress, Imm12};
pub use instruction::{GpReg, InstructionDescriptor, OperandShape, Selector, DIMC_OPCODE};

use thiserror::Error;

/// Errors raised while building a descriptor from runtime values.
///
/// Descriptors built through the const constructors never produce these:
/// the same checks run during const evaluation and fail the build instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Immediate wider than 12 bits.
    #[error("immediate 0x{0:X} does not fit in 12 bits")]
    ImmediateOutOfRange(u16),

    /// An address field exceeds its bit width.
    #[error("{field} value {value} exceeds maximum {max}")]
    AddressFieldOutOfRange {
        /// Field name (`row_group`, `row`, `section`).
        field: &'static str,
        /// Offending value.
        value: u8,
        /// Largest encodable value.
        max: u8,
    },

    /// funct3 value outside {1, 2, 4, 5}.
    #[error("selector {0} is not a DIMC sub-operation (expected 1, 2, 4 or 5)")]
    InvalidSelector(u8),

    /// Register index outside x0-x31.
    #[error("register x{0} does not exist")]
    InvalidRegister(u8),

    /// x0 used where the shape needs a real register.
    #[error("x0 cannot be the {role} operand of a DIMC instruction")]
    ZeroRegister {
        /// Which operand was x0.
        role: &'static str,
    },

    /// Distinct shape with rd == rs1.
    #[error("distinct operand shape needs rd != rs1 (both are x{0})")]
    AliasedOperands(u8),
}

/// Errors raised while decoding a machine word.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Low seven bits are not the DIMC opcode.
    #[error("opcode 0x{found:02X} is not the DIMC opcode 0x{expected:02X}")]
    WrongOpcode {
        /// Opcode found in the word.
        found: u8,
        /// The DIMC opcode.
        expected: u8,
    },

    /// funct3 is not one of the DIMC selectors.
    #[error("funct3 {0} is not a DIMC selector")]
    UnknownSelector(u8),

    /// rs1 field is x0, which no operand shape allows.
    #[error("rs1 is x0 in DIMC word 0x{0:08X}")]
    ZeroSource(u32),
}
