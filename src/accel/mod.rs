//! Accelerator issue port.
//!
//! The harness does not implement the DIMC accelerator. It hands each
//! assembled instruction word to an [`AccelPort`] together with the
//! runtime operand values, exactly as a core would on the custom-3
//! interface:
//!
//! ```text
//!  sequencer                     AccelPort
//!  ─────────                     ─────────
//!  x[rs1] ──► IssueRequest ────► issue()  ──► AccelOutcome { rd }
//!  word       (vregs: &mut)                   (v0 written in place)
//!
//!  fence()  ◄── true once no op from this core is in flight
//!  tick()   ◄── once per cycle from the engine
//! ```
//!
//! A port that executes asynchronously must report `false` from
//! [`AccelPort::fence`] until its outstanding work for the core has
//! drained. The sequencer stalls on that before reading the register file
//! back.

pub mod loopback;

pub use loopback::LoopbackAccel;

use thiserror::Error;

use crate::cluster::CoreId;
use crate::encoding::{DecodeError, InstructionDescriptor};
use crate::vector::VectorRegisterFile;

/// Errors raised by an accelerator port.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccelError {
    /// The word is not a valid DIMC instruction.
    #[error("malformed DIMC word: {0}")]
    Decode(#[from] DecodeError),

    /// The port refused the operation.
    #[error("{core} op 0x{word:08X} rejected: {reason}")]
    Rejected {
        /// Issuing core.
        core: CoreId,
        /// Instruction word.
        word: u32,
        /// Port-specific reason.
        reason: String,
    },
}

/// One instruction handed to the port.
pub struct IssueRequest<'a> {
    /// Issuing core.
    pub core: CoreId,
    /// Cycle of issue.
    pub cycle: u64,
    /// Assembled instruction word.
    pub word: u32,
    /// Value of `x[rs1]` at issue.
    pub rs1_value: i32,
    /// Issuing core's vector registers, for the v0 destination.
    pub vregs: &'a mut VectorRegisterFile,
}

/// What the port returns for an issued op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccelOutcome {
    /// Value to write back to `x[rd]`, for scalar destinations.
    pub rd_value: Option<i32>,
}

/// Record of an issued op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedOp {
    /// Issuing core.
    pub core: CoreId,
    /// Cycle of issue.
    pub cycle: u64,
    /// Instruction word.
    pub word: u32,
    /// Decoded form.
    pub descriptor: InstructionDescriptor,
}

/// Trait for the custom-instruction interface.
///
/// Implementations can be a loopback reference model, a fault injector for
/// tests, or a bridge to a real accelerator model.
pub trait AccelPort {
    /// Issue one instruction.
    fn issue(&mut self, request: IssueRequest<'_>) -> Result<AccelOutcome, AccelError>;

    /// True once no op issued by `core` is still in flight.
    fn fence(&self, core: CoreId) -> bool;

    /// True when no op from any core is in flight.
    fn is_idle(&self) -> bool;

    /// Advance the port's clock.
    fn tick(&mut self, cycle: u64);

    /// Every op accepted so far, in issue order.
    fn issued(&self) -> &[IssuedOp];
}
