//! Loopback reference port.
//!
//! Decodes every word it receives and echoes the source operand:
//!
//! | Shape | Effect |
//! |-------|--------|
//! | in-place | `x[rd] = x[rs1]` (register unchanged) |
//! | distinct | `x[rd] = x[rs1]` |
//! | vector-dest | v0 untouched |
//!
//! Leaving v0 alone keeps the load/store identity intact, so a run through
//! this port must reproduce the source buffer exactly.
//!
//! With a latency set, each op stays in flight for that many cycles and
//! fences stall accordingly.

use smallvec::SmallVec;

use super::{AccelError, AccelOutcome, AccelPort, IssueRequest, IssuedOp};
use crate::cluster::CoreId;
use crate::encoding::{InstructionDescriptor, OperandShape};

/// Reference accelerator port.
#[derive(Debug, Default)]
pub struct LoopbackAccel {
    latency: u64,
    /// `(core, completion cycle)` per op in flight.
    in_flight: SmallVec<[(CoreId, u64); 8]>,
    issued: Vec<IssuedOp>,
}

impl LoopbackAccel {
    /// Port that completes every op at issue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Port that keeps each op in flight for `cycles` cycles.
    pub fn with_latency(cycles: u64) -> Self {
        Self {
            latency: cycles,
            ..Self::default()
        }
    }

    /// Configured latency.
    pub fn latency(&self) -> u64 {
        self.latency
    }

    /// Ops still in flight for `core`.
    pub fn in_flight(&self, core: CoreId) -> usize {
        self.in_flight.iter().filter(|(c, _)| *c == core).count()
    }
}

impl AccelPort for LoopbackAccel {
    fn issue(&mut self, request: IssueRequest<'_>) -> Result<AccelOutcome, AccelError> {
        let descriptor = InstructionDescriptor::decode(request.word)?;

        log::debug!(
            "{} cycle {}: {} (x[rs1]={})",
            request.core,
            request.cycle,
            descriptor.disassemble(),
            request.rs1_value
        );

        if self.latency > 0 {
            self.in_flight.push((request.core, request.cycle + self.latency));
        }
        self.issued.push(IssuedOp {
            core: request.core,
            cycle: request.cycle,
            word: request.word,
            descriptor,
        });

        let rd_value = match descriptor.shape() {
            OperandShape::InPlace { .. } | OperandShape::Distinct { .. } => Some(request.rs1_value),
            OperandShape::VectorDest { .. } => None,
        };
        Ok(AccelOutcome { rd_value })
    }

    fn fence(&self, core: CoreId) -> bool {
        self.in_flight(core) == 0
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    fn tick(&mut self, cycle: u64) {
        self.in_flight.retain(|(_, done)| *done > cycle);
    }

    fn issued(&self) -> &[IssuedOp] {
        &self.issued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimc_imm;
    use crate::encoding::{GpReg, Selector};
    use crate::vector::VectorRegisterFile;

    fn request(vregs: &mut VectorRegisterFile, word: u32, rs1_value: i32, cycle: u64) -> IssueRequest<'_> {
        IssueRequest {
            core: CoreId::LEADER,
            cycle,
            word,
            rs1_value,
            vregs,
        }
    }

    #[test]
    fn test_scalar_shapes_echo_source() {
        let mut port = LoopbackAccel::new();
        let mut vregs = VectorRegisterFile::new(16);
        let d = InstructionDescriptor::distinct(
            Selector::ComputeRead,
            GpReg::new(11),
            GpReg::new(10),
            dimc_imm!(0, 9, 1),
        );

        let out = port.issue(request(&mut vregs, d.assemble(), 22, 0)).unwrap();
        assert_eq!(out.rd_value, Some(22));
        assert!(port.fence(CoreId::LEADER));
        assert_eq!(port.issued()[0].descriptor, d);
    }

    #[test]
    fn test_vector_dest_leaves_v0() {
        let mut port = LoopbackAccel::new();
        let mut vregs = VectorRegisterFile::new(4);
        vregs.write(0, &[1, 2, 3, 4]);
        let d = InstructionDescriptor::vector_dest(Selector::BankAWrite, GpReg::new(10), dimc_imm!(5, 0, 0));

        let out = port.issue(request(&mut vregs, d.assemble(), 7, 0)).unwrap();
        assert_eq!(out.rd_value, None);
        assert_eq!(vregs.read(0), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_latency_holds_fence() {
        let mut port = LoopbackAccel::with_latency(3);
        let mut vregs = VectorRegisterFile::new(4);
        let d = InstructionDescriptor::in_place(Selector::ComputeStore, GpReg::new(10), dimc_imm!(1, 0, 0));

        port.issue(request(&mut vregs, d.assemble(), 1, 10)).unwrap();
        assert!(!port.fence(CoreId::LEADER));
        assert!(port.fence(CoreId::new(1)));

        port.tick(12);
        assert!(!port.fence(CoreId::LEADER));
        port.tick(13);
        assert!(port.fence(CoreId::LEADER));
        assert!(port.is_idle());
    }

    #[test]
    fn test_rejects_foreign_opcode() {
        let mut port = LoopbackAccel::new();
        let mut vregs = VectorRegisterFile::new(4);
        // addi a0, a0, 1
        let err = port.issue(request(&mut vregs, 0x0015_0513, 0, 0)).unwrap_err();
        assert!(matches!(err, AccelError::Decode(_)));
        assert!(port.issued().is_empty());
    }
}
