//! Run report and verification.
//!
//! The console form keeps the lines a person compares by eye:
//!
//! ```text
//! DIMC test: IMM=0x025 (val=22) -> single=22, distinct=22
//!   single      .insn i 0x6B, 4, x10, x10, 0x025  [compute.rd in-place]  x10=22 -> x10=22
//!   ...
//! Filter after DIMC and store:
//! [0] original=42  copy=42
//! ...
//! Configured VL = 8
//! ```
//!
//! [`Report::verify`] turns that comparison into a check.

use std::fmt;

use thiserror::Error;

use crate::cluster::CoreId;
use crate::encoding::{GpReg, InstructionDescriptor, OperandShape};

/// Verification failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Copy and original differ in length.
    #[error("copy has {copy} elements, original has {original}")]
    LengthMismatch {
        /// Elements in A.
        original: usize,
        /// Elements in B.
        copy: usize,
    },

    /// Mirror A does not hold the source pattern.
    #[error("mirror A[{index}] = {found}, source has {expected}")]
    SourceCorrupted {
        /// Element index.
        index: usize,
        /// Source value.
        expected: i32,
        /// Value in A.
        found: i32,
    },

    /// Mirror B differs from A after the store.
    #[error("copy[{index}] = {copy}, original = {original}")]
    CopyMismatch {
        /// Element index.
        index: usize,
        /// Value in A.
        original: i32,
        /// Value in B.
        copy: i32,
    },

    /// Not every op in the case was issued.
    #[error("{issued} of {expected} DIMC ops issued")]
    MissingOps {
        /// Ops in the case.
        expected: usize,
        /// Ops recorded.
        issued: usize,
    },
}

/// Where an op's result landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpResult {
    /// Scalar destination and its value after issue.
    Scalar {
        /// Destination register.
        reg: GpReg,
        /// Value read back.
        value: i32,
    },
    /// v0 destination; lane 0 after issue.
    Vector {
        /// `v0[0]` read back.
        lane0: i32,
    },
}

impl fmt::Display for OpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpResult::Scalar { reg, value } => write!(f, "{}={}", reg, value),
            OpResult::Vector { lane0 } => write!(f, "v0[0]={}", lane0),
        }
    }
}

/// One issued op as seen by the issuing core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRecord {
    /// Issuing core.
    pub core: CoreId,
    /// Cycle of issue.
    pub cycle: u64,
    /// Variant label.
    pub name: &'static str,
    /// Descriptor issued.
    pub descriptor: InstructionDescriptor,
    /// Value in `x[rs1]` at issue.
    pub input: i32,
    /// Result read back.
    pub result: OpResult,
}

impl fmt::Display for OpRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  {:<12} {}  [{} {}]  {}={} -> {}",
            self.name,
            self.descriptor.disassemble(),
            self.descriptor.selector().mnemonic(),
            self.descriptor.shape().label(),
            self.descriptor.shape().rs1(),
            self.input,
            self.result
        )
    }
}

/// What the leader observed at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Case name.
    pub case: String,
    /// Canonical source pattern.
    pub source: Vec<i32>,
    /// Mirror A after the run.
    pub original: Vec<i32>,
    /// Mirror B after the run.
    pub copy: Vec<i32>,
    /// Granted vector length.
    pub vl: usize,
    /// Leader's op records.
    pub ops: Vec<OpRecord>,
    /// Ops the case defines.
    pub expected_ops: usize,
}

impl Report {
    /// Check the run against its expected outcome.
    ///
    /// A must still hold the source, B must equal A element for element,
    /// and every op in the case must have been issued.
    pub fn verify(&self) -> Result<(), VerifyError> {
        if self.ops.len() != self.expected_ops {
            return Err(VerifyError::MissingOps {
                expected: self.expected_ops,
                issued: self.ops.len(),
            });
        }
        if self.copy.len() != self.original.len() {
            return Err(VerifyError::LengthMismatch {
                original: self.original.len(),
                copy: self.copy.len(),
            });
        }
        if let Some((index, (&expected, &found))) = self
            .source
            .iter()
            .zip(self.original.iter())
            .enumerate()
            .find(|(_, (s, a))| s != a)
        {
            return Err(VerifyError::SourceCorrupted { index, expected, found });
        }
        if let Some((index, (&original, &copy))) = self
            .original
            .iter()
            .zip(self.copy.iter())
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(VerifyError::CopyMismatch { index, original, copy });
        }
        Ok(())
    }

    /// The in-place / distinct probe pair, if the case has one.
    ///
    /// Returns `(immediate, input, single, distinct)`.
    pub fn probe(&self) -> Option<(u16, i32, i32, i32)> {
        let single = self
            .ops
            .iter()
            .find(|op| matches!(op.descriptor.shape(), OperandShape::InPlace { .. }))?;
        let distinct = self.ops.iter().find(|op| {
            matches!(op.descriptor.shape(), OperandShape::Distinct { .. })
                && op.descriptor.immediate() == single.descriptor.immediate()
                && op.input == single.input
        })?;

        match (single.result, distinct.result) {
            (OpResult::Scalar { value: s, .. }, OpResult::Scalar { value: d, .. }) => {
                Some((single.descriptor.immediate().value(), single.input, s, d))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((imm, val, single, distinct)) = self.probe() {
            writeln!(
                f,
                "DIMC test: IMM=0x{:03X} (val={}) -> single={}, distinct={}",
                imm, val, single, distinct
            )?;
        }
        for op in &self.ops {
            writeln!(f, "{}", op)?;
        }
        writeln!(f, "Filter after DIMC and store:")?;
        for (i, (a, b)) in self.original.iter().zip(self.copy.iter()).enumerate() {
            writeln!(f, "[{}] original={}  copy={}", i, a, b)?;
        }
        write!(f, "Configured VL = {}", self.vl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Selector;
    use crate::imm12;

    fn record(name: &'static str, descriptor: InstructionDescriptor, result: OpResult) -> OpRecord {
        OpRecord {
            core: CoreId::LEADER,
            cycle: 0,
            name,
            descriptor,
            input: 22,
            result,
        }
    }

    fn probe_report() -> Report {
        let x10 = GpReg::new(10);
        let x11 = GpReg::new(11);
        Report {
            case: "small".into(),
            source: vec![42, 43],
            original: vec![42, 43],
            copy: vec![42, 43],
            vl: 8,
            ops: vec![
                record(
                    "single",
                    InstructionDescriptor::in_place(Selector::ComputeRead, x10, imm12!(0x025)),
                    OpResult::Scalar { reg: x10, value: 22 },
                ),
                record(
                    "distinct",
                    InstructionDescriptor::distinct(Selector::ComputeRead, x11, x10, imm12!(0x025)),
                    OpResult::Scalar { reg: x11, value: 23 },
                ),
            ],
            expected_ops: 2,
        }
    }

    #[test]
    fn test_console_lines() {
        let text = probe_report().to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "DIMC test: IMM=0x025 (val=22) -> single=22, distinct=23");
        assert!(lines[1].contains(".insn i 0x6B, 4, x10, x10, 0x025"));
        assert!(lines[1].contains("[compute.rd in-place]"));
        assert!(lines[2].contains("[compute.rd distinct]"));
        assert!(lines[2].ends_with("x10=22 -> x11=23"));
        assert_eq!(lines[3], "Filter after DIMC and store:");
        assert_eq!(lines[4], "[0] original=42  copy=42");
        assert_eq!(lines[6], "Configured VL = 8");
    }

    #[test]
    fn test_no_probe_line_without_pair() {
        let mut report = probe_report();
        report.ops.truncate(1);
        assert!(report.probe().is_none());
        assert!(report.to_string().starts_with("  single"));
    }

    #[test]
    fn test_verify_passes() {
        assert_eq!(probe_report().verify(), Ok(()));
    }

    #[test]
    fn test_verify_copy_mismatch() {
        let mut report = probe_report();
        report.copy[1] = -1;
        assert_eq!(
            report.verify(),
            Err(VerifyError::CopyMismatch {
                index: 1,
                original: 43,
                copy: -1,
            })
        );
    }

    #[test]
    fn test_verify_source_corrupted() {
        let mut report = probe_report();
        report.original[0] = 0;
        report.copy[0] = 0;
        assert!(matches!(report.verify(), Err(VerifyError::SourceCorrupted { index: 0, .. })));
    }

    #[test]
    fn test_verify_missing_ops() {
        let mut report = probe_report();
        report.expected_ops = 3;
        assert_eq!(
            report.verify(),
            Err(VerifyError::MissingOps { expected: 3, issued: 2 })
        );
    }
}
