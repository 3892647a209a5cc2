//! Test cases and the per-run context.
//!
//! A [`TestCase`] is pure data: the source pattern, the vector
//! configuration to request and the table of DIMC ops to issue between
//! load and store. [`TestContext`] owns every shared resource a run
//! touches. Cores borrow it one step at a time, so there is no global state.
//!
//! # Built-in cases
//!
//! | Case | Source | LMUL | Request | Ops |
//! |------|--------|------|---------|-----|
//! | `small` | `[42..=49]` | m8 | 8 | `0x025` probes, row groups 0-3 |
//! | `large` | 16 × `0..31` | m2 | 16 | row groups 0, 5, 10, 15 |
//! | `identity` | `[42..=49]` | m8 | 8 | none |

use crate::cluster::ClusterCoordinator;
use crate::dma::TransferEngine;
use crate::encoding::{GpReg, InstructionDescriptor, Selector};
use crate::memory::{BackingMemory, HostAddr, ScratchPtr, Scratchpad};
use crate::vector::Lmul;
use crate::{dimc_imm, imm12};

use super::{HarnessConfig, HarnessError};

/// Source register for every op.
const A0: GpReg = GpReg::new(10);
/// Destination register for distinct ops.
const A1: GpReg = GpReg::new(11);

/// Scalar input used by the original `0x025` probe.
pub const PROBE_VALUE: i32 = 22;

/// One DIMC op issued between load and store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpVariant {
    /// Label used in the report.
    pub name: &'static str,
    /// Encoded form.
    pub descriptor: InstructionDescriptor,
    /// Value written to `x[rs1]` before issue.
    pub input: i32,
}

impl OpVariant {
    /// Create a variant.
    pub const fn new(name: &'static str, descriptor: InstructionDescriptor, input: i32) -> Self {
        Self {
            name,
            descriptor,
            input,
        }
    }
}

/// The `0x025` probe pair: same op, in-place then distinct.
const PROBES: [OpVariant; 2] = [
    OpVariant::new(
        "single",
        InstructionDescriptor::in_place(Selector::ComputeRead, A0, imm12!(0x025)),
        PROBE_VALUE,
    ),
    OpVariant::new(
        "distinct",
        InstructionDescriptor::distinct(Selector::ComputeRead, A1, A0, imm12!(0x025)),
        PROBE_VALUE,
    ),
];

/// Vector-destination ops over row groups 0-3.
const SMALL_ROWS: [OpVariant; 4] = [
    OpVariant::new(
        "bank_a.g0",
        InstructionDescriptor::vector_dest(Selector::BankAWrite, A0, dimc_imm!(0, 0, 0)),
        PROBE_VALUE,
    ),
    OpVariant::new(
        "bank_b.g1",
        InstructionDescriptor::vector_dest(Selector::BankBWrite, A0, dimc_imm!(1, 0, 0)),
        PROBE_VALUE,
    ),
    OpVariant::new(
        "compute.g2",
        InstructionDescriptor::vector_dest(Selector::ComputeRead, A0, dimc_imm!(2, 0, 0)),
        PROBE_VALUE,
    ),
    OpVariant::new(
        "store.g3",
        InstructionDescriptor::vector_dest(Selector::ComputeStore, A0, dimc_imm!(3, 0, 0)),
        PROBE_VALUE,
    ),
];

/// Ops for the 512-element buffer; row groups widen with the buffer.
const LARGE_ROWS: [OpVariant; 5] = [
    OpVariant::new(
        "bank_a.g0",
        InstructionDescriptor::vector_dest(Selector::BankAWrite, A0, dimc_imm!(0, 0, 0)),
        PROBE_VALUE,
    ),
    OpVariant::new(
        "bank_b.g5",
        InstructionDescriptor::vector_dest(Selector::BankBWrite, A0, dimc_imm!(5, 0, 0)),
        7,
    ),
    OpVariant::new(
        "compute.g10",
        InstructionDescriptor::vector_dest(Selector::ComputeRead, A0, dimc_imm!(10, 0, 0)),
        PROBE_VALUE,
    ),
    OpVariant::new(
        "store.g15",
        InstructionDescriptor::vector_dest(Selector::ComputeStore, A0, dimc_imm!(15, 0, 0)),
        7,
    ),
    OpVariant::new(
        "readback.g15",
        InstructionDescriptor::distinct(Selector::ComputeRead, A1, A0, dimc_imm!(15, 0, 0)),
        7,
    ),
];

/// A complete test scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Case name, as accepted on the command line.
    pub name: &'static str,
    /// Canonical input pattern.
    pub source: Vec<i32>,
    /// Grouping factor for `configure`.
    pub lmul: Lmul,
    /// Requested vector length.
    pub requested_vl: usize,
    /// Ops issued between load and store, in order.
    pub ops: Vec<OpVariant>,
}

impl TestCase {
    /// Names of the built-in cases.
    pub const NAMES: [&'static str; 3] = ["small", "large", "identity"];

    /// 8 elements with the `0x025` probes and row groups 0-3.
    pub fn small() -> Self {
        Self {
            name: "small",
            source: (42..=49).collect(),
            lmul: Lmul::M8,
            requested_vl: 8,
            ops: PROBES.iter().chain(SMALL_ROWS.iter()).copied().collect(),
        }
    }

    /// 512 elements (16 blocks of 0..31) over 32 register slices.
    pub fn large() -> Self {
        Self {
            name: "large",
            source: (0..512).map(|i| i % 32).collect(),
            lmul: Lmul::M2,
            requested_vl: 16,
            ops: LARGE_ROWS.to_vec(),
        }
    }

    /// Load then store with nothing in between.
    pub fn identity() -> Self {
        Self {
            name: "identity",
            ops: Vec::new(),
            ..Self::small()
        }
    }

    /// Look up a built-in case.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "small" => Some(Self::small()),
            "large" => Some(Self::large()),
            "identity" => Some(Self::identity()),
            _ => None,
        }
    }

    /// Every built-in case.
    pub fn all() -> Vec<Self> {
        vec![Self::small(), Self::large(), Self::identity()]
    }

    /// Size of one buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.source.len() * crate::memory::WORD_BYTES
    }
}

/// Scratchpad copies of the source (A) and the zero pattern (B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorBuffers {
    /// Receives the source buffer.
    pub a: ScratchPtr,
    /// Receives zeros, then the stored register file.
    pub b: ScratchPtr,
}

/// Shared state of one run.
pub struct TestContext {
    /// Scenario being run.
    pub case: TestCase,
    /// Main memory.
    pub backing: BackingMemory,
    /// Cluster-local memory.
    pub scratchpad: Scratchpad,
    /// Cluster DMA.
    pub dma: TransferEngine,
    /// Core identity and barriers.
    pub coordinator: ClusterCoordinator,
    /// Source buffer in backing memory.
    pub source: HostAddr,
    /// Zero pattern in backing memory.
    pub zeros: HostAddr,
    /// Set by the leader once allocated.
    pub mirrors: Option<MirrorBuffers>,
}

impl TestContext {
    /// Place the case's buffers in backing memory and build the cluster.
    pub fn new(case: TestCase, config: &HarnessConfig) -> Result<Self, HarnessError> {
        let mut backing = BackingMemory::new();
        let source = backing.place_words("source", &case.source)?;
        let zeros = backing.reserve("zeros", case.byte_len())?;

        Ok(Self {
            case,
            backing,
            scratchpad: Scratchpad::new(config.scratchpad_bytes, config.scratchpad_fill),
            dma: TransferEngine::new(config.dma_bytes_per_cycle),
            coordinator: ClusterCoordinator::new(config.cores),
            source,
            zeros,
            mirrors: None,
        })
    }
}
