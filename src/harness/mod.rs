//! The DIMC probing harness.
//!
//! This module ties the cluster model together:
//!
//! - [`context`]: test cases and the shared per-run state
//! - [`sequencer`]: the per-core state machine
//! - [`engine`]: steps all cores, the DMA and the accelerator each cycle
//! - [`report`]: console report and verification
//! - [`runner`]: run a case to completion and collect the outcome
//!
//! # Example
//!
//! ```
//! use dimc_probe::harness::{run_case, HarnessConfig, TestCase};
//!
//! let outcome = run_case(TestCase::identity(), &HarnessConfig::default()).unwrap();
//! assert!(outcome.report.verify().is_ok());
//! assert_eq!(outcome.report.copy, vec![42, 43, 44, 45, 46, 47, 48, 49]);
//! ```

pub mod context;
pub mod engine;
pub mod registers;
pub mod report;
pub mod runner;
pub mod sequencer;

pub use context::{MirrorBuffers, OpVariant, TestCase, TestContext};
pub use engine::{ClusterEngine, EngineStatus, Trace, TraceEvent};
pub use report::{OpRecord, OpResult, Report, VerifyError};
pub use runner::{run_case, run_case_with, CaseOutcome};
pub use sequencer::{CoreSequencer, Phase, StepResult, Wait};

use thiserror::Error;

use crate::accel::AccelError;
use crate::cluster::CoreId;
use crate::dma::{DmaError, DEFAULT_BYTES_PER_CYCLE};
use crate::memory::MemoryError;
use crate::vector::{VectorError, DEFAULT_VLEN};

/// Largest cluster the harness will build.
pub const MAX_CORES: u8 = 32;

/// Errors raised while running the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Scratchpad or backing memory failure.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// DMA failure.
    #[error(transparent)]
    Dma(#[from] DmaError),

    /// Vector unit failure.
    #[error(transparent)]
    Vector(#[from] VectorError),

    /// Accelerator port failure.
    #[error(transparent)]
    Accel(#[from] AccelError),

    /// Report did not match.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// A core reached a phase that reads the mirrors before they exist.
    #[error("{core} reached {phase} before the mirror buffers were allocated")]
    MirrorsMissing {
        /// Core.
        core: CoreId,
        /// Phase.
        phase: Phase,
    },

    /// Bad cluster shape.
    #[error("cluster must have 1..={max} cores, got {cores}")]
    InvalidCoreCount {
        /// Requested cores.
        cores: u8,
        /// Upper bound.
        max: u8,
    },
}

/// Shape of the simulated cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Cores in the cluster.
    pub cores: u8,
    /// Vector register width in bits.
    pub vlen: usize,
    /// Scratchpad size in bytes.
    pub scratchpad_bytes: usize,
    /// Poison byte for fresh scratchpad.
    pub scratchpad_fill: u8,
    /// DMA bandwidth.
    pub dma_bytes_per_cycle: usize,
    /// Cycle limit per case.
    pub max_cycles: u64,
    /// Cycles each DIMC op stays in flight.
    pub accel_latency: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cores: 8,
            vlen: DEFAULT_VLEN,
            scratchpad_bytes: 128 * 1024,
            scratchpad_fill: 0xA5,
            dma_bytes_per_cycle: DEFAULT_BYTES_PER_CYCLE,
            max_cycles: 100_000,
            accel_latency: 0,
        }
    }
}

impl HarnessConfig {
    /// Reject shapes the engine cannot build.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.cores == 0 || self.cores > MAX_CORES {
            return Err(HarnessError::InvalidCoreCount {
                cores: self.cores,
                max: MAX_CORES,
            });
        }
        // Constructing a unit checks VLEN
        crate::vector::VectorUnit::new(self.vlen)?;
        Ok(())
    }
}
