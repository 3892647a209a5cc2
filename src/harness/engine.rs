//! Cycle-stepped cluster engine.
//!
//! Each cycle the engine:
//!
//! 1. Steps every core's sequencer in index order
//! 2. Advances the DMA engine
//! 3. Ticks the accelerator port
//!
//! Runs are fully deterministic. A cycle in which no core moved and
//! neither DMA nor accelerator had work is a deadlock: the engine stops
//! with [`EngineStatus::Deadlocked`] instead of spinning to the cycle
//! limit.

use crate::accel::AccelPort;
use crate::cluster::{BarrierSite, CoreId, PendingBarrier};
use crate::dma::TransferId;
use crate::vector::VectorUnit;

use super::context::{TestCase, TestContext};
use super::report::Report;
use super::sequencer::{CoreSequencer, Phase, StepResult};
use super::{HarnessConfig, HarnessError};

/// Engine execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineStatus {
    /// Engine is ready to run.
    #[default]
    Ready,
    /// At least one core is still working.
    Running,
    /// Every core reached `Reported`.
    Halted,
    /// Nothing can make progress.
    Deadlocked,
    /// A core hit an error.
    Error,
}

/// Ordered record of cross-component events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A DMA copy finished.
    DmaComplete {
        /// Cycle.
        cycle: u64,
        /// Issuing core.
        core: CoreId,
        /// Transfer.
        transfer: TransferId,
    },
    /// A core entered a barrier.
    BarrierArrive {
        /// Cycle.
        cycle: u64,
        /// Core.
        core: CoreId,
        /// Call site.
        site: BarrierSite,
    },
    /// A core left a barrier.
    BarrierRelease {
        /// Cycle.
        cycle: u64,
        /// Core.
        core: CoreId,
        /// Call site.
        site: BarrierSite,
    },
    /// A core read mirror memory.
    MirrorRead {
        /// Cycle.
        cycle: u64,
        /// Core.
        core: CoreId,
    },
    /// A core wrote mirror memory.
    MirrorWrite {
        /// Cycle.
        cycle: u64,
        /// Core.
        core: CoreId,
    },
    /// A core passed an accelerator fence.
    Fence {
        /// Cycle.
        cycle: u64,
        /// Core.
        core: CoreId,
    },
    /// A core issued a DIMC op.
    OpIssued {
        /// Cycle.
        cycle: u64,
        /// Core.
        core: CoreId,
        /// Instruction word.
        word: u32,
    },
}

impl TraceEvent {
    /// Cycle the event happened in.
    pub fn cycle(&self) -> u64 {
        match *self {
            TraceEvent::DmaComplete { cycle, .. }
            | TraceEvent::BarrierArrive { cycle, .. }
            | TraceEvent::BarrierRelease { cycle, .. }
            | TraceEvent::MirrorRead { cycle, .. }
            | TraceEvent::MirrorWrite { cycle, .. }
            | TraceEvent::Fence { cycle, .. }
            | TraceEvent::OpIssued { cycle, .. } => cycle,
        }
    }
}

/// Event log of a run.
pub type Trace = Vec<TraceEvent>;

/// Multi-core harness engine.
///
/// Owns the [`TestContext`], one sequencer per core and the accelerator
/// port.
pub struct ClusterEngine {
    ctx: TestContext,
    cores: Vec<CoreSequencer>,
    accel: Box<dyn AccelPort>,
    status: EngineStatus,
    total_cycles: u64,
    trace: Trace,
    error: Option<String>,
}

impl ClusterEngine {
    /// Build an engine for `case` on a cluster described by `config`.
    pub fn new(case: TestCase, config: &HarnessConfig, accel: Box<dyn AccelPort>) -> Result<Self, HarnessError> {
        config.validate()?;
        let ctx = TestContext::new(case, config)?;
        let cores = (0..config.cores)
            .map(|i| Ok(CoreSequencer::new(CoreId::new(i), VectorUnit::new(config.vlen)?)))
            .collect::<Result<Vec<_>, HarnessError>>()?;

        Ok(Self {
            ctx,
            cores,
            accel,
            status: EngineStatus::Ready,
            total_cycles: 0,
            trace: Trace::new(),
            error: None,
        })
    }

    /// Get the engine status.
    pub fn status(&self) -> EngineStatus {
        self.status
    }

    /// Get total cycles executed.
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Error message, when status is `Error`.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Shared run state.
    pub fn context(&self) -> &TestContext {
        &self.ctx
    }

    /// Event log.
    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Accelerator port.
    pub fn accel(&self) -> &dyn AccelPort {
        self.accel.as_ref()
    }

    /// Sequencer for a core.
    pub fn core(&self, core: CoreId) -> Option<&CoreSequencer> {
        self.cores.get(core.index() as usize)
    }

    /// Number of cores.
    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Phase of every core, in index order.
    pub fn phases(&self) -> Vec<Phase> {
        self.cores.iter().map(|c| c.phase()).collect()
    }

    /// Stop stepping a core, as if it never reached the next barrier.
    pub fn park_core(&mut self, core: CoreId) {
        if let Some(seq) = self.cores.get_mut(core.index() as usize) {
            seq.park();
        }
    }

    /// Barrier rounds still waiting on cores.
    pub fn pending_barriers(&self) -> Vec<PendingBarrier> {
        self.ctx.coordinator.pending_barriers()
    }

    /// The leader's report, once the run has halted.
    pub fn report(&self) -> Option<&Report> {
        self.cores.first().and_then(|c| c.report())
    }

    /// Take the leader's report.
    pub fn take_report(&mut self) -> Option<Report> {
        self.cores.first_mut().and_then(|c| c.take_report())
    }

    /// Execute one cycle.
    pub fn step(&mut self) {
        if matches!(
            self.status,
            EngineStatus::Halted | EngineStatus::Deadlocked | EngineStatus::Error
        ) {
            return;
        }

        self.status = EngineStatus::Running;
        let cycle = self.total_cycles;
        let mut progressed = false;
        let mut all_finished = true;

        for core in self.cores.iter_mut() {
            match core.step(&mut self.ctx, self.accel.as_mut(), cycle, &mut self.trace) {
                Ok(StepResult::Progress) => {
                    progressed = true;
                    all_finished = false;
                }
                Ok(StepResult::Stalled) => all_finished = false,
                Ok(StepResult::Finished) => {}
                Err(e) => {
                    log::warn!("{} failed at cycle {}: {}", core.core(), cycle, e);
                    self.error = Some(format!("{}: {}", core.core(), e));
                    self.status = EngineStatus::Error;
                    return;
                }
            }
        }

        let dma_busy = !self.ctx.dma.is_idle();
        match self.ctx.dma.step(&mut self.ctx.backing, &mut self.ctx.scratchpad, cycle) {
            Ok(done) => {
                for c in done {
                    self.trace.push(TraceEvent::DmaComplete {
                        cycle: c.cycle,
                        core: c.core,
                        transfer: c.id,
                    });
                }
            }
            Err(e) => {
                self.error = Some(format!("DMA: {}", e));
                self.status = EngineStatus::Error;
                return;
            }
        }

        let accel_busy = !self.accel.is_idle();
        self.accel.tick(cycle);

        self.total_cycles += 1;

        if all_finished {
            self.status = EngineStatus::Halted;
        } else if !progressed && !dma_busy && !accel_busy {
            log::warn!(
                "deadlock at cycle {}: phases {:?}, pending barriers {:?}",
                cycle,
                self.phases(),
                self.pending_barriers()
            );
            self.status = EngineStatus::Deadlocked;
        }
    }

    /// Run for up to `max_cycles` cycles.
    ///
    /// Stops early on halt, deadlock or error.
    /// Returns the number of cycles actually executed.
    pub fn run(&mut self, max_cycles: u64) -> u64 {
        let start = self.total_cycles;

        for _ in 0..max_cycles {
            self.step();

            if matches!(
                self.status,
                EngineStatus::Halted | EngineStatus::Deadlocked | EngineStatus::Error
            ) {
                break;
            }
        }

        self.total_cycles - start
    }
}
