//! Per-core test sequencer.
//!
//! Every core runs the same state machine (SPMD). Each call to
//! [`CoreSequencer::step`] either performs one action or reports that the
//! core is stalled on a [`Wait`].
//!
//! # Phases
//!
//! ```text
//!  Init ──(leader: alloc A/B, DMA src→A, zeros→B, wait_all)──► Allocated
//!  Allocated ──(setup barrier)──────────────────────────────► Synchronized
//!  Synchronized ──(configure e32, lmul, requested)──────────► VectorConfigured
//!  VectorConfigured ──(load A into v0..)────────────────────► Loaded
//!  Loaded ──(fence, then one DIMC op per step)──────────────► OperationsIssued
//!  OperationsIssued ──(fence, store v0.. into B)────────────► Stored
//!  Stored ──(report barrier)────────────────────────────────► Reported
//! ```
//!
//! `Reported` is terminal. The leader reads A and B back and builds the
//! [`Report`] on entry.

use std::fmt;

use crate::accel::{AccelPort, IssueRequest};
use crate::cluster::{BarrierSite, BarrierTicket, CoreId};
use crate::encoding::OperandShape;
use crate::memory::ByteMemory;
use crate::vector::{BlockLayout, Sew, VectorUnit};

use super::context::{MirrorBuffers, TestContext};
use super::engine::{Trace, TraceEvent};
use super::registers::ScalarRegisterFile;
use super::report::{OpRecord, OpResult, Report};
use super::HarnessError;

/// Barrier between buffer setup and the first mirror read.
pub const SETUP_BARRIER: BarrierSite = 0;

/// Barrier between the last store and the report.
pub const REPORT_BARRIER: BarrierSite = 1;

/// Sequencer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    Allocated,
    Synchronized,
    VectorConfigured,
    Loaded,
    OperationsIssued,
    Stored,
    Reported,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a stalled core is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// All DMA copies issued by this core.
    Dma,
    /// Release of a barrier round.
    Barrier(BarrierTicket),
    /// Accelerator drained for this core.
    Fence,
}

/// Result of one sequencer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// The core did something.
    Progress,
    /// The core is waiting.
    Stalled,
    /// The core has reached `Reported`.
    Finished,
}

/// One core's copy of the test program.
pub struct CoreSequencer {
    core: CoreId,
    phase: Phase,
    /// Pending wait and the phase to enter once it clears.
    wait: Option<(Wait, Option<Phase>)>,
    vector: VectorUnit,
    scalar: ScalarRegisterFile,
    layout: Option<BlockLayout>,
    ops_fenced: bool,
    store_fenced: bool,
    next_op: usize,
    records: Vec<OpRecord>,
    report: Option<Report>,
    parked: bool,
}

impl CoreSequencer {
    /// Create the sequencer for `core`, owning its vector unit.
    pub fn new(core: CoreId, vector: VectorUnit) -> Self {
        Self {
            core,
            phase: Phase::Init,
            wait: None,
            vector,
            scalar: ScalarRegisterFile::new(),
            layout: None,
            ops_fenced: false,
            store_fenced: false,
            next_op: 0,
            records: Vec::new(),
            report: None,
            parked: false,
        }
    }

    /// Core identifier.
    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current wait, if stalled.
    pub fn wait(&self) -> Option<Wait> {
        self.wait.map(|(w, _)| w)
    }

    /// True once the core has reached `Reported`.
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Reported
    }

    /// Granted VL, once configured.
    pub fn granted_vl(&self) -> Option<usize> {
        self.vector.granted_vl()
    }

    /// Ops issued by this core.
    pub fn records(&self) -> &[OpRecord] {
        &self.records
    }

    /// Report built by the leader.
    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    /// Take the leader's report.
    pub fn take_report(&mut self) -> Option<Report> {
        self.report.take()
    }

    /// Vector unit.
    pub fn vector(&self) -> &VectorUnit {
        &self.vector
    }

    /// Scalar registers.
    pub fn scalar(&self) -> &ScalarRegisterFile {
        &self.scalar
    }

    /// Stop stepping this core. It never reaches another barrier.
    pub fn park(&mut self) {
        self.parked = true;
    }

    /// True if parked.
    pub fn is_parked(&self) -> bool {
        self.parked
    }

    fn enter(&mut self, next: Phase) {
        log::debug!("{}: {} -> {}", self.core, self.phase, next);
        self.phase = next;
    }

    fn mirrors(&self, ctx: &TestContext) -> Result<MirrorBuffers, HarnessError> {
        ctx.mirrors.ok_or(HarnessError::MirrorsMissing {
            core: self.core,
            phase: self.phase,
        })
    }

    fn layout(&self) -> Result<BlockLayout, HarnessError> {
        self.layout.ok_or(HarnessError::Vector(crate::vector::VectorError::NotConfigured))
    }

    /// Advance this core by one cycle.
    pub fn step(
        &mut self,
        ctx: &mut TestContext,
        accel: &mut dyn AccelPort,
        cycle: u64,
        trace: &mut Trace,
    ) -> Result<StepResult, HarnessError> {
        if self.parked {
            return Ok(StepResult::Stalled);
        }

        if let Some((wait, then)) = self.wait {
            if !self.wait_cleared(wait, ctx, accel) {
                return Ok(StepResult::Stalled);
            }
            self.wait = None;
            match wait {
                Wait::Barrier(ticket) => trace.push(TraceEvent::BarrierRelease {
                    cycle,
                    core: self.core,
                    site: ticket.site,
                }),
                Wait::Fence => trace.push(TraceEvent::Fence { cycle, core: self.core }),
                Wait::Dma => {}
            }
            if let Some(next) = then {
                self.enter(next);
            }
            return Ok(StepResult::Progress);
        }

        match self.phase {
            Phase::Init => self.setup(ctx, cycle)?,
            Phase::Allocated => self.arrive(ctx, SETUP_BARRIER, Phase::Synchronized, cycle, trace),
            Phase::Synchronized => {
                self.vector
                    .configure(Sew::E32, ctx.case.lmul, ctx.case.requested_vl);
                self.layout = Some(self.vector.layout(ctx.case.source.len())?);
                self.enter(Phase::VectorConfigured);
            }
            Phase::VectorConfigured => {
                let mirrors = self.mirrors(ctx)?;
                let layout = self.layout()?;
                self.vector.load_block(&ctx.scratchpad, mirrors.a.addr(), &layout)?;
                trace.push(TraceEvent::MirrorRead { cycle, core: self.core });
                self.enter(Phase::Loaded);
            }
            Phase::Loaded => {
                if !self.ops_fenced {
                    self.ops_fenced = true;
                    self.wait = Some((Wait::Fence, None));
                } else if self.next_op < ctx.case.ops.len() {
                    self.issue_next(ctx, accel, cycle, trace)?;
                } else {
                    self.enter(Phase::OperationsIssued);
                }
            }
            Phase::OperationsIssued => {
                if !self.store_fenced {
                    self.store_fenced = true;
                    self.wait = Some((Wait::Fence, None));
                } else {
                    let mirrors = self.mirrors(ctx)?;
                    let layout = self.layout()?;
                    self.vector.store_block(&mut ctx.scratchpad, mirrors.b.addr(), &layout)?;
                    trace.push(TraceEvent::MirrorWrite { cycle, core: self.core });
                    self.enter(Phase::Stored);
                }
            }
            Phase::Stored => self.arrive(ctx, REPORT_BARRIER, Phase::Reported, cycle, trace),
            Phase::Reported => {
                if self.core.is_leader() && self.report.is_none() {
                    self.capture_report(ctx, cycle, trace)?;
                    return Ok(StepResult::Progress);
                }
                return Ok(StepResult::Finished);
            }
        }
        Ok(StepResult::Progress)
    }

    fn wait_cleared(&self, wait: Wait, ctx: &TestContext, accel: &dyn AccelPort) -> bool {
        match wait {
            Wait::Dma => ctx.dma.all_complete(self.core),
            Wait::Barrier(ticket) => ctx.coordinator.barrier_released(&ticket),
            Wait::Fence => accel.fence(self.core),
        }
    }

    /// Leader allocates both mirrors and starts both copies; others pass.
    fn setup(&mut self, ctx: &mut TestContext, cycle: u64) -> Result<(), HarnessError> {
        if !self.core.is_leader() {
            self.enter(Phase::Allocated);
            return Ok(());
        }

        let bytes = ctx.case.byte_len();
        let a = ctx.scratchpad.allocate(bytes)?;
        let b = ctx.scratchpad.allocate(bytes)?;
        ctx.mirrors = Some(MirrorBuffers { a, b });

        ctx.dma
            .start_copy(self.core, a.into(), ctx.source.into(), bytes, &ctx.backing, &ctx.scratchpad, cycle)?;
        ctx.dma
            .start_copy(self.core, b.into(), ctx.zeros.into(), bytes, &ctx.backing, &ctx.scratchpad, cycle)?;

        self.wait = Some((Wait::Dma, Some(Phase::Allocated)));
        Ok(())
    }

    fn arrive(&mut self, ctx: &mut TestContext, site: BarrierSite, then: Phase, cycle: u64, trace: &mut Trace) {
        let ticket = ctx.coordinator.barrier_arrive(site, self.core, cycle);
        trace.push(TraceEvent::BarrierArrive {
            cycle,
            core: self.core,
            site,
        });
        self.wait = Some((Wait::Barrier(ticket), Some(then)));
    }

    fn issue_next(
        &mut self,
        ctx: &TestContext,
        accel: &mut dyn AccelPort,
        cycle: u64,
        trace: &mut Trace,
    ) -> Result<(), HarnessError> {
        let op = ctx.case.ops[self.next_op];
        let descriptor = op.descriptor;
        let rs1 = descriptor.shape().rs1();
        let word = descriptor.assemble();

        self.scalar.write_i32(rs1, op.input);
        let outcome = accel.issue(IssueRequest {
            core: self.core,
            cycle,
            word,
            rs1_value: self.scalar.read_i32(rs1),
            vregs: self.vector.registers_mut(),
        })?;

        let result = match descriptor.shape() {
            OperandShape::VectorDest { .. } => OpResult::Vector {
                lane0: self.vector.registers().read_lane(0, 0) as i32,
            },
            OperandShape::InPlace { .. } | OperandShape::Distinct { .. } => {
                let rd = descriptor.shape().rd();
                if let Some(value) = outcome.rd_value {
                    self.scalar.write_i32(rd, value);
                }
                OpResult::Scalar {
                    reg: rd,
                    value: self.scalar.read_i32(rd),
                }
            }
        };

        trace.push(TraceEvent::OpIssued {
            cycle,
            core: self.core,
            word,
        });
        self.records.push(OpRecord {
            core: self.core,
            cycle,
            name: op.name,
            descriptor,
            input: op.input,
            result,
        });
        self.next_op += 1;
        Ok(())
    }

    fn capture_report(&mut self, ctx: &TestContext, cycle: u64, trace: &mut Trace) -> Result<(), HarnessError> {
        let mirrors = self.mirrors(ctx)?;
        let n = ctx.case.source.len();
        let original = ctx.scratchpad.read_words(mirrors.a.addr(), n)?;
        let copy = ctx.scratchpad.read_words(mirrors.b.addr(), n)?;
        trace.push(TraceEvent::MirrorRead { cycle, core: self.core });

        self.report = Some(Report {
            case: ctx.case.name.to_string(),
            source: ctx.case.source.clone(),
            original,
            copy,
            vl: self.granted_vl().unwrap_or(0),
            ops: self.records.clone(),
            expected_ops: ctx.case.ops.len(),
        });
        log::info!("{}: report captured for '{}'", self.core, ctx.case.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::LoopbackAccel;
    use crate::harness::context::TestCase;
    use crate::harness::HarnessConfig;

    fn single_core() -> (TestContext, CoreSequencer) {
        let config = HarnessConfig {
            cores: 1,
            ..HarnessConfig::default()
        };
        let ctx = TestContext::new(TestCase::small(), &config).unwrap();
        let seq = CoreSequencer::new(CoreId::LEADER, VectorUnit::new(config.vlen).unwrap());
        (ctx, seq)
    }

    #[test]
    fn test_leader_waits_for_dma_before_barrier() {
        let (mut ctx, mut seq) = single_core();
        let mut accel = LoopbackAccel::new();
        let mut trace = Trace::new();

        assert_eq!(seq.step(&mut ctx, &mut accel, 0, &mut trace).unwrap(), StepResult::Progress);
        assert_eq!(seq.wait(), Some(Wait::Dma));
        assert_eq!(ctx.scratchpad.allocations().len(), 2);

        assert_eq!(seq.step(&mut ctx, &mut accel, 1, &mut trace).unwrap(), StepResult::Stalled);
        ctx.dma.step(&mut ctx.backing, &mut ctx.scratchpad, 1).unwrap();

        assert_eq!(seq.step(&mut ctx, &mut accel, 2, &mut trace).unwrap(), StepResult::Progress);
        assert_eq!(seq.phase(), Phase::Allocated);
    }

    #[test]
    fn test_follower_skips_setup() {
        let config = HarnessConfig::default();
        let mut ctx = TestContext::new(TestCase::small(), &config).unwrap();
        let mut seq = CoreSequencer::new(CoreId::new(3), VectorUnit::new(512).unwrap());
        let mut accel = LoopbackAccel::new();
        let mut trace = Trace::new();

        seq.step(&mut ctx, &mut accel, 0, &mut trace).unwrap();
        assert_eq!(seq.phase(), Phase::Allocated);
        assert!(ctx.mirrors.is_none());
        assert!(ctx.dma.is_idle());
    }

    #[test]
    fn test_single_core_runs_to_report() {
        let (mut ctx, mut seq) = single_core();
        let mut accel = LoopbackAccel::new();
        let mut trace = Trace::new();

        let mut cycle = 0;
        while !seq.is_finished() || seq.report().is_none() {
            seq.step(&mut ctx, &mut accel, cycle, &mut trace).unwrap();
            ctx.dma.step(&mut ctx.backing, &mut ctx.scratchpad, cycle).unwrap();
            cycle += 1;
            assert!(cycle < 1000, "sequencer did not finish");
        }

        let report = seq.report().unwrap();
        assert_eq!(report.copy, (42..=49).collect::<Vec<_>>());
        assert_eq!(report.vl, 8);
        assert_eq!(seq.granted_vl(), Some(8));
        assert_eq!(seq.records().len(), 6);
        assert_eq!(seq.scalar().read_i32(crate::encoding::GpReg::new(11)), 22);
    }

    #[test]
    fn test_parked_core_never_moves() {
        let (mut ctx, mut seq) = single_core();
        let mut accel = LoopbackAccel::new();
        let mut trace = Trace::new();

        seq.park();
        for cycle in 0..5 {
            assert_eq!(seq.step(&mut ctx, &mut accel, cycle, &mut trace).unwrap(), StepResult::Stalled);
        }
        assert_eq!(seq.phase(), Phase::Init);
    }
}
