//! Run a case to completion.
//!
//! Wraps [`ClusterEngine`] with the cycle limit and the failure reporting
//! the CLI needs.
//!
//! # Example
//!
//! ```
//! use dimc_probe::harness::{run_case, HarnessConfig, TestCase};
//!
//! # fn main() -> anyhow::Result<()> {
//! let outcome = run_case(TestCase::large(), &HarnessConfig::default())?;
//! println!("{}", outcome.report);
//! outcome.report.verify()?;
//! assert_eq!(outcome.report.vl, 16);
//! # Ok(())
//! # }
//! ```

use anyhow::{anyhow, Context, Result};

use crate::accel::{AccelPort, LoopbackAccel};
use crate::cluster::AggregateBarrierStats;
use crate::dma::DmaStats;

use super::context::TestCase;
use super::engine::{ClusterEngine, EngineStatus, Trace};
use super::report::Report;
use super::HarnessConfig;

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    /// Total cycles executed.
    pub cycles: u64,
    /// Final engine status.
    pub status: EngineStatus,
    /// Leader's report.
    pub report: Report,
    /// Event log.
    pub trace: Trace,
    /// DMA counters.
    pub dma: DmaStats,
    /// Barrier counters across sites.
    pub barriers: AggregateBarrierStats,
}

/// Run `case` against the loopback port.
pub fn run_case(case: TestCase, config: &HarnessConfig) -> Result<CaseOutcome> {
    let accel = if config.accel_latency > 0 {
        LoopbackAccel::with_latency(config.accel_latency)
    } else {
        LoopbackAccel::new()
    };
    run_case_with(case, config, Box::new(accel))
}

/// Run `case` against a caller-supplied port.
///
/// Returns an error if the run does not halt within `config.max_cycles`,
/// deadlocks, or fails.
pub fn run_case_with(case: TestCase, config: &HarnessConfig, accel: Box<dyn AccelPort>) -> Result<CaseOutcome> {
    let name = case.name;
    let mut engine =
        ClusterEngine::new(case, config, accel).with_context(|| format!("failed to set up case '{}'", name))?;

    log::info!("running '{}' on {} cores", name, engine.core_count());
    let cycles = engine.run(config.max_cycles);

    match engine.status() {
        EngineStatus::Halted => {}
        EngineStatus::Deadlocked => {
            return Err(anyhow!(
                "case '{}' deadlocked after {} cycles (phases {:?}, pending barriers {:?})",
                name,
                cycles,
                engine.phases(),
                engine.pending_barriers()
            ));
        }
        EngineStatus::Error => {
            return Err(anyhow!(
                "case '{}' failed: {}",
                name,
                engine.error().unwrap_or("unknown error")
            ));
        }
        status => {
            return Err(anyhow!(
                "case '{}' did not complete within {} cycles (status: {:?})",
                name,
                config.max_cycles,
                status
            ));
        }
    }

    let report = engine
        .take_report()
        .ok_or_else(|| anyhow!("case '{}' halted without a report", name))?;

    log::info!("'{}' halted after {} cycles", name, cycles);
    Ok(CaseOutcome {
        cycles,
        status: engine.status(),
        report,
        trace: engine.trace().to_vec(),
        dma: engine.context().dma.stats().clone(),
        barriers: engine.context().coordinator.barriers().aggregate_stats(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_case_verifies() {
        let config = HarnessConfig {
            cores: 4,
            ..HarnessConfig::default()
        };
        for case in TestCase::all() {
            let name = case.name;
            let outcome = run_case(case, &config).unwrap();
            assert_eq!(outcome.status, EngineStatus::Halted, "{}", name);
            assert_eq!(outcome.report.verify(), Ok(()), "{}", name);
        }
    }

    #[test]
    fn test_stats_are_collected() {
        let outcome = run_case(TestCase::small(), &HarnessConfig::default()).unwrap();
        assert_eq!(outcome.dma.transfers_completed, 2);
        assert_eq!(outcome.dma.bytes_moved, 64);
        // Setup and report barriers
        assert_eq!(outcome.barriers.total_completions, 2);
        assert!(!outcome.trace.is_empty());
    }

    #[test]
    fn test_latency_runs_still_verify() {
        let config = HarnessConfig {
            accel_latency: 5,
            ..HarnessConfig::default()
        };
        let outcome = run_case(TestCase::large(), &config).unwrap();
        assert_eq!(outcome.report.verify(), Ok(()));
    }

    #[test]
    fn test_cycle_limit_is_an_error() {
        let config = HarnessConfig {
            max_cycles: 2,
            ..HarnessConfig::default()
        };
        let err = run_case(TestCase::large(), &config).unwrap_err();
        assert!(err.to_string().contains("did not complete within 2 cycles"));
    }

    #[test]
    fn test_bad_config_is_an_error() {
        let config = HarnessConfig {
            cores: 0,
            ..HarnessConfig::default()
        };
        let err = run_case(TestCase::small(), &config).unwrap_err();
        assert!(err.to_string().contains("failed to set up case 'small'"));
    }
}
