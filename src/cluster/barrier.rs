//! Cluster barrier tracking.
//!
//! This module models the cluster's hardware barrier:
//!
//! - **Barrier state**: which cores have arrived in the current round
//! - **Generations**: every completion starts a new round at the same site
//! - **Wait cycles**: how long each core waited for the last arrival
//! - **Statistics**: aggregate barrier metrics per call site
//!
//! # Barrier Model
//!
//! A barrier is identified by its call site. A core arriving at a site gets
//! a [`BarrierTicket`] stamped with the site's current generation. The
//! ticket is released once the generation has moved on, which happens the
//! moment the last participant arrives. There is no timeout: a core that
//! never arrives keeps everyone else waiting.
//!
//! # Usage
//!
//! ```
//! use dimc_probe::cluster::{BarrierTracker, CoreId};
//!
//! let mut tracker = BarrierTracker::new(2);
//!
//! let t0 = tracker.arrive(0, CoreId::new(0), 100);
//! assert!(!tracker.is_released(&t0));
//!
//! let t1 = tracker.arrive(0, CoreId::new(1), 120);
//! assert!(tracker.is_released(&t0));
//! assert!(tracker.is_released(&t1));
//! assert_eq!(tracker.stats(0).unwrap().max_wait_cycles, 20);
//! ```

use std::collections::HashMap;

use smallvec::SmallVec;

use super::CoreId;

/// Barrier call-site identifier.
pub type BarrierSite = u16;

/// Proof of arrival at a barrier round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarrierTicket {
    /// Call site.
    pub site: BarrierSite,
    /// Round the core arrived in.
    pub generation: u64,
}

/// State of a single barrier call site.
#[derive(Debug, Clone)]
pub struct BarrierState {
    /// Number of participants required for completion.
    participants: usize,
    /// Arrivals in the current round, with their cycle.
    arrivals: SmallVec<[(CoreId, u64); 8]>,
    /// Completed rounds.
    generation: u64,
    /// Cycle the most recent round completed.
    last_completion: Option<u64>,
}

impl BarrierState {
    /// Create a new barrier state.
    pub fn new(participants: usize) -> Self {
        Self {
            participants,
            arrivals: SmallVec::new(),
            generation: 0,
            last_completion: None,
        }
    }

    /// Number of participants required.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Number of cores that have arrived in the current round.
    pub fn arrived_count(&self) -> usize {
        self.arrivals.len()
    }

    /// Number of cores still expected in the current round.
    pub fn remaining_count(&self) -> usize {
        self.participants.saturating_sub(self.arrivals.len())
    }

    /// Check if a core has arrived in the current round.
    pub fn has_arrived(&self, core: CoreId) -> bool {
        self.arrivals.iter().any(|(c, _)| *c == core)
    }

    /// Cores that have arrived in the current round.
    pub fn arrived_cores(&self) -> impl Iterator<Item = CoreId> + '_ {
        self.arrivals.iter().map(|(c, _)| *c)
    }

    /// Completed rounds so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cycle the most recent round completed.
    pub fn last_completion(&self) -> Option<u64> {
        self.last_completion
    }

    /// Check whether a ticket's round has completed.
    pub fn is_released(&self, ticket: &BarrierTicket) -> bool {
        self.generation > ticket.generation
    }

    /// Record a core's arrival.
    ///
    /// Returns the ticket and, if this arrival completed the round, the
    /// arrivals of the finished round. A duplicate arrival in the same round
    /// is ignored and keeps its original arrival cycle.
    pub fn arrive(&mut self, core: CoreId, cycle: u64) -> (BarrierTicket, Option<SmallVec<[(CoreId, u64); 8]>>) {
        let ticket = BarrierTicket {
            site: 0,
            generation: self.generation,
        };

        if self.has_arrived(core) {
            return (ticket, None);
        }

        self.arrivals.push((core, cycle));

        if self.arrivals.len() >= self.participants {
            self.generation += 1;
            self.last_completion = Some(cycle);
            let finished = std::mem::take(&mut self.arrivals);
            return (ticket, Some(finished));
        }

        (ticket, None)
    }
}

/// Statistics for one barrier site.
#[derive(Debug, Clone, Default)]
pub struct BarrierStats {
    /// Number of completed rounds.
    pub completions: u64,
    /// Total wait cycles across all participants.
    pub total_wait_cycles: u64,
    /// Maximum wait cycles for any single participant.
    pub max_wait_cycles: u64,
    /// Maximum sync delay (first to last arrival).
    pub max_sync_delay: u64,
    /// Sum of sync delays for average calculation.
    total_sync_delay: u64,
}

impl BarrierStats {
    /// Average wait cycles per completion.
    pub fn avg_wait_cycles(&self) -> f64 {
        if self.completions == 0 {
            0.0
        } else {
            self.total_wait_cycles as f64 / self.completions as f64
        }
    }

    /// Average sync delay.
    pub fn avg_sync_delay(&self) -> f64 {
        if self.completions == 0 {
            0.0
        } else {
            self.total_sync_delay as f64 / self.completions as f64
        }
    }

    fn record_completion(&mut self, arrivals: &[(CoreId, u64)], completion: u64) {
        self.completions += 1;

        let mut first = completion;
        for &(_, arrival) in arrivals {
            let wait = completion.saturating_sub(arrival);
            self.total_wait_cycles += wait;
            self.max_wait_cycles = self.max_wait_cycles.max(wait);
            first = first.min(arrival);
        }

        let delay = completion - first;
        self.total_sync_delay += delay;
        self.max_sync_delay = self.max_sync_delay.max(delay);
    }
}

/// A barrier round that has not completed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBarrier {
    /// Call site.
    pub site: BarrierSite,
    /// Cores already waiting.
    pub arrived: Vec<CoreId>,
    /// Cores still missing.
    pub remaining: usize,
}

/// Tracker for every barrier site in the cluster.
#[derive(Debug, Default)]
pub struct BarrierTracker {
    /// Participants per barrier.
    participants: usize,
    /// Barrier state by call site, created on first arrival.
    barriers: HashMap<BarrierSite, BarrierState>,
    /// Per-site statistics.
    stats: HashMap<BarrierSite, BarrierStats>,
}

impl BarrierTracker {
    /// Create a tracker where every barrier needs `participants` cores.
    pub fn new(participants: usize) -> Self {
        Self {
            participants,
            barriers: HashMap::new(),
            stats: HashMap::new(),
        }
    }

    /// Participants per barrier.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Record a core's arrival at a call site.
    pub fn arrive(&mut self, site: BarrierSite, core: CoreId, cycle: u64) -> BarrierTicket {
        let participants = self.participants;
        let state = self
            .barriers
            .entry(site)
            .or_insert_with(|| BarrierState::new(participants));

        let (mut ticket, finished) = state.arrive(core, cycle);
        ticket.site = site;

        if let Some(arrivals) = finished {
            self.stats
                .entry(site)
                .or_default()
                .record_completion(&arrivals, cycle);
        }

        ticket
    }

    /// Check whether a ticket's round has completed.
    pub fn is_released(&self, ticket: &BarrierTicket) -> bool {
        self.barriers
            .get(&ticket.site)
            .map_or(false, |s| s.is_released(ticket))
    }

    /// Get the barrier state for a site.
    pub fn barrier(&self, site: BarrierSite) -> Option<&BarrierState> {
        self.barriers.get(&site)
    }

    /// Get statistics for a site.
    pub fn stats(&self, site: BarrierSite) -> Option<&BarrierStats> {
        self.stats.get(&site)
    }

    /// Rounds that have arrivals but are not complete.
    pub fn pending(&self) -> Vec<PendingBarrier> {
        let mut pending: Vec<_> = self
            .barriers
            .iter()
            .filter(|(_, s)| s.arrived_count() > 0)
            .map(|(&site, s)| PendingBarrier {
                site,
                arrived: s.arrived_cores().collect(),
                remaining: s.remaining_count(),
            })
            .collect();
        pending.sort_by_key(|p| p.site);
        pending
    }

    /// Aggregate statistics across all sites.
    pub fn aggregate_stats(&self) -> AggregateBarrierStats {
        let mut agg = AggregateBarrierStats::default();
        for stats in self.stats.values() {
            agg.total_completions += stats.completions;
            agg.total_wait_cycles += stats.total_wait_cycles;
            agg.max_wait_cycles = agg.max_wait_cycles.max(stats.max_wait_cycles);
            agg.max_sync_delay = agg.max_sync_delay.max(stats.max_sync_delay);
        }
        agg.site_count = self.barriers.len();
        agg
    }
}

/// Aggregate statistics across all barrier sites.
#[derive(Debug, Clone, Default)]
pub struct AggregateBarrierStats {
    /// Number of sites seen.
    pub site_count: usize,
    /// Total completions across all sites.
    pub total_completions: u64,
    /// Total wait cycles across all participants.
    pub total_wait_cycles: u64,
    /// Maximum wait cycles for any participant.
    pub max_wait_cycles: u64,
    /// Maximum sync delay observed.
    pub max_sync_delay: u64,
}
