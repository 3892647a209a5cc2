//! Cluster coordination: core identity and barriers.
//!
//! Every core in the cluster runs the same program. The only things that
//! tell cores apart are their index, where core 0 is the leader that sets
//! up shared resources, and the barrier that orders them.

pub mod barrier;

pub use barrier::{
    AggregateBarrierStats, BarrierSite, BarrierState, BarrierStats, BarrierTicket, BarrierTracker,
    PendingBarrier,
};

use std::fmt;

/// Index of a core within the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CoreId(u8);

impl CoreId {
    /// The leader core.
    pub const LEADER: CoreId = CoreId(0);

    /// Create a core identifier.
    #[inline]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Raw index.
    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }

    /// True for core 0, which owns shared-resource setup.
    #[inline]
    pub const fn is_leader(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core{}", self.0)
    }
}

/// Cluster-wide coordination state.
#[derive(Debug)]
pub struct ClusterCoordinator {
    cores: u8,
    barriers: BarrierTracker,
}

impl ClusterCoordinator {
    /// Create a coordinator for `cores` cores; every barrier needs all of them.
    pub fn new(cores: u8) -> Self {
        Self {
            cores,
            barriers: BarrierTracker::new(cores as usize),
        }
    }

    /// Number of cores in the cluster.
    pub fn core_count(&self) -> u8 {
        self.cores
    }

    /// Iterate over all core identifiers.
    pub fn core_ids(&self) -> impl Iterator<Item = CoreId> {
        (0..self.cores).map(CoreId)
    }

    /// Enter the barrier at `site`.
    ///
    /// The caller must not proceed past the barrier until
    /// [`barrier_released`](Self::barrier_released) returns true for the
    /// returned ticket.
    pub fn barrier_arrive(&mut self, site: BarrierSite, core: CoreId, cycle: u64) -> BarrierTicket {
        let ticket = self.barriers.arrive(site, core, cycle);
        log::debug!(
            "{} arrived at barrier {} (round {}) at cycle {}",
            core,
            site,
            ticket.generation,
            cycle
        );
        ticket
    }

    /// Check whether a barrier ticket has been released.
    pub fn barrier_released(&self, ticket: &BarrierTicket) -> bool {
        self.barriers.is_released(ticket)
    }

    /// Barrier rounds still waiting for cores.
    pub fn pending_barriers(&self) -> Vec<PendingBarrier> {
        self.barriers.pending()
    }

    /// Underlying barrier tracker.
    pub fn barriers(&self) -> &BarrierTracker {
        &self.barriers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leader() {
        assert!(CoreId::new(0).is_leader());
        assert!(!CoreId::new(3).is_leader());
        assert_eq!(CoreId::LEADER, CoreId::new(0));
    }

    #[test]
    fn test_core_ids() {
        let coord = ClusterCoordinator::new(4);
        let ids: Vec<u8> = coord.core_ids().map(CoreId::index).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_barrier_needs_every_core() {
        let mut coord = ClusterCoordinator::new(3);

        let tickets: Vec<_> = coord
            .core_ids()
            .collect::<Vec<_>>()
            .into_iter()
            .map(|c| {
                let t = coord.barrier_arrive(1, c, 10 + c.index() as u64);
                (c, t)
            })
            .collect();

        for (_, t) in &tickets {
            assert!(coord.barrier_released(t));
        }
        assert!(coord.pending_barriers().is_empty());
    }
}
