//! DMA transfer state machine.
//!
//! A transfer is one 1-D bulk copy issued by a core. It tracks how many
//! bytes have moved and when it finished.
//!
//! # Transfer Lifecycle
//!
//! ```text
//! ┌────────┐  first bytes  ┌────────┐  last bytes  ┌──────────┐
//! │ Queued ├──────moved────► Active ├─────moved────► Complete │
//! └────────┘               └────────┘              └──────────┘
//! ```
//!
//! Bytes land in the destination as they move, so an `Active` transfer
//! leaves its destination partly written.

use std::fmt;

use crate::cluster::CoreId;
use crate::memory::{HostAddr, MemorySpace, ScratchPtr};

/// Identifier handed back by `start_copy`.
pub type TransferId = u32;

/// One side of a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Backing memory.
    Backing(HostAddr),
    /// Scratchpad.
    Scratchpad(ScratchPtr),
}

impl Endpoint {
    /// Memory this endpoint lives in.
    pub fn space(&self) -> MemorySpace {
        match self {
            Endpoint::Backing(_) => MemorySpace::Backing,
            Endpoint::Scratchpad(_) => MemorySpace::Scratchpad,
        }
    }

    /// Absolute address.
    pub fn address(&self) -> u64 {
        match self {
            Endpoint::Backing(a) => a.get(),
            Endpoint::Scratchpad(p) => p.addr(),
        }
    }

    /// Address `bytes` further on, in the same memory.
    pub fn offset_address(&self, bytes: usize) -> u64 {
        self.address() + bytes as u64
    }
}

impl From<HostAddr> for Endpoint {
    fn from(addr: HostAddr) -> Self {
        Endpoint::Backing(addr)
    }
}

impl From<ScratchPtr> for Endpoint {
    fn from(ptr: ScratchPtr) -> Self {
        Endpoint::Scratchpad(ptr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{:08X}", self.space(), self.address())
    }
}

/// Transfer state in the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Issued, no bytes moved yet.
    Queued,
    /// Some bytes moved.
    Active,
    /// Every byte moved.
    Complete,
}

/// A single DMA copy.
#[derive(Debug, Clone)]
pub struct Transfer {
    /// Identifier.
    pub id: TransferId,
    /// Core that issued the copy.
    pub core: CoreId,
    /// Source.
    pub src: Endpoint,
    /// Destination.
    pub dst: Endpoint,
    /// Total length in bytes.
    pub length: usize,
    /// Bytes moved so far.
    transferred: usize,
    state: TransferState,
    /// Cycle the copy was issued.
    pub issue_cycle: u64,
    /// Cycle the last byte moved.
    pub completion_cycle: Option<u64>,
}

impl Transfer {
    /// Create a queued transfer.
    pub fn new(id: TransferId, core: CoreId, dst: Endpoint, src: Endpoint, length: usize, issue_cycle: u64) -> Self {
        Self {
            id,
            core,
            src,
            dst,
            length,
            transferred: 0,
            state: TransferState::Queued,
            issue_cycle,
            completion_cycle: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Bytes moved so far.
    pub fn transferred(&self) -> usize {
        self.transferred
    }

    /// Bytes still to move.
    pub fn remaining(&self) -> usize {
        self.length - self.transferred
    }

    /// True once every byte has moved.
    pub fn is_complete(&self) -> bool {
        self.state == TransferState::Complete
    }

    /// Next chunk to move: `(src address, dst address, length)`.
    pub(crate) fn next_chunk(&self, budget: usize) -> (u64, u64, usize) {
        let len = budget.min(self.remaining());
        (
            self.src.offset_address(self.transferred),
            self.dst.offset_address(self.transferred),
            len,
        )
    }

    /// Record `bytes` moved at `cycle`.
    pub(crate) fn advance(&mut self, bytes: usize, cycle: u64) {
        self.transferred = (self.transferred + bytes).min(self.length);
        if self.transferred == self.length {
            self.state = TransferState::Complete;
            self.completion_cycle = Some(cycle);
        } else {
            self.state = TransferState::Active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(length: usize) -> Transfer {
        Transfer::new(
            1,
            CoreId::LEADER,
            Endpoint::Scratchpad(ScratchPtr::new(0x1000_0000)),
            Endpoint::Backing(HostAddr::new(0x8000_0000)),
            length,
            5,
        )
    }

    #[test]
    fn test_lifecycle() {
        let mut t = transfer(100);
        assert_eq!(t.state(), TransferState::Queued);

        let (src, dst, len) = t.next_chunk(64);
        assert_eq!((src, dst, len), (0x8000_0000, 0x1000_0000, 64));
        t.advance(len, 6);
        assert_eq!(t.state(), TransferState::Active);
        assert_eq!(t.remaining(), 36);

        let (src, dst, len) = t.next_chunk(64);
        assert_eq!((src, dst, len), (0x8000_0040, 0x1000_0040, 36));
        t.advance(len, 7);
        assert!(t.is_complete());
        assert_eq!(t.completion_cycle, Some(7));
    }

    #[test]
    fn test_endpoint_display() {
        let e = Endpoint::from(ScratchPtr::new(0x1000_0010));
        assert_eq!(e.to_string(), "scratchpad:0x10000010");
    }
}
