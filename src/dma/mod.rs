//! Cluster DMA engine.
//!
//! The DMA moves data between backing memory and the scratchpad:
//!
//! - `start_copy` queues a 1-D copy and returns at once
//! - `step` moves up to `bytes_per_cycle` bytes per cycle, in issue order
//! - `all_complete(core)` is the wait-all predicate: true once every copy
//!   the core issued has finished
//!
//! ```text
//! ┌──────────────┐   start_copy    ┌─────────────────────────┐
//! │    core N    ├────────────────►│  FIFO: T0 │ T1 │ T2 ... │
//! └──────┬───────┘                 └────────────┬────────────┘
//!        │ wait_all                             │ bytes_per_cycle
//!        ▼                                      ▼
//!   stall until                        backing ⇄ scratchpad
//!   outstanding(N) == 0
//! ```
//!
//! There is no cancellation and no selective wait.

pub mod transfer;

pub use transfer::{Endpoint, Transfer, TransferId, TransferState};

use std::collections::{HashMap, VecDeque};

use smallvec::SmallVec;
use thiserror::Error;

use crate::cluster::CoreId;
use crate::memory::{BackingMemory, ByteMemory, MemoryError, Scratchpad};

/// Default DMA data width (512-bit AXI).
pub const DEFAULT_BYTES_PER_CYCLE: usize = 64;

/// DMA error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DmaError {
    /// Copy of zero bytes.
    #[error("zero-length DMA transfer")]
    EmptyTransfer,

    /// An endpoint range is not inside its memory.
    #[error("DMA endpoint out of range: {0}")]
    AddressOutOfBounds(#[source] MemoryError),

    /// Memory access failed while moving data.
    #[error("DMA memory access failed: {0}")]
    Memory(#[from] MemoryError),
}

/// Transfer statistics.
#[derive(Debug, Clone, Default)]
pub struct DmaStats {
    /// Copies issued.
    pub transfers_started: u64,
    /// Copies finished.
    pub transfers_completed: u64,
    /// Bytes moved.
    pub bytes_moved: u64,
    /// Cycles in which at least one byte moved.
    pub busy_cycles: u64,
}

/// A transfer that finished during a `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Transfer identifier.
    pub id: TransferId,
    /// Issuing core.
    pub core: CoreId,
    /// Cycle the transfer finished.
    pub cycle: u64,
}

/// The cluster DMA engine.
pub struct TransferEngine {
    bytes_per_cycle: usize,
    queue: VecDeque<Transfer>,
    finished: Vec<Transfer>,
    outstanding: HashMap<CoreId, SmallVec<[TransferId; 4]>>,
    next_id: TransferId,
    stats: DmaStats,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BYTES_PER_CYCLE)
    }
}

impl TransferEngine {
    /// Create an engine moving `bytes_per_cycle` bytes each cycle.
    pub fn new(bytes_per_cycle: usize) -> Self {
        Self {
            bytes_per_cycle: bytes_per_cycle.max(1),
            queue: VecDeque::new(),
            finished: Vec::new(),
            outstanding: HashMap::new(),
            next_id: 0,
            stats: DmaStats::default(),
        }
    }

    /// Bandwidth in bytes per cycle.
    pub fn bytes_per_cycle(&self) -> usize {
        self.bytes_per_cycle
    }

    /// Queue a copy of `bytes` bytes from `src` to `dst`.
    ///
    /// Both ranges are checked now, so a queued transfer never fails later
    /// on bounds.
    pub fn start_copy(
        &mut self,
        core: CoreId,
        dst: Endpoint,
        src: Endpoint,
        bytes: usize,
        backing: &BackingMemory,
        scratchpad: &Scratchpad,
        cycle: u64,
    ) -> Result<TransferId, DmaError> {
        if bytes == 0 {
            return Err(DmaError::EmptyTransfer);
        }
        for endpoint in [src, dst] {
            check_endpoint(endpoint, bytes, backing, scratchpad).map_err(DmaError::AddressOutOfBounds)?;
        }

        let id = self.next_id;
        self.next_id += 1;

        log::debug!("{} DMA #{}: {} -> {} ({} bytes)", core, id, src, dst, bytes);

        self.queue.push_back(Transfer::new(id, core, dst, src, bytes, cycle));
        self.outstanding.entry(core).or_default().push(id);
        self.stats.transfers_started += 1;
        Ok(id)
    }

    /// Advance the engine by one cycle.
    ///
    /// Returns the transfers that finished during this cycle.
    pub fn step(
        &mut self,
        backing: &mut BackingMemory,
        scratchpad: &mut Scratchpad,
        cycle: u64,
    ) -> Result<SmallVec<[Completion; 2]>, DmaError> {
        let mut completions = SmallVec::new();
        let mut budget = self.bytes_per_cycle;
        let mut moved_any = false;

        while budget > 0 {
            let Some(transfer) = self.queue.front_mut() else {
                break;
            };

            let (src, dst, len) = transfer.next_chunk(budget);
            let mut buf = vec![0u8; len];
            read_endpoint(transfer.src, src, &mut buf, backing, scratchpad)?;
            write_endpoint(transfer.dst, dst, &buf, backing, scratchpad)?;
            transfer.advance(len, cycle);

            log::trace!(
                "DMA #{}: {}/{} bytes at cycle {}",
                transfer.id,
                transfer.transferred(),
                transfer.length,
                cycle
            );

            budget -= len;
            moved_any = true;
            self.stats.bytes_moved += len as u64;

            if transfer.is_complete() {
                if let Some(done) = self.queue.pop_front() {
                    self.retire(&done);
                    completions.push(Completion {
                        id: done.id,
                        core: done.core,
                        cycle,
                    });
                    self.finished.push(done);
                }
            }
        }

        if moved_any {
            self.stats.busy_cycles += 1;
        }
        Ok(completions)
    }

    fn retire(&mut self, done: &Transfer) {
        if let Some(ids) = self.outstanding.get_mut(&done.core) {
            ids.retain(|id| *id != done.id);
        }
        self.stats.transfers_completed += 1;
        log::debug!("DMA #{} complete for {}", done.id, done.core);
    }

    /// Number of copies issued by `core` that have not finished.
    pub fn outstanding(&self, core: CoreId) -> usize {
        self.outstanding.get(&core).map_or(0, |ids| ids.len())
    }

    /// Wait-all predicate: every copy issued by `core` has finished.
    pub fn all_complete(&self, core: CoreId) -> bool {
        self.outstanding(core) == 0
    }

    /// True when no transfer is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Look up a transfer by id, in flight or finished.
    pub fn transfer(&self, id: TransferId) -> Option<&Transfer> {
        self.queue
            .iter()
            .chain(self.finished.iter())
            .find(|t| t.id == id)
    }

    /// Finished transfers in completion order.
    pub fn finished(&self) -> &[Transfer] {
        &self.finished
    }

    /// Statistics.
    pub fn stats(&self) -> &DmaStats {
        &self.stats
    }
}

fn check_endpoint(
    endpoint: Endpoint,
    bytes: usize,
    backing: &BackingMemory,
    scratchpad: &Scratchpad,
) -> Result<(), MemoryError> {
    match endpoint {
        Endpoint::Backing(a) => backing.check_range(a.get(), bytes),
        Endpoint::Scratchpad(p) => scratchpad.check_range(p.addr(), bytes),
    }
}

fn read_endpoint(
    endpoint: Endpoint,
    address: u64,
    buf: &mut [u8],
    backing: &BackingMemory,
    scratchpad: &Scratchpad,
) -> Result<(), MemoryError> {
    match endpoint {
        Endpoint::Backing(_) => backing.read_bytes(address, buf),
        Endpoint::Scratchpad(_) => scratchpad.read_bytes(address, buf),
    }
}

fn write_endpoint(
    endpoint: Endpoint,
    address: u64,
    data: &[u8],
    backing: &mut BackingMemory,
    scratchpad: &mut Scratchpad,
) -> Result<(), MemoryError> {
    match endpoint {
        Endpoint::Backing(_) => backing.write_bytes(address, data),
        Endpoint::Scratchpad(_) => scratchpad.write_bytes(address, data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(words: &[i32]) -> (BackingMemory, Scratchpad, Endpoint, Endpoint) {
        let mut backing = BackingMemory::new();
        let src = backing.place_words("src", words).unwrap();
        let mut spm = Scratchpad::new(4096, 0xA5);
        let dst = spm.allocate(words.len() * 4).unwrap();
        (backing, spm, Endpoint::from(dst), Endpoint::from(src))
    }

    #[test]
    fn test_copy_completes_after_enough_cycles() {
        let words: Vec<i32> = (0..64).collect(); // 256 bytes
        let (mut backing, mut spm, dst, src) = setup(&words);
        let mut dma = TransferEngine::new(64);
        let core = CoreId::LEADER;

        let id = dma.start_copy(core, dst, src, 256, &backing, &spm, 0).unwrap();
        assert_eq!(dma.outstanding(core), 1);

        for cycle in 1..=3 {
            assert!(dma.step(&mut backing, &mut spm, cycle).unwrap().is_empty());
            assert!(!dma.all_complete(core));
        }
        let done = dma.step(&mut backing, &mut spm, 4).unwrap();
        assert_eq!(done.as_slice(), &[Completion { id, core, cycle: 4 }]);
        assert!(dma.all_complete(core));
        assert!(dma.is_idle());

        assert_eq!(spm.read_words(dst.address(), 64).unwrap(), words);
        assert_eq!(dma.stats().busy_cycles, 4);
    }

    #[test]
    fn test_partial_copy_is_visible_before_completion() {
        let words: Vec<i32> = (100..132).collect(); // 128 bytes
        let (mut backing, mut spm, dst, src) = setup(&words);
        let mut dma = TransferEngine::new(64);

        dma.start_copy(CoreId::LEADER, dst, src, 128, &backing, &spm, 0).unwrap();
        dma.step(&mut backing, &mut spm, 1).unwrap();

        let seen = spm.read_words(dst.address(), 32).unwrap();
        assert_eq!(&seen[..16], &words[..16]);
        // Not yet copied: still poison
        assert!(seen[16..].iter().all(|&w| w == 0xA5A5_A5A5u32 as i32));
    }

    #[test]
    fn test_multiple_outstanding_copies_in_order() {
        let mut backing = BackingMemory::new();
        let a = backing.place_words("a", &[1; 8]).unwrap();
        let z = backing.reserve("z", 32).unwrap();
        let mut spm = Scratchpad::new(1024, 0xFF);
        let da = spm.allocate(32).unwrap();
        let db = spm.allocate(32).unwrap();
        let mut dma = TransferEngine::new(48);
        let core = CoreId::LEADER;

        let t0 = dma.start_copy(core, da.into(), a.into(), 32, &backing, &spm, 0).unwrap();
        let t1 = dma.start_copy(core, db.into(), z.into(), 32, &backing, &spm, 0).unwrap();
        assert_eq!(dma.outstanding(core), 2);

        // 48 bytes: all of t0 and half of t1
        let done = dma.step(&mut backing, &mut spm, 1).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, t0);
        assert_eq!(dma.transfer(t1).map(Transfer::state), Some(TransferState::Active));

        let done = dma.step(&mut backing, &mut spm, 2).unwrap();
        assert_eq!(done[0].id, t1);
        assert!(dma.all_complete(core));
        assert_eq!(spm.read_words(db.addr(), 8).unwrap(), vec![0; 8]);
    }

    #[test]
    fn test_outstanding_is_per_core() {
        let (backing, spm, dst, src) = setup(&[1, 2]);
        let mut dma = TransferEngine::default();

        dma.start_copy(CoreId::new(2), dst, src, 8, &backing, &spm, 0).unwrap();
        assert!(dma.all_complete(CoreId::LEADER));
        assert!(!dma.all_complete(CoreId::new(2)));
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let (backing, spm, dst, src) = setup(&[1, 2]);
        let mut dma = TransferEngine::default();

        assert_eq!(
            dma.start_copy(CoreId::LEADER, dst, src, 0, &backing, &spm, 0),
            Err(DmaError::EmptyTransfer)
        );
        assert!(matches!(
            dma.start_copy(CoreId::LEADER, dst, src, 1 << 20, &backing, &spm, 0),
            Err(DmaError::AddressOutOfBounds(_))
        ));
        assert!(dma.is_idle());
    }
}
