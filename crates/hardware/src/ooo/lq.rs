//! Load queue: in-flight loads, their L1D-miss-time predictor
//! snapshot, and the `went_offchip` outcome used to train the off-chip
//! predictor when the load retires.

use crate::common::PhysAddr;
use crate::predictor::PredictionSnapshot;

/// One in-flight load.
#[derive(Debug, Clone)]
pub struct LqEntry {
    /// ROB index of the owning instruction.
    pub rob_index: usize,
    /// Load's physical address.
    pub paddr: PhysAddr,
    /// Set once the load's data has returned.
    pub completed: bool,
    /// The off-chip predictor's snapshot at L1D-miss time, if this
    /// load missed in L1D. `None` for an L1D hit (no prediction made).
    pub offchip_snapshot: Option<PredictionSnapshot>,
    /// Whether this load was ultimately served by DRAM. Compared
    /// against `offchip_snapshot` to train the predictor at retirement.
    pub went_offchip: bool,
    /// SQ index this load forwarded from, if store-to-load forwarding
    /// resolved it at dispatch instead of issuing an L1D access.
    pub producer_id: Option<usize>,
}

/// Fixed-capacity load queue.
pub struct LoadQueue {
    entries: Vec<Option<LqEntry>>,
    head: usize,
    tail: usize,
    len: usize,
    capacity: usize,
}

impl LoadQueue {
    /// Creates an empty load queue of `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            entries,
            head: 0,
            tail: 0,
            len: 0,
            capacity,
        }
    }

    /// Whether the queue has no free slots.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Allocates a new entry, returning its LQ index.
    pub fn allocate(&mut self, entry: LqEntry) -> usize {
        assert!(!self.is_full(), "allocate into a full load queue");
        let idx = self.tail;
        self.entries[idx] = Some(entry);
        self.tail = (self.tail + 1) % self.capacity;
        self.len += 1;
        idx
    }

    /// Mutable access to an in-flight entry, for recording the
    /// predictor snapshot taken at L1D-miss time.
    pub fn entry_mut(&mut self, idx: usize) -> Option<&mut LqEntry> {
        self.entries.get_mut(idx).and_then(Option::as_mut)
    }

    /// Marks `idx` complete and records its off-chip outcome.
    pub fn complete(&mut self, idx: usize, went_offchip: bool) {
        if let Some(entry) = self.entries[idx].as_mut() {
            entry.completed = true;
            entry.went_offchip = went_offchip;
        }
    }

    /// Drains the head entry once its owning load has retired,
    /// returning it so the predictor can be trained.
    pub fn retire_head(&mut self) -> Option<LqEntry> {
        let ready = self.entries[self.head].as_ref().is_some_and(|e| e.completed);
        if !ready {
            return None;
        }
        let entry = self.entries[self.head].take();
        self.head = (self.head + 1) % self.capacity;
        self.len -= 1;
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retire_waits_for_completion() {
        let mut lq = LoadQueue::new(2);
        let idx = lq.allocate(LqEntry {
            rob_index: 0,
            paddr: PhysAddr::new(0x1000),
            completed: false,
            offchip_snapshot: None,
            went_offchip: false,
            producer_id: None,
        });
        assert!(lq.retire_head().is_none());
        lq.complete(idx, true);
        let entry = lq.retire_head().unwrap();
        assert!(entry.went_offchip);
    }
}
