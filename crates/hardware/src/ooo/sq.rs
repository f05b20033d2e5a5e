//! Store queue: in-flight stores, used for store-to-load forwarding
//! and to hold a store's data until it retires and drains to the L1D
//! write queue.

use crate::common::PhysAddr;

/// One in-flight store.
#[derive(Debug, Clone)]
pub struct SqEntry {
    /// ROB index of the owning instruction.
    pub rob_index: usize,
    /// Store's physical address.
    pub paddr: PhysAddr,
    /// Whether the address has been resolved (stores execute before
    /// address generation completes, in program order on the SQ).
    pub address_ready: bool,
}

/// Fixed-capacity, program-order store queue.
pub struct StoreQueue {
    entries: Vec<Option<SqEntry>>,
    head: usize,
    tail: usize,
    len: usize,
    capacity: usize,
}

impl StoreQueue {
    /// Creates an empty store queue of `capacity` entries.
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

    /// Index a new allocation would land at. `find_forwarding_source`
    /// searches backwards from here, so this is what a load dispatching
    /// this cycle (before its own store, if any, allocates) should pass
    /// as `before_idx`.
    #[must_use]
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Allocates a new entry, returning its SQ index.
    pub fn allocate(&mut self, entry: SqEntry) -> usize {
        assert!(!self.is_full(), "allocate into a full store queue");
        let idx = self.tail;
        self.entries[idx] = Some(entry);
        self.tail = (self.tail + 1) % self.capacity;
        self.len += 1;
        idx
    }

    /// Mutable access to an in-flight entry.
    pub fn entry_mut(&mut self, idx: usize) -> Option<&mut SqEntry> {
        self.entries.get_mut(idx).and_then(Option::as_mut)
    }

    /// Searches entries older than `before_idx` (in allocation order)
    /// for one whose address matches `paddr`, for store-to-load
    /// forwarding. Returns the SQ index of the most recent match.
    #[must_use]
    pub fn find_forwarding_source(&self, paddr: PhysAddr, before_idx: usize) -> Option<usize> {
        let mut idx = before_idx;
        for _ in 0..self.capacity {
            idx = (idx + self.capacity - 1) % self.capacity;
            if idx == self.tail {
                break;
            }
            if let Some(entry) = &self.entries[idx] {
                if entry.address_ready && entry.paddr == paddr {
                    return Some(idx);
                }
            }
        }
        None
    }

    /// Drains the head entry once its owning store has retired.
    pub fn retire_head(&mut self) -> Option<SqEntry> {
        let entry = self.entries[self.head].take();
        if entry.is_some() {
            self.head = (self.head + 1) % self.capacity;
            self.len -= 1;
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_from_the_most_recent_matching_store() {
        let mut sq = StoreQueue::new(4);
        let a = sq.allocate(SqEntry {
            rob_index: 0,
            paddr: PhysAddr::new(0x1000),
            address_ready: true,
        });
        let _b = sq.allocate(SqEntry {
            rob_index: 1,
            paddr: PhysAddr::new(0x2000),
            address_ready: true,
        });
        let c = sq.allocate(SqEntry {
            rob_index: 2,
            paddr: PhysAddr::new(0x1000),
            address_ready: true,
        });

        let found = sq.find_forwarding_source(PhysAddr::new(0x1000), sq.tail);
        assert_eq!(found, Some(c));
        let _ = a;
    }
}
