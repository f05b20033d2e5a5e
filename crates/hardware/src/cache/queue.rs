//! Bounded ring-buffer queues (RQ/WQ/PQ/processed) with event-cycle
//! scheduling.
//!
//! Admission is back-pressure, not an error: a full queue returns
//! `Admit::Blocked` and the caller retries next cycle (§7).

use crate::cache::packet::Packet;

/// Result of attempting to admit a packet to a queue.
#[derive(Debug)]
pub enum Admit {
    /// The packet was written into the queue.
    Accepted,
    /// No free slot; the caller must retry next cycle. Not an error.
    Blocked,
}

/// A bounded ring buffer of in-flight packets.
#[derive(Debug)]
pub struct RingQueue {
    slots: Vec<Option<Packet>>,
    head: usize,
    tail: usize,
    len: usize,
    capacity: usize,
}

impl RingQueue {
    /// Creates an empty queue of the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            tail: 0,
            len: 0,
            capacity,
        }
    }

    /// Current occupancy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the queue holds no packets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the queue has no free slots.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Canonical duplicate test: two packets coalesce iff they share a
    /// block address, CPU, and route bucket. The route bucket keeps a
    /// DDRP request from coalescing with a normal request to the same
    /// block.
    #[must_use]
    pub fn check(&self, packet: &Packet) -> Option<usize> {
        let key = packet.coalesce_key();
        let bucket = packet.route_bucket();
        self.iter_occupied().find_map(|(idx, p)| {
            (p.coalesce_key() == key && p.route_bucket() == bucket).then_some(idx)
        })
    }

    /// Admits `packet`, scheduling it `latency` cycles from `now` (or
    /// from its current `event_cycle`, whichever is later).
    pub fn add(&mut self, mut packet: Packet, latency: u64, now: u64) -> Admit {
        if self.is_full() {
            return Admit::Blocked;
        }
        packet.event_cycle = packet.event_cycle.max(now) + latency;
        self.slots[self.tail] = Some(packet);
        self.tail = (self.tail + 1) % self.capacity;
        self.len += 1;
        Admit::Accepted
    }

    /// Removes and returns the head entry, if the queue is non-empty
    /// and the head's `event_cycle` has arrived.
    pub fn remove_head(&mut self, now: u64) -> Option<Packet> {
        if self.is_empty() {
            return None;
        }
        let ready = self.slots[self.head]
            .as_ref()
            .is_some_and(|p| p.event_cycle <= now);
        if !ready {
            return None;
        }
        let packet = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity;
        self.len -= 1;
        packet
    }

    /// Peeks the head entry without removing it.
    #[must_use]
    pub fn peek_head(&self) -> Option<&Packet> {
        self.slots[self.head].as_ref()
    }

    /// Mutable access to the occupied slot at `idx`, as returned by
    /// `check` or `find_matching_block`.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Packet> {
        self.slots[idx].as_mut()
    }

    /// Finds an entry matching `packet`'s `(cpu, block_addr)` regardless
    /// of route bucket. `check` alone can't see a DDRP request and the
    /// demand that follows it to the same block as related, since they
    /// sit in different buckets by design — this is for the DRAM RQ
    /// overlay merge (§4.5), which needs to find that DDRP entry.
    #[must_use]
    pub fn find_matching_block(&self, packet: &Packet) -> Option<usize> {
        let key = packet.coalesce_key();
        self.iter_occupied().find_map(|(idx, p)| (p.coalesce_key() == key).then_some(idx))
    }

    fn iter_occupied(&self) -> impl Iterator<Item = (usize, &Packet)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|p| (i, p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PhysAddr, VirtAddr};
    use crate::config::FillLevel;
    use crate::cache::packet::PacketType;

    fn load(addr: u64) -> Packet {
        Packet::new(
            PacketType::Load,
            0,
            VirtAddr::new(addr),
            PhysAddr::new(addr),
            0,
            FillLevel::L1,
            0,
        )
    }

    #[test]
    fn full_queue_blocks() {
        let mut q = RingQueue::new(1);
        assert!(matches!(q.add(load(0x1000), 1, 0), Admit::Accepted));
        assert!(matches!(q.add(load(0x2000), 1, 0), Admit::Blocked));
    }

    #[test]
    fn head_waits_for_event_cycle() {
        let mut q = RingQueue::new(2);
        let _ = q.add(load(0x1000), 5, 0);
        assert!(q.remove_head(0).is_none());
        assert!(q.remove_head(5).is_some());
    }
}
