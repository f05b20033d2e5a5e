//! Miss Status Holding Register (MSHR) table.
//!
//! Each cache owns one fixed-capacity `MshrTable`. A miss allocates an
//! entry; a second miss to the same block coalesces into the existing
//! entry instead of allocating a new one (invariant M1).

use tracing::trace;

use crate::cache::packet::{Packet, PacketType};
use crate::common::SimError;
use crate::config::FillLevel;

/// Lifecycle state of one MSHR entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MshrState {
    /// Slot unused.
    Invalid,
    /// Miss outstanding, waiting on a lower memory.
    Inflight,
    /// Lower memory has returned data; awaiting drain into the cache array.
    Completed,
}

/// One MSHR slot.
#[derive(Clone, Debug)]
pub struct MshrEntry {
    /// Current lifecycle state.
    pub state: MshrState,
    /// The (possibly merged) packet this entry is servicing.
    pub packet: Packet,
}

/// Outcome of `MshrTable::allocate`.
#[derive(Debug)]
pub enum AllocateOutcome {
    /// A fresh entry was allocated at this index.
    Allocated(usize),
    /// The packet coalesced into the existing entry at this index.
    Coalesced(usize),
    /// This cache's fill level does not admit this packet; the caller
    /// should route it elsewhere rather than allocate here.
    NotEligible,
}

/// Per-cache table of in-flight misses.
#[derive(Debug)]
pub struct MshrTable {
    entries: Vec<MshrEntry>,
    capacity: usize,
    this_fill_level: FillLevel,
}

impl MshrTable {
    /// Creates an empty table of the given capacity for a cache at
    /// `this_fill_level`.
    #[must_use]
    pub fn new(capacity: usize, this_fill_level: FillLevel) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            this_fill_level,
        }
    }

    /// Whether the table has no free slots.
    #[must_use]
    pub fn full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Finds the entry matching `packet`'s `(cpu, block_addr)`, if any.
    #[must_use]
    pub fn find(&self, packet: &Packet) -> Option<usize> {
        let key = packet.coalesce_key();
        self.entries
            .iter()
            .position(|e| e.state != MshrState::Invalid && e.packet.coalesce_key() == key)
    }

    /// Allocates or coalesces `packet`.
    ///
    /// # Errors
    ///
    /// Returns `SimError::MshrFullNoCoalesce` if the table is full and
    /// no existing entry coalesces with `packet` — this indicates the
    /// caller failed to check `full()` before calling (a simulator
    /// bug, not ordinary back-pressure).
    pub fn allocate(&mut self, packet: Packet) -> Result<AllocateOutcome, SimError> {
        if packet.fill_level > self.this_fill_level && self.this_fill_level != FillLevel::Llc {
            return Ok(AllocateOutcome::NotEligible);
        }

        if let Some(idx) = self.find(&packet) {
            match packet.packet_type {
                PacketType::Writeback => self.merge_on_writeback(packet, idx)?,
                PacketType::Prefetch => self.merge_on_prefetch(packet, idx)?,
                PacketType::Load | PacketType::Rfo => self.merge_on_read(packet, idx)?,
            }
            return Ok(AllocateOutcome::Coalesced(idx));
        }

        if self.full() {
            return Err(SimError::MshrFullNoCoalesce(packet.id()));
        }

        self.entries.push(MshrEntry {
            state: MshrState::Inflight,
            packet,
        });
        Ok(AllocateOutcome::Allocated(self.entries.len() - 1))
    }

    /// Accumulates dependent-set bookkeeping and merges fill paths for
    /// a read/RFO coalescing into an existing entry. A demand's
    /// context replaces a prefetch's (a demand cannot be dropped),
    /// but the prefetch's timing and fill-path state are preserved.
    fn merge_on_read(&mut self, src: Packet, dst_idx: usize) -> Result<(), SimError> {
        let was_prefetch = self.entries[dst_idx].packet.packet_type == PacketType::Prefetch;
        let dst = &mut self.entries[dst_idx].packet;

        dst.lq_index_depend_on_me
            .extend(src.lq_index_depend_on_me.iter().copied());
        dst.sq_index_depend_on_me
            .extend(src.sq_index_depend_on_me.iter().copied());
        dst.rob_index_depend_on_me
            .extend(src.rob_index_depend_on_me.iter().copied());

        if src.fill_level < dst.fill_level {
            dst.fill_level = src.fill_level;
        }

        let modified = dst.fill_path.merge(&src.fill_path, dst.id())?;
        if was_prefetch && src.packet_type != PacketType::Prefetch {
            // The demand's identity and type supersede the prefetch's;
            // preserve the prefetch's in-flight timing and fill path.
            let preserved_fill_path = dst.fill_path.clone();
            let preserved_event_cycle = dst.event_cycle;
            let preserved_pf_origin = dst.pf_origin_level;
            *dst = src;
            dst.fill_path = preserved_fill_path;
            dst.event_cycle = preserved_event_cycle;
            dst.pf_origin_level = preserved_pf_origin;
        }
        trace!(cache_level = ?self.this_fill_level, modified, "merge_on_read");
        Ok(())
    }

    /// Same as `merge_on_read` but without dependent-set accumulation
    /// (writebacks have no LQ/SQ/ROB dependents).
    fn merge_on_writeback(&mut self, src: Packet, dst_idx: usize) -> Result<(), SimError> {
        let dst = &mut self.entries[dst_idx].packet;
        if src.fill_level < dst.fill_level {
            dst.fill_level = src.fill_level;
        }
        let _modified = dst.fill_path.merge(&src.fill_path, dst.id())?;
        Ok(())
    }

    /// Merges a prefetch into an existing entry, also transmitting the
    /// off-chip-prediction bit downward.
    fn merge_on_prefetch(&mut self, src: Packet, dst_idx: usize) -> Result<(), SimError> {
        let dst = &mut self.entries[dst_idx].packet;
        let _modified = dst.fill_path.merge(&src.fill_path, dst.id())?;
        dst.went_offchip_pred = dst.went_offchip_pred || src.went_offchip_pred;
        Ok(())
    }

    /// Marks the entry matching `packet` as `Completed`, ready to be
    /// drained into the cache array on the next `operate` cycle.
    pub fn complete(&mut self, idx: usize) {
        self.entries[idx].state = MshrState::Completed;
    }

    /// Mutable access to the stored packet at `idx`, for copying
    /// return-time fields (e.g. `went_offchip`) off the packet a lower
    /// memory handed back and onto the one this table will drain.
    pub fn packet_mut(&mut self, idx: usize) -> &mut Packet {
        &mut self.entries[idx].packet
    }

    /// Removes the entry at `idx` once its fill has been installed.
    pub fn release(&mut self, idx: usize) -> MshrEntry {
        self.entries.remove(idx)
    }

    /// Iterates all live entries (for invariant checking and testing).
    pub fn iter(&self) -> impl Iterator<Item = &MshrEntry> {
        self.entries.iter()
    }

    /// Checks invariant M1: no two live entries share `(cpu, block_addr)`.
    #[must_use]
    pub fn check_m1(&self) -> bool {
        for (i, a) in self.entries.iter().enumerate() {
            for b in &self.entries[i + 1..] {
                if a.packet.coalesce_key() == b.packet.coalesce_key() {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PhysAddr, VirtAddr};

    fn load(cpu: u8, addr: u64) -> Packet {
        Packet::new(
            PacketType::Load,
            cpu,
            VirtAddr::new(addr),
            PhysAddr::new(addr),
            0xDEAD,
            FillLevel::L1,
            0,
        )
    }

    #[test]
    fn second_miss_to_same_block_coalesces() {
        let mut mshr = MshrTable::new(4, FillLevel::L1);
        let a = load(0, 0xABC0);
        let b = load(0, 0xABC0);
        let r1 = mshr.allocate(a).unwrap();
        assert!(matches!(r1, AllocateOutcome::Allocated(_)));
        let r2 = mshr.allocate(b).unwrap();
        assert!(matches!(r2, AllocateOutcome::Coalesced(_)));
        assert!(mshr.check_m1());
        assert_eq!(mshr.iter().count(), 1);
    }

    #[test]
    fn full_table_with_no_coalesce_is_fatal() {
        let mut mshr = MshrTable::new(1, FillLevel::L1);
        mshr.allocate(load(0, 0x1000)).unwrap();
        let err = mshr.allocate(load(0, 0x2000));
        assert!(err.is_err());
    }
}
