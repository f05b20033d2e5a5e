//! Fill-path policy: decides, for a cache miss, which queue the
//! request travels to next, and is the point where a speculative DDRP
//! request gets injected alongside a genuine demand miss (§4.5, §4.6).

use crate::cache::packet::{CacheId, FillPathEntry, Packet, PacketType};
use crate::cache::queue::RingQueue;
use crate::common::SimError;
use crate::config::FillLevel;

/// Where a propagated miss is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// L1D miss travels to L2C, then LLC, then DRAM — the ordinary path.
    SdcL2cDram,
    /// A miss that bypasses the mid-level cache straight to the LLC
    /// (used for accesses already known to target the LLC's fill
    /// level, e.g. a writeback).
    L1dLlc,
    /// A speculative DDRP request injected directly into the DRAM RQ,
    /// bypassing every intervening cache queue.
    DramDdrpRequest,
}

/// Outcome of attempting to propagate a miss.
#[derive(Debug)]
pub enum Propagate {
    /// The miss was pushed onto the target queue.
    Continued,
    /// The target queue had no room; carries the packet back so the
    /// caller can hold it and retry next cycle instead of losing it.
    Blocked(Packet),
}

/// Stateless routing decisions plus the DDRP-injection helper. Caches
/// call into this rather than hardcoding "my next level is X" so the
/// hierarchy's shape lives in one place.
pub struct FillPathPolicy;

impl FillPathPolicy {
    /// Picks a packet's route given its originating fill level and
    /// whether the off-chip predictor has already forecast DRAM.
    #[must_use]
    pub fn route_for(packet: &Packet) -> Route {
        if packet.is_ddrp {
            return Route::DramDdrpRequest;
        }
        match packet.fill_level {
            FillLevel::L1 => Route::SdcL2cDram,
            _ => Route::L1dLlc,
        }
    }

    /// Pushes `cache`'s identity onto `packet`'s fill path before
    /// handing it to the next level, in the shallowest-first order
    /// §4.6 requires (the cache doing the pushing is always shallower
    /// than anything already on the path).
    pub fn push_notifier(packet: &mut Packet, cache: CacheId, fill_level: FillLevel) -> Result<(), SimError> {
        let id = packet.id();
        packet.fill_path.push(
            FillPathEntry {
                cache,
                fill_level,
                cpu: packet.cpu_id,
            },
            id,
        )
    }

    /// Builds the speculative DDRP companion to a predicted-off-chip
    /// L1D miss: a same-address prefetch tagged `is_ddrp`, carrying no
    /// fill path of its own (its reply is discarded, not installed —
    /// §4.5), issued directly to DRAM.
    #[must_use]
    pub fn build_ddrp_request(source: &Packet, ddrp_latency: u64, now: u64) -> Packet {
        let mut ddrp = source.clone();
        ddrp.packet_type = PacketType::Prefetch;
        ddrp.is_ddrp = true;
        ddrp.fill_path = crate::cache::packet::FillPath::new();
        ddrp.fill_level = FillLevel::Ddrp;
        ddrp.event_cycle = now + ddrp_latency;
        ddrp
    }

    /// Admits `packet` to `queue` if there is room. This is the point
    /// §7 puts the back-pressure check: a full target queue is
    /// ordinary, recoverable contention, not a reason to allocate into
    /// it or to drop the packet.
    pub fn propagate_miss(queue: &mut RingQueue, packet: Packet, now: u64) -> Propagate {
        if queue.is_full() {
            return Propagate::Blocked(packet);
        }
        let _ = queue.add(packet, 0, now);
        Propagate::Continued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PhysAddr, VirtAddr};

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
    fn l1_miss_routes_through_l2_to_dram() {
        assert_eq!(FillPathPolicy::route_for(&load(0x1000)), Route::SdcL2cDram);
    }

    #[test]
    fn ddrp_request_carries_no_fill_path() {
        let source = load(0x1000);
        let ddrp = FillPathPolicy::build_ddrp_request(&source, 5, 100);
        assert!(ddrp.is_ddrp);
        assert!(ddrp.fill_path.is_empty());
        assert_eq!(ddrp.event_cycle, 105);
        assert_eq!(FillPathPolicy::route_for(&ddrp), Route::DramDdrpRequest);
    }
}
