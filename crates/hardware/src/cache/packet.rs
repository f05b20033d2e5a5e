//! The in-flight request packet and its fill-path stack.
//!
//! `Packet` is the single most load-bearing data structure in the
//! simulator: every read, write, and prefetch that crosses a cache
//! boundary is represented by one, threaded through the hierarchy by
//! its `fill_path`. Caches are identified by `CacheId` (a small integer
//! resolved against the `Simulator`'s cache arena) rather than by
//! pointer, so packets are plain, cloneable data with no lifetime tied
//! to the hierarchy that produced them.

use crate::common::{BlockAddr, PhysAddr, SimError, VirtAddr};
use crate::common::error::PacketId;
use crate::config::FillLevel;

/// Identifies one cache instance in the simulator's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheId(pub u8);

/// The kind of memory operation a packet represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    /// A demand load.
    Load,
    /// A read-for-ownership (store miss).
    Rfo,
    /// A hardware prefetch.
    Prefetch,
    /// A dirty-line writeback.
    Writeback,
}

impl PacketType {
    /// Whether this packet type may be coalesced with another of the
    /// same block address and route bucket when it is a pure demand.
    #[must_use]
    pub const fn is_demand(self) -> bool {
        matches!(self, Self::Load | Self::Rfo)
    }
}

/// One entry in a packet's fill-path stack: the identity of a cache
/// that reserved an MSHR for this request and must be notified when
/// the request returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillPathEntry {
    /// The reserving cache.
    pub cache: CacheId,
    /// That cache's fill level, used to keep the stack ordered.
    pub fill_level: FillLevel,
    /// Owning CPU (all non-LLC entries must match the packet's `cpu_id`).
    pub cpu: u8,
}

/// Ordered stack of caches a returning packet must notify.
///
/// Entries are kept ordered from shallowest (index 0) to deepest
/// (the last-pushed entry, the "top" of the stack in the sense that it
/// is the next entry popped). A cache's `return_data` pops its own
/// entry off this stack — the deepest (most recently reserved) cache
/// finishes first, because it is the one that actually touched the
/// terminal memory and can immediately notify the cache above it.
///
/// See `DESIGN.md` for why this ordering was chosen over the literal
/// "bottom = deepest" phrasing of the design notes: it is the reading
/// that keeps `push`'s ordering precondition, the invariant that the
/// stack is strictly ordered by fill level, and the §4.6 "push
/// shallowest first, deepest last" propagation order all consistent
/// with each other.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FillPath(Vec<FillPathEntry>);

impl FillPath {
    /// An empty fill path.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of caches still waiting to be notified.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The next cache to be notified on return, if any.
    #[must_use]
    pub fn top(&self) -> Option<&FillPathEntry> {
        self.0.last()
    }

    /// Pushes a cache onto the fill path.
    ///
    /// # Errors
    ///
    /// Returns `SimError::FillPathOutOfOrder` if the stack is
    /// non-empty and `entry.fill_level` is not strictly deeper than
    /// the current top (invariant P1).
    pub fn push(&mut self, entry: FillPathEntry, id: PacketId) -> Result<(), SimError> {
        if let Some(top) = self.0.last() {
            if entry.fill_level <= top.fill_level {
                return Err(SimError::FillPathOutOfOrder(id));
            }
        }
        self.0.push(entry);
        Ok(())
    }

    /// Pops the topmost (deepest) cache off the stack.
    ///
    /// # Errors
    ///
    /// Returns `SimError::FillPathPopEmpty` if the stack is empty.
    pub fn pop(&mut self, id: PacketId) -> Result<FillPathEntry, SimError> {
        self.0.pop().ok_or(SimError::FillPathPopEmpty(id))
    }

    /// Pops entries while `pred(stack)` is false, stopping at an empty
    /// stack or the first point where `pred` returns true.
    ///
    /// This preserves the source's inverted "until" convention
    /// verbatim (see `SPEC_FULL.md` §9): a typical `pop_until` would
    /// read "pop until predicate holds", but here the predicate must
    /// return `false` to *continue* popping.
    pub fn pop_fill_path_until(&mut self, pred: impl Fn(&[FillPathEntry]) -> bool) {
        while !pred(&self.0) {
            if self.0.pop().is_none() {
                break;
            }
        }
    }

    /// Set-unions `other` into `self`, rejecting duplicate identities
    /// and duplicate fill levels within the same CPU (invariant P3),
    /// and re-sorts the result shallowest-to-deepest. `modified` is
    /// set if the resulting stack differs from `self`'s original.
    ///
    /// # Errors
    ///
    /// Returns `SimError::FillPathMergeMismatch` if a non-LLC entry in
    /// `other` belongs to a different CPU than `self`'s existing
    /// entries imply, or if merging would place two distinct caches at
    /// the same fill level for the same CPU.
    pub fn merge(&mut self, other: &Self, id: PacketId) -> Result<bool, SimError> {
        let original = self.0.clone();
        for candidate in &other.0 {
            if self.0.contains(candidate) {
                continue;
            }
            let clashes = self.0.iter().any(|e| {
                e.fill_level == candidate.fill_level
                    && e.cpu == candidate.cpu
                    && e.cache != candidate.cache
                    && candidate.fill_level != FillLevel::Llc
            });
            if clashes {
                return Err(SimError::FillPathMergeMismatch(id));
            }
            self.0.push(*candidate);
        }
        self.0.sort_by_key(|e| e.fill_level);
        Ok(self.0 != original)
    }
}

/// The universal in-flight memory request.
#[derive(Clone, Debug)]
pub struct Packet {
    /// Kind of memory operation.
    pub packet_type: PacketType,
    /// Owning CPU.
    pub cpu_id: u8,
    /// Virtual address of the access.
    pub vaddr: VirtAddr,
    /// Physical address of the access (post-translation).
    pub paddr: PhysAddr,
    /// Cache-block address derived from `paddr`.
    pub block_addr: BlockAddr,
    /// Access size in bytes.
    pub size: u16,
    /// Instruction pointer of the originating instruction.
    pub ip: u64,
    /// Cycle at or after which this packet is next eligible to act.
    pub event_cycle: u64,
    /// Highest level this request must ultimately refill.
    pub fill_level: FillLevel,
    /// Fill level of the prefetcher that originated this request, if any.
    pub pf_origin_level: Option<FillLevel>,
    /// Ordered stack of caches to notify on return.
    pub fill_path: FillPath,
    /// Whether the off-chip predictor forecast DRAM for this packet.
    pub went_offchip_pred: bool,
    /// Whether an L1D-miss prediction was actually consumed (gates training).
    pub l1d_offchip_pred_used: bool,
    /// The L1D-miss-time prediction, frozen for comparison against the outcome.
    pub l1d_miss_offchip_pred: bool,
    /// True once this packet has actually been served by DRAM.
    pub went_offchip: bool,
    /// LQ indices of other instructions coalesced into this packet.
    pub lq_index_depend_on_me: Vec<usize>,
    /// SQ indices of other instructions coalesced into this packet.
    pub sq_index_depend_on_me: Vec<usize>,
    /// ROB indices of other instructions coalesced into this packet.
    pub rob_index_depend_on_me: Vec<usize>,
    /// Tagged `fill_ddrp`: a speculative request whose reply is
    /// discarded at DRAM rather than refilling any cache.
    pub is_ddrp: bool,
}

impl Packet {
    /// Constructs a demand packet at the point it is about to be
    /// admitted to the first cache's queue.
    #[must_use]
    pub fn new(
        packet_type: PacketType,
        cpu_id: u8,
        vaddr: VirtAddr,
        paddr: PhysAddr,
        ip: u64,
        fill_level: FillLevel,
        now: u64,
    ) -> Self {
        Self {
            packet_type,
            cpu_id,
            vaddr,
            paddr,
            block_addr: paddr.block(),
            size: 64,
            ip,
            event_cycle: now,
            fill_level,
            pf_origin_level: None,
            fill_path: FillPath::new(),
            went_offchip_pred: false,
            l1d_offchip_pred_used: false,
            l1d_miss_offchip_pred: false,
            went_offchip: false,
            lq_index_depend_on_me: Vec::new(),
            sq_index_depend_on_me: Vec::new(),
            rob_index_depend_on_me: Vec::new(),
            is_ddrp: false,
        }
    }

    /// The `(cpu, block_addr)` identity used for MSHR/queue coalescing.
    #[must_use]
    pub fn coalesce_key(&self) -> (u8, u64) {
        (self.cpu_id, self.block_addr.val())
    }

    /// Identifies this packet for an error message (see `SimError`).
    #[must_use]
    pub fn id(&self) -> PacketId {
        PacketId {
            cpu: self.cpu_id,
            block_addr: self.block_addr.val(),
            fill_level: self.fill_level,
        }
    }

    /// The "route bucket" used by queue duplicate detection: a DDRP
    /// request and a normal request to the same block must never be
    /// coalesced by an upstream queue, so they are placed in distinct
    /// buckets even when their block address and CPU match.
    #[must_use]
    pub fn route_bucket(&self) -> RouteBucket {
        if self.is_ddrp {
            RouteBucket::DramDirect
        } else if self.fill_level == FillLevel::Llc {
            RouteBucket::ViaL2c
        } else {
            RouteBucket::Invalid
        }
    }
}

/// Distinguishes DDRP-direct traffic from normal hierarchy traffic so
/// queue coalescing never merges the two (see `SPEC_FULL.md` §4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteBucket {
    /// Travels the normal L1→L2→LLC path.
    ViaL2c,
    /// A speculative DDRP request injected directly into the DRAM RQ.
    DramDirect,
    /// Neither of the above (e.g. a writeback).
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(cache: u8, level: FillLevel, cpu: u8) -> FillPathEntry {
        FillPathEntry {
            cache: CacheId(cache),
            fill_level: level,
            cpu,
        }
    }

    fn pid() -> PacketId {
        PacketId {
            cpu: 0,
            block_addr: 0,
            fill_level: FillLevel::L1,
        }
    }

    #[test]
    fn push_enforces_strictly_deeper_order() {
        let mut fp = FillPath::new();
        fp.push(entry(0, FillLevel::L1, 0), pid()).unwrap();
        fp.push(entry(1, FillLevel::L2, 0), pid()).unwrap();
        fp.push(entry(2, FillLevel::Llc, 0), pid()).unwrap();
        assert_eq!(fp.len(), 3);
        assert_eq!(fp.top().unwrap().cache, CacheId(2));

        let mut bad = FillPath::new();
        bad.push(entry(0, FillLevel::Llc, 0), pid()).unwrap();
        let err = bad.push(entry(1, FillLevel::L1, 0), pid());
        assert!(err.is_err());
    }

    #[test]
    fn pop_from_empty_is_fatal() {
        let mut fp = FillPath::new();
        assert!(fp.pop(pid()).is_err());
    }

    #[test]
    fn merge_unions_and_reports_modification() {
        // S6: A = [L1D_0, L2C_0, LLC] (shallow to deep), B = [L2C_0, LLC]
        let mut a = FillPath::new();
        a.push(entry(0, FillLevel::L1, 0), pid()).unwrap();
        a.push(entry(1, FillLevel::L2, 0), pid()).unwrap();
        a.push(entry(2, FillLevel::Llc, 0), pid()).unwrap();

        let mut b = FillPath::new();
        b.push(entry(1, FillLevel::L2, 0), pid()).unwrap();
        b.push(entry(2, FillLevel::Llc, 0), pid()).unwrap();

        let modified_a = a.clone().merge(&b, pid()).unwrap();
        assert!(!modified_a);

        let modified_b = b.merge(&a, pid()).unwrap();
        assert!(modified_b);
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn pop_until_stops_at_predicate_true() {
        let mut fp = FillPath::new();
        fp.push(entry(0, FillLevel::L1, 0), pid()).unwrap();
        fp.push(entry(1, FillLevel::L2, 0), pid()).unwrap();
        fp.push(entry(2, FillLevel::Llc, 0), pid()).unwrap();

        fp.pop_fill_path_until(|stack| stack.len() <= 1);
        assert_eq!(fp.len(), 1);
    }
}
