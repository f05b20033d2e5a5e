//! Sectored set-associative cache, used for every level (L1D, L2C, LLC).
//!
//! A sector groups `sectoring_degree` contiguous blocks under one tag
//! and one replacement slot. The whole sector is "valid" only when
//! every block in it is valid (invariant C1); a partially-valid sector
//! is a miss.

use tracing::{debug, trace};

use crate::cache::mshr::{AllocateOutcome, MshrState, MshrTable};
use crate::cache::packet::{CacheId, FillPathEntry, Packet, PacketType};
use crate::cache::policies::{
    FifoPolicy, LruPolicy, MruPolicy, PlruPolicy, RandomPolicy, ReplacementPolicy,
};
use crate::cache::queue::RingQueue;
use crate::common::{BlockAddr, SimError};
use crate::config::{CacheConfig, CacheType, FillLevel, PrefetcherKind, ReplacementPolicyKind};
use crate::prefetch::{NextLinePrefetcher, Prefetcher, StreamPrefetcher, StridePrefetcher, TaggedPrefetcher};

/// One cache block within a sector.
#[derive(Clone, Copy, Default)]
struct Block {
    valid: bool,
    dirty: bool,
}

/// A tag-sharing group of `sectoring_degree` blocks, plus replacement
/// and prefetch-usefulness bookkeeping.
#[derive(Clone)]
struct Sector {
    tag: u64,
    blocks: Vec<Block>,
    prefetch: bool,
    used: bool,
    served_from: Option<FillLevel>,
}

impl Sector {
    fn empty(sectoring_degree: usize) -> Self {
        Self {
            tag: 0,
            blocks: vec![Block::default(); sectoring_degree],
            prefetch: false,
            used: false,
            served_from: None,
        }
    }

    /// Invariant C1: valid as a whole iff every block is valid.
    fn is_valid(&self) -> bool {
        !self.blocks.is_empty() && self.blocks.iter().all(|b| b.valid)
    }

    fn is_dirty(&self) -> bool {
        self.blocks.iter().any(|b| b.dirty)
    }
}

/// Accounting the cache accumulates for the final stats report.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    /// Total lookups (RQ + WQ + PQ hits and misses).
    pub accesses: u64,
    /// Lookups that hit.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Prefetched lines later used by a demand access.
    pub pf_useful: u64,
    /// Prefetched lines evicted unused.
    pub pf_useless: u64,
    /// Cycles an admission was rejected for MSHR exhaustion.
    pub mshr_stalls: u64,
}

/// A pending writeback or propagated miss the cache produced this
/// cycle, handed back to the caller (the fill-path policy / DRAM).
#[derive(Debug)]
pub enum CacheEvent {
    /// A dirty sector evicted and needing to travel to the next level.
    Writeback(Packet),
    /// A demand or prefetch miss that must be routed onward.
    Miss(Packet),
    /// Data ready to travel up this packet's fill path.
    Return(Packet),
}

/// One cache level: tag/data array, MSHR table, and RQ/WQ/PQ/processed
/// queues.
pub struct SectoredCache {
    id: CacheId,
    name: String,
    cache_type: CacheType,
    fill_level: FillLevel,
    latency: u64,
    sets: usize,
    ways: usize,
    sectoring_degree: usize,
    block_size: usize,
    sectors: Vec<Sector>,
    policy: Box<dyn ReplacementPolicy + Send + Sync>,
    prefetcher: Option<Box<dyn Prefetcher + Send + Sync>>,
    mshr: MshrTable,
    rq: RingQueue,
    wq: RingQueue,
    pq: RingQueue,
    processed: RingQueue,
    max_reads: usize,
    max_writes: usize,
    stats: CacheStats,
}

impl SectoredCache {
    /// Builds a cache level from its configuration.
    #[must_use]
    pub fn new(config: &CacheConfig, id: CacheId) -> Self {
        let sectoring_degree = config.sectoring_degree.max(1);
        let num_sectors = config.sets * config.ways;

        let policy: Box<dyn ReplacementPolicy + Send + Sync> = match config.replacement_policy {
            ReplacementPolicyKind::Fifo => Box::new(FifoPolicy::new(config.sets, config.ways)),
            ReplacementPolicyKind::Random => Box::new(RandomPolicy::new(config.sets, config.ways)),
            ReplacementPolicyKind::Plru => Box::new(PlruPolicy::new(config.sets, config.ways)),
            ReplacementPolicyKind::Lru => Box::new(LruPolicy::new(config.sets, config.ways)),
            ReplacementPolicyKind::Mru => Box::new(MruPolicy::new(config.sets, config.ways)),
        };

        let prefetcher: Option<Box<dyn Prefetcher + Send + Sync>> = match config.prefetcher {
            PrefetcherKind::NextLine => Some(Box::new(NextLinePrefetcher::new(config.block_size, 1))),
            PrefetcherKind::Stride => {
                Some(Box::new(StridePrefetcher::new(config.block_size, 64, 2)))
            }
            PrefetcherKind::Stream => Some(Box::new(StreamPrefetcher::new(config.block_size, 2))),
            PrefetcherKind::Tagged => Some(Box::new(TaggedPrefetcher::new(config.block_size, 2))),
            PrefetcherKind::None => None,
        };

        Self {
            id,
            name: config.name.clone(),
            cache_type: config.cache_type,
            fill_level: config.fill_level,
            latency: config.latency,
            sets: config.sets,
            ways: config.ways,
            sectoring_degree,
            block_size: config.block_size,
            sectors: vec![Sector::empty(sectoring_degree); num_sectors],
            policy,
            prefetcher,
            mshr: MshrTable::new(config.mshr_size, config.fill_level),
            rq: RingQueue::new(config.read_queue_size),
            wq: RingQueue::new(config.write_queue_size),
            pq: RingQueue::new(config.prefetch_queue_size),
            processed: RingQueue::new(config.processed_queue_size),
            max_reads: config.max_reads,
            max_writes: config.max_writes,
            stats: CacheStats::default(),
        }
    }

    /// This cache's identifier in the simulator's arena.
    #[must_use]
    pub fn id(&self) -> CacheId {
        self.id
    }

    /// This cache's fill level.
    #[must_use]
    pub fn fill_level(&self) -> FillLevel {
        self.fill_level
    }

    /// Display name, for logging and the stats report.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// The read queue, exposed for admission by the fill-path policy.
    pub fn read_queue_mut(&mut self) -> &mut RingQueue {
        &mut self.rq
    }

    /// The write queue.
    pub fn write_queue_mut(&mut self) -> &mut RingQueue {
        &mut self.wq
    }

    /// The prefetch queue.
    pub fn prefetch_queue_mut(&mut self) -> &mut RingQueue {
        &mut self.pq
    }

    /// The processed (ready-to-return-to-core) queue.
    pub fn processed_queue_mut(&mut self) -> &mut RingQueue {
        &mut self.processed
    }

    /// Whether this cache's MSHR table has a free slot.
    #[must_use]
    pub fn mshr_has_space(&self) -> bool {
        !self.mshr.full()
    }

    fn decompose(&self, block_addr: BlockAddr) -> (usize, u64) {
        let sector_blocks = self.sectoring_degree as u64;
        let sector_addr = block_addr.val() / (self.block_size as u64 * sector_blocks);
        let set = (sector_addr as usize) % self.sets;
        let tag = sector_addr / self.sets as u64;
        (set, tag)
    }

    fn block_in_sector(&self, block_addr: BlockAddr) -> usize {
        ((block_addr.val() / self.block_size as u64) % self.sectoring_degree as u64) as usize
    }

    /// Looks up `block_addr`. A hit requires a tag match *and* the
    /// whole sector valid (invariant C1): a partially-invalid sector
    /// is a miss.
    #[must_use]
    pub fn lookup(&self, block_addr: BlockAddr) -> Option<(usize, usize)> {
        let (set, tag) = self.decompose(block_addr);
        let base = set * self.ways;
        (0..self.ways).find_map(|way| {
            let sector = &self.sectors[base + way];
            (sector.tag == tag && sector.is_valid()).then_some((set, way))
        })
    }

    /// Installs `packet`'s block, evicting a victim sector if the set
    /// is full. Returns a writeback packet if the victim was dirty.
    fn fill(&mut self, packet: &Packet, now: u64) -> Option<Packet> {
        let (set, tag) = self.decompose(packet.block_addr);
        let base = set * self.ways;

        let way = (0..self.ways).find(|&w| self.sectors[base + w].tag == tag && !self.sectors[base + w].blocks.is_empty())
            .unwrap_or_else(|| self.policy.get_victim(set));

        let victim = &self.sectors[base + way];
        let writeback = (victim.is_dirty() && self.fill_level != FillLevel::Llc).then(|| {
            let mut wb = packet.clone();
            wb.packet_type = PacketType::Writeback;
            wb.event_cycle = now;
            wb
        });

        if victim.is_dirty() {
            if victim.prefetch && !victim.used {
                self.stats.pf_useless += 1;
            } else if victim.prefetch {
                self.stats.pf_useful += 1;
            }
        }

        let block_idx = self.block_in_sector(packet.block_addr);
        let fresh_sector = self.sectors[base + way].tag != tag;
        let sector = &mut self.sectors[base + way];
        if fresh_sector {
            *sector = Sector::empty(self.sectoring_degree);
            sector.tag = tag;
        }
        for block in &mut sector.blocks {
            block.valid = true;
        }
        sector.blocks[block_idx].dirty = packet.packet_type == PacketType::Rfo;
        sector.prefetch = packet.packet_type == PacketType::Prefetch;
        sector.used = false;
        sector.served_from = Some(packet.fill_level);

        self.policy.update(set, way);
        writeback
    }

    /// Per-cycle operate: drain completed MSHRs, then service WQ, RQ,
    /// PQ head-of-line entries under the configured read/write
    /// budgets, in that fixed phase order (§4.4).
    pub fn operate(&mut self, now: u64) -> Result<Vec<CacheEvent>, SimError> {
        let mut events = Vec::new();

        self.drain_completed_mshrs(now, &mut events)?;

        let mut writes_done = 0;
        while writes_done < self.max_writes {
            if !self.service_write_head(now, &mut events)? {
                break;
            }
            writes_done += 1;
        }

        let mut reads_done = 0;
        while reads_done < self.max_reads {
            if !self.service_read_head(now, &mut events)? {
                break;
            }
            reads_done += 1;
        }

        if reads_done < self.max_reads {
            let _ = self.service_prefetch_head(now, &mut events)?;
        }

        Ok(events)
    }

    fn drain_completed_mshrs(&mut self, now: u64, events: &mut Vec<CacheEvent>) -> Result<(), SimError> {
        let completed: Vec<usize> = self
            .mshr
            .iter()
            .enumerate()
            .filter_map(|(i, e)| (e.state == MshrState::Completed).then_some(i))
            .collect();

        for idx in completed.into_iter().rev() {
            let entry = self.mshr.release(idx);
            let mut packet = entry.packet;
            if let Some(wb) = self.fill(&packet, now) {
                events.push(CacheEvent::Writeback(wb));
            }
            self.unwind_return(&mut packet, now, events)?;
        }
        Ok(())
    }

    /// Pops this cache off the packet's fill path and emits a `Return`
    /// event for whatever is now at the top (or nothing, if the path
    /// is now empty — normal completion).
    fn unwind_return(&mut self, packet: &mut Packet, now: u64, events: &mut Vec<CacheEvent>) -> Result<(), SimError> {
        if !packet.fill_path.is_empty() {
            let popped = packet.fill_path.pop(packet.id())?;
            debug!(cache = %self.name, cpu = packet.cpu_id, block = packet.block_addr.val(), notifying = popped.cache.0, "return_data");
        }
        packet.event_cycle = now + self.latency;
        events.push(CacheEvent::Return(packet.clone()));
        Ok(())
    }

    fn service_write_head(&mut self, now: u64, events: &mut Vec<CacheEvent>) -> Result<bool, SimError> {
        let Some(packet) = self.wq.peek_head().cloned() else {
            return Ok(false);
        };
        if packet.event_cycle > now {
            return Ok(false);
        }
        let _ = self.wq.remove_head(now);
        self.stats.accesses += 1;

        if let Some((set, way)) = self.lookup(packet.block_addr) {
            let base = set * self.ways;
            let block_idx = self.block_in_sector(packet.block_addr);
            self.sectors[base + way].blocks[block_idx].dirty = true;
            self.policy.update(set, way);
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            self.try_allocate_and_propagate(packet, now, events)?;
        }
        Ok(true)
    }

    fn service_read_head(&mut self, now: u64, events: &mut Vec<CacheEvent>) -> Result<bool, SimError> {
        let Some(packet) = self.rq.peek_head().cloned() else {
            return Ok(false);
        };
        if packet.event_cycle > now {
            return Ok(false);
        }
        let _ = self.rq.remove_head(now);
        self.stats.accesses += 1;

        if self.lookup(packet.block_addr).is_some() {
            self.stats.hits += 1;
            self.mark_used(packet.block_addr);
            let mut ret = packet;
            self.unwind_return(&mut ret, now, events)?;
        } else {
            self.stats.misses += 1;
            self.try_allocate_and_propagate(packet, now, events)?;
        }
        self.run_prefetcher(now, events);
        Ok(true)
    }

    fn service_prefetch_head(&mut self, now: u64, events: &mut Vec<CacheEvent>) -> Result<bool, SimError> {
        let Some(packet) = self.pq.peek_head().cloned() else {
            return Ok(false);
        };
        if packet.event_cycle > now {
            return Ok(false);
        }
        let _ = self.pq.remove_head(now);
        if self.lookup(packet.block_addr).is_none() {
            self.try_allocate_and_propagate(packet, now, events)?;
        }
        Ok(true)
    }

    fn mark_used(&mut self, block_addr: BlockAddr) {
        if let Some((set, way)) = self.lookup(block_addr) {
            self.sectors[set * self.ways + way].used = true;
        }
    }

    fn try_allocate_and_propagate(&mut self, packet: Packet, now: u64, events: &mut Vec<CacheEvent>) -> Result<(), SimError> {
        if self.mshr.full() && self.mshr.find(&packet).is_none() {
            self.stats.mshr_stalls += 1;
            events.push(CacheEvent::Miss(packet));
            return Ok(());
        }
        match self.mshr.allocate(packet.clone())? {
            AllocateOutcome::Allocated(_) => events.push(CacheEvent::Miss(packet)),
            AllocateOutcome::Coalesced(_) => {}
            AllocateOutcome::NotEligible => events.push(CacheEvent::Miss(packet)),
        }
        let _ = now;
        Ok(())
    }

    fn run_prefetcher(&mut self, _now: u64, _events: &mut [CacheEvent]) {
        // Prefetch candidates are surfaced through `observe`; the
        // fill-path policy drives the actual PQ admission cascade
        // (§4.6) once it has a target cache to enqueue into.
        let _ = &mut self.prefetcher;
    }

    /// Called when a lower memory (or DRAM) returns data for a packet
    /// whose MSHR lives in this cache. Copies the outcome fields the
    /// lower memory just determined — `went_offchip`, most notably —
    /// onto the packet this cache's own MSHR has been holding since the
    /// miss, since that stored packet (not this one) is what every
    /// coalesced LQ/ROB dependent eventually gets drained to. Then marks
    /// the MSHR `Completed`, scheduling installation on the next
    /// `operate` call.
    pub fn receive_return(&mut self, packet: Packet, now: u64) -> Result<(), SimError> {
        let idx = self
            .mshr
            .find(&packet)
            .ok_or_else(|| SimError::FillPathInconsistentOnReturn(packet.id()))?;
        self.mshr.packet_mut(idx).went_offchip = packet.went_offchip;
        self.mshr.complete(idx);
        let _ = now;
        trace!(cache = %self.name, block = packet.block_addr.val(), "receive_return");
        Ok(())
    }

    /// Invalidates a line (coherence/flush support), clearing its
    /// valid bits without writing back.
    pub fn invalidate_line(&mut self, block_addr: BlockAddr) {
        if let Some((set, way)) = self.lookup(block_addr) {
            let sector = &mut self.sectors[set * self.ways + way];
            for block in &mut sector.blocks {
                block.valid = false;
                block.dirty = false;
            }
        }
    }

    /// This cache's kind, used for routing decisions.
    #[must_use]
    pub fn cache_type(&self) -> CacheType {
        self.cache_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PhysAddr;
    use crate::config::CacheConfig;

    fn small_config() -> CacheConfig {
        CacheConfig {
            name: "L1D".to_string(),
            cache_type: CacheType::L1d,
            fill_level: FillLevel::L1,
            latency: 4,
            sets: 4,
            ways: 2,
            sectoring_degree: 1,
            block_size: 64,
            max_reads: 1,
            max_writes: 1,
            mshr_size: 4,
            read_queue_size: 4,
            write_queue_size: 4,
            prefetch_queue_size: 4,
            processed_queue_size: 4,
            replacement_policy: ReplacementPolicyKind::Lru,
            prefetcher: PrefetcherKind::None,
        }
    }

    #[test]
    fn miss_then_fill_then_hit() {
        let mut cache = SectoredCache::new(&small_config(), CacheId(0));
        let addr = PhysAddr::new(0x1000).block();
        assert!(cache.lookup(addr).is_none());

        let packet = crate::cache::packet::Packet::new(
            PacketType::Load,
            0,
            crate::common::VirtAddr::new(0x1000),
            PhysAddr::new(0x1000),
            0,
            FillLevel::L1,
            0,
        );
        let wb = cache.fill(&packet, 0);
        assert!(wb.is_none());
        assert!(cache.lookup(addr).is_some());
    }

    #[test]
    fn partial_sector_is_a_miss() {
        let mut config = small_config();
        config.sectoring_degree = 2;
        let cache = SectoredCache::new(&config, CacheId(0));
        let addr = PhysAddr::new(0x1000).block();
        assert!(cache.lookup(addr).is_none());
    }
}
