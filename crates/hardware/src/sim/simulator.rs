//! Top-level simulator: owns every CPU's private cache levels, the
//! shared LLC and DRAM controller, and drives the per-cycle tick order
//! (§5): DRAM → LLC → L2C → L1D → core front end, each phase draining
//! completed MSHRs before admitting new misses.

use std::path::PathBuf;

use tracing::debug;

use crate::cache::packet::{CacheId, Packet, PacketType};
use crate::cache::sector::{CacheEvent, SectoredCache};
use crate::common::{PhysAddr, SimError, VirtAddr};
use crate::config::{Config, FillLevel};
use crate::dram::DramController;
use crate::fillpath::{FillPathPolicy, Propagate, Route};
use crate::ooo::{LoadQueue, LqEntry, ReorderBuffer, RobEntry, SqEntry, StoreQueue};
use crate::predictor::OffchipPredictor;
use crate::sim::trace::{TraceFormat, TraceReader};
use crate::stats::{CoreStats, SimStats};

/// One CPU's private state: its L1D/L2C, core-side queues, off-chip
/// predictor, and trace stream.
pub struct Core {
    cpu_id: u8,
    l1d: SectoredCache,
    l2c: SectoredCache,
    rob: ReorderBuffer,
    lq: LoadQueue,
    sq: StoreQueue,
    predictor: OffchipPredictor,
    trace: TraceReader,
    stats: CoreStats,
    instructions_retired: u64,
    instructions_fetched: u64,
    /// A load/store built by `fetch_core` but blocked on a full L1D
    /// queue. The trace has already been consumed for it, so it cannot
    /// be re-fetched; it is retried here until admitted.
    pending_packet: Option<Packet>,
    /// L2C misses/writebacks blocked on a full shared-LLC queue.
    pending_llc_rq: Vec<Packet>,
    pending_llc_wq: Vec<Packet>,
    /// L1D misses/writebacks blocked on a full L2C queue.
    pending_l2c_rq: Vec<Packet>,
    pending_l2c_wq: Vec<Packet>,
}

impl Core {
    fn l1d_id(cpu: u8) -> CacheId {
        CacheId(cpu * 2)
    }
    fn l2c_id(cpu: u8) -> CacheId {
        CacheId(cpu * 2 + 1)
    }
}

/// The simulator proper: every core, the shared LLC, the shared DRAM
/// controller, and the global cycle counter.
pub struct Simulator {
    cores: Vec<Core>,
    llc: SectoredCache,
    dram: DramController,
    config: Config,
    cycle: u64,
    llc_id: CacheId,
    /// LLC misses/writebacks blocked on a full DRAM queue.
    pending_dram_rq: Vec<Packet>,
    pending_dram_wq: Vec<Packet>,
}

impl Simulator {
    /// Builds a simulator for the given configuration and one trace
    /// path per CPU.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Trace` if a trace file cannot be opened.
    pub fn new(config: Config, trace_paths: &[PathBuf]) -> Result<Self, SimError> {
        let llc_id = CacheId((trace_paths.len() * 2) as u8);
        let trace_format = if config.sim.legacy_trace { TraceFormat::Legacy } else { TraceFormat::Default };
        let mut cores = Vec::with_capacity(trace_paths.len());
        for (cpu, path) in trace_paths.iter().enumerate() {
            let cpu_id = cpu as u8;
            cores.push(Core {
                cpu_id,
                l1d: SectoredCache::new(&config.caches.l1d, Core::l1d_id(cpu_id)),
                l2c: SectoredCache::new(&config.caches.l2c, Core::l2c_id(cpu_id)),
                rob: ReorderBuffer::new(config.sim.rob_size),
                lq: LoadQueue::new(config.sim.lq_size),
                sq: StoreQueue::new(config.sim.sq_size),
                predictor: OffchipPredictor::new(config.predictor.clone()),
                trace: TraceReader::open_with_format(path, trace_format)?,
                stats: CoreStats::default(),
                instructions_retired: 0,
                instructions_fetched: 0,
                pending_packet: None,
                pending_llc_rq: Vec::new(),
                pending_llc_wq: Vec::new(),
                pending_l2c_rq: Vec::new(),
                pending_l2c_wq: Vec::new(),
            });
        }
        let llc = SectoredCache::new(&config.caches.llc, llc_id);
        let dram = DramController::new(config.dram.clone());

        Ok(Self {
            cores,
            llc,
            dram,
            config,
            cycle: 0,
            llc_id,
            pending_dram_rq: Vec::new(),
            pending_dram_wq: Vec::new(),
        })
    }

    /// Current cycle count.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Runs until every core has retired `instructions` instructions
    /// past the warmup point, emitting heartbeats along the way.
    ///
    /// # Errors
    ///
    /// Propagates any `SimError` raised by a cache, DRAM, or fill-path
    /// invariant violation.
    pub fn run(&mut self, warmup_instructions: u64, instructions: u64) -> Result<SimStats, SimError> {
        let target = warmup_instructions + instructions;
        while self.cores.iter().any(|c| c.instructions_retired < target) {
            self.tick()?;
        }
        Ok(self.collect_stats())
    }

    /// Advances the whole hierarchy by one cycle, in fixed phase order.
    ///
    /// # Errors
    ///
    /// Propagates any `SimError` raised while draining a cache level.
    pub fn tick(&mut self) -> Result<(), SimError> {
        self.cycle += 1;
        let now = self.cycle;

        self.drain_dram_backlogs(now)?;
        let dram_returns = self.dram.operate(now)?;
        for packet in dram_returns {
            self.deliver_return(packet, now)?;
        }

        for idx in 0..self.cores.len() {
            self.drain_llc_backlogs(idx, now);
        }
        let llc_events = self.llc.operate(now)?;
        self.handle_llc_events(llc_events, now)?;

        for idx in 0..self.cores.len() {
            self.tick_core(idx, now)?;
        }

        Ok(())
    }

    /// Retries packets that were blocked on a full DRAM read/write
    /// queue last cycle, before any new admissions for this cycle.
    fn drain_dram_backlogs(&mut self, now: u64) -> Result<(), SimError> {
        for packet in std::mem::take(&mut self.pending_dram_wq) {
            if self.dram.wq_is_full(packet.block_addr) {
                self.pending_dram_wq.push(packet);
            } else {
                let _ = self.dram.admit_write(packet, now);
            }
        }
        for packet in std::mem::take(&mut self.pending_dram_rq) {
            if self.dram.rq_is_full(packet.block_addr) {
                self.pending_dram_rq.push(packet);
            } else {
                let _ = self.dram.admit_read(packet, now)?;
            }
        }
        Ok(())
    }

    /// Retries `idx`'s L2C misses/writebacks blocked on a full shared
    /// LLC queue.
    fn drain_llc_backlogs(&mut self, idx: usize, now: u64) {
        for packet in std::mem::take(&mut self.cores[idx].pending_llc_wq) {
            match FillPathPolicy::propagate_miss(self.llc.write_queue_mut(), packet, now) {
                Propagate::Continued => {}
                Propagate::Blocked(packet) => self.cores[idx].pending_llc_wq.push(packet),
            }
        }
        for packet in std::mem::take(&mut self.cores[idx].pending_llc_rq) {
            match FillPathPolicy::propagate_miss(self.llc.read_queue_mut(), packet, now) {
                Propagate::Continued => {}
                Propagate::Blocked(packet) => self.cores[idx].pending_llc_rq.push(packet),
            }
        }
    }

    /// Retries `idx`'s L1D misses/writebacks blocked on a full L2C
    /// queue.
    fn drain_l2c_backlogs(&mut self, idx: usize, now: u64) {
        let core = &mut self.cores[idx];
        for packet in std::mem::take(&mut core.pending_l2c_wq) {
            match FillPathPolicy::propagate_miss(core.l2c.write_queue_mut(), packet, now) {
                Propagate::Continued => {}
                Propagate::Blocked(packet) => core.pending_l2c_wq.push(packet),
            }
        }
        for packet in std::mem::take(&mut core.pending_l2c_rq) {
            match FillPathPolicy::propagate_miss(core.l2c.read_queue_mut(), packet, now) {
                Propagate::Continued => {}
                Propagate::Blocked(packet) => core.pending_l2c_rq.push(packet),
            }
        }
    }

    fn handle_llc_events(&mut self, events: Vec<CacheEvent>, now: u64) -> Result<(), SimError> {
        for event in events {
            match event {
                CacheEvent::Writeback(mut packet) => {
                    match FillPathPolicy::route_for(&packet) {
                        Route::L1dLlc => {}
                        Route::SdcL2cDram | Route::DramDdrpRequest => {
                            unreachable!("an LLC writeback always routes onward to DRAM")
                        }
                    }
                    packet.fill_level = FillLevel::Dram;
                    if self.dram.wq_is_full(packet.block_addr) {
                        self.pending_dram_wq.push(packet);
                    } else {
                        let _ = self.dram.admit_write(packet, now);
                    }
                }
                CacheEvent::Miss(mut packet) => {
                    FillPathPolicy::push_notifier(&mut packet, self.llc_id, FillLevel::Llc)?;
                    match FillPathPolicy::route_for(&packet) {
                        Route::L1dLlc => {}
                        Route::SdcL2cDram | Route::DramDdrpRequest => {
                            unreachable!("an LLC miss always routes onward to DRAM")
                        }
                    }
                    packet.fill_level = FillLevel::Dram;
                    if self.dram.rq_is_full(packet.block_addr) {
                        self.pending_dram_rq.push(packet);
                    } else {
                        let _ = self.dram.admit_read(packet, now)?;
                    }
                }
                CacheEvent::Return(packet) => self.deliver_return(packet, now)?,
            }
        }
        Ok(())
    }

    /// Delivers a completed packet to whatever is next on its fill
    /// path — another cache level, or (if the path is now empty) the
    /// originating core's load queue / reorder buffer.
    fn deliver_return(&mut self, packet: Packet, now: u64) -> Result<(), SimError> {
        let Some(top) = packet.fill_path.top().copied() else {
            self.retire_to_core(packet, now);
            return Ok(());
        };

        if top.cache == self.llc_id {
            self.llc.receive_return(packet, now)
        } else {
            let cpu = top.cpu as usize;
            let Some(core) = self.cores.get_mut(cpu) else {
                return Ok(());
            };
            if top.cache == Core::l2c_id(core.cpu_id) {
                core.l2c.receive_return(packet, now)
            } else {
                core.l1d.receive_return(packet, now)
            }
        }
    }

    /// A packet with an empty fill path has reached the front of the
    /// hierarchy: complete every LQ entry that coalesced into it and
    /// mark every dependent ROB entry's memory access complete. A
    /// packet that merged several coalesced misses carries more than
    /// one dependent of each kind, and every one of them needs exactly
    /// this completion, not just the first.
    fn retire_to_core(&mut self, packet: Packet, _now: u64) {
        let Some(core) = self.cores.get_mut(packet.cpu_id as usize) else {
            return;
        };
        for &lq_idx in &packet.lq_index_depend_on_me {
            core.lq.complete(lq_idx, packet.went_offchip);
        }
        for &rob_idx in &packet.rob_index_depend_on_me {
            core.rob.complete_memory(rob_idx);
        }
    }

    fn tick_core(&mut self, idx: usize, now: u64) -> Result<(), SimError> {
        self.drain_l2c_backlogs(idx, now);
        let l2c_events = self.cores[idx].l2c.operate(now)?;
        self.handle_l2c_events(idx, l2c_events, now)?;

        let l1d_events = self.cores[idx].l1d.operate(now)?;
        self.handle_l1d_events(idx, l1d_events, now)?;

        self.retire_core(idx);
        self.fetch_core(idx, now)?;

        let core = &mut self.cores[idx];
        core.stats.cycles += 1;
        let heartbeat = self.config.sim.heartbeat_instructions;
        core.stats.maybe_heartbeat(core.cpu_id, heartbeat);
        Ok(())
    }

    fn handle_l2c_events(&mut self, idx: usize, events: Vec<CacheEvent>, now: u64) -> Result<(), SimError> {
        let cpu_id = self.cores[idx].cpu_id;
        for event in events {
            match event {
                CacheEvent::Writeback(mut packet) => {
                    match FillPathPolicy::route_for(&packet) {
                        Route::L1dLlc => {}
                        Route::SdcL2cDram | Route::DramDdrpRequest => {
                            unreachable!("an L2C writeback always routes onward to the LLC")
                        }
                    }
                    packet.fill_level = FillLevel::Llc;
                    match FillPathPolicy::propagate_miss(self.llc.write_queue_mut(), packet, now) {
                        Propagate::Continued => {}
                        Propagate::Blocked(packet) => self.cores[idx].pending_llc_wq.push(packet),
                    }
                }
                CacheEvent::Miss(mut packet) => {
                    FillPathPolicy::push_notifier(&mut packet, Core::l2c_id(cpu_id), FillLevel::L2)?;
                    match FillPathPolicy::route_for(&packet) {
                        Route::L1dLlc => {}
                        Route::SdcL2cDram | Route::DramDdrpRequest => {
                            unreachable!("an L2C miss always routes onward to the LLC")
                        }
                    }
                    packet.fill_level = FillLevel::Llc;
                    match FillPathPolicy::propagate_miss(self.llc.read_queue_mut(), packet, now) {
                        Propagate::Continued => {}
                        Propagate::Blocked(packet) => self.cores[idx].pending_llc_rq.push(packet),
                    }
                }
                CacheEvent::Return(packet) => {
                    if let Some(top) = packet.fill_path.top() {
                        if top.cache == Core::l1d_id(cpu_id) {
                            self.cores[idx].l1d.receive_return(packet, now)?;
                            continue;
                        }
                    }
                    self.retire_to_core(packet, now);
                }
            }
        }
        Ok(())
    }

    fn handle_l1d_events(&mut self, idx: usize, events: Vec<CacheEvent>, now: u64) -> Result<(), SimError> {
        let cpu_id = self.cores[idx].cpu_id;
        for event in events {
            match event {
                CacheEvent::Writeback(mut packet) => {
                    match FillPathPolicy::route_for(&packet) {
                        Route::L1dLlc => {}
                        Route::SdcL2cDram | Route::DramDdrpRequest => {
                            unreachable!("an L1D writeback always routes onward to L2C")
                        }
                    }
                    packet.fill_level = FillLevel::L2;
                    let core = &mut self.cores[idx];
                    match FillPathPolicy::propagate_miss(core.l2c.write_queue_mut(), packet, now) {
                        Propagate::Continued => {}
                        Propagate::Blocked(packet) => core.pending_l2c_wq.push(packet),
                    }
                }
                CacheEvent::Miss(mut packet) => {
                    FillPathPolicy::push_notifier(&mut packet, Core::l1d_id(cpu_id), FillLevel::L1)?;

                    if packet.packet_type == PacketType::Load {
                        let page = packet.vaddr.page();
                        let offset = packet.vaddr.page_offset();
                        let word_offset = packet.paddr.block_offset() / 8;
                        let core = &mut self.cores[idx];
                        core.predictor.observe_page_access(page, packet.ip);
                        let inputs = core.predictor.inputs_for(packet.ip, page, offset, word_offset);
                        let snapshot = core.predictor.predict(&inputs);
                        packet.went_offchip_pred = snapshot.predicted_offchip;
                        packet.l1d_miss_offchip_pred = snapshot.predicted_offchip;
                        packet.l1d_offchip_pred_used = true;

                        for &lq_idx in &packet.lq_index_depend_on_me {
                            if let Some(entry) = core.lq_entry_mut(lq_idx) {
                                entry.offchip_snapshot = Some(snapshot.clone());
                            }
                        }

                        if snapshot.predicted_offchip {
                            let ddrp = FillPathPolicy::build_ddrp_request(&packet, self.config.sim.ddrp_request_latency, now);
                            if self.dram.rq_is_full(ddrp.block_addr) {
                                self.pending_dram_rq.push(ddrp);
                            } else {
                                let _ = self.dram.admit_read(ddrp, now)?;
                            }
                            debug!(cpu = cpu_id, block = packet.block_addr.val(), "ddrp issued");
                        }
                    }

                    match FillPathPolicy::route_for(&packet) {
                        Route::SdcL2cDram => {}
                        Route::L1dLlc | Route::DramDdrpRequest => {
                            unreachable!("an L1D miss always routes onward to L2C")
                        }
                    }
                    packet.fill_level = FillLevel::L2;
                    let core = &mut self.cores[idx];
                    match FillPathPolicy::propagate_miss(core.l2c.read_queue_mut(), packet, now) {
                        Propagate::Continued => {}
                        Propagate::Blocked(packet) => core.pending_l2c_rq.push(packet),
                    }
                }
                CacheEvent::Return(packet) => self.retire_to_core(packet, now),
            }
        }
        Ok(())
    }

    fn retire_core(&mut self, idx: usize) {
        let core = &mut self.cores[idx];
        while let Some(entry) = core.rob.retire() {
            if entry.lq_index.is_some() {
                if let Some(load) = core.lq.retire_head() {
                    if let Some(snapshot) = &load.offchip_snapshot {
                        core.predictor.train(snapshot, load.went_offchip);
                    }
                    core.predictor.record_load_pc(entry.ip);
                }
            }
            if entry.sq_index.is_some() {
                let _ = core.sq.retire_head();
            }
            core.instructions_retired += 1;
            core.stats.instructions += 1;
        }
    }

    /// Admits `packet` to `core`'s L1D read (load) or write (store RFO)
    /// queue depending on its type.
    fn admit_l1d(core: &mut Core, packet: Packet, now: u64) -> Propagate {
        let queue = if packet.packet_type == PacketType::Rfo {
            core.l1d.write_queue_mut()
        } else {
            core.l1d.read_queue_mut()
        };
        FillPathPolicy::propagate_miss(queue, packet, now)
    }

    fn fetch_core(&mut self, idx: usize, now: u64) -> Result<(), SimError> {
        if let Some(packet) = self.cores[idx].pending_packet.take() {
            match Self::admit_l1d(&mut self.cores[idx], packet, now) {
                Propagate::Continued => {}
                Propagate::Blocked(packet) => {
                    self.cores[idx].pending_packet = Some(packet);
                    return Ok(());
                }
            }
        }

        let core = &mut self.cores[idx];
        if core.rob.is_full() {
            return Ok(());
        }
        let insn = core.trace.next_instruction()?;
        core.instructions_fetched += 1;

        let load = insn.first_load();
        let store = insn.first_store();

        let forwarding_source =
            load.and_then(|(vaddr, _size)| core.sq.find_forwarding_source(PhysAddr::new(vaddr), core.sq.tail()));

        let (lq_index, sq_index) = if let Some((vaddr, _size)) = load {
            let idx = if core.lq.is_full() {
                None
            } else {
                Some(core.lq.allocate(LqEntry {
                    rob_index: 0,
                    paddr: PhysAddr::new(vaddr),
                    completed: forwarding_source.is_some(),
                    offchip_snapshot: None,
                    went_offchip: false,
                    producer_id: forwarding_source,
                }))
            };
            (idx, None)
        } else if let Some((vaddr, _size)) = store {
            let idx = if core.sq.is_full() {
                None
            } else {
                Some(core.sq.allocate(SqEntry {
                    rob_index: 0,
                    paddr: PhysAddr::new(vaddr),
                    address_ready: true,
                }))
            };
            (None, idx)
        } else {
            (None, None)
        };

        let memory_complete_at_dispatch = (lq_index.is_none() && sq_index.is_none()) || forwarding_source.is_some();

        let rob_index = core.rob.dispatch(RobEntry {
            ip: insn.ip,
            lq_index,
            sq_index,
            memory_complete: memory_complete_at_dispatch,
        });

        if let Some(lq_idx) = lq_index {
            if let Some(entry) = core.lq_entry_mut(lq_idx) {
                entry.rob_index = rob_index;
            }
        }
        if let Some(sq_idx) = sq_index {
            if let Some(entry) = core.sq.entry_mut(sq_idx) {
                entry.rob_index = rob_index;
            }
        }

        if forwarding_source.is_some() {
            // Resolved synchronously from an in-flight store; no L1D
            // access is issued and no predictor is engaged.
        } else if let (Some(lq_idx), Some((vaddr, _size))) = (lq_index, load) {
            let paddr = PhysAddr::new(vaddr);
            let mut packet = Packet::new(
                PacketType::Load,
                core.cpu_id,
                VirtAddr::new(vaddr),
                paddr,
                insn.ip,
                FillLevel::L1,
                now,
            );
            packet.lq_index_depend_on_me.push(lq_idx);
            packet.rob_index_depend_on_me.push(rob_index);
            match Self::admit_l1d(core, packet, now) {
                Propagate::Continued => {}
                Propagate::Blocked(packet) => core.pending_packet = Some(packet),
            }
        } else if let Some((vaddr, _size)) = store {
            let paddr = PhysAddr::new(vaddr);
            let mut packet = Packet::new(
                PacketType::Rfo,
                core.cpu_id,
                VirtAddr::new(vaddr),
                paddr,
                insn.ip,
                FillLevel::L1,
                now,
            );
            if let Some(sq_idx) = sq_index {
                packet.sq_index_depend_on_me.push(sq_idx);
            }
            packet.rob_index_depend_on_me.push(rob_index);
            match Self::admit_l1d(core, packet, now) {
                Propagate::Continued => {}
                Propagate::Blocked(packet) => core.pending_packet = Some(packet),
            }
        }

        Ok(())
    }

    fn collect_stats(&self) -> SimStats {
        let mut caches = Vec::new();
        for core in &self.cores {
            caches.push((core.l1d.name().to_string(), core.l1d.stats()));
            caches.push((core.l2c.name().to_string(), core.l2c.stats()));
        }
        caches.push((self.llc.name().to_string(), self.llc.stats()));

        let mut accuracy = (0u64, 0u64, 0u64);
        for core in &self.cores {
            let (c, fo, fn_) = core.predictor.accuracy_counters();
            accuracy.0 += c;
            accuracy.1 += fo;
            accuracy.2 += fn_;
        }

        SimStats {
            cores: self.cores.iter().map(|c| c.stats).collect(),
            caches,
            dram_row_buffer: self.dram.row_buffer_counters(),
            predictor_accuracy: accuracy,
            total_cycles: self.cycle,
        }
    }
}

impl Core {
    fn lq_entry_mut(&mut self, idx: usize) -> Option<&mut LqEntry> {
        self.lq.entry_mut(idx)
    }
}
