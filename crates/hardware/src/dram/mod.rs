//! DRAM controller: one read/write queue and a row-buffer state
//! machine per bank, with JEDEC-style tRP/tRCD/tCAS timing and a
//! watermark-driven write-drain mode.

use tracing::trace;

use crate::cache::packet::{CacheId, Packet, PacketType};
use crate::cache::queue::{Admit, RingQueue};
use crate::common::{BlockAddr, SimError};
use crate::config::DramConfig;

/// Address decomposition into DRAM coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DramAddress {
    /// Channel index.
    pub channel: usize,
    /// Rank index within the channel.
    pub rank: usize,
    /// Bank index within the rank.
    pub bank: usize,
    /// Row index within the bank.
    pub row: usize,
    /// Column index within the row.
    pub column: usize,
}

/// A bank's row buffer: open row, if any, and the cycle it may next
/// accept a command (precharge/activate/access all serialize on it).
#[derive(Debug, Clone, Copy, Default)]
struct Bank {
    open_row: Option<usize>,
    busy_until: u64,
}

/// Whether the shared data bus is currently servicing reads or writes;
/// switching direction costs `dbus_turn_around` cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusMode {
    Read,
    Write,
}

/// One memory channel: its own RQ/WQ and bank array.
struct Channel {
    rq: RingQueue,
    wq: RingQueue,
    banks: Vec<Bank>,
    bus_mode: BusMode,
    bus_free_at: u64,
    /// Cycle the shared data bus is next free to move a block, separate
    /// from `bus_free_at`'s read/write mode bookkeeping: every access
    /// occupies the bus for `dbus_return_time`, and a later access must
    /// queue behind it even if its row/bank access already finished.
    dbus_busy_until: u64,
    draining_writes: bool,
    /// Reads satisfied directly out of the WQ (§4.5) bypass row/bank
    /// timing entirely; held here for `operate` to return them as
    /// completed with no further delay.
    forwarded: Vec<Packet>,
}

/// The full DRAM controller, owning every channel.
pub struct DramController {
    config: DramConfig,
    channels: Vec<Channel>,
    row_buffer_hits: u64,
    row_buffer_misses: u64,
}

impl DramController {
    /// Builds a controller with empty queues and all banks closed.
    #[must_use]
    pub fn new(config: DramConfig) -> Self {
        let channels = (0..config.channels)
            .map(|_| Channel {
                rq: RingQueue::new(config.rq_size),
                wq: RingQueue::new(config.wq_size),
                banks: vec![Bank::default(); config.banks],
                bus_mode: BusMode::Read,
                bus_free_at: 0,
                dbus_busy_until: 0,
                draining_writes: false,
                forwarded: Vec::new(),
            })
            .collect();
        Self {
            config,
            channels,
            row_buffer_hits: 0,
            row_buffer_misses: 0,
        }
    }

    /// Decomposes a block address into channel/rank/bank/row/column,
    /// striping channels on the low address bits above the block
    /// offset so sequential accesses spread across channels.
    #[must_use]
    pub fn decompose(&self, block_addr: BlockAddr) -> DramAddress {
        let mut addr = block_addr.val();
        let channel = (addr as usize) % self.config.channels.max(1);
        addr /= self.config.channels.max(1) as u64;
        let rank = (addr as usize) % self.config.ranks.max(1);
        addr /= self.config.ranks.max(1) as u64;
        let bank = (addr as usize) % self.config.banks.max(1);
        addr /= self.config.banks.max(1) as u64;
        let column = (addr as usize) % self.config.columns.max(1);
        addr /= self.config.columns.max(1) as u64;
        let row = (addr as usize) % self.config.rows.max(1);
        DramAddress {
            channel,
            rank,
            bank,
            row,
            column,
        }
    }

    /// Admits a read request under the full §4.5 RQ-admission contract:
    ///
    /// 1. If a write to the same block is already in the WQ, the read
    ///    is satisfied directly from it (a WQ-forward) without ever
    ///    touching a bank.
    /// 2. Otherwise, a DDRP request coalesces only with another
    ///    in-flight DDRP (ordinary duplicate suppression).
    /// 3. A genuine demand that lands on a block an in-flight DDRP
    ///    already reserved overlays onto that DDRP's RQ slot instead of
    ///    opening a second one: the DDRP keeps its head start on the row
    ///    buffer, but the returning packet becomes the demand (so its
    ///    LQ/ROB dependents actually get serviced — a DDRP's own reply
    ///    is otherwise discarded).
    /// 4. Two genuine demands landing on the same slot is a bug
    ///    upstream (every cache's MSHR should have coalesced them before
    ///    either reached DRAM) and is fatal.
    ///
    /// # Errors
    ///
    /// Returns `SimError::DramDemandCollision` if two demand packets
    /// collide on the same channel/block slot.
    pub fn admit_read(&mut self, mut packet: Packet, now: u64) -> Result<Admit, SimError> {
        let dram_addr = self.decompose(packet.block_addr);
        let channel = &mut self.channels[dram_addr.channel];

        if channel.wq.check(&packet).is_some() {
            packet.went_offchip = packet.packet_type == PacketType::Load;
            packet.event_cycle = now;
            channel.forwarded.push(packet);
            return Ok(Admit::Accepted);
        }

        if packet.is_ddrp {
            if channel.rq.check(&packet).is_some() {
                return Ok(Admit::Accepted);
            }
            return Ok(channel.rq.add(packet, 0, now));
        }

        if let Some(idx) = channel.rq.find_matching_block(&packet) {
            if let Some(existing) = channel.rq.get_mut(idx) {
                if existing.is_ddrp {
                    let event_cycle = existing.event_cycle;
                    packet.event_cycle = event_cycle;
                    *existing = packet;
                    return Ok(Admit::Accepted);
                }
            }
            return Err(SimError::DramDemandCollision(packet.id()));
        }

        Ok(channel.rq.add(packet, 0, now))
    }

    /// Admits a write-back request.
    pub fn admit_write(&mut self, packet: Packet, now: u64) -> Admit {
        let dram_addr = self.decompose(packet.block_addr);
        self.channels[dram_addr.channel].wq.add(packet, 0, now)
    }

    /// Whether the read queue for `block_addr`'s channel has no room.
    /// Callers check this before admitting rather than recovering a
    /// packet from `Admit::Blocked`, which `admit_read` has no way to
    /// hand back once it has taken ownership.
    #[must_use]
    pub fn rq_is_full(&self, block_addr: BlockAddr) -> bool {
        let channel = self.decompose(block_addr).channel;
        self.channels[channel].rq.is_full()
    }

    /// Whether the write queue for `block_addr`'s channel has no room.
    #[must_use]
    pub fn wq_is_full(&self, block_addr: BlockAddr) -> bool {
        let channel = self.decompose(block_addr).channel;
        self.channels[channel].wq.is_full()
    }

    /// Per-cycle operate for every channel: return any WQ-forwarded
    /// reads, drain mode switch on watermarks, then service one read or
    /// write per channel per cycle depending on mode.
    pub fn operate(&mut self, now: u64) -> Result<Vec<Packet>, SimError> {
        let mut completed = Vec::new();
        for idx in 0..self.channels.len() {
            let forwarded: Vec<Packet> = self.channels[idx].forwarded.drain(..).collect();
            completed.extend(forwarded);
            self.operate_channel(idx, now, &mut completed)?;
        }
        Ok(completed)
    }

    /// `ceil(block_size / channel_width) * ceil(cpu_freq / dram_mtps)`:
    /// the number of CPU cycles one access occupies the shared data bus
    /// moving a full block, independent of row/bank access latency.
    fn dbus_return_time(&self) -> u64 {
        let width = self.config.channel_width_bytes.max(1);
        let transfers = (self.config.block_size as u64).div_ceil(width);
        let cycles_per_transfer = self.config.cpu_freq_mhz.div_ceil(self.config.dram_mtps.max(1));
        transfers * cycles_per_transfer
    }

    fn operate_channel(&mut self, idx: usize, now: u64, completed: &mut Vec<Packet>) -> Result<(), SimError> {
        let high_wm = self.config.write_high_watermark;
        let low_wm = self.config.write_low_watermark;
        let channel = &mut self.channels[idx];

        if !channel.draining_writes && channel.wq.len() >= high_wm {
            channel.draining_writes = true;
        } else if channel.draining_writes && (channel.wq.is_empty() || channel.wq.len() <= low_wm) {
            channel.draining_writes = false;
        }

        if channel.draining_writes || (channel.wq.len() >= high_wm) {
            self.service_write(idx, now);
        } else {
            self.service_read(idx, now, completed)?;
        }
        Ok(())
    }

    fn bank_for(&mut self, idx: usize, bank: usize) -> &mut Bank {
        &mut self.channels[idx].banks[bank]
    }

    /// Row-buffer-aware access latency: a hit (row already open) costs
    /// only tCAS; a miss costs tRP (precharge) + tRCD (activate) +
    /// tCAS.
    fn access_latency(&mut self, idx: usize, dram_addr: DramAddress, now: u64) -> (u64, bool) {
        let bank = self.bank_for(idx, dram_addr.bank);
        let hit = bank.open_row == Some(dram_addr.row);
        let start = bank.busy_until.max(now);
        let latency = if hit {
            self.config.t_cas
        } else {
            self.config.t_rp + self.config.t_rcd + self.config.t_cas
        };
        bank.open_row = Some(dram_addr.row);
        bank.busy_until = start + latency;
        (start + latency - now, hit)
    }

    fn turn_around_penalty(&mut self, idx: usize, now: u64, mode: BusMode) -> u64 {
        let channel = &mut self.channels[idx];
        let mut penalty = 0;
        if channel.bus_mode != mode {
            channel.bus_mode = mode;
            penalty = self.config.dbus_turn_around;
        }
        channel.bus_free_at = channel.bus_free_at.max(now);
        penalty
    }

    fn service_read(&mut self, idx: usize, now: u64, completed: &mut Vec<Packet>) -> Result<(), SimError> {
        let Some(packet) = self.channels[idx].rq.peek_head().cloned() else {
            return Ok(());
        };
        if packet.event_cycle > now {
            return Ok(());
        }
        let dram_addr = self.decompose(packet.block_addr);
        let (latency, hit) = self.access_latency(idx, dram_addr, now);
        let turn_around = self.turn_around_penalty(idx, now, BusMode::Read);
        let dbus_return = self.dbus_return_time();
        let bus_ready = self.channels[idx].dbus_busy_until.max(now + latency + turn_around);
        self.channels[idx].dbus_busy_until = bus_ready + dbus_return;

        if hit {
            self.row_buffer_hits += 1;
        } else {
            self.row_buffer_misses += 1;
        }

        let Some(mut packet) = self.channels[idx].rq.remove_head(now) else {
            return Ok(());
        };
        packet.went_offchip = packet.packet_type == PacketType::Load;
        packet.event_cycle = bus_ready + dbus_return;
        trace!(channel = idx, hit, latency, "dram read");
        completed.push(packet);
        Ok(())
    }

    fn service_write(&mut self, idx: usize, now: u64) {
        let Some(packet) = self.channels[idx].wq.peek_head().cloned() else {
            return;
        };
        if packet.event_cycle > now {
            return;
        }
        let dram_addr = self.decompose(packet.block_addr);
        let (latency, _hit) = self.access_latency(idx, dram_addr, now);
        let _turn_around = self.turn_around_penalty(idx, now, BusMode::Write);
        let dbus_return = self.dbus_return_time();
        let bus_ready = self.channels[idx].dbus_busy_until.max(now + latency);
        self.channels[idx].dbus_busy_until = bus_ready + dbus_return;
        let _ = self.channels[idx].wq.remove_head(bus_ready + dbus_return);
    }

    /// `(row-buffer hits, row-buffer misses)` for the final stats report.
    #[must_use]
    pub fn row_buffer_counters(&self) -> (u64, u64) {
        (self.row_buffer_hits, self.row_buffer_misses)
    }
}

/// Identifies the DRAM controller as a pseudo-cache in fill-path
/// routing tables (it is the terminal memory, so it never itself owns
/// an MSHR entry — but a route table keyed by `CacheId` is simpler
/// when DRAM has one too).
pub const DRAM_CACHE_ID: CacheId = CacheId(u8::MAX);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::packet::PacketType;
    use crate::common::{PhysAddr, VirtAddr};
    use crate::config::FillLevel;

    fn load(addr: u64) -> Packet {
        Packet::new(
            PacketType::Load,
            0,
            VirtAddr::new(addr),
            PhysAddr::new(addr),
            0,
            FillLevel::Dram,
            0,
        )
    }

    fn cfg() -> DramConfig {
        DramConfig {
            channels: 1,
            ranks: 1,
            banks: 1,
            rows: 16,
            columns: 128,
            t_rp: 11,
            t_rcd: 11,
            t_cas: 11,
            dbus_turn_around: 5,
            rq_size: 8,
            wq_size: 8,
            write_high_watermark: 6,
            write_low_watermark: 2,
            channel_width_bytes: 8,
            dram_mtps: 3200,
            cpu_freq_mhz: 4000,
            block_size: 64,
        }
    }

    #[test]
    fn repeated_row_access_is_a_row_buffer_hit() {
        let mut dram = DramController::new(cfg());
        assert!(matches!(dram.admit_read(load(0x1000), 0), Ok(Admit::Accepted)));
        let completed = dram.operate(0).unwrap();
        assert_eq!(completed.len(), 1);

        assert!(matches!(dram.admit_read(load(0x1000 + 64), 0), Ok(Admit::Accepted)));
        let completed = dram.operate(completed[0].event_cycle).unwrap();
        assert_eq!(completed.len(), 1);

        let (hits, misses) = dram.row_buffer_counters();
        assert!(hits >= 1);
        assert!(misses >= 1);
    }

    #[test]
    fn ddrp_primes_row_buffer_for_the_demand_that_follows() {
        let mut dram = DramController::new(cfg());

        let mut ddrp = load(0x1000);
        ddrp.is_ddrp = true;
        assert!(matches!(dram.admit_read(ddrp, 0), Ok(Admit::Accepted)));

        // Same block as the DDRP: overlays onto the DDRP's slot instead
        // of opening a second one.
        let demand = load(0x1000);
        assert!(matches!(dram.admit_read(demand, 0), Ok(Admit::Accepted)));
        assert_eq!(dram.channels[0].rq.len(), 1, "demand overlays the DDRP's slot, not a second one");

        let completed = dram.operate(0).unwrap();
        assert_eq!(completed.len(), 1);
        assert!(!completed[0].is_ddrp, "the demand, not the DDRP, is what drains");
        let dbus_return = dram.dbus_return_time();
        assert_eq!(completed[0].event_cycle, 11 + 11 + 11 + dbus_return, "row miss timing plus the data-bus transfer");
    }

    #[test]
    fn demand_to_same_block_as_inflight_demand_is_fatal() {
        let mut dram = DramController::new(cfg());
        assert!(matches!(dram.admit_read(load(0x1000), 0), Ok(Admit::Accepted)));
        let err = dram.admit_read(load(0x1000), 0);
        assert!(matches!(err, Err(SimError::DramDemandCollision(_))));
    }

    #[test]
    fn read_forwards_from_a_matching_inflight_write() {
        let mut dram = DramController::new(cfg());
        let mut write = load(0x1000);
        write.packet_type = PacketType::Writeback;
        let _ = dram.admit_write(write, 0);

        assert!(matches!(dram.admit_read(load(0x1000), 0), Ok(Admit::Accepted)));
        assert!(dram.channels[0].rq.is_empty(), "forwarded read never touches the RQ");

        let completed = dram.operate(0).unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].event_cycle, 0, "WQ-forward bypasses row/bank timing entirely");
    }

    #[test]
    fn write_drain_engages_past_high_watermark() {
        let mut dram = DramController::new(cfg());
        for i in 0..7u64 {
            let mut p = load(0x2000 + i * 64);
            p.packet_type = PacketType::Writeback;
            let _ = dram.admit_write(p, 0);
        }
        let _ = dram.operate(0).unwrap();
        assert!(dram.channels[0].draining_writes);
    }
}
