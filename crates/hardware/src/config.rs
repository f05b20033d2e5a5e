//! Configuration system for the memory-hierarchy simulator.
//!
//! This module defines all configuration structures and enums used to
//! parameterize a run. It provides:
//! 1. **Defaults:** baseline cache/DRAM/predictor constants.
//! 2. **Structures:** hierarchical config for simulation, per-cache,
//!    DRAM, and predictor settings.
//! 3. **Enums:** `FillLevel`, cache type, replacement policy, and
//!    prefetcher selectors.
//!
//! Configuration is supplied via JSON on the CLI (`--config`); every
//! field has a default, so a partial document — or none at all —
//! produces a runnable simulator.

use serde::Deserialize;

/// Default configuration constants for the simulator.
mod defaults {
    /// Cache-block size in bytes, shared by every level.
    pub const BLOCK_SIZE: usize = 64;

    /// L1D: sets, ways, sectoring degree, latency, queue sizes, MSHRs.
    pub const L1D_SETS: usize = 64;
    pub const L1D_WAYS: usize = 8;
    pub const L1D_SECTORING: usize = 1;
    pub const L1D_LATENCY: u64 = 4;
    pub const L1D_MSHR: usize = 16;
    pub const L1D_RQ: usize = 64;
    pub const L1D_WQ: usize = 64;
    pub const L1D_PQ: usize = 8;

    /// L2C: sets, ways, sectoring degree, latency, queue sizes, MSHRs.
    pub const L2C_SETS: usize = 1024;
    pub const L2C_WAYS: usize = 8;
    pub const L2C_SECTORING: usize = 1;
    pub const L2C_LATENCY: u64 = 10;
    pub const L2C_MSHR: usize = 32;
    pub const L2C_RQ: usize = 32;
    pub const L2C_WQ: usize = 32;
    pub const L2C_PQ: usize = 16;

    /// LLC: sets, ways, sectoring degree, latency, queue sizes, MSHRs.
    pub const LLC_SETS: usize = 2048;
    pub const LLC_WAYS: usize = 16;
    pub const LLC_SECTORING: usize = 2;
    pub const LLC_LATENCY: u64 = 30;
    pub const LLC_MSHR: usize = 64;
    pub const LLC_RQ: usize = 64;
    pub const LLC_WQ: usize = 64;
    pub const LLC_PQ: usize = 32;

    /// Fixed-latency TLB levels (ITLB/DTLB/STLB, black-box per the core
    /// collaborator contract).
    pub const DTLB_LATENCY: u64 = 1;
    pub const STLB_LATENCY: u64 = 8;
    pub const ITLB_LATENCY: u64 = 1;

    /// DRAM: channels, ranks, banks, timing (CPU cycles), data bus.
    pub const DRAM_CHANNELS: usize = 1;
    pub const DRAM_RANKS: usize = 1;
    pub const DRAM_BANKS: usize = 8;
    pub const DRAM_ROWS: usize = 65536;
    pub const DRAM_COLUMNS: usize = 128;
    pub const T_RP: u64 = 11;
    pub const T_RCD: u64 = 11;
    pub const T_CAS: u64 = 11;
    pub const DBUS_TURN_AROUND: u64 = 5;
    pub const DRAM_RQ_SIZE: usize = 64;
    pub const DRAM_WQ_SIZE: usize = 64;
    pub const WRITE_HIGH_WM: usize = 48;
    pub const WRITE_LOW_WM: usize = 16;
    pub const CHANNEL_WIDTH_BYTES: u64 = 8;
    pub const DRAM_MTPS: u64 = 3200;
    pub const CPU_FREQ_MHZ: u64 = 4000;
    pub const DRAM_BLOCK_SIZE: usize = 64;

    /// Off-chip predictor: table size, saturating-counter bounds, τ.
    pub const PREDICTOR_TABLE_SIZE: usize = 1024;
    pub const COUNTER_MAX: i16 = 31;
    pub const COUNTER_MIN: i16 = -32;
    pub const PREDICTOR_THRESHOLD: i32 = 0;
    pub const LAST_N_LOAD_PCS: usize = 3;

    /// ROB/LQ/SQ sizing and simulation defaults.
    pub const ROB_SIZE: usize = 256;
    pub const LQ_SIZE: usize = 72;
    pub const SQ_SIZE: usize = 56;
    pub const HEARTBEAT_INSTRUCTIONS: u64 = 10_000_000;
    pub const DDRP_REQUEST_LATENCY: u64 = 5;
}

/// The totally-ordered set of levels a packet's fill can target, plus
/// the parallel special levels (`Ddrp`, `Dclr`, `Metadata`) described
/// in §3 of the design. `Ord` on the main order only compares
/// `L1 < L2 < Llc < Dram`; special levels are never compared against
/// the main order by `fill_path` ordering logic, which matches on the
/// variant instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillLevel {
    /// L1I or L1D.
    L1,
    /// L2C.
    L2,
    /// Last-level cache.
    Llc,
    /// DRAM (terminal memory).
    Dram,
    /// Speculative DRAM request injected by the off-chip predictor.
    /// Ordered alongside `Dram` for routing purposes but never appears
    /// in a real fill_path stack (DDRP packets are discarded at DRAM).
    Ddrp,
    /// A DDRP variant that targets a specific predicted level instead
    /// of always DRAM. Present in the type system; unused by the
    /// default route table.
    Dclr,
    /// Metadata-cache refill level. Present but inactive by default
    /// (§9 open question): no DRAM traffic is generated for it.
    Metadata,
}

/// Which cache a `CacheConfig` describes; selects sizing/latency
/// defaults and routing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// Instruction TLB.
    Itlb,
    /// Data TLB.
    Dtlb,
    /// Second-level (shared) TLB.
    Stlb,
    /// L1 instruction cache.
    L1i,
    /// L1 data cache.
    #[default]
    L1d,
    /// L2 (mid-level) cache.
    L2c,
    /// Last-level cache.
    Llc,
    /// Scratchpad/streaming data cache. Present in the type enum,
    /// inactive by default (§9 open question).
    Sdc,
}

/// Cache replacement policy algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementPolicyKind {
    /// Least Recently Used.
    #[default]
    Lru,
    /// Pseudo-LRU (tree-based).
    Plru,
    /// First-In-First-Out.
    Fifo,
    /// Random.
    Random,
    /// Most Recently Used.
    Mru,
}

/// Hardware prefetcher selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefetcherKind {
    /// No prefetching.
    #[default]
    None,
    /// Next sequential line.
    NextLine,
    /// Constant-stride detector.
    Stride,
    /// Ascending/descending stream detector.
    Stream,
    /// Prefetch-on-demand-miss-or-prefetch-hit.
    Tagged,
}

/// Off-chip predictor feature selector; each variant names one
/// feature table, computed by hashing the listed quantities together
/// (see `predictor::feature`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictorFeature {
    /// Load instruction pointer alone.
    Pc,
    /// `pc ⊕ page_offset`.
    PcOffset,
    /// `pc ⊕ first_access_of_page`.
    PcFirstAccess,
    /// `page_offset ⊕ first_access_of_page`.
    OffsetFirstAccess,
    /// `pc ⊕ cache_line_word_offset`.
    PcCacheLineWordOffset,
    /// Folded hash of the last N load PCs (a signature, not a set).
    LastNLoadPcs,
}

/// Root configuration structure containing every simulator setting.
///
/// # Examples
///
/// ```
/// use memsim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.sim.warmup_instructions, 0);
/// assert_eq!(config.caches.l1d.sets, 64);
/// ```
///
/// Deserializing a partial JSON document (missing fields fall back to
/// their defaults):
///
/// ```
/// use memsim_core::config::Config;
///
/// let json = r#"{ "sim": { "warmup_instructions": 200000 } }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.sim.warmup_instructions, 200000);
/// assert_eq!(config.caches.l1d.latency, 4);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Top-level simulation knobs (instruction counts, heartbeat).
    #[serde(default)]
    pub sim: SimConfig,
    /// Per-level cache hierarchy configuration.
    #[serde(default)]
    pub caches: CacheHierarchyConfig,
    /// DRAM controller configuration.
    #[serde(default)]
    pub dram: DramConfig,
    /// Off-chip predictor configuration.
    #[serde(default)]
    pub predictor: PredictorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sim: SimConfig::default(),
            caches: CacheHierarchyConfig::default(),
            dram: DramConfig::default(),
            predictor: PredictorConfig::default(),
        }
    }
}

/// Top-level simulation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Instructions to execute before measurement begins.
    #[serde(default)]
    pub warmup_instructions: u64,
    /// Instructions to execute once measurement begins.
    #[serde(default = "SimConfig::default_simulation_instructions")]
    pub simulation_instructions: u64,
    /// Instructions between heartbeat lines.
    #[serde(default = "SimConfig::default_heartbeat")]
    pub heartbeat_instructions: u64,
    /// Cycles of simulated latency for an injected DDRP request.
    #[serde(default = "SimConfig::default_ddrp_latency")]
    pub ddrp_request_latency: u64,
    /// ROB capacity, per CPU.
    #[serde(default = "SimConfig::default_rob_size")]
    pub rob_size: usize,
    /// Load-queue capacity, per CPU.
    #[serde(default = "SimConfig::default_lq_size")]
    pub lq_size: usize,
    /// Store-queue capacity, per CPU.
    #[serde(default = "SimConfig::default_sq_size")]
    pub sq_size: usize,
    /// Read traces in the legacy on-disk record (no per-operand sizes
    /// or instruction length, and no irregular-access-range prefix)
    /// rather than the default format.
    #[serde(default)]
    pub legacy_trace: bool,
}

impl SimConfig {
    fn default_simulation_instructions() -> u64 {
        1_000_000
    }
    fn default_heartbeat() -> u64 {
        defaults::HEARTBEAT_INSTRUCTIONS
    }
    fn default_ddrp_latency() -> u64 {
        defaults::DDRP_REQUEST_LATENCY
    }
    fn default_rob_size() -> usize {
        defaults::ROB_SIZE
    }
    fn default_lq_size() -> usize {
        defaults::LQ_SIZE
    }
    fn default_sq_size() -> usize {
        defaults::SQ_SIZE
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            warmup_instructions: 0,
            simulation_instructions: Self::default_simulation_instructions(),
            heartbeat_instructions: defaults::HEARTBEAT_INSTRUCTIONS,
            ddrp_request_latency: defaults::DDRP_REQUEST_LATENCY,
            rob_size: defaults::ROB_SIZE,
            lq_size: defaults::LQ_SIZE,
            sq_size: defaults::SQ_SIZE,
            legacy_trace: false,
        }
    }
}

/// One cache level's configuration: sizing, timing, queues, MSHRs, and
/// its plugin selections.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Human-readable name, used in logging and stats sections.
    #[serde(default)]
    pub name: String,
    /// Which cache this is; selects routing behavior.
    #[serde(default)]
    pub cache_type: CacheType,
    /// Fill level this cache occupies in the main order.
    pub fill_level: FillLevel,
    /// Base access latency in cycles.
    pub latency: u64,
    /// Number of sets.
    pub sets: usize,
    /// Associativity (ways per set).
    pub ways: usize,
    /// Blocks grouped per sector (sectoring degree); 1 = unsectored.
    #[serde(default = "CacheConfig::default_sectoring")]
    pub sectoring_degree: usize,
    /// Block size in bytes.
    #[serde(default = "CacheConfig::default_block_size")]
    pub block_size: usize,
    /// Reads admitted to the RQ per cycle.
    #[serde(default = "CacheConfig::default_max_reads")]
    pub max_reads: usize,
    /// Writes admitted to the WQ per cycle.
    #[serde(default = "CacheConfig::default_max_writes")]
    pub max_writes: usize,
    /// MSHR table capacity.
    pub mshr_size: usize,
    /// Read-queue capacity.
    pub read_queue_size: usize,
    /// Write-queue capacity.
    pub write_queue_size: usize,
    /// Prefetch-queue capacity.
    pub prefetch_queue_size: usize,
    /// Processed-queue capacity (completed loads awaiting the core).
    #[serde(default = "CacheConfig::default_processed_queue")]
    pub processed_queue_size: usize,
    /// Replacement policy plugin selection.
    #[serde(default)]
    pub replacement_policy: ReplacementPolicyKind,
    /// Prefetcher plugin selection.
    #[serde(default)]
    pub prefetcher: PrefetcherKind,
}

impl CacheConfig {
    fn default_sectoring() -> usize {
        1
    }
    fn default_block_size() -> usize {
        defaults::BLOCK_SIZE
    }
    fn default_max_reads() -> usize {
        1
    }
    fn default_max_writes() -> usize {
        1
    }
    fn default_processed_queue() -> usize {
        16
    }

    fn l1d_default() -> Self {
        Self {
            name: "L1D".to_string(),
            cache_type: CacheType::L1d,
            fill_level: FillLevel::L1,
            latency: defaults::L1D_LATENCY,
            sets: defaults::L1D_SETS,
            ways: defaults::L1D_WAYS,
            sectoring_degree: defaults::L1D_SECTORING,
            block_size: defaults::BLOCK_SIZE,
            max_reads: 2,
            max_writes: 2,
            mshr_size: defaults::L1D_MSHR,
            read_queue_size: defaults::L1D_RQ,
            write_queue_size: defaults::L1D_WQ,
            prefetch_queue_size: defaults::L1D_PQ,
            processed_queue_size: 16,
            replacement_policy: ReplacementPolicyKind::Lru,
            prefetcher: PrefetcherKind::Stride,
        }
    }

    fn l2c_default() -> Self {
        Self {
            name: "L2C".to_string(),
            cache_type: CacheType::L2c,
            fill_level: FillLevel::L2,
            latency: defaults::L2C_LATENCY,
            sets: defaults::L2C_SETS,
            ways: defaults::L2C_WAYS,
            sectoring_degree: defaults::L2C_SECTORING,
            block_size: defaults::BLOCK_SIZE,
            max_reads: 1,
            max_writes: 1,
            mshr_size: defaults::L2C_MSHR,
            read_queue_size: defaults::L2C_RQ,
            write_queue_size: defaults::L2C_WQ,
            prefetch_queue_size: defaults::L2C_PQ,
            processed_queue_size: 16,
            replacement_policy: ReplacementPolicyKind::Lru,
            prefetcher: PrefetcherKind::None,
        }
    }

    fn llc_default() -> Self {
        Self {
            name: "LLC".to_string(),
            cache_type: CacheType::Llc,
            fill_level: FillLevel::Llc,
            latency: defaults::LLC_LATENCY,
            sets: defaults::LLC_SETS,
            ways: defaults::LLC_WAYS,
            sectoring_degree: defaults::LLC_SECTORING,
            block_size: defaults::BLOCK_SIZE,
            max_reads: 1,
            max_writes: 1,
            mshr_size: defaults::LLC_MSHR,
            read_queue_size: defaults::LLC_RQ,
            write_queue_size: defaults::LLC_WQ,
            prefetch_queue_size: defaults::LLC_PQ,
            processed_queue_size: 32,
            replacement_policy: ReplacementPolicyKind::Lru,
            prefetcher: PrefetcherKind::None,
        }
    }
}

/// The cache hierarchy: one `CacheConfig` per level, plus the
/// fixed-latency TLB levels (modeled only by their latency, per the
/// out-of-scope translation contract in §1).
#[derive(Debug, Clone, Deserialize)]
pub struct CacheHierarchyConfig {
    /// L1 data cache.
    #[serde(default = "CacheConfig::l1d_default")]
    pub l1d: CacheConfig,
    /// L2 (mid-level) cache.
    #[serde(default = "CacheConfig::l2c_default")]
    pub l2c: CacheConfig,
    /// Shared last-level cache.
    #[serde(default = "CacheConfig::llc_default")]
    pub llc: CacheConfig,
    /// Data TLB latency in cycles.
    #[serde(default = "CacheHierarchyConfig::default_dtlb_latency")]
    pub dtlb_latency: u64,
    /// Second-level TLB latency in cycles.
    #[serde(default = "CacheHierarchyConfig::default_stlb_latency")]
    pub stlb_latency: u64,
    /// Instruction TLB latency in cycles.
    #[serde(default = "CacheHierarchyConfig::default_itlb_latency")]
    pub itlb_latency: u64,
}

impl CacheHierarchyConfig {
    fn default_dtlb_latency() -> u64 {
        defaults::DTLB_LATENCY
    }
    fn default_stlb_latency() -> u64 {
        defaults::STLB_LATENCY
    }
    fn default_itlb_latency() -> u64 {
        defaults::ITLB_LATENCY
    }
}

impl Default for CacheHierarchyConfig {
    fn default() -> Self {
        Self {
            l1d: CacheConfig::l1d_default(),
            l2c: CacheConfig::l2c_default(),
            llc: CacheConfig::llc_default(),
            dtlb_latency: defaults::DTLB_LATENCY,
            stlb_latency: defaults::STLB_LATENCY,
            itlb_latency: defaults::ITLB_LATENCY,
        }
    }
}

/// DRAM controller configuration: topology, timing, and watermarks.
#[derive(Debug, Clone, Deserialize)]
pub struct DramConfig {
    /// Number of channels.
    #[serde(default = "DramConfig::default_channels")]
    pub channels: usize,
    /// Ranks per channel.
    #[serde(default = "DramConfig::default_ranks")]
    pub ranks: usize,
    /// Banks per rank.
    #[serde(default = "DramConfig::default_banks")]
    pub banks: usize,
    /// Rows per bank.
    #[serde(default = "DramConfig::default_rows")]
    pub rows: usize,
    /// Columns per row.
    #[serde(default = "DramConfig::default_columns")]
    pub columns: usize,
    /// Row precharge latency, CPU cycles.
    #[serde(default = "DramConfig::default_t_rp")]
    pub t_rp: u64,
    /// Row-to-column delay, CPU cycles.
    #[serde(default = "DramConfig::default_t_rcd")]
    pub t_rcd: u64,
    /// Column access latency, CPU cycles.
    #[serde(default = "DramConfig::default_t_cas")]
    pub t_cas: u64,
    /// Bus turnaround penalty applied on every read/write mode switch.
    #[serde(default = "DramConfig::default_turn_around")]
    pub dbus_turn_around: u64,
    /// Read-queue capacity, per channel.
    #[serde(default = "DramConfig::default_rq_size")]
    pub rq_size: usize,
    /// Write-queue capacity, per channel.
    #[serde(default = "DramConfig::default_wq_size")]
    pub wq_size: usize,
    /// WQ occupancy that triggers entry into write mode.
    #[serde(default = "DramConfig::default_write_high_wm")]
    pub write_high_watermark: usize,
    /// WQ occupancy (with RQ non-empty) that exits write mode.
    #[serde(default = "DramConfig::default_write_low_wm")]
    pub write_low_watermark: usize,
    /// Data bus width in bytes.
    #[serde(default = "DramConfig::default_channel_width")]
    pub channel_width_bytes: u64,
    /// DRAM data rate, mega-transfers per second.
    #[serde(default = "DramConfig::default_mtps")]
    pub dram_mtps: u64,
    /// CPU clock, MHz (used to convert the DRAM data-bus return time
    /// into CPU cycles).
    #[serde(default = "DramConfig::default_cpu_freq")]
    pub cpu_freq_mhz: u64,
    /// Cache-block size in bytes, for computing how many data-bus
    /// transfers one access occupies.
    #[serde(default = "DramConfig::default_block_size")]
    pub block_size: usize,
}

impl DramConfig {
    fn default_channels() -> usize {
        defaults::DRAM_CHANNELS
    }
    fn default_ranks() -> usize {
        defaults::DRAM_RANKS
    }
    fn default_banks() -> usize {
        defaults::DRAM_BANKS
    }
    fn default_rows() -> usize {
        defaults::DRAM_ROWS
    }
    fn default_columns() -> usize {
        defaults::DRAM_COLUMNS
    }
    fn default_t_rp() -> u64 {
        defaults::T_RP
    }
    fn default_t_rcd() -> u64 {
        defaults::T_RCD
    }
    fn default_t_cas() -> u64 {
        defaults::T_CAS
    }
    fn default_turn_around() -> u64 {
        defaults::DBUS_TURN_AROUND
    }
    fn default_rq_size() -> usize {
        defaults::DRAM_RQ_SIZE
    }
    fn default_wq_size() -> usize {
        defaults::DRAM_WQ_SIZE
    }
    fn default_write_high_wm() -> usize {
        defaults::WRITE_HIGH_WM
    }
    fn default_write_low_wm() -> usize {
        defaults::WRITE_LOW_WM
    }
    fn default_channel_width() -> u64 {
        defaults::CHANNEL_WIDTH_BYTES
    }
    fn default_mtps() -> u64 {
        defaults::DRAM_MTPS
    }
    fn default_cpu_freq() -> u64 {
        defaults::CPU_FREQ_MHZ
    }
    fn default_block_size() -> usize {
        defaults::DRAM_BLOCK_SIZE
    }
}

impl Default for DramConfig {
    fn default() -> Self {
        Self {
            channels: defaults::DRAM_CHANNELS,
            ranks: defaults::DRAM_RANKS,
            banks: defaults::DRAM_BANKS,
            rows: defaults::DRAM_ROWS,
            columns: defaults::DRAM_COLUMNS,
            t_rp: defaults::T_RP,
            t_rcd: defaults::T_RCD,
            t_cas: defaults::T_CAS,
            dbus_turn_around: defaults::DBUS_TURN_AROUND,
            rq_size: defaults::DRAM_RQ_SIZE,
            wq_size: defaults::DRAM_WQ_SIZE,
            write_high_watermark: defaults::WRITE_HIGH_WM,
            write_low_watermark: defaults::WRITE_LOW_WM,
            channel_width_bytes: defaults::CHANNEL_WIDTH_BYTES,
            dram_mtps: defaults::DRAM_MTPS,
            cpu_freq_mhz: defaults::CPU_FREQ_MHZ,
            block_size: defaults::DRAM_BLOCK_SIZE,
        }
    }
}

/// Off-chip (hashed-perceptron) predictor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    /// Which feature tables are active; summed at prediction time.
    #[serde(default = "PredictorConfig::default_features")]
    pub features: Vec<PredictorFeature>,
    /// Per-feature counter-table size.
    #[serde(default = "PredictorConfig::default_table_size")]
    pub table_size: usize,
    /// Saturating counter upper bound (inclusive).
    #[serde(default = "PredictorConfig::default_counter_max")]
    pub counter_max: i16,
    /// Saturating counter lower bound (inclusive).
    #[serde(default = "PredictorConfig::default_counter_min")]
    pub counter_min: i16,
    /// Classification threshold τ: `sum >= τ` predicts off-chip.
    #[serde(default = "PredictorConfig::default_threshold")]
    pub threshold: i32,
    /// Number of trailing load PCs folded into the signature feature.
    #[serde(default = "PredictorConfig::default_last_n")]
    pub last_n_load_pcs: usize,
}

impl PredictorConfig {
    fn default_features() -> Vec<PredictorFeature> {
        vec![
            PredictorFeature::Pc,
            PredictorFeature::PcOffset,
            PredictorFeature::PcFirstAccess,
            PredictorFeature::OffsetFirstAccess,
            PredictorFeature::PcCacheLineWordOffset,
            PredictorFeature::LastNLoadPcs,
        ]
    }
    fn default_table_size() -> usize {
        defaults::PREDICTOR_TABLE_SIZE
    }
    fn default_counter_max() -> i16 {
        defaults::COUNTER_MAX
    }
    fn default_counter_min() -> i16 {
        defaults::COUNTER_MIN
    }
    fn default_threshold() -> i32 {
        defaults::PREDICTOR_THRESHOLD
    }
    fn default_last_n() -> usize {
        defaults::LAST_N_LOAD_PCS
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            features: Self::default_features(),
            table_size: defaults::PREDICTOR_TABLE_SIZE,
            counter_max: defaults::COUNTER_MAX,
            counter_min: defaults::COUNTER_MIN,
            threshold: defaults::PREDICTOR_THRESHOLD,
            last_n_load_pcs: defaults::LAST_N_LOAD_PCS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_consistent() {
        let cfg = Config::default();
        assert!(cfg.caches.l1d.sets > 0);
        assert_eq!(cfg.dram.write_high_watermark, 48);
        assert_eq!(cfg.dram.write_low_watermark, 16);
        assert_eq!(cfg.predictor.counter_max, 31);
        assert_eq!(cfg.predictor.counter_min, -32);
    }

    #[test]
    fn fill_level_main_order() {
        assert!(FillLevel::L1 < FillLevel::L2);
        assert!(FillLevel::L2 < FillLevel::Llc);
        assert!(FillLevel::Llc < FillLevel::Dram);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let json = r#"{ "sim": { "warmup_instructions": 5 } }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.sim.warmup_instructions, 5);
        assert_eq!(cfg.caches.llc.sets, defaults::LLC_SETS);
    }
}
