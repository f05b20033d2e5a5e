//! Cycle-accurate, trace-driven memory-hierarchy simulator.
//!
//! This crate implements:
//! 1. **Cache:** sectored set-associative caches (L1D/L2C/LLC), MSHR
//!    coalescing, admission queues, and pluggable replacement policies.
//! 2. **Fill path:** the ordered notification stack a request carries
//!    through the hierarchy, and the routing table deciding where a
//!    miss travels next.
//! 3. **DRAM:** a per-channel, per-bank row-buffer controller with
//!    JEDEC-style timing and watermark-driven write draining.
//! 4. **Predictor:** a hashed-perceptron off-chip load predictor that
//!    forecasts, at L1D-miss time, whether a load will resolve from
//!    the LLC or from DRAM, and speculatively primes DRAM when it does.
//! 5. **Out-of-order core:** the reorder buffer, load queue, and store
//!    queue collaborator contract the memory system is driven by.
//! 6. **Simulation:** `Simulator`, the binary trace reader, and
//!    configuration and statistics plumbing.

/// Common types and constants (addresses, block addresses, errors).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical structures).
pub mod config;
/// Sectored caches, packets, fill paths, MSHRs, queues, replacement policies.
pub mod cache;
/// Fill-path routing and DDRP-request injection.
pub mod fillpath;
/// DRAM controller: channels, banks, row-buffer timing, write drain.
pub mod dram;
/// Hashed-perceptron off-chip load predictor.
pub mod predictor;
/// Hardware prefetcher implementations.
pub mod prefetch;
/// Out-of-order core collaborator contract (ROB, LQ, SQ).
pub mod ooo;
/// Top-level `Simulator` and the binary trace reader.
pub mod sim;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; deserialize from JSON via `--config`.
pub use crate::config::Config;
/// Top-level simulator; owns every core's caches plus the shared LLC and DRAM.
pub use crate::sim::Simulator;
/// Final aggregated statistics, printed via `SimStats::print_sections`.
pub use crate::stats::SimStats;
