//! Fatal invariant violations and address-translation results.
//!
//! This module defines the error taxonomy for the simulator. It provides:
//! 1. **`SimError`:** the fatal half of the error taxonomy — invariant
//!    violations that abort the run, identified by the offending packet.
//! 2. **`TranslationResult`:** the outcome of an MMU/TLB lookup.
//!
//! Back-pressure (queue full, MSHR full) and ignorable conditions (a
//! dropped DDRP request) are *not* represented here; they are ordinary
//! enum returns (see `cache::queue::Admit`) because retrying them is
//! part of normal operation, not an error.

use std::fmt;

use crate::common::addr::PhysAddr;
use crate::config::FillLevel;

/// Identifies the packet a fatal error was raised against, for the
/// message printed on exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketId {
    /// Owning CPU.
    pub cpu: u8,
    /// Cache-block address of the request.
    pub block_addr: u64,
    /// Highest fill level the request must refill.
    pub fill_level: FillLevel,
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu={} block={:#x} fill_level={:?}",
            self.cpu, self.block_addr, self.fill_level
        )
    }
}

/// Fatal invariant violations: conditions that indicate a bug in the
/// simulator itself rather than a condition the caller should retry.
///
/// Every variant carries enough context to reconstruct the offending
/// packet identity for the message the CLI prints on exit code 1.
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum SimError {
    /// Two live MSHR entries in the same cache share `(cpu, block_addr)`.
    #[error("duplicate MSHR for {0}")]
    DuplicateMshr(PacketId),

    /// `push_fill_path` was called with a cache whose `fill_level` is
    /// not strictly less than the current top of stack.
    #[error("fill_path push out of order for {0}")]
    FillPathOutOfOrder(PacketId),

    /// `pop_fill_path` was called on an empty stack.
    #[error("pop from empty fill_path for {0}")]
    FillPathPopEmpty(PacketId),

    /// `merge_fill_path` was attempted between packets with different
    /// block addresses.
    #[error("fill_path merge of mismatched block addresses for {0}")]
    FillPathMergeMismatch(PacketId),

    /// The DRAM read queue received two demand (non-DDRP) requests for
    /// the same `(cpu, block_addr)` slot.
    #[error("DRAM RQ overlay of two demand requests for {0}")]
    DramDemandCollision(PacketId),

    /// `return_data` observed an MSHR fill_path that is not a suffix of
    /// the returning packet's fill_path.
    #[error("inconsistent fill_path on return for {0}")]
    FillPathInconsistentOnReturn(PacketId),

    /// The CPU index recorded on a packet does not match the CPU index
    /// of the cache at the top of its fill_path.
    #[error("cpu index mismatch between packet and fill_path top for {0}")]
    CpuMismatch(PacketId),

    /// Allocating an MSHR failed: the table is full and no existing
    /// entry coalesces with the new packet.
    #[error("MSHR table full with no coalesce candidate for {0}")]
    MshrFullNoCoalesce(PacketId),

    /// Configuration document failed validation (malformed JSON or an
    /// out-of-range field such as a zero-sized queue).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The trace file could not be opened or decoded.
    #[error("trace error: {0}")]
    Trace(String),
}

/// Result of a virtual-to-physical address translation (DTLB/STLB).
///
/// The translation path is modeled as a fixed-latency black box per
/// the collaborator contract of §4.8; it never faults in this
/// simulator (there is no page table to walk), but the `fault` slot is
/// kept so the interface matches what a real MMU would expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TranslationResult {
    /// The translated physical address.
    pub paddr: PhysAddr,
    /// Number of cycles consumed by the translation operation.
    pub cycles: u64,
}

impl TranslationResult {
    /// Creates a translation result for a successful lookup.
    #[inline]
    #[must_use]
    pub fn new(paddr: PhysAddr, cycles: u64) -> Self {
        Self { paddr, cycles }
    }
}
