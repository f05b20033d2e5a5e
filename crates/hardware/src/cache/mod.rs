//! The cache subsystem: packets, fill paths, MSHRs, queues, replacement
//! policies, and the sectored cache array itself.

/// In-flight request packets and the fill-path stack they carry.
pub mod packet;
/// Miss Status Holding Register table.
pub mod mshr;
/// Bounded ring-buffer admission queues (RQ/WQ/PQ/processed).
pub mod queue;
/// Replacement-policy plugins (LRU, PLRU, FIFO, random, MRU).
pub mod policies;
/// The sectored set-associative cache array.
pub mod sector;

pub use mshr::{AllocateOutcome, MshrEntry, MshrState, MshrTable};
pub use packet::{CacheId, FillPath, FillPathEntry, Packet, PacketType, RouteBucket};
pub use queue::{Admit, RingQueue};
pub use sector::{CacheEvent, CacheStats, SectoredCache};
