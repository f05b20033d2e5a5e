//! Out-of-order core collaborator contract: the reorder buffer and its
//! load/store queues. The cache hierarchy treats these as opaque
//! producers/consumers of packets; this module only models the slice
//! of their behavior the memory system depends on — issuing loads and
//! stores, tracking in-flight state, and retiring with
//! store-to-load forwarding and predictor training.

/// Reorder buffer: per-CPU ring of in-flight instructions.
pub mod rob;
/// Load queue: in-flight loads, predictor snapshots, and wakeups.
pub mod lq;
/// Store queue: in-flight stores and store-to-load forwarding.
pub mod sq;

pub use lq::{LoadQueue, LqEntry};
pub use rob::{ReorderBuffer, RobEntry};
pub use sq::{StoreQueue, SqEntry};
