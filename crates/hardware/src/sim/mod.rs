//! Top-level simulation: the `Simulator` driving the cache hierarchy
//! and DRAM controller, and the trace reader feeding each core.

/// The `Simulator` type and its per-cycle tick order.
pub mod simulator;
/// Binary trace reader with transparent decompression and looping.
pub mod trace;

pub use simulator::Simulator;
pub use trace::{TraceFormat, TraceInstruction, TraceReader};
