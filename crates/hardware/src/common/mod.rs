//! Common types shared across the memory-hierarchy simulator.
//!
//! 1. **Address types:** virtual, physical, and cache-block addresses.
//! 2. **Error handling:** the fatal `SimError` taxonomy and translation
//!    results from the DTLB/STLB stub.

/// Address type definitions (physical, virtual, and block addresses).
pub mod addr;

/// Fatal error types and address-translation results.
pub mod error;

pub use addr::{BlockAddr, PhysAddr, VirtAddr, BLOCK_SIZE};
pub use error::{PacketId, SimError, TranslationResult};
