//! Short-ID allocation.
//!
//! Routers hand out short IDs (SIDs) to attaching nodes from a bounded
//! address space, keyed by the node's stable UUID. [`SidBitmap`] tracks which
//! IDs are claimed; [`SidAllocator`] keeps the UUID to SID records on top.

mod allocator;
mod bitmap;

pub use allocator::{MAX_SID_POOL_SIZE, NodeId, NodeType, SidAllocator, SidNode};
pub use bitmap::SidBitmap;
