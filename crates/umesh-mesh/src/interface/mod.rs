//! Radio interfaces and the logical networks running over them.
//!
//! Each bound radio module gets one [`HalContext`] holding its neighbor
//! table, send and receive queues and link statistics. Each logical mesh
//! network is a [`NetworkContext`] referring to its radio by [`HalId`].
//! [`Interfaces`] owns both arenas; handles stay valid until
//! [`Interfaces::stop`].

mod context;
mod manager;
pub mod timing;

pub use context::{
    HalContext, HalId, InterfaceState, LinkStats, Neighbor, NeighborState, NetworkContext,
    NetworkId, RouterId,
};
pub use manager::{InterfaceOptions, Interfaces, TeardownStats};
pub use timing::MediaTiming;
