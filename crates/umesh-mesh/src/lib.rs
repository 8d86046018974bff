//! Mesh networking core for the umesh stack.
//!
//! This crate holds the cooperative [`Scheduler`](scheduler::Scheduler) that
//! drives the stack, the interface and network-context manager, leader-driven
//! network data, 6LoWPAN-style fragmentation and reassembly, and the bitmap
//! short-ID allocator. [`MeshStack`](stack::MeshStack) owns one instance of
//! each and wires them to the radios registered in a
//! [`HalRegistry`](umesh_hal::HalRegistry).

pub mod error;
pub mod fragments;
pub mod interface;
pub mod kv;
pub mod message;
pub mod network_data;
pub mod scheduler;
pub mod sid;
pub mod stack;

pub use error::{
    InterfaceError, KvError, MeshError, NetworkDataError, ReassemblyError, SchedulerError,
    SidError,
};
pub use fragments::Fragments;
pub use interface::{HalContext, HalId, Interfaces, NetworkContext, NetworkId};
pub use kv::{KvStore, MemoryKv};
pub use message::{Message, MessageInfo, MessagePriority};
pub use network_data::{NetworkData, NetworkDataState, StableNetworkData};
pub use scheduler::{Handler, Scheduler, TaskArg};
pub use sid::{NodeId, NodeType, SidAllocator};
pub use stack::{MeshConfig, MeshStack};
