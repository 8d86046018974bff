//! Runnable node for the umesh mesh stack.
//!
//! This crate wires the mesh layer to simulated radios described in a TOML
//! configuration, persists mesh state to disk, and drives the stack's
//! scheduler on the tokio runtime.

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod storage;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{Node, ShutdownHandle};
pub use storage::FileKv;
