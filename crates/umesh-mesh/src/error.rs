//! Error types for the mesh layer.

use umesh_core::{DeviceState, FrameError, SidType};
use umesh_hal::HalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterfaceError {
    #[error("no radio is bound")]
    NoRadios,

    #[error("network contexts already created")]
    AlreadyStarted,

    #[error("unknown hal context: {0}")]
    NoSuchHal(usize),

    #[error("unknown network context: {0}")]
    NoSuchNetwork(u8),

    #[error("hal context {0} is not enabled")]
    HalDisabled(usize),

    #[error("hal context {hal} already has a {router} network")]
    DuplicateNetwork { hal: usize, router: &'static str },

    #[error("network index space exhausted")]
    TooManyNetworks,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkDataError {
    #[error("version {incoming} is not newer than {current}")]
    VersionTooOld { incoming: u8, current: u8 },

    #[error("operation not permitted in state {0:?}")]
    RoleNotPermitted(DeviceState),

    #[error("main version {0} out of range (max 7)")]
    InvalidMainVersion(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    #[error("duplicate fragment")]
    Duplicate,

    #[error("fragment gap: expected offset {expected}, got {offset}")]
    Gap { expected: usize, offset: usize },

    #[error("no reassembly in progress for fragment")]
    Unmatched,

    #[error("unrecognized dispatch: {0:#04x}")]
    Unrecognized(u8),

    #[error("malformed fragment: {0}")]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SidError {
    #[error("short id space exhausted ({0:?})")]
    OutOfSpace(SidType),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KvError {
    #[error("kv backend error: {0}")]
    Backend(String),
}

/// Top-level error for [`MeshStack`](crate::stack::MeshStack) operations.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("hal error: {0}")]
    Hal(#[from] HalError),

    #[error("interface error: {0}")]
    Interface(#[from] InterfaceError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("network data error: {0}")]
    NetworkData(#[from] NetworkDataError),

    #[error("sid error: {0}")]
    Sid(#[from] SidError),

    #[error("stack not started")]
    NotStarted,

    #[error("network {0} is down")]
    NetworkDown(u8),

    #[error("stack already started")]
    AlreadyStarted,
}
