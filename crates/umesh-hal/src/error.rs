//! Error types for the HAL layer.

/// Errors returned by HAL capability dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HalError {
    /// No module is registered, or the module lacks the capability.
    #[error("capability not supported")]
    Unsupported,
    #[error("radio not enabled")]
    NotEnabled,
    #[error("invalid channel: {0}")]
    InvalidChannel(u8),
    #[error("frame of {size} bytes exceeds MTU {mtu}")]
    FrameTooLarge { size: usize, mtu: usize },
    #[error("driver error: {0}")]
    Driver(String),
}
