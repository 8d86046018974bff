//! Error types for the umesh-core crate.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    TooShort { min: usize, actual: usize },
    UnknownDispatch(u8),
    DatagramTooLarge(usize),
    MisalignedOffset(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::TooShort { min, actual } => {
                write!(f, "frame too short: need at least {min} bytes, got {actual}")
            }
            FrameError::UnknownDispatch(v) => write!(f, "unknown dispatch: 0x{v:02x}"),
            FrameError::DatagramTooLarge(size) => {
                write!(f, "datagram too large for fragmentation: {size} bytes")
            }
            FrameError::MisalignedOffset(offset) => {
                write!(f, "fragment offset {offset} is not a multiple of 8")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}
