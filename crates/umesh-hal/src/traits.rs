//! Radio capability trait and the frame types it exchanges.

use std::sync::Arc;

use umesh_core::{MacAddress, MediaType};

use crate::error::HalError;

/// Longest extended network ID a radio can carry (e.g. a WiFi SSID suffix).
pub const MAX_EXTNETID_LEN: usize = 16;

/// A raw link-layer frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub data: Vec<u8>,
    /// Security key index, negative when the frame is sent in the clear.
    pub key_index: i8,
}

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            key_index: -1,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Metadata delivered with each received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub peer: MacAddress,
    pub channel: u8,
    pub rssi: i8,
    pub key_index: i8,
}

/// Outcome reported to a send completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    Failed,
}

/// Link-layer frame counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub in_frames: u32,
    pub out_frames: u32,
}

/// Extended network identifier carried in radio beacons.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtNetId(Vec<u8>);

impl ExtNetId {
    pub fn new(bytes: &[u8]) -> Result<Self, HalError> {
        if bytes.len() > MAX_EXTNETID_LEN {
            return Err(HalError::Driver(format!(
                "extended network id of {} bytes exceeds {MAX_EXTNETID_LEN}",
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Called once when a frame has left the radio (or failed to).
pub type SentCallback = Box<dyn FnOnce(SendStatus) + Send>;

/// Called from the radio's context for every received frame.
pub type ReceiveCallback = Arc<dyn Fn(Frame, FrameInfo) + Send + Sync>;

/// Capability table for one radio backend.
///
/// Every capability except identity defaults to [`HalError::Unsupported`],
/// so a driver only implements what its hardware can do. Calls are expected
/// to be non-blocking; completion is reported through callbacks.
pub trait HalModule: Send + Sync {
    // -- Identity --

    /// Human-readable driver name.
    fn name(&self) -> &str;

    /// Radio medium this module drives.
    fn media_type(&self) -> MediaType;

    // -- Lifecycle --

    /// Low-level initialization. Modules without an init step succeed.
    fn init(&self) -> Result<(), HalError> {
        Ok(())
    }

    fn enable(&self) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    fn disable(&self) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    // -- Data path --

    fn send_ucast(
        &self,
        _frame: &Frame,
        _dest: &MacAddress,
        _sent: Option<SentCallback>,
    ) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    fn send_bcast(&self, _frame: &Frame, _sent: Option<SentCallback>) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    fn register_receiver(&self, _received: ReceiveCallback) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    fn ucast_mtu(&self) -> Result<usize, HalError> {
        Err(HalError::Unsupported)
    }

    fn bcast_mtu(&self) -> Result<usize, HalError> {
        Err(HalError::Unsupported)
    }

    // -- Channel control --

    fn set_channel(&self, _channel: u8) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    fn channel(&self) -> Result<u8, HalError> {
        Err(HalError::Unsupported)
    }

    fn channel_list(&self) -> Result<Vec<u8>, HalError> {
        Err(HalError::Unsupported)
    }

    fn set_txpower(&self, _power: i8) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    fn txpower(&self) -> Result<i8, HalError> {
        Err(HalError::Unsupported)
    }

    // -- Addressing --

    fn set_extnetid(&self, _extnetid: &ExtNetId) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    fn extnetid(&self) -> Result<ExtNetId, HalError> {
        Err(HalError::Unsupported)
    }

    fn mac_address(&self) -> Result<MacAddress, HalError> {
        Err(HalError::Unsupported)
    }

    // -- Power --

    fn radio_wakeup(&self) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    fn radio_sleep(&self) -> Result<(), HalError> {
        Err(HalError::Unsupported)
    }

    fn stats(&self) -> Result<FrameStats, HalError> {
        Err(HalError::Unsupported)
    }
}
