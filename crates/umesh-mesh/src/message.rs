//! Datagrams moving through the stack and the metadata that travels with them.

use umesh_core::{MacAddress, Sid};

use crate::interface::{HalId, NetworkId};

/// Number of send priority levels per [`HalContext`](crate::interface::HalContext).
pub const QUEUE_SIZE: usize = 3;

/// Send priority. Lower values drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessagePriority {
    /// Mesh management traffic.
    Command = 0,
    /// Application datagrams.
    Data = 1,
    /// Held until a route or neighbor becomes available.
    Pending = 2,
}

impl MessagePriority {
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub src: Sid,
    pub dest: Sid,
    /// Link-layer address the frame arrived from or is sent to.
    pub mac: Option<MacAddress>,
    pub network: Option<NetworkId>,
    pub hal: Option<HalId>,
    pub rssi: i8,
}

impl Default for MessageInfo {
    fn default() -> Self {
        Self {
            src: Sid::INVALID,
            dest: Sid::BROADCAST,
            mac: None,
            network: None,
            hal: None,
            rssi: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub payload: Vec<u8>,
    pub info: MessageInfo,
}

impl Message {
    pub fn new(payload: Vec<u8>, info: MessageInfo) -> Self {
        Self { payload, info }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
