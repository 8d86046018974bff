//! Radio hardware abstraction for the umesh mesh stack.
//!
//! A [`HalModule`] describes one radio backend (WiFi, BLE, 802.15.4) as a
//! capability trait whose methods default to "unsupported". The
//! [`HalRegistry`] keeps the registered modules in order and dispatches
//! capability calls, resolving an omitted module to the first one registered.

pub mod error;
pub mod registry;
pub mod sim;
pub mod traits;

pub use error::HalError;
pub use registry::{HalRegistry, ModuleId};
pub use sim::{SentFrame, SimRadio};
pub use traits::{
    ExtNetId, Frame, FrameInfo, FrameStats, HalModule, ReceiveCallback, SendStatus,
    SentCallback,
};
