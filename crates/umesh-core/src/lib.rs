//! Core types, constants, and wire formats for the umesh mesh stack.
//!
//! This crate defines the addressing newtypes (short IDs, mesh network IDs,
//! node UUIDs, MAC addresses), device roles and modes, radio media types,
//! and the FRAG1/FRAGN fragmentation header codec shared by every layer.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod constants;
pub mod error;
pub mod frag;
pub mod types;

pub use constants::{DeviceState, MediaType, NodeMode, SidType};
pub use error::FrameError;
pub use frag::FragHeader;
pub use types::{MacAddress, MeshNetId, Sid, Uuid};
