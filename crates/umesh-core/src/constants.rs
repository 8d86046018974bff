//! Protocol constants and enumerations for the umesh stack.

// Mesh network ID sentinels
pub const BCAST_NETID: u16 = 0xffff;
pub const INVALID_NETID: u16 = 0xfffe;

// Short ID sentinels
pub const BCAST_SID: u16 = 0xffff;
pub const INVALID_SID: u16 = 0xfffe;

// Address sizes
pub const UUID_LEN: usize = 8;
pub const MAX_MAC_LEN: usize = 8;

/// Radio medium backing a HAL module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MediaType {
    Default = 0,
    Wifi = 1,
    Ble = 2,
    Ieee802154 = 3,
}

impl MediaType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MediaType::Default),
            1 => Some(MediaType::Wifi),
            2 => Some(MediaType::Ble),
            3 => Some(MediaType::Ieee802154),
            _ => None,
        }
    }

    /// Parse a configuration name (`"wifi"`, `"ble"`, `"802.15.4"`).
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "default" => Some(MediaType::Default),
            "wifi" => Some(MediaType::Wifi),
            "ble" => Some(MediaType::Ble),
            "802.15.4" | "15.4" | "ieee802154" => Some(MediaType::Ieee802154),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MediaType::Default => "default",
            MediaType::Wifi => "wifi",
            MediaType::Ble => "ble",
            MediaType::Ieee802154 => "802.15.4",
        }
    }
}

/// Role of the local device in the mesh, set by the routing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceState {
    Disabled = 0,
    Detached = 1,
    Attached = 2,
    Leaf = 3,
    Router = 4,
    SuperRouter = 5,
    Leader = 6,
}

impl DeviceState {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "disabled" => Some(DeviceState::Disabled),
            "detached" => Some(DeviceState::Detached),
            "attached" => Some(DeviceState::Attached),
            "leaf" => Some(DeviceState::Leaf),
            "router" => Some(DeviceState::Router),
            "super_router" | "superrouter" => Some(DeviceState::SuperRouter),
            "leader" => Some(DeviceState::Leader),
            _ => None,
        }
    }
}

/// Device mode flags.
///
/// ```text
/// Bit 0: SUPER   (device may run a backbone router)
/// Bit 1: LEADER  (device prefers leadership)
/// Bit 2: RX_ON   (radio receives always, no duty cycling)
/// Bit 3: MOBILE  (device roams, never owns a mesh network ID)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeMode(u8);

impl NodeMode {
    pub const NONE: NodeMode = NodeMode(0x00);
    pub const SUPER: NodeMode = NodeMode(0x01);
    pub const LEADER: NodeMode = NodeMode(0x02);
    pub const RX_ON: NodeMode = NodeMode(0x04);
    pub const MOBILE: NodeMode = NodeMode(0x08);

    pub const fn from_bits(bits: u8) -> Self {
        NodeMode(bits & 0x0f)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: NodeMode) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: NodeMode) -> Self {
        NodeMode(self.0 | other.0)
    }

    pub fn insert(&mut self, other: NodeMode) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: NodeMode) {
        self.0 &= !other.0;
    }
}

impl core::ops::BitOr for NodeMode {
    type Output = NodeMode;

    fn bitor(self, rhs: NodeMode) -> NodeMode {
        self.union(rhs)
    }
}

/// Short ID address space flavor used by a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SidType {
    /// Hierarchical IDs derived from the parent's prefix.
    Structured = 0,
    /// 8-bit randomly assigned IDs.
    ShortRandom = 1,
    /// Full 16-bit randomly assigned IDs.
    Random = 2,
}

impl SidType {
    /// Raw size of the address space before the pool cap is applied.
    pub const fn space_size(&self) -> usize {
        match self {
            SidType::Structured | SidType::ShortRandom => 1 << 8,
            // 0xfffe and 0xffff are the invalid and broadcast sentinels
            SidType::Random => (1 << 16) - 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_roundtrip_names() {
        for media in [
            MediaType::Default,
            MediaType::Wifi,
            MediaType::Ble,
            MediaType::Ieee802154,
        ] {
            assert_eq!(MediaType::from_name(media.name()), Some(media));
            assert_eq!(MediaType::from_u8(media as u8), Some(media));
        }
        assert_eq!(MediaType::from_name("lora"), None);
        assert_eq!(MediaType::from_u8(9), None);
    }

    #[test]
    fn node_mode_flags() {
        let mut mode = NodeMode::SUPER | NodeMode::RX_ON;
        assert!(mode.contains(NodeMode::SUPER));
        assert!(mode.contains(NodeMode::RX_ON));
        assert!(!mode.contains(NodeMode::MOBILE));

        mode.insert(NodeMode::MOBILE);
        assert!(mode.contains(NodeMode::MOBILE));
        mode.remove(NodeMode::SUPER);
        assert!(!mode.contains(NodeMode::SUPER));
        assert_eq!(mode.bits(), 0x0c);
        assert_eq!(NodeMode::from_bits(0xff).bits(), 0x0f);
    }

    #[test]
    fn device_state_names() {
        assert_eq!(DeviceState::from_name("leader"), Some(DeviceState::Leader));
        assert_eq!(
            DeviceState::from_name("super_router"),
            Some(DeviceState::SuperRouter)
        );
        assert_eq!(DeviceState::from_name("boss"), None);
    }

    #[test]
    fn sid_space_sizes() {
        assert_eq!(SidType::ShortRandom.space_size(), 256);
        assert_eq!(SidType::Random.space_size(), 65534);
    }
}
