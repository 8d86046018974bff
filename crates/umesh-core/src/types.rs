//! Newtype wrappers for mesh addressing fields.
//!
//! These types keep short IDs, mesh network IDs and node identities apart
//! even though several of them share a `u16` representation on the wire.

use core::fmt;

use crate::constants::{
    BCAST_NETID, BCAST_SID, INVALID_NETID, INVALID_SID, MAX_MAC_LEN, UUID_LEN,
};

/// Helper to write lowercase hex without pulling in the `hex` crate.
fn fmt_hex(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in bytes {
        write!(f, "{:02x}", byte)?;
    }
    Ok(())
}

/// Error returned when a byte slice has the wrong length for a fixed-size type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidLength {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for InvalidLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid length: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidLength {}

/// Stable 8-byte node identity, usually derived from the radio's EUI-64.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[must_use]
pub struct Uuid(pub(crate) [u8; UUID_LEN]);

impl Uuid {
    pub const fn new(bytes: [u8; UUID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a UUID whose big-endian encoding is `value`.
    pub const fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn as_bytes(&self) -> &[u8; UUID_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Uuid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Uuid {
    type Error = InvalidLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; UUID_LEN] = bytes.try_into().map_err(|_| InvalidLength {
            expected: UUID_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hex(&self.0, f)
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid(")?;
        fmt_hex(&self.0, f)?;
        write!(f, ")")
    }
}

/// Short routable address assigned by a SID allocator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Sid(pub u16);

impl Sid {
    pub const BROADCAST: Sid = Sid(BCAST_SID);
    pub const INVALID: Sid = Sid(INVALID_SID);

    /// Whether this ID can name a single node (neither sentinel).
    pub const fn is_unique(&self) -> bool {
        self.0 != BCAST_SID && self.0 != INVALID_SID
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl fmt::Debug for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sid({:04x})", self.0)
    }
}

/// 16-bit mesh network identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshNetId(pub u16);

impl MeshNetId {
    pub const BROADCAST: MeshNetId = MeshNetId(BCAST_NETID);
    pub const INVALID: MeshNetId = MeshNetId(INVALID_NETID);

    /// Whether this ID can name a real network (neither sentinel).
    pub const fn is_unique(&self) -> bool {
        self.0 != BCAST_NETID && self.0 != INVALID_NETID
    }

    pub const fn to_be_bytes(&self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for MeshNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl fmt::Debug for MeshNetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MeshNetId({:04x})", self.0)
    }
}

/// Link-layer address of up to 8 bytes (6 for WiFi/BLE, 8 for 802.15.4).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress {
    addr: [u8; MAX_MAC_LEN],
    len: u8,
}

impl MacAddress {
    /// Build from a slice of at most 8 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidLength> {
        if bytes.is_empty() || bytes.len() > MAX_MAC_LEN {
            return Err(InvalidLength {
                expected: MAX_MAC_LEN,
                actual: bytes.len(),
            });
        }
        let mut addr = [0u8; MAX_MAC_LEN];
        addr[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            addr,
            len: bytes.len() as u8,
        })
    }

    pub const fn eui48(bytes: [u8; 6]) -> Self {
        Self {
            addr: [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], 0, 0],
            len: 6,
        }
    }

    pub const fn eui64(bytes: [u8; 8]) -> Self {
        Self {
            addr: bytes,
            len: 8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.addr[..self.len as usize]
    }

    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::ToString;

    #[test]
    fn uuid_display_and_debug() {
        let uuid = Uuid::from_u64(0x0102_0304_0506_0708);
        assert_eq!(uuid.to_string(), "0102030405060708");
        assert_eq!(format!("{uuid:?}"), "Uuid(0102030405060708)");
    }

    #[test]
    fn uuid_try_from_rejects_wrong_length() {
        let err = Uuid::try_from(&[1u8, 2, 3][..]).unwrap_err();
        assert_eq!(err.expected, 8);
        assert_eq!(err.actual, 3);
        assert!(Uuid::try_from(&[0u8; 8][..]).is_ok());
    }

    #[test]
    fn sentinels_are_not_unique() {
        assert!(!Sid::BROADCAST.is_unique());
        assert!(!Sid::INVALID.is_unique());
        assert!(Sid(1).is_unique());
        assert!(!MeshNetId::BROADCAST.is_unique());
        assert!(!MeshNetId::INVALID.is_unique());
        assert!(MeshNetId(0x1200).is_unique());
    }

    #[test]
    fn mac_address_formats() {
        let mac = MacAddress::eui48([0x02, 0, 0, 0, 0, 0x01]);
        assert_eq!(mac.len(), 6);
        assert_eq!(mac.to_string(), "02:00:00:00:00:01");

        let long = MacAddress::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(long, MacAddress::eui64([1, 2, 3, 4, 5, 6, 7, 8]));
        assert!(MacAddress::from_slice(&[0u8; 9]).is_err());
        assert!(MacAddress::from_slice(&[]).is_err());
    }
}
