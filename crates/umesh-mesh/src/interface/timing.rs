//! Per-medium protocol intervals, in milliseconds.

use umesh_core::MediaType;

pub const WIFI_DISCOVERY_TIMEOUT: u64 = 400;
pub const WIFI_AUTH_REQUEST_TIMEOUT: u64 = 2_000;
pub const WIFI_AUTH_RELAY_TIMEOUT: u64 = 2_000;
pub const WIFI_AUTH_RESPONSE_TIMEOUT: u64 = 3_000;
pub const WIFI_LINK_QUALITY_TIMEOUT: u64 = 30_000;
pub const WIFI_LINK_QUALITY_MOBILE_TIMEOUT: u64 = 1_000;
pub const WIFI_NEIGHBOR_ALIVE_TIMEOUT: u64 = 120_000;
pub const WIFI_ADVERTISEMENT_TIMEOUT: u64 = 20_000;

pub const BLE_DISCOVERY_TIMEOUT: u64 = 1_000;
pub const BLE_AUTH_REQUEST_TIMEOUT: u64 = 10_000;
pub const BLE_AUTH_RELAY_TIMEOUT: u64 = 10_000;
pub const BLE_AUTH_RESPONSE_TIMEOUT: u64 = 12_000;
pub const BLE_LINK_QUALITY_TIMEOUT: u64 = 60_000;
pub const BLE_LINK_QUALITY_MOBILE_TIMEOUT: u64 = 4_000;
pub const BLE_NEIGHBOR_ALIVE_TIMEOUT: u64 = 240_000;
pub const BLE_ADVERTISEMENT_TIMEOUT: u64 = 60_000;

pub const IEEE154_DISCOVERY_TIMEOUT: u64 = 800;
pub const IEEE154_AUTH_REQUEST_TIMEOUT: u64 = 4_000;
pub const IEEE154_AUTH_RELAY_TIMEOUT: u64 = 4_000;
pub const IEEE154_AUTH_RESPONSE_TIMEOUT: u64 = 6_000;
pub const IEEE154_LINK_QUALITY_TIMEOUT: u64 = 30_000;
pub const IEEE154_LINK_QUALITY_MOBILE_TIMEOUT: u64 = 2_000;
pub const IEEE154_NEIGHBOR_ALIVE_TIMEOUT: u64 = 120_000;
pub const IEEE154_ADVERTISEMENT_TIMEOUT: u64 = 30_000;

/// Protocol intervals for one radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaTiming {
    pub discovery_interval: u64,
    pub auth_request_interval: u64,
    pub auth_relay_interval: u64,
    pub auth_response_interval: u64,
    pub link_quality_update_interval: u64,
    pub neighbor_alive_interval: u64,
    pub advertisement_interval: u64,
}

impl MediaTiming {
    /// Intervals for `media`. Mobile nodes refresh link quality faster.
    ///
    /// Generic media use the 802.15.4 table.
    pub fn for_media(media: MediaType, mobile: bool) -> Self {
        match media {
            MediaType::Wifi => Self {
                discovery_interval: WIFI_DISCOVERY_TIMEOUT,
                auth_request_interval: WIFI_AUTH_REQUEST_TIMEOUT,
                auth_relay_interval: WIFI_AUTH_RELAY_TIMEOUT,
                auth_response_interval: WIFI_AUTH_RESPONSE_TIMEOUT,
                link_quality_update_interval: if mobile {
                    WIFI_LINK_QUALITY_MOBILE_TIMEOUT
                } else {
                    WIFI_LINK_QUALITY_TIMEOUT
                },
                neighbor_alive_interval: WIFI_NEIGHBOR_ALIVE_TIMEOUT,
                advertisement_interval: WIFI_ADVERTISEMENT_TIMEOUT,
            },
            MediaType::Ble => Self {
                discovery_interval: BLE_DISCOVERY_TIMEOUT,
                auth_request_interval: BLE_AUTH_REQUEST_TIMEOUT,
                auth_relay_interval: BLE_AUTH_RELAY_TIMEOUT,
                auth_response_interval: BLE_AUTH_RESPONSE_TIMEOUT,
                link_quality_update_interval: if mobile {
                    BLE_LINK_QUALITY_MOBILE_TIMEOUT
                } else {
                    BLE_LINK_QUALITY_TIMEOUT
                },
                neighbor_alive_interval: BLE_NEIGHBOR_ALIVE_TIMEOUT,
                advertisement_interval: BLE_ADVERTISEMENT_TIMEOUT,
            },
            MediaType::Ieee802154 | MediaType::Default => Self {
                discovery_interval: IEEE154_DISCOVERY_TIMEOUT,
                auth_request_interval: IEEE154_AUTH_REQUEST_TIMEOUT,
                auth_relay_interval: IEEE154_AUTH_RELAY_TIMEOUT,
                auth_response_interval: IEEE154_AUTH_RESPONSE_TIMEOUT,
                link_quality_update_interval: if mobile {
                    IEEE154_LINK_QUALITY_MOBILE_TIMEOUT
                } else {
                    IEEE154_LINK_QUALITY_TIMEOUT
                },
                neighbor_alive_interval: IEEE154_NEIGHBOR_ALIVE_TIMEOUT,
                advertisement_interval: IEEE154_ADVERTISEMENT_TIMEOUT,
            },
        }
    }
}
