//! TOML-based configuration for umesh nodes.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use umesh_core::{DeviceState, MacAddress, MediaType, NodeMode, Uuid};
use umesh_mesh::MeshConfig;

use crate::error::NodeError;

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub radios: Vec<RadioEntry>,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }

    /// Node identity from `[node] uuid`, or a fresh random one.
    pub fn uuid(&self) -> Result<Uuid, NodeError> {
        match self.node.uuid.as_deref() {
            Some(s) => parse_uuid(s),
            None => Ok(Uuid::new(rand::random())),
        }
    }

    /// Device mode flags from the `[node]` switches.
    pub fn mode(&self) -> NodeMode {
        let mut mode = NodeMode::NONE;
        if self.node.super_node {
            mode.insert(NodeMode::SUPER);
        }
        if self.node.leader {
            mode.insert(NodeMode::LEADER);
        }
        if self.node.rx_on {
            mode.insert(NodeMode::RX_ON);
        }
        if self.node.mobile {
            mode.insert(NodeMode::MOBILE);
        }
        mode
    }

    /// Build the mesh stack configuration. A missing UUID is generated.
    pub fn to_mesh_config(&self) -> Result<MeshConfig, NodeError> {
        Ok(MeshConfig {
            uuid: self.uuid()?,
            mode: self.mode(),
            multi_radio: self.node.multi_radio,
            initial_state: parse_state(&self.node.initial_state)?,
        })
    }

    /// Configured storage directory, if any.
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.storage.path.as_deref().map(PathBuf::from)
    }
}

/// The `[node]` section.
#[derive(Debug, Deserialize)]
pub struct NodeSection {
    /// 8-byte node identity as 16 hex digits. Random when omitted.
    pub uuid: Option<String>,
    #[serde(default, rename = "super")]
    pub super_node: bool,
    #[serde(default)]
    pub leader: bool,
    #[serde(default)]
    pub mobile: bool,
    #[serde(default = "default_true")]
    pub rx_on: bool,
    #[serde(default = "default_initial_state")]
    pub initial_state: String,
    #[serde(default = "default_true")]
    pub multi_radio: bool,
}

fn default_true() -> bool {
    true
}

fn default_initial_state() -> String {
    "detached".to_string()
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            uuid: None,
            super_node: false,
            leader: false,
            mobile: false,
            rx_on: true,
            initial_state: default_initial_state(),
            multi_radio: true,
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The `[storage]` section.
#[derive(Debug, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Storage directory. Defaults to `~/.umesh/kv`.
    pub path: Option<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            enable: true,
            path: None,
        }
    }
}

/// A `[[radios]]` entry describing one simulated radio.
#[derive(Debug, Clone, Deserialize)]
pub struct RadioEntry {
    pub media: String,
    pub mac: String,
    pub ucast_mtu: Option<usize>,
    pub bcast_mtu: Option<usize>,
    pub channels: Option<Vec<u8>>,
}

impl RadioEntry {
    pub fn media_type(&self) -> Result<MediaType, NodeError> {
        parse_media(&self.media)
    }

    pub fn mac_address(&self) -> Result<MacAddress, NodeError> {
        parse_mac(&self.mac)
    }
}

/// Parse a media name (`wifi`, `ble`, `802.15.4`), case-insensitively.
pub fn parse_media(s: &str) -> Result<MediaType, NodeError> {
    MediaType::from_name(&s.to_lowercase())
        .ok_or_else(|| NodeError::Config(format!("unknown media type: {s}")))
}

/// Parse a device state name such as `detached` or `leader`.
pub fn parse_state(s: &str) -> Result<DeviceState, NodeError> {
    DeviceState::from_name(&s.to_lowercase())
        .ok_or_else(|| NodeError::Config(format!("unknown device state: {s}")))
}

/// Parse 16 hex digits into a [`Uuid`].
pub fn parse_uuid(s: &str) -> Result<Uuid, NodeError> {
    let bytes = hex::decode(s).map_err(|e| NodeError::Config(format!("invalid uuid '{s}': {e}")))?;
    Uuid::try_from(bytes.as_slice())
        .map_err(|e| NodeError::Config(format!("invalid uuid '{s}': {e}")))
}

/// Parse a colon-separated link address (6 or 8 octets).
pub fn parse_mac(s: &str) -> Result<MacAddress, NodeError> {
    let bytes = s
        .split(':')
        .map(|octet| match octet.len() {
            1 | 2 => u8::from_str_radix(octet, 16).ok(),
            _ => None,
        })
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| NodeError::Config(format!("invalid mac address '{s}'")))?;
    match bytes.len() {
        6 | 8 => MacAddress::from_slice(&bytes)
            .map_err(|e| NodeError::Config(format!("invalid mac address '{s}': {e}"))),
        n => Err(NodeError::Config(format!(
            "invalid mac address '{s}': expected 6 or 8 octets, got {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config = NodeConfig::parse("").unwrap();
        assert!(config.node.uuid.is_none());
        assert!(config.node.rx_on);
        assert!(config.node.multi_radio);
        assert_eq!(config.node.initial_state, "detached");
        assert_eq!(config.logging.level, "info");
        assert!(config.storage.enable);
        assert!(config.radios.is_empty());
        assert_eq!(config.mode(), NodeMode::RX_ON);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[node]
uuid = "0102030405060708"
super = true
mobile = false
rx_on = true
initial_state = "leader"
multi_radio = false

[logging]
level = "debug"

[storage]
enable = true
path = "/var/lib/umesh"

[[radios]]
media = "wifi"
mac = "02:00:00:00:00:01"
ucast_mtu = 1024
bcast_mtu = 1024
channels = [1, 6, 11]

[[radios]]
media = "802.15.4"
mac = "02:00:00:00:00:00:00:02"
"#;
        let config = NodeConfig::parse(toml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage_path(), Some(PathBuf::from("/var/lib/umesh")));
        assert_eq!(config.radios.len(), 2);
        assert_eq!(config.radios[0].ucast_mtu, Some(1024));
        assert_eq!(config.radios[0].channels.as_deref(), Some(&[1, 6, 11][..]));
        assert_eq!(config.radios[1].media_type().unwrap(), MediaType::Ieee802154);
        assert_eq!(config.radios[1].mac_address().unwrap().len(), 8);

        let mesh = config.to_mesh_config().unwrap();
        assert_eq!(mesh.uuid, Uuid::from_u64(0x0102_0304_0506_0708));
        assert_eq!(mesh.mode, NodeMode::SUPER | NodeMode::RX_ON);
        assert!(!mesh.multi_radio);
        assert_eq!(mesh.initial_state, DeviceState::Leader);
    }

    #[test]
    fn missing_uuid_is_random() {
        let config = NodeConfig::default();
        let a = config.uuid().unwrap();
        let b = config.uuid().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn storage_can_be_disabled() {
        let config = NodeConfig::parse("[storage]\nenable = false\n").unwrap();
        assert!(!config.storage.enable);
        assert!(config.storage_path().is_none());
    }

    #[test]
    fn parse_media_variants() {
        assert_eq!(parse_media("wifi").unwrap(), MediaType::Wifi);
        assert_eq!(parse_media("BLE").unwrap(), MediaType::Ble);
        assert_eq!(parse_media("802.15.4").unwrap(), MediaType::Ieee802154);
        assert!(parse_media("lora").is_err());
    }

    #[test]
    fn parse_state_variants() {
        assert_eq!(parse_state("detached").unwrap(), DeviceState::Detached);
        assert_eq!(parse_state("Leader").unwrap(), DeviceState::Leader);
        assert_eq!(parse_state("super_router").unwrap(), DeviceState::SuperRouter);
        assert!(parse_state("boss").is_err());
    }

    #[test]
    fn parse_uuid_rejects_bad_input() {
        assert!(parse_uuid("0102").is_err());
        assert!(parse_uuid("zz02030405060708").is_err());
        assert!(parse_uuid("010203040506070809").is_err());
    }

    #[test]
    fn parse_mac_variants() {
        assert_eq!(
            parse_mac("02:00:00:00:0a:ff").unwrap(),
            MacAddress::eui48([2, 0, 0, 0, 0x0a, 0xff])
        );
        assert!(parse_mac("").is_err());
        assert!(parse_mac("02:00:00").is_err());
        assert!(parse_mac("02:00:00:00:00:100").is_err());
        assert!(parse_mac("02-00-00-00-00-01").is_err());
    }

    #[test]
    fn unknown_state_fails_mesh_config() {
        let config = NodeConfig::parse("[node]\ninitial_state = \"boss\"\n").unwrap();
        assert!(matches!(config.to_mesh_config(), Err(NodeError::Config(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = NodeConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(NodeError::Io(_))));
    }

    #[test]
    fn test_parse_malformed_toml() {
        assert!(NodeConfig::parse("[node").is_err());
        assert!(NodeConfig::parse("[node]\nrx_on = ").is_err());
        assert!(NodeConfig::parse("[node]\nrx_on = \"yes\"\n").is_err());
        assert!(NodeConfig::parse("[[radios]]\nmedia = \"wifi\"\n").is_err());
    }
}
