//! Leader-driven network data.
//!
//! Two kinds of data are kept:
//!
//! - *stable* data, owned by the leader and versioned by
//!   `(main_version, minor_version)`: the mesh network ID and the multicast
//!   group derived from it;
//! - *volatile* data (`version`, `size`), kept per network context with a
//!   global fallback.
//!
//! Versions are compared by their signed 8-bit difference, so counters may
//! wrap as long as peers never drift more than half the range apart.

use std::net::Ipv6Addr;

use umesh_core::{DeviceState, MeshNetId, NodeMode, Uuid};

use crate::error::NetworkDataError;
use crate::interface::NetworkContext;
use crate::kv::KvStore;

pub const MAX_MAIN_VERSION: u8 = 7;

/// KV key under which the stable main version is persisted.
pub const MAIN_VERSION_KEY: &str = "main_version";

/// Multicast group before the mesh network ID is folded into its last two bytes.
pub const MESH_MCAST_BASE: Ipv6Addr = Ipv6Addr::new(0xff08, 0, 0, 0, 0, 0, 0xfc00, 0);

/// Volatile per-network data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkData {
    pub version: u8,
    pub size: u16,
}

/// Leader-authoritative data shared by the whole mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StableNetworkData {
    pub main_version: u8,
    pub minor_version: u8,
    pub meshnetid: MeshNetId,
    pub mcast_addr: Ipv6Addr,
}

impl Default for StableNetworkData {
    fn default() -> Self {
        Self {
            main_version: 0,
            minor_version: 0,
            meshnetid: MeshNetId(0),
            mcast_addr: MESH_MCAST_BASE,
        }
    }
}

/// Multicast group for `meshnetid`: the base group with octets 14 and 15
/// replaced by the big-endian network ID.
pub fn mcast_for(meshnetid: MeshNetId) -> Ipv6Addr {
    let mut octets = MESH_MCAST_BASE.octets();
    octets[14..16].copy_from_slice(&meshnetid.to_be_bytes());
    Ipv6Addr::from(octets)
}

/// Derive a mesh network ID from the local UUID.
///
/// XOR-folds the UUID bytes into the high byte. This collides easily; it is
/// kept bit-exact so nodes agree on the ID a given UUID produces.
pub fn generate_meshnetid(uuid: &Uuid) -> MeshNetId {
    let folded = uuid.as_bytes().iter().fold(0u8, |acc, b| acc ^ b);
    MeshNetId((folded as u16) << 8)
}

/// Whether `id` names a real network rather than a sentinel.
pub fn is_unique_netid(id: MeshNetId) -> bool {
    id.is_unique()
}

#[derive(Debug, Clone)]
pub struct NetworkDataState {
    global: NetworkData,
    stable: StableNetworkData,
}

impl NetworkDataState {
    /// Initialize from the local identity.
    ///
    /// Mobile nodes start with [`MeshNetId::INVALID`] and wait for a leader;
    /// everyone else derives an ID from `uuid`. A persisted main version is
    /// restored from `kv` when one is available.
    pub fn new(uuid: &Uuid, mode: NodeMode, kv: Option<&dyn KvStore>) -> Self {
        let meshnetid = if mode.contains(NodeMode::MOBILE) {
            MeshNetId::INVALID
        } else {
            generate_meshnetid(uuid)
        };
        let mut stable = StableNetworkData {
            meshnetid,
            ..StableNetworkData::default()
        };
        if meshnetid.is_unique() {
            stable.mcast_addr = mcast_for(meshnetid);
        }
        if let Some(version) = kv.and_then(load_main_version) {
            stable.main_version = version;
        }
        tracing::debug!(%meshnetid, main_version = stable.main_version, "nd: initialized");
        Self {
            global: NetworkData::default(),
            stable,
        }
    }

    /// Zero the volatile data of every given network context.
    pub fn reset_networks<'a>(&mut self, networks: impl IntoIterator<Item = &'a mut NetworkContext>) {
        for network in networks {
            network.network_data = NetworkData::default();
        }
        self.global = NetworkData::default();
    }

    // -- Stable data --

    pub fn stable(&self) -> &StableNetworkData {
        &self.stable
    }

    /// Replace the stable data if `data` is not older than what we hold.
    pub fn set_stable(&mut self, data: StableNetworkData) -> Result<(), NetworkDataError> {
        let current = self.stable.minor_version;
        let diff = data.minor_version.wrapping_sub(current) as i8;
        if diff >= 0 || current == 0 {
            self.stable = data;
            tracing::debug!(
                minor_version = data.minor_version,
                meshnetid = %data.meshnetid,
                "nd: stable data updated"
            );
            Ok(())
        } else {
            Err(NetworkDataError::VersionTooOld {
                incoming: data.minor_version,
                current,
            })
        }
    }

    /// Set the main version (0..=7) and persist it through `kv`.
    ///
    /// A missing or failing store does not fail the update.
    pub fn set_stable_main_version(
        &mut self,
        version: u8,
        kv: Option<&mut dyn KvStore>,
    ) -> Result<(), NetworkDataError> {
        if version > MAX_MAIN_VERSION {
            return Err(NetworkDataError::InvalidMainVersion(version));
        }
        self.stable.main_version = version;
        if let Some(kv) = kv {
            if let Err(e) = kv.set(MAIN_VERSION_KEY, &[version]) {
                tracing::warn!("nd: failed to persist main version: {e}");
            }
        }
        Ok(())
    }

    pub fn stable_main_version(&self) -> u8 {
        self.stable.main_version
    }

    pub fn stable_minor_version(&self) -> u8 {
        self.stable.minor_version
    }

    pub fn stable_meshnetid(&self) -> MeshNetId {
        self.stable.meshnetid
    }

    /// Change the mesh network ID. Only the leader may do this.
    ///
    /// Sentinel IDs and the current ID are accepted without effect.
    pub fn set_stable_meshnetid(
        &mut self,
        state: DeviceState,
        meshnetid: MeshNetId,
    ) -> Result<(), NetworkDataError> {
        if state != DeviceState::Leader {
            return Err(NetworkDataError::RoleNotPermitted(state));
        }
        if !is_unique_netid(meshnetid) || self.stable.meshnetid == meshnetid {
            return Ok(());
        }
        let mut data = self.stable;
        data.minor_version = data.minor_version.wrapping_add(1);
        data.meshnetid = meshnetid;
        data.mcast_addr = mcast_for(meshnetid);
        self.set_stable(data)
    }

    pub fn subscribed_mcast(&self) -> Ipv6Addr {
        self.stable.mcast_addr
    }

    pub fn is_subscribed_mcast(&self, addr: &Ipv6Addr) -> bool {
        self.stable.mcast_addr == *addr
    }

    // -- Volatile data --

    fn local(&self, network: Option<&NetworkContext>) -> NetworkData {
        network.map_or(self.global, |n| n.network_data)
    }

    /// Replace the volatile data of `network` (or the global copy) if `data`
    /// is strictly newer.
    pub fn set(
        &mut self,
        network: Option<&mut NetworkContext>,
        data: NetworkData,
    ) -> Result<(), NetworkDataError> {
        let local = match network {
            Some(n) => &mut n.network_data,
            None => &mut self.global,
        };
        let diff = data.version.wrapping_sub(local.version) as i8;
        if diff > 0 {
            *local = data;
            tracing::debug!(version = data.version, size = data.size, "nd: network data updated");
            Ok(())
        } else {
            Err(NetworkDataError::VersionTooOld {
                incoming: data.version,
                current: local.version,
            })
        }
    }

    pub fn version(&self, network: Option<&NetworkContext>) -> u8 {
        self.local(network).version
    }

    pub fn meshnetsize(&self, network: Option<&NetworkContext>) -> u16 {
        self.local(network).size
    }

    /// Record a new network size. Only the leader or a super router may do
    /// this; the version is bumped only when the size actually changes.
    pub fn set_meshnetsize(
        &mut self,
        state: DeviceState,
        network: Option<&mut NetworkContext>,
        size: u16,
    ) -> Result<(), NetworkDataError> {
        if state != DeviceState::Leader && state != DeviceState::SuperRouter {
            return Err(NetworkDataError::RoleNotPermitted(state));
        }
        let current = self.local(network.as_deref());
        if current.size == size {
            return Ok(());
        }
        let data = NetworkData {
            version: current.version.wrapping_add(1),
            size,
        };
        self.set(network, data)
    }
}

fn load_main_version(kv: &dyn KvStore) -> Option<u8> {
    match kv.get(MAIN_VERSION_KEY) {
        Ok(Some(bytes)) => match bytes.as_slice() {
            [v] if *v <= MAX_MAIN_VERSION => Some(*v),
            _ => {
                tracing::warn!("nd: ignoring malformed persisted main version");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!("nd: failed to read main version: {e}");
            None
        }
    }
}
