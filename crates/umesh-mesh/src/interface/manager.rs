use umesh_core::{MediaType, MeshNetId, NodeMode};
use umesh_hal::{HalRegistry, ModuleId};

use super::context::{HalContext, HalId, InterfaceState, NetworkContext, NetworkId, RouterId};
use super::timing::MediaTiming;
use crate::error::InterfaceError;

/// Frame MTU assumed when a radio cannot report its broadcast MTU.
pub const DEFAULT_FRAME_MTU: usize = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceOptions {
    pub mode: NodeMode,
    /// Bind every registered radio. When off, only the first is used.
    pub multi_radio: bool,
}

impl Default for InterfaceOptions {
    fn default() -> Self {
        Self {
            mode: NodeMode::RX_ON,
            multi_radio: cfg!(feature = "multi-radio"),
        }
    }
}

/// What [`Interfaces::stop`] released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownStats {
    pub messages: usize,
    pub neighbors: usize,
    pub networks: usize,
    pub hals: usize,
}

/// Owner of every [`HalContext`] and [`NetworkContext`].
#[derive(Debug, Default)]
pub struct Interfaces {
    hals: Vec<HalContext>,
    networks: Vec<NetworkContext>,
    default_router: Option<RouterId>,
}

impl Interfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a [`HalContext`] for the registered radios.
    ///
    /// Radios are visited in registration order; without `multi_radio` only
    /// the first is bound. A radio whose media type already has a context
    /// takes that context over. Returns the number of contexts.
    pub fn init(&mut self, registry: &HalRegistry, options: &InterfaceOptions) -> usize {
        let mut next = registry.get_default();
        while let Some(module) = next {
            match registry.media_type(Some(module)) {
                Ok(media) => self.bind(registry, module, media, options.mode),
                Err(e) => tracing::warn!(module = module.0, "if: cannot read media type: {e}"),
            }
            if !options.multi_radio {
                break;
            }
            next = registry.get_next(module);
        }
        self.hals.len()
    }

    fn bind(&mut self, registry: &HalRegistry, module: ModuleId, media: MediaType, mode: NodeMode) {
        let id = Some(module);
        let mut mtu = registry.get_bcast_mtu(id).unwrap_or(DEFAULT_FRAME_MTU);
        if let Ok(ucast) = registry.get_ucast_mtu(id) {
            mtu = mtu.max(ucast);
        }

        let timing = MediaTiming::for_media(media, mode.contains(NodeMode::MOBILE));
        let hal = match self.hals.iter().position(|h| h.media == media) {
            Some(pos) => {
                tracing::debug!(media = media.name(), module = module.0, "if: rebinding hal context");
                let hal = &mut self.hals[pos];
                hal.rebind(module);
                hal.timing = timing;
                hal
            }
            None => {
                self.hals.push(HalContext::new(module, media, timing));
                let pos = self.hals.len() - 1;
                &mut self.hals[pos]
            }
        };

        hal.mtu = mtu;
        hal.channel_list = registry.get_channel_list(id).unwrap_or_default();
        hal.mac = registry.get_mac_address(id).ok();
        hal.channel = registry
            .get_channel(id)
            .unwrap_or_else(|_| hal.channel_list.first().copied().unwrap_or(0));
        hal.def_channel = match media {
            MediaType::Wifi => 1,
            _ => hal.channel_list.first().copied().unwrap_or(hal.channel),
        };
        tracing::debug!(
            media = media.name(),
            mtu,
            channel = hal.channel,
            "if: hal context bound"
        );
    }

    /// Create the network contexts for the bound radios.
    ///
    /// A WiFi radio on a super node carries a vector-routed network followed
    /// by a SID-routed one; every other radio carries one SID-routed network.
    /// Network 0's router becomes the default router. Returns the number of
    /// networks created.
    pub fn start(&mut self, mode: NodeMode) -> Result<usize, InterfaceError> {
        if !self.networks.is_empty() {
            return Err(InterfaceError::AlreadyStarted);
        }
        if self.hals.is_empty() {
            return Err(InterfaceError::NoRadios);
        }
        for pos in 0..self.hals.len() {
            let hal = HalId(pos);
            if self.hals[pos].media == MediaType::Wifi && mode.contains(NodeMode::SUPER) {
                self.create_network(hal, RouterId::Vector)?;
            }
            self.create_network(hal, RouterId::Sid)?;
        }
        tracing::info!(
            networks = self.networks.len(),
            hals = self.hals.len(),
            "if: interfaces started"
        );
        Ok(self.networks.len())
    }

    /// Append a network on `hal` running `router`.
    ///
    /// A radio carries at most one network per router.
    pub fn create_network(&mut self, hal: HalId, router: RouterId) -> Result<NetworkId, InterfaceError> {
        if hal.0 >= self.hals.len() {
            return Err(InterfaceError::NoSuchHal(hal.0));
        }
        if self.networks.iter().any(|n| n.hal == hal && n.router == router) {
            return Err(InterfaceError::DuplicateNetwork {
                hal: hal.0,
                router: router.name(),
            });
        }
        let index = next_network_id(self.networks.len())?;
        if index.0 == 0 {
            self.default_router = Some(router);
        }
        self.networks.push(NetworkContext::new(index, hal, router));
        tracing::debug!(network = index.0, hal = hal.0, %router, "if: network context created");
        Ok(index)
    }

    /// Mark `network` up. Its radio must be enabled.
    pub fn bring_up(&mut self, network: NetworkId) -> Result<(), InterfaceError> {
        let hal = self
            .network(network)
            .ok_or(InterfaceError::NoSuchNetwork(network.0))?
            .hal;
        if !self.hals.get(hal.0).is_some_and(HalContext::is_enabled) {
            return Err(InterfaceError::HalDisabled(hal.0));
        }
        if let Some(n) = self.network_mut(network) {
            n.state = InterfaceState::Up;
        }
        Ok(())
    }

    /// Take every network down and forget its mesh network ID.
    ///
    /// Returns the networks whose advertisement timer was armed; the caller
    /// cancels those timers.
    pub fn reset_network_contexts(&mut self) -> Vec<NetworkId> {
        let mut advertising = Vec::new();
        for network in &mut self.networks {
            network.state = InterfaceState::Down;
            network.meshnetid = MeshNetId::BROADCAST;
            if network.advertising {
                advertising.push(network.index);
                network.advertising = false;
            }
        }
        advertising
    }

    /// Tear everything down: drop queued messages and neighbors, then free
    /// every network and radio context.
    pub fn stop(&mut self) -> TeardownStats {
        self.reset_network_contexts();
        let mut stats = TeardownStats::default();
        for hal in &mut self.hals {
            stats.messages += hal.cleanup_queues();
            stats.neighbors += hal.clear_neighbors();
        }
        stats.networks = self.networks.len();
        stats.hals = self.hals.len();
        self.networks.clear();
        self.hals.clear();
        self.default_router = None;
        tracing::info!(
            networks = stats.networks,
            hals = stats.hals,
            messages = stats.messages,
            "if: interfaces stopped"
        );
        stats
    }

    // -- Lookups --

    pub fn network_contexts(&self) -> &[NetworkContext] {
        &self.networks
    }

    pub fn network_contexts_mut(&mut self) -> &mut [NetworkContext] {
        &mut self.networks
    }

    pub fn network(&self, id: NetworkId) -> Option<&NetworkContext> {
        self.networks.get(id.0 as usize)
    }

    pub fn network_mut(&mut self, id: NetworkId) -> Option<&mut NetworkContext> {
        self.networks.get_mut(id.0 as usize)
    }

    pub fn hal_contexts(&self) -> &[HalContext] {
        &self.hals
    }

    pub fn hal(&self, id: HalId) -> Option<&HalContext> {
        self.hals.get(id.0)
    }

    pub fn hal_mut(&mut self, id: HalId) -> Option<&mut HalContext> {
        self.hals.get_mut(id.0)
    }

    pub fn hal_count(&self) -> usize {
        self.hals.len()
    }

    pub fn default_router(&self) -> Option<RouterId> {
        self.default_router
    }

    /// First network created.
    pub fn default_network(&self) -> Option<NetworkId> {
        self.networks.first().map(|n| n.index)
    }

    /// First radio bound.
    pub fn default_hal(&self) -> Option<HalId> {
        (!self.hals.is_empty()).then_some(HalId(0))
    }

    pub fn hal_by_media(&self, media: MediaType) -> Option<HalId> {
        self.hals.iter().position(|h| h.media == media).map(HalId)
    }

    /// Network using `meshnetid`, or the default network when none does and
    /// `fallback_default` is set.
    pub fn network_by_meshnetid(&self, meshnetid: MeshNetId, fallback_default: bool) -> Option<NetworkId> {
        self.networks
            .iter()
            .find(|n| n.meshnetid == meshnetid)
            .map(|n| n.index)
            .or_else(|| fallback_default.then(|| self.default_network()).flatten())
    }

    /// First network on `hal`.
    pub fn hal_default_network(&self, hal: HalId) -> Option<NetworkId> {
        self.networks.iter().find(|n| n.hal == hal).map(|n| n.index)
    }

    /// Network used for traffic toward the sub-mesh behind `hal`.
    ///
    /// With fewer than two networks this is the default network. On a WiFi
    /// radio it is the network created right after the radio's first one;
    /// elsewhere it is the radio's first network.
    pub fn get_sub_network(&self, hal: HalId) -> Option<NetworkId> {
        if self.networks.len() < 2 {
            return self.default_network();
        }
        let first = self.networks.iter().position(|n| n.hal == hal)?;
        let is_wifi = self
            .hal(hal)
            .is_some_and(|h| h.media == MediaType::Wifi);
        let chosen = if is_wifi {
            self.networks.get(first + 1).unwrap_or(&self.networks[first])
        } else {
            &self.networks[first]
        };
        Some(chosen.index)
    }
}

/// Index for the network created after `existing` others.
fn next_network_id(existing: usize) -> Result<NetworkId, InterfaceError> {
    u8::try_from(existing)
        .map(NetworkId)
        .map_err(|_| InterfaceError::TooManyNetworks)
}
