//! The mesh stack: one owner for every piece of mesh state.
//!
//! [`MeshStack`] is the state type of its [`Scheduler`]. Radio receive
//! callbacks run on driver threads; they only queue the frame and post a
//! task, and the frame is processed when the scheduler loop runs that task
//! with exclusive access to the stack.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use umesh_core::frag::is_frag_dispatch;
use umesh_core::{DeviceState, MacAddress, MeshNetId, NodeMode, Sid, Uuid};
use umesh_hal::{Frame, FrameInfo, HalError, HalRegistry, ReceiveCallback};

use crate::error::{InterfaceError, MeshError};
use crate::fragments::{self, Fragments, REASSEMBLE_TICK_INTERVAL_MS};
use crate::interface::{
    HalId, InterfaceOptions, InterfaceState, Interfaces, Neighbor, NeighborState, NetworkId,
};
use crate::kv::KvStore;
use crate::message::{Message, MessageInfo, MessagePriority};
use crate::network_data::NetworkDataState;
use crate::scheduler::{Handler, Scheduler, TaskArg};
use crate::sid::{NodeId, SidAllocator};

/// First byte of a network advertisement beacon.
pub const MESH_BEACON_DISPATCH: u8 = 0x40;

/// Beacon length: dispatch byte plus the big-endian mesh network ID.
pub const MESH_BEACON_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshConfig {
    pub uuid: Uuid,
    pub mode: NodeMode,
    pub multi_radio: bool,
    pub initial_state: DeviceState,
}

impl Default for MeshConfig {
    fn default() -> Self {
        let options = InterfaceOptions::default();
        Self {
            uuid: Uuid::default(),
            mode: options.mode,
            multi_radio: options.multi_radio,
            initial_state: DeviceState::Detached,
        }
    }
}

pub type InterfaceUpFn = fn(&mut MeshStack);
pub type InterfaceDownFn = fn(&mut MeshStack, InterfaceState);

/// Hooks fired when the stack's interfaces come up or go down.
#[derive(Clone, Copy)]
pub struct InterfaceCallbacks {
    pub interface_up: InterfaceUpFn,
    pub interface_down: InterfaceDownFn,
}

struct Inbound {
    hal: HalId,
    frame: Frame,
    info: FrameInfo,
}

type Inbox = Arc<Mutex<VecDeque<Inbound>>>;

struct StackHandlers {
    receive: Handler<MeshStack>,
    frag_tick: Handler<MeshStack>,
    advertise: Handler<MeshStack>,
}

pub struct MeshStack {
    uuid: Uuid,
    mode: NodeMode,
    state: DeviceState,
    multi_radio: bool,
    started: bool,
    next_tag: u16,

    scheduler: Scheduler<MeshStack>,
    handlers: StackHandlers,
    inbox: Inbox,

    registry: HalRegistry,
    interfaces: Interfaces,
    network_data: NetworkDataState,
    fragments: Fragments,
    sid_allocators: BTreeMap<NetworkId, SidAllocator>,
    kv: Option<Box<dyn KvStore>>,
    callbacks: Vec<InterfaceCallbacks>,
    upward: Option<mpsc::UnboundedSender<Message>>,
}

impl MeshStack {
    pub fn new(config: MeshConfig, registry: HalRegistry, kv: Option<Box<dyn KvStore>>) -> Self {
        let network_data = NetworkDataState::new(&config.uuid, config.mode, kv.as_deref());
        let mut stack = Self {
            uuid: config.uuid,
            mode: config.mode,
            state: config.initial_state,
            multi_radio: config.multi_radio,
            started: false,
            next_tag: 0,
            scheduler: Scheduler::new(),
            handlers: StackHandlers {
                receive: Handler::new(|stack: &mut MeshStack, _| stack.drain_inbox()),
                frag_tick: Handler::new(|stack: &mut MeshStack, _| {
                    stack.fragments.cleanup(false);
                    stack.start_frag_timer();
                }),
                advertise: Handler::new(|stack: &mut MeshStack, arg| stack.advertise(arg)),
            },
            inbox: Arc::default(),
            registry,
            interfaces: Interfaces::new(),
            network_data,
            fragments: Fragments::new(),
            sid_allocators: BTreeMap::new(),
            kv,
            callbacks: Vec::new(),
            upward: None,
        };
        stack.register_interface_callbacks(InterfaceCallbacks {
            interface_up: frags_interface_up,
            interface_down: frags_interface_down,
        });
        stack
    }

    /// Initialize radios and bind their interface contexts.
    ///
    /// Re-derives the network data from the local identity, restoring the
    /// persisted main version.
    pub fn init(&mut self) -> Result<(), MeshError> {
        self.registry.init_all()?;
        self.network_data = NetworkDataState::new(&self.uuid, self.mode, self.kv.as_deref());
        let bound = self.interfaces.init(&self.registry, &self.interface_options());
        tracing::info!(uuid = %self.uuid, radios = bound, "mesh: initialized");
        Ok(())
    }

    fn interface_options(&self) -> InterfaceOptions {
        InterfaceOptions {
            mode: self.mode,
            multi_radio: self.multi_radio,
        }
    }

    /// Enable the radios, create and bring up the networks, and start
    /// advertising on each.
    ///
    /// On failure the radios are disabled again and the interface contexts
    /// released, so `start` can be retried.
    pub fn start(&mut self) -> Result<(), MeshError> {
        if self.started {
            return Err(MeshError::AlreadyStarted);
        }
        if self.interfaces.hal_count() == 0 {
            self.interfaces.init(&self.registry, &self.interface_options());
        }

        if let Err(e) = self.bring_up_interfaces() {
            tracing::warn!("mesh: start failed: {e}");
            self.release_interfaces();
            return Err(e);
        }

        self.started = true;
        self.interface_up();
        let ids: Vec<NetworkId> = self
            .interfaces
            .network_contexts()
            .iter()
            .map(|n| n.index())
            .collect();
        for id in ids {
            self.start_advertising(id);
        }
        tracing::info!(
            meshnetid = %self.network_data.stable_meshnetid(),
            state = ?self.state,
            "mesh: started"
        );
        Ok(())
    }

    fn bring_up_interfaces(&mut self) -> Result<(), MeshError> {
        for pos in 0..self.interfaces.hal_count() {
            let hal = HalId(pos);
            let Some(module) = self.interfaces.hal(hal).map(|h| h.module()) else {
                continue;
            };
            tolerate_unsupported(self.registry.enable(Some(module)))?;
            tolerate_unsupported(
                self.registry
                    .register_receiver(Some(module), self.receiver_for(hal)),
            )?;
            if let Some(ctx) = self.interfaces.hal_mut(hal) {
                ctx.set_enabled(true);
            }
        }

        self.interfaces.start(self.mode)?;
        let meshnetid = self.network_data.stable_meshnetid();
        let ids: Vec<NetworkId> = self
            .interfaces
            .network_contexts()
            .iter()
            .map(|n| n.index())
            .collect();
        for &id in &ids {
            if let Some(network) = self.interfaces.network_mut(id) {
                network.set_meshnetid(meshnetid);
                let sid_type = network.router().sid_type();
                self.sid_allocators.insert(id, SidAllocator::new(sid_type));
            }
            self.interfaces.bring_up(id)?;
        }
        self.network_data
            .reset_networks(self.interfaces.network_contexts_mut());
        Ok(())
    }

    /// Free the interface contexts and disable every radio.
    fn release_interfaces(&mut self) {
        self.interfaces.stop();
        for module in self.registry.ids() {
            if let Err(e) = self.registry.disable(Some(module)) {
                tracing::debug!(module = module.0, "mesh: disable failed: {e}");
            }
        }
        self.sid_allocators.clear();
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Stop advertising, take the interfaces down and release the radios.
    /// Stopping a stopped stack does nothing.
    pub fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.interface_down(InterfaceState::Down);
        for id in self.interfaces.reset_network_contexts() {
            self.scheduler
                .cancel_delayed(-1, &self.handlers.advertise, TaskArg(id.0 as u64));
        }
        self.release_interfaces();
        self.started = false;
        tracing::info!("mesh: stopped");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    // -- Interface events --

    /// Register hooks fired on interface up/down, in registration order.
    pub fn register_interface_callbacks(&mut self, callbacks: InterfaceCallbacks) {
        self.callbacks.push(callbacks);
    }

    pub fn interface_up(&mut self) {
        for cb in self.callbacks.clone() {
            (cb.interface_up)(self);
        }
    }

    pub fn interface_down(&mut self, state: InterfaceState) {
        for cb in self.callbacks.clone() {
            (cb.interface_down)(self, state);
        }
    }

    // -- Power --

    /// Put every radio to sleep. Without RX_ON, partial reassemblies are
    /// dropped since the missing fragments will not be heard.
    pub fn radio_sleep(&mut self) -> Result<(), MeshError> {
        for hal in self.interfaces.hal_contexts() {
            tolerate_unsupported(self.registry.radio_sleep(Some(hal.module())))?;
        }
        if !self.mode.contains(NodeMode::RX_ON) {
            self.frags_cleanup(true);
        }
        Ok(())
    }

    pub fn radio_wakeup(&mut self) -> Result<(), MeshError> {
        for hal in self.interfaces.hal_contexts() {
            tolerate_unsupported(self.registry.radio_wakeup(Some(hal.module())))?;
        }
        if !self.mode.contains(NodeMode::RX_ON) {
            self.start_frag_timer();
        }
        Ok(())
    }

    // -- Fragment aging --

    fn frags_cleanup(&mut self, force: bool) -> usize {
        let removed = self.fragments.cleanup(force);
        if force {
            self.scheduler
                .cancel_delayed(-1, &self.handlers.frag_tick, TaskArg::NONE);
        }
        removed
    }

    fn start_frag_timer(&mut self) {
        let tick = &self.handlers.frag_tick;
        self.scheduler.cancel_delayed(-1, tick, TaskArg::NONE);
        if let Err(e) = self
            .scheduler
            .post_delayed(REASSEMBLE_TICK_INTERVAL_MS, tick, TaskArg::NONE)
        {
            tracing::debug!("frags: aging timer not armed: {e}");
        }
    }

    /// Whether the reassembly aging timer is armed.
    pub fn is_frag_timer_armed(&self) -> bool {
        self.scheduler
            .is_scheduled(&self.handlers.frag_tick, TaskArg::NONE)
    }

    // -- Receive path --

    fn receiver_for(&self, hal: HalId) -> ReceiveCallback {
        let inbox = Arc::clone(&self.inbox);
        let scheduler = self.scheduler.clone();
        let receive = self.handlers.receive.clone();
        Arc::new(move |frame, info| {
            inbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(Inbound { hal, frame, info });
            if let Err(e) = scheduler.post(&receive, TaskArg(hal.0 as u64)) {
                tracing::debug!("mesh: dropping received frame: {e}");
            }
        })
    }

    fn drain_inbox(&mut self) {
        loop {
            let next = self
                .inbox
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(inbound) = next else { break };
            self.receive_frame(inbound.hal, inbound.frame, inbound.info);
        }
    }

    /// Process one frame received on `hal`.
    ///
    /// Beacons update the neighbor table; fragments are reassembled; complete
    /// datagrams are delivered upward.
    pub fn receive_frame(&mut self, hal: HalId, frame: Frame, info: FrameInfo) {
        let now = self.scheduler.now_ms();
        let network = self.interfaces.hal_default_network(hal);
        let Some(ctx) = self.interfaces.hal_mut(hal) else {
            return;
        };
        ctx.link_stats_mut().in_frames += 1;

        let Some(&first) = frame.data.first() else {
            ctx.link_stats_mut().in_filtered += 1;
            return;
        };

        if first == MESH_BEACON_DISPATCH {
            let [_, hi, lo] = frame.data[..] else {
                ctx.link_stats_mut().in_filtered += 1;
                return;
            };
            let mut neighbor = ctx
                .neighbor(&info.peer)
                .copied()
                .unwrap_or_else(|| Neighbor::new(info.peer));
            neighbor.meshnetid = MeshNetId(u16::from_be_bytes([hi, lo]));
            neighbor.state = NeighborState::Neighbor;
            neighbor.last_heard_ms = now;
            neighbor.rssi = info.rssi;
            ctx.upsert_neighbor(neighbor);
            return;
        }

        // Unknown peers keep an invalid SID; reassembly then keys on the MAC.
        let src = ctx
            .neighbor(&info.peer)
            .map(|n| n.sid)
            .filter(Sid::is_unique)
            .unwrap_or(Sid::INVALID);
        let message = Message::new(
            frame.data,
            MessageInfo {
                src,
                dest: Sid::BROADCAST,
                mac: Some(info.peer),
                network,
                hal: Some(hal),
                rssi: info.rssi,
            },
        );

        if !is_frag_dispatch(first) {
            self.deliver(message);
            return;
        }
        match self.fragments.reassemble(message) {
            Ok(Some(complete)) => self.deliver(complete),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(peer = %info.peer, "frags: fragment dropped: {e}");
                if let Some(ctx) = self.interfaces.hal_mut(hal) {
                    ctx.link_stats_mut().in_dropped += 1;
                }
            }
        }
    }

    /// Hand a complete datagram to the upper layer, or queue it on its
    /// radio's receive queue when nobody is subscribed.
    fn deliver(&mut self, message: Message) {
        let message = match &self.upward {
            Some(tx) => match tx.send(message) {
                Ok(()) => return,
                Err(mpsc::error::SendError(message)) => {
                    tracing::debug!("mesh: upper layer gone, queueing locally");
                    self.upward = None;
                    message
                }
            },
            None => message,
        };
        if let Some(ctx) = message.info.hal.and_then(|h| self.interfaces.hal_mut(h)) {
            ctx.enqueue_recv(message);
        }
    }

    /// Receive complete datagrams on a channel instead of the receive queues.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.upward = Some(tx);
        rx
    }

    // -- Send path --

    /// Send `payload` on `network` (the default network when `None`),
    /// unicast to `dest` or broadcast. Payloads over the radio MTU are
    /// fragmented, and payloads that could be mistaken for a beacon or a
    /// fragment are framed (see [`fragments::fragment`]). Returns the number
    /// of frames transmitted.
    pub fn send(
        &mut self,
        network: Option<NetworkId>,
        dest: Option<MacAddress>,
        payload: &[u8],
    ) -> Result<usize, MeshError> {
        if !self.started {
            return Err(MeshError::NotStarted);
        }
        let id = network
            .or_else(|| self.interfaces.default_network())
            .ok_or(MeshError::NotStarted)?;
        let net = self
            .interfaces
            .network(id)
            .ok_or(InterfaceError::NoSuchNetwork(id.0))?;
        if !net.is_up() {
            return Err(MeshError::NetworkDown(id.0));
        }
        let hal = net.hal();
        let mtu = self
            .interfaces
            .hal(hal)
            .ok_or(InterfaceError::NoSuchHal(hal.0))?
            .mtu();

        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        let frames = fragments::fragment(payload, mtu, tag)?;
        if let Some(ctx) = self.interfaces.hal_mut(hal) {
            for frame in frames {
                let info = MessageInfo {
                    mac: dest,
                    network: Some(id),
                    hal: Some(hal),
                    ..MessageInfo::default()
                };
                ctx.enqueue_send(MessagePriority::Data, Message::new(frame, info));
            }
        }
        Ok(self.flush(hal))
    }

    /// Transmit everything queued on `hal`. Returns the number of frames sent.
    pub fn flush(&mut self, hal: HalId) -> usize {
        let Some(ctx) = self.interfaces.hal_mut(hal) else {
            return 0;
        };
        let module = Some(ctx.module());
        let mut sent = 0;
        while let Some(message) = ctx.dequeue_send() {
            let frame = Frame::new(message.payload);
            let result = match message.info.mac {
                Some(dest) => self.registry.send_ucast(module, &frame, &dest, None),
                None => self.registry.send_bcast(module, &frame, None),
            };
            match result {
                Ok(()) => {
                    ctx.link_stats_mut().out_frames += 1;
                    sent += 1;
                }
                Err(e) => {
                    ctx.link_stats_mut().out_errors += 1;
                    tracing::warn!(hal = hal.0, len = frame.len(), "mesh: send failed: {e}");
                }
            }
        }
        sent
    }

    // -- Advertisement --

    fn start_advertising(&mut self, id: NetworkId) {
        let Some(network) = self.interfaces.network(id) else {
            return;
        };
        let Some(interval) = self
            .interfaces
            .hal(network.hal())
            .map(|h| h.timing().advertisement_interval)
        else {
            return;
        };
        let arg = TaskArg(id.0 as u64);
        match self
            .scheduler
            .post_delayed(interval, &self.handlers.advertise, arg)
        {
            Ok(()) => {
                if let Some(network) = self.interfaces.network_mut(id) {
                    network.advertising = true;
                }
            }
            Err(e) => tracing::debug!(network = id.0, "mesh: advertisement not armed: {e}"),
        }
    }

    fn advertise(&mut self, arg: TaskArg) {
        let id = NetworkId(arg.0 as u8);
        let Some(network) = self.interfaces.network(id) else {
            return;
        };
        if !network.is_up() {
            return;
        }
        let hal = network.hal();
        let netid = network.meshnetid().to_be_bytes();
        if let Some(ctx) = self.interfaces.hal_mut(hal) {
            let beacon = vec![MESH_BEACON_DISPATCH, netid[0], netid[1]];
            let info = MessageInfo {
                network: Some(id),
                hal: Some(hal),
                ..MessageInfo::default()
            };
            ctx.enqueue_send(MessagePriority::Command, Message::new(beacon, info));
        }
        self.flush(hal);
        self.start_advertising(id);
    }

    // -- Network data --

    pub fn network_data(&self) -> &NetworkDataState {
        &self.network_data
    }

    pub fn network_data_mut(&mut self) -> &mut NetworkDataState {
        &mut self.network_data
    }

    /// Change the mesh network ID as leader, moving every network that used
    /// the previous ID onto the new one.
    pub fn set_stable_meshnetid(&mut self, meshnetid: MeshNetId) -> Result<(), MeshError> {
        let previous = self.network_data.stable_meshnetid();
        self.network_data
            .set_stable_meshnetid(self.state, meshnetid)?;
        let current = self.network_data.stable_meshnetid();
        if current != previous {
            for network in self.interfaces.network_contexts_mut() {
                if network.meshnetid() == previous {
                    network.set_meshnetid(current);
                }
            }
        }
        Ok(())
    }

    pub fn set_meshnetsize(&mut self, network: Option<NetworkId>, size: u16) -> Result<(), MeshError> {
        let ctx = match network {
            Some(id) => Some(
                self.interfaces
                    .network_mut(id)
                    .ok_or(InterfaceError::NoSuchNetwork(id.0))?,
            ),
            None => None,
        };
        self.network_data.set_meshnetsize(self.state, ctx, size)?;
        Ok(())
    }

    pub fn set_stable_main_version(&mut self, version: u8) -> Result<(), MeshError> {
        let kv = self.kv.as_mut().map(|kv| &mut **kv as &mut dyn KvStore);
        self.network_data.set_stable_main_version(version, kv)?;
        Ok(())
    }

    // -- Short IDs --

    pub fn sid_allocator(&self, network: NetworkId) -> Option<&SidAllocator> {
        self.sid_allocators.get(&network)
    }

    pub fn allocate_sid(&mut self, network: NetworkId, node: &NodeId) -> Result<Sid, MeshError> {
        let allocator = self
            .sid_allocators
            .get_mut(&network)
            .ok_or(InterfaceError::NoSuchNetwork(network.0))?;
        Ok(allocator.allocate(node)?)
    }

    pub fn free_sid(&mut self, network: NetworkId, uuid: &Uuid) -> Option<Sid> {
        self.sid_allocators.get_mut(&network)?.free(uuid)
    }

    // -- Accessors --

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: NodeMode) {
        tracing::debug!(from = self.mode.bits(), to = mode.bits(), "mesh: mode changed");
        self.mode = mode;
    }

    pub fn device_state(&self) -> DeviceState {
        self.state
    }

    pub fn set_device_state(&mut self, state: DeviceState) {
        if state != self.state {
            tracing::debug!(from = ?self.state, to = ?state, "mesh: device state changed");
            self.state = state;
        }
    }

    pub fn scheduler(&self) -> &Scheduler<MeshStack> {
        &self.scheduler
    }

    pub fn registry(&self) -> &HalRegistry {
        &self.registry
    }

    pub fn interfaces(&self) -> &Interfaces {
        &self.interfaces
    }

    pub fn interfaces_mut(&mut self) -> &mut Interfaces {
        &mut self.interfaces
    }

    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }
}

fn frags_interface_up(stack: &mut MeshStack) {
    stack.frags_cleanup(true);
    if stack.mode.contains(NodeMode::RX_ON) {
        stack.start_frag_timer();
    }
}

fn frags_interface_down(stack: &mut MeshStack, _state: InterfaceState) {
    stack.frags_cleanup(true);
}

/// Treat a missing capability as success.
fn tolerate_unsupported(result: Result<(), HalError>) -> Result<(), HalError> {
    match result {
        Err(HalError::Unsupported) => Ok(()),
        other => other,
    }
}
