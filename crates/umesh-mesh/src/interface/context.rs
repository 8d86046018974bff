use std::collections::VecDeque;
use std::fmt;

use umesh_core::{MacAddress, MediaType, MeshNetId, Sid, SidType};
use umesh_hal::ModuleId;

use super::timing::MediaTiming;
use crate::message::{Message, MessagePriority, QUEUE_SIZE};
use crate::network_data::NetworkData;

/// Handle to a [`HalContext`] inside [`Interfaces`](super::Interfaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HalId(pub usize);

/// Index of a [`NetworkContext`], assigned in creation order from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceState {
    #[default]
    Down,
    Up,
}

/// Routing algorithm a network runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RouterId {
    /// Tree routing over structured short IDs.
    Sid,
    /// Distance-vector routing between super nodes.
    Vector,
}

impl RouterId {
    pub fn name(&self) -> &'static str {
        match self {
            RouterId::Sid => "sid",
            RouterId::Vector => "vector",
        }
    }

    /// Address space the router allocates short IDs from.
    pub fn sid_type(&self) -> SidType {
        match self {
            RouterId::Sid => SidType::Structured,
            RouterId::Vector => SidType::ShortRandom,
        }
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NeighborState {
    #[default]
    Invalid,
    Parent,
    Child,
    Neighbor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub mac: MacAddress,
    pub sid: Sid,
    pub meshnetid: MeshNetId,
    pub state: NeighborState,
    /// Scheduler time (`now_ms`) the neighbor was last heard.
    pub last_heard_ms: u64,
    pub rssi: i8,
}

impl Neighbor {
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            sid: Sid::INVALID,
            meshnetid: MeshNetId::INVALID,
            state: NeighborState::Invalid,
            last_heard_ms: 0,
            rssi: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStats {
    pub in_frames: u32,
    pub in_filtered: u32,
    pub in_dropped: u32,
    pub out_frames: u32,
    pub out_errors: u32,
}

/// Runtime state of one bound radio.
#[derive(Debug)]
pub struct HalContext {
    pub(crate) module: ModuleId,
    pub(crate) media: MediaType,
    pub(crate) mac: Option<MacAddress>,
    pub(crate) mtu: usize,
    pub(crate) channel_list: Vec<u8>,
    pub(crate) channel: u8,
    pub(crate) def_channel: u8,
    pub(crate) timing: MediaTiming,
    pub(crate) enabled: bool,
    neighbors: Vec<Neighbor>,
    send_queues: [VecDeque<Message>; QUEUE_SIZE],
    recv_queue: VecDeque<Message>,
    link_stats: LinkStats,
}

impl HalContext {
    pub(crate) fn new(module: ModuleId, media: MediaType, timing: MediaTiming) -> Self {
        Self {
            module,
            media,
            mac: None,
            mtu: 0,
            channel_list: Vec::new(),
            channel: 0,
            def_channel: 0,
            timing,
            enabled: false,
            neighbors: Vec::new(),
            send_queues: Default::default(),
            recv_queue: VecDeque::new(),
            link_stats: LinkStats::default(),
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn media(&self) -> MediaType {
        self.media
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.mac
    }

    /// Largest frame the radio accepts.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn channel_list(&self) -> &[u8] {
        &self.channel_list
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn def_channel(&self) -> u8 {
        self.def_channel
    }

    pub fn timing(&self) -> &MediaTiming {
        &self.timing
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    // -- Neighbors --

    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    pub fn neighbor(&self, mac: &MacAddress) -> Option<&Neighbor> {
        self.neighbors.iter().find(|n| n.mac == *mac)
    }

    /// Insert or replace the entry for `neighbor.mac`. Returns `true` if new.
    pub fn upsert_neighbor(&mut self, neighbor: Neighbor) -> bool {
        match self.neighbors.iter_mut().find(|n| n.mac == neighbor.mac) {
            Some(existing) => {
                *existing = neighbor;
                false
            }
            None => {
                tracing::debug!(mac = %neighbor.mac, media = self.media.name(), "if: new neighbor");
                self.neighbors.push(neighbor);
                true
            }
        }
    }

    pub fn remove_neighbor(&mut self, mac: &MacAddress) -> Option<Neighbor> {
        let pos = self.neighbors.iter().position(|n| n.mac == *mac)?;
        Some(self.neighbors.remove(pos))
    }

    pub(crate) fn clear_neighbors(&mut self) -> usize {
        let removed = self.neighbors.len();
        self.neighbors.clear();
        removed
    }

    // -- Queues --

    pub fn enqueue_send(&mut self, priority: MessagePriority, message: Message) {
        self.send_queues[priority.index()].push_back(message);
    }

    /// Next message to transmit, highest priority first.
    pub fn dequeue_send(&mut self) -> Option<Message> {
        self.send_queues.iter_mut().find_map(VecDeque::pop_front)
    }

    pub fn send_queue_len(&self, priority: MessagePriority) -> usize {
        self.send_queues[priority.index()].len()
    }

    pub fn enqueue_recv(&mut self, message: Message) {
        self.recv_queue.push_back(message);
    }

    pub fn dequeue_recv(&mut self) -> Option<Message> {
        self.recv_queue.pop_front()
    }

    pub fn recv_queue_len(&self) -> usize {
        self.recv_queue.len()
    }

    /// Drop every queued message. Returns how many were dropped.
    pub(crate) fn cleanup_queues(&mut self) -> usize {
        let mut dropped = self.recv_queue.len();
        self.recv_queue.clear();
        for queue in &mut self.send_queues {
            dropped += queue.len();
            queue.clear();
        }
        dropped
    }

    pub fn link_stats(&self) -> &LinkStats {
        &self.link_stats
    }

    pub fn link_stats_mut(&mut self) -> &mut LinkStats {
        &mut self.link_stats
    }

    /// Reset per-binding state when a new module takes over this context.
    pub(crate) fn rebind(&mut self, module: ModuleId) {
        self.module = module;
        self.neighbors.clear();
        self.link_stats = LinkStats::default();
    }
}

/// One logical mesh network running over a [`HalContext`].
#[derive(Debug, Clone)]
pub struct NetworkContext {
    pub(crate) index: NetworkId,
    pub(crate) hal: HalId,
    pub(crate) router: RouterId,
    pub(crate) state: InterfaceState,
    pub(crate) meshnetid: MeshNetId,
    pub(crate) network_data: NetworkData,
    pub(crate) advertising: bool,
}

impl NetworkContext {
    pub(crate) fn new(index: NetworkId, hal: HalId, router: RouterId) -> Self {
        Self {
            index,
            hal,
            router,
            state: InterfaceState::Down,
            meshnetid: MeshNetId::BROADCAST,
            network_data: NetworkData::default(),
            advertising: false,
        }
    }

    pub fn index(&self) -> NetworkId {
        self.index
    }

    pub fn hal(&self) -> HalId {
        self.hal
    }

    pub fn router(&self) -> RouterId {
        self.router
    }

    pub fn state(&self) -> InterfaceState {
        self.state
    }

    pub fn is_up(&self) -> bool {
        self.state == InterfaceState::Up
    }

    pub fn meshnetid(&self) -> MeshNetId {
        self.meshnetid
    }

    pub fn set_meshnetid(&mut self, meshnetid: MeshNetId) {
        self.meshnetid = meshnetid;
    }

    pub fn network_data(&self) -> &NetworkData {
        &self.network_data
    }

    /// Whether the periodic advertisement timer is armed.
    pub fn is_advertising(&self) -> bool {
        self.advertising
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageInfo;

    fn hal() -> HalContext {
        HalContext::new(
            ModuleId(0),
            MediaType::Wifi,
            MediaTiming::for_media(MediaType::Wifi, false),
        )
    }

    fn message(tag: u8) -> Message {
        Message::new(vec![tag], MessageInfo::default())
    }

    #[test]
    fn send_queues_drain_by_priority() {
        let mut h = hal();
        h.enqueue_send(MessagePriority::Pending, message(3));
        h.enqueue_send(MessagePriority::Data, message(2));
        h.enqueue_send(MessagePriority::Command, message(1));
        h.enqueue_send(MessagePriority::Data, message(4));

        let order: Vec<u8> = std::iter::from_fn(|| h.dequeue_send())
            .map(|m| m.payload[0])
            .collect();
        assert_eq!(order, vec![1, 2, 4, 3]);
    }

    #[test]
    fn cleanup_queues_counts_everything() {
        let mut h = hal();
        h.enqueue_send(MessagePriority::Data, message(1));
        h.enqueue_recv(message(2));
        assert_eq!(h.cleanup_queues(), 2);
        assert!(h.dequeue_send().is_none());
        assert_eq!(h.recv_queue_len(), 0);
    }

    #[test]
    fn neighbor_table_upserts_by_mac() {
        let mut h = hal();
        let mac = MacAddress::eui48([2, 0, 0, 0, 0, 5]);
        assert!(h.upsert_neighbor(Neighbor::new(mac)));

        let mut updated = Neighbor::new(mac);
        updated.sid = Sid(0x0100);
        assert!(!h.upsert_neighbor(updated));
        assert_eq!(h.neighbors().len(), 1);
        assert_eq!(h.neighbor(&mac).unwrap().sid, Sid(0x0100));

        assert!(h.remove_neighbor(&mac).is_some());
        assert!(h.remove_neighbor(&mac).is_none());
    }

    #[test]
    fn router_sid_types() {
        assert_eq!(RouterId::Sid.sid_type(), SidType::Structured);
        assert_eq!(RouterId::Vector.sid_type(), SidType::ShortRandom);
        assert_eq!(RouterId::Vector.to_string(), "vector");
    }
}
