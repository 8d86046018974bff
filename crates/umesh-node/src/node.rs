//! Node runtime: builds the mesh stack from configuration and drives its
//! scheduler on the tokio runtime until shutdown.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use umesh_core::MacAddress;
use umesh_hal::sim::SIM_DEFAULT_MTU;
use umesh_hal::{HalRegistry, SimRadio};
use umesh_mesh::{KvStore, MeshStack, Message};

use crate::config::{NodeConfig, RadioEntry};
use crate::error::NodeError;
use crate::storage::FileKv;

/// Cloneable handle that asks a running [`Node`] to stop.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct Node {
    stack: MeshStack,
    radios: Vec<Arc<SimRadio>>,
    inbound: Option<mpsc::UnboundedReceiver<Message>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    started: bool,
}

impl Node {
    /// Create a node from configuration: radios, storage and mesh stack.
    ///
    /// Storage failures are not fatal; the node then runs without persisting
    /// mesh state.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let mesh_config = config.to_mesh_config()?;

        let mut registry = HalRegistry::new();
        let mut radios = Vec::new();
        if config.radios.is_empty() {
            // One WiFi radio addressed by the node identity.
            let mac = MacAddress::eui64(*mesh_config.uuid.as_bytes());
            radios.push(Arc::new(SimRadio::new("wifi0", umesh_core::MediaType::Wifi, mac)));
        } else {
            for (i, entry) in config.radios.iter().enumerate() {
                radios.push(Arc::new(build_radio(i, entry)?));
            }
        }
        for radio in &radios {
            registry.register(radio.clone());
        }

        let kv = match open_storage(&config) {
            Ok(kv) => kv,
            Err(e) => {
                tracing::warn!("failed to initialize storage: {e}");
                None
            }
        };

        let mut stack = MeshStack::new(mesh_config, registry, kv);
        stack.init()?;
        let inbound = Some(stack.subscribe());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            stack,
            radios,
            inbound,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            started: false,
        })
    }

    /// Bring the mesh stack up.
    pub fn start(&mut self) -> Result<(), NodeError> {
        if self.started {
            return Err(NodeError::AlreadyRunning);
        }
        self.stack.start()?;
        self.started = true;
        tracing::info!(
            uuid = %self.stack.uuid(),
            radios = self.radios.len(),
            networks = self.stack.interfaces().network_contexts().len(),
            "node started"
        );
        Ok(())
    }

    /// Run the scheduler until shutdown is signalled, logging every datagram
    /// delivered by the mesh layer.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        if !self.started {
            return Err(NodeError::NotStarted);
        }
        let scheduler = self.stack.scheduler().clone();
        let mut inbound = self.inbound.take();
        let runner = scheduler.run_until_stopped(&mut self.stack, self.shutdown_rx.clone());
        tokio::pin!(runner);

        tracing::info!("entering event loop");
        loop {
            tokio::select! {
                _ = &mut runner => {
                    tracing::info!("shutdown signal received");
                    break;
                }
                message = next_datagram(&mut inbound) => match message {
                    Some(message) => log_datagram(&message),
                    None => inbound = None,
                },
            }
        }
        self.inbound = inbound;
        Ok(())
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Signal the node to shut down.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop the mesh stack and release the radios.
    pub fn shutdown(mut self) {
        tracing::info!("shutting down node");
        self.trigger_shutdown();
        self.stack.stop();
        self.started = false;
        tracing::info!("node shutdown complete");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn stack(&self) -> &MeshStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut MeshStack {
        &mut self.stack
    }

    /// The simulated radios, in registration order.
    pub fn radios(&self) -> &[Arc<SimRadio>] {
        &self.radios
    }
}

fn open_storage(config: &NodeConfig) -> Result<Option<Box<dyn KvStore>>, NodeError> {
    if !config.storage.enable {
        return Ok(None);
    }
    let kv = match config.storage_path() {
        Some(path) => FileKv::new(path)?,
        None => FileKv::default_path()?,
    };
    tracing::debug!(path = %kv.base_dir().display(), "storage opened");
    let kv: Box<dyn KvStore> = Box::new(kv);
    Ok(Some(kv))
}

fn build_radio(index: usize, entry: &RadioEntry) -> Result<SimRadio, NodeError> {
    let media = entry.media_type()?;
    let mac = entry.mac_address()?;
    let mut radio = SimRadio::new(format!("{}{index}", media.name()), media, mac).with_mtu(
        Some(entry.ucast_mtu.unwrap_or(SIM_DEFAULT_MTU)),
        Some(entry.bcast_mtu.unwrap_or(SIM_DEFAULT_MTU)),
    );
    if let Some(channels) = &entry.channels {
        radio = radio.with_channels(channels.clone());
    }
    Ok(radio)
}

async fn next_datagram(inbound: &mut Option<mpsc::UnboundedReceiver<Message>>) -> Option<Message> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn log_datagram(message: &Message) {
    tracing::debug!(
        src = %message.info.src,
        len = message.len(),
        network = ?message.info.network.map(|n| n.0),
        rssi = message.info.rssi,
        "datagram received"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use umesh_core::{MediaType, NodeMode};
    use umesh_hal::{Frame, FrameInfo};

    fn config(toml: &str) -> NodeConfig {
        let mut config = NodeConfig::parse(toml).unwrap();
        config.storage.enable = false;
        config
    }

    #[test]
    fn default_config_builds_one_wifi_radio() {
        let node = Node::new(config("")).unwrap();
        assert_eq!(node.radios().len(), 1);
        assert_eq!(node.stack().interfaces().hal_count(), 1);
        let hal = &node.stack().interfaces().hal_contexts()[0];
        assert_eq!(hal.media(), MediaType::Wifi);
        assert_eq!(hal.mac().map(|m| m.len()), Some(8));
    }

    #[test]
    fn radios_follow_config() {
        let node = Node::new(config(
            r#"
[node]
super = true

[[radios]]
media = "wifi"
mac = "02:00:00:00:00:01"
ucast_mtu = 1024
bcast_mtu = 512

[[radios]]
media = "ble"
mac = "02:00:00:00:00:02"
channels = [38]
"#,
        ))
        .unwrap();
        assert_eq!(node.stack().mode(), NodeMode::SUPER | NodeMode::RX_ON);
        let hals = node.stack().interfaces().hal_contexts();
        assert_eq!(hals.len(), 2);
        assert_eq!(hals[0].mtu(), 1024);
        assert_eq!(hals[1].channel_list(), &[38]);
    }

    #[test]
    fn unusable_storage_path_is_a_storage_error() {
        crate::logging::init_for_tests();
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let mut config = NodeConfig::default();
        config.storage.path = Some(blocker.join("kv").display().to_string());

        assert!(matches!(open_storage(&config), Err(NodeError::Storage(_))));
        // the node still comes up, without persistence
        let node = Node::new(config).unwrap();
        assert_eq!(node.radios().len(), 1);
    }

    #[test]
    fn disabled_storage_opens_nothing() {
        let config = config("");
        assert!(open_storage(&config).unwrap().is_none());
    }

    #[test]
    fn bad_radio_is_a_config_error() {
        let result = Node::new(config("[[radios]]\nmedia = \"lora\"\nmac = \"02:00:00:00:00:01\"\n"));
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[tokio::test]
    async fn run_requires_start() {
        let mut node = Node::new(config("")).unwrap();
        assert!(matches!(node.run().await, Err(NodeError::NotStarted)));
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let mut node = Node::new(config("")).unwrap();
        node.start().unwrap();
        assert!(matches!(node.start(), Err(NodeError::AlreadyRunning)));
        node.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_shutdown_ends_run() {
        let mut node = Node::new(config("")).unwrap();
        node.start().unwrap();
        node.trigger_shutdown();
        tokio::time::timeout(Duration::from_millis(100), node.run())
            .await
            .expect("run should exit after shutdown")
            .unwrap();
        node.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn run_processes_received_frames() {
        let mut node = Node::new(config("")).unwrap();
        node.start().unwrap();
        let radio = node.radios()[0].clone();
        let handle = node.shutdown_handle();

        let info = FrameInfo {
            peer: MacAddress::eui48([2, 0, 0, 0, 0, 9]),
            channel: 1,
            rssi: -40,
            key_index: -1,
        };
        assert!(radio.inject(Frame::new(vec![0x40, 0x12, 0x00]), info));

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.shutdown();
        });
        node.run().await.unwrap();
        stopper.await.unwrap();

        let hal = &node.stack().interfaces().hal_contexts()[0];
        assert!(hal.neighbor(&info.peer).is_some());
        node.shutdown();
    }
}
