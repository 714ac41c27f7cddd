//! libp2p swarm used as the production announcement transport.
//!
//! The swarm runs on a background task and is driven through a command
//! channel. Commands that need an answer (publish, subscribe, dial) carry a
//! oneshot reply; dials are answered only once the connection is established
//! or has failed. Gossip for subscribed topics is fanned out to per-topic
//! receivers, and the set of connected peers is kept current from swarm
//! connection events.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use libp2p::core::transport::OrTransport;
use libp2p::core::upgrade;
use libp2p::dcutr;
use libp2p::gossipsub;
use libp2p::identify;
use libp2p::identity;
use libp2p::multiaddr::Protocol;
use libp2p::noise;
use libp2p::ping;
use libp2p::relay;
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::dial_opts::DialOpts;
use libp2p::swarm::{ConnectionId, NetworkBehaviour, Swarm, SwarmEvent};
use libp2p::tcp;
use libp2p::yamux;
use libp2p::{mdns, Multiaddr, PeerId, Transport};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::announce::AnnounceTransport;
use crate::P2PError;

pub const DEFAULT_LISTEN_PORT: u16 = 4003;

#[derive(Debug, Clone)]
pub struct Libp2pConfig {
    /// Addresses to listen on. If empty, the swarm listens on
    /// `/ip4/0.0.0.0/tcp/4003`.
    pub listen_addresses: Vec<Multiaddr>,
    /// Peers dialed on startup.
    pub bootstrap_peers: Vec<Multiaddr>,
    /// Circuit relays dialed on startup; the node also listens through each
    /// of them to obtain a reservation.
    pub relay_servers: Vec<Multiaddr>,
    pub enable_mdns: bool,
    /// Relay client transport plus DCUtR hole punching.
    pub enable_relay: bool,
    /// Optional fixed identity. If `None`, a new Ed25519 keypair is generated.
    pub identity_keypair: Option<identity::Keypair>,
    pub protocol_version: String,
    pub agent_version: String,
}

impl Default for Libp2pConfig {
    fn default() -> Self {
        Self {
            listen_addresses: vec![default_listen_address()],
            bootstrap_peers: Vec::new(),
            relay_servers: Vec::new(),
            enable_mdns: true,
            enable_relay: true,
            identity_keypair: None,
            protocol_version: "/sharex/1.0.0".to_string(),
            agent_version: format!("sharex-p2p/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn default_listen_address() -> Multiaddr {
    Multiaddr::empty()
        .with(Protocol::Ip4(Ipv4Addr::UNSPECIFIED))
        .with(Protocol::Tcp(DEFAULT_LISTEN_PORT))
}

type Reply = oneshot::Sender<Result<(), P2PError>>;

/// Commands accepted by the background swarm task.
#[derive(Debug)]
pub enum Libp2pCommand {
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: Reply,
    },
    Subscribe {
        topic: String,
        sender: mpsc::UnboundedSender<Vec<u8>>,
        reply: Reply,
    },
    Dial {
        address: Multiaddr,
        reply: Reply,
    },
    Shutdown,
}

/// Events surfaced for observation by the node.
#[derive(Debug, Clone)]
pub enum Libp2pEvent {
    Gossip {
        peer: PeerId,
        topic: String,
        data: Vec<u8>,
    },
    PeerDiscovered {
        peers: Vec<(PeerId, Multiaddr)>,
    },
    PeerConnected {
        peer: PeerId,
    },
    PeerDisconnected {
        peer: PeerId,
    },
    NewListenAddr {
        address: Multiaddr,
    },
    RelayReservationAccepted {
        relay: PeerId,
    },
    HolePunchSucceeded {
        peer: PeerId,
    },
    HolePunchFailed {
        peer: PeerId,
        error: String,
    },
}

#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "ComposedEvent")]
struct ComposedBehaviour {
    gossipsub: gossipsub::Behaviour,
    identify: identify::Behaviour,
    ping: ping::Behaviour,
    mdns: Toggle<mdns::tokio::Behaviour>,
    relay: Toggle<relay::client::Behaviour>,
    dcutr: Toggle<dcutr::Behaviour>,
}

impl ComposedBehaviour {
    fn new(
        local_key: &identity::Keypair,
        peer_id: PeerId,
        config: &Libp2pConfig,
        relay_behaviour: Option<relay::client::Behaviour>,
    ) -> Result<Self> {
        // Heartbeats repeat the same payload, so the id covers source and
        // sequence number as well as the data.
        let message_id_fn = |message: &gossipsub::Message| {
            let mut hasher = blake3::Hasher::new();
            if let Some(source) = &message.source {
                hasher.update(&source.to_bytes());
            }
            if let Some(sequence_number) = message.sequence_number {
                hasher.update(&sequence_number.to_be_bytes());
            }
            hasher.update(&message.data);
            gossipsub::MessageId::from(hasher.finalize().as_bytes().to_vec())
        };

        let gossip_config = gossipsub::ConfigBuilder::default()
            .message_id_fn(message_id_fn)
            .validation_mode(gossipsub::ValidationMode::Strict)
            .heartbeat_interval(Duration::from_secs(4))
            .build()
            .map_err(|err| anyhow!("failed to build gossipsub config: {err}"))?;

        let gossipsub = gossipsub::Behaviour::new(
            gossipsub::MessageAuthenticity::Signed(local_key.clone()),
            gossip_config,
        )
        .map_err(|err| anyhow!("failed to construct gossipsub behaviour: {err}"))?;

        let identify = identify::Behaviour::new(
            identify::Config::new(config.protocol_version.clone(), local_key.public())
                .with_agent_version(config.agent_version.clone()),
        );

        let mdns = Toggle::from(if config.enable_mdns {
            Some(
                mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id)
                    .map_err(|err| anyhow!("failed to initialise mDNS behaviour: {err}"))?,
            )
        } else {
            None
        });

        let dcutr = Toggle::from(relay_behaviour.is_some().then(|| dcutr::Behaviour::new(peer_id)));

        Ok(Self {
            gossipsub,
            identify,
            ping: ping::Behaviour::default(),
            mdns,
            relay: Toggle::from(relay_behaviour),
            dcutr,
        })
    }
}

#[allow(clippy::large_enum_variant, dead_code)]
#[derive(Debug)]
enum ComposedEvent {
    Gossipsub(Box<gossipsub::Event>),
    Identify(Box<identify::Event>),
    Ping(ping::Event),
    Mdns(mdns::Event),
    Relay(relay::client::Event),
    Dcutr(dcutr::Event),
}

impl From<gossipsub::Event> for ComposedEvent {
    fn from(value: gossipsub::Event) -> Self {
        ComposedEvent::Gossipsub(Box::new(value))
    }
}

impl From<identify::Event> for ComposedEvent {
    fn from(value: identify::Event) -> Self {
        ComposedEvent::Identify(Box::new(value))
    }
}

impl From<ping::Event> for ComposedEvent {
    fn from(value: ping::Event) -> Self {
        ComposedEvent::Ping(value)
    }
}

impl From<mdns::Event> for ComposedEvent {
    fn from(value: mdns::Event) -> Self {
        ComposedEvent::Mdns(value)
    }
}

impl From<relay::client::Event> for ComposedEvent {
    fn from(value: relay::client::Event) -> Self {
        ComposedEvent::Relay(value)
    }
}

impl From<dcutr::Event> for ComposedEvent {
    fn from(value: dcutr::Event) -> Self {
        ComposedEvent::Dcutr(value)
    }
}

/// Handle to the background swarm.
pub struct Libp2pNetwork {
    peer_id: PeerId,
    command_tx: mpsc::UnboundedSender<Libp2pCommand>,
    events_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Libp2pEvent>>>>,
    listen_addresses: Arc<RwLock<HashSet<Multiaddr>>>,
    connected_peers: Arc<RwLock<HashSet<PeerId>>>,
    _task: JoinHandle<()>,
}

impl Libp2pNetwork {
    /// Build the swarm and spawn its task. Must be called inside a tokio runtime.
    pub fn new(config: Libp2pConfig) -> Result<Self> {
        let keypair = config
            .identity_keypair
            .clone()
            .unwrap_or_else(identity::Keypair::generate_ed25519);
        let peer_id = PeerId::from(keypair.public());
        info!(%peer_id, "initialising libp2p peer");

        let tcp_transport = tcp::tokio::Transport::new(tcp::Config::default().nodelay(true));
        let (transport, relay_behaviour) = if config.enable_relay {
            let (relay_transport, relay_behaviour) = relay::client::new(peer_id);
            let transport = OrTransport::new(relay_transport, tcp_transport)
                .upgrade(upgrade::Version::V1)
                .authenticate(noise::Config::new(&keypair)?)
                .multiplex(yamux::Config::default())
                .boxed();
            (transport, Some(relay_behaviour))
        } else {
            let transport = tcp_transport
                .upgrade(upgrade::Version::V1)
                .authenticate(noise::Config::new(&keypair)?)
                .multiplex(yamux::Config::default())
                .boxed();
            (transport, None)
        };

        let behaviour = ComposedBehaviour::new(&keypair, peer_id, &config, relay_behaviour)?;
        let swarm_config = libp2p::swarm::Config::with_tokio_executor()
            .with_idle_connection_timeout(Duration::from_secs(60));
        let mut swarm = Swarm::new(transport, behaviour, peer_id, swarm_config);

        let listen_addresses = Arc::new(RwLock::new(HashSet::new()));
        let connected_peers = Arc::new(RwLock::new(HashSet::new()));

        let listen_addrs = if config.listen_addresses.is_empty() {
            vec![default_listen_address()]
        } else {
            config.listen_addresses.clone()
        };
        for addr in listen_addrs {
            if let Err(err) = swarm.listen_on(addr.clone()) {
                warn!(%addr, "failed to listen: {err}");
            }
        }

        for address in config
            .bootstrap_peers
            .iter()
            .chain(config.relay_servers.iter())
        {
            if let Err(err) = swarm.dial(address.clone()) {
                warn!(%address, "failed to dial bootstrap peer: {err}");
            }
        }

        if config.enable_relay {
            for relay in &config.relay_servers {
                let circuit = relay.clone().with(Protocol::P2pCircuit);
                if let Err(err) = swarm.listen_on(circuit.clone()) {
                    warn!(%circuit, "failed to listen through relay: {err}");
                }
            }
        }

        let relay_peers: HashSet<PeerId> = config
            .relay_servers
            .iter()
            .filter_map(extract_peer_id)
            .collect();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events_rx) = mpsc::unbounded_channel();

        let driver = SwarmDriver {
            swarm,
            event_tx,
            listen_addresses: listen_addresses.clone(),
            connected_peers: connected_peers.clone(),
            relay_peers,
            subscribers: HashMap::new(),
            pending_dials: HashMap::new(),
        };
        let task = tokio::spawn(driver.run(command_rx));

        Ok(Self {
            peer_id,
            command_tx,
            events_rx: Arc::new(Mutex::new(Some(events_rx))),
            listen_addresses,
            connected_peers,
            _task: task,
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn listen_addresses(&self) -> Vec<Multiaddr> {
        self.listen_addresses.read().iter().cloned().collect()
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connected_peers.read().contains(peer)
    }

    /// Acquire the event receiver. Subsequent calls return `None`.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<Libp2pEvent>> {
        self.events_rx.lock().take()
    }

    async fn request(&self, build: impl FnOnce(Reply) -> Libp2pCommand) -> Result<(), P2PError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .map_err(|_| P2PError::ChannelClosed)?;
        response.await.map_err(|_| P2PError::ChannelClosed)?
    }

    pub async fn publish_to(&self, topic: &str, data: Vec<u8>) -> Result<(), P2PError> {
        let topic = topic.to_string();
        self.request(|reply| Libp2pCommand::Publish { topic, data, reply })
            .await
    }

    pub async fn subscribe_to(&self, topic: &str) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, P2PError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let topic = topic.to_string();
        self.request(|reply| Libp2pCommand::Subscribe {
            topic,
            sender,
            reply,
        })
        .await?;
        Ok(receiver)
    }

    /// Dial `address` and wait for the outcome.
    pub async fn dial_address(&self, address: Multiaddr) -> Result<(), P2PError> {
        self.request(|reply| Libp2pCommand::Dial { address, reply })
            .await
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(Libp2pCommand::Shutdown);
    }
}

impl Drop for Libp2pNetwork {
    fn drop(&mut self) {
        let _ = self.command_tx.send(Libp2pCommand::Shutdown);
    }
}

#[async_trait]
impl AnnounceTransport for Libp2pNetwork {
    fn local_peer_id(&self) -> String {
        self.peer_id.to_string()
    }

    async fn connected_peers(&self) -> HashSet<String> {
        self.connected_peers
            .read()
            .iter()
            .map(PeerId::to_string)
            .collect()
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, P2PError> {
        self.subscribe_to(topic).await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), P2PError> {
        self.publish_to(topic, payload).await
    }

    async fn dial(&self, multiaddress: &str) -> Result<(), P2PError> {
        let address =
            multiaddress
                .parse::<Multiaddr>()
                .map_err(|err| P2PError::InvalidAddress {
                    address: multiaddress.to_string(),
                    reason: err.to_string(),
                })?;
        self.dial_address(address).await
    }
}

/// State owned by the swarm task.
struct SwarmDriver {
    swarm: Swarm<ComposedBehaviour>,
    event_tx: mpsc::UnboundedSender<Libp2pEvent>,
    listen_addresses: Arc<RwLock<HashSet<Multiaddr>>>,
    connected_peers: Arc<RwLock<HashSet<PeerId>>>,
    relay_peers: HashSet<PeerId>,
    subscribers: HashMap<gossipsub::TopicHash, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    pending_dials: HashMap<ConnectionId, Reply>,
}

impl SwarmDriver {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Libp2pCommand>) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => self.handle_swarm_event(event),
                command = command_rx.recv() => match command {
                    Some(Libp2pCommand::Shutdown) | None => {
                        debug!("shutting down libp2p swarm");
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },
            }
        }
        info!("libp2p swarm task terminated");
    }

    fn emit(&self, event: Libp2pEvent) {
        let _ = self.event_tx.send(event);
    }

    fn handle_command(&mut self, command: Libp2pCommand) {
        match command {
            Libp2pCommand::Publish { topic, data, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(gossipsub::IdentTopic::new(topic.as_str()), data)
                    .map(|_| ())
                    .map_err(|err| P2PError::Publish(format!("{topic}: {err}")));
                let _ = reply.send(result);
            }
            Libp2pCommand::Subscribe {
                topic,
                sender,
                reply,
            } => {
                let ident = gossipsub::IdentTopic::new(topic.as_str());
                let result = match self.swarm.behaviour_mut().gossipsub.subscribe(&ident) {
                    Ok(_) => {
                        self.subscribers.entry(ident.hash()).or_default().push(sender);
                        debug!(%topic, "subscribed to gossip topic");
                        Ok(())
                    }
                    Err(err) => Err(P2PError::Subscribe(format!("{topic}: {err}"))),
                };
                let _ = reply.send(result);
            }
            Libp2pCommand::Dial { address, reply } => {
                let opts = DialOpts::from(address.clone());
                let connection_id = opts.connection_id();
                match self.swarm.dial(opts) {
                    Ok(()) => {
                        self.pending_dials.insert(connection_id, reply);
                    }
                    Err(err) => {
                        debug!(%address, "dial rejected: {err}");
                        let _ = reply.send(Err(P2PError::Dial(err.to_string())));
                    }
                }
            }
            Libp2pCommand::Shutdown => {}
        }
    }

    fn handle_swarm_event(&mut self, event: SwarmEvent<ComposedEvent>) {
        match event {
            SwarmEvent::Behaviour(ComposedEvent::Gossipsub(event)) => {
                if let gossipsub::Event::Message {
                    propagation_source,
                    message,
                    ..
                } = *event
                {
                    if let Some(senders) = self.subscribers.get_mut(&message.topic) {
                        senders.retain(|sender| sender.send(message.data.clone()).is_ok());
                    }
                    self.emit(Libp2pEvent::Gossip {
                        peer: propagation_source,
                        topic: message.topic.to_string(),
                        data: message.data,
                    });
                }
            }
            SwarmEvent::Behaviour(ComposedEvent::Mdns(mdns::Event::Discovered(discovered))) => {
                let local = *self.swarm.local_peer_id();
                let mut peers = Vec::new();
                for (peer, addr) in discovered {
                    if peer == local {
                        continue;
                    }
                    self.swarm.behaviour_mut().gossipsub.add_explicit_peer(&peer);
                    if let Err(err) = self.swarm.dial(addr.clone()) {
                        debug!(%addr, "skipping dial: {err}");
                    }
                    peers.push((peer, addr));
                }
                if !peers.is_empty() {
                    self.emit(Libp2pEvent::PeerDiscovered { peers });
                }
            }
            SwarmEvent::Behaviour(ComposedEvent::Mdns(mdns::Event::Expired(expired))) => {
                for (peer, _) in expired {
                    self.swarm
                        .behaviour_mut()
                        .gossipsub
                        .remove_explicit_peer(&peer);
                }
            }
            SwarmEvent::Behaviour(ComposedEvent::Relay(
                relay::client::Event::ReservationReqAccepted { relay_peer_id, .. },
            )) => {
                info!(relay = %relay_peer_id, "relay reservation accepted");
                self.emit(Libp2pEvent::RelayReservationAccepted {
                    relay: relay_peer_id,
                });
            }
            SwarmEvent::Behaviour(ComposedEvent::Dcutr(event)) => match event.result {
                Ok(_) => self.emit(Libp2pEvent::HolePunchSucceeded {
                    peer: event.remote_peer_id,
                }),
                Err(err) => self.emit(Libp2pEvent::HolePunchFailed {
                    peer: event.remote_peer_id,
                    error: err.to_string(),
                }),
            },
            SwarmEvent::ConnectionEstablished {
                peer_id,
                connection_id,
                ..
            } => {
                if self.relay_peers.contains(&peer_id) {
                    debug!(relay = %peer_id, "connected to relay");
                }
                self.connected_peers.write().insert(peer_id);
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Ok(()));
                }
                self.emit(Libp2pEvent::PeerConnected { peer: peer_id });
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    self.connected_peers.write().remove(&peer_id);
                    self.emit(Libp2pEvent::PeerDisconnected { peer: peer_id });
                }
            }
            SwarmEvent::OutgoingConnectionError {
                connection_id,
                error,
                ..
            } => {
                if let Some(reply) = self.pending_dials.remove(&connection_id) {
                    let _ = reply.send(Err(P2PError::Dial(error.to_string())));
                } else {
                    debug!("outgoing connection failed: {error}");
                }
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                debug!(%address, "listening");
                self.listen_addresses.write().insert(address.clone());
                self.emit(Libp2pEvent::NewListenAddr { address });
            }
            SwarmEvent::ExpiredListenAddr { address, .. } => {
                self.listen_addresses.write().remove(&address);
            }
            _ => {}
        }
    }
}

fn extract_peer_id(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|protocol| match protocol {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tokio::time::timeout;

    fn local_config() -> Libp2pConfig {
        Libp2pConfig {
            listen_addresses: vec![Multiaddr::from_str("/ip4/127.0.0.1/tcp/0").unwrap()],
            enable_mdns: false,
            enable_relay: false,
            protocol_version: "/sharex/test".to_string(),
            agent_version: "sharex-test/0.0.1".to_string(),
            ..Libp2pConfig::default()
        }
    }

    async fn first_listen_address(network: &Libp2pNetwork) -> Multiaddr {
        let mut events = network.take_event_receiver().expect("event receiver");
        timeout(Duration::from_secs(10), async {
            loop {
                match events.recv().await {
                    Some(Libp2pEvent::NewListenAddr { address }) => return address,
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("listen address within timeout")
    }

    #[test]
    fn config_default_has_listen_address() {
        let config = Libp2pConfig::default();
        assert_eq!(
            config.listen_addresses,
            vec![Multiaddr::from_str("/ip4/0.0.0.0/tcp/4003").unwrap()]
        );
    }

    #[test]
    fn peer_id_extraction() {
        let peer = PeerId::random();
        let addr = Multiaddr::from_str(&format!("/ip4/10.0.0.1/tcp/4003/p2p/{peer}")).unwrap();
        assert_eq!(extract_peer_id(&addr), Some(peer));
        assert_eq!(
            extract_peer_id(&Multiaddr::from_str("/ip4/10.0.0.1/tcp/4003").unwrap()),
            None
        );
    }

    #[tokio::test]
    async fn network_initialises() {
        let network = Libp2pNetwork::new(local_config()).expect("network");
        let address = first_listen_address(&network).await;
        assert!(network.listen_addresses().contains(&address));
        assert_eq!(network.local_peer_id(), network.peer_id().to_string());
        network.shutdown();
    }

    #[tokio::test]
    async fn dial_resolves_once_connected() {
        let remote = Libp2pNetwork::new(local_config()).expect("remote");
        let address = first_listen_address(&remote).await;
        let local = Libp2pNetwork::new(local_config()).expect("local");

        let target = format!("{address}/p2p/{}", remote.peer_id());
        timeout(Duration::from_secs(10), AnnounceTransport::dial(&local, &target))
            .await
            .expect("dial within timeout")
            .expect("dial succeeds");

        assert!(local.is_connected(&remote.peer_id()));
        assert!(local
            .connected_peers()
            .await
            .contains(&remote.peer_id().to_string()));
    }

    #[tokio::test]
    async fn dial_reports_refused_connection() {
        let local = Libp2pNetwork::new(local_config()).expect("local");
        let result = timeout(
            Duration::from_secs(10),
            AnnounceTransport::dial(&local, "/ip4/127.0.0.1/tcp/1"),
        )
        .await
        .expect("dial within timeout");
        assert!(matches!(result, Err(P2PError::Dial(_))));
        assert!(local.connected_peers().await.is_empty());
    }

    #[tokio::test]
    async fn dial_rejects_unparsable_address() {
        let local = Libp2pNetwork::new(local_config()).expect("local");
        let result = AnnounceTransport::dial(&local, "not a multiaddr").await;
        assert!(matches!(result, Err(P2PError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn subscribe_returns_receiver() {
        let network = Libp2pNetwork::new(local_config()).expect("network");
        let receiver = network.subscribe_to(crate::ANNOUNCE_TOPIC).await;
        assert!(receiver.is_ok());
    }
}
