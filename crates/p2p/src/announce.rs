//! Circuit-relay announcement agent.
//!
//! Every node periodically broadcasts a liveness token on the announcement
//! topic and listens on the same topic for relay multiaddresses published by
//! other peers. A relay candidate for a peer that is neither ourselves nor
//! already connected is dialed, with exactly one immediate retry.

use crate::P2PError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

/// Gossip topic carrying heartbeats and relay announcements.
pub const ANNOUNCE_TOPIC: &str = "announce-circuit";

/// Liveness token published on every heartbeat tick.
pub const HEARTBEAT_TOKEN: &[u8] = b"keep-alive";

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Index of the peer id among the `/`-separated segments of a relay
/// announcement, e.g. `/ip4/10.0.0.1/tcp/4003/p2p/RELAY/p2p-circuit/p2p/PEER`.
/// Positional; announcements with a different shape decode as malformed.
pub const PEER_ID_SEGMENT: usize = 9;

/// Dial attempts per relay candidate (first try plus one retry).
pub const DIAL_ATTEMPTS: u32 = 2;

/// A message received on the announcement topic, decoded once at ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAnnouncement {
    Heartbeat,
    RelayCandidate {
        multiaddress: String,
        peer_id: String,
    },
    Malformed,
}

impl PeerAnnouncement {
    pub fn decode(payload: &[u8]) -> Self {
        if payload == HEARTBEAT_TOKEN {
            return Self::Heartbeat;
        }

        let Ok(text) = std::str::from_utf8(payload) else {
            return Self::Malformed;
        };
        if !text.starts_with('/') {
            return Self::Malformed;
        }

        match text.split('/').nth(PEER_ID_SEGMENT) {
            Some(peer_id) if !peer_id.is_empty() => Self::RelayCandidate {
                multiaddress: text.to_string(),
                peer_id: peer_id.to_string(),
            },
            _ => Self::Malformed,
        }
    }
}

/// What the agent did with one announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnouncementOutcome {
    Heartbeat,
    Malformed,
    SelfAnnouncement,
    AlreadyConnected,
    Connected { attempts: u32 },
    Failed { attempts: u32, error: String },
}

#[derive(Debug, Clone)]
pub struct AnnounceConfig {
    pub topic: String,
    pub heartbeat_interval: Duration,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            topic: ANNOUNCE_TOPIC.to_string(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Network primitives the agent relies on. The connection set is owned by
/// the implementation; the agent only reads it.
#[async_trait]
pub trait AnnounceTransport: Send + Sync {
    /// Local peer id in its textual form.
    fn local_peer_id(&self) -> String;

    /// Peers with at least one established connection.
    async fn connected_peers(&self) -> HashSet<String>;

    /// Subscribe to `topic`; payloads arrive in delivery order.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, P2PError>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), P2PError>;

    /// Resolves once the connection is established or has failed.
    async fn dial(&self, multiaddress: &str) -> Result<(), P2PError>;
}

pub struct AnnouncementAgent {
    transport: Arc<dyn AnnounceTransport>,
    config: AnnounceConfig,
}

impl AnnouncementAgent {
    pub fn new(transport: Arc<dyn AnnounceTransport>, config: AnnounceConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &AnnounceConfig {
        &self.config
    }

    /// Subscribe to the announcement topic and spawn the heartbeat and
    /// handler tasks.
    pub async fn start(self) -> Result<AgentHandle, P2PError> {
        let mut messages = self.transport.subscribe(&self.config.topic).await?;
        let agent = Arc::new(self);
        info!(
            topic = %agent.config.topic,
            interval_secs = agent.config.heartbeat_interval.as_secs(),
            "announcement agent started"
        );

        let heartbeat_agent = agent.clone();
        let heartbeat = tokio::spawn(async move {
            let period = heartbeat_agent.config.heartbeat_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                heartbeat_agent.publish_heartbeat().await;
            }
        });

        let handler = tokio::spawn(async move {
            while let Some(payload) = messages.recv().await {
                agent.handle_message(&payload).await;
            }
            info!("announcement subscription closed");
        });

        Ok(AgentHandle { heartbeat, handler })
    }

    /// Publish one heartbeat. Failures are logged and dropped.
    pub async fn publish_heartbeat(&self) {
        if let Err(err) = self
            .transport
            .publish(&self.config.topic, HEARTBEAT_TOKEN.to_vec())
            .await
        {
            warn!(topic = %self.config.topic, "heartbeat publish failed: {err}");
        }
    }

    /// Decode and act on one message from the announcement topic.
    pub async fn handle_message(&self, payload: &[u8]) -> AnnouncementOutcome {
        match PeerAnnouncement::decode(payload) {
            PeerAnnouncement::Heartbeat => AnnouncementOutcome::Heartbeat,
            PeerAnnouncement::Malformed => {
                debug!(len = payload.len(), "discarding malformed announcement");
                AnnouncementOutcome::Malformed
            }
            PeerAnnouncement::RelayCandidate {
                multiaddress,
                peer_id,
            } => self.handle_relay_candidate(&multiaddress, &peer_id).await,
        }
    }

    async fn handle_relay_candidate(&self, multiaddress: &str, peer_id: &str) -> AnnouncementOutcome {
        if peer_id == self.transport.local_peer_id() {
            return AnnouncementOutcome::SelfAnnouncement;
        }
        if self.transport.connected_peers().await.contains(peer_id) {
            debug!(%peer_id, "relay candidate already connected");
            return AnnouncementOutcome::AlreadyConnected;
        }

        let mut last_error = String::new();
        for attempt in 1..=DIAL_ATTEMPTS {
            match self.transport.dial(multiaddress).await {
                Ok(()) => {
                    info!(%peer_id, %multiaddress, attempt, "connected through relay");
                    return AnnouncementOutcome::Connected { attempts: attempt };
                }
                Err(err) => {
                    debug!(%peer_id, attempt, "relay dial failed: {err}");
                    last_error = err.to_string();
                }
            }
        }

        warn!(%peer_id, %multiaddress, "relay connect failure: {last_error}");
        AnnouncementOutcome::Failed {
            attempts: DIAL_ATTEMPTS,
            error: last_error,
        }
    }
}

/// Owns the agent's background tasks.
pub struct AgentHandle {
    heartbeat: JoinHandle<()>,
    handler: JoinHandle<()>,
}

impl AgentHandle {
    pub fn is_running(&self) -> bool {
        !self.heartbeat.is_finished() || !self.handler.is_finished()
    }

    pub fn shutdown(self) {
        self.heartbeat.abort();
        self.handler.abort();
        debug!("announcement agent stopped");
    }
}
