//! Sharex P2P layer: the relay announcement agent and the libp2p swarm it
//! runs on.
//!
//! - **announce**: gossip-driven liveness heartbeats and circuit-relay
//!   dialing policy, written against the [`AnnounceTransport`] seam.
//! - **libp2p_network**: production transport (TCP + noise + yamux, relay
//!   client, DCUtR, gossipsub, identify, ping, optional mDNS).

pub mod announce;
pub mod libp2p_network;

pub use announce::{
    AgentHandle, AnnounceConfig, AnnounceTransport, AnnouncementAgent, AnnouncementOutcome,
    PeerAnnouncement, ANNOUNCE_TOPIC, DEFAULT_HEARTBEAT_INTERVAL, DIAL_ATTEMPTS, HEARTBEAT_TOKEN,
    PEER_ID_SEGMENT,
};
pub use libp2p::Multiaddr;
pub use libp2p_network::{Libp2pCommand, Libp2pConfig, Libp2pEvent, Libp2pNetwork};

/// P2P layer errors.
#[derive(thiserror::Error, Debug)]
pub enum P2PError {
    #[error("swarm command channel closed")]
    ChannelClosed,
    #[error("invalid multiaddress {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
}
