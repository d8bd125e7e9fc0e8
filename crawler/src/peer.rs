//! Tracked peer model.

use crate::sync::SyncStatus;
use crate::user_agent::UserAgent;
use beacon_peers_connection::{
    AttnetBits, ForkDigest, NodeId, PeerAddrInfo, PeerAddress, PeerId, Version,
};
use std::fmt;
use std::net::IpAddr;

/// Bounded peer score.
///
/// A peer starts at [`Score::GOOD`], loses a point for every probe sequence
/// that fails and is evicted once it reaches [`Score::BAD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score(i32);

impl Score {
    pub const GOOD: Score = Score(3);
    pub const BAD: Score = Score(0);

    pub fn value(&self) -> i32 {
        self.0
    }

    /// Score after one more failed probe sequence.
    pub fn decremented(self) -> Score {
        Score(self.0.saturating_sub(1).max(Score::BAD.0 - 1))
    }

    /// Whether the peer should be evicted.
    pub fn is_bad(&self) -> bool {
        *self <= Score::BAD
    }
}

impl Default for Score {
    fn default() -> Self {
        Score::GOOD
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network usage type of an autonomous system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UsageType {
    Hosting,
    Residential,
    NonResidential,
    Business,
    Education,
    Government,
    Military,
}

impl UsageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::Hosting => "hosting",
            UsageType::Residential => "residential",
            UsageType::NonResidential => "non-residential",
            UsageType::Business => "business",
            UsageType::Education => "education",
            UsageType::Government => "government",
            UsageType::Military => "military",
        }
    }
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Autonomous system details.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Asn {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub route: String,
    /// `None` when the resolver could not classify the network.
    pub usage: Option<UsageType>,
}

/// Geographic location of a peer's IP.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoLocation {
    pub asn: Asn,
    pub country: String,
    pub state: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Everything the crawler knows about one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRecord {
    pub id: PeerId,
    pub node_id: NodeId,
    /// Hex of the compressed secp256k1 public key.
    pub public_key: String,

    pub ip: IpAddr,
    pub tcp_port: u16,
    pub udp_port: Option<u16>,
    pub addresses: Vec<PeerAddress>,

    pub fork_digest: ForkDigest,
    pub next_fork_version: Version,
    pub next_fork_epoch: u64,
    pub attnets: AttnetBits,

    pub protocol_version: Option<String>,
    pub user_agent: Option<UserAgent>,
    pub user_agent_raw: Option<String>,
    pub geo_location: Option<GeoLocation>,

    /// Unknown until the first successful probe.
    pub sync: Option<SyncStatus>,
    pub score: Score,

    pub is_connectable: bool,
    /// Unix seconds of the last successful probe.
    pub last_connected: Option<u64>,
    /// Unix seconds of the last probe outcome, or of creation.
    pub last_updated: u64,
}

impl PeerRecord {
    /// Dial information for the host.
    pub fn addr_info(&self) -> PeerAddrInfo {
        PeerAddrInfo::new(self.id.clone(), self.addresses.clone())
    }
}

impl fmt::Display for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} ([peer] digest: {}, score: {}, agent: {})",
            self.id,
            self.ip,
            self.tcp_port,
            self.fork_digest,
            self.score,
            match &self.user_agent {
                Some(agent) => agent.to_string(),
                None => "unknown".to_string(),
            }
        )
    }
}
