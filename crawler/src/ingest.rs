//! Discovery ingestion.
//!
//! Turns discovered node records into candidate peers. A record has to be
//! dialable and advertise an allowed fork before it reaches the store, and
//! known peers are never overwritten: only the lifecycle manager mutates a
//! stored peer.

use crate::discovery::Discovery;
use crate::peer::{PeerRecord, Score};
use crate::record::NodeRecord;
use crate::store::PeerStore;
use beacon_peers_connection::{CodecError, ForkDigest};
use log::{debug, error, info};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Why a discovered record was not turned into a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No TCP port is advertised.
    NoTcpPort,
    /// No IP address is advertised.
    NoIp,
    /// The record carries no `eth2` entry.
    MissingForkId,
    /// The `eth2` entry could not be decoded.
    InvalidForkId(CodecError),
    /// The fork digest is not on the allow-list.
    ForkNotAllowed(ForkDigest),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoTcpPort => write!(f, "no tcp port"),
            Rejection::NoIp => write!(f, "no ip address"),
            Rejection::MissingForkId => write!(f, "no eth2 entry"),
            Rejection::InvalidForkId(err) => write!(f, "invalid eth2 entry: {err}"),
            Rejection::ForkNotAllowed(digest) => write!(f, "fork digest {digest} not allowed"),
        }
    }
}

/// Admission rules for discovered records.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Accepted fork digests, empty accepts all.
    allowed: HashSet<ForkDigest>,
}

impl RecordFilter {
    pub fn new(allowed: impl IntoIterator<Item = ForkDigest>) -> Self {
        RecordFilter {
            allowed: allowed.into_iter().collect(),
        }
    }

    fn allows(&self, digest: &ForkDigest) -> bool {
        self.allowed.is_empty() || self.allowed.contains(digest)
    }

    /// Convert `record` into a candidate peer.
    ///
    /// # Returns
    ///
    /// * `Ok(PeerRecord)` - A never probed peer scored [`Score::GOOD`]. Its
    ///   `last_updated` is zero so it is stale for any window.
    /// * `Err(Rejection)` - If the record must be dropped.
    pub fn admit(&self, record: &NodeRecord) -> Result<PeerRecord, Rejection> {
        let tcp_port = record.tcp.ok_or(Rejection::NoTcpPort)?;
        let ip = record.ip.ok_or(Rejection::NoIp)?;
        let fork_id = record
            .eth2()
            .ok_or(Rejection::MissingForkId)?
            .map_err(Rejection::InvalidForkId)?;
        if !self.allows(&fork_id.fork_digest) {
            return Err(Rejection::ForkNotAllowed(fork_id.fork_digest));
        }

        let attnets = match record.attnets() {
            Some(Ok(attnets)) => attnets,
            Some(Err(e)) => {
                debug!("Ignoring attnets of {record}: {e}");
                Default::default()
            }
            None => Default::default(),
        };

        Ok(PeerRecord {
            id: record.peer_id(),
            node_id: record.node_id(),
            public_key: record.public_key.to_string(),
            ip,
            tcp_port,
            udp_port: record.udp,
            addresses: record.addresses(),
            fork_digest: fork_id.fork_digest,
            next_fork_version: fork_id.next_fork_version,
            next_fork_epoch: fork_id.next_fork_epoch,
            attnets,
            protocol_version: None,
            user_agent: None,
            user_agent_raw: None,
            geo_location: None,
            sync: None,
            score: Score::GOOD,
            is_connectable: false,
            last_connected: None,
            last_updated: 0,
        })
    }
}

/// Outcome of ingesting one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// A new peer was stored.
    Created,
    /// The peer was already known.
    Known,
    /// The record was dropped before reaching the store.
    Rejected(Rejection),
    /// The store failed, the record is lost until rediscovered.
    Failed,
}

/// Feeds discovered records into the peer store.
#[derive(Debug, Clone)]
pub struct Ingestor<P: PeerStore> {
    store: P,
    filter: RecordFilter,
}

impl<P: PeerStore> Ingestor<P> {
    pub fn new(store: P, filter: RecordFilter) -> Self {
        Ingestor { store, filter }
    }

    /// Ingest one discovered record.
    pub async fn ingest(&self, record: &NodeRecord) -> Ingested {
        let peer = match self.filter.admit(record) {
            Ok(peer) => peer,
            Err(rejection) => {
                debug!("Dropping {record}: {rejection}");
                return Ingested::Rejected(rejection);
            }
        };

        let id = peer.id.clone();
        match self.store.create(peer).await {
            Ok(true) => {
                debug!("Added peer {id}");
                Ingested::Created
            }
            Ok(false) => Ingested::Known,
            Err(e) => {
                error!("Failed to store discovered peer {id}: {e}");
                Ingested::Failed
            }
        }
    }

    /// Pull records from `discovery` until it is exhausted or `shutdown` fires.
    pub async fn run<D: Discovery>(&self, mut discovery: D, shutdown: CancellationToken) {
        let mut created = 0usize;
        let mut seen = 0usize;
        let mut last_log_time = Instant::now();
        let log_interval = Duration::from_secs(60);

        loop {
            let record = tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Shutdown requested, stopping discovery");
                    break;
                }
                record = discovery.next() => record,
            };
            let Some(record) = record else {
                info!("Discovery exhausted after {seen} records");
                break;
            };

            seen += 1;
            if self.ingest(&record).await == Ingested::Created {
                created += 1;
            }

            if last_log_time.elapsed() >= log_interval {
                info!("{seen} records discovered, {created} new peers");
                last_log_time = Instant::now();
            }
        }
    }
}
