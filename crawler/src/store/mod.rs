//! Peer and history storage contracts.
//!
//! The crawler never owns a database. Everything it persists goes through
//! [`PeerStore`] and [`HistoryStore`], so the backing database is the
//! embedder's choice. In-memory implementations are provided for tests and
//! the example binary.

mod aggregate;
mod memory;

pub use aggregate::{AggregateCount, ClientVersionAggregate, SyncAggregate};
pub use memory::{MemoryHistoryStore, MemoryPeerStore};

use crate::peer::PeerRecord;
use beacon_peers_connection::PeerId;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No peer with the id is stored.
    NotFound(PeerId),
    /// The backend failed or could not be reached.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "Peer {id} not found"),
            StoreError::Unavailable(reason) => write!(f, "Store unavailable: {reason}"),
        }
    }
}

impl Error for StoreError {}

/// Persistent set of tracked peers, keyed by peer id.
///
/// Every method is a single atomic operation on the backend.
pub trait PeerStore: Clone + Send + Sync + 'static {
    /// Insert `peer` unless a peer with the same id exists.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The peer was inserted.
    /// * `Ok(false)` - The peer was already stored and nothing changed.
    fn create(&self, peer: PeerRecord) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Replace a stored peer, [`StoreError::NotFound`] if it is not stored.
    fn update(&self, peer: PeerRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert or replace `peer`.
    fn upsert(&self, peer: PeerRecord) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn view(&self, id: &PeerId) -> impl Future<Output = Result<PeerRecord, StoreError>> + Send;

    fn delete(&self, id: &PeerId) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn view_all(&self) -> impl Future<Output = Result<Vec<PeerRecord>, StoreError>> + Send;

    /// Peers not updated within `older_than`, least recently updated first.
    ///
    /// # Arguments
    ///
    /// * `older_than` - Minimum age of a peer's last update.
    /// * `limit` - Maximum number of peers returned.
    fn list_stale(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PeerRecord>, StoreError>> + Send;

    /// Connectable peers counted by client name.
    fn aggregate_by_agent_name(
        &self,
    ) -> impl Future<Output = Result<Vec<AggregateCount>, StoreError>> + Send {
        async move { Ok(aggregate::by_agent_name(&self.view_all().await?)) }
    }

    /// Connectable peers counted by operating system.
    fn aggregate_by_os(
        &self,
    ) -> impl Future<Output = Result<Vec<AggregateCount>, StoreError>> + Send {
        async move { Ok(aggregate::by_os(&self.view_all().await?)) }
    }

    /// Connectable peers counted by country.
    fn aggregate_by_country(
        &self,
    ) -> impl Future<Output = Result<Vec<AggregateCount>, StoreError>> + Send {
        async move { Ok(aggregate::by_country(&self.view_all().await?)) }
    }

    /// Connectable, located peers counted by network usage type.
    fn aggregate_by_network_type(
        &self,
    ) -> impl Future<Output = Result<Vec<AggregateCount>, StoreError>> + Send {
        async move { Ok(aggregate::by_network_type(&self.view_all().await?)) }
    }

    /// Connectable peers split by sync status.
    fn aggregate_by_sync_status(
        &self,
    ) -> impl Future<Output = Result<SyncAggregate, StoreError>> + Send {
        async move { Ok(aggregate::by_sync_status(&self.view_all().await?)) }
    }

    /// Connectable peers counted by client, then by version within a client.
    fn aggregate_by_client_version(
        &self,
    ) -> impl Future<Output = Result<Vec<ClientVersionAggregate>, StoreError>> + Send {
        async move { Ok(aggregate::by_client_version(&self.view_all().await?)) }
    }
}

/// Point in time count of the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySnapshot {
    pub id: Uuid,
    /// Unix seconds the snapshot was taken.
    pub time: u64,
    pub total_peers: usize,
    pub synced_peers: usize,
}

impl HistorySnapshot {
    pub fn new(time: u64, total_peers: usize, synced_peers: usize) -> Self {
        HistorySnapshot {
            id: Uuid::new_v4(),
            time,
            total_peers,
            synced_peers,
        }
    }
}

impl fmt::Display for HistorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}: {} peers, {} synced",
            self.id, self.time, self.total_peers, self.synced_peers
        )
    }
}

/// Append-only log of network snapshots.
pub trait HistoryStore: Clone + Send + Sync + 'static {
    fn create(
        &self,
        snapshot: HistorySnapshot,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Snapshots taken strictly between `start` and `end`, oldest first.
    fn query(
        &self,
        start: u64,
        end: u64,
    ) -> impl Future<Output = Result<Vec<HistorySnapshot>, StoreError>> + Send;
}
