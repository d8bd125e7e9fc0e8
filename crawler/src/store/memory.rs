//! In-memory store implementations.

use super::{HistorySnapshot, HistoryStore, PeerStore, StoreError};
use crate::peer::PeerRecord;
use crate::sync::unix_now;
use beacon_peers_connection::PeerId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Peer store held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPeerStore {
    peers: Arc<RwLock<HashMap<PeerId, PeerRecord>>>,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}

impl PeerStore for MemoryPeerStore {
    async fn create(&self, peer: PeerRecord) -> Result<bool, StoreError> {
        let mut peers = self.peers.write().await;
        if peers.contains_key(&peer.id) {
            return Ok(false);
        }
        peers.insert(peer.id.clone(), peer);
        Ok(true)
    }

    async fn update(&self, peer: PeerRecord) -> Result<(), StoreError> {
        let mut peers = self.peers.write().await;
        match peers.get_mut(&peer.id) {
            Some(stored) => {
                *stored = peer;
                Ok(())
            }
            None => Err(StoreError::NotFound(peer.id)),
        }
    }

    async fn upsert(&self, peer: PeerRecord) -> Result<(), StoreError> {
        self.peers.write().await.insert(peer.id.clone(), peer);
        Ok(())
    }

    async fn view(&self, id: &PeerId) -> Result<PeerRecord, StoreError> {
        self.peers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn delete(&self, id: &PeerId) -> Result<(), StoreError> {
        self.peers
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn view_all(&self) -> Result<Vec<PeerRecord>, StoreError> {
        Ok(self.peers.read().await.values().cloned().collect())
    }

    async fn list_stale(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<PeerRecord>, StoreError> {
        let cutoff = unix_now().saturating_sub(older_than.as_secs());
        let mut stale: Vec<PeerRecord> = self
            .peers
            .read()
            .await
            .values()
            .filter(|p| p.last_updated < cutoff)
            .cloned()
            .collect();
        stale.sort_by(|a, b| {
            a.last_updated
                .cmp(&b.last_updated)
                .then_with(|| a.id.cmp(&b.id))
        });
        stale.truncate(limit);
        Ok(stale)
    }
}

/// History store held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    snapshots: Arc<RwLock<Vec<HistorySnapshot>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    async fn create(&self, snapshot: HistorySnapshot) -> Result<(), StoreError> {
        self.snapshots.write().await.push(snapshot);
        Ok(())
    }

    async fn query(&self, start: u64, end: u64) -> Result<Vec<HistorySnapshot>, StoreError> {
        let mut snapshots: Vec<HistorySnapshot> = self
            .snapshots
            .read()
            .await
            .iter()
            .filter(|s| s.time > start && s.time < end)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.time);
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::test_utils::test_peer;
    use crate::peer::Score;

    #[tokio::test]
    async fn test_create_if_absent() {
        let store = MemoryPeerStore::new();
        let peer = test_peer(1);
        assert!(store.create(peer.clone()).await.unwrap());

        let mut changed = peer.clone();
        changed.score = Score::BAD;
        assert!(!store.create(changed).await.unwrap());

        // The first write wins.
        assert_eq!(store.view(&peer.id).await.unwrap(), peer);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_requires_existing_peer() {
        let store = MemoryPeerStore::new();
        let mut peer = test_peer(1);
        assert_eq!(
            store.update(peer.clone()).await,
            Err(StoreError::NotFound(peer.id.clone()))
        );

        store.upsert(peer.clone()).await.unwrap();
        peer.is_connectable = true;
        store.update(peer.clone()).await.unwrap();
        assert!(store.view(&peer.id).await.unwrap().is_connectable);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryPeerStore::new();
        let peer = test_peer(1);
        store.upsert(peer.clone()).await.unwrap();

        store.delete(&peer.id).await.unwrap();
        assert!(store.is_empty().await);
        assert_eq!(
            store.delete(&peer.id).await,
            Err(StoreError::NotFound(peer.id.clone()))
        );
        assert!(matches!(
            store.view(&peer.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_stale_oldest_first() {
        let store = MemoryPeerStore::new();
        let now = unix_now();
        for (n, last_updated) in [(1, now - 100), (2, 10), (3, now), (4, 500)] {
            let mut peer = test_peer(n);
            peer.last_updated = last_updated;
            store.upsert(peer).await.unwrap();
        }

        let stale = store.list_stale(Duration::from_secs(60), 10).await.unwrap();
        let times: Vec<u64> = stale.iter().map(|p| p.last_updated).collect();
        assert_eq!(times, vec![10, 500, now - 100]);

        let stale = store.list_stale(Duration::from_secs(60), 1).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].last_updated, 10);
    }

    #[tokio::test]
    async fn test_history_query_is_exclusive() {
        let store = MemoryHistoryStore::new();
        for time in [300, 100, 200, 400] {
            store
                .create(HistorySnapshot::new(time, 10, 5))
                .await
                .unwrap();
        }

        let times: Vec<u64> = store
            .query(100, 400)
            .await
            .unwrap()
            .iter()
            .map(|s| s.time)
            .collect();
        assert_eq!(times, vec![200, 300]);
        assert!(store.query(400, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aggregations_use_stored_peers() {
        let store = MemoryPeerStore::new();
        let mut peer = test_peer(1);
        peer.is_connectable = true;
        store.upsert(peer).await.unwrap();
        store.upsert(test_peer(2)).await.unwrap();

        let sync = store.aggregate_by_sync_status().await.unwrap();
        assert_eq!(sync.total, 1);
        assert_eq!(sync.unsynced, 1);
    }
}
