//! Periodic network health snapshots.

use crate::store::{HistorySnapshot, HistoryStore, PeerStore, StoreError};
use crate::sync::unix_now;
use log::{debug, error, info};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Records a [`HistorySnapshot`] of the peer store every interval.
#[derive(Debug, Clone)]
pub struct Scheduler<P: PeerStore, S: HistoryStore> {
    peers: P,
    history: S,
    interval: Duration,
}

impl<P: PeerStore, S: HistoryStore> Scheduler<P, S> {
    pub fn new(peers: P, history: S, interval: Duration) -> Self {
        Scheduler {
            peers,
            history,
            interval,
        }
    }

    /// Take one snapshot now.
    pub async fn snapshot(&self) -> Result<HistorySnapshot, StoreError> {
        let sync = self.peers.aggregate_by_sync_status().await?;
        let snapshot = HistorySnapshot::new(unix_now(), sync.total, sync.synced);
        self.history.create(snapshot.clone()).await?;
        Ok(snapshot)
    }

    /// Snapshot every interval until `shutdown` fires.
    ///
    /// The first snapshot is taken one interval after start, by then the
    /// lifecycle manager has had a chance to probe.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {}
            }

            match self.snapshot().await {
                Ok(snapshot) => info!("Recorded snapshot {snapshot}"),
                Err(e) => error!("Skipping snapshot: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::test_utils::test_peer;
    use crate::store::test_utils::CountingStore;
    use crate::store::MemoryHistoryStore;
    use crate::sync::SyncStatus;

    async fn store_with_peers() -> CountingStore {
        let store = CountingStore::new();
        for (n, synced) in [(1, Some(true)), (2, Some(false)), (3, Some(true))] {
            let mut peer = test_peer(n);
            peer.is_connectable = true;
            peer.sync = synced.map(|synced| SyncStatus {
                synced,
                distance: 0,
            });
            store.inner.upsert(peer).await.unwrap();
        }
        // Not connectable, not counted.
        store.inner.upsert(test_peer(4)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_snapshot_counts_connectable_peers() {
        let history = MemoryHistoryStore::new();
        let scheduler = Scheduler::new(
            store_with_peers().await,
            history.clone(),
            Duration::from_secs(3600),
        );

        let snapshot = scheduler.snapshot().await.unwrap();
        assert_eq!(snapshot.total_peers, 3);
        assert_eq!(snapshot.synced_peers, 2);

        let stored = history.query(0, u64::MAX).await.unwrap();
        assert_eq!(stored, vec![snapshot]);
    }

    #[tokio::test]
    async fn test_snapshot_ids_are_unique() {
        let scheduler = Scheduler::new(
            store_with_peers().await,
            MemoryHistoryStore::new(),
            Duration::from_secs(3600),
        );
        let a = scheduler.snapshot().await.unwrap();
        let b = scheduler.snapshot().await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_store_failure_records_nothing() {
        let store = store_with_peers().await;
        store.set_unavailable(true);
        let history = MemoryHistoryStore::new();
        let scheduler = Scheduler::new(store, history.clone(), Duration::from_secs(3600));

        assert!(matches!(
            scheduler.snapshot().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(history.query(0, u64::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_snapshots_until_shutdown() {
        let history = MemoryHistoryStore::new();
        let scheduler = Scheduler::new(
            store_with_peers().await,
            history.clone(),
            Duration::from_millis(10),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            let shutdown = shutdown.clone();
            async move { scheduler.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        handle.await.unwrap();

        let taken = history.query(0, u64::MAX).await.unwrap().len();
        assert!(taken >= 2, "only {taken} snapshots");
    }
}
