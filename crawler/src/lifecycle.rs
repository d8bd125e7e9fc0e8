//! Peer lifecycle management.
//!
//! This module contains the [`LifecycleManager`] which keeps stored peers
//! fresh: stale peers are selected, probed by a bounded pool of workers and
//! then scored, updated or evicted.
//!
//! # Architecture
//!
//! * **Selector** (`run()`) - Lists stale peers every select interval and queues
//!   them for the workers, one semaphore permit per queued peer.
//! * **Workers** (`work()`) - Run the probe sequence of a peer and store the outcome.
//!
//! The semaphore is sized to the worker count, so queued plus running probes
//! never exceed it and the selector stalls instead of growing the queue. A
//! peer is tracked in the in-flight set from selection until its outcome has
//! been stored, and is never selected twice in that window.

use crate::geo::GeoResolver;
use crate::peer::{PeerRecord, Score};
use crate::probe::{ProbeOutcome, Prober};
use crate::store::{PeerStore, StoreError};
use crate::sync::{unix_now, ChainClock};
use crate::user_agent::UserAgent;
use beacon_peers_connection::{Host, PeerId};
use log::{debug, error, info};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Configuration for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Number of probe workers, also the cap on queued plus running probes.
    pub workers: usize,
    pub select_interval: Duration,
    /// Age of the last update after which a peer is probed again.
    pub stale_after: Duration,
    /// Attempts in one probe sequence.
    pub probe_attempts: usize,
    /// Pause between attempts of a sequence.
    pub retry_delay: Duration,
}

/// A selected peer together with the slot it occupies.
type Job = (PeerRecord, OwnedSemaphorePermit);

/// Result of one probe sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SequenceResult {
    /// The peer answered, its record was refreshed.
    Connected,
    /// Every attempt failed and the score dropped to the new value.
    Demoted(Score),
    /// Every attempt failed and the peer was deleted.
    Evicted,
    /// Shutdown interrupted the sequence, nothing was stored.
    Cancelled,
    /// The outcome could not be stored.
    StoreFailed,
}

/// Re-probes stale peers under bounded concurrency.
#[derive(Debug, Clone)]
pub struct LifecycleManager<H: Host, P: PeerStore, G: GeoResolver> {
    prober: Prober<H>,
    store: P,
    geo: G,
    clock: ChainClock,
    config: LifecycleConfig,
    /// Peers between selection and stored outcome.
    in_flight: Arc<Mutex<HashSet<PeerId>>>,
    permits: Arc<Semaphore>,
}

impl<H: Host, P: PeerStore, G: GeoResolver> LifecycleManager<H, P, G> {
    pub fn new(
        prober: Prober<H>,
        store: P,
        geo: G,
        clock: ChainClock,
        config: LifecycleConfig,
    ) -> Self {
        let workers = config.workers.max(1);
        LifecycleManager {
            prober,
            store,
            geo,
            clock,
            config: LifecycleConfig { workers, ..config },
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            permits: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Select and probe peers until `shutdown` fires.
    ///
    /// Returns once the selector has stopped and every worker has finished
    /// its current sequence.
    pub async fn run(&self, shutdown: CancellationToken) {
        let (queue_tx, queue_rx) = mpsc::channel::<Job>(self.config.workers);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let workers: Vec<_> = (0..self.config.workers)
            .map(|_| {
                let manager = self.clone();
                let queue = queue_rx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { manager.work(queue, shutdown).await })
            })
            .collect();

        let mut ticker = interval(self.config.select_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_log_time = Instant::now();
        let log_interval = Duration::from_secs(60);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if last_log_time.elapsed() >= log_interval {
                self.log_status().await;
                last_log_time = Instant::now();
            }

            match self.select(&queue_tx, &shutdown).await {
                Ok(0) => {}
                Ok(queued) => debug!("Queued {queued} stale peers"),
                Err(e) => error!("Skipping peer selection: {e}"),
            }
        }

        debug!("Shutdown requested, waiting for probe workers");
        drop(queue_tx);
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Probe worker failed: {e}");
            }
        }
    }

    async fn log_status(&self) {
        let active = self.config.workers - self.permits.available_permits();
        match self.store.view_all().await {
            Ok(peers) => info!(
                "{} active probes (max: {}), {} known peers",
                active,
                self.config.workers,
                peers.len()
            ),
            Err(e) => error!("Failed to count known peers: {e}"),
        }
    }

    /// Queue stale peers for the workers.
    ///
    /// Waits for a free worker slot when none is available, so at least one
    /// peer is queued per call when any is stale.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of peers queued.
    /// * `Err(StoreError)` - If stale peers could not be listed.
    async fn select(
        &self,
        queue: &mpsc::Sender<Job>,
        shutdown: &CancellationToken,
    ) -> Result<usize, StoreError> {
        let wanted = self.permits.available_permits().max(1);
        let in_flight = self.in_flight.lock().await.len();
        let stale = self
            .store
            .list_stale(self.config.stale_after, wanted + in_flight)
            .await?;

        let candidates: Vec<PeerRecord> = {
            let in_flight = self.in_flight.lock().await;
            stale
                .into_iter()
                .filter(|p| !in_flight.contains(&p.id))
                .take(wanted)
                .collect()
        };

        let mut queued = 0;
        for peer in candidates {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let id = peer.id.clone();
            self.in_flight.lock().await.insert(id.clone());
            if queue.send((peer, permit)).await.is_err() {
                debug!("Probe workers stopped, dropping selection");
                self.in_flight.lock().await.remove(&id);
                break;
            }
            queued += 1;
        }
        Ok(queued)
    }

    /// Take peers off the queue until it closes or `shutdown` fires.
    async fn work(&self, queue: Arc<Mutex<mpsc::Receiver<Job>>>, shutdown: CancellationToken) {
        loop {
            let job = {
                let mut queue = queue.lock().await;
                tokio::select! {
                    _ = shutdown.cancelled() => None,
                    job = queue.recv() => job,
                }
            };
            let Some((peer, permit)) = job else {
                break;
            };

            let id = peer.id.clone();
            let result = self.probe_sequence(peer, &shutdown).await;
            debug!("Probe sequence of {id} finished: {result:?}");

            self.in_flight.lock().await.remove(&id);
            drop(permit);
        }
    }

    /// Probe `peer` until an attempt succeeds or the attempts run out, then
    /// store the outcome.
    async fn probe_sequence(
        &self,
        peer: PeerRecord,
        shutdown: &CancellationToken,
    ) -> SequenceResult {
        let attempts = self.config.probe_attempts.max(1);
        for attempt in 1..=attempts {
            if shutdown.is_cancelled() {
                return SequenceResult::Cancelled;
            }

            match self.prober.attempt(&peer).await {
                Ok(outcome) => return self.record_success(peer, outcome).await,
                Err(e) => debug!("Attempt {attempt}/{attempts} on {} failed: {e}", peer.id),
            }

            if attempt < attempts {
                tokio::select! {
                    _ = shutdown.cancelled() => return SequenceResult::Cancelled,
                    _ = sleep(self.config.retry_delay) => {}
                }
            }
        }
        self.record_failure(peer).await
    }

    async fn record_success(&self, mut peer: PeerRecord, outcome: ProbeOutcome) -> SequenceResult {
        let now = unix_now();
        peer.score = Score::GOOD;
        peer.is_connectable = true;
        peer.last_connected = Some(now);
        peer.sync = Some(self.clock.classify(outcome.status.head_slot, now));

        if let Some(identity) = outcome.identity {
            peer.protocol_version = Some(identity.protocol_version);
            peer.user_agent = Some(UserAgent::parse(&identity.agent_version));
            peer.user_agent_raw = Some(identity.agent_version);
        }

        if peer.geo_location.is_none() {
            match self.geo.lookup(peer.ip).await {
                Ok(location) => peer.geo_location = Some(location),
                Err(e) => debug!("No location for {}: {e}", peer.ip),
            }
        }

        peer.last_updated = now;
        let id = peer.id.clone();
        match self.store.update(peer).await {
            Ok(()) => SequenceResult::Connected,
            Err(e) => {
                error!("Failed to store probe of {id}: {e}");
                SequenceResult::StoreFailed
            }
        }
    }

    async fn record_failure(&self, mut peer: PeerRecord) -> SequenceResult {
        let score = peer.score.decremented();
        if score.is_bad() {
            return match self.store.delete(&peer.id).await {
                Ok(()) => {
                    info!("Evicted unreachable peer {}", peer.id);
                    SequenceResult::Evicted
                }
                Err(e) => {
                    error!("Failed to evict {}: {e}", peer.id);
                    SequenceResult::StoreFailed
                }
            };
        }

        peer.score = score;
        peer.last_updated = unix_now();
        let id = peer.id.clone();
        match self.store.update(peer).await {
            Ok(()) => SequenceResult::Demoted(score),
            Err(e) => {
                error!("Failed to store score of {id}: {e}");
                SequenceResult::StoreFailed
            }
        }
    }
}
