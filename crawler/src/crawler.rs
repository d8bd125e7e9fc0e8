use crate::discovery::Discovery;
use crate::geo::GeoResolver;
use crate::ingest::Ingestor;
use crate::lifecycle::LifecycleManager;
use crate::scheduler::Scheduler;
use crate::store::{HistoryStore, PeerStore};
use beacon_peers_connection::Host;
use log::{error, info};
use tokio_util::sync::CancellationToken;

/// A crawler for the beacon chain peer-to-peer network.
///
/// The crawler ingests discovered node records into the peer store, keeps
/// stored peers fresh by probing them with a status handshake and records a
/// history of network health. Build one with [`crate::CrawlerBuilder`].
#[derive(Debug, Clone)]
pub struct Crawler<H: Host, P: PeerStore, R: HistoryStore, G: GeoResolver> {
    ingestor: Ingestor<P>,
    lifecycle: LifecycleManager<H, P, G>,
    scheduler: Scheduler<P, R>,
    peers: P,
    history: R,
}

impl<H: Host, P: PeerStore, R: HistoryStore, G: GeoResolver> Crawler<H, P, R, G> {
    pub(crate) fn new(
        ingestor: Ingestor<P>,
        lifecycle: LifecycleManager<H, P, G>,
        scheduler: Scheduler<P, R>,
        peers: P,
        history: R,
    ) -> Self {
        Crawler {
            ingestor,
            lifecycle,
            scheduler,
            peers,
            history,
        }
    }

    /// Store of tracked peers.
    pub fn peers(&self) -> &P {
        &self.peers
    }

    /// Store of network snapshots.
    pub fn history(&self) -> &R {
        &self.history
    }

    /// Crawl the network fed by `discovery` until `shutdown` fires.
    ///
    /// Discovery running dry does not stop the crawler, known peers keep
    /// being probed until shutdown.
    ///
    /// # Termination
    ///
    /// After `shutdown` fires discovery and selection stop at once, while
    /// probe workers finish the attempt in progress. Each attempt is bounded
    /// by the request timeout, so this returns within a few timeouts.
    ///
    /// # Arguments
    ///
    /// * `discovery` - Source of node records.
    /// * `shutdown` - Cancels every crawler task.
    pub async fn run<D: Discovery>(&self, discovery: D, shutdown: CancellationToken) {
        info!("Starting crawler");

        let ingest = tokio::spawn({
            let ingestor = self.ingestor.clone();
            let shutdown = shutdown.clone();
            async move { ingestor.run(discovery, shutdown).await }
        });
        let lifecycle = tokio::spawn({
            let lifecycle = self.lifecycle.clone();
            let shutdown = shutdown.clone();
            async move { lifecycle.run(shutdown).await }
        });
        let scheduler = tokio::spawn({
            let scheduler = self.scheduler.clone();
            let shutdown = shutdown.clone();
            async move { scheduler.run(shutdown).await }
        });

        for (name, task) in [
            ("discovery", ingest),
            ("lifecycle", lifecycle),
            ("scheduler", scheduler),
        ] {
            if let Err(e) = task.await {
                error!("Crawler {name} task failed: {e}");
            }
        }
        info!("Crawler stopped");
    }
}
