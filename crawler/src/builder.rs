//! Builder pattern for configuring and creating crawler instances.

use crate::config::{parse_fork_digests, CrawlerConfig};
use crate::crawler::Crawler;
use crate::geo::GeoResolver;
use crate::ingest::{Ingestor, RecordFilter};
use crate::lifecycle::{LifecycleConfig, LifecycleManager};
use crate::probe::Prober;
use crate::scheduler::Scheduler;
use crate::store::{HistoryStore, PeerStore};
use crate::sync::ChainClock;
use beacon_peers_connection::{ForkDigest, Host, ParseHexError};
use std::fmt;
use std::time::Duration;

/// Default number of probe workers.
const DEFAULT_WORKERS: usize = 8;
/// Default pause between stale peer selections.
const DEFAULT_SELECT_INTERVAL: Duration = Duration::from_secs(5);
/// Default age after which a peer is probed again.
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);
/// Default number of attempts in a probe sequence.
const DEFAULT_PROBE_ATTEMPTS: usize = 20;
/// Default pause between attempts.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Default timeout for each host call and the status exchange.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default pause between history snapshots.
const DEFAULT_HISTORY_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Errors that can occur during crawler configuration.
#[derive(Debug, Clone)]
pub enum CrawlerBuilderError {
    /// A fork digest is not 4 hex encoded bytes.
    InvalidForkDigest(ParseHexError),
    /// A setting is out of range.
    InvalidSetting(&'static str),
}

impl fmt::Display for CrawlerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerBuilderError::InvalidForkDigest(err) => {
                write!(f, "Invalid fork digest: {err}")
            }
            CrawlerBuilderError::InvalidSetting(reason) => {
                write!(f, "Invalid setting: {reason}")
            }
        }
    }
}

impl std::error::Error for CrawlerBuilderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrawlerBuilderError::InvalidForkDigest(err) => Some(err),
            CrawlerBuilderError::InvalidSetting(_) => None,
        }
    }
}

/// Builder for creating a customized [`Crawler`] instance.
///
/// # Example
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use beacon_peers_crawler::{
///     CrawlerBuilder, MemoryHistoryStore, MemoryPeerStore, StaticGeoResolver, SwarmHost,
/// };
///
/// // Crawl mainnet peers only, with a larger worker pool.
/// let crawler = CrawlerBuilder::new(
///     SwarmHost::with_random_identity()?,
///     MemoryPeerStore::new(),
///     MemoryHistoryStore::new(),
///     StaticGeoResolver::default(),
/// )
/// .with_workers(32)?
/// .with_allowed_fork_digests_str("0xbba4da96")?
/// .build();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CrawlerBuilder<H, P, R, G> {
    host: H,
    peers: P,
    history: R,
    geo: G,
    /// Number of probe workers.
    workers: usize,
    /// Pause between stale peer selections.
    select_interval: Duration,
    /// Age after which a peer is probed again.
    stale_after: Duration,
    /// Attempts in one probe sequence.
    probe_attempts: usize,
    /// Pause between attempts.
    retry_delay: Duration,
    /// Timeout for each host call and the status exchange.
    request_timeout: Duration,
    /// Fork digests discovered peers must advertise, empty accepts all.
    allowed_fork_digests: Vec<ForkDigest>,
    /// Chain clock for sync classification.
    clock: ChainClock,
    /// Pause between history snapshots.
    history_interval: Duration,
}

impl<H, P, R, G> CrawlerBuilder<H, P, R, G>
where
    H: Host,
    P: PeerStore,
    R: HistoryStore,
    G: GeoResolver,
{
    /// Create a new crawler builder over its collaborators.
    ///
    /// # Arguments
    ///
    /// * `host` - Connects to peers and opens protocol streams.
    /// * `peers` - Store of tracked peers.
    /// * `history` - Store of network snapshots.
    /// * `geo` - Resolves peer IPs to locations.
    ///
    /// # Returns
    ///
    /// A new `CrawlerBuilder` instance with default settings.
    pub fn new(host: H, peers: P, history: R, geo: G) -> Self {
        CrawlerBuilder {
            host,
            peers,
            history,
            geo,
            workers: DEFAULT_WORKERS,
            select_interval: DEFAULT_SELECT_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            probe_attempts: DEFAULT_PROBE_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            allowed_fork_digests: Vec::new(),
            clock: ChainClock::default(),
            history_interval: DEFAULT_HISTORY_INTERVAL,
        }
    }

    /// Set the number of probe workers.
    ///
    /// This also caps the number of peers queued or probed at once.
    ///
    /// # Arguments
    ///
    /// * `workers` - Number of workers (defaults to 8).
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining.
    /// * `Err(CrawlerBuilderError)` - If `workers` is zero.
    pub fn with_workers(mut self, workers: usize) -> Result<Self, CrawlerBuilderError> {
        if workers == 0 {
            return Err(CrawlerBuilderError::InvalidSetting("workers must be at least 1"));
        }
        self.workers = workers;
        Ok(self)
    }

    /// Set how often stale peers are selected (defaults to 5 seconds).
    pub fn with_select_interval(mut self, interval: Duration) -> Self {
        self.select_interval = interval;
        self
    }

    /// Set the age of the last update after which a peer is probed again
    /// (defaults to 24 hours).
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Set the number of attempts in a probe sequence.
    ///
    /// # Arguments
    ///
    /// * `attempts` - Attempts before the sequence fails (defaults to 20).
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining.
    /// * `Err(CrawlerBuilderError)` - If `attempts` is zero.
    pub fn with_probe_attempts(mut self, attempts: usize) -> Result<Self, CrawlerBuilderError> {
        if attempts == 0 {
            return Err(CrawlerBuilderError::InvalidSetting(
                "probe attempts must be at least 1",
            ));
        }
        self.probe_attempts = attempts;
        Ok(self)
    }

    /// Set the pause between attempts of a sequence (defaults to 5 seconds).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the timeout for peer operations.
    ///
    /// This timeout applies to each of these separately.
    ///
    /// * Connecting to the peer.
    /// * Opening the status stream.
    /// * The whole status exchange.
    /// * Identify.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time for each operation (defaults to 10 seconds).
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Only track peers advertising one of `digests`, empty accepts all.
    pub fn with_allowed_fork_digests(
        mut self,
        digests: impl IntoIterator<Item = ForkDigest>,
    ) -> Self {
        self.allowed_fork_digests = digests.into_iter().collect();
        self
    }

    /// Like [`CrawlerBuilder::with_allowed_fork_digests`] from a comma
    /// separated hex list such as `0xbba4da96,0x6a95a1a9`.
    pub fn with_allowed_fork_digests_str(self, list: &str) -> Result<Self, CrawlerBuilderError> {
        let digests = parse_fork_digests(list).map_err(CrawlerBuilderError::InvalidForkDigest)?;
        Ok(self.with_allowed_fork_digests(digests))
    }

    /// Set the chain clock used to judge sync status (defaults to mainnet).
    pub fn with_chain_clock(mut self, clock: ChainClock) -> Self {
        self.clock = clock;
        self
    }

    /// Set how often a history snapshot is taken (defaults to 1 hour).
    pub fn with_history_interval(mut self, interval: Duration) -> Self {
        self.history_interval = interval;
        self
    }

    /// Apply every setting present in `config`.
    ///
    /// The chain clock is always replaced, a file without a `[chain]`
    /// section carries the mainnet clock.
    pub fn with_config(mut self, config: &CrawlerConfig) -> Result<Self, CrawlerBuilderError> {
        if let Some(workers) = config.workers {
            self = self.with_workers(workers)?;
        }
        if let Some(attempts) = config.probe_attempts {
            self = self.with_probe_attempts(attempts)?;
        }
        if let Some(interval) = config.select_interval {
            self.select_interval = interval;
        }
        if let Some(stale_after) = config.stale_after {
            self.stale_after = stale_after;
        }
        if let Some(delay) = config.retry_delay {
            self.retry_delay = delay;
        }
        if let Some(timeout) = config.request_timeout {
            self.request_timeout = timeout;
        }
        if let Some(interval) = config.history_interval {
            self.history_interval = interval;
        }
        if !config.allowed_fork_digests.is_empty() {
            self.allowed_fork_digests = config.allowed_fork_digests.clone();
        }
        self.clock = config.clock;
        Ok(self)
    }

    /// Build the crawler with the configured options.
    ///
    /// # Returns
    ///
    /// A configured `Crawler` instance.
    pub fn build(self) -> Crawler<H, P, R, G> {
        let ingestor = Ingestor::new(
            self.peers.clone(),
            RecordFilter::new(self.allowed_fork_digests),
        );
        let lifecycle = LifecycleManager::new(
            Prober::new(self.host, self.request_timeout),
            self.peers.clone(),
            self.geo,
            self.clock,
            LifecycleConfig {
                workers: self.workers,
                select_interval: self.select_interval,
                stale_after: self.stale_after,
                probe_attempts: self.probe_attempts,
                retry_delay: self.retry_delay,
            },
        );
        let scheduler = Scheduler::new(
            self.peers.clone(),
            self.history.clone(),
            self.history_interval,
        );
        Crawler::new(ingestor, lifecycle, scheduler, self.peers, self.history)
    }
}
