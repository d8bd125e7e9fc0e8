mod builder;
mod config;
mod crawler;
mod discovery;
mod geo;
mod ingest;
mod lifecycle;
mod peer;
mod probe;
mod record;
mod scheduler;
mod store;
mod sync;
mod user_agent;

pub use builder::{CrawlerBuilder, CrawlerBuilderError};
pub use config::{parse_fork_digests, ConfigError, CrawlerConfig};
pub use crawler::Crawler;
pub use discovery::{Discovery, StaticDiscovery};
pub use geo::{GeoError, GeoResolver, StaticGeoResolver};
pub use ingest::{Ingested, Ingestor, RecordFilter, Rejection};
pub use lifecycle::{LifecycleConfig, LifecycleManager};
pub use peer::{Asn, GeoLocation, PeerRecord, Score, UsageType};
pub use probe::{ProbeError, ProbeOutcome, Prober};
pub use record::{Enr, NodeRecord, RecordError, ATTNETS_KEY, ETH2_KEY};
pub use scheduler::Scheduler;
pub use store::{
    AggregateCount, ClientVersionAggregate, HistorySnapshot, HistoryStore, MemoryHistoryStore,
    MemoryPeerStore, PeerStore, StoreError, SyncAggregate,
};
pub use sync::{
    ChainClock, SyncStatus, DEFAULT_IGNORE_THRESHOLD, MAINNET_GENESIS_UNIX, MAINNET_SLOT_DURATION,
};
pub use user_agent::{ClientName, Os, UserAgent, VERSION_UNKNOWN};

// Re-exports.
pub use beacon_peers_connection::{
    AttnetBits, EnrForkId, ForkDigest, Host, HostError, Identity, Keypair, NodeId, ParseHexError,
    PeerAddrInfo, PeerAddress, PeerId, PublicKey, Root, Status, SwarmHost, Version,
};
