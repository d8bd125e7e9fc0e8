//! Example of using the beacon-peers crawler.

use beacon_peers_crawler::{
    CrawlerBuilder, CrawlerConfig, MemoryHistoryStore, MemoryPeerStore, PeerStore,
    StaticDiscovery, StaticGeoResolver, SwarmHost,
};
use clap::Parser;
use log::LevelFilter;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long probe workers get to wind down after ctrl-c.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file with the bootstrap records.
    #[arg(short, long)]
    config: String,

    /// Comma separated fork digests to accept, overrides the config file.
    #[arg(short, long)]
    allowed_fork_digests: Option<String>,

    /// Timeout in seconds for each peer request.
    #[arg(short, long, default_value = "10")]
    request_timeout: u64,

    /// Log level.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()?;

    log::info!("CRAWLING THE BEACON CHAIN NETWORK");

    let config = CrawlerConfig::load(&args.config)?;
    log::debug!(
        "Loaded {} bootstrap records from {}",
        config.bootstrap.len(),
        args.config
    );

    let mut builder = CrawlerBuilder::new(
        SwarmHost::with_random_identity()?,
        MemoryPeerStore::new(),
        MemoryHistoryStore::new(),
        StaticGeoResolver::default(),
    )
    .with_request_timeout(Duration::from_secs(args.request_timeout))
    .with_config(&config)?;
    if let Some(digests) = &args.allowed_fork_digests {
        log::debug!("Accepting fork digests {digests}");
        builder = builder.with_allowed_fork_digests_str(digests)?;
    }
    let crawler = builder.build();

    let shutdown = CancellationToken::new();
    let mut handle = tokio::spawn({
        let crawler = crawler.clone();
        let shutdown = shutdown.clone();
        let discovery = StaticDiscovery::new(config.bootstrap);
        async move { crawler.run(discovery, shutdown).await }
    });

    let finished = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            false
        }
        _ = &mut handle => true,
    };
    if !finished {
        log::info!("Shutting down");
        shutdown.cancel();
        if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
            log::warn!("Crawler did not stop within {}s", DRAIN_TIMEOUT.as_secs());
            handle.abort();
        }
    }

    let peers = crawler.peers();
    log::info!("Tracked {} peers", peers.len().await);
    for agent in peers.aggregate_by_agent_name().await? {
        log::info!("  {}: {}", agent.name, agent.count);
    }
    let sync = peers.aggregate_by_sync_status().await?;
    log::info!(
        "{} connectable peers, {} synced, {} unsynced",
        sync.total,
        sync.synced,
        sync.unsynced
    );

    Ok(())
}
