//! TOML configuration file.
//!
//! Every section and key is optional, unset values keep the builder
//! defaults.
//!
//! ```toml
//! [crawler]
//! workers = 16
//! select_interval_secs = 5
//! stale_after_secs = 86400
//! probe_attempts = 20
//! retry_delay_secs = 5
//! request_timeout_secs = 10
//! allowed_fork_digests = ["0xbba4da96"]
//!
//! [chain]
//! genesis_unix = 1606824000
//! slot_duration_secs = 12
//! ignore_threshold_slots = 8192
//!
//! [history]
//! interval_secs = 3600
//!
//! [[bootstrap]]
//! enr = "enr:-Ly4QFPk..."
//! ```
//!
//! Bootstrap records are signed ENRs, `enr:` base64 or hex.

use crate::record::NodeRecord;
use crate::sync::ChainClock;
use beacon_peers_connection::{ForkDigest, ParseHexError};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Errors that can occur while loading a configuration file.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io {
        /// Path of the file that failed to load.
        path: String,
        error: std::io::Error,
    },
    /// The file is not valid TOML or has unexpected types.
    Parse(toml::de::Error),
    /// A value is well formed but not usable.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, error } => write!(f, "Failed to read {path}: {error}"),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {e}"),
            ConfigError::Invalid(reason) => write!(f, "Invalid config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { error, .. } => Some(error),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    crawler: CrawlerSection,
    #[serde(default)]
    chain: ChainSection,
    #[serde(default)]
    history: HistorySection,
    #[serde(default)]
    bootstrap: Vec<BootstrapEntry>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CrawlerSection {
    workers: Option<usize>,
    select_interval_secs: Option<u64>,
    stale_after_secs: Option<u64>,
    probe_attempts: Option<usize>,
    retry_delay_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    allowed_fork_digests: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ChainSection {
    genesis_unix: Option<u64>,
    slot_duration_secs: Option<u64>,
    ignore_threshold_slots: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HistorySection {
    interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BootstrapEntry {
    enr: String,
}

/// Settings loaded from a configuration file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CrawlerConfig {
    pub workers: Option<usize>,
    pub select_interval: Option<Duration>,
    pub stale_after: Option<Duration>,
    pub probe_attempts: Option<usize>,
    pub retry_delay: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub allowed_fork_digests: Vec<ForkDigest>,
    pub clock: ChainClock,
    pub history_interval: Option<Duration>,
    /// Records seeded into discovery on start.
    pub bootstrap: Vec<NodeRecord>,
}

impl CrawlerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the config file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or holds unusable values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|error| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        let crawler = file.crawler;

        if crawler.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1".to_string()));
        }
        if crawler.probe_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "probe_attempts must be at least 1".to_string(),
            ));
        }
        if file.chain.slot_duration_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "slot_duration_secs must be at least 1".to_string(),
            ));
        }

        let allowed_fork_digests = crawler
            .allowed_fork_digests
            .iter()
            .map(|s| ForkDigest::from_str(s))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let defaults = ChainClock::default();
        let clock = ChainClock {
            genesis_unix: file.chain.genesis_unix.unwrap_or(defaults.genesis_unix),
            slot_duration: file
                .chain
                .slot_duration_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.slot_duration),
            ignore_threshold: file
                .chain
                .ignore_threshold_slots
                .unwrap_or(defaults.ignore_threshold),
        };

        let bootstrap = file
            .bootstrap
            .into_iter()
            .map(bootstrap_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CrawlerConfig {
            workers: crawler.workers,
            select_interval: crawler.select_interval_secs.map(Duration::from_secs),
            stale_after: crawler.stale_after_secs.map(Duration::from_secs),
            probe_attempts: crawler.probe_attempts,
            retry_delay: crawler.retry_delay_secs.map(Duration::from_secs),
            request_timeout: crawler.request_timeout_secs.map(Duration::from_secs),
            allowed_fork_digests,
            clock,
            history_interval: file.history.interval_secs.map(Duration::from_secs),
            bootstrap,
        })
    }
}

fn bootstrap_record(entry: BootstrapEntry) -> Result<NodeRecord, ConfigError> {
    NodeRecord::parse_enr(&entry.enr)
        .map_err(|e| ConfigError::Invalid(format!("bootstrap {:?}: {e}", entry.enr)))
}

/// Parse a comma separated list of fork digests, as given on the command line.
///
/// Empty items are skipped, so an empty string yields an empty list.
pub fn parse_fork_digests(list: &str) -> Result<Vec<ForkDigest>, ParseHexError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ForkDigest::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_utils::{test_enr, test_key};
    use beacon_peers_connection::{EnrForkId, Version};

    #[test]
    fn test_empty_config_is_default() {
        let config = CrawlerConfig::parse("").unwrap();
        assert_eq!(config, CrawlerConfig::default());
        assert_eq!(config.clock, ChainClock::default());
    }

    #[test]
    fn test_full_config() {
        let fork_id = EnrForkId {
            fork_digest: ForkDigest([0xbb, 0xa4, 0xda, 0x96]),
            next_fork_version: Version([4, 0, 0, 0]),
            next_fork_epoch: u64::MAX,
        };
        let enr = test_enr(9, &fork_id).to_base64();
        let content = format!(
            r#"
            [crawler]
            workers = 16
            select_interval_secs = 2
            stale_after_secs = 600
            probe_attempts = 3
            retry_delay_secs = 1
            request_timeout_secs = 4
            allowed_fork_digests = ["0xbba4da96", "6a95a1a9"]

            [chain]
            genesis_unix = 1616508000
            slot_duration_secs = 6

            [history]
            interval_secs = 900

            [[bootstrap]]
            enr = "{enr}"
            "#
        );

        let config = CrawlerConfig::parse(&content).unwrap();
        assert_eq!(config.workers, Some(16));
        assert_eq!(config.select_interval, Some(Duration::from_secs(2)));
        assert_eq!(config.stale_after, Some(Duration::from_secs(600)));
        assert_eq!(config.probe_attempts, Some(3));
        assert_eq!(config.retry_delay, Some(Duration::from_secs(1)));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(4)));
        assert_eq!(
            config.allowed_fork_digests,
            vec![
                ForkDigest([0xbb, 0xa4, 0xda, 0x96]),
                ForkDigest([0x6a, 0x95, 0xa1, 0xa9])
            ]
        );
        assert_eq!(config.clock.genesis_unix, 1_616_508_000);
        assert_eq!(config.clock.slot_duration, Duration::from_secs(6));
        assert_eq!(config.clock.ignore_threshold, 8192);
        assert_eq!(config.history_interval, Some(Duration::from_secs(900)));

        assert_eq!(config.bootstrap.len(), 1);
        let record = &config.bootstrap[0];
        assert_eq!(record.public_key, test_key(9));
        assert_eq!(record.ip, Some([10, 0, 0, 9].into()));
        assert_eq!(record.tcp, Some(9000));
        assert_eq!(record.udp, Some(9000));
        assert_eq!(record.eth2(), Some(Ok(fork_id)));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            CrawlerConfig::parse("[crawler]\nworkers = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CrawlerConfig::parse("[crawler]\nallowed_fork_digests = [\"0xzz\"]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            CrawlerConfig::parse("[[bootstrap]]\nenr = \"enr:AAAA\""),
            Err(ConfigError::Invalid(_))
        ));
        // The old field-by-field form is gone.
        assert!(matches!(
            CrawlerConfig::parse("[[bootstrap]]\npublic_key = \"00\"\nip = \"1.2.3.4\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            CrawlerConfig::parse("[crawler]\nworkers = \"many\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            CrawlerConfig::parse("[crawler]\nthreads = 4"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        match CrawlerConfig::load("/nonexistent/beacon-peers.toml") {
            Err(ConfigError::Io { path, .. }) => assert_eq!(path, "/nonexistent/beacon-peers.toml"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_parse_fork_digests() {
        assert_eq!(
            parse_fork_digests("0xbba4da96, 6a95a1a9,").unwrap(),
            vec![
                ForkDigest([0xbb, 0xa4, 0xda, 0x96]),
                ForkDigest([0x6a, 0x95, 0xa1, 0xa9])
            ]
        );
        assert!(parse_fork_digests("").unwrap().is_empty());
        assert!(parse_fork_digests("0xbba4").is_err());
    }
}
