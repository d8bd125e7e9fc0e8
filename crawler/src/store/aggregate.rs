//! Network aggregations over stored peers.
//!
//! Only connectable peers are counted, a peer that never answered a probe
//! says nothing about the network.

use crate::peer::PeerRecord;
use crate::user_agent::{ClientName, Os};
use std::collections::{BTreeMap, HashMap};

/// Bucket label for peers without a location.
const UNKNOWN_COUNTRY: &str = "unknown";

/// Number of peers in one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCount {
    pub name: String,
    pub count: usize,
}

/// Peers split by sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncAggregate {
    pub total: usize,
    pub synced: usize,
    pub unsynced: usize,
}

/// Peers running one client, broken down by version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientVersionAggregate {
    pub client: String,
    pub count: usize,
    pub versions: Vec<AggregateCount>,
}

fn connectable(peers: &[PeerRecord]) -> impl Iterator<Item = &PeerRecord> {
    peers.iter().filter(|p| p.is_connectable)
}

/// Largest buckets first, ties by name.
fn into_counts(buckets: HashMap<String, usize>) -> Vec<AggregateCount> {
    let mut counts: Vec<AggregateCount> = buckets
        .into_iter()
        .map(|(name, count)| AggregateCount { name, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    counts
}

fn count_by<'a, F>(peers: &'a [PeerRecord], key: F) -> Vec<AggregateCount>
where
    F: Fn(&'a PeerRecord) -> Option<String>,
{
    let mut buckets = HashMap::new();
    for name in connectable(peers).filter_map(key) {
        *buckets.entry(name).or_insert(0) += 1;
    }
    into_counts(buckets)
}

pub(crate) fn by_agent_name(peers: &[PeerRecord]) -> Vec<AggregateCount> {
    count_by(peers, |p| {
        let name = p.user_agent.as_ref().map_or(ClientName::Others, |a| a.name);
        Some(name.to_string())
    })
}

pub(crate) fn by_os(peers: &[PeerRecord]) -> Vec<AggregateCount> {
    count_by(peers, |p| {
        let os = p.user_agent.as_ref().map_or(Os::Unknown, |a| a.os);
        Some(os.to_string())
    })
}

pub(crate) fn by_country(peers: &[PeerRecord]) -> Vec<AggregateCount> {
    count_by(peers, |p| {
        Some(match &p.geo_location {
            Some(geo) if !geo.country.is_empty() => geo.country.clone(),
            _ => UNKNOWN_COUNTRY.to_string(),
        })
    })
}

pub(crate) fn by_network_type(peers: &[PeerRecord]) -> Vec<AggregateCount> {
    count_by(peers, |p| {
        p.geo_location
            .as_ref()
            .and_then(|geo| geo.asn.usage)
            .map(|usage| usage.to_string())
    })
}

pub(crate) fn by_sync_status(peers: &[PeerRecord]) -> SyncAggregate {
    let mut aggregate = SyncAggregate::default();
    for peer in connectable(peers) {
        aggregate.total += 1;
        match peer.sync {
            Some(status) if status.synced => aggregate.synced += 1,
            _ => aggregate.unsynced += 1,
        }
    }
    aggregate
}

pub(crate) fn by_client_version(peers: &[PeerRecord]) -> Vec<ClientVersionAggregate> {
    let mut clients: BTreeMap<ClientName, HashMap<String, usize>> = BTreeMap::new();
    for peer in connectable(peers) {
        let Some(agent) = &peer.user_agent else {
            continue;
        };
        *clients
            .entry(agent.name)
            .or_default()
            .entry(agent.version.clone())
            .or_insert(0) += 1;
    }

    let mut aggregates: Vec<ClientVersionAggregate> = clients
        .into_iter()
        .map(|(client, versions)| ClientVersionAggregate {
            client: client.to_string(),
            count: versions.values().sum(),
            versions: into_counts(versions),
        })
        .collect();
    aggregates.sort_by(|a, b| b.count.cmp(&a.count));
    aggregates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::test_utils::test_peer;
    use crate::peer::{Asn, GeoLocation, UsageType};
    use crate::sync::SyncStatus;
    use crate::user_agent::UserAgent;

    fn probed(n: u8, agent: &str, synced: bool) -> PeerRecord {
        let mut peer = test_peer(n);
        peer.is_connectable = true;
        peer.user_agent = Some(UserAgent::parse(agent));
        peer.user_agent_raw = Some(agent.to_string());
        peer.sync = Some(SyncStatus {
            synced,
            distance: if synced { 0 } else { 40 },
        });
        peer
    }

    fn located(mut peer: PeerRecord, country: &str, usage: Option<UsageType>) -> PeerRecord {
        peer.geo_location = Some(GeoLocation {
            asn: Asn {
                usage,
                ..Asn::default()
            },
            country: country.to_string(),
            ..GeoLocation::default()
        });
        peer
    }

    fn count(name: &str, count: usize) -> AggregateCount {
        AggregateCount {
            name: name.to_string(),
            count,
        }
    }

    fn network() -> Vec<PeerRecord> {
        vec![
            located(
                probed(1, "Lighthouse/v4.5.0-441fc16/x86_64-linux", true),
                "DE",
                Some(UsageType::Hosting),
            ),
            located(
                probed(2, "Lighthouse/v4.4.1/aarch64-linux", true),
                "DE",
                Some(UsageType::Residential),
            ),
            located(
                probed(3, "Lighthouse/v4.5.0/x86_64-windows", false),
                "US",
                None,
            ),
            probed(4, "teku/teku/v23.10.0/linux-x86_64", true),
            // Never connected, ignored everywhere.
            located(test_peer(5), "FR", Some(UsageType::Hosting)),
        ]
    }

    #[test]
    fn test_agent_and_os() {
        let peers = network();
        assert_eq!(
            by_agent_name(&peers),
            vec![count("lighthouse", 3), count("teku", 1)]
        );
        assert_eq!(by_os(&peers), vec![count("linux", 3), count("windows", 1)]);
    }

    #[test]
    fn test_country_and_network_type() {
        let peers = network();
        assert_eq!(
            by_country(&peers),
            vec![count("DE", 2), count("US", 1), count("unknown", 1)]
        );
        // Only peers with a classified location are counted.
        assert_eq!(
            by_network_type(&peers),
            vec![count("hosting", 1), count("residential", 1)]
        );
    }

    #[test]
    fn test_sync_status() {
        assert_eq!(
            by_sync_status(&network()),
            SyncAggregate {
                total: 4,
                synced: 3,
                unsynced: 1
            }
        );
        assert_eq!(by_sync_status(&[]), SyncAggregate::default());
    }

    #[test]
    fn test_client_version() {
        let aggregates = by_client_version(&network());
        assert_eq!(aggregates.len(), 2);

        assert_eq!(aggregates[0].client, "lighthouse");
        assert_eq!(aggregates[0].count, 3);
        assert_eq!(
            aggregates[0].versions,
            vec![count("v4.5.0", 2), count("v4.4.1", 1)]
        );

        assert_eq!(aggregates[1].client, "teku");
        assert_eq!(aggregates[1].versions, vec![count("v23.10.0", 1)]);
    }
}
