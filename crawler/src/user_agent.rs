//! Beacon client agent string parsing.
//!
//! Clients report agents in a loose `Name/Version/Platform` form and every
//! client bends the layout a little. Parsing is total: anything unrecognised
//! falls back to [`ClientName::Others`], [`Os::Unknown`] and an `unknown`
//! version so aggregations always have a bucket for a peer.

use std::fmt;

/// Version reported when an agent carries none.
pub const VERSION_UNKNOWN: &str = "unknown";

/// Known beacon chain clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClientName {
    Prysm,
    Lighthouse,
    Teku,
    Cortex,
    Lodestar,
    Nimbus,
    Trinity,
    Grandine,
    Others,
}

impl ClientName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientName::Prysm => "prysm",
            ClientName::Lighthouse => "lighthouse",
            ClientName::Teku => "teku",
            ClientName::Cortex => "cortex",
            ClientName::Lodestar => "lodestar",
            ClientName::Nimbus => "nimbus",
            ClientName::Trinity => "trinity",
            ClientName::Grandine => "grandine",
            ClientName::Others => "others",
        }
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating system family of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    Linux,
    Mac,
    Windows,
    Unknown,
}

impl Os {
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Mac => "mac",
            Os::Windows => "windows",
            Os::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tokens a client may use as the first agent field.
const CLIENT_TOKENS: &[(ClientName, &[&str])] = &[
    (ClientName::Prysm, &["prysm"]),
    (ClientName::Lighthouse, &["lighthouse"]),
    (ClientName::Teku, &["teku"]),
    (ClientName::Cortex, &["cortex"]),
    (ClientName::Lodestar, &["lodestar", "js-libp2p"]),
    (ClientName::Nimbus, &["nimbus"]),
    (ClientName::Trinity, &["trinity"]),
    (ClientName::Grandine, &["grandine", "rust"]),
];

/// Field positions of the version and platform in a client's agent.
struct FieldLayout {
    version: usize,
    os: Option<usize>,
}

fn layout(client: ClientName) -> FieldLayout {
    match client {
        // teku/teku/v23.1.0/linux-x86_64/...
        ClientName::Teku => FieldLayout {
            version: 2,
            os: Some(3),
        },
        // Prysm/v4.0.8/<commit>
        ClientName::Prysm => FieldLayout {
            version: 1,
            os: None,
        },
        _ => FieldLayout {
            version: 1,
            os: Some(2),
        },
    }
}

/// OS families in match order, later matches win.
const OS_TOKENS: &[(Os, &str)] = &[(Os::Linux, "linux"), (Os::Mac, "mac"), (Os::Windows, "windows")];

/// Parsed client agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserAgent {
    pub name: ClientName,
    /// Release version with build metadata and pre-release suffix removed.
    pub version: String,
    pub os: Os,
}

impl UserAgent {
    /// Parse an agent string.
    ///
    /// # Example
    ///
    /// ```
    /// use beacon_peers_crawler::{ClientName, Os, UserAgent};
    ///
    /// let agent = UserAgent::parse("Lighthouse/v4.5.0-441fc16/x86_64-linux");
    /// assert_eq!(agent.name, ClientName::Lighthouse);
    /// assert_eq!(agent.version, "v4.5.0");
    /// assert_eq!(agent.os, Os::Linux);
    /// ```
    pub fn parse(agent: &str) -> Self {
        let parts: Vec<&str> = agent.split('/').collect();
        let first = parts.first().copied().unwrap_or_default();

        let name = CLIENT_TOKENS
            .iter()
            .find(|(_, tokens)| tokens.iter().any(|t| t.eq_ignore_ascii_case(first)))
            .map(|(client, _)| *client)
            .unwrap_or(ClientName::Others);

        let fields = layout(name);
        let raw_version = parts.get(fields.version).copied().unwrap_or_default();
        let platform = fields
            .os
            .and_then(|i| parts.get(i).copied())
            .unwrap_or_default()
            .to_lowercase();

        let version = raw_version
            .split(['-', '+'])
            .next()
            .unwrap_or_default();
        let version = if version.is_empty() {
            VERSION_UNKNOWN.to_string()
        } else {
            version.to_string()
        };

        let os = OS_TOKENS
            .iter()
            .filter(|(_, token)| platform.contains(token))
            .map(|(os, _)| *os)
            .last()
            .unwrap_or(Os::Unknown);

        UserAgent { name, version, os }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.version, self.os)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_clients() {
        let agent = UserAgent::parse("Lighthouse/v4.5.0-441fc16/x86_64-linux");
        assert_eq!(agent.name, ClientName::Lighthouse);
        assert_eq!(agent.version, "v4.5.0");
        assert_eq!(agent.os, Os::Linux);

        let agent = UserAgent::parse("nimbus/v23.10.1-8a1cf1-stateofus/windows-amd64");
        assert_eq!(agent.name, ClientName::Nimbus);
        assert_eq!(agent.version, "v23.10.1");
        assert_eq!(agent.os, Os::Windows);
    }

    #[test]
    fn test_parse_teku_layout() {
        let agent = UserAgent::parse("teku/teku/v23.10.0+12-g3c6e9b4/linux-x86_64/-eclipseadoptium-openjdk64bitservervm-java-17");
        assert_eq!(agent.name, ClientName::Teku);
        assert_eq!(agent.version, "v23.10.0");
        assert_eq!(agent.os, Os::Linux);
    }

    #[test]
    fn test_parse_prysm_layout() {
        let agent = UserAgent::parse("Prysm/v4.1.1/d1b3f64c4ab4d358deb8c3a7b8d21bcd5eeeec42");
        assert_eq!(agent.name, ClientName::Prysm);
        assert_eq!(agent.version, "v4.1.1");
        // Prysm reports a commit in the platform position.
        assert_eq!(agent.os, Os::Unknown);
    }

    #[test]
    fn test_parse_alias_tokens() {
        assert_eq!(
            UserAgent::parse("js-libp2p/0.46.21/node").name,
            ClientName::Lodestar
        );
        assert_eq!(
            UserAgent::parse("rust/v0.4.0/darwin-mac").name,
            ClientName::Grandine
        );
        assert_eq!(UserAgent::parse("rust/v0.4.0/darwin-mac").os, Os::Mac);
    }

    #[test]
    fn test_parse_unknown_agents() {
        let agent = UserAgent::parse("");
        assert_eq!(agent.name, ClientName::Others);
        assert_eq!(agent.version, VERSION_UNKNOWN);
        assert_eq!(agent.os, Os::Unknown);

        let agent = UserAgent::parse("erigon/2.48.1");
        assert_eq!(agent.name, ClientName::Others);
        assert_eq!(agent.version, "2.48.1");
        assert_eq!(agent.os, Os::Unknown);

        let agent = UserAgent::parse("lighthouse");
        assert_eq!(agent.name, ClientName::Lighthouse);
        assert_eq!(agent.version, VERSION_UNKNOWN);
    }

    #[test]
    fn test_token_match_is_whole_field() {
        assert_eq!(
            UserAgent::parse("rust-libp2p/0.52.0").name,
            ClientName::Others
        );
    }

    #[test]
    fn test_display() {
        let agent = UserAgent::parse("Lighthouse/v4.5.0-441fc16/x86_64-linux");
        assert_eq!(agent.to_string(), "lighthouse/v4.5.0/linux");
    }
}
