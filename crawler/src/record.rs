//! Discovered node records.
//!
//! Records arrive as signed ENRs, in text as `enr:` base64 or as hex. Only
//! secp256k1 (`v4`) records are accepted.

use beacon_peers_connection::{
    AttnetBits, CodecError, EnrForkId, NodeId, PeerAddress, PeerId, PublicKey, Ssz,
};
use bitcoin::hex::FromHex;
use enr::k256::ecdsa::SigningKey;
use enr::EnrPublicKey;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A signed node record holding a secp256k1 key.
pub type Enr = enr::Enr<SigningKey>;

/// Key of the fork identification entry.
pub const ETH2_KEY: &str = "eth2";
/// Key of the attestation subnet bitfield entry.
pub const ATTNETS_KEY: &str = "attnets";

/// Errors turning an ENR into a [`NodeRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The text is neither a hex nor a base64 encoded signed record.
    Decode(String),
    /// The record key is not a usable secp256k1 public key.
    InvalidKey,
    /// An entry value is not an RLP byte string.
    Entry(&'static str),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::Decode(reason) => write!(f, "Undecodable node record: {reason}"),
            RecordError::InvalidKey => write!(f, "Node record has an invalid public key"),
            RecordError::Entry(key) => write!(f, "Node record entry {key} is malformed"),
        }
    }
}

impl std::error::Error for RecordError {}

/// A node record as handed over by discovery.
///
/// Only the fields the crawler reads are kept: the signing key, the
/// advertised endpoints and the raw key/value entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub public_key: PublicKey,
    pub ip: Option<IpAddr>,
    pub tcp: Option<u16>,
    pub udp: Option<u16>,
    entries: BTreeMap<String, Vec<u8>>,
}

impl NodeRecord {
    pub fn new(public_key: PublicKey) -> Self {
        NodeRecord {
            public_key,
            ip: None,
            tcp: None,
            udp: None,
            entries: BTreeMap::new(),
        }
    }

    /// Take the fields the crawler reads out of a verified ENR.
    ///
    /// IPv4 endpoints win over IPv6 ones when a record carries both.
    pub fn from_enr(enr: &Enr) -> Result<Self, RecordError> {
        let public_key = PublicKey::from_slice(&enr.public_key().encode())
            .map_err(|_| RecordError::InvalidKey)?;
        let mut record = NodeRecord::new(public_key);

        if let Some(ip) = enr.ip4() {
            record = record.with_ip(ip.into());
            record.tcp = enr.tcp4();
            record.udp = enr.udp4();
        } else if let Some(ip) = enr.ip6() {
            record = record.with_ip(ip.into());
            record.tcp = enr.tcp6();
            record.udp = enr.udp6();
        }
        record.tcp = record.tcp.filter(|port| *port != 0);
        record.udp = record.udp.filter(|port| *port != 0);

        for key in [ETH2_KEY, ATTNETS_KEY] {
            if let Some(value) = enr.get_decodable::<alloy_rlp::Bytes>(key) {
                let value = value.map_err(|_| RecordError::Entry(key))?;
                record = record.with_entry(key, value.to_vec());
            }
        }
        Ok(record)
    }

    /// Decode and verify a textual ENR.
    ///
    /// Hex (with or without `0x`) is tried first, then URL safe base64 with
    /// an optional `enr:` prefix.
    pub fn parse_enr(text: &str) -> Result<Self, RecordError> {
        let text = text.trim();
        let digits = text.strip_prefix("0x").unwrap_or(text);
        let enr = match Vec::<u8>::from_hex(digits) {
            Ok(bytes) => <Enr as alloy_rlp::Decodable>::decode(&mut bytes.as_slice())
                .map_err(|e| RecordError::Decode(e.to_string()))?,
            Err(_) => Enr::from_str(text).map_err(RecordError::Decode)?,
        };
        Self::from_enr(&enr)
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Set the TCP port, `0` counts as not advertised.
    pub fn with_tcp(mut self, port: u16) -> Self {
        self.tcp = (port != 0).then_some(port);
        self
    }

    pub fn with_udp(mut self, port: u16) -> Self {
        self.udp = (port != 0).then_some(port);
        self
    }

    /// Set a raw entry, replacing any previous value.
    pub fn with_entry(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn with_eth2(self, fork_id: &EnrForkId) -> Self {
        self.with_entry(ETH2_KEY, fork_id.to_ssz())
    }

    pub fn with_attnets(self, attnets: &AttnetBits) -> Self {
        self.with_entry(ATTNETS_KEY, attnets.to_ssz())
    }

    pub fn entry(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Decode the fork identification entry, `None` when it is absent.
    pub fn eth2(&self) -> Option<Result<EnrForkId, CodecError>> {
        self.entry(ETH2_KEY).map(EnrForkId::from_ssz)
    }

    /// Decode the attestation subnet entry, `None` when it is absent.
    pub fn attnets(&self) -> Option<Result<AttnetBits, CodecError>> {
        self.entry(ATTNETS_KEY).map(AttnetBits::from_ssz)
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_key)
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::from_public_key(&self.public_key)
    }

    /// Advertised TCP and UDP addresses, TCP first.
    pub fn addresses(&self) -> Vec<PeerAddress> {
        let Some(ip) = self.ip else {
            return Vec::new();
        };
        self.tcp
            .map(|port| PeerAddress::tcp(ip, port))
            .into_iter()
            .chain(self.udp.map(|port| PeerAddress::udp(ip, port)))
            .collect()
    }
}

impl FromStr for NodeRecord {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeRecord::parse_enr(s)
    }
}

impl fmt::Display for NodeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.peer_id())?;
        match (self.ip, self.tcp) {
            (Some(ip), Some(port)) => write!(f, " at {ip}:{port}"),
            (Some(ip), None) => write!(f, " at {ip}"),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    fn test_secret(n: u8) -> [u8; 32] {
        let mut secret = [0u8; 32];
        secret[31] = n;
        secret
    }

    /// Deterministic public key for test peer `n`, `n` must be non-zero.
    pub fn test_key(n: u8) -> PublicKey {
        let secret = SecretKey::from_slice(&test_secret(n)).expect("valid test secret");
        PublicKey::from_secret_key(&Secp256k1::new(), &secret)
    }

    /// Signed ENR of test peer `n` at `10.0.0.n`, tcp and udp on 9000.
    pub fn test_enr(n: u8, fork_id: &EnrForkId) -> Enr {
        let key = SigningKey::from_slice(&test_secret(n)).expect("valid test secret");
        Enr::builder()
            .ip4([10, 0, 0, n].into())
            .tcp4(9000)
            .udp4(9000)
            .add_value(ETH2_KEY, &alloy_rlp::Bytes::from(fork_id.to_ssz()))
            .build(&key)
            .expect("valid test record")
    }

    /// A dialable record for test peer `n` advertising `fork_id`.
    pub fn test_record(n: u8, fork_id: &EnrForkId) -> NodeRecord {
        NodeRecord::new(test_key(n))
            .with_ip(IpAddr::from([10, 0, 0, n]))
            .with_tcp(9000)
            .with_udp(9000)
            .with_eth2(fork_id)
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use beacon_peers_connection::{ForkDigest, Version};
    use bitcoin::hex::DisplayHex;

    fn fork_id() -> EnrForkId {
        EnrForkId {
            fork_digest: ForkDigest([0xbb, 0xa4, 0xda, 0x96]),
            next_fork_version: Version([4, 0, 0, 0]),
            next_fork_epoch: u64::MAX,
        }
    }

    #[test]
    fn test_entries_decode() {
        let mut bits = AttnetBits::default();
        bits.0[0] = 0b101;
        let record = test_record(1, &fork_id()).with_attnets(&bits);

        assert_eq!(record.eth2(), Some(Ok(fork_id())));
        assert_eq!(record.attnets(), Some(Ok(bits)));
    }

    #[test]
    fn test_missing_and_malformed_entries() {
        let record = NodeRecord::new(test_key(1));
        assert!(record.eth2().is_none());
        assert!(record.attnets().is_none());

        let record = record.with_entry(ETH2_KEY, vec![0xbb, 0xa4]);
        assert!(matches!(
            record.eth2(),
            Some(Err(CodecError::MalformedPayload {
                expected: 16,
                actual: 2
            }))
        ));
    }

    #[test]
    fn test_zero_port_is_absent() {
        let record = NodeRecord::new(test_key(1)).with_tcp(0).with_udp(0);
        assert_eq!(record.tcp, None);
        assert_eq!(record.udp, None);
    }

    #[test]
    fn test_addresses() {
        let record = test_record(7, &fork_id());
        let addresses: Vec<String> = record.addresses().iter().map(|a| a.to_string()).collect();
        assert_eq!(addresses, vec!["/ip4/10.0.0.7/tcp/9000", "/ip4/10.0.0.7/udp/9000"]);

        assert!(NodeRecord::new(test_key(7)).with_tcp(9000).addresses().is_empty());
    }

    #[test]
    fn test_from_enr() {
        let enr = test_enr(5, &fork_id());
        let record = NodeRecord::from_enr(&enr).unwrap();
        assert_eq!(record, test_record(5, &fork_id()));
        assert_eq!(record.attnets(), None);
    }

    #[test]
    fn test_parse_enr_text() {
        let enr = test_enr(6, &fork_id());
        let expected = test_record(6, &fork_id());

        let base64 = enr.to_base64();
        assert!(base64.starts_with("enr:"));
        assert_eq!(NodeRecord::parse_enr(&base64).unwrap(), expected);
        assert_eq!(
            NodeRecord::parse_enr(base64.trim_start_matches("enr:")).unwrap(),
            expected
        );

        let hex = alloy_rlp::encode(&enr).as_hex().to_string();
        assert_eq!(NodeRecord::parse_enr(&hex).unwrap(), expected);
        assert_eq!(
            format!("0x{hex}").parse::<NodeRecord>().unwrap(),
            expected
        );
    }

    #[test]
    fn test_parse_enr_rejects_bad_text() {
        assert!(matches!(
            NodeRecord::parse_enr("enr:not-a-record"),
            Err(RecordError::Decode(_))
        ));
        assert!(matches!(
            NodeRecord::parse_enr("0xc0"),
            Err(RecordError::Decode(_))
        ));

        // Flip a byte inside the signed content, the signature no longer holds.
        let mut bytes = alloy_rlp::encode(&test_enr(2, &fork_id()));
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            NodeRecord::parse_enr(&bytes.as_hex().to_string()),
            Err(RecordError::Decode(_))
        ));
    }

    #[test]
    fn test_identity_follows_key() {
        let a = test_record(3, &fork_id());
        let b = NodeRecord::new(test_key(3)).with_tcp(13000);
        assert_eq!(a.peer_id(), b.peer_id());
        assert_eq!(a.node_id(), b.node_id());
        assert_ne!(a.peer_id(), test_record(4, &fork_id()).peer_id());
    }
}
