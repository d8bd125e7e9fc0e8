//! Beacon peer identity and address structures.

use bitcoin::hex::DisplayHex;
use bitcoin::secp256k1::PublicKey;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Protobuf encoded key header for a secp256k1 key wrapped in an identity multihash.
///
/// * `0x00 0x25` - identity multihash of 37 bytes.
/// * `0x08 0x02` - key type field, secp256k1.
/// * `0x12 0x21` - key data field, 33 bytes.
const SECP256K1_IDENTITY_PREFIX: [u8; 6] = [0x00, 0x25, 0x08, 0x02, 0x12, 0x21];

/// Stable peer identifier derived from the peer's public key.
///
/// Rendered as base58btc, secp256k1 identities start with `16Uiu2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    /// Derive the peer id of `key`.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let mut bytes = Vec::with_capacity(SECP256K1_IDENTITY_PREFIX.len() + 33);
        bytes.extend_from_slice(&SECP256K1_IDENTITY_PREFIX);
        bytes.extend_from_slice(&key.serialize());
        PeerId(bitcoin::base58::encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

/// Discovery node id, the keccak-256 hash of the uncompressed public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub fn from_public_key(key: &PublicKey) -> Self {
        let uncompressed = key.serialize_uncompressed();
        // Skip the 0x04 tag byte.
        NodeId(Keccak256::digest(&uncompressed[1..]).into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0[..].as_hex())
    }
}

/// Transport protocol of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProtocol::Tcp => write!(f, "tcp"),
            TransportProtocol::Udp => write!(f, "udp"),
        }
    }
}

/// Error parsing a multiaddr string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError {
    input: String,
}

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported address: {:?}", self.input)
    }
}

impl std::error::Error for ParseAddressError {}

/// A dialable peer address, rendered as a multiaddr such as `/ip4/1.2.3.4/tcp/9000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerAddress {
    pub ip: IpAddr,
    pub port: u16,
    pub protocol: TransportProtocol,
}

impl PeerAddress {
    pub fn tcp(ip: IpAddr, port: u16) -> Self {
        PeerAddress {
            ip,
            port,
            protocol: TransportProtocol::Tcp,
        }
    }

    pub fn udp(ip: IpAddr, port: u16) -> Self {
        PeerAddress {
            ip,
            port,
            protocol: TransportProtocol::Udp,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let family = match self.ip {
            IpAddr::V4(_) => "ip4",
            IpAddr::V6(_) => "ip6",
        };
        write!(f, "/{family}/{}/{}/{}", self.ip, self.protocol, self.port)
    }
}

impl FromStr for PeerAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAddressError {
            input: s.to_string(),
        };
        let parts: Vec<&str> = s.split('/').collect();
        // Leading slash yields an empty first component.
        let ["", family, ip, protocol, port] = parts.as_slice() else {
            return Err(err());
        };
        let ip: IpAddr = ip.parse().map_err(|_| err())?;
        match (*family, ip) {
            ("ip4", IpAddr::V4(_)) | ("ip6", IpAddr::V6(_)) => {}
            _ => return Err(err()),
        }
        let protocol = match *protocol {
            "tcp" => TransportProtocol::Tcp,
            "udp" => TransportProtocol::Udp,
            _ => return Err(err()),
        };
        let port = port.parse().map_err(|_| err())?;
        Ok(PeerAddress { ip, port, protocol })
    }
}

/// Everything needed to dial a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddrInfo {
    pub peer_id: PeerId,
    pub addresses: Vec<PeerAddress>,
}

impl PeerAddrInfo {
    pub fn new(peer_id: PeerId, addresses: Vec<PeerAddress>) -> Self {
        PeerAddrInfo { peer_id, addresses }
    }

    /// First TCP address, the only kind a stream connection can use.
    pub fn tcp_address(&self) -> Option<&PeerAddress> {
        self.addresses
            .iter()
            .find(|a| a.protocol == TransportProtocol::Tcp)
    }
}

impl fmt::Display for PeerAddrInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tcp_address() {
            Some(addr) => write!(f, "{} ({addr})", self.peer_id),
            None => write!(f, "{} (no tcp address)", self.peer_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    /// Public key of the secret key `1`, the curve generator.
    fn generator_key() -> PublicKey {
        let bytes = [
            0x02, 0x79, 0xbe, 0x66, 0x7e, 0xf9, 0xdc, 0xbb, 0xac, 0x55, 0xa0, 0x62, 0x95, 0xce,
            0x87, 0x0b, 0x07, 0x02, 0x9b, 0xfc, 0xdb, 0x2d, 0xce, 0x28, 0xd9, 0x59, 0xf2, 0x81,
            0x5b, 0x16, 0xf8, 0x17, 0x98,
        ];
        PublicKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_peer_id_from_public_key() {
        let peer_id = PeerId::from_public_key(&generator_key());
        assert_eq!(
            peer_id.as_str(),
            "16Uiu2HAm3cuhhRL2msUuLF62KRSfneFDx94RsuouyW25Ho42cFMq"
        );
        // Pure function of the key.
        assert_eq!(peer_id, PeerId::from_public_key(&generator_key()));
    }

    #[test]
    fn test_node_id_from_public_key() {
        let node_id = NodeId::from_public_key(&generator_key());
        // The trailing 20 bytes are the well known address of secret key 1.
        assert!(node_id
            .to_string()
            .ends_with("7e5f4552091a69125d5dfcb7b8c2659029395bdf"));
    }

    #[test]
    fn test_address_display() {
        let v4 = PeerAddress::tcp(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 9000);
        assert_eq!(v4.to_string(), "/ip4/10.0.0.1/tcp/9000");
        let v6 = PeerAddress::udp(IpAddr::V6(Ipv6Addr::LOCALHOST), 9000);
        assert_eq!(v6.to_string(), "/ip6/::1/udp/9000");
    }

    #[test]
    fn test_address_parse() {
        let addr: PeerAddress = "/ip4/192.168.1.7/tcp/13000".parse().unwrap();
        assert_eq!(
            addr,
            PeerAddress::tcp(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)), 13000)
        );
        assert!("/ip6/192.168.1.7/tcp/13000".parse::<PeerAddress>().is_err());
        assert!("/ip4/192.168.1.7/quic/13000".parse::<PeerAddress>().is_err());
        assert!("ip4/192.168.1.7/tcp/13000".parse::<PeerAddress>().is_err());
    }

    #[test]
    fn test_tcp_address_selection() {
        let ip = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        let info = PeerAddrInfo::new(
            PeerId::from("16Uiu2test"),
            vec![PeerAddress::udp(ip, 9000), PeerAddress::tcp(ip, 9001)],
        );
        assert_eq!(info.tcp_address(), Some(&PeerAddress::tcp(ip, 9001)));
    }
}
