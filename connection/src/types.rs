//! Beacon chain types exchanged with peers.

use crate::ssz::{CodecError, Ssz, SszReader};
use bitcoin::hex::{DisplayHex, FromHex};
use std::fmt;
use std::str::FromStr;

/// Error parsing a hex encoded fixed-size value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHexError {
    input: String,
}

impl fmt::Display for ParseHexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid hex value: {:?}", self.input)
    }
}

impl std::error::Error for ParseHexError {}

fn parse_hex_array<const N: usize>(s: &str) -> Result<[u8; N], ParseHexError> {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    <[u8; N]>::from_hex(digits).map_err(|_| ParseHexError {
        input: s.to_string(),
    })
}

/// Short identifier for the fork a peer is following.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ForkDigest(pub [u8; 4]);

impl fmt::Display for ForkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.0[..].as_hex())
    }
}

impl FromStr for ForkDigest {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_array(s).map(ForkDigest)
    }
}

impl Ssz for ForkDigest {
    const SSZ_LEN: usize = 4;

    fn ssz_write(&self, buf: &mut Vec<u8>) {
        self.0.ssz_write(buf);
    }

    fn ssz_read(reader: &mut SszReader<'_>) -> Result<Self, CodecError> {
        Ok(ForkDigest(reader.take()?))
    }
}

/// Fork version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Version(pub [u8; 4]);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.0[..].as_hex())
    }
}

impl FromStr for Version {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_array(s).map(Version)
    }
}

impl Ssz for Version {
    const SSZ_LEN: usize = 4;

    fn ssz_write(&self, buf: &mut Vec<u8>) {
        self.0.ssz_write(buf);
    }

    fn ssz_read(reader: &mut SszReader<'_>) -> Result<Self, CodecError> {
        Ok(Version(reader.take()?))
    }
}

/// 32 byte block or state root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Root(pub [u8; 32]);

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.0[..].as_hex())
    }
}

impl Ssz for Root {
    const SSZ_LEN: usize = 32;

    fn ssz_write(&self, buf: &mut Vec<u8>) {
        self.0.ssz_write(buf);
    }

    fn ssz_read(reader: &mut SszReader<'_>) -> Result<Self, CodecError> {
        Ok(Root(reader.take()?))
    }
}

/// Chain status record exchanged in the status handshake.
///
/// Request and response share this type, 84 bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    pub fork_digest: ForkDigest,
    pub finalized_root: Root,
    pub finalized_epoch: u64,
    pub head_root: Root,
    pub head_slot: u64,
}

impl Ssz for Status {
    const SSZ_LEN: usize = ForkDigest::SSZ_LEN + Root::SSZ_LEN + 8 + Root::SSZ_LEN + 8;

    fn ssz_write(&self, buf: &mut Vec<u8>) {
        self.fork_digest.ssz_write(buf);
        self.finalized_root.ssz_write(buf);
        self.finalized_epoch.ssz_write(buf);
        self.head_root.ssz_write(buf);
        self.head_slot.ssz_write(buf);
    }

    fn ssz_read(reader: &mut SszReader<'_>) -> Result<Self, CodecError> {
        Ok(Status {
            fork_digest: ForkDigest::ssz_read(reader)?,
            finalized_root: Root::ssz_read(reader)?,
            finalized_epoch: u64::ssz_read(reader)?,
            head_root: Root::ssz_read(reader)?,
            head_slot: u64::ssz_read(reader)?,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "digest: {}, finalized epoch: {}, head slot: {}",
            self.fork_digest, self.finalized_epoch, self.head_slot
        )
    }
}

/// Fork identification advertised in a node record's `eth2` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrForkId {
    pub fork_digest: ForkDigest,
    pub next_fork_version: Version,
    pub next_fork_epoch: u64,
}

impl Ssz for EnrForkId {
    const SSZ_LEN: usize = ForkDigest::SSZ_LEN + Version::SSZ_LEN + 8;

    fn ssz_write(&self, buf: &mut Vec<u8>) {
        self.fork_digest.ssz_write(buf);
        self.next_fork_version.ssz_write(buf);
        self.next_fork_epoch.ssz_write(buf);
    }

    fn ssz_read(reader: &mut SszReader<'_>) -> Result<Self, CodecError> {
        Ok(EnrForkId {
            fork_digest: ForkDigest::ssz_read(reader)?,
            next_fork_version: Version::ssz_read(reader)?,
            next_fork_epoch: u64::ssz_read(reader)?,
        })
    }
}

impl fmt::Display for EnrForkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "digest: {}, next fork version: {}, next fork epoch: {}",
            self.fork_digest, self.next_fork_version, self.next_fork_epoch
        )
    }
}

/// Number of attestation subnets.
pub const ATTESTATION_SUBNET_COUNT: usize = 64;

/// Bitvector of the attestation subnets a node is subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttnetBits(pub [u8; ATTESTATION_SUBNET_COUNT / 8]);

impl AttnetBits {
    /// Whether the node subscribes to `subnet`.
    pub fn is_set(&self, subnet: usize) -> bool {
        subnet < ATTESTATION_SUBNET_COUNT && self.0[subnet / 8] & (1 << (subnet % 8)) != 0
    }

    /// Number of subscribed subnets.
    pub fn count(&self) -> u32 {
        self.0.iter().map(|b| b.count_ones()).sum()
    }
}

impl fmt::Display for AttnetBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0[..].as_hex())
    }
}

impl Ssz for AttnetBits {
    const SSZ_LEN: usize = ATTESTATION_SUBNET_COUNT / 8;

    fn ssz_write(&self, buf: &mut Vec<u8>) {
        self.0.ssz_write(buf);
    }

    fn ssz_read(reader: &mut SszReader<'_>) -> Result<Self, CodecError> {
        Ok(AttnetBits(reader.take()?))
    }
}
