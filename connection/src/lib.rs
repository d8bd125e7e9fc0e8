mod compression;
mod host;
mod methods;
mod peer;
pub mod rpc;
mod ssz;
mod types;
pub mod varint;

pub use compression::{Compression, CompressionError, Decompressor, Snappy};
pub use host::{Host, HostError, Identity, SwarmHost, SwarmStream, IDENTIFY_PROTOCOL_VERSION};
pub use methods::{fetch_status, status_request, STATUS_PROTOCOL, STATUS_V1};
pub use peer::{NodeId, ParseAddressError, PeerAddrInfo, PeerAddress, PeerId, TransportProtocol};
pub use rpc::{ResultCode, RpcError, RpcMethod, SizeBounds, Violation};
pub use ssz::{CodecError, Ssz, SszReader};
pub use types::{
    AttnetBits, EnrForkId, ForkDigest, ParseHexError, Root, Status, Version,
    ATTESTATION_SUBNET_COUNT,
};

// Re-exports.
pub use bitcoin::secp256k1::PublicKey;
pub use libp2p::identity::Keypair;
