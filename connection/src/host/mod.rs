//! Peer host contract.
//!
//! A [`Host`] owns connections to remote peers. The crawler needs only four
//! operations from it: establish a connection, ask the peer who it is, open a
//! stream negotiated for one protocol, and tear the connection down. Anything
//! more (encryption, multiplexing, peer scoring) belongs to the host
//! implementation.

mod error;
mod swarm;

pub use error::HostError;
pub use swarm::{SwarmHost, SwarmStream, IDENTIFY_PROTOCOL_VERSION};

use crate::peer::{PeerAddrInfo, PeerId};
use std::fmt;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncWrite};

/// Identity information a peer reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    /// Protocol family and version, e.g. `eth2/1.0.0`.
    pub protocol_version: String,
    /// Free-form client agent string.
    pub agent_version: String,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.agent_version, self.protocol_version)
    }
}

/// Connection and stream management for remote peers.
///
/// Implementations are cheap to clone and shared across probe workers.
pub trait Host: Clone + Send + Sync + 'static {
    /// Bidirectional byte stream negotiated for a single protocol.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Establish a connection to the peer.
    fn connect(&self, peer: &PeerAddrInfo) -> impl Future<Output = Result<(), HostError>> + Send;

    /// Ask a connected peer for its protocol and agent versions.
    fn identify(&self, peer_id: &PeerId)
        -> impl Future<Output = Result<Identity, HostError>> + Send;

    /// Open a new stream to a connected peer for `protocol`.
    fn open_stream(
        &self,
        peer_id: &PeerId,
        protocol: &'static str,
    ) -> impl Future<Output = Result<Self::Stream, HostError>> + Send;

    /// Drop any connection to the peer.
    fn disconnect(&self, peer_id: &PeerId) -> impl Future<Output = ()> + Send;
}
