//! Error types for host operations.

use crate::peer::PeerId;
use std::error::Error;
use std::fmt;
use std::io;

/// Errors that can occur while connecting to, identifying or opening streams to a peer.
#[derive(Debug)]
pub enum HostError {
    /// An I/O error occurred during network operations.
    Io(io::Error),
    /// The operation did not complete within its deadline.
    Timeout,
    /// No connection is established with the peer.
    NotConnected(PeerId),
    /// The peer id is not a valid libp2p peer id.
    InvalidPeerId(PeerId),
    /// The peer has no address the host can dial.
    NoDialableAddress,
    /// Every dial attempt failed, including a handshake with the wrong key.
    Dial(String),
    /// The transport stack could not be set up.
    Transport(String),
    /// The host task is no longer running.
    Stopped,
    /// The remote declined the requested protocol.
    ProtocolNotSupported(String),
    /// Protocol negotiation broke down.
    Negotiation(String),
    /// The identify exchange failed.
    Identify(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Io(err) => write!(f, "Host error: {err}"),
            HostError::Timeout => write!(f, "Host operation timed out"),
            HostError::NotConnected(peer_id) => write!(f, "Not connected to {peer_id}"),
            HostError::InvalidPeerId(peer_id) => write!(f, "Invalid peer id {peer_id}"),
            HostError::NoDialableAddress => write!(f, "Peer has no dialable address"),
            HostError::Dial(reason) => write!(f, "Dial failed: {reason}"),
            HostError::Transport(reason) => write!(f, "Transport setup failed: {reason}"),
            HostError::Stopped => write!(f, "Host stopped"),
            HostError::ProtocolNotSupported(protocol) => {
                write!(f, "Protocol {protocol} not supported by peer")
            }
            HostError::Negotiation(reason) => write!(f, "Protocol negotiation failed: {reason}"),
            HostError::Identify(reason) => write!(f, "Identify failed: {reason}"),
        }
    }
}

impl Error for HostError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            HostError::Io(err) => Some(err),
            HostError::Timeout => None,
            HostError::NotConnected(_) => None,
            HostError::InvalidPeerId(_) => None,
            HostError::NoDialableAddress => None,
            HostError::Dial(_) => None,
            HostError::Transport(_) => None,
            HostError::Stopped => None,
            HostError::ProtocolNotSupported(_) => None,
            HostError::Negotiation(_) => None,
            HostError::Identify(_) => None,
        }
    }
}

impl From<io::Error> for HostError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => HostError::Timeout,
            _ => HostError::Io(err),
        }
    }
}
