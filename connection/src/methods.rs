//! Request/response methods spoken by the crawler.

use crate::compression::Snappy;
use crate::rpc::{RpcError, RpcMethod};
use crate::types::{ForkDigest, Status};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Protocol identifier of the status handshake.
pub const STATUS_PROTOCOL: &str = "/eth2/beacon_chain/req/status/1/ssz_snappy";

/// Status handshake: one snappy framed status record each way, a single
/// response chunk.
pub const STATUS_V1: RpcMethod<Status, Status> =
    RpcMethod::fixed(STATUS_PROTOCOL, 1).with_compression(&Snappy);

/// Build the status request sent to a peer.
///
/// Only the fork digest is known to the crawler; the chain head fields are
/// left zeroed since the crawler follows no chain of its own.
pub fn status_request(fork_digest: ForkDigest) -> Status {
    Status {
        fork_digest,
        ..Status::default()
    }
}

/// Exchange status with a peer over a stream negotiated for [`STATUS_PROTOCOL`].
///
/// # Arguments
///
/// * `stream` - Stream opened for the status protocol.
/// * `fork_digest` - Fork digest previously observed for the peer.
/// * `deadline` - Upper bound on the whole exchange.
///
/// # Returns
///
/// * `Ok(Status)` - The peer's status record.
/// * `Err(RpcError)` - If the exchange failed.
pub async fn fetch_status<S>(
    stream: &mut S,
    fork_digest: ForkDigest,
    deadline: Duration,
) -> Result<Status, RpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = status_request(fork_digest);
    let mut responses = STATUS_V1
        .request_with_timeout(stream, &request, deadline)
        .await?;
    // A one chunk method either errors or yields exactly one response.
    responses.pop().ok_or(RpcError::TransportClosed)
}
