//! Single probe attempt against a peer.

use crate::peer::PeerRecord;
use beacon_peers_connection::{fetch_status, Host, HostError, Identity, RpcError, Status, STATUS_V1};
use log::debug;
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;

/// What one successful attempt learned about a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: Status,
    /// `None` when identify failed, which does not fail the attempt.
    pub identity: Option<Identity>,
}

/// Errors that end a probe attempt.
#[derive(Debug)]
pub enum ProbeError {
    /// The peer could not be connected.
    Connect(HostError),
    /// A status stream could not be opened.
    Stream(HostError),
    /// The status exchange failed.
    Status(RpcError),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Connect(e) => write!(f, "connect failed: {e}"),
            ProbeError::Stream(e) => write!(f, "status stream failed: {e}"),
            ProbeError::Status(e) => write!(f, "status exchange failed: {e}"),
        }
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ProbeError::Connect(e) | ProbeError::Stream(e) => Some(e),
            ProbeError::Status(e) => Some(e),
        }
    }
}

/// Runs probe attempts through a [`Host`].
#[derive(Debug, Clone)]
pub struct Prober<H: Host> {
    host: H,
    /// Bound on each host call and on the status exchange.
    request_timeout: Duration,
}

impl<H: Host> Prober<H> {
    pub fn new(host: H, request_timeout: Duration) -> Self {
        Prober {
            host,
            request_timeout,
        }
    }

    /// Connect, exchange status and identify.
    ///
    /// The connection is always dropped before returning, whatever the
    /// outcome past a successful connect.
    pub async fn attempt(&self, peer: &PeerRecord) -> Result<ProbeOutcome, ProbeError> {
        match timeout(self.request_timeout, self.host.connect(&peer.addr_info())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ProbeError::Connect(e)),
            Err(_) => return Err(ProbeError::Connect(HostError::Timeout)),
        }

        let result = self.exchange(peer).await;
        self.host.disconnect(&peer.id).await;
        result
    }

    async fn exchange(&self, peer: &PeerRecord) -> Result<ProbeOutcome, ProbeError> {
        let mut stream = match timeout(
            self.request_timeout,
            self.host.open_stream(&peer.id, STATUS_V1.protocol),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ProbeError::Stream(e)),
            Err(_) => return Err(ProbeError::Stream(HostError::Timeout)),
        };

        let status = fetch_status(&mut stream, peer.fork_digest, self.request_timeout)
            .await
            .map_err(ProbeError::Status)?;
        drop(stream);
        debug!("Status from {}: {status}", peer.id);

        let identity = match timeout(self.request_timeout, self.host.identify(&peer.id)).await {
            Ok(Ok(identity)) => Some(identity),
            Ok(Err(e)) => {
                debug!("Identify of {} failed: {e}", peer.id);
                None
            }
            Err(_) => {
                debug!("Identify of {} timed out", peer.id);
                None
            }
        };

        Ok(ProbeOutcome { status, identity })
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use beacon_peers_connection::rpc::{read_request, write_response_chunk, ERROR_MESSAGE_BOUNDS};
    use beacon_peers_connection::{PeerAddrInfo, PeerId, ResultCode, Snappy, Ssz};
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::sync::Semaphore;

    /// How the mock answers a status request.
    #[derive(Debug, Clone, Copy)]
    pub enum StatusReply {
        Respond(Status),
        ServerError,
        /// Close the stream without a response.
        HangUp,
    }

    #[derive(Debug)]
    struct MockState {
        unreachable: Mutex<HashSet<PeerId>>,
        replies: Mutex<HashMap<PeerId, StatusReply>>,
        default_reply: Mutex<StatusReply>,
        identity: Mutex<Option<Identity>>,
        requests: Mutex<Vec<Status>>,
        gate: Option<Arc<Semaphore>>,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
    }

    /// Host answering every peer from in-memory rules.
    #[derive(Debug, Clone)]
    pub struct MockHost {
        state: Arc<MockState>,
    }

    impl MockHost {
        /// Host where every peer answers `status` and identifies as `agent`.
        pub fn new(status: Status, agent: &str) -> Self {
            Self::build(status, agent, None)
        }

        /// Like [`MockHost::new`] but every connect first takes a permit from
        /// `gate`, permits are never returned.
        pub fn gated(status: Status, agent: &str, gate: Arc<Semaphore>) -> Self {
            Self::build(status, agent, Some(gate))
        }

        fn build(status: Status, agent: &str, gate: Option<Arc<Semaphore>>) -> Self {
            MockHost {
                state: Arc::new(MockState {
                    unreachable: Mutex::new(HashSet::new()),
                    replies: Mutex::new(HashMap::new()),
                    default_reply: Mutex::new(StatusReply::Respond(status)),
                    identity: Mutex::new(Some(Identity {
                        protocol_version: "eth2/1.0.0".to_string(),
                        agent_version: agent.to_string(),
                    })),
                    requests: Mutex::new(Vec::new()),
                    gate,
                    connects: AtomicUsize::new(0),
                    disconnects: AtomicUsize::new(0),
                }),
            }
        }

        pub fn set_unreachable(&self, peer_id: &PeerId, unreachable: bool) {
            let mut set = self.state.unreachable.lock().unwrap();
            if unreachable {
                set.insert(peer_id.clone());
            } else {
                set.remove(peer_id);
            }
        }

        pub fn set_reply(&self, peer_id: &PeerId, reply: StatusReply) {
            self.state
                .replies
                .lock()
                .unwrap()
                .insert(peer_id.clone(), reply);
        }

        pub fn set_default_reply(&self, reply: StatusReply) {
            *self.state.default_reply.lock().unwrap() = reply;
        }

        /// Make identify fail for every peer.
        pub fn fail_identify(&self) {
            *self.state.identity.lock().unwrap() = None;
        }

        /// Status requests received so far.
        pub fn requests(&self) -> Vec<Status> {
            self.state.requests.lock().unwrap().clone()
        }

        /// Connect calls started so far, including ones still waiting on the gate.
        pub fn connects(&self) -> usize {
            self.state.connects.load(Ordering::SeqCst)
        }

        pub fn disconnects(&self) -> usize {
            self.state.disconnects.load(Ordering::SeqCst)
        }

        fn reply_for(&self, peer_id: &PeerId) -> StatusReply {
            let replies = self.state.replies.lock().unwrap();
            match replies.get(peer_id) {
                Some(reply) => *reply,
                None => *self.state.default_reply.lock().unwrap(),
            }
        }
    }

    async fn respond(mut server: DuplexStream, reply: StatusReply, state: Arc<MockState>) {
        let Ok(raw) = read_request(&mut server, STATUS_V1.request_bounds, Some(&Snappy)).await
        else {
            return;
        };
        if let Ok(request) = Status::from_ssz(&raw) {
            state.requests.lock().unwrap().push(request);
        }

        let _ = match reply {
            StatusReply::Respond(status) => {
                write_response_chunk(
                    &mut server,
                    ResultCode::Success,
                    STATUS_V1.response_bounds,
                    &status.to_ssz(),
                    Some(&Snappy),
                )
                .await
            }
            StatusReply::ServerError => {
                write_response_chunk(
                    &mut server,
                    ResultCode::ServerError,
                    ERROR_MESSAGE_BOUNDS,
                    b"node is syncing",
                    Some(&Snappy),
                )
                .await
            }
            StatusReply::HangUp => Ok(()),
        };
        let _ = server.shutdown().await;
    }

    impl Host for MockHost {
        type Stream = DuplexStream;

        async fn connect(&self, peer: &PeerAddrInfo) -> Result<(), HostError> {
            self.state.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.state.gate {
                gate.acquire()
                    .await
                    .map_err(|_| HostError::Timeout)?
                    .forget();
            }
            if self.state.unreachable.lock().unwrap().contains(&peer.peer_id) {
                return Err(HostError::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
            Ok(())
        }

        async fn identify(&self, _peer_id: &PeerId) -> Result<Identity, HostError> {
            self.state
                .identity
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| HostError::Identify("unsupported".to_string()))
        }

        async fn open_stream(
            &self,
            peer_id: &PeerId,
            _protocol: &'static str,
        ) -> Result<DuplexStream, HostError> {
            let (client, server) = duplex(4096);
            tokio::spawn(respond(server, self.reply_for(peer_id), self.state.clone()));
            Ok(client)
        }

        async fn disconnect(&self, _peer_id: &PeerId) {
            self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use crate::peer::test_utils::{test_peer, TEST_DIGEST};
    use beacon_peers_connection::{ResultCode, Root};

    fn remote_status() -> Status {
        Status {
            fork_digest: TEST_DIGEST,
            finalized_root: Root([1; 32]),
            finalized_epoch: 290_000,
            head_root: Root([2; 32]),
            head_slot: 9_280_000,
        }
    }

    fn prober(host: &MockHost) -> Prober<MockHost> {
        Prober::new(host.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_attempt_success() {
        let host = MockHost::new(remote_status(), "Lighthouse/v4.5.0/x86_64-linux");
        let peer = test_peer(1);

        let outcome = prober(&host).attempt(&peer).await.unwrap();
        assert_eq!(outcome.status, remote_status());
        assert_eq!(
            outcome.identity.map(|i| i.agent_version),
            Some("Lighthouse/v4.5.0/x86_64-linux".to_string())
        );
        assert_eq!(host.disconnects(), 1);

        let requests = host.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].fork_digest, peer.fork_digest);
        assert_eq!(requests[0].head_slot, 0);
    }

    #[tokio::test]
    async fn test_identify_failure_is_tolerated() {
        let host = MockHost::new(remote_status(), "unused");
        host.fail_identify();

        let outcome = prober(&host).attempt(&test_peer(1)).await.unwrap();
        assert_eq!(outcome.status.head_slot, 9_280_000);
        assert_eq!(outcome.identity, None);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let host = MockHost::new(remote_status(), "unused");
        let peer = test_peer(1);
        host.set_unreachable(&peer.id, true);

        let result = prober(&host).attempt(&peer).await;
        assert!(matches!(result, Err(ProbeError::Connect(HostError::Io(_)))));
        assert!(host.requests().is_empty());
        assert_eq!(host.disconnects(), 0);
    }

    #[tokio::test]
    async fn test_server_error_fails_attempt() {
        let host = MockHost::new(remote_status(), "unused");
        let peer = test_peer(1);
        host.set_reply(&peer.id, StatusReply::ServerError);

        match prober(&host).attempt(&peer).await {
            Err(ProbeError::Status(RpcError::ErrorResponse { code, message })) => {
                assert_eq!(code, ResultCode::ServerError);
                assert_eq!(message, "node is syncing");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(host.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_hang_up_fails_attempt() {
        let host = MockHost::new(remote_status(), "unused");
        host.set_default_reply(StatusReply::HangUp);

        let result = prober(&host).attempt(&test_peer(1)).await;
        assert!(matches!(
            result,
            Err(ProbeError::Status(RpcError::TransportClosed))
        ));
    }
}
