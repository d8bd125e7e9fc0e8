//! libp2p host.
//!
//! Connections are TCP secured with noise and multiplexed with yamux, the
//! transport stack beacon nodes accept. A single task owns the swarm; the
//! [`SwarmHost`] handle talks to it over a command channel.
//!
//! Identify runs automatically once a connection is up, the task caches the
//! answer until the connection closes. Protocol streams come from
//! `libp2p-stream` and are adapted to tokio I/O.

use super::{Host, HostError, Identity};
use crate::peer::{PeerAddrInfo, PeerAddress, PeerId};
use libp2p::futures::StreamExt;
use libp2p::identity::Keypair;
use libp2p::multiaddr::Protocol;
use libp2p::swarm::dial_opts::{DialOpts, PeerCondition};
use libp2p::swarm::{DialError, NetworkBehaviour, SwarmEvent};
use libp2p::{identify, noise, tcp, yamux, Multiaddr, StreamProtocol, Swarm, SwarmBuilder};
use log::{debug, trace};
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt};

/// Identify protocol family advertised by beacon nodes.
pub const IDENTIFY_PROTOCOL_VERSION: &str = "eth2/1.0.0";

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const COMMAND_BUFFER: usize = 256;

/// A protocol stream opened through the swarm.
pub type SwarmStream = Compat<libp2p::Stream>;

#[derive(NetworkBehaviour)]
struct Behaviour {
    identify: identify::Behaviour,
    stream: libp2p_stream::Behaviour,
}

type Reply<T> = oneshot::Sender<Result<T, HostError>>;

enum Command {
    Dial {
        peer: libp2p::PeerId,
        addresses: Vec<Multiaddr>,
        reply: Reply<()>,
    },
    Identify {
        peer: libp2p::PeerId,
        reply: Reply<Identity>,
    },
    OpenStream {
        peer: libp2p::PeerId,
        protocol: StreamProtocol,
        reply: Reply<SwarmStream>,
    },
    Disconnect {
        peer: libp2p::PeerId,
    },
}

/// A [`Host`] backed by a libp2p swarm.
///
/// Cloning is cheap, all clones drive the same swarm. The swarm task stops
/// once the last clone is dropped.
#[derive(Debug, Clone)]
pub struct SwarmHost {
    local_peer_id: PeerId,
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Dial { peer, .. } => write!(f, "Dial({peer})"),
            Command::Identify { peer, .. } => write!(f, "Identify({peer})"),
            Command::OpenStream { peer, protocol, .. } => write!(f, "OpenStream({peer}, {protocol})"),
            Command::Disconnect { peer } => write!(f, "Disconnect({peer})"),
        }
    }
}

impl SwarmHost {
    /// Start a host with a fresh secp256k1 identity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_random_identity() -> Result<Self, HostError> {
        Self::new(Keypair::generate_secp256k1(), DEFAULT_IDLE_TIMEOUT)
    }

    /// Start a host.
    ///
    /// # Arguments
    ///
    /// * `keypair` - Local identity, beacon nodes expect secp256k1.
    /// * `idle_timeout` - How long a connection without open streams is kept.
    pub fn new(keypair: Keypair, idle_timeout: Duration) -> Result<Self, HostError> {
        let swarm = build_swarm(keypair, idle_timeout)?;
        let local_peer_id = PeerId::from(swarm.local_peer_id().to_string().as_str());
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(SwarmTask::new(swarm).run(receiver));
        debug!("Started host {local_peer_id}");
        Ok(SwarmHost {
            local_peer_id,
            commands,
        })
    }

    pub fn local_peer_id(&self) -> &PeerId {
        &self.local_peer_id
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, HostError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| HostError::Stopped)?;
        response.await.map_err(|_| HostError::Stopped)?
    }
}

/// Build a swarm speaking the beacon transport stack.
fn build_swarm(
    keypair: Keypair,
    idle_timeout: Duration,
) -> Result<Swarm<Behaviour>, HostError> {
    let identify = identify::Behaviour::new(
        identify::Config::new(IDENTIFY_PROTOCOL_VERSION.to_string(), keypair.public())
            .with_agent_version(format!("beacon-peers/{}", env!("CARGO_PKG_VERSION"))),
    );
    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| HostError::Transport(e.to_string()))?
        .with_behaviour(|_| Behaviour {
            identify,
            stream: libp2p_stream::Behaviour::new(),
        })
        .map_err(|e| HostError::Transport(e.to_string()))?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_timeout))
        .build();
    Ok(swarm)
}

/// Owns the swarm and the replies waiting on swarm events.
struct SwarmTask {
    swarm: Swarm<Behaviour>,
    control: libp2p_stream::Control,
    dials: HashMap<libp2p::PeerId, Vec<Reply<()>>>,
    identities: HashMap<libp2p::PeerId, Identity>,
    identify_waiters: HashMap<libp2p::PeerId, Vec<Reply<Identity>>>,
}

impl SwarmTask {
    fn new(swarm: Swarm<Behaviour>) -> Self {
        let control = swarm.behaviour().stream.new_control();
        SwarmTask {
            swarm,
            control,
            dials: HashMap::new(),
            identities: HashMap::new(),
            identify_waiters: HashMap::new(),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    trace!("Host command {command:?}");
                    self.handle_command(command);
                }
                event = self.swarm.select_next_some() => self.handle_event(event),
            }
        }
        debug!("Host stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Dial {
                peer,
                addresses,
                reply,
            } => {
                if self.swarm.is_connected(&peer) {
                    let _ = reply.send(Ok(()));
                    return;
                }
                let opts = DialOpts::peer_id(peer)
                    .addresses(addresses)
                    .condition(PeerCondition::DisconnectedAndNotDialing)
                    .build();
                match self.swarm.dial(opts) {
                    // A dial already in flight answers this reply as well.
                    Ok(()) | Err(DialError::DialPeerConditionFalse(_)) => {
                        self.dials.entry(peer).or_default().push(reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(HostError::Dial(e.to_string())));
                    }
                }
            }
            Command::Identify { peer, reply } => {
                if let Some(identity) = self.identities.get(&peer) {
                    let _ = reply.send(Ok(identity.clone()));
                } else if !self.swarm.is_connected(&peer) {
                    let _ = reply.send(Err(not_connected(&peer)));
                } else {
                    self.identify_waiters.entry(peer).or_default().push(reply);
                }
            }
            Command::OpenStream {
                peer,
                protocol,
                reply,
            } => {
                if !self.swarm.is_connected(&peer) {
                    let _ = reply.send(Err(not_connected(&peer)));
                    return;
                }
                // Negotiation needs the swarm polled, so it runs beside this loop.
                let mut control = self.control.clone();
                tokio::spawn(async move {
                    let result = control
                        .open_stream(peer, protocol.clone())
                        .await
                        .map(FuturesAsyncReadCompatExt::compat)
                        .map_err(|e| match e {
                            libp2p_stream::OpenStreamError::UnsupportedProtocol(_) => {
                                HostError::ProtocolNotSupported(protocol.to_string())
                            }
                            libp2p_stream::OpenStreamError::Io(e) => HostError::from(e),
                            e => HostError::Negotiation(e.to_string()),
                        });
                    let _ = reply.send(result);
                });
            }
            Command::Disconnect { peer } => {
                let _ = self.swarm.disconnect_peer_id(peer);
                self.forget(&peer);
            }
        }
    }

    fn handle_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!("Connected to {peer_id}");
                for reply in self.dials.remove(&peer_id).unwrap_or_default() {
                    let _ = reply.send(Ok(()));
                }
            }
            SwarmEvent::OutgoingConnectionError {
                peer_id: Some(peer_id),
                error,
                ..
            } => {
                debug!("Dial to {peer_id} failed: {error}");
                let reason = error.to_string();
                for reply in self.dials.remove(&peer_id).unwrap_or_default() {
                    let _ = reply.send(Err(HostError::Dial(reason.clone())));
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established: 0,
                ..
            } => {
                trace!("Connection to {peer_id} closed");
                self.forget(&peer_id);
            }
            SwarmEvent::Behaviour(BehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                let identity = Identity {
                    protocol_version: info.protocol_version,
                    agent_version: info.agent_version,
                };
                trace!("Identified {peer_id} as {identity}");
                for reply in self.identify_waiters.remove(&peer_id).unwrap_or_default() {
                    let _ = reply.send(Ok(identity.clone()));
                }
                self.identities.insert(peer_id, identity);
            }
            SwarmEvent::Behaviour(BehaviourEvent::Identify(identify::Event::Error {
                peer_id,
                error,
                ..
            })) => {
                let reason = error.to_string();
                for reply in self.identify_waiters.remove(&peer_id).unwrap_or_default() {
                    let _ = reply.send(Err(HostError::Identify(reason.clone())));
                }
            }
            _ => {}
        }
    }

    /// Drop cached state for a peer whose connection is gone.
    fn forget(&mut self, peer: &libp2p::PeerId) {
        self.identities.remove(peer);
        for reply in self.identify_waiters.remove(peer).unwrap_or_default() {
            let _ = reply.send(Err(not_connected(peer)));
        }
    }
}

fn not_connected(peer: &libp2p::PeerId) -> HostError {
    HostError::NotConnected(PeerId::from(peer.to_string().as_str()))
}

fn to_libp2p(peer_id: &PeerId) -> Result<libp2p::PeerId, HostError> {
    peer_id
        .as_str()
        .parse()
        .map_err(|_| HostError::InvalidPeerId(peer_id.clone()))
}

fn to_multiaddr(address: &PeerAddress) -> Multiaddr {
    let ip = match address.ip {
        IpAddr::V4(ip) => Protocol::Ip4(ip),
        IpAddr::V6(ip) => Protocol::Ip6(ip),
    };
    Multiaddr::empty().with(ip).with(Protocol::Tcp(address.port))
}

impl Host for SwarmHost {
    type Stream = SwarmStream;

    fn connect(&self, peer: &PeerAddrInfo) -> impl Future<Output = Result<(), HostError>> + Send {
        let target = to_libp2p(&peer.peer_id);
        let addresses: Vec<Multiaddr> = peer.tcp_address().into_iter().map(to_multiaddr).collect();
        async move {
            let peer = target?;
            if addresses.is_empty() {
                return Err(HostError::NoDialableAddress);
            }
            self.call(|reply| Command::Dial {
                peer,
                addresses,
                reply,
            })
            .await
        }
    }

    fn identify(
        &self,
        peer_id: &PeerId,
    ) -> impl Future<Output = Result<Identity, HostError>> + Send {
        let target = to_libp2p(peer_id);
        async move {
            let peer = target?;
            self.call(|reply| Command::Identify { peer, reply }).await
        }
    }

    fn open_stream(
        &self,
        peer_id: &PeerId,
        protocol: &'static str,
    ) -> impl Future<Output = Result<Self::Stream, HostError>> + Send {
        let target = to_libp2p(peer_id);
        async move {
            let peer = target?;
            let protocol = StreamProtocol::try_from_owned(protocol.to_string())
                .map_err(|e| HostError::Negotiation(e.to_string()))?;
            self.call(|reply| Command::OpenStream {
                peer,
                protocol,
                reply,
            })
            .await
        }
    }

    fn disconnect(&self, peer_id: &PeerId) -> impl Future<Output = ()> + Send {
        let target = to_libp2p(peer_id);
        async move {
            if let Ok(peer) = target {
                let _ = self.commands.send(Command::Disconnect { peer }).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_multiaddr_conversion() {
        let v4 = PeerAddress::tcp("10.1.2.3".parse().unwrap(), 9000);
        assert_eq!(to_multiaddr(&v4).to_string(), "/ip4/10.1.2.3/tcp/9000");

        let v6 = PeerAddress::tcp(IpAddr::V6(Ipv6Addr::LOCALHOST), 13000);
        assert_eq!(to_multiaddr(&v6).to_string(), v6.to_string());
    }

    #[test]
    fn test_rejects_malformed_peer_id() {
        let peer_id = PeerId::from("not-a-peer-id");
        assert!(matches!(
            to_libp2p(&peer_id),
            Err(HostError::InvalidPeerId(id)) if id == peer_id
        ));
    }

    #[tokio::test]
    async fn test_connect_without_tcp_address() {
        let host = SwarmHost::with_random_identity().unwrap();
        let other = SwarmHost::with_random_identity().unwrap();
        let peer = PeerAddrInfo::new(
            other.local_peer_id().clone(),
            vec![PeerAddress::udp("10.0.0.1".parse().unwrap(), 9000)],
        );
        assert!(matches!(
            host.connect(&peer).await,
            Err(HostError::NoDialableAddress)
        ));
    }

    #[tokio::test]
    async fn test_identify_requires_connection() {
        let host = SwarmHost::with_random_identity().unwrap();
        let other = SwarmHost::with_random_identity().unwrap();
        assert!(matches!(
            host.identify(other.local_peer_id()).await,
            Err(HostError::NotConnected(id)) if &id == other.local_peer_id()
        ));
    }
}
