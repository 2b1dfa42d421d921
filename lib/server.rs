// Server: accept thread plus the set of live peers
use crate::config::NetConfig;
use crate::gate::NotifyGate;
use crate::listener::ServerConnectionListener;
use crate::registry::ListenerSet;
use crate::remote_client::RemoteClient;
use crate::worker::{ShutdownSignal, Worker};
use parking_lot::Mutex;
use pkt_core::{Codec, DisconnectReason, Error, Result};
use pkt_transport::{is_permission_denied, TcpAcceptor};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;

/// State shared between the server, its accept thread and its peers.
///
/// Peers reach it through a weak reference, only to report their disconnection.
pub(crate) struct ServerHub<P> {
    gate: NotifyGate,
    peers: Mutex<Vec<RemoteClient<P>>>,
    listeners: ListenerSet<dyn ServerConnectionListener<P>>,
}

impl<P> ServerHub<P> {
    pub(crate) fn peer_disconnected(&self, peer: &RemoteClient<P>, reason: DisconnectReason, detail: &str) {
        self.gate.run(|| {
            self.peers.lock().retain(|p| p != peer);
            tracing::info!("{} disconnected ({}): {}", peer.id(), reason, detail);
            self.listeners
                .for_each(|l| l.on_disconnected(peer, reason, detail));
        });
    }
}

impl<P: Send + 'static> ServerHub<P> {
    fn admit(
        self: &Arc<Self>,
        stream: TcpStream,
        addr: SocketAddr,
        codec: &Arc<dyn Codec<Packet = P>>,
        config: &NetConfig,
        shutdown: &ShutdownSignal,
    ) {
        // registration and announcement happen under the gate the peer's own
        // disconnect report needs, so "connected" is always seen first
        self.gate.run(|| {
            if shutdown.is_requested() {
                tracing::debug!("dropping connection from {} accepted during close", addr);
                return;
            }

            let peer = match RemoteClient::accept(stream, Arc::downgrade(self), codec.clone(), config) {
                Ok(peer) => peer,
                Err(e) => {
                    tracing::warn!("failed to set up connection from {}: {}", addr, e);
                    return;
                }
            };

            tracing::info!("{} connected from {}", peer.id(), addr);
            self.listeners.for_each(|l| l.on_connected(&peer));
            // listed only once announced; its disconnect report waits for this gate
            self.peers.lock().push(peer);
        });
    }
}

struct Listening {
    port: u16,
    worker: Worker,
}

/// Accepts connections and announces its peers to [`ServerConnectionListener`]s.
pub struct Server<P> {
    codec: Arc<dyn Codec<Packet = P>>,
    config: NetConfig,
    hub: Arc<ServerHub<P>>,
    state: Mutex<Option<Listening>>,
}

impl<P: Send + 'static> Server<P> {
    pub fn new<C>(codec: C) -> Self
    where
        C: Codec<Packet = P> + 'static,
    {
        Self::with_config(codec, NetConfig::global().clone())
    }

    pub fn with_config<C>(codec: C, config: NetConfig) -> Self
    where
        C: Codec<Packet = P> + 'static,
    {
        Server {
            codec: Arc::new(codec),
            config,
            hub: Arc::new(ServerHub {
                gate: NotifyGate::new(),
                peers: Mutex::new(Vec::new()),
                listeners: ListenerSet::new(),
            }),
            state: Mutex::new(None),
        }
    }

    /// Bind `port` (0 for an ephemeral one) and start accepting.
    pub fn open(&self, port: u16) -> Result<()> {
        let mut state = self.state.lock();
        if state.is_some() {
            return Err(Error::AlreadyOpen);
        }

        let acceptor = TcpAcceptor::bind(self.config.bind_address, port).map_err(|source| {
            if is_permission_denied(&source) {
                Error::PortBindDenied { port, source }
            } else {
                Error::Bind { port, source }
            }
        })?;
        let local_addr = acceptor.local_addr();

        let hub = self.hub.clone();
        let codec = self.codec.clone();
        let config = self.config.clone();
        let worker = Worker::spawn(format!("pkt-accept-{}", local_addr.port()), move |shutdown| {
            accept_loop(acceptor, hub, codec, config, shutdown)
        })?;

        tracing::info!("server listening on {}", local_addr);
        *state = Some(Listening {
            port: local_addr.port(),
            worker,
        });
        Ok(())
    }

    /// Stop accepting and close the listening socket.
    ///
    /// No further `on_connected` is delivered once this returns. Peers already
    /// connected stay connected.
    pub fn close(&self) -> Result<()> {
        let mut listening = self.state.lock().take().ok_or(Error::NotOpen)?;

        if NotifyGate::held_by_current_thread() {
            // the accept thread may be waiting for the gate we hold; it checks
            // for shutdown before announcing anything
            listening.worker.signal();
        } else {
            listening.worker.stop(self.config.join_timeout);
        }
        tracing::info!("server on port {} closed", listening.port);
        Ok(())
    }

    pub fn add_connection_listener(&self, listener: Arc<dyn ServerConnectionListener<P>>) -> bool {
        self.hub.listeners.add(listener)
    }

    pub fn remove_connection_listener(&self, listener: &Arc<dyn ServerConnectionListener<P>>) -> bool {
        self.hub.listeners.remove(listener)
    }
}

impl<P> Server<P> {
    pub fn is_open(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Bound local port, or 0 when closed.
    pub fn port(&self) -> u16 {
        self.state.lock().as_ref().map_or(0, |l| l.port)
    }

    /// Live peers in connection order.
    ///
    /// A peer appears here only after every `on_connected` for it has returned.
    pub fn peers(&self) -> Vec<RemoteClient<P>> {
        self.hub.peers.lock().clone()
    }

    pub fn peer_count(&self) -> usize {
        self.hub.peers.lock().len()
    }

    /// Disconnect every current peer.
    pub fn disconnect_all(&self) {
        for peer in self.peers() {
            if let Err(e) = peer.disconnect() {
                tracing::debug!("{}: {}", peer.id(), e);
            }
        }
    }
}

impl<P> Drop for Server<P> {
    fn drop(&mut self) {
        if let Some(mut listening) = self.state.get_mut().take() {
            if NotifyGate::held_by_current_thread() {
                listening.worker.signal();
            } else {
                listening.worker.stop(self.config.join_timeout);
            }
        }
        self.disconnect_all();
    }
}

fn accept_loop<P: Send + 'static>(
    acceptor: TcpAcceptor,
    hub: Arc<ServerHub<P>>,
    codec: Arc<dyn Codec<Packet = P>>,
    config: NetConfig,
    shutdown: ShutdownSignal,
) {
    while !shutdown.is_requested() {
        match acceptor.accept_timeout(config.poll_timeout) {
            Ok(None) => {}
            Ok(Some((stream, addr))) => hub.admit(stream, addr, &codec, &config, &shutdown),
            Err(e) => {
                tracing::warn!("accept on port {} failed: {}", acceptor.local_port(), e);
                thread::sleep(config.poll_timeout);
            }
        }
    }
    tracing::debug!("accept loop on port {} stopped", acceptor.local_port());
}
