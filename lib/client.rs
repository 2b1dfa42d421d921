// Client: one outbound connection with its own receive thread
use crate::config::NetConfig;
use crate::gate::NotifyGate;
use crate::link::{self, LinkState, LoopExit, LOCAL_CLOSE_DETAIL};
use crate::listener::{ConnectionListener, PacketListener};
use crate::registry::ListenerSet;
use crate::worker::{ShutdownSignal, Worker};
use parking_lot::Mutex;
use pkt_core::{Codec, DisconnectReason, Error, Result};
use pkt_transport::{is_disconnect, ConnectionReader, TcpConnection};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

/// Application-side handle to a single connection.
///
/// `connect` is one-shot and `disconnect` is terminal: a disconnected client
/// cannot be reconnected, create a new one instead.
pub struct Client<P> {
    shared: Arc<ClientShared<P>>,
    state: Mutex<ClientState>,
}

struct ClientShared<P> {
    codec: Arc<dyn Codec<Packet = P>>,
    config: NetConfig,
    packet_listeners: ListenerSet<dyn PacketListener<P>>,
    connection_listeners: ListenerSet<dyn ConnectionListener>,
    gate: NotifyGate,
    link: LinkState,
}

enum ClientState {
    Idle,
    Connected(Session),
    Closed,
}

struct Session {
    connection: Arc<TcpConnection>,
    worker: Option<Worker>,
}

impl<P: Send + 'static> Client<P> {
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
        Client {
            shared: Arc::new(ClientShared {
                codec: Arc::new(codec),
                config,
                packet_listeners: ListenerSet::new(),
                connection_listeners: ListenerSet::new(),
                gate: NotifyGate::new(),
                link: LinkState::new(),
            }),
            state: Mutex::new(ClientState::Idle),
        }
    }

    /// Connect to `host:port`.
    ///
    /// Connection listeners hear `on_connected` on the calling thread before this
    /// returns and before any packet is delivered.
    pub fn connect(&self, host: &str, port: u16) -> Result<()> {
        if host.trim().is_empty() {
            return Err(Error::InvalidArgument("host cannot be empty"));
        }

        let shared = &self.shared;
        // the gate covers publishing the connection, so a concurrent send failure
        // cannot announce a disconnect ahead of this connect
        let connection = shared.gate.run(|| -> Result<Arc<TcpConnection>> {
            let connection = {
                let mut state = self.state.lock();
                match &*state {
                    ClientState::Idle => {}
                    ClientState::Connected(session) if session.connection.is_connected() => {
                        return Err(Error::AlreadyConnected)
                    }
                    // the connection was lost; this client is finished
                    ClientState::Connected(_) | ClientState::Closed => return Err(Error::ClientClosed),
                }

                let options = shared.config.socket_options();
                let connection = TcpConnection::open(host, port, &options).map_err(|source| {
                    Error::ConnectFailure {
                        addr: format!("{}:{}", host, port),
                        source,
                    }
                })?;
                let connection = Arc::new(connection);
                *state = ClientState::Connected(Session {
                    connection: connection.clone(),
                    worker: None,
                });
                connection
            };

            tracing::info!("connected to {}", connection.peer_addr());
            shared.connection_listeners.for_each(|l| l.on_connected());
            Ok(connection)
        })?;

        self.start_receiving(connection)
    }

    fn start_receiving(&self, connection: Arc<TcpConnection>) -> Result<()> {
        let reader = connection.take_reader();
        let mut state = self.state.lock();
        let is_current = matches!(
            &*state,
            ClientState::Connected(session) if Arc::ptr_eq(&session.connection, &connection)
        );

        // a connected callback may already have disconnected us
        let reader = match reader {
            Some(reader) if is_current && connection.is_connected() => reader,
            _ => {
                drop(state);
                connection.close();
                self.shared.report_disconnect("connection lost while connecting");
                return Ok(());
            }
        };

        let shared = self.shared.clone();
        let worker_connection = connection.clone();
        let spawned = Worker::spawn(format!("pkt-client-{}", connection.peer_addr()), move |shutdown| {
            shared.run_receiver(&worker_connection, reader, shutdown)
        });

        match spawned {
            Ok(worker) => {
                if let ClientState::Connected(session) = &mut *state {
                    session.worker = Some(worker);
                }
                Ok(())
            }
            Err(e) => {
                *state = ClientState::Closed;
                drop(state);
                tracing::error!("failed to start receive thread: {}", e);
                connection.close();
                self.shared.report_disconnect(&e.to_string());
                Err(Error::Io(e))
            }
        }
    }

    /// Stop the receive thread, close the connection and announce
    /// [`DisconnectReason::UserAction`] to the connection listeners.
    pub fn disconnect(&self) -> Result<()> {
        let session = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, ClientState::Closed) {
                ClientState::Connected(session) => session,
                other => {
                    *state = other;
                    return Err(Error::NotConnected);
                }
            }
        };

        let was_connected = session.connection.is_connected();
        if was_connected {
            self.shared.link.set_reason(DisconnectReason::UserAction);
        }
        self.shared.stop_session(session);

        if was_connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Encode and write one packet.
    ///
    /// Only state and encoding problems are returned. A write failure that means the
    /// connection is gone becomes a [`DisconnectReason::Reset`] notification; any
    /// other write failure is logged.
    pub fn send(&self, packet: &P) -> Result<()> {
        let connection = self.connection().ok_or(Error::NotConnected)?;
        let bytes = self.shared.codec.encode(packet)?;

        if let Err(e) = connection.send(&bytes) {
            self.shared.send_failed(&connection, e);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection().is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection().map(|c| c.peer_addr())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connection().map(|c| c.local_addr())
    }

    pub fn add_packet_listener(&self, listener: Arc<dyn PacketListener<P>>) -> bool {
        self.shared.packet_listeners.add(listener)
    }

    pub fn remove_packet_listener(&self, listener: &Arc<dyn PacketListener<P>>) -> bool {
        self.shared.packet_listeners.remove(listener)
    }

    pub fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) -> bool {
        self.shared.connection_listeners.add(listener)
    }

    pub fn remove_connection_listener(&self, listener: &Arc<dyn ConnectionListener>) -> bool {
        self.shared.connection_listeners.remove(listener)
    }

    fn connection(&self) -> Option<Arc<TcpConnection>> {
        match &*self.state.lock() {
            ClientState::Connected(session) if session.connection.is_connected() => {
                Some(session.connection.clone())
            }
            _ => None,
        }
    }
}

impl<P> ClientShared<P> {
    fn run_receiver(&self, connection: &TcpConnection, mut reader: ConnectionReader, shutdown: ShutdownSignal) {
        let exit = link::receive_loop(
            &mut reader,
            &*self.codec,
            &shutdown,
            |packet| self.packet_listeners.for_each(|l| l.on_packet_received(&packet)),
            || {},
        );

        connection.close();
        match exit {
            LoopExit::Stopped => self.report_disconnect(LOCAL_CLOSE_DETAIL),
            LoopExit::Failed(detail) => {
                tracing::debug!("receive from {} failed: {}", connection.peer_addr(), detail);
                self.report_disconnect(&detail);
            }
        }
    }

    fn send_failed(&self, connection: &TcpConnection, e: io::Error) {
        if !connection.is_connected() || is_disconnect(&e) {
            connection.close();
            // inside a notification pass the receive side reports once the pass is over
            if !NotifyGate::held_by_current_thread() {
                self.report_disconnect(&e.to_string());
            }
        } else {
            tracing::error!("unexpected send failure to {}: {}", connection.peer_addr(), e);
        }
    }

    fn stop_session(&self, mut session: Session) {
        match session.worker.as_mut() {
            Some(worker) => {
                worker.signal();
                session.connection.close();
                if !NotifyGate::held_by_current_thread() {
                    worker.stop(self.config.join_timeout);
                }
            }
            // not receiving yet; connect reports once its connected pass is over
            None => {
                session.connection.close();
            }
        }
    }

    fn report_disconnect(&self, failure: &str) {
        if !self.link.claim_disconnect() {
            return;
        }

        let reason = self.link.reason();
        let detail = self.link.detail(failure);
        tracing::info!("disconnected ({}): {}", reason, detail);
        self.gate.run(|| {
            self.connection_listeners
                .for_each(|l| l.on_disconnected(reason, &detail))
        });
    }
}

impl<P> Drop for Client<P> {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), ClientState::Closed);
        if let ClientState::Connected(session) = state {
            if session.connection.is_connected() {
                self.shared.link.set_reason(DisconnectReason::UserAction);
            }
            self.shared.stop_session(session);
        }
    }
}
