// RemoteClient: server-side handle to one connected peer
use crate::config::NetConfig;
use crate::gate::NotifyGate;
use crate::link::{self, LinkState, LoopExit, LOCAL_CLOSE_DETAIL};
use crate::listener::PacketListener;
use crate::registry::{self, ListenerSet};
use crate::server::ServerHub;
use crate::worker::{ShutdownSignal, Worker};
use parking_lot::Mutex;
use pkt_buffer::PacketBuffer;
use pkt_core::{Codec, DisconnectReason, Error, PeerId, Result};
use pkt_transport::{is_disconnect, ConnectionReader, TcpConnection};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Handle to one connected peer, handed out by the [`Server`](crate::Server).
///
/// Cheap to clone; every clone refers to the same connection. Packets that arrive
/// while no packet listener is registered are buffered (up to the configured
/// capacity, newest dropped beyond that) and delivered once a listener appears.
pub struct RemoteClient<P> {
    inner: Arc<RemoteInner<P>>,
}

struct RemoteInner<P> {
    id: PeerId,
    codec: Arc<dyn Codec<Packet = P>>,
    connection: TcpConnection,
    // never keeps the server alive
    hub: Weak<ServerHub<P>>,
    packet_listeners: ListenerSet<dyn PacketListener<P>>,
    buffer: PacketBuffer<P>,
    link: LinkState,
    worker: Mutex<Option<Worker>>,
    join_timeout: Duration,
}

impl<P: Send + 'static> RemoteClient<P> {
    /// Wrap an accepted socket and start its receive thread.
    pub(crate) fn accept(
        stream: TcpStream,
        hub: Weak<ServerHub<P>>,
        codec: Arc<dyn Codec<Packet = P>>,
        config: &NetConfig,
    ) -> io::Result<Self> {
        let connection = TcpConnection::from_stream(stream, &config.socket_options())?;
        let reader = connection
            .take_reader()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "receive half already taken"))?;

        let inner = Arc::new(RemoteInner {
            id: PeerId::next(),
            codec,
            connection,
            hub,
            packet_listeners: ListenerSet::new(),
            buffer: PacketBuffer::new(config.packet_buffer_capacity.max(1)),
            link: LinkState::new(),
            worker: Mutex::new(None),
            join_timeout: config.join_timeout,
        });

        let receiver = inner.clone();
        let worker = Worker::spawn(format!("pkt-peer-{}", inner.id.0), move |shutdown| {
            receiver.run_receiver(reader, shutdown)
        })?;
        *inner.worker.lock() = Some(worker);

        Ok(RemoteClient { inner })
    }
}

impl<P> RemoteClient<P> {
    /// Encode and write one packet; same contract as [`Client::send`](crate::Client::send).
    pub fn send(&self, packet: &P) -> Result<()> {
        let connection = &self.inner.connection;
        if !connection.is_connected() {
            return Err(Error::NotConnected);
        }
        let bytes = self.inner.codec.encode(packet)?;

        if let Err(e) = connection.send(&bytes) {
            self.inner.send_failed(e);
        }
        Ok(())
    }

    /// Close the connection from the server side.
    ///
    /// Server connection listeners hear [`DisconnectReason::UserAction`].
    pub fn disconnect(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.connection.is_connected() {
            return Err(Error::NotConnected);
        }

        // before closing, so the receive thread reports the right reason
        inner.link.set_reason(DisconnectReason::UserAction);
        let worker = inner.worker.lock().take();
        inner.connection.close();

        if let Some(mut worker) = worker {
            if NotifyGate::held_by_current_thread() {
                // the receive thread needs the gate to report; it will once the pass is over
                worker.signal();
            } else {
                worker.stop(inner.join_timeout);
            }
        }
        Ok(())
    }

    pub fn id(&self) -> PeerId {
        self.inner.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.connection.peer_addr()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.connection.local_addr()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Register a packet listener. Buffered packets reach it from the receive
    /// thread within one poll period.
    pub fn add_packet_listener(&self, listener: Arc<dyn PacketListener<P>>) -> bool {
        self.inner.packet_listeners.add(listener)
    }

    pub fn remove_packet_listener(&self, listener: &Arc<dyn PacketListener<P>>) -> bool {
        self.inner.packet_listeners.remove(listener)
    }

    /// Packets waiting for a listener
    pub fn buffered_packets(&self) -> usize {
        self.inner.buffer.len()
    }

    /// Packets lost because the buffer was full
    pub fn dropped_packets(&self) -> u64 {
        self.inner.buffer.dropped()
    }
}

impl<P> RemoteInner<P> {
    fn run_receiver(self: &Arc<Self>, mut reader: ConnectionReader, shutdown: ShutdownSignal) {
        let exit = link::receive_loop(
            &mut reader,
            &*self.codec,
            &shutdown,
            |packet| self.packet_arrived(packet),
            || self.flush(),
        );

        self.connection.close();
        match exit {
            LoopExit::Stopped => self.report_disconnect(LOCAL_CLOSE_DETAIL),
            LoopExit::Failed(detail) => {
                tracing::debug!("{}: receive failed: {}", self.id, detail);
                self.report_disconnect(&detail);
            }
        }
    }

    fn packet_arrived(&self, packet: P) {
        if self.buffer.push(packet).is_err() {
            tracing::warn!(
                "{}: packet buffer full ({} packets), dropping incoming packet ({} dropped so far); \
                 is a packet listener registered?",
                self.id,
                self.buffer.capacity(),
                self.buffer.dropped()
            );
        }
        self.flush();
    }

    /// Hand buffered packets to the current listeners, oldest first.
    fn flush(&self) {
        if self.buffer.is_empty() {
            return;
        }

        let listeners = self.packet_listeners.snapshot();
        if listeners.is_empty() {
            return;
        }

        for packet in self.buffer.drain() {
            for listener in &listeners {
                registry::isolate(|| listener.on_packet_received(&packet));
            }
        }
    }

    fn send_failed(self: &Arc<Self>, e: io::Error) {
        if !self.connection.is_connected() || is_disconnect(&e) {
            self.connection.close();
            if !NotifyGate::held_by_current_thread() {
                self.report_disconnect(&e.to_string());
            }
        } else {
            tracing::error!("{}: unexpected send failure: {}", self.id, e);
        }
    }

    fn report_disconnect(self: &Arc<Self>, failure: &str) {
        if !self.link.claim_disconnect() {
            return;
        }

        let reason = self.link.reason();
        let detail = self.link.detail(failure);
        let peer = RemoteClient { inner: self.clone() };
        match self.hub.upgrade() {
            Some(hub) => hub.peer_disconnected(&peer, reason, &detail),
            None => tracing::debug!("{} disconnected ({}) after its server went away", self.id, reason),
        }
    }
}

impl<P> Clone for RemoteClient<P> {
    fn clone(&self) -> Self {
        RemoteClient {
            inner: self.inner.clone(),
        }
    }
}

impl<P> PartialEq for RemoteClient<P> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<P> Eq for RemoteClient<P> {}

impl<P> Hash for RemoteClient<P> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl<P> fmt::Debug for RemoteClient<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RemoteClient")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.connection.peer_addr())
            .field("connected", &self.inner.connection.is_connected())
            .finish()
    }
}
