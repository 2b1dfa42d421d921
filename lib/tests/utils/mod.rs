#![allow(dead_code)]

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use pkt_net::{
    BincodeCodec, Client, ConnectionListener, DisconnectReason, NetConfig, PacketListener, RemoteClient,
    Server, ServerConnectionListener,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(300);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn test_config() -> NetConfig {
    NetConfig {
        poll_timeout: Duration::from_millis(20),
        join_timeout: Duration::from_secs(2),
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        ..NetConfig::default()
    }
}

pub fn open_server(config: NetConfig) -> (Server<String>, Receiver<ServerEvent>) {
    init_tracing();
    let server = Server::with_config(BincodeCodec::<String>::new(), config);
    let (tx, rx) = unbounded();
    server.add_connection_listener(Arc::new(ServerRecorder { events: tx }));
    server.open(0).unwrap();
    (server, rx)
}

pub fn connect_client(port: u16) -> (Client<String>, Receiver<ClientEvent>) {
    connect_client_to("127.0.0.1", port)
}

pub fn connect_client_to(host: &str, port: u16) -> (Client<String>, Receiver<ClientEvent>) {
    let client = Client::with_config(BincodeCodec::<String>::new(), test_config());
    let (tx, rx) = unbounded();
    client.add_connection_listener(Arc::new(ClientRecorder { events: tx.clone() }));
    let packets: Arc<dyn PacketListener<String>> = Arc::new(move |text: &String| {
        let _ = tx.send(ClientEvent::Packet(text.clone()));
    });
    client.add_packet_listener(packets);
    client.connect(host, port).unwrap();
    (client, rx)
}

pub enum ServerEvent {
    Connected(RemoteClient<String>),
    Disconnected(RemoteClient<String>, DisconnectReason, String),
}

pub struct ServerRecorder {
    pub events: Sender<ServerEvent>,
}

impl ServerConnectionListener<String> for ServerRecorder {
    fn on_connected(&self, peer: &RemoteClient<String>) {
        let _ = self.events.send(ServerEvent::Connected(peer.clone()));
    }

    fn on_disconnected(&self, peer: &RemoteClient<String>, reason: DisconnectReason, detail: &str) {
        let _ = self
            .events
            .send(ServerEvent::Disconnected(peer.clone(), reason, detail.to_string()));
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Packet(String),
    Disconnected(DisconnectReason),
}

pub struct ClientRecorder {
    pub events: Sender<ClientEvent>,
}

impl ConnectionListener for ClientRecorder {
    fn on_connected(&self) {
        let _ = self.events.send(ClientEvent::Connected);
    }

    fn on_disconnected(&self, reason: DisconnectReason, _detail: &str) {
        let _ = self.events.send(ClientEvent::Disconnected(reason));
    }
}

/// Packet listener that forwards everything into a channel.
pub fn collector() -> (Arc<dyn PacketListener<String>>, Receiver<String>) {
    let (tx, rx) = unbounded();
    let listener: Arc<dyn PacketListener<String>> = Arc::new(move |text: &String| {
        let _ = tx.send(text.clone());
    });
    (listener, rx)
}

pub fn expect_connected(events: &Receiver<ServerEvent>) -> RemoteClient<String> {
    match events.recv_timeout(WAIT).expect("no connect notification") {
        ServerEvent::Connected(peer) => peer,
        ServerEvent::Disconnected(peer, reason, _) => {
            panic!("expected connect, got disconnect of {} ({})", peer.id(), reason)
        }
    }
}

pub fn expect_disconnected(events: &Receiver<ServerEvent>) -> (RemoteClient<String>, DisconnectReason) {
    match events.recv_timeout(WAIT).expect("no disconnect notification") {
        ServerEvent::Disconnected(peer, reason, _) => (peer, reason),
        ServerEvent::Connected(peer) => panic!("expected disconnect, got connect of {}", peer.id()),
    }
}

pub fn expect_silence<T>(events: &Receiver<T>) {
    assert!(matches!(events.recv_timeout(QUIET), Err(RecvTimeoutError::Timeout)));
}

/// Poll `condition` until it holds or [`WAIT`] runs out.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
