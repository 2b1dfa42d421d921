mod utils;

use pkt_net::{DisconnectReason, PacketListener, RemoteClient, ServerConnectionListener};
use std::sync::Arc;
use utils::*;

fn echo_to(peer: &RemoteClient<String>, prefix: &'static str) {
    let target = peer.clone();
    let echo: Arc<dyn PacketListener<String>> = Arc::new(move |text: &String| {
        let _ = target.send(&format!("{}{}", prefix, text));
    });
    peer.add_packet_listener(echo);
}

#[test]
fn ping_pong() {
    // every interface, so "localhost" works whichever address it resolves to first
    let config = pkt_net::NetConfig {
        bind_address: std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
        ..test_config()
    };
    let (server, server_events) = open_server(config);
    let (client, client_events) = connect_client_to("localhost", server.port());
    assert_eq!(client_events.recv_timeout(WAIT).unwrap(), ClientEvent::Connected);

    let peer = expect_connected(&server_events);
    let (packets, received) = collector();
    peer.add_packet_listener(packets);

    client.send(&"ping".to_string()).unwrap();
    assert_eq!(received.recv_timeout(WAIT).unwrap(), "ping");

    peer.send(&"pong".to_string()).unwrap();
    assert_eq!(
        client_events.recv_timeout(WAIT).unwrap(),
        ClientEvent::Packet("pong".to_string())
    );
    assert!(wait_until(|| server.peer_count() == 1));
    assert_eq!(server.peers(), vec![peer.clone()]);
    assert_eq!(Some(peer.peer_addr()), client.local_addr());
}

struct Greeter;

impl ServerConnectionListener<String> for Greeter {
    fn on_connected(&self, peer: &RemoteClient<String>) {
        peer.send(&"hello".to_string()).unwrap();
    }

    fn on_disconnected(&self, _peer: &RemoteClient<String>, _reason: DisconnectReason, _detail: &str) {}
}

#[test]
fn connected_is_announced_before_the_first_packet() {
    let (server, _server_events) = open_server(test_config());
    server.add_connection_listener(Arc::new(Greeter));

    let (_client, client_events) = connect_client(server.port());
    assert_eq!(client_events.recv_timeout(WAIT).unwrap(), ClientEvent::Connected);
    assert_eq!(
        client_events.recv_timeout(WAIT).unwrap(),
        ClientEvent::Packet("hello".to_string())
    );
}

#[test]
fn packets_arrive_in_send_order() {
    let (server, server_events) = open_server(test_config());
    let (client, _client_events) = connect_client(server.port());

    let peer = expect_connected(&server_events);
    let (packets, received) = collector();
    peer.add_packet_listener(packets);

    for seq in 0..200 {
        client.send(&seq.to_string()).unwrap();
    }
    for seq in 0..200 {
        assert_eq!(received.recv_timeout(WAIT).unwrap(), seq.to_string());
    }
}

#[test]
fn large_packet_spans_many_reads() {
    let (server, server_events) = open_server(test_config());
    let (client, client_events) = connect_client(server.port());
    assert_eq!(client_events.recv_timeout(WAIT).unwrap(), ClientEvent::Connected);

    let peer = expect_connected(&server_events);
    echo_to(&peer, "");

    let big = "x".repeat(1 << 20);
    client.send(&big).unwrap();
    assert_eq!(client_events.recv_timeout(WAIT).unwrap(), ClientEvent::Packet(big));
}

#[test]
fn each_peer_gets_its_own_replies() {
    let (server, server_events) = open_server(test_config());

    let mut clients = Vec::new();
    for _ in 0..3 {
        let (client, client_events) = connect_client(server.port());
        let peer = expect_connected(&server_events);
        echo_to(&peer, "re: ");
        clients.push((client, client_events));
    }
    assert!(wait_until(|| server.peer_count() == 3));

    for (n, (client, _)) in clients.iter().enumerate() {
        client.send(&format!("client {}", n)).unwrap();
    }
    for (n, (_, client_events)) in clients.iter().enumerate() {
        assert_eq!(client_events.recv_timeout(WAIT).unwrap(), ClientEvent::Connected);
        assert_eq!(
            client_events.recv_timeout(WAIT).unwrap(),
            ClientEvent::Packet(format!("re: client {}", n))
        );
    }
}

#[test]
fn removed_listener_stops_receiving() {
    let (server, server_events) = open_server(test_config());
    let (client, _client_events) = connect_client(server.port());
    let peer = expect_connected(&server_events);

    let (first, first_rx) = collector();
    let (second, second_rx) = collector();
    assert!(peer.add_packet_listener(first.clone()));
    assert!(!peer.add_packet_listener(first.clone()));
    assert!(peer.add_packet_listener(second));

    client.send(&"a".to_string()).unwrap();
    assert_eq!(first_rx.recv_timeout(WAIT).unwrap(), "a");
    assert_eq!(second_rx.recv_timeout(WAIT).unwrap(), "a");
    expect_silence(&first_rx);

    assert!(peer.remove_packet_listener(&first));
    assert!(!peer.remove_packet_listener(&first));
    client.send(&"b".to_string()).unwrap();
    assert_eq!(second_rx.recv_timeout(WAIT).unwrap(), "b");
    expect_silence(&first_rx);
}
