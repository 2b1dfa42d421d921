// pkt-echo: echo server built on the pkt-net Server
use clap::Parser;
use parking_lot::Mutex;
use pkt_net::{
    BincodeCodec, DisconnectReason, NetConfig, PacketListener, PeerId, RemoteClient, Server,
    ServerConnectionListener,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pkt-echo")]
#[command(about = "Echo every text packet back to the peer that sent it", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Port to listen on (0 picks a free one)
    #[arg(short, long, default_value_t = 4000)]
    port: u16,

    /// Address to bind, overrides PKTNET_BIND_ADDRESS
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<IpAddr>,

    /// Print a peer count every N seconds (0 disables)
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    stats: u64,
}

/// Gives each new peer a listener that sends its packets straight back.
#[derive(Default)]
struct Echo {
    // kept so the listener can be detached again; it holds a handle to its own peer
    attached: Mutex<HashMap<PeerId, Arc<dyn PacketListener<String>>>>,
}

impl ServerConnectionListener<String> for Echo {
    fn on_connected(&self, peer: &RemoteClient<String>) {
        println!("+ {} ({})", peer.id(), peer.peer_addr());

        let target = peer.clone();
        let echo: Arc<dyn PacketListener<String>> = Arc::new(move |text: &String| {
            if let Err(e) = target.send(text) {
                tracing::warn!("{}: echo failed: {}", target.id(), e);
            }
        });
        peer.add_packet_listener(echo.clone());
        self.attached.lock().insert(peer.id(), echo);
    }

    fn on_disconnected(&self, peer: &RemoteClient<String>, reason: DisconnectReason, detail: &str) {
        println!("- {} {}: {}", peer.id(), reason, detail);
        if let Some(echo) = self.attached.lock().remove(&peer.id()) {
            peer.remove_packet_listener(&echo);
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = NetConfig::global().clone();
    if let Some(addr) = cli.bind {
        config.bind_address = addr;
    }

    let server = Server::with_config(BincodeCodec::<String>::new(), config);
    server.add_connection_listener(Arc::new(Echo::default()));

    if let Err(e) = server.open(cli.port) {
        eprintln!("pkt-echo: {}", e);
        process::exit(1);
    }
    println!("pkt-echo listening on port {}", server.port());

    loop {
        if cli.stats == 0 {
            thread::park();
            continue;
        }
        thread::sleep(Duration::from_secs(cli.stats));
        tracing::info!("{} peer(s) connected", server.peer_count());
    }
}
