// pkt-send: connect to a packet server, send text packets and print the replies
use chrono::Local;
use clap::Parser;
use crossbeam::channel::{unbounded, RecvTimeoutError, Sender};
use pkt_net::{BincodeCodec, Client, ConnectionListener, DisconnectReason, PacketListener};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pkt-send")]
#[command(about = "Send text packets to a pkt-net server and print what comes back", long_about = None)]
#[command(version = "0.1.0")]
struct Cli {
    /// Server address
    #[arg(short = 'a', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 4000)]
    port: u16,

    /// Number of packets to send
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Pause between packets in milliseconds
    #[arg(short, long, default_value_t = 0, value_name = "MS")]
    delay: u64,

    /// Seconds to wait for replies after the last packet
    #[arg(short, long, default_value_t = 5, value_name = "SECS")]
    wait: u64,

    /// Packet text; a sequence number is appended when sending more than one
    #[arg(default_value = "ping")]
    message: String,
}

enum Event {
    Reply(String),
    Closed(DisconnectReason, String),
}

struct Printer {
    events: Sender<Event>,
}

impl ConnectionListener for Printer {
    fn on_connected(&self) {
        println!("[{}] connected", timestamp());
    }

    fn on_disconnected(&self, reason: DisconnectReason, detail: &str) {
        let _ = self.events.send(Event::Closed(reason, detail.to_string()));
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let (events_tx, events_rx) = unbounded();

    let client = Client::new(BincodeCodec::<String>::new());
    let replies = events_tx.clone();
    let on_reply: Arc<dyn PacketListener<String>> = Arc::new(move |text: &String| {
        let _ = replies.send(Event::Reply(text.clone()));
    });
    client.add_packet_listener(on_reply);
    client.add_connection_listener(Arc::new(Printer { events: events_tx }));

    if let Err(e) = client.connect(&cli.host, cli.port) {
        eprintln!("pkt-send: {}", e);
        process::exit(1);
    }

    for seq in 0..cli.count {
        let text = if cli.count > 1 {
            format!("{} {}", cli.message, seq)
        } else {
            cli.message.clone()
        };
        if let Err(e) = client.send(&text) {
            eprintln!("pkt-send: {}", e);
            break;
        }
        println!("[{}] > {}", timestamp(), text);
        if cli.delay > 0 {
            thread::sleep(Duration::from_millis(cli.delay));
        }
    }

    let deadline = Instant::now() + Duration::from_secs(cli.wait);
    let mut received = 0;
    while received < cli.count {
        match events_rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(Event::Reply(text)) => {
                received += 1;
                println!("[{}] < {}", timestamp(), text);
            }
            Ok(Event::Closed(reason, detail)) => {
                println!("[{}] disconnected: {} ({})", timestamp(), reason, detail);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                eprintln!("pkt-send: {} of {} replies before timeout", received, cli.count);
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if client.disconnect().is_ok() {
        println!("[{}] disconnected", timestamp());
    }
}
