// lib: packet networking over TCP for building servers, clients, integration tests, etc.
// One accept thread per server and one receive thread per connection; packets are
// framed and decoded by a pluggable Codec and delivered to registered listeners.

// Re-export core types, errors and codecs
pub use pkt_core::*;

mod config;
mod gate;
mod link;
mod listener;
mod registry;
mod worker;

mod client;
mod remote_client;
mod server;

pub use client::Client;
pub use config::NetConfig;
pub use listener::{ConnectionListener, PacketListener, ServerConnectionListener};
pub use registry::ListenerSet;
pub use remote_client::RemoteClient;
pub use server::Server;
