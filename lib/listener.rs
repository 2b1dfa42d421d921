// Callback interfaces implemented by application code
use crate::remote_client::RemoteClient;
use pkt_core::DisconnectReason;

/// Receives decoded packets.
///
/// Called from the connection's receive thread (or the flush of buffered packets on
/// that thread); do not assume the same thread across calls.
pub trait PacketListener<T>: Send + Sync {
    fn on_packet_received(&self, packet: &T);
}

impl<T, F> PacketListener<T> for F
where
    F: Fn(&T) + Send + Sync,
{
    fn on_packet_received(&self, packet: &T) {
        self(packet)
    }
}

/// Lifecycle events of a [`Client`](crate::Client).
///
/// `on_connected` always precedes any packet or disconnect callback of the same
/// connection, and `on_disconnected` fires exactly once per connection.
pub trait ConnectionListener: Send + Sync {
    fn on_connected(&self);
    fn on_disconnected(&self, reason: DisconnectReason, detail: &str);
}

/// Lifecycle events of the peers of a [`Server`](crate::Server).
///
/// For any one peer `on_connected` is observed before its `on_disconnected`.
pub trait ServerConnectionListener<T>: Send + Sync {
    fn on_connected(&self, peer: &RemoteClient<T>);
    fn on_disconnected(&self, peer: &RemoteClient<T>, reason: DisconnectReason, detail: &str);
}
