// Engine configuration, read once from the environment
//
// PKTNET_POLL_TIMEOUT_MS:    receive/accept poll period (default: 100)
// PKTNET_CONNECT_TIMEOUT_MS: per-address connect timeout (default: OS)
// PKTNET_JOIN_TIMEOUT_MS:    bound on waiting for a worker at shutdown (default: 2000)
// PKTNET_NO_DELAY:           TCP_NODELAY, 0/1 (default: 1)
// PKTNET_KEEPALIVE:          SO_KEEPALIVE, 0/1 (default: 0)
// PKTNET_SNDBUF / PKTNET_RCVBUF: socket buffer sizes in bytes (default: OS)
// PKTNET_BUFFER_CAPACITY:    packets a peer buffers while unobserved (default: 1024)
// PKTNET_BIND_ADDRESS:       server bind address (default: 0.0.0.0)
use once_cell::sync::Lazy;
use pkt_buffer::DEFAULT_PACKET_BUFFER_CAPACITY;
use pkt_transport::{SocketOptions, DEFAULT_POLL_TIMEOUT};
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

static GLOBAL_CONFIG: Lazy<NetConfig> = Lazy::new(NetConfig::from_env);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    pub poll_timeout: Duration,
    pub connect_timeout: Option<Duration>,
    pub join_timeout: Duration,
    pub no_delay: bool,
    pub keepalive: bool,
    pub send_buffer_size: Option<usize>,
    pub recv_buffer_size: Option<usize>,
    pub packet_buffer_capacity: usize,
    pub bind_address: IpAddr,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            connect_timeout: None,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            no_delay: true,
            keepalive: false,
            send_buffer_size: None,
            recv_buffer_size: None,
            packet_buffer_capacity: DEFAULT_PACKET_BUFFER_CAPACITY,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl NetConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Process-wide configuration, taken from the environment on first use.
    pub fn global() -> &'static NetConfig {
        &GLOBAL_CONFIG
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = NetConfig::default();
        let millis = |key: &str| parse::<u64>(&lookup, key).map(Duration::from_millis);
        let flag = |key: &str| parse::<u8>(&lookup, key).map(|v| v != 0);

        NetConfig {
            poll_timeout: millis("PKTNET_POLL_TIMEOUT_MS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.poll_timeout),
            connect_timeout: millis("PKTNET_CONNECT_TIMEOUT_MS")
                .filter(|d| !d.is_zero())
                .or(defaults.connect_timeout),
            join_timeout: millis("PKTNET_JOIN_TIMEOUT_MS").unwrap_or(defaults.join_timeout),
            no_delay: flag("PKTNET_NO_DELAY").unwrap_or(defaults.no_delay),
            keepalive: flag("PKTNET_KEEPALIVE").unwrap_or(defaults.keepalive),
            send_buffer_size: parse(&lookup, "PKTNET_SNDBUF").or(defaults.send_buffer_size),
            recv_buffer_size: parse(&lookup, "PKTNET_RCVBUF").or(defaults.recv_buffer_size),
            packet_buffer_capacity: parse::<usize>(&lookup, "PKTNET_BUFFER_CAPACITY")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.packet_buffer_capacity),
            bind_address: parse(&lookup, "PKTNET_BIND_ADDRESS").unwrap_or(defaults.bind_address),
        }
    }

    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            poll_timeout: self.poll_timeout,
            connect_timeout: self.connect_timeout,
            no_delay: self.no_delay,
            keepalive: self.keepalive,
            send_buffer_size: self.send_buffer_size,
            recv_buffer_size: self.recv_buffer_size,
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("ignoring unparsable {}={:?}", key, value);
            None
        }
    }
}
