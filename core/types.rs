// Core types used across all pkt components
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one server-side peer connection, stable for the connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u64);

impl PeerId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        PeerId(NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DisconnectReason {
    /// I/O failure, or the remote side closed the connection
    Reset = 0,
    /// Explicit local `disconnect()` call
    UserAction = 1,
}

impl DisconnectReason {
    pub fn from_u8(val: u8) -> Self {
        match val {
            1 => DisconnectReason::UserAction,
            _ => DisconnectReason::Reset,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DisconnectReason::Reset => write!(f, "RESET"),
            DisconnectReason::UserAction => write!(f, "USER_ACTION"),
        }
    }
}
