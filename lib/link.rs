// Per-connection receive loop and disconnect bookkeeping shared by Client and RemoteClient
use crate::worker::ShutdownSignal;
use pkt_core::{Codec, DisconnectReason, Error};
use pkt_transport::{ConnectionReader, ReadOutcome};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

pub(crate) const LOCAL_CLOSE_DETAIL: &str = "connection closed locally";

/// Why the connection is ending, and whether that was already announced.
pub(crate) struct LinkState {
    reason: AtomicU8,
    notified: AtomicBool,
}

impl LinkState {
    pub fn new() -> Self {
        LinkState {
            reason: AtomicU8::new(DisconnectReason::Reset as u8),
            notified: AtomicBool::new(false),
        }
    }

    pub fn set_reason(&self, reason: DisconnectReason) {
        self.reason.store(reason as u8, Ordering::Release);
    }

    pub fn reason(&self) -> DisconnectReason {
        DisconnectReason::from_u8(self.reason.load(Ordering::Acquire))
    }

    /// Claim the one disconnect notification of this connection.
    pub fn claim_disconnect(&self) -> bool {
        !self.notified.swap(true, Ordering::AcqRel)
    }

    /// Detail text for the disconnect notification.
    pub fn detail(&self, failure: &str) -> String {
        match self.reason() {
            DisconnectReason::UserAction => LOCAL_CLOSE_DETAIL.to_string(),
            DisconnectReason::Reset => failure.to_string(),
        }
    }
}

pub(crate) enum LoopExit {
    /// Shutdown was requested
    Stopped,
    /// Read or decode failure; the connection is unusable
    Failed(String),
}

/// Decode packets until shutdown or failure.
///
/// Packets of one connection are handed to `on_packet` strictly in arrival order,
/// one at a time. `on_idle` runs after every poll period without data.
pub(crate) fn receive_loop<P>(
    reader: &mut ConnectionReader,
    codec: &dyn Codec<Packet = P>,
    shutdown: &ShutdownSignal,
    mut on_packet: impl FnMut(P),
    mut on_idle: impl FnMut(),
) -> LoopExit {
    let mut backlog = Vec::new();
    // bytes at the front of `backlog` already decoded; compacted once per read
    let mut consumed = 0;

    loop {
        if shutdown.is_requested() {
            return LoopExit::Stopped;
        }

        match codec.decode(&backlog[consumed..]) {
            Ok(Some((packet, used))) => {
                consumed += used;
                on_packet(packet);
                continue;
            }
            Ok(None) => {}
            Err(e) => return LoopExit::Failed(e.to_string()),
        }

        backlog.drain(..consumed);
        consumed = 0;

        match reader.read_into(&mut backlog) {
            ReadOutcome::Data(_) => {}
            ReadOutcome::TimedOut => on_idle(),
            ReadOutcome::Closed if backlog.is_empty() => {
                return LoopExit::Failed(Error::EndOfStream.to_string())
            }
            ReadOutcome::Closed => {
                return LoopExit::Failed(format!(
                    "{} inside a packet ({} bytes pending)",
                    Error::EndOfStream,
                    backlog.len()
                ))
            }
            ReadOutcome::Failed(e) => return LoopExit::Failed(e.to_string()),
        }
    }
}
