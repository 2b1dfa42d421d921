// TCP connection with a shared send half and a receive half owned by the receive thread
use crate::options::SocketOptions;
use parking_lot::Mutex;
use std::io::{self, ErrorKind, Read, Result, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// One live TCP connection: a send half guarded for concurrent senders,
/// a receive half handed once to the receive thread, and the connectivity flag.
///
/// Once closed a connection is never reopened.
pub struct TcpConnection {
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    control: TcpStream,
    writer: Mutex<TcpStream>,
    reader: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
}

impl TcpConnection {
    /// Connect to `host:port`, trying every resolved address in turn.
    pub fn open(host: &str, port: u16, options: &SocketOptions) -> Result<Self> {
        let mut last_error = None;

        for addr in (host, port).to_socket_addrs()? {
            let attempt = match options.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => return Self::from_stream(stream, options),
                Err(e) => {
                    tracing::debug!("connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(ErrorKind::NotFound, format!("{} resolved to no addresses", host))
        }))
    }

    /// Wrap an already connected stream (e.g. one returned by accept).
    pub fn from_stream(stream: TcpStream, options: &SocketOptions) -> Result<Self> {
        options.apply(&stream)?;

        let writer = stream.try_clone()?;
        let reader = stream.try_clone()?;

        Ok(TcpConnection {
            peer_addr: stream.peer_addr()?,
            local_addr: stream.local_addr()?,
            control: stream,
            writer: Mutex::new(writer),
            reader: Mutex::new(Some(reader)),
            connected: AtomicBool::new(true),
        })
    }

    /// Hand out the receive half. Only the first call gets it.
    pub fn take_reader(&self) -> Option<ConnectionReader> {
        self.reader.lock().take().map(|stream| ConnectionReader {
            stream,
            chunk: vec![0u8; READ_CHUNK_SIZE],
        })
    }

    /// Write and flush one encoded packet.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(io::Error::new(ErrorKind::NotConnected, "Not connected"));
        }

        let mut writer = self.writer.lock();
        writer.write_all(data)?;
        writer.flush()
    }

    /// Shut the socket down in both directions. Returns false if it was already closed.
    ///
    /// A blocked read on the receive half returns promptly afterwards.
    pub fn close(&self) -> bool {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Err(e) = self.control.shutdown(Shutdown::Both) {
            // the peer may already be gone
            tracing::trace!("shutdown of {} failed: {}", self.peer_addr, e);
        }
        true
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Result of one timed read
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were appended to the backlog
    Data(usize),
    /// Poll period elapsed without data; expected, retry
    TimedOut,
    /// Peer closed the stream
    Closed,
    Failed(io::Error),
}

/// Receive half of a [`TcpConnection`], owned by exactly one receive thread.
pub struct ConnectionReader {
    stream: TcpStream,
    chunk: Vec<u8>,
}

impl ConnectionReader {
    /// Block for at most the connection's poll timeout and append what arrived to `backlog`.
    pub fn read_into(&mut self, backlog: &mut Vec<u8>) -> ReadOutcome {
        match self.stream.read(&mut self.chunk) {
            Ok(0) => ReadOutcome::Closed,
            Ok(n) => {
                backlog.extend_from_slice(&self.chunk[..n]);
                ReadOutcome::Data(n)
            }
            Err(e) if is_timeout(&e) => ReadOutcome::TimedOut,
            Err(e) => ReadOutcome::Failed(e),
        }
    }
}

/// Read timeouts surface as WouldBlock or TimedOut depending on the platform.
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// Write errors that mean the connection is gone rather than a local fault.
pub fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::WriteZero
    )
}
