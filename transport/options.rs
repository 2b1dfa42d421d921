// Socket tuning applied to every connected stream
use nix::sys::socket::{setsockopt, sockopt};
use std::io::{self, Result};
use std::net::TcpStream;
use std::time::Duration;

/// Default receive poll period; bounds how long a stop request goes unnoticed
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// Read timeout of the receive loop; a timed-out read is retried, never an error
    pub poll_timeout: Duration,
    /// Per-address connect timeout; `None` uses the OS default
    pub connect_timeout: Option<Duration>,
    pub no_delay: bool,
    pub keepalive: bool,
    /// SO_SNDBUF; `None` keeps the OS default
    pub send_buffer_size: Option<usize>,
    /// SO_RCVBUF; `None` keeps the OS default
    pub recv_buffer_size: Option<usize>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        SocketOptions {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            connect_timeout: None,
            no_delay: true,
            keepalive: false,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

impl SocketOptions {
    pub fn apply(&self, stream: &TcpStream) -> Result<()> {
        // accepted sockets may come from a non-blocking listener
        stream.set_nonblocking(false)?;
        stream.set_nodelay(self.no_delay)?;
        stream.set_read_timeout(Some(non_zero(self.poll_timeout)))?;

        if self.keepalive {
            setsockopt(stream, sockopt::KeepAlive, &true).map_err(io::Error::from)?;
        }
        if let Some(size) = self.send_buffer_size {
            setsockopt(stream, sockopt::SndBuf, &size).map_err(io::Error::from)?;
        }
        if let Some(size) = self.recv_buffer_size {
            setsockopt(stream, sockopt::RcvBuf, &size).map_err(io::Error::from)?;
        }
        Ok(())
    }
}

// set_read_timeout rejects a zero duration
fn non_zero(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        Duration::from_millis(1)
    } else {
        timeout
    }
}
