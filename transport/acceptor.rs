// Listening socket with a bounded-wait accept
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io::{self, ErrorKind, Result};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsFd;
use std::time::Duration;

pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Bind `address:port`; port 0 picks an ephemeral port.
    pub fn bind(address: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((address, port))?;
        // readiness from poll can go stale before accept runs
        listener.set_nonblocking(true)?;

        Ok(TcpAcceptor {
            local_addr: listener.local_addr()?,
            listener,
        })
    }

    /// Wait up to `timeout` for an incoming connection.
    ///
    /// `Ok(None)` means nothing arrived in time and is not an error.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<Option<(TcpStream, SocketAddr)>> {
        let millis = timeout.as_millis().min(u16::MAX as u128) as u16;
        let mut fds = [PollFd::new(self.listener.as_fd(), PollFlags::POLLIN)];

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(None),
            Err(e) => return Err(io::Error::from(e)),
        }

        match self.listener.accept() {
            Ok(accepted) => Ok(Some(accepted)),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }
}

/// Bind failures caused by missing privilege rather than a busy or invalid address.
pub fn is_permission_denied(e: &io::Error) -> bool {
    e.kind() == ErrorKind::PermissionDenied
}
