// Error taxonomy shared by every pkt crate
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A required parameter was empty
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    /// The client was disconnected once and must be replaced by a fresh instance
    #[error("client was disconnected and cannot be reused")]
    ClientClosed,

    #[error("server is not open")]
    NotOpen,

    #[error("server is already open")]
    AlreadyOpen,

    #[error("failed to connect to {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("not allowed to open server on port {port}: {source}")]
    PortBindDenied {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The codec refused to serialize a packet
    #[error("packet is not encodable: {0}")]
    NotEncodable(String),

    /// Malformed incoming data
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("end of stream")]
    EndOfStream,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the state violations (`IllegalState` family).
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            Error::AlreadyConnected
                | Error::NotConnected
                | Error::ClientClosed
                | Error::NotOpen
                | Error::AlreadyOpen
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
