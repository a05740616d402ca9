use std::path::PathBuf;

/// Errors raised while establishing or configuring a byte channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// Failed to create a connected socket pair.
    #[error("failed to create socket pair: {0}")]
    Pair(std::io::Error),

    /// An I/O error occurred on the stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// Consume the error and return the underlying I/O error, if there is one.
    pub fn into_io(self) -> std::io::Error {
        match self {
            TransportError::Io(io)
            | TransportError::Accept(io)
            | TransportError::Pair(io)
            | TransportError::Bind { source: io, .. }
            | TransportError::Connect { source: io, .. } => io,
            other => std::io::Error::other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
