//! Connected duplex byte channels for scriptbridge sessions.
//!
//! A session never sets up its own connection. It is handed an already
//! connected, reliable, ordered byte stream. This crate provides the default
//! one:
//! - [`IpcStream::pair`] for a controller and worker created by the same parent
//! - [`UnixDomainSocket`] for a worker that listens on a filesystem path
//!
//! Disconnection surfaces as an ordinary I/O error or a zero-length read; the
//! wire layer turns both into a distinguished "connection closed" failure.

pub mod error;
#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
#[cfg(unix)]
pub use stream::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
