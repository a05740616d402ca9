use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use scriptbridge_wire::{WireError, WireStream};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// First four bytes on every channel, written by the controller.
pub const MAGIC_NUMBER: i32 = 0x5342_5231;

/// Configuration for session bootstrap.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Magic number both ends must agree on.
    pub magic: i32,
    /// Timeout for reading the magic number on sockets that support one.
    pub timeout: Option<Duration>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            magic: MAGIC_NUMBER,
            timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl HandshakeConfig {
    pub fn with_magic(mut self, magic: i32) -> Self {
        self.magic = magic;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Controller side: write the magic number and push it onto the channel.
pub fn write_magic<S: Read + Write>(
    stream: &mut WireStream<S>,
    config: &HandshakeConfig,
) -> Result<()> {
    stream.put_i32(config.magic);
    stream
        .flush()
        .map_err(|err| SessionError::from_wire(err, "sending magic number"))?;
    debug!(magic = %format_args!("0x{:08x}", config.magic), "sent magic number");
    Ok(())
}

/// Worker side: read the first four bytes and require the magic number.
pub fn read_magic<S: Read + Write>(
    stream: &mut WireStream<S>,
    config: &HandshakeConfig,
) -> Result<()> {
    let found = match stream.read_i32() {
        Ok(found) => found,
        Err(WireError::Io(err))
            if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
        {
            return Err(SessionError::Timeout(config.timeout.unwrap_or_default()));
        }
        Err(err) if err.is_disconnect() => {
            return Err(SessionError::Disconnected(
                "connection closed during handshake".to_string(),
            ));
        }
        Err(err) => return Err(SessionError::Wire(err)),
    };

    if found != config.magic {
        warn!(
            found = %format_args!("0x{found:08x}"),
            expected = %format_args!("0x{:08x}", config.magic),
            "rejecting controller: bad magic number"
        );
        return Err(SessionError::HandshakeFailed(format!(
            "bad magic number 0x{found:08x} (expected 0x{:08x})",
            config.magic
        )));
    }
    debug!("magic number accepted");
    Ok(())
}
