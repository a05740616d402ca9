use std::time::Duration;

/// Default bound on a decoded string or byte string: 64 MiB.
pub const DEFAULT_MAX_STRING_LEN: usize = 64 * 1024 * 1024;

/// Default bound on a decoded sequence: 16 Mi elements.
pub const DEFAULT_MAX_SEQUENCE_LEN: usize = 16 * 1024 * 1024;

/// Limits and timeouts for a [`WireStream`](crate::WireStream).
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Largest string or byte string accepted from the peer.
    pub max_string_len: usize,
    /// Largest element count accepted for a sequence.
    pub max_sequence_len: usize,
    /// Read timeout for blocking operations. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_sequence_len: DEFAULT_MAX_SEQUENCE_LEN,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
