use scriptbridge_wire::{TypeTag, WireError};

use crate::callback::CallbackId;

/// Errors that can occur in session operations.
///
/// Only [`Remote`](SessionError::Remote), [`Engine`](SessionError::Engine)
/// and [`InvalidValue`](SessionError::InvalidValue) leave the session usable;
/// see [`SessionError::is_recoverable`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] scriptbridge_transport::TransportError),

    /// Wire-level error while reading or writing the channel.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// The worker answered the command with an error reply.
    #[error("remote error: {0}")]
    Remote(String),

    /// A value was rejected before anything was written to the channel.
    #[error("invalid value: {0}")]
    InvalidValue(WireError),

    /// A command was issued while the session could not send one.
    #[error("contract violation: {0}")]
    Contract(String),

    /// The peer broke the command/reply discipline.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A controller-side callback handler failed during a callback round-trip.
    #[error("callback {id} failed: {message}")]
    CallbackFailed { id: CallbackId, message: String },

    /// The local execution engine failed.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl SessionError {
    /// True when the session stays ready for the next command.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::Remote(_) | SessionError::Engine(_) | SessionError::InvalidValue(_)
        )
    }

    /// True when the error came from the channel going away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            SessionError::Disconnected(_) => true,
            SessionError::Wire(err) => err.is_disconnect(),
            _ => false,
        }
    }

    /// Fold a channel-level wire error into [`SessionError::Disconnected`].
    pub(crate) fn from_wire(err: WireError, context: &str) -> Self {
        if err.is_disconnect() {
            SessionError::Disconnected(format!("{context}: {err}"))
        } else {
            SessionError::Wire(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures raised by a [`ScriptEngine`](crate::ScriptEngine).
///
/// All of them are local to one command; the worker reports them to the
/// controller as an error reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Evaluation raised an error.
    #[error("{0}")]
    Eval(String),

    /// A name is not bound.
    #[error("object '{0}' not found")]
    NotFound(String),

    /// An object cannot be represented as the requested type.
    #[error("cannot convert {found} to {expected}")]
    Conversion { expected: TypeTag, found: String },

    /// The engine does not implement an optional capability.
    #[error("{0} is not supported by this engine")]
    Unsupported(&'static str),

    /// A callback round-trip into the controller failed.
    #[error("callback failed: {0}")]
    Callback(String),
}
