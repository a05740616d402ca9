use crate::value::TypeTag;

/// Errors raised while encoding or decoding wire data.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// An I/O error occurred on the underlying channel.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the channel, possibly in the middle of a value.
    #[error("connection closed")]
    ConnectionClosed,

    /// A length or count prefix exceeds the configured bound.
    #[error("length prefix too large ({len}, max {max})")]
    LengthTooLarge { len: usize, max: usize },

    /// A string value is not valid UTF-8.
    #[error("string value is not valid UTF-8")]
    InvalidUtf8,

    /// A command tag byte outside the known set.
    #[error("unknown command tag 0x{0:02x}")]
    UnknownCommand(u8),

    /// A reply tag byte outside the known set.
    #[error("unknown reply tag 0x{0:02x}")]
    UnknownReply(u8),

    /// No encoding is registered for the type tag.
    #[error("type {0} is not registered")]
    UnregisteredType(TypeTag),

    /// A value does not match the type it is being encoded or read as.
    #[error("expected a value of type {expected}, found {found}")]
    TypeMismatch { expected: TypeTag, found: TypeTag },

    /// A registered codec rejected a value.
    #[error("codec for type {tag} failed: {message}")]
    Codec { tag: TypeTag, message: String },
}

impl WireError {
    /// True when the error came from the channel rather than from a value.
    pub fn is_disconnect(&self) -> bool {
        match self {
            WireError::ConnectionClosed => true,
            WireError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, WireError>;

/// Errors raised while building a [`TypeRegistry`](crate::TypeRegistry).
///
/// These are programming-contract violations in the integration layer and
/// are expected to abort startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The tag already has an encoding.
    #[error("type {0} is already registered")]
    Duplicate(TypeTag),

    /// Negative tags belong to the built-in primitives; 0 is void.
    #[error("type tag {0} is reserved for built-in types")]
    Reserved(TypeTag),
}
