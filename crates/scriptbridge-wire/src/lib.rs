//! Value codec and type registry for the scriptbridge wire protocol.
//!
//! Everything on the wire uses the host's native byte order and word size;
//! both ends of a session are expected to run on the same machine. A value
//! travels as its [`TypeTag`] followed by the encoding the [`TypeRegistry`]
//! selected for that tag:
//! - primitives (`int32`, `float32`) are a raw native copy
//! - strings are a `usize` length prefix followed by raw bytes
//! - sequences are a `usize` count followed by the concatenated elements
//! - registered types encode themselves
//!
//! There is no framing and no resynchronisation. A decoding error leaves the
//! stream position undefined, so callers treat every [`WireError`] raised
//! while reading as fatal to the connection.

pub mod codec;
pub mod config;
pub mod error;
pub mod registry;
pub mod stream;
pub mod tags;
pub mod value;

pub use codec::Source;
pub use config::WireConfig;
pub use error::{RegistryError, Result, WireError};
pub use registry::{Codec, Encoding, Primitive, SelfDescribing, TypeRegistry, TypeRegistryBuilder};
pub use stream::WireStream;
pub use tags::{Command, ReplyKind};
pub use value::{CustomValue, TypeTag, Value, WireValue};
