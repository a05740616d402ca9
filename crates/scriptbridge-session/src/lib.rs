//! Controller and worker ends of a scriptbridge session.
//!
//! A session joins a controller process and a worker process over one
//! connected byte channel. The controller sends commands (run a script, move
//! a value in or out, install a callback, collect console output or a plot);
//! the worker executes each one against its [`ScriptEngine`] and answers with
//! exactly one terminal reply. While a script runs, the worker may call back
//! into the controller any number of times before that reply.
//!
//! Both ends are strictly sequential. Any failure that leaves the channel in
//! an unknown state poisons the session; only errors reported cleanly in a
//! terminal reply leave it usable (see [`SessionError::is_recoverable`]).

pub mod callback;
#[cfg(unix)]
pub mod connector;
pub mod controller;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod handshake;
#[cfg(unix)]
pub mod listener;
pub mod worker;

#[cfg(test)]
mod testing;

pub use callback::{CallbackId, CallbackSignature, Handler, HandlerError};
#[cfg(unix)]
pub use connector::{connect, connect_with_config};
pub use controller::Controller;
pub use engine::{Callable, ScriptEngine};
pub use error::{EngineError, Result, SessionError};
pub use exchange::{Exchange, ExchangeKind, ExchangeStack};
pub use handshake::{read_magic, write_magic, HandshakeConfig, MAGIC_NUMBER};
#[cfg(unix)]
pub use listener::WorkerListener;
pub use worker::{Flow, Worker, WorkerConfig, DEFAULT_SEGMENT_DELIMITER};
