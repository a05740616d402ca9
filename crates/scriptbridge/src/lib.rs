//! Run scripts in a separate worker process and exchange typed values with it.
//!
//! A controller drives a worker over one connected byte channel: it runs
//! code, moves typed values in and out, installs callbacks the worker's
//! scripts can call back into, and collects console output and plots.
//!
//! # Crate Structure
//!
//! - [`transport`]: connected byte channels (socket pairs, Unix sockets)
//! - [`wire`]: value codec, type registry and command/reply tags
//! - [`session`]: controller and worker session state machines
//! - [`calc`]: a small reference engine for workers (behind `calc` feature)

/// Re-export transport types.
pub mod transport {
    pub use scriptbridge_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use scriptbridge_wire::*;
}

/// Re-export session types.
pub mod session {
    pub use scriptbridge_session::*;
}

/// Re-export the reference engine (requires `calc` feature).
#[cfg(feature = "calc")]
pub mod calc {
    pub use scriptbridge_calc::*;
}
