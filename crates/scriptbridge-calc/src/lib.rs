//! A small vector calculator implementing [`ScriptEngine`].
//!
//! It gives a worker something real to run without embedding a full language
//! runtime: integer and double scalars and vectors, strings, arithmetic with
//! element-wise broadcasting, a handful of builtins (`c`, `print`, `paste`,
//! `length`, `stop`, `plot`) and host functions installed by controller
//! callbacks. `plot()` draws into a canvas opened by graphics capture, which
//! is returned as a binary PPM image.
//!
//! [`ScriptEngine`]: scriptbridge_session::ScriptEngine

pub mod canvas;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod object;
pub mod parser;

pub use canvas::Canvas;
pub use engine::CalcEngine;
pub use error::{CalcError, Result};
pub use object::Object;
