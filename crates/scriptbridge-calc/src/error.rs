use scriptbridge_session::EngineError;

/// Errors raised while parsing or evaluating a calc program.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    /// The program could not be parsed.
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// A name was read before anything was bound to it.
    #[error("object '{0}' not found")]
    Undefined(String),

    /// A call named neither a builtin nor an installed callable.
    #[error("could not find function \"{0}\"")]
    UnknownFunction(String),

    /// A function was called with the wrong number of arguments.
    #[error("{name}() takes {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    /// An operand or argument has the wrong type.
    #[error("{0}")]
    Type(String),

    /// Integer division by zero or overflow.
    #[error("arithmetic error: {0}")]
    Arithmetic(&'static str),

    /// `stop(msg)` was called.
    #[error("{0}")]
    Stopped(String),

    /// Graphics capture failed.
    #[error("graphics error: {0}")]
    Graphics(String),

    /// A host callable failed.
    #[error(transparent)]
    Host(EngineError),
}

pub type Result<T> = std::result::Result<T, CalcError>;

impl From<CalcError> for EngineError {
    fn from(err: CalcError) -> Self {
        match err {
            CalcError::Undefined(name) => EngineError::NotFound(name),
            CalcError::Host(inner) => inner,
            other => EngineError::Eval(other.to_string()),
        }
    }
}
