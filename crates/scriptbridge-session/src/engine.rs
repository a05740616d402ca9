use scriptbridge_wire::{TypeTag, Value};

use crate::callback::CallbackSignature;
use crate::error::EngineError;

/// A callable installed in the engine by `SetCallback`.
///
/// Arguments arrive already converted to the signature's parameter types.
/// Calling it performs a nested round-trip to the controller and returns the
/// callback's result, or [`Value::Void`] for a void callback.
pub type Callable = Box<dyn FnMut(Vec<Value>) -> Result<Value, EngineError>>;

/// The execution engine a worker delegates to.
///
/// Engine objects stay inside the engine; the worker only moves them out
/// through [`export`](ScriptEngine::export) once the controller has said which
/// wire type it wants.
pub trait ScriptEngine {
    /// An engine-side object.
    type Object;

    /// Evaluate one code segment.
    fn evaluate(&mut self, code: &str) -> Result<Self::Object, EngineError>;

    /// Bind a decoded value under `name`.
    fn bind(&mut self, name: &str, value: Value) -> Result<(), EngineError>;

    /// Look up the object bound under `name`.
    fn lookup(&mut self, name: &str) -> Result<Self::Object, EngineError>;

    /// Convert an object to a value of type `tag`.
    fn export(&mut self, object: &Self::Object, tag: TypeTag) -> Result<Value, EngineError>;

    /// Install `callable` under `name`.
    fn bind_callable(
        &mut self,
        name: &str,
        signature: &CallbackSignature,
        callable: Callable,
    ) -> Result<(), EngineError>;

    /// Take all console output produced since the last drain.
    fn drain_output(&mut self) -> String;

    /// Start redirecting rendered graphics into a `width` x `height` image.
    fn begin_capture(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        let _ = (width, height);
        Err(EngineError::Unsupported("graphics capture"))
    }

    /// Stop capturing and return the encoded image.
    fn end_capture(&mut self) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::Unsupported("graphics capture"))
    }
}
