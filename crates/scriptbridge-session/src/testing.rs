//! Minimal engine used by this crate's unit tests.
//!
//! One statement per segment:
//! - `name = <literal>` binds
//! - `call <name> <int>...` invokes a callable
//! - `try <statement>` swallows any error
//! - `print: <text>` appends a line to the console
//! - `fail: <message>` raises
//! - an integer, a double-quoted string, or a bound name evaluates to itself

use std::collections::HashMap;

use scriptbridge_wire::{TypeTag, Value};

use crate::callback::CallbackSignature;
use crate::engine::{Callable, ScriptEngine};
use crate::error::EngineError;

#[derive(Default)]
pub(crate) struct TestEngine {
    vars: HashMap<String, Value>,
    callables: HashMap<String, Callable>,
    output: String,
    canvas: Option<(u32, u32)>,
    pub(crate) evaluated: Vec<String>,
}

impl TestEngine {
    fn literal(&self, text: &str) -> Result<Value, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Value::Void);
        }
        if let Ok(v) = text.parse::<i32>() {
            return Ok(Value::Int(v));
        }
        if let Some(s) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            return Ok(Value::Str(s.to_string()));
        }
        self.vars
            .get(text)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(text.to_string()))
    }

    fn statement(&mut self, code: &str) -> Result<Value, EngineError> {
        let code = code.trim();
        if let Some(rest) = code.strip_prefix("try ") {
            return Ok(self.statement(rest).unwrap_or(Value::Void));
        }
        if let Some(message) = code.strip_prefix("fail:") {
            return Err(EngineError::Eval(message.trim().to_string()));
        }
        if let Some(text) = code.strip_prefix("print:") {
            self.output.push_str(text.trim());
            self.output.push('\n');
            return Ok(Value::Void);
        }
        if let Some(rest) = code.strip_prefix("call ") {
            let mut words = rest.split_whitespace();
            let name = words.next().unwrap_or_default().to_string();
            let args = words
                .map(|w| self.literal(w))
                .collect::<Result<Vec<_>, _>>()?;
            let callable = self
                .callables
                .get_mut(&name)
                .ok_or(EngineError::NotFound(name))?;
            return callable(args);
        }
        if let Some((name, expr)) = code.split_once('=') {
            let value = self.literal(expr)?;
            self.vars.insert(name.trim().to_string(), value.clone());
            return Ok(value);
        }
        self.literal(code)
    }
}

impl ScriptEngine for TestEngine {
    type Object = Value;

    fn evaluate(&mut self, code: &str) -> Result<Value, EngineError> {
        self.evaluated.push(code.to_string());
        self.statement(code)
    }

    fn bind(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        self.vars.insert(name.to_string(), value);
        Ok(())
    }

    fn lookup(&mut self, name: &str) -> Result<Value, EngineError> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    fn export(&mut self, object: &Value, tag: TypeTag) -> Result<Value, EngineError> {
        match (object, tag) {
            (value, tag) if value.type_tag() == tag => Ok(value.clone()),
            (Value::Int(v), TypeTag::FLOAT32) => Ok(Value::Float(*v as f32)),
            (value, tag) => Err(EngineError::Conversion {
                expected: tag,
                found: value.type_tag().to_string(),
            }),
        }
    }

    fn bind_callable(
        &mut self,
        name: &str,
        _signature: &CallbackSignature,
        callable: Callable,
    ) -> Result<(), EngineError> {
        self.callables.insert(name.to_string(), callable);
        Ok(())
    }

    fn drain_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    fn begin_capture(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        self.canvas = Some((width, height));
        Ok(())
    }

    fn end_capture(&mut self) -> Result<Vec<u8>, EngineError> {
        let (w, h) = self
            .canvas
            .take()
            .ok_or_else(|| EngineError::Eval("no capture in progress".to_string()))?;
        Ok(format!("{w}x{h}").into_bytes())
    }
}
