use std::collections::HashMap;

use scriptbridge_session::{Callable, CallbackSignature, EngineError, ScriptEngine};
use scriptbridge_wire::{TypeTag, Value};
use tracing::{debug, trace};

use crate::canvas::Canvas;
use crate::error::{CalcError, Result};
use crate::object::Object;
use crate::parser::{parse, Expr, Stmt};

const BUILTINS: [&str; 6] = ["c", "print", "paste", "length", "stop", "plot"];

struct HostFunction {
    signature: CallbackSignature,
    callable: Callable,
}

/// A small vector calculator usable as a worker's execution engine.
///
/// Programs are statements separated by newlines or `;`. A statement is an
/// assignment (`x <- expr` or `x = expr`) or a bare expression, and the value
/// of a program is the value of its last statement.
#[derive(Default)]
pub struct CalcEngine {
    vars: HashMap<String, Object>,
    host: HashMap<String, HostFunction>,
    console: String,
    canvas: Option<Canvas>,
}

impl CalcEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and run `src`.
    pub fn eval_str(&mut self, src: &str) -> Result<Object> {
        let program = parse(src)?;
        trace!(statements = program.len(), "evaluating program");
        let mut last = Object::Null;
        for stmt in &program {
            last = match stmt {
                Stmt::Assign { name, value } => {
                    let value = self.eval(value)?;
                    self.vars.insert(name.clone(), value.clone());
                    value
                }
                Stmt::Expr(expr) => self.eval(expr)?,
            };
        }
        Ok(last)
    }

    pub fn get(&self, name: &str) -> Option<&Object> {
        self.vars.get(name)
    }

    pub fn console(&self) -> &str {
        &self.console
    }

    pub fn is_capturing(&self) -> bool {
        self.canvas.is_some()
    }

    fn eval(&mut self, expr: &Expr) -> Result<Object> {
        match expr {
            Expr::Int(v) => Ok(Object::Int(*v)),
            Expr::Float(v) => Ok(Object::Float(*v)),
            Expr::Str(s) => Ok(Object::Str(s.clone())),
            Expr::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| CalcError::Undefined(name.clone())),
            Expr::Neg(inner) => self.eval(inner)?.negate(),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                lhs.binary(*op, &rhs)
            }
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                self.call(name, args)
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Object>) -> Result<Object> {
        if let Some(function) = self.host.get_mut(name) {
            return call_host(name, function, args);
        }
        match name {
            "c" => combine(args),
            "print" => {
                let [arg] = exactly::<1>(name, args)?;
                self.console.push_str(&arg.to_string());
                self.console.push('\n');
                Ok(arg)
            }
            "paste" => Ok(Object::Str(
                args.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" "),
            )),
            "length" => {
                let [arg] = exactly::<1>(name, args)?;
                i32::try_from(arg.len())
                    .map(Object::Int)
                    .map_err(|_| CalcError::Arithmetic("integer overflow"))
            }
            "stop" => {
                let message = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("");
                Err(CalcError::Stopped(message))
            }
            "plot" => {
                let [arg] = exactly::<1>(name, args)?;
                let values = arg.as_floats()?;
                let canvas = self
                    .canvas
                    .as_mut()
                    .ok_or_else(|| CalcError::Graphics("no capture in progress".to_string()))?;
                canvas.plot(&values);
                Ok(Object::Null)
            }
            _ => Err(CalcError::UnknownFunction(name.to_string())),
        }
    }
}

fn exactly<const N: usize>(name: &str, args: Vec<Object>) -> Result<[Object; N]> {
    let found = args.len();
    args.try_into().map_err(|_| CalcError::Arity {
        name: name.to_string(),
        expected: N,
        found,
    })
}

/// `c(...)`: concatenate numbers into one vector. NULL arguments vanish.
fn combine(args: Vec<Object>) -> Result<Object> {
    let mut ints = Vec::new();
    let mut floats: Option<Vec<f32>> = None;
    for arg in args {
        match (&mut floats, arg) {
            (_, Object::Null) => {}
            (None, Object::Int(v)) => ints.push(v),
            (None, Object::Ints(v)) => ints.extend(v),
            (Some(out), Object::Int(v)) => out.push(v as f32),
            (Some(out), Object::Ints(v)) => out.extend(v.into_iter().map(|x| x as f32)),
            (slot, arg @ (Object::Float(_) | Object::Floats(_))) => {
                let out = slot.get_or_insert_with(|| ints.drain(..).map(|x| x as f32).collect());
                match arg {
                    Object::Float(v) => out.push(v),
                    Object::Floats(v) => out.extend(v),
                    _ => {}
                }
            }
            (_, other) => {
                return Err(CalcError::Type(format!(
                    "c() only combines numbers, got {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(match floats {
        Some(v) => Object::Floats(v),
        None => Object::Ints(ints),
    })
}

fn call_host(name: &str, function: &mut HostFunction, args: Vec<Object>) -> Result<Object> {
    let [expected, found] = [function.signature.arity(), args.len()];
    if expected != found {
        return Err(CalcError::Arity {
            name: name.to_string(),
            expected,
            found,
        });
    }
    let values = args
        .iter()
        .zip(&function.signature.params)
        .map(|(arg, tag)| arg.export(*tag))
        .collect::<Result<Vec<_>>>()?;
    debug!(function = name, "calling host function");
    let result = (function.callable)(values).map_err(CalcError::Host)?;
    Ok(Object::from_value(result))
}

impl ScriptEngine for CalcEngine {
    type Object = Object;

    fn evaluate(&mut self, code: &str) -> std::result::Result<Object, EngineError> {
        Ok(self.eval_str(code)?)
    }

    fn bind(&mut self, name: &str, value: Value) -> std::result::Result<(), EngineError> {
        self.vars.insert(name.to_string(), Object::from_value(value));
        Ok(())
    }

    fn lookup(&mut self, name: &str) -> std::result::Result<Object, EngineError> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    fn export(&mut self, object: &Object, tag: TypeTag) -> std::result::Result<Value, EngineError> {
        object.export(tag).map_err(|_| EngineError::Conversion {
            expected: tag,
            found: object.type_name(),
        })
    }

    fn bind_callable(
        &mut self,
        name: &str,
        signature: &CallbackSignature,
        callable: Callable,
    ) -> std::result::Result<(), EngineError> {
        if BUILTINS.contains(&name) {
            debug!(function = name, "host function shadows builtin");
        }
        self.host.insert(
            name.to_string(),
            HostFunction {
                signature: signature.clone(),
                callable,
            },
        );
        Ok(())
    }

    fn drain_output(&mut self) -> String {
        std::mem::take(&mut self.console)
    }

    fn begin_capture(&mut self, width: u32, height: u32) -> std::result::Result<(), EngineError> {
        self.canvas = Some(Canvas::new(width, height)?);
        debug!(width, height, "graphics capture started");
        Ok(())
    }

    fn end_capture(&mut self) -> std::result::Result<Vec<u8>, EngineError> {
        let canvas = self
            .canvas
            .take()
            .ok_or_else(|| CalcError::Graphics("no capture in progress".to_string()))?;
        Ok(canvas.to_ppm())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn eval(engine: &mut CalcEngine, src: &str) -> Object {
        engine.eval_str(src).unwrap()
    }

    #[test]
    fn last_statement_is_the_value() {
        let mut engine = CalcEngine::new();
        assert_eq!(eval(&mut engine, "x <- 2; y = x * 3\ny + 1"), Object::Int(7));
        assert_eq!(eval(&mut engine, "z <- 1.5"), Object::Float(1.5));
        assert_eq!(eval(&mut engine, ""), Object::Null);
        assert_eq!(engine.get("y"), Some(&Object::Int(6)));
    }

    #[test]
    fn builtins() {
        let mut engine = CalcEngine::new();
        assert_eq!(
            eval(&mut engine, "c(1, c(2, 3), 4)"),
            Object::Ints(vec![1, 2, 3, 4])
        );
        assert_eq!(
            eval(&mut engine, "c(1, 2.5, c(3, 4))"),
            Object::Floats(vec![1.0, 2.5, 3.0, 4.0])
        );
        assert_eq!(eval(&mut engine, "length(c(1, 2, 3))"), Object::Int(3));
        assert_eq!(
            eval(&mut engine, "paste('n =', 2 + 2)"),
            Object::Str("n = 4".into())
        );
        assert_eq!(eval(&mut engine, "c()"), Object::Ints(Vec::new()));
    }

    #[test]
    fn stop_and_unknown_names_fail() {
        let mut engine = CalcEngine::new();
        assert_eq!(
            engine.eval_str("stop('bad ', 1)").unwrap_err(),
            CalcError::Stopped("bad 1".into())
        );
        assert_eq!(
            engine.eval_str("nope + 1").unwrap_err(),
            CalcError::Undefined("nope".into())
        );
        assert_eq!(
            engine.eval_str("nope(1)").unwrap_err(),
            CalcError::UnknownFunction("nope".into())
        );
        assert!(matches!(
            engine.eval_str("length(1, 2)").unwrap_err(),
            CalcError::Arity { expected: 1, found: 2, .. }
        ));
        assert!(matches!(
            engine.eval_str("c('a')").unwrap_err(),
            CalcError::Type(_)
        ));
    }

    #[test]
    fn print_collects_console_output() {
        let mut engine = CalcEngine::new();
        eval(&mut engine, "print(c(1, 2))\nprint('done')");
        assert_eq!(engine.drain_output(), "1 2\ndone\n");
        assert_eq!(engine.drain_output(), "");
    }

    #[test]
    fn bind_lookup_export() {
        let mut engine = CalcEngine::new();
        engine.bind("v", Value::IntVec(vec![1, 2])).unwrap();
        let doubled = engine.evaluate("v * 2").unwrap();
        assert_eq!(
            engine.export(&doubled, TypeTag::FLOAT32_VEC).unwrap(),
            Value::FloatVec(vec![2.0, 4.0])
        );
        let v = engine.lookup("v").unwrap();
        assert_eq!(
            engine.export(&v, TypeTag::STRING).unwrap_err(),
            EngineError::Conversion {
                expected: TypeTag::STRING,
                found: "integer vector".into(),
            }
        );
        assert_eq!(
            engine.lookup("w").unwrap_err(),
            EngineError::NotFound("w".into())
        );
    }

    #[test]
    fn host_functions_get_converted_arguments() {
        let mut engine = CalcEngine::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let record = Rc::clone(&seen);
        engine
            .bind_callable(
                "scale",
                &CallbackSignature::new(TypeTag::FLOAT32, [TypeTag::FLOAT32, TypeTag::INT32_VEC]),
                Box::new(move |args: Vec<Value>| -> std::result::Result<Value, EngineError> {
                    record.borrow_mut().push(args.clone());
                    match args.as_slice() {
                        [Value::Float(f), Value::IntVec(v)] => Ok(Value::Float(f * v.len() as f32)),
                        _ => Err(EngineError::Callback("bad args".into())),
                    }
                }),
            )
            .unwrap();

        assert_eq!(eval(&mut engine, "scale(2, 7) + 1"), Object::Float(3.0));
        assert_eq!(
            seen.borrow()[0],
            vec![Value::Float(2.0), Value::IntVec(vec![7])]
        );
        assert!(matches!(
            engine.eval_str("scale(1)").unwrap_err(),
            CalcError::Arity { expected: 2, found: 1, .. }
        ));
        assert!(matches!(
            engine.eval_str("scale('x', 1)").unwrap_err(),
            CalcError::Type(_)
        ));
    }

    #[test]
    fn host_failure_passes_through() {
        let mut engine = CalcEngine::new();
        engine
            .bind_callable(
                "fail",
                &CallbackSignature::new(TypeTag::VOID, Vec::new()),
                Box::new(|_: Vec<Value>| -> std::result::Result<Value, EngineError> {
                    Err(EngineError::Callback("denied".into()))
                }),
            )
            .unwrap();
        assert_eq!(
            engine.evaluate("fail()").unwrap_err(),
            EngineError::Callback("denied".into())
        );
    }

    #[test]
    fn plot_requires_capture() {
        let mut engine = CalcEngine::new();
        assert!(matches!(
            engine.eval_str("plot(c(1, 2))").unwrap_err(),
            CalcError::Graphics(_)
        ));
        assert!(engine.end_capture().is_err());

        engine.begin_capture(16, 8).unwrap();
        assert!(engine.is_capturing());
        eval(&mut engine, "plot(c(1, 4, 9))");
        let image = engine.end_capture().unwrap();
        assert!(image.starts_with(b"P6\n16 8\n255\n"));
        assert!(!engine.is_capturing());
        assert!(engine.begin_capture(0, 8).is_err());
    }
}
