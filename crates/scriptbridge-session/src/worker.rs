use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::sync::Arc;

use scriptbridge_wire::{Command, ReplyKind, TypeRegistry, TypeTag, Value, WireStream};
use tracing::{debug, info, warn};

use crate::callback::{CallbackId, CallbackSignature};
use crate::engine::{Callable, ScriptEngine};
use crate::error::{EngineError, Result, SessionError};
use crate::exchange::{ExchangeKind, ExchangeStack};
use crate::handshake::{read_magic, HandshakeConfig};

/// Default separator between evaluation segments of a script.
pub const DEFAULT_SEGMENT_DELIMITER: &str = "\n\n";

/// How the worker prepares scripts for evaluation.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Scripts are split on this delimiter; every segment but the last is
    /// evaluated for effect only.
    pub segment_delimiter: String,
    /// Rewrite `\r\n` as `\n` before splitting.
    pub normalize_line_endings: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            segment_delimiter: DEFAULT_SEGMENT_DELIMITER.to_string(),
            normalize_line_endings: true,
        }
    }
}

impl WorkerConfig {
    pub fn with_segment_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.segment_delimiter = delimiter.into();
        self
    }

    pub fn with_normalize_line_endings(mut self, normalize: bool) -> Self {
        self.normalize_line_endings = normalize;
        self
    }

    /// Split `code` into evaluation segments. Always yields at least one.
    pub fn split_segments(&self, code: &str) -> Vec<String> {
        let code = if self.normalize_line_endings {
            code.replace("\r\n", "\n")
        } else {
            code.to_string()
        };
        if self.segment_delimiter.is_empty() {
            return vec![code];
        }
        code.split(self.segment_delimiter.as_str())
            .map(str::to_string)
            .collect()
    }
}

/// Result of serving one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// The channel half of a worker, shared with the callable stubs installed in
/// the engine so they can run nested callback round-trips.
struct Link<S> {
    stream: WireStream<S>,
    exchanges: ExchangeStack,
    /// Set once a command's input is fully read; cleared by its terminal reply.
    may_send: bool,
    /// A fatal error raised inside a callback stub while the engine was running.
    failure: Option<SessionError>,
}

impl<S: Read + Write> Link<S> {
    fn read<T>(
        &mut self,
        context: &str,
        f: impl FnOnce(&mut WireStream<S>) -> scriptbridge_wire::Result<T>,
    ) -> Result<T> {
        f(&mut self.stream).map_err(|err| SessionError::from_wire(err, context))
    }

    fn read_command(&mut self) -> Result<Command> {
        if self.may_send {
            return Err(SessionError::Contract(
                "next command read before the previous one was answered".to_string(),
            ));
        }
        let command = self.read("awaiting command", |w| w.read_command())?;
        self.exchanges.open_command(command)?;
        Ok(command)
    }

    fn input_consumed(&mut self) {
        self.may_send = true;
    }

    fn begin_reply(&self, kind: ReplyKind) -> Result<()> {
        if !self.may_send {
            return Err(SessionError::Contract(format!(
                "{kind} reply sent while no command is awaiting one"
            )));
        }
        Ok(())
    }

    fn finish_reply(&mut self) -> Result<()> {
        self.stream
            .flush()
            .map_err(|err| SessionError::from_wire(err, "sending reply"))?;
        self.may_send = false;
        let command = self
            .exchanges
            .command()
            .ok_or_else(|| SessionError::Contract("reply sent with no command open".to_string()))?;
        self.exchanges.close(ExchangeKind::Command(command))?;
        Ok(())
    }

    fn reply_ok(&mut self) -> Result<()> {
        self.begin_reply(ReplyKind::Ok)?;
        self.stream.put_reply_kind(ReplyKind::Ok);
        self.finish_reply()
    }

    fn reply_error(&mut self, message: &str) -> Result<()> {
        self.begin_reply(ReplyKind::Error)?;
        self.stream.put_reply_kind(ReplyKind::Error);
        self.stream.put_str(message);
        self.finish_reply()
    }

    fn reply_value(&mut self, value: &Value) -> Result<()> {
        self.begin_reply(ReplyKind::Value)?;
        self.stream.put_reply_kind(ReplyKind::Value);
        if let Err(err) = self.stream.put_value(value) {
            self.stream.discard();
            warn!(error = %err, "reply value could not be encoded");
            return self.reply_error(&err.to_string());
        }
        self.finish_reply()
    }

    /// A `Value` reply carrying a bare byte string with no type tag.
    fn reply_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.begin_reply(ReplyKind::Value)?;
        self.stream.put_reply_kind(ReplyKind::Value);
        self.stream.put_bytes(bytes);
        self.finish_reply()
    }

    fn invoke_callback(
        &mut self,
        id: CallbackId,
        signature: &CallbackSignature,
        args: Vec<Value>,
    ) -> std::result::Result<Value, EngineError> {
        if let Some(err) = &self.failure {
            return Err(EngineError::Callback(format!("session already failed: {err}")));
        }
        if !self.may_send || !self.exchanges.accepts_callback() {
            return Err(EngineError::Callback(format!(
                "callback {id} can only be invoked while a script is running"
            )));
        }
        if args.len() != signature.arity() {
            return Err(EngineError::Callback(format!(
                "callback {id} takes {} arguments, got {}",
                signature.arity(),
                args.len()
            )));
        }
        for (arg, tag) in args.iter().zip(&signature.params) {
            if arg.type_tag() != *tag {
                return Err(EngineError::Conversion {
                    expected: *tag,
                    found: arg.type_tag().to_string(),
                });
            }
        }

        self.stream.put_reply_kind(ReplyKind::CallbackInvoke);
        self.stream.put_u32(id.0);
        for arg in &args {
            if let Err(err) = self.stream.put_value(arg) {
                self.stream.discard();
                return Err(EngineError::Callback(err.to_string()));
            }
        }
        if let Err(err) = self.exchanges.open_callback(id) {
            self.stream.discard();
            return Err(self.poison(err));
        }
        debug!(id = id.0, args = args.len(), "invoking controller callback");

        match self.round_trip(id, signature) {
            Ok(value) => Ok(value),
            Err(SessionError::Remote(message)) => Err(EngineError::Callback(message)),
            Err(err) => Err(self.poison(err)),
        }
    }

    fn round_trip(&mut self, id: CallbackId, signature: &CallbackSignature) -> Result<Value> {
        self.stream
            .flush()
            .map_err(|err| SessionError::from_wire(err, "invoking callback"))?;
        let kind = self.read("awaiting callback reply", |w| w.read_reply_kind())?;
        let value = match kind {
            ReplyKind::Ok if !signature.returns_value() => Value::Void,
            ReplyKind::Value if signature.returns_value() => {
                let tag = signature.result;
                self.read("reading callback result", |w| w.read_value_of(tag))?
            }
            ReplyKind::Error => {
                let message = self.read("reading callback error", |w| w.read_string())?;
                self.exchanges.close(ExchangeKind::Callback(id))?;
                return Err(SessionError::Remote(message));
            }
            other => {
                return Err(SessionError::Protocol(format!(
                    "unexpected {other} reply to callback {id}"
                )))
            }
        };
        self.exchanges.close(ExchangeKind::Callback(id))?;
        Ok(value)
    }

    fn poison(&mut self, err: SessionError) -> EngineError {
        warn!(error = %err, "callback round-trip failed");
        let reported = EngineError::Callback(err.to_string());
        self.failure.get_or_insert(err);
        reported
    }
}

fn callback_stub<S>(
    link: Rc<RefCell<Link<S>>>,
    id: CallbackId,
    signature: CallbackSignature,
) -> Callable
where
    S: Read + Write + 'static,
{
    Box::new(
        move |args: Vec<Value>| -> std::result::Result<Value, EngineError> {
            let mut guard = link.try_borrow_mut().map_err(|_| {
                EngineError::Callback(format!(
                    "callback {id} invoked while the channel is in use"
                ))
            })?;
            guard.invoke_callback(id, &signature, args)
        },
    )
}

/// The worker side of a session: the command dispatch loop.
///
/// Reads one command at a time, runs it against the engine and answers it.
/// Engine failures become error replies and the loop continues; protocol and
/// I/O failures end the loop with an error.
pub struct Worker<E, S> {
    engine: E,
    link: Rc<RefCell<Link<S>>>,
    registry: Arc<TypeRegistry>,
    config: WorkerConfig,
}

impl<E, S> Worker<E, S>
where
    E: ScriptEngine,
    S: Read + Write + 'static,
{
    /// Accept a session on a connected channel: read and check the magic number.
    pub fn new(engine: E, stream: S, registry: Arc<TypeRegistry>) -> Result<Self> {
        Self::from_wire(
            engine,
            WireStream::new(stream, registry),
            &HandshakeConfig::default(),
            WorkerConfig::default(),
        )
    }

    pub fn from_wire(
        engine: E,
        mut stream: WireStream<S>,
        handshake_config: &HandshakeConfig,
        config: WorkerConfig,
    ) -> Result<Self> {
        read_magic(&mut stream, handshake_config)?;
        let registry = Arc::clone(stream.registry());
        Ok(Self {
            engine,
            link: Rc::new(RefCell::new(Link {
                stream,
                exchanges: ExchangeStack::new(),
                may_send: false,
                failure: None,
            })),
            registry,
            config,
        })
    }

    /// Replace the segmenting rules used for `RunScript`.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Serve commands until `Exit` or a fatal error.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.serve_next() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => return Ok(()),
                Err(err) => {
                    warn!(error = %err, "worker session ended");
                    return Err(err);
                }
            }
        }
    }

    /// Read, execute and answer exactly one command.
    ///
    /// After an error the worker must not be used again.
    pub fn serve_next(&mut self) -> Result<Flow> {
        let command = self.link.borrow_mut().read_command()?;
        debug!(%command, "dispatching command");
        match command {
            Command::Exit => {
                self.link
                    .borrow_mut()
                    .exchanges
                    .close(ExchangeKind::Command(Command::Exit))?;
                info!("controller requested exit");
                return Ok(Flow::Exit);
            }
            Command::RunScript => self.run_script()?,
            Command::SetValue => self.set_value()?,
            Command::GetValue => self.get_value()?,
            Command::SetCallback => self.set_callback()?,
            Command::GetConsoleOutput => self.console_output()?,
            Command::InitPlot => self.init_plot()?,
            Command::GetPlot => self.get_plot()?,
        }
        Ok(Flow::Continue)
    }

    fn run_script(&mut self) -> Result<()> {
        let (code, result) = {
            let mut link = self.link.borrow_mut();
            let code = link.read("reading script", |w| w.read_string())?;
            let result = link.read("reading result type", |w| w.read_type_tag())?;
            link.input_consumed();
            (code, result)
        };

        let outcome = self.evaluate(&code);
        if let Some(err) = self.link.borrow_mut().failure.take() {
            return Err(err);
        }

        let answer = match outcome {
            Err(err) => Err(err.to_string()),
            Ok(_) if result.is_void() => Ok(None),
            Ok(object) => self.export(&object, result).map(Some),
        };
        self.answer(answer)
    }

    fn evaluate(&mut self, code: &str) -> std::result::Result<E::Object, EngineError> {
        let segments = self.config.split_segments(code);
        let Some((last, effects)) = segments.split_last() else {
            return self.engine.evaluate("");
        };
        for segment in effects {
            self.engine.evaluate(segment)?;
            if self.link.borrow().failure.is_some() {
                return Err(EngineError::Callback("session failed".to_string()));
            }
        }
        self.engine.evaluate(last)
    }

    fn export(&mut self, object: &E::Object, tag: TypeTag) -> std::result::Result<Value, String> {
        if !self.registry.contains(tag) {
            return Err(format!("type {tag} is not registered"));
        }
        let value = self
            .engine
            .export(object, tag)
            .map_err(|err| err.to_string())?;
        if value.type_tag() != tag {
            return Err(format!(
                "engine exported {} when {tag} was requested",
                value.type_tag()
            ));
        }
        Ok(value)
    }

    fn answer(&mut self, answer: std::result::Result<Option<Value>, String>) -> Result<()> {
        let mut link = self.link.borrow_mut();
        match answer {
            Ok(None) => link.reply_ok(),
            Ok(Some(value)) => link.reply_value(&value),
            Err(message) => {
                debug!(%message, "command failed");
                link.reply_error(&message)
            }
        }
    }

    fn set_value(&mut self) -> Result<()> {
        let (name, value) = {
            let mut link = self.link.borrow_mut();
            let name = link.read("reading name", |w| w.read_string())?;
            let value = link.read("reading value", |w| w.read_value())?;
            link.input_consumed();
            (name, value)
        };
        let answer = self
            .engine
            .bind(&name, value)
            .map(|()| None)
            .map_err(|err| err.to_string());
        self.answer(answer)
    }

    fn get_value(&mut self) -> Result<()> {
        let (name, tag) = {
            let mut link = self.link.borrow_mut();
            let name = link.read("reading name", |w| w.read_string())?;
            let tag = link.read("reading type", |w| w.read_type_tag())?;
            link.input_consumed();
            (name, tag)
        };
        let answer = match self.engine.lookup(&name) {
            Ok(object) => self.export(&object, tag).map(Some),
            Err(err) => Err(err.to_string()),
        };
        self.answer(answer)
    }

    fn set_callback(&mut self) -> Result<()> {
        let (name, id, signature) = {
            let mut link = self.link.borrow_mut();
            let name = link.read("reading name", |w| w.read_string())?;
            let id = CallbackId(link.read("reading callback id", |w| w.read_u32())?);
            let result = TypeTag(link.read("reading result type", |w| w.read_u32())? as i32);
            let count = link.read("reading parameter count", |w| w.read_count())?;
            let mut params = Vec::with_capacity(count);
            for _ in 0..count {
                params.push(link.read("reading parameter type", |w| w.read_type_tag())?);
            }
            link.input_consumed();
            (name, id, CallbackSignature::new(result, params))
        };

        let answer = match signature.validate(&self.registry) {
            Err(err) => Err(err.to_string()),
            Ok(()) => {
                let stub = callback_stub(Rc::clone(&self.link), id, signature.clone());
                self.engine
                    .bind_callable(&name, &signature, stub)
                    .map(|()| None)
                    .map_err(|err| err.to_string())
            }
        };
        if answer.is_ok() {
            debug!(%name, id = id.0, params = signature.arity(), "callback bound");
        }
        self.answer(answer)
    }

    fn console_output(&mut self) -> Result<()> {
        self.link.borrow_mut().input_consumed();
        let text = self.engine.drain_output();
        self.link.borrow_mut().reply_bytes(text.as_bytes())
    }

    fn init_plot(&mut self) -> Result<()> {
        let (width, height) = {
            let mut link = self.link.borrow_mut();
            let width = link.read("reading plot width", |w| w.read_u32())?;
            let height = link.read("reading plot height", |w| w.read_u32())?;
            link.input_consumed();
            (width, height)
        };
        let answer = self
            .engine
            .begin_capture(width, height)
            .map(|()| None)
            .map_err(|err| err.to_string());
        self.answer(answer)
    }

    fn get_plot(&mut self) -> Result<()> {
        self.link.borrow_mut().input_consumed();
        let image = self.engine.end_capture();
        let mut link = self.link.borrow_mut();
        match image {
            Ok(bytes) => link.reply_bytes(&bytes),
            Err(err) => link.reply_error(&err.to_string()),
        }
    }
}
