use std::io::{Read, Write};
use std::sync::Arc;

use scriptbridge_wire::{
    Command, ReplyKind, TypeRegistry, TypeTag, Value, WireConfig, WireError, WireStream,
    WireValue,
};
use tracing::{debug, trace, warn};

use crate::callback::{
    CallbackId, CallbackRegistration, CallbackRegistry, CallbackSignature, HandlerError,
};
use crate::error::{Result, SessionError};
use crate::exchange::{ExchangeKind, ExchangeStack};
use crate::handshake::{write_magic, HandshakeConfig};

/// What a command's terminal success reply must look like.
#[derive(Debug, Clone, Copy)]
enum Expect {
    Nothing,
    Value(TypeTag),
    Bytes,
}

impl Expect {
    fn describe(self) -> String {
        match self {
            Expect::Nothing => "ok".to_string(),
            Expect::Value(tag) => format!("a value of type {tag}"),
            Expect::Bytes => "a byte string".to_string(),
        }
    }
}

enum Reply {
    Ok,
    Value(Value),
    Bytes(Vec<u8>),
}

impl Reply {
    fn into_value(self) -> Value {
        match self {
            Reply::Value(value) => value,
            Reply::Ok | Reply::Bytes(_) => Value::Void,
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        match self {
            Reply::Bytes(bytes) => bytes,
            Reply::Ok | Reply::Value(_) => Vec::new(),
        }
    }
}

/// The controller side of a session.
///
/// Issues one command at a time and blocks until its terminal reply,
/// servicing any callback invocations the worker makes in between. A
/// protocol or I/O failure poisons the session: every later command fails
/// with [`SessionError::Contract`] without touching the channel.
///
/// Dropping a healthy controller sends `Exit`.
pub struct Controller<S: Read + Write> {
    stream: WireStream<S>,
    exchanges: ExchangeStack,
    callbacks: CallbackRegistry,
    may_send: bool,
    failure: Option<String>,
    closed: bool,
}

impl<S: Read + Write> Controller<S> {
    /// Start a session over a connected channel and send the magic number.
    pub fn new(stream: S, registry: Arc<TypeRegistry>) -> Result<Self> {
        Self::from_wire(
            WireStream::new(stream, registry),
            &HandshakeConfig::default(),
        )
    }

    pub fn with_config(
        stream: S,
        registry: Arc<TypeRegistry>,
        wire_config: WireConfig,
        handshake_config: &HandshakeConfig,
    ) -> Result<Self> {
        Self::from_wire(
            WireStream::with_config(stream, registry, wire_config),
            handshake_config,
        )
    }

    pub fn from_wire(mut stream: WireStream<S>, handshake_config: &HandshakeConfig) -> Result<Self> {
        write_magic(&mut stream, handshake_config)?;
        Ok(Self {
            stream,
            exchanges: ExchangeStack::new(),
            callbacks: CallbackRegistry::new(),
            may_send: true,
            failure: None,
            closed: false,
        })
    }

    /// Evaluate `code` in the worker.
    ///
    /// With `result` void the reply carries no value and [`Value::Void`] is
    /// returned; otherwise the last segment's value, exported as `result`.
    pub fn run_script(&mut self, code: &str, result: TypeTag) -> Result<Value> {
        let expect = if result.is_void() {
            Expect::Nothing
        } else {
            Expect::Value(result)
        };
        let reply = self.transact(
            Command::RunScript,
            |w| {
                require_registered(w.registry(), result, true)?;
                w.put_str(code);
                w.put_type_tag(result);
                Ok(())
            },
            expect,
        )?;
        Ok(reply.into_value())
    }

    /// Evaluate `code` and convert its value to `T`.
    pub fn run<T: WireValue>(&mut self, code: &str) -> Result<T> {
        let value = self.run_script(code, T::TYPE_TAG)?;
        Ok(T::from_value(value)?)
    }

    /// Evaluate `code` for effect only.
    pub fn run_void(&mut self, code: &str) -> Result<()> {
        self.run_script(code, TypeTag::VOID).map(|_| ())
    }

    /// Bind `value` to `name` in the worker.
    pub fn set_value(&mut self, name: &str, value: &Value) -> Result<()> {
        self.transact(
            Command::SetValue,
            |w| {
                w.put_str(name);
                w.put_value(value)
            },
            Expect::Nothing,
        )?;
        Ok(())
    }

    pub fn set<T: WireValue>(&mut self, name: &str, value: T) -> Result<()> {
        self.set_value(name, &value.into_value())
    }

    /// Read `name` out of the worker as type `tag`.
    pub fn get_value(&mut self, name: &str, tag: TypeTag) -> Result<Value> {
        let reply = self.transact(
            Command::GetValue,
            |w| {
                require_registered(w.registry(), tag, false)?;
                w.put_str(name);
                w.put_type_tag(tag);
                Ok(())
            },
            Expect::Value(tag),
        )?;
        Ok(reply.into_value())
    }

    pub fn get<T: WireValue>(&mut self, name: &str) -> Result<T> {
        let value = self.get_value(name, T::TYPE_TAG)?;
        Ok(T::from_value(value)?)
    }

    /// Install `name` in the worker's engine as a callable that runs `handler`
    /// here.
    ///
    /// The handler only becomes reachable once the worker has accepted the
    /// binding. A handler error poisons the session.
    pub fn set_callback<F>(
        &mut self,
        name: &str,
        signature: CallbackSignature,
        handler: F,
    ) -> Result<CallbackId>
    where
        F: FnMut(Vec<Value>) -> std::result::Result<Value, HandlerError> + 'static,
    {
        self.check_ready(Command::SetCallback)?;
        signature
            .validate(self.stream.registry())
            .map_err(SessionError::InvalidValue)?;

        let id = self.callbacks.reserve();
        self.transact(
            Command::SetCallback,
            |w| {
                w.put_str(name);
                w.put_u32(id.0);
                w.put_u32(signature.result.get() as u32);
                w.put_usize(signature.params.len());
                for tag in &signature.params {
                    w.put_type_tag(*tag);
                }
                Ok(())
            },
            Expect::Nothing,
        )?;

        debug!(%name, id = id.0, params = signature.arity(), "callback installed");
        self.callbacks.insert(
            id,
            CallbackRegistration {
                signature,
                handler: Box::new(handler),
            },
        );
        Ok(id)
    }

    /// Drain the worker's captured console output.
    pub fn console_output(&mut self) -> Result<String> {
        let reply = self.transact(Command::GetConsoleOutput, |_| Ok(()), Expect::Bytes)?;
        Ok(String::from_utf8_lossy(&reply.into_bytes()).into_owned())
    }

    /// Start capturing graphics in the worker.
    pub fn init_plot(&mut self, width: u32, height: u32) -> Result<()> {
        self.transact(
            Command::InitPlot,
            |w| {
                w.put_u32(width);
                w.put_u32(height);
                Ok(())
            },
            Expect::Nothing,
        )?;
        Ok(())
    }

    /// Finish capturing and fetch the rendered image.
    pub fn plot(&mut self) -> Result<Vec<u8>> {
        let reply = self.transact(Command::GetPlot, |_| Ok(()), Expect::Bytes)?;
        Ok(reply.into_bytes())
    }

    /// Send `Exit`. The session cannot be used afterwards.
    pub fn exit(&mut self) -> Result<()> {
        self.check_ready(Command::Exit)?;
        self.stream.put_command(Command::Exit);
        self.closed = true;
        self.may_send = false;
        self.stream
            .flush()
            .map_err(|err| SessionError::from_wire(err, "sending exit"))?;
        debug!("sent exit");
        Ok(())
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.stream.registry()
    }

    /// True when a new command may be sent.
    pub fn is_ready(&self) -> bool {
        self.may_send && self.failure.is_none() && !self.closed
    }

    /// True once an unrecoverable error has been recorded.
    pub fn is_poisoned(&self) -> bool {
        self.failure.is_some()
    }

    /// Description of the error that poisoned the session.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Number of callbacks installed in the worker.
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    fn check_ready(&self, command: Command) -> Result<()> {
        if let Some(reason) = &self.failure {
            return Err(SessionError::Contract(format!(
                "cannot send {command}: session is unrecoverable ({reason})"
            )));
        }
        if self.closed {
            return Err(SessionError::Contract(format!(
                "cannot send {command}: session is closed"
            )));
        }
        if !self.may_send {
            return Err(SessionError::Contract(format!(
                "cannot send {command}: previous command has not completed"
            )));
        }
        Ok(())
    }

    fn write_command(&mut self, command: Command) -> Result<()> {
        self.check_ready(command)?;
        self.exchanges.open_command(command)?;
        self.may_send = false;
        self.stream.put_command(command);
        debug!(%command, "sending command");
        Ok(())
    }

    fn transact<F>(&mut self, command: Command, args: F, expect: Expect) -> Result<Reply>
    where
        F: FnOnce(&mut WireStream<S>) -> scriptbridge_wire::Result<()>,
    {
        self.write_command(command)?;
        if let Err(err) = args(&mut self.stream) {
            // Nothing has reached the channel yet.
            self.stream.discard();
            self.exchanges.clear();
            self.may_send = true;
            return Err(SessionError::InvalidValue(err));
        }

        let outcome = match self.stream.flush() {
            Ok(()) => self.await_terminal(command, expect),
            Err(err) => Err(SessionError::from_wire(err, "sending command")),
        };

        match outcome {
            Ok(reply) => {
                self.complete(command)?;
                Ok(reply)
            }
            Err(err) if err.is_recoverable() => {
                self.complete(command)?;
                Err(err)
            }
            Err(err) => Err(self.poison(err)),
        }
    }

    fn complete(&mut self, command: Command) -> Result<()> {
        match self.exchanges.close(ExchangeKind::Command(command)) {
            Ok(_) => {
                self.may_send = true;
                Ok(())
            }
            Err(err) => Err(self.poison(err)),
        }
    }

    fn poison(&mut self, err: SessionError) -> SessionError {
        warn!(error = %err, "session is unrecoverable");
        self.failure.get_or_insert_with(|| err.to_string());
        self.exchanges.clear();
        self.stream.discard();
        self.may_send = false;
        err
    }

    fn await_terminal(&mut self, command: Command, expect: Expect) -> Result<Reply> {
        loop {
            let kind = self
                .stream
                .read_reply_kind()
                .map_err(|err| SessionError::from_wire(err, "awaiting reply"))?;
            trace!(%command, %kind, "reply received");

            match (kind, expect) {
                (ReplyKind::CallbackInvoke, _) => self.serve_callback()?,
                (ReplyKind::Error, _) => {
                    let message = self
                        .stream
                        .read_string()
                        .map_err(|err| SessionError::from_wire(err, "reading error reply"))?;
                    debug!(%command, %message, "command failed in worker");
                    return Err(SessionError::Remote(message));
                }
                (ReplyKind::Ok, Expect::Nothing) => return Ok(Reply::Ok),
                (ReplyKind::Value, Expect::Value(tag)) => {
                    let value = self
                        .stream
                        .read_value_of(tag)
                        .map_err(|err| SessionError::from_wire(err, "reading reply value"))?;
                    return Ok(Reply::Value(value));
                }
                (ReplyKind::Value, Expect::Bytes) => {
                    let bytes = self
                        .stream
                        .read_bytes()
                        .map_err(|err| SessionError::from_wire(err, "reading reply bytes"))?;
                    return Ok(Reply::Bytes(bytes));
                }
                (kind, expect) => {
                    return Err(SessionError::Protocol(format!(
                        "unexpected {kind} reply to {command} (expected {})",
                        expect.describe()
                    )))
                }
            }
        }
    }

    fn serve_callback(&mut self) -> Result<()> {
        let id = CallbackId(
            self.stream
                .read_u32()
                .map_err(|err| SessionError::from_wire(err, "reading callback id"))?,
        );
        self.exchanges.open_callback(id)?;

        let registration = self.callbacks.get_mut(id).ok_or_else(|| {
            SessionError::Protocol(format!("worker invoked unknown callback {id}"))
        })?;

        let mut args = Vec::with_capacity(registration.signature.arity());
        for tag in &registration.signature.params {
            let arg = self
                .stream
                .read_value_of(*tag)
                .map_err(|err| SessionError::from_wire(err, "reading callback arguments"))?;
            args.push(arg);
        }
        debug!(id = id.0, args = args.len(), "servicing callback");

        let failed = |message: String| SessionError::CallbackFailed { id, message };
        let result = (registration.handler)(args).map_err(|err| failed(err.to_string()))?;

        let signature = &registration.signature;
        if signature.returns_value() {
            result
                .expect_type(signature.result)
                .map_err(|err| failed(err.to_string()))?;
            self.stream.put_reply_kind(ReplyKind::Value);
            self.stream
                .put_value(&result)
                .map_err(|err| failed(err.to_string()))?;
        } else {
            self.stream.put_reply_kind(ReplyKind::Ok);
        }
        self.stream
            .flush()
            .map_err(|err| SessionError::from_wire(err, "answering callback"))?;

        self.exchanges.close(ExchangeKind::Callback(id))?;
        Ok(())
    }
}

fn require_registered(
    registry: &TypeRegistry,
    tag: TypeTag,
    allow_void: bool,
) -> scriptbridge_wire::Result<()> {
    if (allow_void && tag.is_void()) || registry.contains(tag) {
        Ok(())
    } else {
        Err(WireError::UnregisteredType(tag))
    }
}

impl<S: Read + Write> Drop for Controller<S> {
    fn drop(&mut self) {
        if self.is_ready() {
            if let Err(err) = self.exit() {
                debug!(error = %err, "exit on drop failed");
            }
        }
    }
}
