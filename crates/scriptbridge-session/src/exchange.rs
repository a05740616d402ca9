//! Pending exchanges on one side of a session.
//!
//! A command opens the bottom frame. While `RunScript` is executing, each
//! callback round-trip pushes a frame on top and pops it when its terminal
//! reply has been handled. Frames close strictly last-in, first-out.

use std::fmt;
use std::time::{Duration, Instant};

use scriptbridge_wire::Command;
use tracing::trace;

use crate::callback::CallbackId;
use crate::error::{Result, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Command(Command),
    Callback(CallbackId),
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Command(command) => write!(f, "command {command}"),
            ExchangeKind::Callback(id) => write!(f, "callback {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Exchange {
    pub kind: ExchangeKind,
    pub opened_at: Instant,
}

impl Exchange {
    pub fn elapsed(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

#[derive(Debug, Default)]
pub struct ExchangeStack {
    frames: Vec<Exchange>,
}

impl ExchangeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_idle(&self) -> bool {
        self.frames.is_empty()
    }

    /// The innermost open exchange.
    pub fn current(&self) -> Option<&Exchange> {
        self.frames.last()
    }

    /// The command at the bottom of the stack.
    pub fn command(&self) -> Option<Command> {
        match self.frames.first()?.kind {
            ExchangeKind::Command(command) => Some(command),
            ExchangeKind::Callback(_) => None,
        }
    }

    /// True when a callback round-trip may be opened now.
    pub fn accepts_callback(&self) -> bool {
        self.command().is_some_and(Command::allows_callbacks)
    }

    pub fn open_command(&mut self, command: Command) -> Result<()> {
        if let Some(pending) = self.current() {
            return Err(SessionError::Contract(format!(
                "cannot start {command} while {} is pending",
                pending.kind
            )));
        }
        self.push(ExchangeKind::Command(command));
        Ok(())
    }

    pub fn open_callback(&mut self, id: CallbackId) -> Result<()> {
        match self.command() {
            Some(command) if command.allows_callbacks() => {
                self.push(ExchangeKind::Callback(id));
                Ok(())
            }
            Some(command) => Err(SessionError::Protocol(format!(
                "callback {id} invoked during {command}"
            ))),
            None => Err(SessionError::Protocol(format!(
                "callback {id} invoked with no command in flight"
            ))),
        }
    }

    /// Close the innermost exchange, which must be `kind`.
    pub fn close(&mut self, kind: ExchangeKind) -> Result<Exchange> {
        match self.frames.last() {
            Some(top) if top.kind == kind => {}
            Some(top) => {
                return Err(SessionError::Contract(format!(
                    "cannot close {kind}: innermost exchange is {}",
                    top.kind
                )))
            }
            None => {
                return Err(SessionError::Contract(format!(
                    "cannot close {kind}: no exchange is open"
                )))
            }
        }
        let depth = self.frames.len();
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| SessionError::Contract("exchange stack underflow".to_string()))?;
        trace!(
            exchange = %frame.kind,
            depth,
            elapsed_us = frame.elapsed().as_micros() as u64,
            "exchange closed"
        );
        Ok(frame)
    }

    /// Drop all frames after a fatal error.
    pub fn clear(&mut self) {
        self.frames.clear();
    }

    fn push(&mut self, kind: ExchangeKind) {
        self.frames.push(Exchange {
            kind,
            opened_at: Instant::now(),
        });
        trace!(exchange = %kind, depth = self.frames.len(), "exchange opened");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_command_lifecycle() {
        let mut stack = ExchangeStack::new();
        assert!(stack.is_idle());
        stack.open_command(Command::GetValue).unwrap();
        assert_eq!(stack.command(), Some(Command::GetValue));
        assert!(!stack.accepts_callback());

        let frame = stack.close(ExchangeKind::Command(Command::GetValue)).unwrap();
        assert_eq!(frame.kind, ExchangeKind::Command(Command::GetValue));
        assert!(stack.is_idle());
    }

    #[test]
    fn second_command_is_contract_error() {
        let mut stack = ExchangeStack::new();
        stack.open_command(Command::RunScript).unwrap();
        assert!(matches!(
            stack.open_command(Command::SetValue),
            Err(SessionError::Contract(_))
        ));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn callbacks_nest_lifo_inside_run_script() {
        let mut stack = ExchangeStack::new();
        stack.open_command(Command::RunScript).unwrap();
        stack.open_callback(CallbackId(1)).unwrap();
        stack.open_callback(CallbackId(2)).unwrap();
        assert_eq!(stack.depth(), 3);
        assert_eq!(
            stack.current().map(|f| f.kind),
            Some(ExchangeKind::Callback(CallbackId(2)))
        );

        assert!(matches!(
            stack.close(ExchangeKind::Callback(CallbackId(1))),
            Err(SessionError::Contract(_))
        ));
        stack.close(ExchangeKind::Callback(CallbackId(2))).unwrap();
        stack.close(ExchangeKind::Callback(CallbackId(1))).unwrap();
        stack
            .close(ExchangeKind::Command(Command::RunScript))
            .unwrap();
        assert!(stack.is_idle());
    }

    #[test]
    fn callback_outside_run_script_is_protocol_error() {
        let mut stack = ExchangeStack::new();
        assert!(matches!(
            stack.open_callback(CallbackId(1)),
            Err(SessionError::Protocol(_))
        ));
        stack.open_command(Command::GetPlot).unwrap();
        assert!(matches!(
            stack.open_callback(CallbackId(1)),
            Err(SessionError::Protocol(_))
        ));
    }

    #[test]
    fn close_on_empty_stack_fails() {
        let mut stack = ExchangeStack::new();
        assert!(matches!(
            stack.close(ExchangeKind::Command(Command::Exit)),
            Err(SessionError::Contract(_))
        ));
    }

    #[test]
    fn clear_resets() {
        let mut stack = ExchangeStack::new();
        stack.open_command(Command::RunScript).unwrap();
        stack.open_callback(CallbackId(3)).unwrap();
        stack.clear();
        assert!(stack.is_idle());
        stack.open_command(Command::Exit).unwrap();
    }
}
