//! Command and reply tag bytes.
//!
//! Exactly one tag byte precedes every command's arguments and every reply's
//! payload.

use std::fmt;

use crate::error::WireError;

/// A command sent by the controller. At most one is in flight per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Close the session.
    Exit = 0x01,
    /// Evaluate code, optionally returning the value of the last segment.
    RunScript = 0x02,
    /// Bind a value to a name in the worker's engine.
    SetValue = 0x03,
    /// Read a named value out of the worker's engine.
    GetValue = 0x04,
    /// Install a named callable that calls back into the controller.
    SetCallback = 0x05,
    /// Drain captured console output.
    GetConsoleOutput = 0x06,
    /// Start capturing rendered graphics.
    InitPlot = 0x07,
    /// Finish capturing and return the rendered image.
    GetPlot = 0x08,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::Exit,
        Command::RunScript,
        Command::SetValue,
        Command::GetValue,
        Command::SetCallback,
        Command::GetConsoleOutput,
        Command::InitPlot,
        Command::GetPlot,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Exit => "exit",
            Command::RunScript => "run_script",
            Command::SetValue => "set_value",
            Command::GetValue => "get_value",
            Command::SetCallback => "set_callback",
            Command::GetConsoleOutput => "get_console_output",
            Command::InitPlot => "init_plot",
            Command::GetPlot => "get_plot",
        }
    }

    /// Only `RunScript` may be interrupted by callback invocations.
    pub fn allows_callbacks(self) -> bool {
        self == Command::RunScript
    }
}

impl TryFrom<u8> for Command {
    type Error = WireError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.as_u8() == byte)
            .ok_or(WireError::UnknownCommand(byte))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The kind of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReplyKind {
    /// Success without a value. Terminal.
    Ok = 0x01,
    /// Success with a value. Terminal.
    Value = 0x02,
    /// Recoverable failure with a message. Terminal.
    Error = 0x03,
    /// The worker is calling back into the controller. Not terminal.
    CallbackInvoke = 0x04,
}

impl ReplyKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ReplyKind::Ok => "ok",
            ReplyKind::Value => "value",
            ReplyKind::Error => "error",
            ReplyKind::CallbackInvoke => "callback_invoke",
        }
    }

    /// Terminal replies end the exchange that provoked them.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReplyKind::CallbackInvoke)
    }
}

impl TryFrom<u8> for ReplyKind {
    type Error = WireError;

    fn try_from(byte: u8) -> Result<Self, WireError> {
        match byte {
            0x01 => Ok(ReplyKind::Ok),
            0x02 => Ok(ReplyKind::Value),
            0x03 => Ok(ReplyKind::Error),
            0x04 => Ok(ReplyKind::CallbackInvoke),
            other => Err(WireError::UnknownReply(other)),
        }
    }
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_are_distinct_and_parse_back() {
        for cmd in Command::ALL {
            assert_eq!(Command::try_from(cmd.as_u8()).unwrap(), cmd);
        }
        let bytes: std::collections::HashSet<u8> =
            Command::ALL.iter().map(|c| c.as_u8()).collect();
        assert_eq!(bytes.len(), Command::ALL.len());
    }

    #[test]
    fn unknown_command_byte_rejected() {
        assert!(matches!(
            Command::try_from(0x00),
            Err(WireError::UnknownCommand(0x00))
        ));
        assert!(matches!(
            Command::try_from(0x42),
            Err(WireError::UnknownCommand(0x42))
        ));
    }

    #[test]
    fn only_callback_invoke_is_non_terminal() {
        assert!(ReplyKind::Ok.is_terminal());
        assert!(ReplyKind::Value.is_terminal());
        assert!(ReplyKind::Error.is_terminal());
        assert!(!ReplyKind::CallbackInvoke.is_terminal());
    }

    #[test]
    fn unknown_reply_byte_rejected() {
        assert!(matches!(
            ReplyKind::try_from(0xFF),
            Err(WireError::UnknownReply(0xFF))
        ));
    }

    #[test]
    fn only_run_script_allows_callbacks() {
        let allowed: Vec<Command> = Command::ALL
            .into_iter()
            .filter(|cmd| cmd.allows_callbacks())
            .collect();
        assert_eq!(allowed, vec![Command::RunScript]);
    }
}
