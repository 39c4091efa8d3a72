//! Module: wire_protocol::command
//!
//! Command framing: a 20-byte big-endian header followed by an opaque body.
//!
//! ```text
//! +----------------+-------------+----------------+------------------+
//! | command (u64)  | length (u32)| extra (u64)    | body (length B)  |
//! +----------------+-------------+----------------+------------------+
//! ```
//!
//! - `CommandProtocol`: the `WireProtocol` impl, holding the table of known commands.
//! - `CommandHeader`: the decoded header.
//! - `CommandMessage`: what surfaces in `NewData` events and what `send_data` takes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use thiserror::Error;

use super::WireProtocol;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const HEADER_LEN: usize = 20;

pub const CMD_HEARTBEAT_REQ: u64 = 0x0001_0001;
pub const CMD_HEARTBEAT_RSP: u64 = 0x0001_0002;
pub const CMD_BIZ_REQ: u64 = 0x0001_0003;
pub const CMD_BIZ_RSP: u64 = 0x0001_0004;

// -----------------------------------------------------------------------------
// ----- CommandHeader ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    pub command: u64,
    pub length: u32,
    pub extra: u64,
}

impl CommandHeader {
    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, CommandError> {
        if bytes.len() != HEADER_LEN {
            return Err(CommandError::UnexpectedHeaderLength(bytes.len()));
        }

        Ok(CommandHeader {
            command: bytes.get_u64(),
            length: bytes.get_u32(),
            extra: bytes.get_u64(),
        })
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u64(self.command);
        buf.put_u32(self.length);
        buf.put_u64(self.extra);
    }
}

// -----------------------------------------------------------------------------
// ----- CommandMessage --------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    pub command: u64,
    pub extra: u64,
    pub body: Bytes,
}

impl CommandMessage {
    pub fn new(command: u64, body: impl Into<Bytes>) -> Self {
        Self {
            command,
            extra: 0,
            body: body.into(),
        }
    }

    pub fn with_extra(mut self, extra: u64) -> Self {
        self.extra = extra;
        self
    }
}

// -----------------------------------------------------------------------------
// ----- CommandProtocol -------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CommandProtocol {
    commands: HashMap<u64, &'static str>,
}

impl Default for CommandProtocol {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// ----- CommandProtocol: Static -----------------------------------------------

impl CommandProtocol {
    /// Protocol knowing the heartbeat and biz request/response pairs.
    pub fn new() -> Self {
        Self::empty()
            .with_command(CMD_HEARTBEAT_REQ, "HeartBeatReq")
            .with_command(CMD_HEARTBEAT_RSP, "HeartBeatRsp")
            .with_command(CMD_BIZ_REQ, "BizReq")
            .with_command(CMD_BIZ_RSP, "BizRsp")
    }

    pub fn empty() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    pub fn with_command(mut self, command: u64, name: &'static str) -> Self {
        self.commands.insert(command, name);
        self
    }
}

// -----------------------------------------------------------------------------
// ----- CommandProtocol: Public -----------------------------------------------

impl CommandProtocol {
    pub fn command_name(&self, command: u64) -> Option<&'static str> {
        self.commands.get(&command).copied()
    }

    pub fn describe(&self, msg: &CommandMessage) -> String {
        let name = self.command_name(msg.command).unwrap_or("Unknown");
        format!(
            "command: {name} (0x{:x}), length: {}, extra: {}",
            msg.command,
            msg.body.len(),
            msg.extra
        )
    }

    fn require_known(&self, command: u64) -> Result<(), CommandError> {
        if self.commands.contains_key(&command) {
            Ok(())
        } else {
            Err(CommandError::UnknownCommand(command))
        }
    }
}

// -----------------------------------------------------------------------------
// ----- CommandProtocol: WireProtocol -----------------------------------------

impl WireProtocol for CommandProtocol {
    type Header = CommandHeader;
    type Message = CommandMessage;
    type Error = CommandError;

    fn header_len(&self) -> usize {
        HEADER_LEN
    }

    fn body_len(&self, header: &[u8]) -> Result<(CommandHeader, usize), CommandError> {
        let header = CommandHeader::from_bytes(header)?;
        Ok((header, header.length as usize))
    }

    fn parse(&self, header: CommandHeader, body: Bytes) -> Result<CommandMessage, CommandError> {
        self.require_known(header.command)?;

        if body.len() != header.length as usize {
            return Err(CommandError::BodyLengthMismatch {
                declared: header.length,
                actual: body.len(),
            });
        }

        Ok(CommandMessage {
            command: header.command,
            extra: header.extra,
            body,
        })
    }

    fn serialize(&self, message: &CommandMessage) -> Result<Bytes, CommandError> {
        self.require_known(message.command)?;

        let length = u32::try_from(message.body.len())
            .map_err(|_| CommandError::BodyTooLarge(message.body.len()))?;

        let header = CommandHeader {
            command: message.command,
            length,
            extra: message.extra,
        };

        let mut buf = BytesMut::with_capacity(HEADER_LEN + message.body.len());
        header.write_to(&mut buf);
        buf.extend_from_slice(&message.body);

        Ok(buf.freeze())
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("header must be 20 bytes, got {0}")]
    UnexpectedHeaderLength(usize),

    #[error("command 0x{0:x} not found")]
    UnknownCommand(u64),

    #[error("header declares {declared} body bytes, got {actual}")]
    BodyLengthMismatch { declared: u32, actual: usize },

    #[error("body of {0} bytes does not fit a u32 length")]
    BodyTooLarge(usize),
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
