//! Tunnel message types.
//!
//! Each type is encoded on the wire as the big-endian 32-bit value of its
//! four ASCII bytes, e.g. `OPEN` = 0x4f50454e. Decoding is exhaustive: an
//! unrecognized tag is a protocol error, never a silent default.

use std::fmt;

use crate::error::{FrameError, Result};

/// Identifies one logical stream within a forward.
pub type StreamId = u32;

/// Stream id carried by `KILL` and `REDY` frames (the wire encoding of -1).
/// Receivers must ignore the id on those types.
pub const CONTROL_STREAM_ID: StreamId = 0xffff_ffff;

/// The closed set of tunnel message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Daemon to service: establish a new logical stream.
    Open,
    /// Either direction: payload bytes for an established stream.
    Data,
    /// Either direction: the sender considers the stream finished.
    Close,
    /// Daemon to service: stop accepting new local connections. Streams
    /// that are already open drain normally.
    Kill,
    /// Daemon to service: setup is complete, traffic may flow.
    Ready,
}

/// All message types, in wire-tag order. Handy for exhaustive tests.
pub const MESSAGE_TYPES: [MessageType; 5] = [
    MessageType::Open,
    MessageType::Data,
    MessageType::Close,
    MessageType::Kill,
    MessageType::Ready,
];

impl MessageType {
    /// The four-byte ASCII label written to the wire.
    pub const fn label(self) -> [u8; 4] {
        match self {
            MessageType::Open => *b"OPEN",
            MessageType::Data => *b"DATA",
            MessageType::Close => *b"CLSE",
            MessageType::Kill => *b"KILL",
            MessageType::Ready => *b"REDY",
        }
    }

    /// Wire encoding: the label bytes interpreted as a big-endian u32.
    pub const fn wire_code(self) -> u32 {
        u32::from_be_bytes(self.label())
    }

    /// Decode a wire tag. Fails with [`FrameError::UnknownMessageType`]
    /// carrying the offending integer for anything outside the closed set.
    pub fn from_wire(code: u32) -> Result<Self> {
        match &code.to_be_bytes() {
            b"OPEN" => Ok(MessageType::Open),
            b"DATA" => Ok(MessageType::Data),
            b"CLSE" => Ok(MessageType::Close),
            b"KILL" => Ok(MessageType::Kill),
            b"REDY" => Ok(MessageType::Ready),
            _ => Err(FrameError::UnknownMessageType { code }),
        }
    }

    /// True for types whose stream id field is meaningful.
    pub const fn has_stream_id(self) -> bool {
        !matches!(self, MessageType::Kill | MessageType::Ready)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageType::Open => "OPEN",
            MessageType::Data => "DATA",
            MessageType::Close => "CLSE",
            MessageType::Kill => "KILL",
            MessageType::Ready => "REDY",
        })
    }
}
