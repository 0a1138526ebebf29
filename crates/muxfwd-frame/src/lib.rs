//! Typed 12-byte header framing for the muxfwd tunnel protocol.
//!
//! Every frame on the transport is:
//! - A 4-byte ASCII type tag (`OPEN`, `DATA`, `CLSE`, `KILL`, `REDY`)
//! - A 4-byte big-endian stream id
//! - A 4-byte big-endian payload length, followed by exactly that many bytes
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, decode_header, encode_frame, encode_header, Frame, FrameConfig, FrameHeader,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{MessageType, StreamId, CONTROL_STREAM_ID, MESSAGE_TYPES};
pub use reader::FrameReader;
pub use writer::FrameWriter;
