use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::{MessageType, StreamId, CONTROL_STREAM_ID};

/// Frame header: type tag (4) + stream id (4) + payload length (4) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Default maximum payload size: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// The fixed-size header preceding every payload.
///
/// All fields are big-endian on the wire. The stream id is meaningless for
/// `KILL` and `REDY` and carries [`CONTROL_STREAM_ID`] on those types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub msg_type: MessageType,
    pub stream_id: StreamId,
    pub len: u32,
}

/// A complete frame: header plus its declared-length payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub msg_type: MessageType,
    pub stream_id: StreamId,
    pub payload: Bytes,
}

impl Frame {
    /// Request a new logical stream.
    pub fn open(stream_id: StreamId) -> Self {
        Self {
            msg_type: MessageType::Open,
            stream_id,
            payload: Bytes::new(),
        }
    }

    /// Payload bytes for an established stream.
    pub fn data(stream_id: StreamId, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type: MessageType::Data,
            stream_id,
            payload: payload.into(),
        }
    }

    /// Finish one logical stream.
    pub fn close(stream_id: StreamId) -> Self {
        Self {
            msg_type: MessageType::Close,
            stream_id,
            payload: Bytes::new(),
        }
    }

    /// Stop accepting new local connections (open streams drain normally).
    pub fn kill() -> Self {
        Self {
            msg_type: MessageType::Kill,
            stream_id: CONTROL_STREAM_ID,
            payload: Bytes::new(),
        }
    }

    /// The daemon has finished setup and traffic may flow.
    pub fn ready() -> Self {
        Self {
            msg_type: MessageType::Ready,
            stream_id: CONTROL_STREAM_ID,
            payload: Bytes::new(),
        }
    }

    /// The header this frame encodes to.
    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            msg_type: self.msg_type,
            stream_id: self.stream_id,
            len: self.payload.len() as u32,
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a header into its exact 12-byte wire form.
pub fn encode_header(msg_type: MessageType, stream_id: StreamId, len: u32) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    out[0..4].copy_from_slice(&msg_type.wire_code().to_be_bytes());
    out[4..8].copy_from_slice(&stream_id.to_be_bytes());
    out[8..12].copy_from_slice(&len.to_be_bytes());
    out
}

/// Decode a 12-byte header.
///
/// Fails with [`FrameError::UnknownMessageType`] when the type tag is not
/// one of the five known labels.
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> Result<FrameHeader> {
    let code = u32::from_be_bytes(bytes[0..4].try_into().expect("slice is 4 bytes"));
    let msg_type = MessageType::from_wire(code)?;
    let stream_id = u32::from_be_bytes(bytes[4..8].try_into().expect("slice is 4 bytes"));
    let len = u32::from_be_bytes(bytes[8..12].try_into().expect("slice is 4 bytes"));
    Ok(FrameHeader {
        msg_type,
        stream_id,
        len,
    })
}

/// Encode a frame into the wire format.
///
/// Wire format (all fields big-endian):
/// ```text
/// ┌────────────┬─────────────┬────────────┬──────────────────┐
/// │ Type (4B)  │ Stream (4B) │ Length(4B) │ Payload          │
/// │ ASCII tag  │ id          │            │ (Length bytes)   │
/// └────────────┴─────────────┴────────────┴──────────────────┘
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    if frame.payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + frame.payload.len());
    dst.put_u32(frame.msg_type.wire_code());
    dst.put_u32(frame.stream_id);
    dst.put_u32(frame.payload.len() as u32);
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let header_bytes: [u8; HEADER_SIZE] = src[..HEADER_SIZE]
        .try_into()
        .expect("slice is HEADER_SIZE bytes");
    let header = decode_header(&header_bytes)?;

    let payload_len = header.len as usize;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        msg_type: header.msg_type,
        stream_id: header.stream_id,
        payload,
    }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1 MiB.
    pub max_payload_size: usize,
    /// Timeout applied to each frame read.
    pub read_timeout: Option<std::time::Duration>,
    /// Timeout applied to each frame write.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
