use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any async byte stream.
///
/// Handles partial reads internally — callers always get complete frames.
/// EOF at a frame boundary surfaces as [`FrameError::Closed`]; EOF while a
/// partial frame is buffered surfaces as [`FrameError::Truncated`], which is
/// fatal to the transport since framing cannot be recovered mid-frame.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: AsyncRead + Unpin> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                trace!(
                    msg_type = %frame.msg_type,
                    stream_id = frame.stream_id,
                    len = frame.payload.len(),
                    "frame received"
                );
                return Ok(frame);
            }

            self.buf.reserve(READ_CHUNK_SIZE);
            let read = match self.config.read_timeout {
                Some(limit) => tokio::time::timeout(limit, self.inner.read_buf(&mut self.buf))
                    .await
                    .map_err(|_| {
                        FrameError::Io(std::io::Error::new(
                            ErrorKind::TimedOut,
                            format!("frame read timed out after {limit:?}"),
                        ))
                    })??,
                None => self.inner.read_buf(&mut self.buf).await?,
            };

            if read == 0 {
                return Err(if self.buf.is_empty() {
                    FrameError::Closed
                } else {
                    FrameError::Truncated {
                        buffered: self.buf.len(),
                    }
                });
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
