use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any async byte stream.
///
/// The writer is not internally synchronized: multiplexing frames from
/// several producers onto one transport requires a single owner (one writer
/// task), otherwise interleaved headers would corrupt the whole protocol.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: AsyncWrite + Unpin> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write a complete frame, then flush.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;

        match self.config.write_timeout {
            Some(limit) => tokio::time::timeout(limit, self.write_buffered())
                .await
                .map_err(|_| {
                    FrameError::Io(std::io::Error::new(
                        ErrorKind::TimedOut,
                        format!("frame write timed out after {limit:?}"),
                    ))
                })??,
            None => self.write_buffered().await?,
        }

        trace!(
            msg_type = %frame.msg_type,
            stream_id = frame.stream_id,
            len = frame.payload.len(),
            "frame sent"
        );
        Ok(())
    }

    async fn write_buffered(&mut self) -> Result<()> {
        self.inner.write_all(&self.buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the underlying stream, flushing buffered bytes first.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{decode_frame, DEFAULT_MAX_PAYLOAD};
    use crate::message::MessageType;
    use crate::reader::FrameReader;

    #[tokio::test]
    async fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer
            .write_frame(&Frame::data(1, &b"hello"[..]))
            .await
            .unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let frame = decode_frame(&mut wire, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(frame.msg_type, MessageType::Data);
        assert_eq!(frame.stream_id, 1);
        assert_eq!(frame.payload.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.write_frame(&Frame::open(7)).await.unwrap();
        writer
            .write_frame(&Frame::data(7, &b"payload"[..]))
            .await
            .unwrap();
        writer.write_frame(&Frame::close(7)).await.unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let types: Vec<MessageType> = std::iter::from_fn(|| {
            decode_frame(&mut wire, DEFAULT_MAX_PAYLOAD)
                .unwrap()
                .map(|f| f.msg_type)
        })
        .collect();
        assert_eq!(
            types,
            [MessageType::Open, MessageType::Data, MessageType::Close]
        );
        assert!(wire.is_empty());
    }

    #[tokio::test]
    async fn payload_too_large_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::new()), cfg);

        let err = writer
            .write_frame(&Frame::data(1, &b"oversized"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn written_bytes_read_back_over_pipe() {
        let (tx, rx) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(tx);
        let mut reader = FrameReader::new(rx);

        writer
            .write_frame(&Frame::data(2, &b"ping"[..]))
            .await
            .unwrap();
        let frame = reader.read_frame().await.unwrap();

        assert_eq!(frame.stream_id, 2);
        assert_eq!(frame.payload.as_ref(), b"ping");
    }

    #[tokio::test]
    async fn shutdown_ends_the_stream() {
        let (tx, rx) = tokio::io::duplex(4096);
        let mut writer = FrameWriter::new(tx);
        let mut reader = FrameReader::new(rx);

        writer.write_frame(&Frame::kill()).await.unwrap();
        writer.shutdown().await.unwrap();

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame.msg_type, MessageType::Kill);
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::Closed));
    }

    #[tokio::test]
    async fn accessors_and_into_inner() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let _ = writer.get_ref();
        let _ = writer.get_mut();
        let _inner = writer.into_inner();
    }
}
