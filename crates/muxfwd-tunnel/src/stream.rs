use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use muxfwd_frame::{Frame, StreamId};

use crate::forward::Shared;

/// Lifecycle of one multiplexed logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Created; the local socket or the peer's acknowledgement is settling.
    Opening,
    /// Both direction pumps are running.
    Open,
    /// One side has finished; CLSE is being exchanged.
    Closing,
    /// Terminal. A stream in this state has already left the table.
    Closed,
}

/// Table entry for one live stream.
///
/// The local socket itself is owned by the stream's two pump tasks, not by
/// the entry: cancelling the entry's token makes both pumps exit and release
/// their socket half on every path, including teardown.
pub(crate) struct StreamEntry {
    pub(crate) state: StreamState,
    /// Dispatcher-to-pump queue for payload received from the transport.
    pub(crate) inbound: mpsc::Sender<Bytes>,
    pub(crate) cancel: CancellationToken,
}

impl StreamEntry {
    pub(crate) fn new(inbound: mpsc::Sender<Bytes>, cancel: CancellationToken) -> Self {
        Self {
            state: StreamState::Opening,
            inbound,
            cancel,
        }
    }
}

/// Pump local-socket reads onto the transport as DATA frames.
///
/// Local EOF or a local read error finishes the stream: CLSE is sent and
/// the entry leaves the table. A dead frame queue means the forward is
/// already tearing down, so the pump just exits.
pub(crate) async fn outbound_pump<R>(
    shared: Arc<Shared>,
    id: StreamId,
    mut local: R,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let chunk_size = shared.config.read_chunk_size;
    let mut buf = BytesMut::with_capacity(chunk_size);
    loop {
        buf.reserve(chunk_size);
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = local.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(n) => {
                let payload = buf.split().freeze();
                if shared.send_frame(Frame::data(id, payload)).await.is_err() {
                    return;
                }
                shared.stats.add_bytes_to_transport(n as u64);
            }
            Err(err) => {
                debug!(stream_id = id, error = %err, "local read failed");
                break;
            }
        }
    }
    shared.finish_stream(id, true).await;
}

/// Pump transport-delivered payloads into the local socket.
///
/// The receiver end of the per-stream queue lives here; the dispatcher
/// suspends when the queue is full, which is the protocol's flow-control
/// point. A failed local write finishes the stream with CLSE.
pub(crate) async fn inbound_pump<W>(
    shared: Arc<Shared>,
    id: StreamId,
    mut local: W,
    mut inbound: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = inbound.recv() => chunk,
        };
        match chunk {
            Some(bytes) => {
                if let Err(err) = local.write_all(&bytes).await {
                    debug!(stream_id = id, error = %err, "local write failed");
                    shared.finish_stream(id, true).await;
                    break;
                }
                shared.stats.add_bytes_from_transport(bytes.len() as u64);
            }
            // Entry removed; nothing more will arrive.
            None => break,
        }
    }
    let _ = local.shutdown().await;
}
