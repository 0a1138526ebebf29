//! Transport reader and frame dispatch.
//!
//! A single task reads frames in strict arrival order and fans them out:
//! payload to the owning stream's queue, OPEN to a fresh target dial on the
//! service side, control frames to the forward's flags. Everything that
//! violates the protocol funnels into [`Shared::fatal`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use muxfwd_frame::{Frame, FrameError, FrameReader, MessageType, StreamId};

use crate::error::TunnelError;
use crate::events::ForwardEvent;
use crate::forward::Shared;
use crate::stream::{self, StreamEntry};

/// Read frames off the transport until it ends or the forward dies.
pub(crate) async fn run_reader<R>(mut reader: FrameReader<R>, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let result = tokio::select! {
            _ = shared.cancel.cancelled() => return,
            result = reader.read_frame() => result,
        };
        let frame = match result {
            Ok(frame) => frame,
            Err(err) => {
                // A close requested by stop() is not an error.
                if !shared.cancel.is_cancelled() {
                    shared.fatal(match err {
                        FrameError::Closed => TunnelError::TransportClosed,
                        other => TunnelError::Frame(other),
                    });
                }
                return;
            }
        };
        if let Err(err) = dispatch(&shared, frame).await {
            shared.fatal(err);
            return;
        }
    }
}

async fn dispatch(shared: &Arc<Shared>, frame: Frame) -> Result<(), TunnelError> {
    match frame.msg_type {
        MessageType::Open => handle_open(shared, frame.stream_id).await,
        MessageType::Data => handle_data(shared, frame.stream_id, frame.payload).await,
        MessageType::Close => handle_close(shared, frame.stream_id).await,
        // The stream id on KILL/REDY is meaningless and ignored.
        MessageType::Kill => {
            handle_kill(shared);
            Ok(())
        }
        MessageType::Ready => {
            handle_ready(shared);
            Ok(())
        }
    }
}

/// OPEN: register the stream, then dial the target off the reader task.
///
/// The entry goes into the table before the dial starts so that DATA frames
/// arriving in order behind the OPEN queue up instead of looking like
/// traffic for an unknown stream. A duplicate id is a protocol violation; a
/// failed dial only costs this one stream (CLSE goes back, others continue).
async fn handle_open(shared: &Arc<Shared>, id: StreamId) -> Result<(), TunnelError> {
    if !shared.is_service() {
        warn!(stream_id = id, "unexpected OPEN on the daemon side");
        return Ok(());
    }
    if shared.table.len() >= shared.config.max_streams {
        warn!(stream_id = id, "stream limit reached, refusing OPEN");
        shared.stats.record_stream_refused();
        let _ = shared.send_frame(Frame::close(id)).await;
        return Ok(());
    }
    let Some(target) = shared.current_target() else {
        return Ok(());
    };

    let (inbound_tx, inbound_rx) = mpsc::channel(shared.config.stream_queue_depth);
    let cancel = shared.cancel.child_token();
    shared
        .table
        .insert(id, StreamEntry::new(inbound_tx, cancel.clone()))?;

    let shared = shared.clone();
    tokio::spawn(async move { dial_target(shared, id, target, inbound_rx, cancel).await });
    Ok(())
}

async fn dial_target(
    shared: Arc<Shared>,
    id: StreamId,
    target: SocketAddr,
    inbound_rx: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => return,
        connected = TcpStream::connect(target) => connected,
    };
    let socket = match connected {
        Ok(socket) => socket,
        Err(err) => {
            warn!(stream_id = id, %target, error = %err, "local target unreachable, refusing stream");
            if shared.table.remove(id).is_some() {
                let _ = shared.send_frame(Frame::close(id)).await;
            }
            return;
        }
    };
    if !shared.table.mark_open(id) {
        // Closed while dialing; the socket is simply dropped.
        return;
    }

    let (read_half, write_half) = socket.into_split();
    tokio::spawn(stream::outbound_pump(
        shared.clone(),
        id,
        read_half,
        cancel.clone(),
    ));
    tokio::spawn(stream::inbound_pump(
        shared.clone(),
        id,
        write_half,
        inbound_rx,
        cancel,
    ));

    shared.stats.record_stream_opened();
    shared.emit(ForwardEvent::StreamOpened(id));
    debug!(stream_id = id, %target, "stream opened");
}

/// DATA: payload for a live stream, a late frame for a finished one, or a
/// protocol violation for an id that never existed.
async fn handle_data(shared: &Arc<Shared>, id: StreamId, payload: Bytes) -> Result<(), TunnelError> {
    let Some(inbound) = shared.table.inbound_sender(id) else {
        if shared.table.is_retired(id) {
            shared.stats.record_frame_discarded();
            trace!(stream_id = id, "discarding DATA for finished stream");
            return Ok(());
        }
        return Err(TunnelError::UnknownStream { id });
    };
    if inbound.send(payload).await.is_err() {
        // Pump exited while the frame was in flight; the stream is finishing.
        shared.stats.record_frame_discarded();
    }
    Ok(())
}

async fn handle_close(shared: &Arc<Shared>, id: StreamId) -> Result<(), TunnelError> {
    if shared.table.contains(id) {
        shared.finish_stream(id, false).await;
        Ok(())
    } else if shared.table.is_retired(id) {
        shared.stats.record_frame_discarded();
        trace!(stream_id = id, "discarding CLSE for finished stream");
        Ok(())
    } else {
        Err(TunnelError::UnknownStream { id })
    }
}

fn handle_kill(shared: &Arc<Shared>) {
    if shared.is_daemon() {
        warn!("unexpected KILL from the service side");
        return;
    }
    shared.set_accepting(false);
    shared.emit(ForwardEvent::Killed);
    info!("peer stopped accepting new streams");
}

fn handle_ready(shared: &Arc<Shared>) {
    if shared.is_daemon() {
        warn!("unexpected REDY from the service side");
        return;
    }
    shared.set_ready();
    info!("forward is ready");
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::ForwardConfig;
    use crate::forward::{Forward, Role};

    fn service() -> (Forward, mpsc::UnboundedReceiver<ForwardEvent>) {
        Forward::new(
            Role::Service {
                target: "127.0.0.1:1".parse().expect("addr should parse"),
            },
            ForwardConfig::default(),
        )
    }

    #[tokio::test]
    async fn data_for_unknown_stream_is_a_violation() {
        let (forward, _events) = service();
        let err = handle_data(&forward.shared, 42, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::UnknownStream { id: 42 }));
    }

    #[tokio::test]
    async fn data_for_retired_stream_is_discarded() {
        let (forward, _events) = service();
        let (tx, _rx) = mpsc::channel(1);
        forward
            .shared
            .table
            .insert(3, StreamEntry::new(tx, CancellationToken::new()))
            .unwrap();
        forward.shared.table.remove(3);

        handle_data(&forward.shared, 3, Bytes::from_static(b"late"))
            .await
            .unwrap();
        assert_eq!(forward.stats().frames_discarded, 1);
    }

    #[tokio::test]
    async fn close_for_unknown_stream_is_a_violation() {
        let (forward, _events) = service();
        let err = handle_close(&forward.shared, 9).await.unwrap_err();
        assert!(matches!(err, TunnelError::UnknownStream { id: 9 }));
    }

    #[tokio::test]
    async fn close_for_retired_stream_is_discarded() {
        let (forward, _events) = service();
        let (tx, _rx) = mpsc::channel(1);
        forward
            .shared
            .table
            .insert(5, StreamEntry::new(tx, CancellationToken::new()))
            .unwrap();
        forward.shared.table.remove(5);

        handle_close(&forward.shared, 5).await.unwrap();
        assert_eq!(forward.stats().frames_discarded, 1);
    }

    #[tokio::test]
    async fn kill_clears_accepting_and_emits() {
        let (forward, mut events) = service();
        forward.shared.set_ready();
        assert!(forward.is_accepting());

        handle_kill(&forward.shared);
        assert!(!forward.is_accepting());

        let first = events.recv().await.expect("ready event");
        assert!(matches!(first, ForwardEvent::Ready));
        let second = events.recv().await.expect("killed event");
        assert!(matches!(second, ForwardEvent::Killed));
    }

    #[tokio::test]
    async fn duplicate_open_is_a_violation() {
        let (forward, _events) = service();
        let (tx, _rx) = mpsc::channel(1);
        forward
            .shared
            .table
            .insert(1, StreamEntry::new(tx, CancellationToken::new()))
            .unwrap();

        let err = handle_open(&forward.shared, 1).await.unwrap_err();
        assert!(matches!(err, TunnelError::DuplicateStream { id: 1 }));
    }
}
