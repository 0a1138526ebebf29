use std::time::Duration;

use muxfwd_frame::{FrameError, StreamId};

/// Errors that can end a forward or reject an operation on one.
///
/// `DuplicateStream` and `UnknownStream` are protocol violations: once one
/// fires, frame boundaries on the shared transport can no longer be trusted
/// and the whole forward is torn down. Per-stream failures (a refused local
/// target, a reset local socket) never surface here — they are handled by
/// closing the one affected stream.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    /// Frame-level error on the shared transport.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// A stream id was opened twice. Protocol violation.
    #[error("duplicate stream id {id}")]
    DuplicateStream { id: StreamId },

    /// A frame referenced an id that was never opened. Protocol violation.
    #[error("frame for unknown stream id {id}")]
    UnknownStream { id: StreamId },

    /// I/O error outside the framing layer (local listener or socket setup).
    #[error("tunnel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport ended while the forward was still running.
    #[error("transport closed")]
    TransportClosed,

    /// The peer never signalled REDY within the configured window.
    #[error("peer not ready after {0:?}")]
    ReadyTimeout(Duration),

    /// The operation is only valid on the other side of the forward.
    #[error("operation not supported for this forward role")]
    WrongRole,
}

pub type Result<T> = std::result::Result<T, TunnelError>;
