use muxfwd_frame::StreamId;

use crate::error::TunnelError;

/// Lifecycle notifications delivered to whatever orchestrates forwards.
///
/// Consumers never see a raw parse error: low-level failures arrive already
/// classified inside [`ForwardEvent::FatalError`].
#[derive(Debug)]
pub enum ForwardEvent {
    /// A logical stream reached the Open state.
    StreamOpened(StreamId),
    /// A logical stream was removed from the table.
    StreamClosed(StreamId),
    /// The forward is ready for traffic (REDY sent or observed).
    Ready,
    /// No new streams will be accepted (KILL sent or observed). Streams that
    /// are already open keep draining.
    Killed,
    /// The forward is dead; the transport has been torn down.
    FatalError(TunnelError),
}
