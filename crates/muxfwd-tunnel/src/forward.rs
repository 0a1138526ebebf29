use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use muxfwd_frame::{Frame, FrameConfig, FrameReader, FrameWriter, StreamId};

use crate::config::ForwardConfig;
use crate::error::{Result, TunnelError};
use crate::events::ForwardEvent;
use crate::stats::{ForwardStats, StatsSnapshot};
use crate::table::StreamTable;
use crate::{demux, mux};

/// Which end of the tunnel this forward runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts local client connections and initiates OPEN.
    Daemon { listen: SocketAddr },
    /// Dials the real target per OPEN and demultiplexes traffic.
    Service { target: SocketAddr },
}

pub(crate) enum RoleState {
    Daemon { listen: SocketAddr },
    /// The target is behind a lock so `rebind` can redirect new streams
    /// without touching established ones.
    Service { target: Mutex<SocketAddr> },
}

/// One instance of the multiplexing tunnel: a single transport connection
/// and the set of logical streams riding on it.
///
/// Construct with [`Forward::new`], hand the raw transport to
/// [`Forward::start`], and watch the returned event receiver. `start` is
/// idempotent-safe and `stop` drains gracefully; both may race the
/// transport reader without harm.
pub struct Forward {
    pub(crate) shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pub(crate) config: ForwardConfig,
    pub(crate) role: RoleState,
    pub(crate) table: StreamTable,
    pub(crate) stats: ForwardStats,
    pub(crate) cancel: CancellationToken,
    events: mpsc::UnboundedSender<ForwardEvent>,
    ready: watch::Sender<bool>,
    accepting: AtomicBool,
    started: AtomicBool,
    stopped: AtomicBool,
    faulted: AtomicBool,
    /// Set once by `start`; every frame from every task funnels through it
    /// to the single writer task that owns the transport write half.
    frames: OnceLock<mpsc::Sender<Frame>>,
    /// Bound address of the daemon's local listener, set by the accept loop.
    pub(crate) local_addr: OnceLock<SocketAddr>,
}

impl Forward {
    /// Create a forward and the receiver for its lifecycle events.
    pub fn new(role: Role, config: ForwardConfig) -> (Self, mpsc::UnboundedReceiver<ForwardEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (ready, _) = watch::channel(false);
        let role = match role {
            Role::Daemon { listen } => RoleState::Daemon { listen },
            Role::Service { target } => RoleState::Service {
                target: Mutex::new(target),
            },
        };
        let shared = Arc::new(Shared {
            config,
            role,
            table: StreamTable::new(),
            stats: ForwardStats::default(),
            cancel: CancellationToken::new(),
            events,
            ready,
            accepting: AtomicBool::new(false),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            faulted: AtomicBool::new(false),
            frames: OnceLock::new(),
            local_addr: OnceLock::new(),
        });
        (Self { shared }, events_rx)
    }

    /// Begin multiplexing over `transport`.
    ///
    /// Spawns the writer task, the reader/dispatch task and the role driver
    /// (the accept loop on the daemon, the REDY watchdog on the service).
    /// Calling `start` twice is a no-op. Must be called from within a tokio
    /// runtime.
    pub fn start<T>(&self, transport: T) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let frame_config = FrameConfig {
            max_payload_size: self.shared.config.max_payload_size,
            read_timeout: self.shared.config.transport_read_timeout,
            ..FrameConfig::default()
        };
        let (read_half, write_half) = tokio::io::split(transport);
        let reader = FrameReader::with_config(read_half, frame_config.clone());
        let writer = FrameWriter::with_config(write_half, frame_config);

        let (frames_tx, frames_rx) = mpsc::channel(self.shared.config.writer_queue_depth);
        let _ = self.shared.frames.set(frames_tx);

        tokio::spawn(run_writer(writer, frames_rx, self.shared.clone()));
        tokio::spawn(demux::run_reader(reader, self.shared.clone()));
        match &self.shared.role {
            RoleState::Daemon { listen } => {
                tokio::spawn(mux::run_acceptor(self.shared.clone(), *listen));
            }
            RoleState::Service { .. } => {
                tokio::spawn(ready_watchdog(self.shared.clone()));
            }
        }
        Ok(())
    }

    /// Stop the forward gracefully.
    ///
    /// The daemon sends KILL and stops accepting; both sides then wait up
    /// to `drain_timeout` for open streams to finish before force-closing
    /// whatever remains along with the transport. Safe to call twice and
    /// safe to call concurrently with the read loop.
    pub async fn stop(&self) {
        if !self.shared.started.load(Ordering::SeqCst) {
            return;
        }
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.set_accepting(false);
        if self.shared.is_daemon() && self.shared.send_frame(Frame::kill()).await.is_ok() {
            self.shared.emit(ForwardEvent::Killed);
            info!("sent KILL; draining open streams");
        }

        let drain = self.shared.config.drain_timeout;
        if tokio::time::timeout(drain, self.shared.table.wait_drained())
            .await
            .is_err()
        {
            warn!(
                remaining = self.shared.table.len(),
                "drain timed out; force-closing streams"
            );
        }
        self.shared.close_remaining_streams();
        self.shared.cancel.cancel();
    }

    /// Wait for the forward to become ready, honoring `ready_timeout`.
    pub async fn wait_ready(&self) -> Result<()> {
        let limit = self.shared.config.ready_timeout;
        let mut ready = self.shared.ready.subscribe();
        let result = match tokio::time::timeout(limit, ready.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(TunnelError::TransportClosed),
            Err(_) => Err(TunnelError::ReadyTimeout(limit)),
        };
        result
    }

    /// Redirect new streams to a different local target (service side).
    ///
    /// Established streams keep their current target connection.
    pub fn rebind(&self, target: SocketAddr) -> Result<()> {
        match &self.shared.role {
            RoleState::Service { target: current } => {
                let mut current = current.lock().unwrap_or_else(PoisonError::into_inner);
                info!(old = %*current, new = %target, "rebinding new streams");
                *current = target;
                Ok(())
            }
            RoleState::Daemon { .. } => Err(TunnelError::WrongRole),
        }
    }

    /// Bound address of the daemon's local listener, once it is up.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr.get().copied()
    }

    /// True once REDY has been sent (daemon) or observed (service).
    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    /// True while new local connections / streams are admitted.
    pub fn is_accepting(&self) -> bool {
        self.shared.is_accepting()
    }

    /// True once the forward is dead (stopped or torn down by an error).
    pub fn is_terminated(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Number of live streams in the table.
    pub fn active_streams(&self) -> usize {
        self.shared.table.len()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Shared {
    pub(crate) fn is_daemon(&self) -> bool {
        matches!(self.role, RoleState::Daemon { .. })
    }

    pub(crate) fn is_service(&self) -> bool {
        matches!(self.role, RoleState::Service { .. })
    }

    /// The target new service-side streams should dial.
    pub(crate) fn current_target(&self) -> Option<SocketAddr> {
        match &self.role {
            RoleState::Service { target } => {
                Some(*target.lock().unwrap_or_else(PoisonError::into_inner))
            }
            RoleState::Daemon { .. } => None,
        }
    }

    /// Queue a frame for the writer task. Fails once the transport is gone.
    pub(crate) async fn send_frame(&self, frame: Frame) -> Result<()> {
        let Some(frames) = self.frames.get() else {
            return Err(TunnelError::TransportClosed);
        };
        frames
            .send(frame)
            .await
            .map_err(|_| TunnelError::TransportClosed)
    }

    pub(crate) fn emit(&self, event: ForwardEvent) {
        let _ = self.events.send(event);
    }

    /// Mark the forward ready and start admitting streams.
    pub(crate) fn set_ready(&self) {
        self.ready.send_replace(true);
        self.set_accepting(true);
        self.emit(ForwardEvent::Ready);
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub(crate) fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Finish one stream locally: remove it from the table, cancel its
    /// pumps, optionally tell the peer. Idempotent — racing finishers
    /// arbitrate through the table removal.
    pub(crate) async fn finish_stream(&self, id: StreamId, notify_peer: bool) {
        if self.table.remove(id).is_none() {
            return;
        }
        if notify_peer {
            let _ = self.send_frame(Frame::close(id)).await;
        }
        self.stats.record_stream_closed();
        self.emit(ForwardEvent::StreamClosed(id));
        tracing::debug!(stream_id = id, "stream closed");
    }

    fn close_remaining_streams(&self) {
        for id in self.table.drain() {
            self.stats.record_stream_closed();
            self.emit(ForwardEvent::StreamClosed(id));
        }
    }

    /// Tear the whole forward down. First caller wins; the rest return.
    ///
    /// Protocol violations, transport failures and timeouts all land here:
    /// the transport cannot be trusted (or no longer exists), so every
    /// stream is force-closed and the root token cancelled.
    pub(crate) fn fatal(&self, err: TunnelError) {
        if self.faulted.swap(true, Ordering::SeqCst) {
            return;
        }
        error!(error = %err, "fatal error; tearing down forward");
        self.set_accepting(false);
        self.close_remaining_streams();
        self.emit(ForwardEvent::FatalError(err));
        self.cancel.cancel();
    }
}

/// Single writer task: sole owner of the transport write half.
///
/// Frames from every stream pump and from the dispatcher are serialized
/// through one queue so headers can never interleave on the wire.
async fn run_writer<W>(
    mut writer: FrameWriter<W>,
    mut frames: mpsc::Receiver<Frame>,
    shared: Arc<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(err) = writer.write_frame(&frame).await {
            // The transport is shared; a failed write poisons every stream.
            if !shared.cancel.is_cancelled() {
                shared.fatal(TunnelError::Frame(err));
            }
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Service-side watchdog: the daemon must send REDY within the window.
async fn ready_watchdog(shared: Arc<Shared>) {
    let limit = shared.config.ready_timeout;
    let mut ready = shared.ready.subscribe();
    tokio::select! {
        _ = shared.cancel.cancelled() => {}
        result = tokio::time::timeout(limit, ready.wait_for(|ready| *ready)) => {
            if result.is_err() {
                shared.fatal(TunnelError::ReadyTimeout(limit));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ForwardConfig;

    fn daemon_role() -> Role {
        Role::Daemon {
            listen: "127.0.0.1:0".parse().expect("addr should parse"),
        }
    }

    fn service_role() -> Role {
        Role::Service {
            target: "127.0.0.1:1".parse().expect("addr should parse"),
        }
    }

    #[tokio::test]
    async fn double_start_is_a_noop() {
        let (forward, _events) = Forward::new(daemon_role(), ForwardConfig::default());
        let (a, _b) = tokio::io::duplex(1024);
        let (c, _d) = tokio::io::duplex(1024);

        forward.start(a).unwrap();
        forward.start(c).unwrap();
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let (forward, _events) = Forward::new(daemon_role(), ForwardConfig::default());
        forward.stop().await;
        assert!(!forward.is_terminated());
    }

    #[tokio::test]
    async fn stop_twice_is_safe() {
        let (forward, _events) = Forward::new(service_role(), ForwardConfig::default());
        let (a, _b) = tokio::io::duplex(1024);
        forward.start(a).unwrap();
        forward.stop().await;
        forward.stop().await;
        assert!(forward.is_terminated());
    }

    #[tokio::test]
    async fn rebind_rejected_on_daemon() {
        let (forward, _events) = Forward::new(daemon_role(), ForwardConfig::default());
        let err = forward
            .rebind("127.0.0.1:2".parse().expect("addr should parse"))
            .unwrap_err();
        assert!(matches!(err, TunnelError::WrongRole));
    }

    #[tokio::test]
    async fn wait_ready_times_out_without_redy() {
        let config = ForwardConfig {
            ready_timeout: Duration::from_millis(50),
            ..ForwardConfig::default()
        };
        let (forward, _events) = Forward::new(service_role(), config);
        let err = forward.wait_ready().await.unwrap_err();
        assert!(matches!(err, TunnelError::ReadyTimeout(_)));
    }

    #[tokio::test]
    async fn fatal_is_first_caller_wins() {
        let (forward, mut events) = Forward::new(service_role(), ForwardConfig::default());
        forward.shared.fatal(TunnelError::TransportClosed);
        forward
            .shared
            .fatal(TunnelError::UnknownStream { id: 1 });

        let event = events.recv().await.expect("event should arrive");
        assert!(matches!(
            event,
            ForwardEvent::FatalError(TunnelError::TransportClosed)
        ));
        assert!(forward.is_terminated());
    }
}
