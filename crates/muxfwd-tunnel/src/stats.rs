use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one forward. All counters are monotonic.
#[derive(Debug, Default)]
pub(crate) struct ForwardStats {
    streams_opened: AtomicU64,
    streams_closed: AtomicU64,
    streams_refused: AtomicU64,
    frames_discarded: AtomicU64,
    bytes_to_transport: AtomicU64,
    bytes_from_transport: AtomicU64,
}

impl ForwardStats {
    pub(crate) fn record_stream_opened(&self) {
        self.streams_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stream_closed(&self) {
        self.streams_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stream_refused(&self) {
        self.streams_refused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_discarded(&self) {
        self.frames_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes_to_transport(&self, n: u64) {
        self.bytes_to_transport.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes_from_transport(&self, n: u64) {
        self.bytes_from_transport.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            streams_opened: self.streams_opened.load(Ordering::Relaxed),
            streams_closed: self.streams_closed.load(Ordering::Relaxed),
            streams_refused: self.streams_refused.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            bytes_to_transport: self.bytes_to_transport.load(Ordering::Relaxed),
            bytes_from_transport: self.bytes_from_transport.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a forward's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub streams_opened: u64,
    pub streams_closed: u64,
    pub streams_refused: u64,
    pub frames_discarded: u64,
    pub bytes_to_transport: u64,
    pub bytes_from_transport: u64,
}
