use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::Notify;

use muxfwd_frame::{StreamId, CONTROL_STREAM_ID};

use crate::error::{Result, TunnelError};
use crate::stream::{StreamEntry, StreamState};

/// Maps live stream ids to their entries and remembers every id that has
/// ever finished.
///
/// Retired ids let the dispatcher tell "the peer doesn't know this stream
/// closed yet" (benign, frame discarded) apart from "this id was never
/// opened" (protocol violation). Ids are never reused, so the retired set
/// only grows for the lifetime of one forward.
///
/// Safe to call from the transport-reader task and every stream pump
/// concurrently; the lock is held only for map operations, never across an
/// await point.
pub(crate) struct StreamTable {
    inner: Mutex<TableInner>,
    next_id: AtomicU32,
    drained: Notify,
}

#[derive(Default)]
struct TableInner {
    live: HashMap<StreamId, StreamEntry>,
    retired: HashSet<StreamId>,
}

impl StreamTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner::default()),
            next_id: AtomicU32::new(1),
            drained: Notify::new(),
        }
    }

    fn locked(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next stream id (daemon side only). Ids increase
    /// monotonically and are never reused within a forward's lifetime.
    pub(crate) fn allocate(&self) -> StreamId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug_assert_ne!(id, CONTROL_STREAM_ID);
        id
    }

    /// Register a stream. Fails if the id is live or was ever retired — a
    /// stream id is never resurrected.
    pub(crate) fn insert(&self, id: StreamId, entry: StreamEntry) -> Result<()> {
        let mut inner = self.locked();
        if inner.live.contains_key(&id) || inner.retired.contains(&id) {
            return Err(TunnelError::DuplicateStream { id });
        }
        inner.live.insert(id, entry);
        Ok(())
    }

    /// Transition a live stream to Open. Returns false if it is gone.
    pub(crate) fn mark_open(&self, id: StreamId) -> bool {
        match self.locked().live.get_mut(&id) {
            Some(entry) => {
                entry.state = StreamState::Open;
                true
            }
            None => false,
        }
    }

    pub(crate) fn state(&self, id: StreamId) -> Option<StreamState> {
        self.locked().live.get(&id).map(|entry| entry.state)
    }

    /// Clone the inbound payload sender for a live stream.
    pub(crate) fn inbound_sender(&self, id: StreamId) -> Option<mpsc::Sender<Bytes>> {
        self.locked().live.get(&id).map(|entry| entry.inbound.clone())
    }

    pub(crate) fn contains(&self, id: StreamId) -> bool {
        self.locked().live.contains_key(&id)
    }

    pub(crate) fn is_retired(&self, id: StreamId) -> bool {
        self.locked().retired.contains(&id)
    }

    /// Remove a stream, retiring its id and cancelling its pumps.
    ///
    /// Removal and local-socket closure are atomic from the perspective of
    /// every other operation on the id: the entry leaves the map and its
    /// pumps observe a cancelled token in one step under the lock.
    pub(crate) fn remove(&self, id: StreamId) -> Option<StreamEntry> {
        let mut inner = self.locked();
        let mut entry = inner.live.remove(&id)?;
        entry.state = StreamState::Closing;
        entry.cancel.cancel();
        inner.retired.insert(id);
        let empty = inner.live.is_empty();
        drop(inner);
        if empty {
            self.drained.notify_waiters();
        }
        Some(entry)
    }

    /// Cancel and drop every live stream. Returns the ids that were closed.
    pub(crate) fn drain(&self) -> Vec<StreamId> {
        let mut inner = self.locked();
        let entries: Vec<(StreamId, StreamEntry)> = inner.live.drain().collect();
        let mut closed = Vec::with_capacity(entries.len());
        for (id, entry) in entries {
            entry.cancel.cancel();
            inner.retired.insert(id);
            closed.push(id);
        }
        drop(inner);
        self.drained.notify_waiters();
        closed
    }

    pub(crate) fn len(&self) -> usize {
        self.locked().live.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until no live streams remain.
    pub(crate) async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;

    fn entry() -> StreamEntry {
        let (tx, _rx) = mpsc::channel(1);
        StreamEntry::new(tx, CancellationToken::new())
    }

    #[test]
    fn allocate_is_monotonic() {
        let table = StreamTable::new();
        let first = table.allocate();
        let second = table.allocate();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn allocate_is_unique_across_threads() {
        let table = std::sync::Arc::new(StreamTable::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| table.allocate()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("allocator thread should finish") {
                assert!(seen.insert(id), "id {id} allocated twice");
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let table = StreamTable::new();
        table.insert(1, entry()).unwrap();
        let err = table.insert(1, entry()).unwrap_err();
        assert!(matches!(err, TunnelError::DuplicateStream { id: 1 }));
    }

    #[test]
    fn retired_id_cannot_be_reinserted() {
        let table = StreamTable::new();
        table.insert(1, entry()).unwrap();
        assert!(table.remove(1).is_some());
        assert!(table.is_retired(1));

        let err = table.insert(1, entry()).unwrap_err();
        assert!(matches!(err, TunnelError::DuplicateStream { id: 1 }));
    }

    #[test]
    fn remove_cancels_the_stream() {
        let table = StreamTable::new();
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        table
            .insert(3, StreamEntry::new(tx, cancel.clone()))
            .unwrap();

        let removed = table.remove(3).expect("stream should be live");
        assert_eq!(removed.state, StreamState::Closing);
        assert!(cancel.is_cancelled());
        assert!(!table.contains(3));
    }

    #[test]
    fn mark_open_transitions_state() {
        let table = StreamTable::new();
        table.insert(4, entry()).unwrap();
        assert_eq!(table.state(4), Some(StreamState::Opening));

        assert!(table.mark_open(4));
        assert_eq!(table.state(4), Some(StreamState::Open));

        table.remove(4);
        assert_eq!(table.state(4), None);
        assert!(!table.mark_open(4));
    }

    #[test]
    fn remove_unknown_is_none() {
        let table = StreamTable::new();
        assert!(table.remove(9).is_none());
        assert!(!table.is_retired(9));
    }

    #[test]
    fn drain_closes_everything() {
        let table = StreamTable::new();
        table.insert(1, entry()).unwrap();
        table.insert(2, entry()).unwrap();

        let mut closed = table.drain();
        closed.sort_unstable();
        assert_eq!(closed, [1, 2]);
        assert!(table.is_empty());
        assert!(table.is_retired(1));
        assert!(table.is_retired(2));
    }

    #[tokio::test]
    async fn wait_drained_wakes_on_last_removal() {
        let table = std::sync::Arc::new(StreamTable::new());
        table.insert(1, entry()).unwrap();

        let waiter = {
            let table = table.clone();
            tokio::spawn(async move { table.wait_drained().await })
        };

        tokio::task::yield_now().await;
        table.remove(1);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
    }

    #[tokio::test]
    async fn wait_drained_returns_immediately_when_empty() {
        let table = StreamTable::new();
        table.wait_drained().await;
    }
}
