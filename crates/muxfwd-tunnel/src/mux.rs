//! Daemon-side multiplexer: accepts local client connections and turns each
//! one into a logical stream on the shared transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use muxfwd_frame::Frame;

use crate::error::TunnelError;
use crate::events::ForwardEvent;
use crate::forward::Shared;
use crate::stream::{self, StreamEntry};

/// Accept local connections while the forward admits new streams.
///
/// REDY goes out as soon as the listener is bound: the peer may start
/// demultiplexing the moment it sees it. A failure to bind is fatal — the
/// forward has no way to do its job without the listener.
pub(crate) async fn run_acceptor(shared: Arc<Shared>, listen: SocketAddr) {
    let listener = match TcpListener::bind(listen).await {
        Ok(listener) => listener,
        Err(err) => {
            shared.fatal(TunnelError::Io(err));
            return;
        }
    };
    match listener.local_addr() {
        Ok(addr) => {
            let _ = shared.local_addr.set(addr);
            info!(%addr, "listening for local clients");
        }
        Err(err) => {
            shared.fatal(TunnelError::Io(err));
            return;
        }
    }

    if shared.send_frame(Frame::ready()).await.is_err() {
        return;
    }
    shared.set_ready();

    loop {
        let accepted = tokio::select! {
            _ = shared.cancel.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((socket, peer)) => {
                if !shared.is_accepting() {
                    debug!(%peer, "not accepting new streams, dropping connection");
                    continue;
                }
                if shared.table.len() >= shared.config.max_streams {
                    warn!(%peer, "stream limit reached, refusing local connection");
                    shared.stats.record_stream_refused();
                    continue;
                }
                open_stream(&shared, socket, peer).await;
            }
            Err(err) => {
                warn!(error = %err, "local accept failed");
                // Avoid a hot loop when accept keeps failing (e.g. fd limit).
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn open_stream(shared: &Arc<Shared>, socket: TcpStream, peer: SocketAddr) {
    let id = shared.table.allocate();
    let (inbound_tx, inbound_rx) = mpsc::channel(shared.config.stream_queue_depth);
    let cancel = shared.cancel.child_token();

    if let Err(err) = shared
        .table
        .insert(id, StreamEntry::new(inbound_tx, cancel.clone()))
    {
        // Allocated ids are unique, so a collision means the table state is
        // no longer trustworthy.
        shared.fatal(err);
        return;
    }
    if shared.send_frame(Frame::open(id)).await.is_err() {
        return;
    }
    shared.table.mark_open(id);

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
    debug!(stream_id = id, %peer, "local connection accepted");
}
