//! Stream-multiplexing tunnel core.
//!
//! A forward tunnels any number of independent logical TCP connections over
//! one transport channel. The daemon side accepts local clients and wraps
//! their bytes in typed frames; the service side dials the real target per
//! stream and fans traffic back out.
//!
//! The transport itself is supplied from outside: anything that is
//! `AsyncRead + AsyncWrite` works, from a TCP connection to an in-memory
//! duplex pipe in tests. Frame layout lives in [`muxfwd_frame`].

mod config;
mod demux;
mod error;
mod events;
mod forward;
mod mux;
mod stats;
mod stream;
mod table;

pub use config::ForwardConfig;
pub use error::{Result, TunnelError};
pub use events::ForwardEvent;
pub use forward::{Forward, Role};
pub use stats::StatsSnapshot;
pub use stream::StreamState;

pub use muxfwd_frame::StreamId;
