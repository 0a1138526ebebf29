//! Multiplexed reverse port forwarding over a single transport channel.
//!
//! muxfwd tunnels any number of independent logical TCP connections through
//! one raw byte channel: a daemon near the clients packages their streams
//! into typed, length-prefixed frames; a service near the targets fans the
//! frames back out into real connections.
//!
//! # Crate Structure
//!
//! - [`frame`] — Typed 12-byte header framing (the wire format)
//! - [`tunnel`] — Multiplexer, demultiplexer and forward lifecycle
//!   (behind the `tunnel` feature)

/// Re-export frame types.
pub mod frame {
    pub use muxfwd_frame::*;
}

/// Re-export tunnel types (requires `tunnel` feature).
#[cfg(feature = "tunnel")]
pub mod tunnel {
    pub use muxfwd_tunnel::*;
}
