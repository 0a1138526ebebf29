use std::time::Duration;

/// Tuning knobs for one forward.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Maximum DATA payload per frame. Default: 1 MiB.
    pub max_payload_size: usize,
    /// Maximum concurrent streams. Connections beyond the limit are refused
    /// at admission (local accept dropped, OPEN answered with CLSE).
    /// Default: 256.
    pub max_streams: usize,
    /// How long the service side waits for the daemon's REDY before
    /// declaring the forward dead. Default: 5s.
    pub ready_timeout: Duration,
    /// How long `stop` waits for open streams to drain before force-closing
    /// the remainder. Default: 5s.
    pub drain_timeout: Duration,
    /// Depth of the shared frame queue feeding the transport writer task.
    pub writer_queue_depth: usize,
    /// Depth of each stream's inbound payload queue. A full queue suspends
    /// the transport reader: this is the flow-control point, since the
    /// protocol has no window mechanism beyond REDY.
    pub stream_queue_depth: usize,
    /// Local socket read size per DATA frame. Default: 64 KiB.
    pub read_chunk_size: usize,
    /// Optional per-read timeout on the shared transport. Exceeding it is
    /// fatal to the forward — framing is unrecoverable mid-read. `None`
    /// (the default) lets idle forwards stay up indefinitely.
    pub transport_read_timeout: Option<Duration>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            max_payload_size: muxfwd_frame::DEFAULT_MAX_PAYLOAD,
            max_streams: 256,
            ready_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(5),
            writer_queue_depth: 32,
            stream_queue_depth: 32,
            read_chunk_size: 64 * 1024,
            transport_read_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ForwardConfig::default();
        assert_eq!(config.max_payload_size, muxfwd_frame::DEFAULT_MAX_PAYLOAD);
        assert!(config.max_streams > 0);
        assert!(config.read_chunk_size <= config.max_payload_size);
    }
}
