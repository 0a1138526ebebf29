/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The 4-byte type tag does not match any known message type.
    ///
    /// Once this fires the frame boundary can no longer be trusted; the
    /// transport must be torn down rather than resynchronized.
    #[error("unknown message type {code:#010x} ({})", fourcc(*code))]
    UnknownMessageType { code: u32 },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The transport closed cleanly at a frame boundary.
    #[error("transport closed")]
    Closed,

    /// The transport closed mid-frame; the declared payload never arrived.
    #[error("truncated frame ({buffered} bytes of an incomplete frame buffered)")]
    Truncated { buffered: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Render a wire tag as its four ASCII bytes, dotting out non-printables.
fn fourcc(code: u32) -> String {
    code.to_be_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_carries_label_and_integer() {
        let err = FrameError::UnknownMessageType {
            code: u32::from_be_bytes(*b"XXXX"),
        };
        let msg = err.to_string();
        assert!(msg.contains("XXXX"), "message was: {msg}");
        assert!(msg.contains("0x58585858"), "message was: {msg}");
    }

    #[test]
    fn unknown_type_dots_unprintable_bytes() {
        let err = FrameError::UnknownMessageType { code: 0x0102_0304 };
        assert!(err.to_string().contains("...."));
    }
}
