use std::fmt;
use std::io;

use muxfwd_frame::FrameError;
use muxfwd_tunnel::TunnelError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => FAILURE,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn tunnel_error(context: &str, err: TunnelError) -> CliError {
    let code = tunnel_exit_code(&err);
    CliError::new(code, format!("{context}: {err}"))
}

/// Map a forward's terminal error to the process exit code.
pub fn tunnel_exit_code(err: &TunnelError) -> i32 {
    match err {
        TunnelError::Frame(frame) => match frame {
            FrameError::UnknownMessageType { .. }
            | FrameError::PayloadTooLarge { .. }
            | FrameError::Truncated { .. } => DATA_INVALID,
            FrameError::Closed | FrameError::Io(_) => TRANSPORT_ERROR,
        },
        TunnelError::DuplicateStream { .. } | TunnelError::UnknownStream { .. } => DATA_INVALID,
        TunnelError::Io(_) | TunnelError::TransportClosed => TRANSPORT_ERROR,
        TunnelError::ReadyTimeout(_) => TIMEOUT,
        TunnelError::WrongRole => USAGE,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn protocol_violations_map_to_data_invalid() {
        assert_eq!(
            tunnel_exit_code(&TunnelError::DuplicateStream { id: 1 }),
            DATA_INVALID
        );
        assert_eq!(
            tunnel_exit_code(&TunnelError::UnknownStream { id: 1 }),
            DATA_INVALID
        );
        assert_eq!(
            tunnel_exit_code(&TunnelError::Frame(FrameError::UnknownMessageType {
                code: 0
            })),
            DATA_INVALID
        );
    }

    #[test]
    fn transport_failures_map_to_transport_error() {
        assert_eq!(
            tunnel_exit_code(&TunnelError::TransportClosed),
            TRANSPORT_ERROR
        );
        assert_eq!(
            tunnel_exit_code(&TunnelError::Frame(FrameError::Closed)),
            TRANSPORT_ERROR
        );
    }

    #[test]
    fn ready_timeout_maps_to_timeout() {
        assert_eq!(
            tunnel_exit_code(&TunnelError::ReadyTimeout(Duration::from_secs(5))),
            TIMEOUT
        );
    }
}
