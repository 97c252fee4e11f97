use std::fmt;
use std::io;

use rfdlink_dispatch::DispatchError;
use rfdlink_frame::FrameError;
use rfdlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
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
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { ref source, .. } | TransportError::Configure { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(
                PERMISSION_DENIED,
                format!("{context}: {err} (is the user in the dialout group?)"),
            )
        }
        TransportError::Open { .. } | TransportError::Configure { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::UnsupportedBaud(_)
        | TransportError::InvalidPortSpec(_)
        | TransportError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn dispatch_error(context: &str, err: DispatchError) -> CliError {
    match err {
        DispatchError::Frame(err) => frame_error(context, err),
        DispatchError::Payload(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        DispatchError::LinkClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn permission_denied_maps_to_50() {
        let err = TransportError::Open {
            path: PathBuf::from("/dev/ttyUSB0"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let cli = transport_error("open failed", err);
        assert_eq!(cli.code, PERMISSION_DENIED);
        assert!(cli.message.contains("dialout"));
    }

    #[test]
    fn usage_errors() {
        assert_eq!(
            transport_error("open failed", TransportError::UnsupportedBaud(12345)).code,
            USAGE
        );
        assert_eq!(
            frame_error(
                "send failed",
                FrameError::PayloadTooLarge { size: 300, max: 255 }
            )
            .code,
            DATA_INVALID
        );
    }

    #[test]
    fn timeouts_and_missing_sockets() {
        let err = FrameError::Io(io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(frame_error("read failed", err).code, TIMEOUT);

        let err = TransportError::Connect {
            path: PathBuf::from("/tmp/missing.sock"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(transport_error("connect failed", err).code, TRANSPORT_ERROR);
    }
}
