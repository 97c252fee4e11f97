use rfdlink_frame::FrameError;

/// A validly framed packet whose payload does not fit its type.
///
/// Never fatal: the link keeps running and the next packet is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// Fixed-size payload with the wrong length.
    #[error("packet type {packet_type} expects {expected} payload bytes, got {actual}")]
    Length {
        packet_type: u8,
        expected: usize,
        actual: usize,
    },

    /// Text payload that is not UTF-8.
    #[error("text payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Errors that can occur while driving a link.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Payload could not be decoded for its type.
    #[error("payload error: {0}")]
    Payload(#[from] PayloadError),

    /// The link task has stopped.
    #[error("link closed")]
    LinkClosed,
}

impl DispatchError {
    /// True when the underlying byte stream is unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Frame(FrameError::Io(_) | FrameError::ConnectionClosed) | Self::LinkClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
