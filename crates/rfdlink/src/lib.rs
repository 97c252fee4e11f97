//! Packet framing for half-duplex serial radio links.
//!
//! rfdlink carries small typed packets over an unreliable byte stream such as
//! an RFD-900x modem pair. Each frame is marked, sequenced and checksummed so
//! the receiver can resynchronize after noise, truncation or corruption.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial TTYs and Unix socket loopback links
//! - [`frame`]: frame codec, resynchronizing decoder, blocking reader/writer
//! - [`dispatch`]: typed messages, sequence gap tracking, routing

/// Re-export transport types.
pub mod transport {
    pub use rfdlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rfdlink_frame::*;
}

/// Re-export dispatch types.
pub mod dispatch {
    pub use rfdlink_dispatch::*;
}
