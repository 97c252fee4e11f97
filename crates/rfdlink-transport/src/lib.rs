//! Byte transports for the rfdlink radio protocol.
//!
//! The protocol layers above only need an ordered byte stream. This crate
//! provides the two streams the tooling actually uses:
//! - a serial TTY in raw 8N1 mode (the radio modem itself)
//! - a Unix domain socket, used as a loopback link on the bench
//!
//! Both are exposed through the single [`LinkStream`] type.

pub mod error;
pub mod port;
pub mod stream;

#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use port::{candidate_ports, PortInfo, PortSpec};
pub use stream::LinkStream;

#[cfg(unix)]
pub use port::{inspect_port, open_port};
#[cfg(unix)]
pub use serial::{SerialConfig, SerialPort, DEFAULT_BAUD};
#[cfg(unix)]
pub use uds::LoopbackSocket;

#[cfg(feature = "async")]
pub use stream::{AsyncLinkReader, AsyncLinkWriter};
