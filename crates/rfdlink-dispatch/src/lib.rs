//! Consumer side of an rfdlink: typed messages, sequence gap tracking and
//! type-based routing of decoded packets.
//!
//! Framing never interprets payloads. This crate turns a validly framed
//! [`Packet`](rfdlink_frame::Packet) into a [`Message`] on demand, so a bad
//! payload is reported per packet without disturbing the byte stream.

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod sequence;
pub mod stats;

#[cfg(feature = "async")]
pub mod link;

pub use dispatcher::{Dispatch, Dispatcher, MessageHandler};
pub use error::{DispatchError, PayloadError, Result};
pub use message::Message;
pub use sequence::SequenceTracker;
pub use stats::LinkStats;

#[cfg(feature = "async")]
pub use link::{spawn_receiver, spawn_sender, LinkConfig, LinkSender, ReceiverHandle};
