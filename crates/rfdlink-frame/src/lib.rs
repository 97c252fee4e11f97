//! Packet framing for half-duplex serial radio links.
//!
//! Every packet travels as one frame:
//! - a 2-byte start-of-frame marker `0x1A 0xCF` for resynchronization
//! - a 4-byte header: type, big-endian sequence, payload length
//! - up to 255 payload bytes
//! - a big-endian CRC-16/Kermit over header and payload
//!
//! The decoder recovers frames from a byte stream that may arrive in any
//! chunking, carry line noise between frames, or lose bytes entirely.

pub mod buffer;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod observer;
pub mod packet_type;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use buffer::{DecodeBuffer, DecodeStats};
pub use checksum::checksum;
pub use codec::{
    encode, encode_frame, try_decode, try_decode_with, Decoded, DecoderConfig, Outcome, Packet,
    ResyncPolicy, CHECKSUM_SIZE, HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD, MIN_FRAME_SIZE, SOF,
    SOF_SIZE,
};
pub use error::{FrameError, Result};
pub use observer::{DecodeEvent, DecodeObserver, NoopObserver, TracingObserver};
pub use packet_type::{MOTOR_COMMAND, PING, SENSOR_DATA, TEXT_MESSAGE};
pub use reader::PacketReader;
pub use writer::PacketWriter;

#[cfg(feature = "async")]
pub use tokio_codec::PacketCodec;
