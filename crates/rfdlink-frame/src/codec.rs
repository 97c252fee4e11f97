use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::checksum;
use crate::error::{FrameError, Result};

/// Start-of-frame marker.
pub const SOF: [u8; 2] = [0x1A, 0xCF];

/// Marker length.
pub const SOF_SIZE: usize = 2;

/// Header: type (1) + sequence (2, BE) + payload length (1).
pub const HEADER_SIZE: usize = 4;

/// Trailing CRC-16, big-endian.
pub const CHECKSUM_SIZE: usize = 2;

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Size of a frame with an empty payload.
pub const MIN_FRAME_SIZE: usize = SOF_SIZE + HEADER_SIZE + CHECKSUM_SIZE;

/// Size of a frame carrying [`MAX_PAYLOAD`] bytes.
pub const MAX_FRAME_SIZE: usize = MIN_FRAME_SIZE + MAX_PAYLOAD;

const HEADER_END: usize = SOF_SIZE + HEADER_SIZE;

/// One typed, sequenced unit of data carried by a frame.
///
/// Immutable once built; the payload is guaranteed to fit a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    packet_type: u8,
    sequence: u16,
    payload: Bytes,
}

impl Packet {
    /// Build a packet, rejecting payloads over [`MAX_PAYLOAD`] bytes.
    pub fn new(packet_type: u8, sequence: u16, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        Ok(Self {
            packet_type,
            sequence,
            payload,
        })
    }

    pub fn packet_type(&self) -> u8 {
        self.packet_type
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Total bytes this packet occupies on the wire.
    pub fn wire_size(&self) -> usize {
        MIN_FRAME_SIZE + self.payload.len()
    }

    /// Append this packet's frame to `dst`.
    pub fn write_to(&self, dst: &mut BytesMut) {
        put_frame(self.packet_type, self.sequence, &self.payload, dst);
    }

    /// Encode this packet into a standalone frame.
    pub fn to_frame(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        self.write_to(&mut dst);
        dst.freeze()
    }
}

/// Append one frame to `dst`.
///
/// Wire format:
/// ```text
/// ┌───────────┬────────┬─────────────┬──────────┬─────────────┬─────────────┐
/// │ SOF (2B)  │ Type   │ Sequence    │ Length   │ Payload     │ CRC-16      │
/// │ 0x1A 0xCF │ (1B)   │ (2B BE)     │ (1B)     │ (Length B)  │ (2B BE)     │
/// └───────────┴────────┴─────────────┴──────────┴─────────────┴─────────────┘
///                        CRC-16/Kermit covers Type .. Payload
/// ```
///
/// Oversized payloads fail before anything is written to `dst`.
pub fn encode_frame(
    packet_type: u8,
    sequence: u16,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    put_frame(packet_type, sequence, payload, dst);
    Ok(())
}

/// Encode one frame into a fresh buffer.
pub fn encode(packet_type: u8, sequence: u16, payload: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(MIN_FRAME_SIZE + payload.len());
    encode_frame(packet_type, sequence, payload, &mut dst)?;
    Ok(dst.freeze())
}

fn put_frame(packet_type: u8, sequence: u16, payload: &[u8], dst: &mut BytesMut) {
    debug_assert!(payload.len() <= MAX_PAYLOAD);
    dst.reserve(MIN_FRAME_SIZE + payload.len());

    let start = dst.len();
    dst.put_slice(&SOF);
    dst.put_u8(packet_type);
    dst.put_u16(sequence);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);

    let crc = checksum(&dst[start + SOF_SIZE..]);
    dst.put_u16(crc);
}

/// What to do after a frame fails its checksum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResyncPolicy {
    /// Skip the whole frame as sized by its (unverified) length byte.
    ///
    /// A corrupted length byte can make this skip over the next good frame.
    #[default]
    SkipDeclared,
    /// Skip only the first marker byte and scan again from there.
    RescanAfterSof,
}

/// Result of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A frame passed its checksum.
    Packet(Packet),
    /// No complete frame is buffered yet.
    NeedMoreData,
    /// A complete frame was found but its checksum did not match.
    ChecksumMismatch { received: u16, calculated: u16 },
}

/// One decode attempt: what was found and how many leading bytes the caller
/// must drop before the next attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub outcome: Outcome,
    /// Bytes to remove from the front of the buffer. May be non-zero even
    /// when no packet was produced.
    pub consumed: usize,
    /// Leading bytes before the marker that were treated as noise. Always
    /// included in `consumed`.
    pub skipped: usize,
}

impl Decoded {
    fn need_more(skipped: usize) -> Self {
        Self {
            outcome: Outcome::NeedMoreData,
            consumed: skipped,
            skipped,
        }
    }

    /// The decoded packet, if any.
    pub fn packet(&self) -> Option<&Packet> {
        match &self.outcome {
            Outcome::Packet(packet) => Some(packet),
            _ => None,
        }
    }

    /// Split into `(packet, consumed)`.
    pub fn into_parts(self) -> (Option<Packet>, usize) {
        match self.outcome {
            Outcome::Packet(packet) => (Some(packet), self.consumed),
            _ => (None, self.consumed),
        }
    }
}

/// Try to decode the first frame in `buf` with the default resync policy.
///
/// Never fails and never blocks. After every call the caller drops
/// `consumed` bytes from the front of `buf`; if a packet came back it calls
/// again straight away, otherwise it waits for more input first.
pub fn try_decode(buf: &[u8]) -> Decoded {
    try_decode_with(buf, ResyncPolicy::default())
}

/// Try to decode the first frame in `buf`.
///
/// Bytes before the first marker are noise: they are consumed together with
/// whatever follows, including on "need more data" results where the marker
/// and its partial frame stay buffered. Without a marker nothing is consumed,
/// so a marker split across two reads is still found on the next attempt.
pub fn try_decode_with(buf: &[u8], policy: ResyncPolicy) -> Decoded {
    let Some(start) = find_sof(buf) else {
        return Decoded::need_more(0);
    };

    let frame = &buf[start..];
    if frame.len() < MIN_FRAME_SIZE {
        return Decoded::need_more(start);
    }

    let packet_type = frame[SOF_SIZE];
    let sequence = u16::from_be_bytes([frame[SOF_SIZE + 1], frame[SOF_SIZE + 2]]);
    let payload_len = frame[SOF_SIZE + 3] as usize;
    let total = MIN_FRAME_SIZE + payload_len;
    if frame.len() < total {
        return Decoded::need_more(start);
    }

    let body_end = HEADER_END + payload_len;
    let received = u16::from_be_bytes([frame[body_end], frame[body_end + 1]]);
    let calculated = checksum(&frame[SOF_SIZE..body_end]);

    if received != calculated {
        let consumed = match policy {
            ResyncPolicy::SkipDeclared => start + total,
            ResyncPolicy::RescanAfterSof => start + 1,
        };
        return Decoded {
            outcome: Outcome::ChecksumMismatch {
                received,
                calculated,
            },
            consumed,
            skipped: start,
        };
    }

    let packet = Packet {
        packet_type,
        sequence,
        payload: Bytes::copy_from_slice(&frame[HEADER_END..body_end]),
    };
    Decoded {
        outcome: Outcome::Packet(packet),
        consumed: start + total,
        skipped: start,
    }
}

fn find_sof(buf: &[u8]) -> Option<usize> {
    buf.windows(SOF_SIZE).position(|window| window == SOF)
}

/// Configuration for buffered decoding.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Recovery behavior after a checksum mismatch.
    pub resync: ResyncPolicy,
    /// Cap on unconsumed buffered bytes; the oldest bytes are dropped beyond
    /// it. Never below [`MAX_FRAME_SIZE`]. Default: 64 KiB.
    pub max_buffered: usize,
    /// Consumed bytes tolerated at the front of the buffer before compacting.
    /// Default: 4 KiB.
    pub compact_threshold: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            resync: ResyncPolicy::SkipDeclared,
            max_buffered: 64 * 1024,
            compact_threshold: 4 * 1024,
        }
    }
}
