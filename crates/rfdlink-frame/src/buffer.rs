//! Receive-side buffer that applies the decode contract.
//!
//! Bytes are appended at the back; decoding moves a cursor forward instead of
//! shifting the storage after every frame. The consumed prefix is released
//! only once the cursor has moved past `compact_threshold`, which keeps
//! sustained traffic linear in the number of bytes received.

use bytes::{Buf, BytesMut};

use crate::codec::{
    try_decode_with, Decoded, DecoderConfig, Outcome, Packet, MAX_FRAME_SIZE,
};
use crate::observer::{DecodeEvent, DecodeObserver};

/// Running totals for one buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Frames that passed their checksum.
    pub packets: u64,
    /// Frames dropped for a checksum mismatch.
    pub corrupt_frames: u64,
    /// Noise bytes dropped while looking for a start marker.
    pub discarded_bytes: u64,
    /// Bytes dropped because the buffer cap was reached.
    pub overflow_bytes: u64,
}

impl DecodeStats {
    /// Count one decode event.
    pub fn record(&mut self, event: &DecodeEvent) {
        match *event {
            DecodeEvent::Packet { .. } => self.packets += 1,
            DecodeEvent::Discarded { bytes } => self.discarded_bytes += bytes as u64,
            DecodeEvent::ChecksumMismatch { .. } => self.corrupt_frames += 1,
            DecodeEvent::Overflow { dropped } => self.overflow_bytes += dropped as u64,
        }
    }
}

/// Where one decode attempt left the caller.
pub(crate) enum Step {
    Packet(Packet),
    /// A corrupt frame was dropped; try again on the remaining bytes.
    Retry,
    NeedMoreData,
}

/// Count `event` and hand it to the observer.
pub(crate) fn emit<O: DecodeObserver>(
    event: DecodeEvent,
    stats: &mut DecodeStats,
    observer: &mut O,
) {
    stats.record(&event);
    observer.on_event(&event);
}

/// Report the events of one [`Decoded`] and say what to do next. The caller
/// has already dropped `decoded.consumed` bytes.
pub(crate) fn apply_decoded<O: DecodeObserver>(
    decoded: Decoded,
    stats: &mut DecodeStats,
    observer: &mut O,
) -> Step {
    if decoded.skipped > 0 {
        emit(
            DecodeEvent::Discarded {
                bytes: decoded.skipped,
            },
            stats,
            observer,
        );
    }

    match decoded.outcome {
        Outcome::Packet(packet) => {
            emit(
                DecodeEvent::Packet {
                    packet_type: packet.packet_type(),
                    sequence: packet.sequence(),
                    payload_len: packet.payload().len(),
                },
                stats,
                observer,
            );
            Step::Packet(packet)
        }
        Outcome::ChecksumMismatch {
            received,
            calculated,
        } => {
            emit(
                DecodeEvent::ChecksumMismatch {
                    received,
                    calculated,
                    skipped: decoded.consumed - decoded.skipped,
                },
                stats,
                observer,
            );
            Step::Retry
        }
        Outcome::NeedMoreData => Step::NeedMoreData,
    }
}

/// Owns received bytes and extracts packets from them.
#[derive(Debug)]
pub struct DecodeBuffer {
    buf: BytesMut,
    cursor: usize,
    config: DecoderConfig,
    stats: DecodeStats,
}

impl Default for DecodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeBuffer {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(mut config: DecoderConfig) -> Self {
        config.max_buffered = config.max_buffered.max(MAX_FRAME_SIZE);
        Self {
            buf: BytesMut::with_capacity(config.compact_threshold.max(MAX_FRAME_SIZE)),
            cursor: 0,
            config,
            stats: DecodeStats::default(),
        }
    }

    /// Append newly received bytes.
    ///
    /// If the unconsumed bytes then exceed `max_buffered`, the oldest are
    /// dropped and an [`DecodeEvent::Overflow`] is reported.
    pub fn push<O: DecodeObserver>(&mut self, data: &[u8], observer: &mut O) {
        self.buf.extend_from_slice(data);

        let pending = self.len();
        if pending > self.config.max_buffered {
            let dropped = pending - self.config.max_buffered;
            self.cursor += dropped;
            emit(DecodeEvent::Overflow { dropped }, &mut self.stats, observer);
            self.maybe_compact();
        }
    }

    /// Decode the next packet, dropping noise and corrupt frames on the way.
    ///
    /// Returns `None` once more bytes are needed; call again after the next
    /// [`push`](Self::push).
    pub fn decode_next<O: DecodeObserver>(&mut self, observer: &mut O) -> Option<Packet> {
        loop {
            let decoded = try_decode_with(&self.buf[self.cursor..], self.config.resync);
            self.cursor += decoded.consumed;

            match apply_decoded(decoded, &mut self.stats, observer) {
                Step::Packet(packet) => {
                    self.maybe_compact();
                    return Some(packet);
                }
                Step::Retry => continue,
                Step::NeedMoreData => {
                    self.maybe_compact();
                    return None;
                }
            }
        }
    }

    /// Decode every complete packet currently buffered.
    pub fn decode_all<O: DecodeObserver>(&mut self, observer: &mut O) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Some(packet) = self.decode_next(observer) {
            packets.push(packet);
        }
        packets
    }

    /// Unconsumed bytes, oldest first.
    pub fn pending(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.buf.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything buffered. Statistics are kept.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    fn maybe_compact(&mut self) {
        if self.cursor == self.buf.len() {
            self.buf.clear();
            self.cursor = 0;
        } else if self.cursor >= self.config.compact_threshold {
            self.buf.advance(self.cursor);
            self.cursor = 0;
        }
    }
}
