//! `tokio_util::codec` adapter for async links.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::buffer::{apply_decoded, emit, DecodeStats, Step};
use crate::codec::{try_decode_with, DecoderConfig, Packet, MAX_FRAME_SIZE};
use crate::error::FrameError;
use crate::observer::{DecodeEvent, DecodeObserver, TracingObserver};

/// Frames packets for `FramedRead` / `FramedWrite`.
///
/// Decoding follows the same rules as [`crate::DecodeBuffer`]: noise and
/// corrupt frames are dropped and reported to the observer, never returned as
/// errors. Encoding writes packets with the sequence number they carry.
#[derive(Debug)]
pub struct PacketCodec<O = TracingObserver> {
    config: DecoderConfig,
    observer: O,
    stats: DecodeStats,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self::with_observer(config, TracingObserver)
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: DecodeObserver> PacketCodec<O> {
    pub fn with_observer(mut config: DecoderConfig, observer: O) -> Self {
        config.max_buffered = config.max_buffered.max(MAX_FRAME_SIZE);
        Self {
            config,
            observer,
            stats: DecodeStats::default(),
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    fn enforce_cap(&mut self, src: &mut BytesMut) {
        if src.len() > self.config.max_buffered {
            let dropped = src.len() - self.config.max_buffered;
            src.advance(dropped);
            emit(
                DecodeEvent::Overflow { dropped },
                &mut self.stats,
                &mut self.observer,
            );
        }
    }
}

impl<O: DecodeObserver> Decoder for PacketCodec<O> {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let decoded = try_decode_with(src, self.config.resync);
            src.advance(decoded.consumed);

            match apply_decoded(decoded, &mut self.stats, &mut self.observer) {
                Step::Packet(packet) => return Ok(Some(packet)),
                Step::Retry => continue,
                Step::NeedMoreData => {
                    self.enforce_cap(src);
                    src.reserve(MAX_FRAME_SIZE.saturating_sub(src.len()));
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(packet) = self.decode(src)? {
            return Ok(Some(packet));
        }
        if !src.is_empty() {
            emit(
                DecodeEvent::Discarded { bytes: src.len() },
                &mut self.stats,
                &mut self.observer,
            );
            src.clear();
        }
        Ok(None)
    }
}

impl<O> Encoder<Packet> for PacketCodec<O> {
    type Error = FrameError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}
