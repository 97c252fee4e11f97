//! Decode event hook.
//!
//! The decoder itself never logs. Buffered decoding reports what it did
//! through a [`DecodeObserver`], so callers choose between tracing, counting,
//! or ignoring events.

use tracing::{debug, warn};

/// Something notable the buffered decoder did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A frame passed its checksum.
    Packet {
        packet_type: u8,
        sequence: u16,
        payload_len: usize,
    },
    /// Noise before a start marker was dropped.
    Discarded { bytes: usize },
    /// A frame failed its checksum; `skipped` bytes were dropped for it.
    ChecksumMismatch {
        received: u16,
        calculated: u16,
        skipped: usize,
    },
    /// The buffer cap was hit and the oldest bytes were dropped.
    Overflow { dropped: usize },
}

/// Receives decode events.
pub trait DecodeObserver {
    fn on_event(&mut self, event: &DecodeEvent);
}

impl<F> DecodeObserver for F
where
    F: FnMut(&DecodeEvent),
{
    fn on_event(&mut self, event: &DecodeEvent) {
        self(event)
    }
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DecodeObserver for NoopObserver {
    fn on_event(&mut self, _event: &DecodeEvent) {}
}

/// Forwards events to `tracing`: corruption at WARN, the rest at DEBUG.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DecodeObserver for TracingObserver {
    fn on_event(&mut self, event: &DecodeEvent) {
        match *event {
            DecodeEvent::Packet {
                packet_type,
                sequence,
                payload_len,
            } => debug!(packet_type, sequence, payload_len, "packet decoded"),
            DecodeEvent::Discarded { bytes } => debug!(bytes, "discarded noise before frame"),
            DecodeEvent::ChecksumMismatch {
                received,
                calculated,
                skipped,
            } => warn!(
                received = format_args!("{received:#06x}"),
                calculated = format_args!("{calculated:#06x}"),
                skipped,
                "checksum mismatch, frame dropped"
            ),
            DecodeEvent::Overflow { dropped } => {
                warn!(dropped, "decode buffer full, dropped oldest bytes")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_observe_events() {
        let mut seen = Vec::new();
        {
            let mut observer = |event: &DecodeEvent| seen.push(event.clone());
            observer.on_event(&DecodeEvent::Discarded { bytes: 3 });
            observer.on_event(&DecodeEvent::Overflow { dropped: 1 });
        }
        assert_eq!(
            seen,
            vec![
                DecodeEvent::Discarded { bytes: 3 },
                DecodeEvent::Overflow { dropped: 1 }
            ]
        );
    }

    #[test]
    fn builtin_observers_accept_all_events() {
        let events = [
            DecodeEvent::Packet {
                packet_type: 1,
                sequence: 2,
                payload_len: 8,
            },
            DecodeEvent::ChecksumMismatch {
                received: 0x1234,
                calculated: 0x4321,
                skipped: 16,
            },
        ];
        for event in &events {
            NoopObserver.on_event(event);
            TracingObserver.on_event(event);
        }
    }
}
