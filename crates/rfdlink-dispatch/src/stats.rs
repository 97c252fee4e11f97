use rfdlink_frame::DecodeStats;
use serde::Serialize;

/// Receive-side counters for one link session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Packets that passed framing and checksum.
    pub packets: u64,
    /// Frames dropped for a checksum mismatch.
    pub corrupt_frames: u64,
    /// Noise bytes skipped between frames.
    pub discarded_bytes: u64,
    /// Packets whose payload did not fit their type.
    pub payload_errors: u64,
    /// Packets of a type with no built-in layout.
    pub unknown_packets: u64,
    /// Packets inferred lost from sequence gaps.
    pub missed_packets: u64,
}

impl LinkStats {
    /// Percentage of complete frames that passed their checksum.
    ///
    /// `None` until at least one frame has been seen.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.packets + self.corrupt_frames;
        if total == 0 {
            return None;
        }
        Some(self.packets as f64 / total as f64 * 100.0)
    }

    /// Take frame-level counters from the decoder.
    pub fn absorb_decode(&mut self, decode: &DecodeStats) {
        self.corrupt_frames = decode.corrupt_frames;
        self.discarded_bytes = decode.discarded_bytes + decode.overflow_bytes;
    }
}
