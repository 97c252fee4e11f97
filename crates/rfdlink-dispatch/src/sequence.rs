/// Tracks the last accepted sequence number to report lost packets.
///
/// Sequence numbers wrap at 65536, so the gap is computed modulo 65536. A
/// repeated or reordered packet therefore shows up as a large gap; the tracker
/// only reports, it never rejects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceTracker {
    last: Option<u16>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted packet and return how many packets were missed
    /// before it. The first packet seen never reports a gap.
    pub fn observe(&mut self, sequence: u16) -> u16 {
        let gap = match self.last {
            Some(last) => sequence.wrapping_sub(last.wrapping_add(1)),
            None => 0,
        };
        self.last = Some(sequence);
        gap
    }

    /// Sequence number the next packet should carry, if any packet was seen.
    pub fn expected(&self) -> Option<u16> {
        self.last.map(|last| last.wrapping_add(1))
    }

    pub fn last(&self) -> Option<u16> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_packet_has_no_gap() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(500), 0);
        assert_eq!(tracker.last(), Some(500));
        assert_eq!(tracker.expected(), Some(501));
    }

    #[test]
    fn contiguous_and_missing() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(10);
        assert_eq!(tracker.observe(11), 0);
        assert_eq!(tracker.observe(15), 3);
        assert_eq!(tracker.last(), Some(15));
    }

    #[test]
    fn wraps_at_65536() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(65534);
        assert_eq!(tracker.observe(65535), 0);
        assert_eq!(tracker.observe(0), 0);

        tracker.observe(65533);
        assert_eq!(tracker.observe(2), 4);
    }

    #[test]
    fn repeat_is_reported_as_large_gap() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(7);
        assert_eq!(tracker.observe(7), u16::MAX);
    }

    #[test]
    fn reset_forgets_history() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(1);
        tracker.reset();
        assert_eq!(tracker.observe(100), 0);
    }
}
