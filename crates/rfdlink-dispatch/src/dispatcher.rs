use rfdlink_frame::{DecodeStats, Packet};
use tracing::{debug, warn};

use crate::error::PayloadError;
use crate::message::Message;
use crate::sequence::SequenceTracker;
use crate::stats::LinkStats;

/// Receives routed messages. Every method defaults to doing nothing, so a
/// handler only implements the types it cares about.
#[allow(unused_variables)]
pub trait MessageHandler {
    fn on_ping(&mut self, sequence: u16) {}

    fn on_motor_command(&mut self, sequence: u16, left: f32, right: f32) {}

    fn on_text(&mut self, sequence: u16, text: &str) {}

    fn on_sensor_data(&mut self, sequence: u16, temperature: f32, humidity: f32, pressure: f32) {}

    fn on_unknown(&mut self, sequence: u16, packet_type: u8, payload: &[u8]) {}

    /// A packet arrived intact but its payload did not fit its type.
    fn on_payload_error(&mut self, packet: &Packet, error: &PayloadError) {}

    /// `missed` packets were lost between `expected` and `received`.
    fn on_gap(&mut self, expected: u16, received: u16, missed: u16) {}
}

impl MessageHandler for () {}

/// Outcome of dispatching one packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub sequence: u16,
    pub packet_type: u8,
    /// Packets missed immediately before this one.
    pub gap: u16,
    pub message: Result<Message, PayloadError>,
}

/// Tracks sequence gaps and routes packets to a [`MessageHandler`].
#[derive(Debug, Default)]
pub struct Dispatcher<H = ()> {
    handler: H,
    tracker: SequenceTracker,
    stats: LinkStats,
}

impl<H: MessageHandler> Dispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            tracker: SequenceTracker::new(),
            stats: LinkStats::default(),
        }
    }

    /// Handle one accepted packet.
    ///
    /// The sequence tracker is updated for every packet, including ones whose
    /// payload turns out to be invalid.
    pub fn dispatch(&mut self, packet: &Packet) -> Dispatch {
        let sequence = packet.sequence();
        let expected = self.tracker.expected();
        let gap = self.tracker.observe(sequence);
        self.stats.packets += 1;

        if gap != 0 {
            self.stats.missed_packets += u64::from(gap);
            let expected = expected.unwrap_or(sequence);
            warn!(expected, received = sequence, missed = gap, "sequence gap");
            self.handler.on_gap(expected, sequence, gap);
        }

        let message = Message::from_packet(packet);
        match &message {
            Ok(message) => self.route(sequence, message),
            Err(err) => {
                self.stats.payload_errors += 1;
                warn!(
                    packet_type = packet.packet_type(),
                    sequence,
                    error = %err,
                    "payload rejected"
                );
                self.handler.on_payload_error(packet, err);
            }
        }

        Dispatch {
            sequence,
            packet_type: packet.packet_type(),
            gap,
            message,
        }
    }

    fn route(&mut self, sequence: u16, message: &Message) {
        debug!(sequence, packet_type = message.packet_type(), "dispatching");
        match message {
            Message::Ping => self.handler.on_ping(sequence),
            Message::MotorCommand { left, right } => {
                self.handler.on_motor_command(sequence, *left, *right)
            }
            Message::TextMessage { text } => self.handler.on_text(sequence, text),
            Message::SensorData {
                temperature,
                humidity,
                pressure,
            } => self
                .handler
                .on_sensor_data(sequence, *temperature, *humidity, *pressure),
            Message::Unknown {
                packet_type,
                payload,
            } => {
                self.stats.unknown_packets += 1;
                self.handler.on_unknown(sequence, *packet_type, payload)
            }
        }
    }

    /// Fold in frame-level counters from the decoder feeding this dispatcher.
    pub fn record_decode_stats(&mut self, decode: &DecodeStats) {
        self.stats.absorb_decode(decode);
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}
