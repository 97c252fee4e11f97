//! Async link: one task reads, one task writes, channels in between.
//!
//! The receiver task owns the read half and its decode buffer. The sender
//! task owns the write half and the outgoing sequence counter; every
//! [`LinkSender`] clone goes through it, so sequence numbers stay strictly
//! increasing no matter how many producers share the link.

use futures_util::{SinkExt, StreamExt};
use rfdlink_frame::{
    DecodeEvent, DecodeObserver, DecodeStats, DecoderConfig, Packet, PacketCodec,
    TracingObserver,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::error::{DispatchError, Result};
use crate::message::Message;

/// Settings shared by the receiver and sender tasks.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub decoder: DecoderConfig,
    /// Capacity of the packet and send-request channels.
    pub channel_capacity: usize,
    /// Sequence number of the first packet sent.
    pub initial_sequence: u16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            channel_capacity: 64,
            initial_sequence: 0,
        }
    }
}

/// Logs decode events and keeps a live copy of the counters.
struct StatsPublisher {
    stats: watch::Sender<DecodeStats>,
}

impl DecodeObserver for StatsPublisher {
    fn on_event(&mut self, event: &DecodeEvent) {
        TracingObserver.on_event(event);
        self.stats.send_modify(|stats| stats.record(event));
    }
}

/// Handle to the receiver task.
///
/// The decoder counters are published as they change, so they stay readable
/// after the task has been aborted.
#[derive(Debug)]
pub struct ReceiverHandle {
    task: JoinHandle<Result<DecodeStats>>,
    stats: watch::Receiver<DecodeStats>,
}

impl ReceiverHandle {
    /// Counters as of the last decode event.
    pub fn stats(&self) -> DecodeStats {
        *self.stats.borrow()
    }

    /// Stop the task. Reads on the link are cancelled at the next await point.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task and return its final counters.
    ///
    /// An aborted task yields the counters published before it stopped.
    pub async fn join(self) -> Result<DecodeStats> {
        let Self { task, stats } = self;
        match task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Ok(*stats.borrow()),
        }
    }
}

/// Spawn a task that decodes packets from `reader` into a bounded channel.
///
/// The task ends when the stream closes or the channel receiver is dropped.
pub fn spawn_receiver<R>(
    reader: R,
    config: &LinkConfig,
) -> (mpsc::Receiver<Packet>, ReceiverHandle)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let (stats_tx, stats_rx) = watch::channel(DecodeStats::default());
    let codec = PacketCodec::with_observer(
        config.decoder.clone(),
        StatsPublisher { stats: stats_tx },
    );

    let task = tokio::spawn(receive_loop(FramedRead::new(reader, codec), tx));

    (
        rx,
        ReceiverHandle {
            task,
            stats: stats_rx,
        },
    )
}

async fn receive_loop<R>(
    mut framed: FramedRead<R, PacketCodec<StatsPublisher>>,
    tx: mpsc::Sender<Packet>,
) -> Result<DecodeStats>
where
    R: AsyncRead + Unpin,
{
    while let Some(item) = framed.next().await {
        let packet = item?;
        if tx.send(packet).await.is_err() {
            debug!("packet receiver dropped, stopping");
            break;
        }
    }
    let stats = framed.decoder().stats();
    info!(
        packets = stats.packets,
        corrupt = stats.corrupt_frames,
        "receive task finished"
    );
    Ok(stats)
}

struct SendRequest {
    message: Message,
    reply: oneshot::Sender<Result<u16>>,
}

/// Cloneable handle to the sender task.
#[derive(Debug, Clone)]
pub struct LinkSender {
    tx: mpsc::Sender<SendRequest>,
}

impl LinkSender {
    /// Queue `message` and wait until it has been written.
    ///
    /// Returns the sequence number it was sent with.
    pub async fn send(&self, message: Message) -> Result<u16> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(SendRequest { message, reply })
            .await
            .map_err(|_| DispatchError::LinkClosed)?;
        response.await.map_err(|_| DispatchError::LinkClosed)?
    }

    /// True once the sender task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the task that owns `writer` and the outgoing sequence counter.
///
/// The task runs until every [`LinkSender`] is dropped or the stream fails,
/// and returns the sequence number the next packet would have used.
pub fn spawn_sender<W>(writer: W, config: &LinkConfig) -> (LinkSender, JoinHandle<u16>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<SendRequest>(config.channel_capacity.max(1));
    let mut next_sequence = config.initial_sequence;

    let handle = tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, PacketCodec::new());
        while let Some(SendRequest { message, reply }) = rx.recv().await {
            let sequence = next_sequence;
            let result = match message.to_packet(sequence) {
                Ok(packet) => sink.send(packet).await.map_err(DispatchError::from),
                Err(err) => Err(DispatchError::from(err)),
            };

            let fatal = match &result {
                Ok(()) => {
                    next_sequence = sequence.wrapping_add(1);
                    debug!(sequence, packet_type = message.packet_type(), "sent");
                    false
                }
                Err(err) => {
                    warn!(sequence, error = %err, "send failed");
                    err.is_fatal()
                }
            };

            // The caller may have given up waiting; that is not an error here.
            let _ = reply.send(result.map(|()| sequence));
            if fatal {
                break;
            }
        }
        info!(next_sequence, "send task finished");
        next_sequence
    });

    (LinkSender { tx }, handle)
}

#[cfg(test)]
mod tests {
    use rfdlink_frame::packet_type::{MOTOR_COMMAND, TEXT_MESSAGE};
    use rfdlink_frame::FrameError;

    use super::*;

    #[tokio::test]
    async fn sender_to_receiver_over_duplex() {
        let (near, far) = tokio::io::duplex(4096);
        let config = LinkConfig::default();
        let (sender, send_task) = spawn_sender(near, &config);
        let (mut packets, recv_task) = spawn_receiver(far, &config);

        assert_eq!(sender.send(Message::Ping).await.unwrap(), 0);
        assert_eq!(sender.send(Message::motor(0.5, 0.5)).await.unwrap(), 1);
        assert_eq!(sender.send(Message::text("hello")).await.unwrap(), 2);

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(packets.recv().await.unwrap());
        }
        assert_eq!(
            received.iter().map(Packet::sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(received[1].packet_type(), MOTOR_COMMAND);
        assert_eq!(
            Message::from_packet(&received[2]).unwrap(),
            Message::text("hello")
        );

        drop(sender);
        assert_eq!(send_task.await.unwrap(), 3);

        let stats = recv_task.join().await.unwrap();
        assert_eq!(stats.packets, 3);
        assert!(packets.recv().await.is_none());
    }

    #[tokio::test]
    async fn clones_share_one_counter() {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let config = LinkConfig {
            initial_sequence: 65530,
            ..LinkConfig::default()
        };
        let (sender, send_task) = spawn_sender(near, &config);
        let (mut packets, _recv_task) = spawn_receiver(far, &config);

        let mut producers = Vec::new();
        for worker in 0..4 {
            let sender = sender.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..5 {
                    sender
                        .send(Message::text(format!("{worker}-{i}")))
                        .await
                        .unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        drop(sender);
        assert_eq!(send_task.await.unwrap(), 65530u16.wrapping_add(20));

        let mut expected = 65530u16;
        for _ in 0..20 {
            let packet = packets.recv().await.unwrap();
            assert_eq!(packet.sequence(), expected);
            assert_eq!(packet.packet_type(), TEXT_MESSAGE);
            expected = expected.wrapping_add(1);
        }
    }

    #[tokio::test]
    async fn oversized_message_keeps_counter() {
        let (near, _far) = tokio::io::duplex(4096);
        let (sender, _task) = spawn_sender(near, &LinkConfig::default());

        let err = sender.send(Message::text("x".repeat(256))).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Frame(FrameError::PayloadTooLarge { .. })
        ));
        assert_eq!(sender.send(Message::Ping).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_stream_stops_sender() {
        let (near, far) = tokio::io::duplex(64);
        drop(far);
        let (sender, task) = spawn_sender(near, &LinkConfig::default());

        let err = sender.send(Message::Ping).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(task.await.unwrap(), 0);
        assert!(matches!(
            sender.send(Message::Ping).await,
            Err(DispatchError::LinkClosed)
        ));
    }

    #[tokio::test]
    async fn receiver_stops_at_eof() {
        let (near, far) = tokio::io::duplex(64);
        let (mut packets, task) = spawn_receiver(far, &LinkConfig::default());
        drop(near);

        assert!(packets.recv().await.is_none());
        let stats = task.join().await.unwrap();
        assert_eq!(stats, DecodeStats::default());
    }

    #[tokio::test]
    async fn aborted_receiver_keeps_decode_stats() {
        use rfdlink_frame::encode;
        use tokio::io::AsyncWriteExt;

        let (mut near, far) = tokio::io::duplex(4096);
        let (mut packets, task) = spawn_receiver(far, &LinkConfig::default());

        let mut corrupt = encode(0, 1, b"").unwrap().to_vec();
        corrupt[4] ^= 0x01;
        let mut wire = vec![0x00, 0xFF, 0x55];
        wire.extend_from_slice(&corrupt);
        wire.extend_from_slice(&encode(2, 2, b"hi").unwrap());
        near.write_all(&wire).await.unwrap();

        assert_eq!(packets.recv().await.unwrap().sequence(), 2);
        assert_eq!(task.stats().corrupt_frames, 1);

        task.abort();
        let stats = task.join().await.unwrap();
        assert_eq!(stats.packets, 1);
        assert_eq!(stats.corrupt_frames, 1);
        assert_eq!(stats.discarded_bytes, 3);
        drop(near);
    }
}
