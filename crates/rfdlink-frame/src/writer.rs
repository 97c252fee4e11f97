use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Packet, MAX_FRAME_SIZE};
use crate::error::{FrameError, Result};

/// Writes frames to any `Write` stream and owns the outgoing sequence counter.
///
/// The counter starts at zero and advances by one, wrapping at 65536, after
/// each frame that was fully written and flushed. A failed write leaves it
/// unchanged, so the next attempt reuses the same number.
pub struct PacketWriter<T> {
    inner: T,
    buf: BytesMut,
    next_sequence: u16,
}

impl<T: Write> PacketWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::starting_at(inner, 0)
    }

    /// Create a writer whose first frame carries `sequence`.
    pub fn starting_at(inner: T, sequence: u16) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE),
            next_sequence: sequence,
        }
    }

    /// Frame `payload` with the next sequence number and write it.
    ///
    /// Returns the sequence number used.
    pub fn send(&mut self, packet_type: u8, payload: &[u8]) -> Result<u16> {
        let sequence = self.next_sequence;

        self.buf.clear();
        encode_frame(packet_type, sequence, payload, &mut self.buf)?;
        self.write_buffered()?;

        self.next_sequence = sequence.wrapping_add(1);
        Ok(sequence)
    }

    /// Write an already sequenced packet as-is.
    ///
    /// The writer's own counter is not touched.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.buf.clear();
        packet.write_to(&mut self.buf);
        self.write_buffered()
    }

    /// Sequence number the next [`send`](Self::send) will use.
    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    pub fn set_next_sequence(&mut self, sequence: u16) {
        self.next_sequence = sequence;
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::{try_decode, MAX_PAYLOAD};

    fn decode_all(mut wire: &[u8]) -> Vec<Packet> {
        let mut packets = Vec::new();
        loop {
            let (packet, consumed) = try_decode(wire).into_parts();
            wire = &wire[consumed..];
            match packet {
                Some(packet) => packets.push(packet),
                None => return packets,
            }
        }
    }

    #[test]
    fn writes_motor_command_frame() {
        let mut writer = PacketWriter::starting_at(Cursor::new(Vec::new()), 42);
        let mut payload = Vec::new();
        payload.extend_from_slice(&0.75f32.to_be_bytes());
        payload.extend_from_slice(&(-0.5f32).to_be_bytes());

        assert_eq!(writer.send(1, &payload).unwrap(), 42);

        let wire = writer.into_inner().into_inner();
        assert_eq!(
            wire,
            [
                0x1A, 0xCF, 0x01, 0x00, 0x2A, 0x08, 0x3F, 0x40, 0x00, 0x00, 0xBF, 0x00, 0x00,
                0x00, 0x2F, 0x14
            ]
        );
    }

    #[test]
    fn sequence_increments_per_send() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::new()));

        writer.send(0, b"").unwrap();
        writer.send(2, b"two").unwrap();
        writer.send(2, b"three").unwrap();
        assert_eq!(writer.next_sequence(), 3);

        let packets = decode_all(&writer.into_inner().into_inner());
        let sequences: Vec<u16> = packets.iter().map(Packet::sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn sequence_wraps() {
        let mut writer = PacketWriter::starting_at(Cursor::new(Vec::new()), u16::MAX);

        assert_eq!(writer.send(0, b"").unwrap(), u16::MAX);
        assert_eq!(writer.send(0, b"").unwrap(), 0);
        assert_eq!(writer.next_sequence(), 1);
    }

    #[test]
    fn payload_too_large_keeps_sequence() {
        let mut writer = PacketWriter::starting_at(Cursor::new(Vec::new()), 5);

        let err = writer.send(2, &[0u8; MAX_PAYLOAD + 1]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 256, max: 255 }));
        assert_eq!(writer.next_sequence(), 5);
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn failed_write_keeps_sequence() {
        let mut writer = PacketWriter::starting_at(ZeroWriter, 9);
        let err = writer.send(1, b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(writer.next_sequence(), 9);
    }

    #[test]
    fn write_packet_uses_packet_sequence() {
        let mut writer = PacketWriter::starting_at(Cursor::new(Vec::new()), 100);
        let packet = Packet::new(3, 7, vec![0u8; 12]).unwrap();

        writer.write_packet(&packet).unwrap();
        assert_eq!(writer.next_sequence(), 100);

        let packets = decode_all(&writer.into_inner().into_inner());
        assert_eq!(packets, vec![packet]);
    }

    #[test]
    fn set_next_sequence_applies() {
        let mut writer = PacketWriter::new(Cursor::new(Vec::new()));
        writer.set_next_sequence(1000);
        assert_eq!(writer.send(0, b"").unwrap(), 1000);
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = PacketWriter::new(sink);

        writer.send(0, b"").unwrap();

        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(writer.get_mut().data.len(), 8);
    }

    #[test]
    fn handles_interrupted_and_would_block() {
        let mut writer = PacketWriter::new(FlakyWriter::default());
        writer.send(2, b"retry").unwrap();

        let inner = writer.into_inner();
        assert_eq!(decode_all(&inner.data).len(), 1);
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails each call once with `Interrupted`, then `WouldBlock`, and writes
    /// at most three bytes at a time.
    #[derive(Default)]
    struct FlakyWriter {
        write_calls: usize,
        flush_calls: usize,
        data: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.write_calls += 1;
            match self.write_calls {
                1 => Err(std::io::Error::from(ErrorKind::Interrupted)),
                2 => Err(std::io::Error::from(ErrorKind::WouldBlock)),
                _ => {
                    let n = buf.len().min(3);
                    self.data.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flush_calls += 1;
            match self.flush_calls {
                1 => Err(std::io::Error::from(ErrorKind::Interrupted)),
                2 => Err(std::io::Error::from(ErrorKind::WouldBlock)),
                _ => Ok(()),
            }
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
