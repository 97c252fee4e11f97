use std::io::{ErrorKind, Read};

use crate::buffer::{DecodeBuffer, DecodeStats};
use crate::codec::{DecoderConfig, Packet};
use crate::error::{FrameError, Result};
use crate::observer::{DecodeObserver, TracingObserver};

const READ_CHUNK_SIZE: usize = 1024;

/// Reads packets from any `Read` stream, skipping noise and corrupt frames.
///
/// Partial reads are buffered internally, so callers always get whole
/// packets. A read error such as a timeout leaves buffered bytes in place;
/// calling [`read_packet`](Self::read_packet) again resumes where it stopped.
pub struct PacketReader<T, O = TracingObserver> {
    inner: T,
    buffer: DecodeBuffer,
    observer: O,
}

impl<T: Read> PacketReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, DecoderConfig::default())
    }

    pub fn with_config(inner: T, config: DecoderConfig) -> Self {
        Self::with_observer(inner, config, TracingObserver)
    }
}

impl<T: Read, O: DecodeObserver> PacketReader<T, O> {
    /// Create a reader that reports decode events to `observer`.
    pub fn with_observer(inner: T, config: DecoderConfig, observer: O) -> Self {
        Self {
            inner,
            buffer: DecodeBuffer::with_config(config),
            observer,
        }
    }

    /// Read the next valid packet (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` at end of stream; any
    /// incomplete trailing frame is dropped.
    pub fn read_packet(&mut self) -> Result<Packet> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(packet) = self.buffer.decode_next(&mut self.observer) {
                return Ok(packet);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buffer.push(&chunk[..read], &mut self.observer);
        }
    }

    /// Decoder totals so far.
    pub fn stats(&self) -> DecodeStats {
        self.buffer.stats()
    }

    /// Bytes received but not yet turned into a packet.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::encode;
    use crate::observer::DecodeEvent;

    fn wire(frames: &[(u8, u16, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (packet_type, sequence, payload) in frames {
            out.extend_from_slice(&encode(*packet_type, *sequence, payload).unwrap());
        }
        out
    }

    #[test]
    fn read_single_packet() {
        let mut reader = PacketReader::new(Cursor::new(wire(&[(2, 7, b"hello")])));
        let packet = reader.read_packet().unwrap();

        assert_eq!(packet.packet_type(), 2);
        assert_eq!(packet.sequence(), 7);
        assert_eq!(packet.payload().as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_packets() {
        let bytes = wire(&[(0, 1, b""), (2, 2, b"two"), (3, 3, &[0u8; 12])]);
        let mut reader = PacketReader::new(Cursor::new(bytes));

        let sequences: Vec<u16> = (0..3)
            .map(|_| reader.read_packet().unwrap().sequence())
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[(1, 9, &[0u8; 8])]),
            pos: 0,
        };
        let mut reader = PacketReader::new(byte_reader);

        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.sequence(), 9);
        assert!(matches!(
            reader.read_packet().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn skips_noise_and_corrupt_frames() {
        let mut bytes = vec![0xFF, 0x00, 0x1A];
        let mut corrupt = encode(2, 1, b"garbled").unwrap().to_vec();
        corrupt[8] ^= 0x01;
        bytes.extend_from_slice(&corrupt);
        bytes.extend_from_slice(&wire(&[(2, 2, b"clean")]));

        let mut events = Vec::new();
        let observer = |event: &DecodeEvent| events.push(event.clone());
        let mut reader =
            PacketReader::with_observer(Cursor::new(bytes), DecoderConfig::default(), observer);

        let packet = reader.read_packet().unwrap();
        assert_eq!(packet.payload().as_ref(), b"clean");

        let stats = reader.stats();
        assert_eq!(stats.discarded_bytes, 3);
        assert_eq!(stats.corrupt_frames, 1);
        drop(reader);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = PacketReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_frame() {
        let full = wire(&[(2, 1, b"truncated")]);
        let mut reader = PacketReader::new(Cursor::new(full[..10].to_vec()));
        let err = reader.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
        assert_eq!(reader.buffered(), 10);
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let reader = WouldBlockThenData {
            blocked: false,
            bytes: wire(&[(0, 4, b"")]),
            pos: 0,
        };
        let mut framed = PacketReader::new(reader);
        let err = framed.read_packet().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));

        let packet = framed.read_packet().unwrap();
        assert_eq!(packet.sequence(), 4);
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            bytes: wire(&[(2, 8, b"ok")]),
            pos: 0,
        };
        let mut framed = PacketReader::new(reader);
        let packet = framed.read_packet().unwrap();

        assert_eq!(packet.sequence(), 8);
        assert_eq!(packet.payload().as_ref(), b"ok");
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = PacketReader::new(Cursor::new(Vec::<u8>::new()));

        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _ = reader.observer();
        let _inner = reader.into_inner();
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::PacketWriter::new(left);
        let mut reader = PacketReader::new(right);

        writer.send(2, b"ping").unwrap();
        writer.send(1, &[0u8; 8]).unwrap();

        let first = reader.read_packet().unwrap();
        let second = reader.read_packet().unwrap();
        assert_eq!((first.sequence(), first.payload().as_ref()), (0, b"ping".as_ref()));
        assert_eq!(second.sequence(), 1);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct WouldBlockThenData {
        blocked: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for WouldBlockThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.blocked {
                self.blocked = true;
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            copy_remaining(&self.bytes, &mut self.pos, buf)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            copy_remaining(&self.bytes, &mut self.pos, buf)
        }
    }

    fn copy_remaining(bytes: &[u8], pos: &mut usize, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = (bytes.len() - *pos).min(buf.len());
        buf[..n].copy_from_slice(&bytes[*pos..*pos + n]);
        *pos += n;
        Ok(n)
    }
}
