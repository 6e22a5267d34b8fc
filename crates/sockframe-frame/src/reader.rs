use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use sockframe_transport::PeerStream;
use tracing::{debug, trace};

use crate::codec::{decode_header, payload_len_for, FrameConfig, HEADER_WIDTH};
use crate::error::{FrameError, Result};

/// Upper bound on the buffer reserved up front from a peer-supplied length.
const MAX_PREALLOC: usize = 256 * 1024;

/// Reads framed messages from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete messages.
pub struct FrameReader<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            config: FrameConfig::default(),
        }
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { inner, config })
    }

    /// Read the next complete message (blocking).
    pub fn receive(&mut self) -> Result<Bytes> {
        receive_message(&mut self.inner, &self.config)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<PeerStream> {
    /// Create a frame reader for a `PeerStream` and apply the read timeout from config.
    pub fn with_config_stream(inner: PeerStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(crate::transport_to_frame_error)?;
        Self::with_config(inner, config)
    }
}

/// Read one frame and return its payload, without the header.
pub(crate) fn receive_message<R: Read + ?Sized>(
    inner: &mut R,
    config: &FrameConfig,
) -> Result<Bytes> {
    let mut header = [0u8; HEADER_WIDTH];
    if let Filled::Eof(received) = read_full(inner, &mut header)? {
        return Err(FrameError::EndOfStream {
            expected: HEADER_WIDTH,
            received,
        });
    }
    let total_size = decode_header(header, config.byte_order);

    let declared = payload_len_for(total_size)?;
    config.check_message_size(declared)?;
    let payload_len = usize::try_from(declared).map_err(|_| FrameError::MessageTooLarge {
        size: declared,
        max: usize::MAX as u64,
    })?;

    let capacity = config.chunk_capacity;
    let mut payload = BytesMut::with_capacity(payload_len.min(MAX_PREALLOC));
    let result = if total_size <= capacity as u64 {
        // The whole frame fit in the sender's first chunk.
        read_chunk(inner, &mut payload, payload_len)
    } else {
        let mut left = payload_len;
        let mut result = Ok(());
        while left > 0 && result.is_ok() {
            let want = left.min(capacity);
            result = read_chunk(inner, &mut payload, want);
            left -= want;
        }
        result
    };

    match result {
        Ok(()) => {
            debug!(total_size, "message received");
            Ok(payload.freeze())
        }
        Err(FrameError::EndOfStream { .. }) => Err(FrameError::EndOfStream {
            expected: payload_len,
            received: payload.len(),
        }),
        Err(err) => Err(err),
    }
}

/// Append exactly `len` bytes from `inner` to `dst`, looping on short reads.
///
/// On end of stream `dst` keeps only the bytes that actually arrived.
pub(crate) fn read_chunk<R: Read + ?Sized>(
    inner: &mut R,
    dst: &mut BytesMut,
    len: usize,
) -> Result<()> {
    let start = dst.len();
    dst.resize(start + len, 0);
    match read_full(inner, &mut dst[start..]) {
        Ok(Filled::Full) => {
            trace!(len, "chunk read");
            Ok(())
        }
        Ok(Filled::Eof(received)) => {
            dst.truncate(start + received);
            Err(FrameError::EndOfStream {
                expected: len,
                received,
            })
        }
        Err(err) => {
            dst.truncate(start);
            Err(err)
        }
    }
}

enum Filled {
    Full,
    /// The stream ended after this many bytes.
    Eof(usize),
}

fn read_full<R: Read + ?Sized>(inner: &mut R, buf: &mut [u8]) -> Result<Filled> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => return Ok(Filled::Eof(filled)),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Connection(err)),
        }
    }
    Ok(Filled::Full)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BufMut;

    use super::*;
    use crate::codec::{encode_frame, encode_header, ByteOrder, CHUNK_CAPACITY};

    fn wire_for(messages: &[&[u8]]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for message in messages {
            encode_frame(message, ByteOrder::Native, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    #[test]
    fn read_single_message() {
        let mut reader = FrameReader::new(Cursor::new(wire_for(&[b"hello"])));
        assert_eq!(reader.receive().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_messages() {
        let wire = wire_for(&[b"one", b"", b"three"]);
        let mut reader = FrameReader::new(Cursor::new(wire));

        assert_eq!(reader.receive().unwrap().as_ref(), b"one");
        assert!(reader.receive().unwrap().is_empty());
        assert_eq!(reader.receive().unwrap().as_ref(), b"three");
    }

    #[test]
    fn read_large_message() {
        let payload: Vec<u8> = (0..10 * CHUNK_CAPACITY + 37).map(|i| (i % 253) as u8).collect();
        let mut reader = FrameReader::new(Cursor::new(wire_for(&[&payload])));
        assert_eq!(reader.receive().unwrap().as_ref(), payload.as_slice());
    }

    #[test]
    fn fast_path_issues_single_payload_read() {
        let payload = vec![1u8; 100];
        let mut reader = FrameReader::new(RecordingReader::new(wire_for(&[&payload])));
        reader.receive().unwrap();
        assert_eq!(reader.get_ref().requests, vec![HEADER_WIDTH, 100]);
    }

    #[test]
    fn chunked_path_reads_capacity_sized_bursts() {
        let payload = vec![2u8; 10_000];
        let mut reader = FrameReader::new(RecordingReader::new(wire_for(&[&payload])));
        reader.receive().unwrap();
        assert_eq!(
            reader.get_ref().requests,
            vec![HEADER_WIDTH, 4096, 4096, 1808]
        );
    }

    #[test]
    fn fast_and_chunked_paths_agree() {
        let payload: Vec<u8> = (0..3000u32).map(|i| (i * 7) as u8).collect();
        let wire = wire_for(&[&payload]);

        let mut fast = FrameReader::new(Cursor::new(wire.clone()));
        let small = FrameConfig {
            chunk_capacity: 16,
            ..FrameConfig::default()
        };
        let mut chunked = FrameReader::with_config(Cursor::new(wire), small).unwrap();

        assert_eq!(fast.receive().unwrap(), chunked.receive().unwrap());
    }

    #[test]
    fn one_byte_reads() {
        let payload = vec![0xC3; 5000];
        let mut reader = FrameReader::new(ByteByByteReader {
            bytes: wire_for(&[&payload]),
            pos: 0,
        });
        assert_eq!(reader.receive().unwrap().as_ref(), payload.as_slice());
    }

    #[test]
    fn closed_before_header() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.receive().unwrap_err();
        assert!(matches!(
            err,
            FrameError::EndOfStream {
                expected: HEADER_WIDTH,
                received: 0
            }
        ));
    }

    #[test]
    fn closed_mid_header() {
        let mut reader = FrameReader::new(Cursor::new(vec![0u8; 5]));
        let err = reader.receive().unwrap_err();
        assert!(matches!(
            err,
            FrameError::EndOfStream {
                expected: HEADER_WIDTH,
                received: 5
            }
        ));
    }

    #[test]
    fn closed_after_header_before_payload() {
        let mut wire = BytesMut::new();
        wire.put_slice(&encode_header(8 + 6000, ByteOrder::Native));
        wire.put_slice(&[9u8; 4500]);

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let err = reader.receive().unwrap_err();
        assert!(matches!(
            err,
            FrameError::EndOfStream {
                expected: 6000,
                received: 4500
            }
        ));
    }

    #[test]
    fn malformed_header_is_framing_violation() {
        let wire = encode_header(3, ByteOrder::Native).to_vec();
        let mut reader = FrameReader::new(Cursor::new(wire));
        let err = reader.receive().unwrap_err();
        assert!(matches!(
            err,
            FrameError::FramingViolation { total_size: 3, .. }
        ));
    }

    #[test]
    fn header_byte_order_must_match() {
        let mut wire = BytesMut::new();
        encode_frame(b"be", ByteOrder::Big, &mut wire).unwrap();

        let cfg = FrameConfig {
            byte_order: ByteOrder::Big,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg).unwrap();
        assert_eq!(reader.receive().unwrap().as_ref(), b"be");
    }

    #[test]
    fn oversized_declared_length_rejected() {
        let wire = encode_header(8 + 1024, ByteOrder::Native).to_vec();
        let cfg = FrameConfig {
            max_message_size: Some(16),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire), cfg).unwrap();
        let err = reader.receive().unwrap_err();
        assert!(matches!(
            err,
            FrameError::MessageTooLarge {
                size: 1024,
                max: 16
            }
        ));
    }

    #[test]
    fn huge_declared_length_does_not_preallocate() {
        let wire = encode_header(u64::MAX, ByteOrder::Native).to_vec();
        let mut reader = FrameReader::new(Cursor::new(wire));
        // Either unaddressable or a clean end-of-stream, never an allocation failure.
        let err = reader.receive().unwrap_err();
        assert!(matches!(
            err,
            FrameError::MessageTooLarge { .. } | FrameError::EndOfStream { .. }
        ));
    }

    #[test]
    fn interrupted_read_retries() {
        let mut reader = FrameReader::new(InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire_for(&[b"ok"])),
        });
        assert_eq!(reader.receive().unwrap().as_ref(), b"ok");
    }

    #[test]
    fn would_block_propagates_as_connection_error() {
        let mut reader = FrameReader::new(WouldBlockReader);
        let err = reader.receive().unwrap_err();
        assert!(matches!(err, FrameError::Connection(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn accessors_and_into_inner() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        assert_eq!(reader.config().chunk_capacity, CHUNK_CAPACITY);
        let _inner = reader.into_inner();
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let sender = std::thread::spawn(move || {
            writer.send(b"ping").unwrap();
            writer.send(&vec![4u8; 50_000]).unwrap();
        });

        assert_eq!(reader.receive().unwrap().as_ref(), b"ping");
        assert_eq!(reader.receive().unwrap().len(), 50_000);
        sender.join().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn applies_read_timeout_for_peer_stream() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_millis(10)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config_stream(PeerStream::from_unix(left), cfg).unwrap();
        let err = reader.receive().unwrap_err();
        assert!(matches!(err, FrameError::Connection(_)));
    }

    /// Serves reads from a buffer and records each requested length.
    struct RecordingReader {
        inner: Cursor<Vec<u8>>,
        requests: Vec<usize>,
    }

    impl RecordingReader {
        fn new(bytes: Vec<u8>) -> Self {
            Self {
                inner: Cursor::new(bytes),
                requests: Vec::new(),
            }
        }
    }

    impl Read for RecordingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.requests.push(buf.len());
            self.inner.read(buf)
        }
    }

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

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    struct WouldBlockReader;

    impl Read for WouldBlockReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
