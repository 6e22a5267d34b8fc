use std::time::Duration;

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Width of the frame header: one unsigned 64-bit `total_size`.
pub const HEADER_WIDTH: usize = 8;

/// Default chunk capacity: the largest single transport write/read issued per chunk.
pub const CHUNK_CAPACITY: usize = 4096;

/// Byte order of the `total_size` header.
///
/// This is a fixed contract between the two peers and is never negotiated.
/// `Native` matches peers that write the integer straight from memory, which
/// only interoperates between hosts of the same endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Native,
    Little,
    Big,
}

/// Encode `total_size` into the 8 header bytes.
pub fn encode_header(total_size: u64, order: ByteOrder) -> [u8; HEADER_WIDTH] {
    match order {
        ByteOrder::Native => total_size.to_ne_bytes(),
        ByteOrder::Little => total_size.to_le_bytes(),
        ByteOrder::Big => total_size.to_be_bytes(),
    }
}

/// Decode the 8 header bytes into `total_size`.
pub fn decode_header(header: [u8; HEADER_WIDTH], order: ByteOrder) -> u64 {
    match order {
        ByteOrder::Native => u64::from_ne_bytes(header),
        ByteOrder::Little => u64::from_le_bytes(header),
        ByteOrder::Big => u64::from_be_bytes(header),
    }
}

/// `total_size` for a message of `message_len` bytes (payload plus header).
pub fn total_size_for(message_len: usize) -> Result<u64> {
    u64::try_from(message_len)
        .ok()
        .and_then(|len| len.checked_add(HEADER_WIDTH as u64))
        .ok_or(FrameError::MessageTooLarge {
            size: message_len as u64,
            max: u64::MAX - HEADER_WIDTH as u64,
        })
}

/// Payload length promised by a decoded `total_size`.
///
/// A header smaller than the header width is a framing violation, never wrapped.
pub fn payload_len_for(total_size: u64) -> Result<u64> {
    total_size
        .checked_sub(HEADER_WIDTH as u64)
        .ok_or(FrameError::FramingViolation {
            total_size,
            width: HEADER_WIDTH,
        })
}

/// Lengths of the transport writes `send` issues for one message.
///
/// The first chunk carries the header plus as much payload as fits; every
/// later chunk is exactly `capacity` bytes except the last, which carries the
/// remainder.
#[derive(Debug, Clone)]
pub struct ChunkLengths {
    first: Option<usize>,
    remaining: usize,
    capacity: usize,
}

/// Plan the chunk lengths for a message of `message_len` bytes.
///
/// `capacity` must be at least [`HEADER_WIDTH`]; see [`FrameConfig::validate`].
pub fn chunk_lengths(message_len: usize, capacity: usize) -> ChunkLengths {
    let first_payload = message_len.min(capacity.saturating_sub(HEADER_WIDTH));
    ChunkLengths {
        first: Some(HEADER_WIDTH + first_payload),
        remaining: message_len - first_payload,
        capacity,
    }
}

impl Iterator for ChunkLengths {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if let Some(first) = self.first.take() {
            return Some(first);
        }
        if self.remaining == 0 || self.capacity == 0 {
            return None;
        }
        let len = self.remaining.min(self.capacity);
        self.remaining -= len;
        Some(len)
    }
}

/// Encode a whole frame (header followed by payload) into `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────┬────────────────────────────┐
/// │ total_size (8B, u64)     │ payload (total_size - 8 B) │
/// │ header + payload length  │                            │
/// └──────────────────────────┴────────────────────────────┘
/// ```
/// Chunk boundaries are a transport detail and do not appear here.
pub fn encode_frame(message: &[u8], order: ByteOrder, dst: &mut BytesMut) -> Result<()> {
    let total_size = total_size_for(message.len())?;
    dst.reserve(HEADER_WIDTH + message.len());
    dst.put_slice(&encode_header(total_size, order));
    dst.put_slice(message);
    Ok(())
}

/// Configuration shared by the writer, reader and channel.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Byte order of the header. Default: native.
    pub byte_order: ByteOrder,
    /// Chunk capacity in bytes. Default: 4096.
    pub chunk_capacity: usize,
    /// Largest message accepted for sending or receiving. Default: unlimited.
    pub max_message_size: Option<usize>,
    /// Read timeout for blocking operations. Default: block forever.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations. Default: block forever.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Native,
            chunk_capacity: CHUNK_CAPACITY,
            max_message_size: None,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl FrameConfig {
    /// Reject configurations the chunking algorithm cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_capacity < HEADER_WIDTH {
            return Err(FrameError::InvalidConfig(format!(
                "chunk capacity {} is smaller than the {HEADER_WIDTH}-byte header",
                self.chunk_capacity
            )));
        }
        if self.read_timeout == Some(Duration::ZERO) || self.write_timeout == Some(Duration::ZERO)
        {
            return Err(FrameError::InvalidConfig(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Check a message length against `max_message_size`.
    pub fn check_message_size(&self, size: u64) -> Result<()> {
        match self.max_message_size {
            Some(max) if size > max as u64 => Err(FrameError::MessageTooLarge {
                size,
                max: max as u64,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip_all_orders() {
        for order in [ByteOrder::Native, ByteOrder::Little, ByteOrder::Big] {
            let bytes = encode_header(0x0102_0304_0506_0708, order);
            assert_eq!(decode_header(bytes, order), 0x0102_0304_0506_0708);
        }
    }

    #[test]
    fn header_byte_layout() {
        assert_eq!(encode_header(13, ByteOrder::Little), [13, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encode_header(13, ByteOrder::Big), [0, 0, 0, 0, 0, 0, 0, 13]);
        assert_eq!(encode_header(13, ByteOrder::Native), 13u64.to_ne_bytes());
    }

    #[test]
    fn total_size_includes_header() {
        assert_eq!(total_size_for(0).unwrap(), 8);
        assert_eq!(total_size_for(4088).unwrap(), 4096);
    }

    #[test]
    fn payload_len_rejects_short_header() {
        assert_eq!(payload_len_for(8).unwrap(), 0);
        assert_eq!(payload_len_for(20).unwrap(), 12);
        assert!(matches!(
            payload_len_for(3),
            Err(FrameError::FramingViolation { total_size: 3, .. })
        ));
        assert!(payload_len_for(0).is_err());
    }

    #[test]
    fn chunk_plan_empty_message() {
        let chunks: Vec<_> = chunk_lengths(0, CHUNK_CAPACITY).collect();
        assert_eq!(chunks, vec![8]);
    }

    #[test]
    fn chunk_plan_fits_first_chunk() {
        let chunks: Vec<_> = chunk_lengths(4088, CHUNK_CAPACITY).collect();
        assert_eq!(chunks, vec![4096]);
    }

    #[test]
    fn chunk_plan_spills_one_byte() {
        let chunks: Vec<_> = chunk_lengths(4089, CHUNK_CAPACITY).collect();
        assert_eq!(chunks, vec![4096, 1]);
    }

    #[test]
    fn chunk_plan_large_message() {
        let len = 10 * CHUNK_CAPACITY + 37;
        let chunks: Vec<_> = chunk_lengths(len, CHUNK_CAPACITY).collect();
        assert_eq!(chunks.iter().sum::<usize>(), len + HEADER_WIDTH);
        let (last, full) = chunks.split_last().unwrap();
        assert!(full.iter().all(|&c| c == CHUNK_CAPACITY));
        assert_eq!(*last, 45);
    }

    #[test]
    fn chunk_plan_header_only_capacity() {
        let chunks: Vec<_> = chunk_lengths(5, HEADER_WIDTH).collect();
        assert_eq!(chunks, vec![8, 5]);
    }

    #[test]
    fn encode_frame_layout() {
        let mut buf = BytesMut::new();
        encode_frame(b"abc", ByteOrder::Little, &mut buf).unwrap();
        assert_eq!(&buf[..HEADER_WIDTH], &11u64.to_le_bytes());
        assert_eq!(&buf[HEADER_WIDTH..], b"abc");
    }

    #[test]
    fn config_validation() {
        assert!(FrameConfig::default().validate().is_ok());

        let tiny = FrameConfig {
            chunk_capacity: 4,
            ..FrameConfig::default()
        };
        assert!(matches!(tiny.validate(), Err(FrameError::InvalidConfig(_))));

        let zero_timeout = FrameConfig {
            read_timeout: Some(Duration::ZERO),
            ..FrameConfig::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn message_size_guard() {
        let cfg = FrameConfig {
            max_message_size: Some(16),
            ..FrameConfig::default()
        };
        assert!(cfg.check_message_size(16).is_ok());
        assert!(matches!(
            cfg.check_message_size(17),
            Err(FrameError::MessageTooLarge { size: 17, max: 16 })
        ));
        assert!(FrameConfig::default().check_message_size(u64::MAX).is_ok());
    }
}
