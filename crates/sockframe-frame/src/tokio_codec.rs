//! `tokio_util::codec` adapter for the same wire format.
//!
//! A task that owns a `Framed<_, ChunkFrameCodec>` is the async counterpart of
//! a [`crate::FramedChannel`]: one owner, whole frames in and out. Chunking is
//! left to the runtime's writes since chunk boundaries are not part of the
//! format.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_header, encode_frame, payload_len_for, FrameConfig, HEADER_WIDTH};
use crate::error::{FrameError, Result};

/// Largest amount reserved ahead of a partially received frame.
const MAX_RESERVE: usize = 256 * 1024;

#[derive(Debug, Clone, Default)]
pub struct ChunkFrameCodec {
    config: FrameConfig,
}

impl ChunkFrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Payload length announced by the header at the front of `src`, if complete.
    fn peek_payload_len(&self, src: &BytesMut) -> Result<Option<usize>> {
        if src.len() < HEADER_WIDTH {
            return Ok(None);
        }
        let mut header = [0u8; HEADER_WIDTH];
        header.copy_from_slice(&src[..HEADER_WIDTH]);

        let declared = payload_len_for(decode_header(header, self.config.byte_order))?;
        self.config.check_message_size(declared)?;
        let payload_len = usize::try_from(declared)
            .ok()
            .filter(|len| len.checked_add(HEADER_WIDTH).is_some())
            .ok_or(FrameError::MessageTooLarge {
                size: declared,
                max: (usize::MAX - HEADER_WIDTH) as u64,
            })?;
        Ok(Some(payload_len))
    }
}

impl Decoder for ChunkFrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let Some(payload_len) = self.peek_payload_len(src)? else {
            return Ok(None);
        };

        let frame_len = HEADER_WIDTH + payload_len;
        if src.len() < frame_len {
            src.reserve((frame_len - src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        src.advance(HEADER_WIDTH);
        Ok(Some(src.split_to(payload_len).freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        match self.peek_payload_len(src)? {
            Some(payload_len) => Err(FrameError::EndOfStream {
                expected: payload_len,
                received: src.len() - HEADER_WIDTH,
            }),
            None => Err(FrameError::EndOfStream {
                expected: HEADER_WIDTH,
                received: src.len(),
            }),
        }
    }
}

impl Encoder<Bytes> for ChunkFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        <Self as Encoder<&[u8]>>::encode(self, item.as_ref(), dst)
    }
}

impl<'a> Encoder<&'a [u8]> for ChunkFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &'a [u8], dst: &mut BytesMut) -> Result<()> {
        self.config.check_message_size(item.len() as u64)?;
        encode_frame(item, self.config.byte_order, dst)
    }
}
