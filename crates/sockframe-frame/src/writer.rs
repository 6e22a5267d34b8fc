use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use sockframe_transport::PeerStream;
use tracing::{debug, trace};

use crate::codec::{chunk_lengths, encode_header, total_size_for, FrameConfig, HEADER_WIDTH};
use crate::error::{FrameError, Result};

/// Writes framed messages to any `Write` stream, one chunk at a time.
///
/// Use this for a write-only half (e.g. a cloned socket); for a full
/// request/response session use [`crate::FramedChannel`].
pub struct FrameWriter<T> {
    inner: T,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        let config = FrameConfig::default();
        Self {
            inner,
            scratch: BytesMut::with_capacity(config.chunk_capacity),
            config,
        }
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner,
            scratch: BytesMut::with_capacity(config.chunk_capacity),
            config,
        })
    }

    /// Send one message (blocking). Returns once every chunk was accepted.
    pub fn send(&mut self, message: &[u8]) -> Result<()> {
        send_message(&mut self.inner, message, &self.config, &mut self.scratch)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<PeerStream> {
    /// Create a frame writer for a `PeerStream` and apply the write timeout from config.
    pub fn with_config_stream(inner: PeerStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(crate::transport_to_frame_error)?;
        Self::with_config(inner, config)
    }
}

/// Split `message` into chunks and hand each one to the transport in full.
///
/// The first chunk is assembled in `scratch` (header followed by as much
/// payload as fits); later chunks are sliced straight out of `message` at
/// offsets fixed by the chunk plan. Nothing is padded.
pub(crate) fn send_message<W: Write + ?Sized>(
    inner: &mut W,
    message: &[u8],
    config: &FrameConfig,
    scratch: &mut BytesMut,
) -> Result<()> {
    config.check_message_size(message.len() as u64)?;
    let total_size = total_size_for(message.len())?;

    let mut offset = 0usize;
    let mut chunks = 0usize;
    for len in chunk_lengths(message.len(), config.chunk_capacity) {
        if chunks == 0 {
            let first_payload = len - HEADER_WIDTH;
            scratch.clear();
            scratch.reserve(len);
            scratch.put_slice(&encode_header(total_size, config.byte_order));
            scratch.put_slice(&message[..first_payload]);
            write_chunk(inner, &scratch[..])?;
            offset = first_payload;
        } else {
            write_chunk(inner, &message[offset..offset + len])?;
            offset += len;
        }
        chunks += 1;
    }
    debug_assert_eq!(offset, message.len());

    flush(inner)?;
    debug!(total_size, chunks, "message sent");
    Ok(())
}

/// Write all of `chunk`, looping on short writes.
pub(crate) fn write_chunk<W: Write + ?Sized>(inner: &mut W, chunk: &[u8]) -> Result<()> {
    let mut written = 0usize;
    while written < chunk.len() {
        match inner.write(&chunk[written..]) {
            Ok(0) => {
                return Err(FrameError::Connection(std::io::Error::new(
                    ErrorKind::WriteZero,
                    "transport accepted zero bytes",
                )))
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Connection(err)),
        }
    }
    trace!(len = chunk.len(), "chunk written");
    Ok(())
}

fn flush<W: Write + ?Sized>(inner: &mut W) -> Result<()> {
    loop {
        match inner.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Connection(err)),
        }
    }
}
