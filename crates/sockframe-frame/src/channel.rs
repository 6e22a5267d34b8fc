use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use sockframe_transport::{Endpoint, PeerStream};
use tracing::warn;

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::reader::receive_message;
use crate::writer::send_message;

/// A framed, request/response channel over one exclusively owned stream.
///
/// `send` and `receive` are self-contained: the only state kept between
/// calls is the stream itself and whether it is still usable. Any failure
/// that may have left the stream between frame boundaries poisons the
/// channel; later calls fail with [`FrameError::Poisoned`] and the stream
/// should be dropped.
pub struct FramedChannel<T> {
    inner: T,
    scratch: BytesMut,
    config: FrameConfig,
    poisoned: bool,
}

impl<T: Read + Write> FramedChannel<T> {
    /// Create a channel with default configuration.
    pub fn new(inner: T) -> Self {
        let config = FrameConfig::default();
        Self {
            inner,
            scratch: BytesMut::with_capacity(config.chunk_capacity),
            config,
            poisoned: false,
        }
    }

    /// Create a channel with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner,
            scratch: BytesMut::with_capacity(config.chunk_capacity),
            config,
            poisoned: false,
        })
    }

    /// Transmit `message` as one frame (blocking).
    pub fn send(&mut self, message: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        match send_message(&mut self.inner, message, &self.config, &mut self.scratch) {
            Ok(()) => Ok(()),
            // Size checks run before the first byte is written.
            Err(err @ FrameError::MessageTooLarge { .. }) => Err(err),
            Err(err) => Err(self.poison(err)),
        }
    }

    /// Block until one complete message arrives and return its payload.
    pub fn receive(&mut self) -> Result<Bytes> {
        self.ensure_usable()?;
        receive_message(&mut self.inner, &self.config).map_err(|err| self.poison(err))
    }

    /// Send `message` and wait for the peer's reply.
    pub fn request(&mut self, message: &[u8]) -> Result<Bytes> {
        self.send(message)?;
        self.receive()
    }

    /// Whether an earlier failure made this channel unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the channel and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current channel configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(FrameError::Poisoned);
        }
        Ok(())
    }

    fn poison(&mut self, err: FrameError) -> FrameError {
        warn!(error = %err, "channel poisoned");
        self.poisoned = true;
        err
    }
}

impl FramedChannel<PeerStream> {
    /// Connect to `endpoint` and apply the timeouts from `config`.
    pub fn connect(endpoint: &Endpoint, config: FrameConfig) -> Result<Self> {
        config.validate()?;
        let stream = PeerStream::connect(endpoint).map_err(crate::transport_to_frame_error)?;
        Self::from_stream(stream, config)
    }

    /// Wrap an accepted or connected stream and apply the timeouts from `config`.
    pub fn from_stream(stream: PeerStream, config: FrameConfig) -> Result<Self> {
        stream
            .set_read_timeout(config.read_timeout)
            .map_err(crate::transport_to_frame_error)?;
        stream
            .set_write_timeout(config.write_timeout)
            .map_err(crate::transport_to_frame_error)?;
        Self::with_config(stream, config)
    }

    /// Close both directions of the connection.
    pub fn shutdown(self) -> Result<()> {
        self.inner
            .shutdown()
            .map_err(crate::transport_to_frame_error)
    }
}

/// A cloneable handle that serialises whole calls on one [`FramedChannel`].
///
/// The lock is held for an entire `send`, `receive` or `request`, never per
/// chunk, so chunks of different messages cannot interleave on the wire.
pub struct SharedChannel<T> {
    inner: Arc<Mutex<FramedChannel<T>>>,
}

impl<T> Clone for SharedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Read + Write> SharedChannel<T> {
    pub fn new(channel: FramedChannel<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(channel)),
        }
    }

    pub fn send(&self, message: &[u8]) -> Result<()> {
        self.lock()?.send(message)
    }

    pub fn receive(&self) -> Result<Bytes> {
        self.lock()?.receive()
    }

    /// Send and wait for the reply without letting another caller in between.
    pub fn request(&self, message: &[u8]) -> Result<Bytes> {
        self.lock()?.request(message)
    }

    pub fn is_poisoned(&self) -> bool {
        self.lock().map(|c| c.is_poisoned()).unwrap_or(true)
    }

    /// Recover the channel once this is the last handle.
    pub fn try_unwrap(self) -> std::result::Result<FramedChannel<T>, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => Ok(mutex.into_inner().unwrap_or_else(|e| e.into_inner())),
            Err(inner) => Err(Self { inner }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, FramedChannel<T>>> {
        self.inner.lock().map_err(|_| FrameError::Poisoned)
    }
}
