use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// A connected byte stream implementing Read + Write.
///
/// Reads and writes may be short; the framing layer loops on them.
/// A read of zero bytes means the peer closed its side.
pub struct PeerStream {
    inner: PeerStreamInner,
}

enum PeerStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for PeerStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            PeerStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            PeerStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for PeerStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            PeerStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            PeerStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            PeerStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            PeerStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl PeerStream {
    /// Connect to a listening endpoint (blocking).
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        let stream = match endpoint {
            Endpoint::Tcp(addr) => {
                let stream =
                    TcpStream::connect(addr.as_str()).map_err(|e| TransportError::Connect {
                        endpoint: endpoint.to_string(),
                        source: e,
                    })?;
                Self::from_tcp(stream)?
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = std::os::unix::net::UnixStream::connect(path).map_err(|e| {
                    TransportError::Connect {
                        endpoint: endpoint.to_string(),
                        source: e,
                    }
                })?;
                Self::from_unix(stream)
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => return Err(TransportError::Unsupported("unix")),
        };
        debug!(%endpoint, "connected");
        Ok(stream)
    }

    /// Wrap an already-connected TCP stream. Disables Nagle so small chunks go out promptly.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            inner: PeerStreamInner::Tcp(stream),
        })
    }

    /// Wrap an already-connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: PeerStreamInner::Unix(stream),
        }
    }

    /// Set read timeout on the underlying stream. `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            PeerStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            PeerStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream. `None` blocks indefinitely.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            PeerStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            PeerStreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            PeerStreamInner::Tcp(stream) => Ok(Self {
                inner: PeerStreamInner::Tcp(stream.try_clone()?),
            }),
            #[cfg(unix)]
            PeerStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Shut down both directions of the connection.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            PeerStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            PeerStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            // Peer already gone; the stream is closed either way.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Human-readable identity of the remote side.
    pub fn peer_label(&self) -> String {
        match &self.inner {
            PeerStreamInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:unknown".to_string()),
            #[cfg(unix)]
            PeerStreamInner::Unix(_) => "unix-peer".to_string(),
        }
    }
}

impl std::fmt::Debug for PeerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            PeerStreamInner::Tcp(_) => f.debug_struct("PeerStream").field("type", &"tcp").finish(),
            #[cfg(unix)]
            PeerStreamInner::Unix(_) => {
                f.debug_struct("PeerStream").field("type", &"unix").finish()
            }
        }
    }
}
