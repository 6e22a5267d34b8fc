use std::net::TcpListener;
#[cfg(unix)]
use std::path::PathBuf;

use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::stream::PeerStream;

/// A bound listener producing [`PeerStream`]s.
///
/// Used by the echo server and by tests; the client side only ever connects.
pub struct StreamListener {
    inner: ListenerInner,
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: std::os::unix::net::UnixListener,
        path: PathBuf,
        /// (dev, ino) of the socket file we created; cleanup is skipped if it changed.
        created_inode: Option<(u64, u64)>,
    },
}

impl StreamListener {
    /// Maximum Unix socket path length (`sockaddr_un.sun_path`).
    #[cfg(target_os = "linux")]
    const MAX_UNIX_PATH_LEN: usize = 108;
    #[cfg(all(unix, not(target_os = "linux")))]
    const MAX_UNIX_PATH_LEN: usize = 104;

    /// Bind and listen on an endpoint.
    ///
    /// For Unix endpoints a stale socket file at the path is removed first;
    /// any other kind of file at the path is an error.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        let bind_err = |source: std::io::Error| TransportError::Bind {
            endpoint: endpoint.to_string(),
            source,
        };

        let inner = match endpoint {
            Endpoint::Tcp(addr) => {
                ListenerInner::Tcp(TcpListener::bind(addr.as_str()).map_err(bind_err)?)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                use std::os::unix::fs::{FileTypeExt, MetadataExt};

                let len = path.as_os_str().len();
                if len >= Self::MAX_UNIX_PATH_LEN {
                    return Err(TransportError::PathTooLong {
                        path: path.clone(),
                        len,
                        max: Self::MAX_UNIX_PATH_LEN,
                    });
                }

                if let Ok(metadata) = std::fs::symlink_metadata(path) {
                    if !metadata.file_type().is_socket() {
                        return Err(bind_err(std::io::Error::new(
                            std::io::ErrorKind::AlreadyExists,
                            "existing path is not a unix socket",
                        )));
                    }
                    debug!(?path, "removing stale socket");
                    std::fs::remove_file(path).map_err(bind_err)?;
                }

                let listener = std::os::unix::net::UnixListener::bind(path).map_err(bind_err)?;
                let created_inode = std::fs::symlink_metadata(path)
                    .ok()
                    .map(|m| (m.dev(), m.ino()));
                ListenerInner::Unix {
                    listener,
                    path: path.clone(),
                    created_inode,
                }
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => return Err(TransportError::Unsupported("unix")),
        };

        let listener = Self { inner };
        info!(endpoint = %listener.local_endpoint()?, "listening");
        Ok(listener)
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<PeerStream> {
        let stream = match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, addr) = listener.accept().map_err(TransportError::Accept)?;
                debug!(%addr, "accepted connection");
                stream.set_nonblocking(false)?;
                PeerStream::from_tcp(stream)?
            }
            #[cfg(unix)]
            ListenerInner::Unix { listener, .. } => {
                let (stream, _addr) = listener.accept().map_err(TransportError::Accept)?;
                debug!("accepted connection");
                stream.set_nonblocking(false)?;
                PeerStream::from_unix(stream)
            }
        };
        Ok(stream)
    }

    /// Switch `accept` between blocking and polling mode.
    ///
    /// Accepted streams are always returned in blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            ListenerInner::Tcp(listener) => listener.set_nonblocking(nonblocking)?,
            #[cfg(unix)]
            ListenerInner::Unix { listener, .. } => listener.set_nonblocking(nonblocking)?,
        }
        Ok(())
    }

    /// The endpoint actually bound (resolves port 0 for TCP).
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        match &self.inner {
            ListenerInner::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            ListenerInner::Unix { path, .. } => Ok(Endpoint::Unix(path.clone())),
        }
    }
}

#[cfg(unix)]
impl Drop for StreamListener {
    fn drop(&mut self) {
        use std::os::unix::fs::{FileTypeExt, MetadataExt};

        if let ListenerInner::Unix {
            path,
            created_inode: Some((dev, ino)),
            ..
        } = &self.inner
        {
            match std::fs::symlink_metadata(path) {
                Ok(m) if m.file_type().is_socket() && m.dev() == *dev && m.ino() == *ino => {
                    debug!(?path, "cleaning up socket file");
                    let _ = std::fs::remove_file(path);
                }
                _ => debug!(?path, "socket path identity changed; skipping cleanup"),
            }
        }
    }
}
