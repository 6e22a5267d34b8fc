use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

const UNIX_PREFIX: &str = "unix:";
const TCP_PREFIX: &str = "tcp://";

/// Where a stream connects to or listens on.
///
/// Parsed from `host:port`, `tcp://host:port` or `unix:/path/to.sock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A TCP address, resolved at connect/bind time.
    Tcp(String),
    /// A filesystem-path Unix domain socket.
    Unix(PathBuf),
}

impl Endpoint {
    /// Short transport name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Endpoint::Tcp(_) => "tcp",
            Endpoint::Unix(_) => "unix",
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if let Some(path) = trimmed.strip_prefix(UNIX_PREFIX) {
            if path.is_empty() {
                return Err(TransportError::InvalidEndpoint {
                    input: input.to_string(),
                    reason: "unix endpoint needs a socket path",
                });
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        let addr = trimmed.strip_prefix(TCP_PREFIX).unwrap_or(trimmed);
        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Endpoint::Tcp(addr.to_string()))
            }
            Some(_) => Err(TransportError::InvalidEndpoint {
                input: input.to_string(),
                reason: "expected host:port with a numeric port",
            }),
            None => Err(TransportError::InvalidEndpoint {
                input: input.to_string(),
                reason: "missing port (expected host:port or unix:/path)",
            }),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{addr}"),
            Endpoint::Unix(path) => write!(f, "{UNIX_PREFIX}{}", path.display()),
        }
    }
}
