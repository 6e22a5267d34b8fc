//! Connected byte-stream endpoints for sockframe.
//!
//! Provides the raw transport the framing layer is built on:
//! - TCP streams (the default, `host:port`)
//! - Unix domain sockets (`unix:/path/to.sock`, Unix only)
//!
//! This crate knows nothing about chunks or frames. A [`PeerStream`] is an
//! ordered, reliable `Read + Write` byte stream and nothing more.

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::StreamListener;
pub use stream::PeerStream;
