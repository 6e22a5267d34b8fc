//! Chunked length-prefixed messaging over a single stream connection.
//!
//! sockframe exchanges arbitrary-length messages with a remote peer: each
//! message is prefixed with its total size and written in bounded chunks,
//! and the receiver reassembles it from the prefix alone.
//!
//! # Crate Structure
//!
//! - [`transport`]: Connected byte streams (TCP, Unix domain sockets)
//! - [`frame`]: Chunked framing, [`frame::FramedChannel`] and friends

/// Re-export transport types.
pub mod transport {
    pub use sockframe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sockframe_frame::*;
}
