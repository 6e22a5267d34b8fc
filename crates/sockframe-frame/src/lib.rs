//! Length-prefixed chunked message framing over a single byte stream.
//!
//! Every message goes on the wire as:
//! - An 8-byte unsigned `total_size` (payload length plus the header itself)
//! - The payload, split into transport writes of at most 4096 bytes
//!
//! Chunking is a transport detail: a receiver reassembles the payload from
//! the length prefix alone. No partial reads, no buffer management in user code.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod tokio_codec;

pub use channel::{FramedChannel, SharedChannel};
pub use codec::{
    chunk_lengths, decode_header, encode_frame, encode_header, payload_len_for, total_size_for,
    ByteOrder, FrameConfig, CHUNK_CAPACITY, HEADER_WIDTH,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use tokio_codec::ChunkFrameCodec;

pub(crate) fn transport_to_frame_error(err: sockframe_transport::TransportError) -> FrameError {
    use sockframe_transport::TransportError;

    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Connection(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Connection(source)
        }
        other => FrameError::Connection(std::io::Error::other(other.to_string())),
    }
}
