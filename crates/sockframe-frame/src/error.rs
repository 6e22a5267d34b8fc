/// Errors that can occur while sending or receiving framed messages.
///
/// None of these are recoverable on the same stream: after any of them the
/// byte stream can no longer be assumed to sit on a frame boundary.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The transport reported a failure while connecting, reading or writing.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer closed the stream before the promised bytes arrived.
    #[error("unexpected end of stream ({received} of {expected} bytes received)")]
    EndOfStream { expected: usize, received: usize },

    /// The decoded header is smaller than the header itself.
    #[error("framing violation: total size {total_size} is below the {width}-byte header")]
    FramingViolation { total_size: u64, width: usize },

    /// The message exceeds the configured maximum, or is not addressable on this host.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: u64, max: u64 },

    /// The frame configuration is unusable.
    #[error("invalid frame config: {0}")]
    InvalidConfig(String),

    /// The channel already failed and must not be reused.
    #[error("channel poisoned by an earlier failure; reconnect to continue")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, FrameError>;
