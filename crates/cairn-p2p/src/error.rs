use std::io;

/// Errors produced by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    /// An outbound connection could not be opened.
    #[error("failed to dial {addr}: {source}")]
    Dial { addr: String, source: io::Error },

    /// The handshake with a new peer failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The peer handler refused the connection.
    #[error("peer rejected: {0}")]
    Admission(String),

    /// A frame could not be decoded from the stream.
    #[error("decode error: {0}")]
    Decode(String),

    /// A frame's length prefix exceeds the decoder's limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The stream ended before a bounded read completed.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: u64, actual: u64 },

    /// The remote end closed the connection between frames.
    #[error("connection closed")]
    Closed,

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the transport crate.
pub type TransportResult<T> = Result<T, TransportError>;
