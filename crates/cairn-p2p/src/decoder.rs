use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{TransportError, TransportResult};

/// Default upper bound on a single frame (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Reads one frame off a byte stream.
///
/// A decoder must consume exactly the bytes of one frame and nothing more:
/// whatever follows belongs to the next reader of the stream.
#[async_trait]
pub trait Decoder: Send + Sync {
    /// Decode the next frame. Returns [`TransportError::Closed`] if the
    /// stream ends cleanly before the first byte of a frame.
    async fn decode(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> TransportResult<Bytes>;
}

/// Frames prefixed with a 4-byte big-endian length.
///
/// Wire format: `[u32 len][len bytes]`. The returned frame excludes the
/// prefix.
#[derive(Clone, Debug)]
pub struct LengthDelimitedDecoder {
    max_frame_size: usize,
}

impl LengthDelimitedDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Prefix `frame` with its length, refusing frames this decoder would
    /// reject on the receiving side.
    pub fn frame(&self, frame: &[u8]) -> TransportResult<Vec<u8>> {
        if frame.is_empty() {
            return Err(TransportError::Decode("zero-length frame".into()));
        }
        if frame.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }
        Ok(Self::encode(frame))
    }

    /// Prefix `frame` with its length, without checking any limit.
    pub fn encode(frame: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + frame.len());
        buf.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        buf.extend_from_slice(frame);
        buf
    }
}

impl Default for LengthDelimitedDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

#[async_trait]
impl Decoder for LengthDelimitedDecoder {
    async fn decode(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> TransportResult<Bytes> {
        let mut prefix = [0u8; 4];
        if reader.read(&mut prefix[..1]).await? == 0 {
            return Err(TransportError::Closed);
        }
        reader
            .read_exact(&mut prefix[1..])
            .await
            .map_err(|e| TransportError::Decode(format!("truncated length prefix: {e}")))?;

        let len = u32::from_be_bytes(prefix) as usize;
        if len == 0 {
            return Err(TransportError::Decode("zero-length frame".into()));
        }
        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        let mut frame = vec![0u8; len];
        reader
            .read_exact(&mut frame)
            .await
            .map_err(|e| TransportError::Decode(format!("truncated frame: {e}")))?;
        Ok(Bytes::from(frame))
    }
}
