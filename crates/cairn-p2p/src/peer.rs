use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::decoder::Decoder;
use crate::error::{TransportError, TransportResult};
use crate::gate::Gate;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Initial buffer reserved by [`PeerConnection::read_bounded`], whatever
/// length the peer announced.
const READ_RESERVE_LIMIT: u64 = 64 * 1024;

/// One established connection to a remote peer.
///
/// The read and write halves are locked independently: the connection's read
/// loop and the consumer of announced payloads share the read half (the
/// [`Gate`] keeps them from overlapping), while senders share the write half.
pub struct PeerConnection {
    remote_addr: SocketAddr,
    /// `true` if this side dialed the connection.
    outbound: bool,
    reader: Mutex<BoxedReader>,
    writer: Mutex<BoxedWriter>,
    gate: Arc<Gate>,
}

impl PeerConnection {
    /// Wrap the two halves of a byte stream.
    pub fn new<R, W>(reader: R, writer: W, remote_addr: SocketAddr, outbound: bool) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            remote_addr,
            outbound,
            reader: Mutex::new(Box::new(reader)),
            writer: Mutex::new(Box::new(writer)),
            gate: Arc::new(Gate::new()),
        }
    }

    /// Wrap an established TCP stream.
    pub fn from_tcp(stream: TcpStream, outbound: bool) -> TransportResult<Self> {
        let remote_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer, remote_addr, outbound))
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }

    /// Write `data` to the stream as-is. Framing is the caller's concern.
    pub async fn send(&self, data: &[u8]) -> TransportResult<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Write a frame immediately followed by its raw payload, with no other
    /// sender able to write in between.
    pub async fn send_with_payload(&self, frame: &[u8], payload: &[u8]) -> TransportResult<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        debug!(peer = %self.remote_addr, frame = frame.len(), payload = payload.len(), "sent frame with payload");
        Ok(())
    }

    /// Read exactly `n` raw bytes from the stream.
    pub async fn read_bounded(&self, n: u64) -> TransportResult<Vec<u8>> {
        let mut reader = self.reader.lock().await;
        let mut buf = Vec::with_capacity(n.min(READ_RESERVE_LIMIT) as usize);
        (&mut *reader).take(n).read_to_end(&mut buf).await?;
        if buf.len() as u64 != n {
            return Err(TransportError::ShortRead {
                expected: n,
                actual: buf.len() as u64,
            });
        }
        Ok(buf)
    }

    /// Fill `buf` from the stream.
    pub async fn read_exact(&self, buf: &mut [u8]) -> TransportResult<()> {
        let mut reader = self.reader.lock().await;
        reader.read_exact(buf).await?;
        Ok(())
    }

    /// Decode the next frame from the stream.
    pub async fn decode_with(&self, decoder: &dyn Decoder) -> TransportResult<Bytes> {
        let mut reader = self.reader.lock().await;
        decoder.decode(&mut **reader).await
    }

    /// Shut down the write half. The remote sees end-of-stream.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!(peer = %self.remote_addr, error = %e, "shutdown on close failed");
        }
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("remote_addr", &self.remote_addr)
            .field("outbound", &self.outbound)
            .finish_non_exhaustive()
    }
}
