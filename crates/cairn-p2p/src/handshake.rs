use async_trait::async_trait;

use crate::error::{TransportError, TransportResult};
use crate::peer::PeerConnection;

/// Negotiation run once on every new connection, before any frame is
/// decoded. An error closes the connection without admitting the peer.
#[async_trait]
pub trait Handshake: Send + Sync {
    async fn handshake(&self, peer: &PeerConnection) -> TransportResult<()>;
}

/// Accepts every connection without exchanging any bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopHandshake;

#[async_trait]
impl Handshake for NopHandshake {
    async fn handshake(&self, _peer: &PeerConnection) -> TransportResult<()> {
        Ok(())
    }
}

/// Both ends send a fixed preamble and require the other side's to match.
#[derive(Clone, Debug)]
pub struct PreambleHandshake {
    preamble: Vec<u8>,
}

impl PreambleHandshake {
    pub fn new(preamble: impl Into<Vec<u8>>) -> Self {
        Self {
            preamble: preamble.into(),
        }
    }
}

#[async_trait]
impl Handshake for PreambleHandshake {
    async fn handshake(&self, peer: &PeerConnection) -> TransportResult<()> {
        peer.send(&self.preamble).await?;

        let mut received = vec![0u8; self.preamble.len()];
        peer.read_exact(&mut received)
            .await
            .map_err(|e| TransportError::Handshake(format!("reading preamble: {e}")))?;

        if received != self.preamble {
            return Err(TransportError::Handshake(format!(
                "preamble mismatch from {}",
                peer.remote_addr()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, split};

    fn connected_pair() -> (PeerConnection, PeerConnection) {
        let (a, b) = duplex(1024);
        let (ar, aw) = split(a);
        let (br, bw) = split(b);
        (
            PeerConnection::new(ar, aw, "127.0.0.1:1".parse().unwrap(), true),
            PeerConnection::new(br, bw, "127.0.0.1:2".parse().unwrap(), false),
        )
    }

    #[tokio::test]
    async fn matching_preambles_succeed() {
        let (a, b) = connected_pair();
        let hs = PreambleHandshake::new(b"cairn/1".to_vec());
        let (ra, rb) = tokio::join!(hs.handshake(&a), hs.handshake(&b));
        ra.unwrap();
        rb.unwrap();
    }

    #[tokio::test]
    async fn mismatched_preambles_fail() {
        let (a, b) = connected_pair();
        let ours = PreambleHandshake::new(b"cairn/1".to_vec());
        let theirs = PreambleHandshake::new(b"cairn/2".to_vec());
        let (ra, rb) = tokio::join!(ours.handshake(&a), theirs.handshake(&b));
        assert!(matches!(ra, Err(TransportError::Handshake(_))));
        assert!(matches!(rb, Err(TransportError::Handshake(_))));
    }

    #[tokio::test]
    async fn nop_always_succeeds() {
        let (a, _b) = connected_pair();
        NopHandshake.handshake(&a).await.unwrap();
    }
}
