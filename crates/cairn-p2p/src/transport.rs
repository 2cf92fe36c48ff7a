use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportResult;
use crate::gate::Gate;
use crate::peer::PeerConnection;

/// One decoded frame, handed from a connection's read loop to the owner of
/// the transport.
///
/// The read loop that produced it stays parked until `gate` is released, so
/// the consumer must call [`Gate::release`] exactly once per `Rpc`, after it
/// has read any payload the frame announced.
#[derive(Clone, Debug)]
pub struct Rpc {
    pub from: SocketAddr,
    pub payload: Bytes,
    pub gate: Arc<Gate>,
}

/// Callbacks for peers entering and leaving the transport.
pub trait PeerHandler: Send + Sync {
    /// Called after a successful handshake. An error closes the connection.
    fn on_peer(&self, peer: Arc<PeerConnection>) -> TransportResult<()>;

    /// Called when an admitted peer's connection handler exits.
    fn on_peer_closed(&self, _peer: &Arc<PeerConnection>) {}
}

/// Connection-oriented transport between nodes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address the listener is bound to, once listening.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Bind the listener and start accepting connections in the background.
    async fn listen_and_accept(&self) -> TransportResult<()>;

    /// Open an outbound connection and serve it in the background.
    async fn dial(&self, addr: &str) -> TransportResult<()>;

    /// Next frame from any connection. Frames from one connection arrive in
    /// order; there is no ordering across connections. Returns `None` once
    /// the transport is closed.
    async fn consume(&self) -> Option<Rpc>;

    /// Stop accepting connections and shut down every connection handler.
    async fn close(&self);
}
