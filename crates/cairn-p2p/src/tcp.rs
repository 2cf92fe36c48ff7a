use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::decoder::{Decoder, LengthDelimitedDecoder};
use crate::error::{TransportError, TransportResult};
use crate::handshake::{Handshake, NopHandshake};
use crate::peer::PeerConnection;
use crate::transport::{PeerHandler, Rpc, Transport};

/// Frames waiting for the consumer, across all connections.
const RPC_CHANNEL_CAPACITY: usize = 1;

/// Configuration for the [`TcpTransport`].
#[derive(Clone)]
pub struct TcpTransportConfig {
    /// Address to bind, e.g. `127.0.0.1:3000`. Port `0` picks a free port.
    pub listen_addr: String,
    pub handshake: Arc<dyn Handshake>,
    pub decoder: Arc<dyn Decoder>,
    /// Admission callback; `None` admits every peer that completes the
    /// handshake.
    pub peer_handler: Option<Arc<dyn PeerHandler>>,
}

impl TcpTransportConfig {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            handshake: Arc::new(NopHandshake),
            decoder: Arc::new(LengthDelimitedDecoder::default()),
            peer_handler: None,
        }
    }

    pub fn with_handshake(mut self, handshake: Arc<dyn Handshake>) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_peer_handler(mut self, handler: Arc<dyn PeerHandler>) -> Self {
        self.peer_handler = Some(handler);
        self
    }
}

impl std::fmt::Debug for TcpTransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransportConfig")
            .field("listen_addr", &self.listen_addr)
            .field("peer_handler", &self.peer_handler.is_some())
            .finish_non_exhaustive()
    }
}

/// State shared between the transport and its background tasks.
struct Shared {
    config: TcpTransportConfig,
    rpc_tx: mpsc::Sender<Rpc>,
    shutdown: watch::Sender<bool>,
}

/// TCP implementation of [`Transport`].
///
/// Every accepted or dialed connection gets its own task running handshake,
/// admission, then the read loop. All read loops publish into one channel
/// drained by [`Transport::consume`].
pub struct TcpTransport {
    shared: Arc<Shared>,
    rpc_rx: Mutex<mpsc::Receiver<Rpc>>,
    local_addr: OnceLock<SocketAddr>,
}

impl TcpTransport {
    pub fn new(config: TcpTransportConfig) -> Self {
        let (rpc_tx, rpc_rx) = mpsc::channel(RPC_CHANNEL_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                rpc_tx,
                shutdown,
            }),
            rpc_rx: Mutex::new(rpc_rx),
            local_addr: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &TcpTransportConfig {
        &self.shared.config
    }

    /// Returns `true` once [`Transport::close`] has been called.
    pub fn is_closed(&self) -> bool {
        *self.shared.shutdown.borrow()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    async fn listen_and_accept(&self) -> TransportResult<()> {
        let addr = &self.shared.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;
        let _ = self.local_addr.set(local);

        info!(addr = %local, "tcp transport listening");
        tokio::spawn(accept_loop(
            Arc::clone(&self.shared),
            listener,
            self.shared.shutdown.subscribe(),
        ));
        Ok(())
    }

    async fn dial(&self, addr: &str) -> TransportResult<()> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Dial {
                addr: addr.to_string(),
                source,
            })?;
        debug!(peer = addr, "dialed");
        tokio::spawn(handle_conn(Arc::clone(&self.shared), stream, true));
        Ok(())
    }

    async fn consume(&self) -> Option<Rpc> {
        let mut rx = self.rpc_rx.lock().await;
        let mut shutdown = self.shared.shutdown.subscribe();
        tokio::select! {
            rpc = rx.recv() => rpc,
            _ = closed(&mut shutdown) => None,
        }
    }

    async fn close(&self) {
        if !self.shared.shutdown.send_replace(true) {
            info!("tcp transport closed");
        }
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("config", &self.shared.config)
            .field("local_addr", &self.local_addr())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Resolve once the transport is closed. The `watch::Ref` is dropped here,
/// so callers can hold the result across later awaits.
async fn closed(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

async fn accept_loop(
    shared: Arc<Shared>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = closed(&mut shutdown) => {
                debug!("accept loop stopped");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "accepted connection");
                    tokio::spawn(handle_conn(Arc::clone(&shared), stream, false));
                }
                Err(e) => warn!(error = %e, "tcp accept error"),
            },
        }
    }
}

async fn handle_conn(shared: Arc<Shared>, stream: TcpStream, outbound: bool) {
    let peer = match PeerConnection::from_tcp(stream, outbound) {
        Ok(peer) => Arc::new(peer),
        Err(e) => {
            warn!(error = %e, "dropping connection without peer address");
            return;
        }
    };
    let addr = peer.remote_addr();

    match serve_peer(&shared, &peer).await {
        Ok(()) => debug!(peer = %addr, "peer connection finished"),
        Err(e) => warn!(peer = %addr, error = %e, "dropping peer connection"),
    }
    peer.close().await;
}

/// Handshake, admission, then the read loop.
async fn serve_peer(shared: &Shared, peer: &Arc<PeerConnection>) -> TransportResult<()> {
    shared.config.handshake.handshake(peer).await?;

    let Some(handler) = &shared.config.peer_handler else {
        return read_loop(shared, peer).await;
    };
    handler.on_peer(Arc::clone(peer))?;
    let result = read_loop(shared, peer).await;
    handler.on_peer_closed(peer);
    result
}

/// Decode a frame, publish it, wait for the gate; repeat until the stream
/// ends, a frame fails to decode, or the transport closes.
async fn read_loop(shared: &Shared, peer: &Arc<PeerConnection>) -> TransportResult<()> {
    let mut shutdown = shared.shutdown.subscribe();
    let decoder = shared.config.decoder.as_ref();

    loop {
        let payload = tokio::select! {
            _ = closed(&mut shutdown) => return Ok(()),
            frame = peer.decode_with(decoder) => match frame {
                Ok(frame) => frame,
                Err(TransportError::Closed) => return Ok(()),
                Err(e) => return Err(e),
            },
        };

        debug!(peer = %peer.remote_addr(), bytes = payload.len(), "frame received");
        let rpc = Rpc {
            from: peer.remote_addr(),
            payload,
            gate: Arc::clone(peer.gate()),
        };

        tokio::select! {
            _ = closed(&mut shutdown) => return Ok(()),
            sent = shared.rpc_tx.send(rpc) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }

        tokio::select! {
            _ = closed(&mut shutdown) => return Ok(()),
            _ = peer.gate().await_release() => {}
        }
    }
}
