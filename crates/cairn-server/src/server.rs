use std::net::SocketAddr;
use std::sync::Arc;

use cairn_p2p::{
    LengthDelimitedDecoder, PeerHandler, Rpc, TcpTransport, TcpTransportConfig, Transport,
};
use cairn_protocol::{Envelope, Message, StoreFile, WireCodec};
use cairn_store::ContentStore;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{ServerConfig, ServerOptions};
use crate::error::{ServerError, ServerResult};
use crate::registry::PeerRegistry;

/// A Cairn node: local blob store plus replication to every connected peer.
pub struct ReplicationServer {
    config: ServerConfig,
    store: ContentStore,
    registry: Arc<PeerRegistry>,
    transport: Arc<dyn Transport>,
    /// Length-prefixes outgoing frames under the configured frame limit.
    framer: LengthDelimitedDecoder,
    shutdown: watch::Sender<bool>,
}

impl ReplicationServer {
    /// Build a node over TCP. Admission goes through the node's own registry.
    pub fn new(config: ServerConfig, options: ServerOptions) -> Self {
        let registry = Arc::new(PeerRegistry::new());

        let mut transport_config = TcpTransportConfig::new(config.listen_addr.clone())
            .with_decoder(options.decoder_for(&config))
            .with_peer_handler(Arc::clone(&registry) as Arc<dyn PeerHandler>);
        if let Some(handshake) = &options.handshake {
            transport_config = transport_config.with_handshake(Arc::clone(handshake));
        }

        let store = ContentStore::new(config.storage_root.clone(), options.path_transform);
        let transport = Arc::new(TcpTransport::new(transport_config));
        Self::with_transport(config, store, registry, transport)
    }

    /// Build a node over an existing transport. `registry` must be the
    /// transport's peer handler for replication and inbound lookups to work.
    pub fn with_transport(
        config: ServerConfig,
        store: ContentStore,
        registry: Arc<PeerRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let framer = LengthDelimitedDecoder::new(config.max_frame_size);
        Self {
            config,
            store,
            registry,
            transport,
            framer,
            shutdown,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn peer_count(&self) -> usize {
        self.registry.len()
    }

    pub fn peers(&self) -> Vec<String> {
        self.registry.addrs()
    }

    /// Listen, dial the bootstrap nodes, then run the dispatch loop until
    /// [`stop`](Self::stop) is called.
    pub async fn start(&self) -> ServerResult<()> {
        self.listen().await?;
        self.bootstrap_network();
        self.run().await
    }

    pub async fn listen(&self) -> ServerResult<()> {
        self.transport.listen_and_accept().await?;
        info!(
            addr = ?self.local_addr(),
            root = %self.store.root().display(),
            "replication server listening"
        );
        Ok(())
    }

    /// Dial every non-empty bootstrap address in the background. Each dial
    /// is independent; failures are logged and never block the caller.
    pub fn bootstrap_network(&self) {
        for addr in self.config.bootstrap_nodes.iter().filter(|a| !a.is_empty()) {
            let transport = Arc::clone(&self.transport);
            let addr = addr.clone();
            tokio::spawn(async move {
                match transport.dial(&addr).await {
                    Ok(()) => debug!(peer = %addr, "bootstrap dial succeeded"),
                    Err(e) => warn!(peer = %addr, error = %e, "bootstrap dial failed"),
                }
            });
        }
    }

    /// Dispatch loop: handle inbound frames until shutdown, then close the
    /// transport. Per-message faults are logged and never end the loop.
    pub async fn run(&self) -> ServerResult<()> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                rpc = self.transport.consume() => match rpc {
                    Some(rpc) => self.handle_rpc(rpc).await,
                    None => break,
                },
            }
        }

        self.transport.close().await;
        info!("replication server stopped");
        Ok(())
    }

    /// Signal the dispatch loop to stop. Safe to call more than once.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            info!("replication server stopping");
        }
    }

    /// Store a blob locally, then push it to every connected peer.
    ///
    /// Peers are sent to concurrently, so one slow peer does not hold back
    /// the others. Every peer is attempted; the first error is returned.
    pub async fn store_and_replicate<R>(&self, key: &str, mut reader: R) -> ServerResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let size = self.store.write(key, &data[..]).await?;

        let frame = WireCodec::encode_frame(&Message::from(StoreFile {
            key: key.to_string(),
            size,
        }))?;
        let frame: Arc<[u8]> = self.framer.frame(&frame)?.into();
        let data: Arc<[u8]> = data.into();

        let peers = self.registry.snapshot();
        let mut sends = JoinSet::new();
        for peer in &peers {
            let peer = Arc::clone(peer);
            let frame = Arc::clone(&frame);
            let data = Arc::clone(&data);
            sends.spawn(async move {
                let result = peer.send_with_payload(&frame, &data).await;
                (peer.remote_addr(), result)
            });
        }

        let mut first_err = None;
        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((addr, Ok(()))) => debug!(peer = %addr, key, bytes = size, "blob sent"),
                Ok((addr, Err(e))) => {
                    warn!(peer = %addr, key, error = %e, "replication failed");
                    first_err.get_or_insert(ServerError::from(e));
                }
                Err(e) => {
                    warn!(key, error = %e, "replication task failed");
                    first_err.get_or_insert(ServerError::Io(std::io::Error::other(e)));
                }
            }
        }

        info!(key, bytes = size, peers = peers.len(), "blob stored and replicated");
        match first_err {
            Some(e) => Err(e),
            None => Ok(size),
        }
    }

    pub async fn has(&self, key: &str) -> bool {
        self.store.has(key).await
    }

    pub async fn read(&self, key: &str) -> ServerResult<Vec<u8>> {
        Ok(self.store.read(key).await?)
    }

    pub async fn delete(&self, key: &str) -> ServerResult<()> {
        Ok(self.store.delete(key).await?)
    }

    async fn handle_rpc(&self, rpc: Rpc) {
        if let Err(e) = self.process(&rpc).await {
            warn!(peer = %rpc.from, error = %e, "dropping message");
        }
        rpc.gate.release();
    }

    async fn process(&self, rpc: &Rpc) -> ServerResult<()> {
        let envelope = Envelope::new(rpc.from, WireCodec::decode_frame(&rpc.payload)?);
        debug!(peer = %envelope.from, kind = envelope.message.type_name(), "message received");

        match envelope.message {
            Message::StoreFile(StoreFile { key, size }) => {
                let from = envelope.from.to_string();
                let peer = self
                    .registry
                    .get(&from)
                    .ok_or(ServerError::ProtocolViolation { from })?;
                let data = peer.read_bounded(size).await?;
                let written = self.store.write(&key, &data[..]).await?;
                info!(peer = %envelope.from, key = %key, bytes = written, "replicated blob stored");
            }
        }
        Ok(())
    }
}

/// Resolve once the server is stopped, dropping the `watch::Ref` before
/// returning so the dispatch future stays `Send`.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

impl std::fmt::Debug for ReplicationServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationServer")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("peers", &self.peer_count())
            .finish_non_exhaustive()
    }
}
