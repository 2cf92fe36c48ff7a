use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_p2p::{Decoder, Handshake, LengthDelimitedDecoder, DEFAULT_MAX_FRAME_SIZE};
use cairn_store::{CasTransform, PathTransform, DEFAULT_ROOT};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Static node settings, loadable from TOML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub storage_root: PathBuf,
    /// Peers dialed on startup. Empty entries are skipped.
    pub bootstrap_nodes: Vec<String>,
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".into(),
            storage_root: PathBuf::from(DEFAULT_ROOT),
            bootstrap_nodes: Vec::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ServerConfig {
    /// Read a config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }
}

/// Pluggable runtime capabilities of a node.
#[derive(Clone)]
pub struct ServerOptions {
    pub handshake: Option<Arc<dyn Handshake>>,
    /// Frame decoder; defaults to a length-delimited decoder bounded by
    /// [`ServerConfig::max_frame_size`].
    pub decoder: Option<Arc<dyn Decoder>>,
    pub path_transform: Arc<dyn PathTransform>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            handshake: None,
            decoder: None,
            path_transform: Arc::new(CasTransform),
        }
    }
}

impl ServerOptions {
    pub fn with_handshake(mut self, handshake: Arc<dyn Handshake>) -> Self {
        self.handshake = Some(handshake);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn with_path_transform(mut self, transform: Arc<dyn PathTransform>) -> Self {
        self.path_transform = transform;
        self
    }

    pub(crate) fn decoder_for(&self, config: &ServerConfig) -> Arc<dyn Decoder> {
        self.decoder
            .clone()
            .unwrap_or_else(|| Arc::new(LengthDelimitedDecoder::new(config.max_frame_size)))
    }
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions")
            .field("handshake", &self.handshake.is_some())
            .field("decoder", &self.decoder.is_some())
            .finish_non_exhaustive()
    }
}
