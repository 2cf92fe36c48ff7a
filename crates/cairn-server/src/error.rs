use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("store error: {0}")]
    Store(#[from] cairn_store::StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] cairn_protocol::ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] cairn_p2p::TransportError),

    #[error("protocol violation: message from unregistered peer {from}")]
    ProtocolViolation { from: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
