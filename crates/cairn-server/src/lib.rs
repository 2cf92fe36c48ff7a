//! Replication node for Cairn.
//!
//! A [`ReplicationServer`] owns a local [`cairn_store::ContentStore`], a
//! transport, and the registry of admitted peers. Blobs stored locally are
//! pushed to every connected peer; blobs announced by peers are read off the
//! wire and stored.

pub mod config;
pub mod error;
pub mod registry;
pub mod server;

pub use config::{ServerConfig, ServerOptions};
pub use error::{ServerError, ServerResult};
pub use registry::PeerRegistry;
pub use server::ReplicationServer;
