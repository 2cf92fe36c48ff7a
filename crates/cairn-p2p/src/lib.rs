//! Peer-to-peer transport for Cairn nodes.
//!
//! A connection carries two kinds of traffic: framed control messages,
//! decoded by the connection's own read loop, and raw payload bytes that the
//! owner of the transport reads directly off the connection. The two must
//! never interleave, so every connection has a [`Gate`]: after publishing a
//! frame the read loop parks on the gate until the consumer calls
//! [`Gate::release`], which it does only once any payload announced by that
//! frame has been read.
//!
//! # Flow
//!
//! 1. [`TcpTransport::listen_and_accept`](Transport::listen_and_accept)
//!    spawns an accept loop; [`Transport::dial`] spawns a handler for an
//!    outbound connection.
//! 2. Each handler runs the [`Handshake`], then offers the peer to the
//!    [`PeerHandler`]; a failure at either step closes the connection.
//! 3. The read loop decodes frames with the [`Decoder`] and publishes them as
//!    [`Rpc`]s, consumed through [`Transport::consume`].
//!
//! Faults in one connection end only that connection.

pub mod decoder;
pub mod error;
pub mod gate;
pub mod handshake;
pub mod peer;
pub mod tcp;
pub mod transport;

pub use decoder::{Decoder, LengthDelimitedDecoder, DEFAULT_MAX_FRAME_SIZE};
pub use error::{TransportError, TransportResult};
pub use gate::Gate;
pub use handshake::{Handshake, NopHandshake, PreambleHandshake};
pub use peer::PeerConnection;
pub use tcp::{TcpTransport, TcpTransportConfig};
pub use transport::{PeerHandler, Rpc, Transport};
