//! Wire protocol for Cairn nodes.
//!
//! Defines the control messages exchanged between peers and how they are
//! framed. A control frame may announce a raw payload: the announced number
//! of bytes follows the frame directly on the same connection, unframed.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::WireCodec;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{tags, Envelope, Message, StoreFile, MAX_MESSAGE_SIZE};
