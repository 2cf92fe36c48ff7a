use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Largest encoded message frame (tag plus body). Matches the transport's
/// default frame limit, so every frame the codec produces fits a default
/// receiver.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Type tags for every message kind.
///
/// Tags not listed here are reserved for future message kinds; decoding one
/// is an error rather than a silent skip.
pub mod tags {
    pub const STORE_FILE: u8 = 1;
}

/// Announces a blob that follows the frame as `size` raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFile {
    pub key: String,
    pub size: u64,
}

/// All control messages in the Cairn protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    StoreFile(StoreFile),
}

impl Message {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::StoreFile(_) => tags::STORE_FILE,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::StoreFile(_) => "StoreFile",
        }
    }

    /// Number of raw bytes that follow this message's frame on the
    /// connection.
    pub fn payload_len(&self) -> u64 {
        match self {
            Self::StoreFile(msg) => msg.size,
        }
    }
}

impl From<StoreFile> for Message {
    fn from(msg: StoreFile) -> Self {
        Self::StoreFile(msg)
    }
}

/// A decoded message together with the address of the peer that sent it.
///
/// The sender is filled in by the receiving side; it is never carried on the
/// wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub from: SocketAddr,
    pub message: Message,
}

impl Envelope {
    pub fn new(from: SocketAddr, message: Message) -> Self {
        Self { from, message }
    }
}
