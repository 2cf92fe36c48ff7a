use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{tags, Message, StoreFile, MAX_MESSAGE_SIZE};

/// Codec for encoding/decoding Cairn protocol messages.
///
/// A message frame is `[1 byte tag][bincode body]`. Length-prefixing the
/// frame for the wire is the transport's job; the transport hands back the
/// same `[tag][body]` bytes to [`WireCodec::decode_frame`].
pub struct WireCodec;

impl WireCodec {
    /// Encode a message as an unprefixed frame: [1 byte tag][body].
    ///
    /// The whole frame, tag included, is at most [`MAX_MESSAGE_SIZE`] bytes.
    pub fn encode_frame(msg: &Message) -> ProtocolResult<Vec<u8>> {
        let body = Self::encode_body(msg)?;
        let size = body.len() + 1;
        if size > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let mut frame = Vec::with_capacity(size);
        frame.push(msg.type_tag());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Decode an unprefixed frame: [1 byte tag][body].
    pub fn decode_frame(frame: &[u8]) -> ProtocolResult<Message> {
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: frame.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let (&tag, body) = frame
            .split_first()
            .ok_or_else(|| ProtocolError::FramingError("empty frame".into()))?;
        match tag {
            tags::STORE_FILE => {
                let msg: StoreFile = bincode::deserialize(body)
                    .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
                Ok(Message::StoreFile(msg))
            }
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }

    /// Encode the message body only (no tag, no length).
    pub fn encode_body(msg: &Message) -> ProtocolResult<Vec<u8>> {
        let body = match msg {
            Message::StoreFile(inner) => bincode::serialize(inner),
        };
        body.map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}
