use vfuse_frame::Frame;

use crate::error::{ProtoError, Result};
use crate::messages::{Message, Request, Response};
use crate::registry::MessageRegistry;

/// A decoded frame: the correlation id plus its typed body.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub id: u64,
    pub message: Message,
}

impl Packet {
    pub fn request(id: u64, request: impl Into<Request>) -> Self {
        Self {
            id,
            message: Message::Request(request.into()),
        }
    }

    pub fn response(id: u64, response: impl Into<Response>) -> Self {
        Self {
            id,
            message: Message::Response(response.into()),
        }
    }
}

/// Serialize a packet into a frame ready for the wire.
///
/// Fails with [`ProtoError::Unregistered`] if the registry has no tag for
/// the body's schema, or [`ProtoError::BodyTooLarge`] if the serialized
/// body exceeds `max_body`.
pub fn encode_packet(packet: &Packet, registry: &MessageRegistry, max_body: usize) -> Result<Frame> {
    let kind = packet.message.kind();
    let tag = registry
        .tag_of(kind)
        .ok_or(ProtoError::Unregistered(kind))?;
    let body = packet
        .message
        .to_body()
        .map_err(|source| ProtoError::Encode { kind, source })?;
    if body.len() > max_body {
        return Err(ProtoError::BodyTooLarge {
            kind,
            size: body.len(),
            max: max_body,
        });
    }
    Ok(Frame::new(packet.id, tag, body))
}

/// Decode a frame's body according to its tag.
pub fn decode_packet(frame: &Frame, registry: &MessageRegistry) -> Result<Packet> {
    let kind = registry
        .kind_of(frame.tag)
        .ok_or(ProtoError::UnknownType(frame.tag))?;
    let message = Message::from_body(kind, &frame.body)
        .map_err(|source| ProtoError::Decode { kind, source })?;
    Ok(Packet {
        id: frame.id,
        message,
    })
}
