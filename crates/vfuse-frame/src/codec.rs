use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: id (8) + tag (4) + length (4) = 16 bytes.
pub const HEADER_SIZE: usize = 16;

/// Maximum body size: 16 MiB. The header is not counted.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Caller-assigned request id, echoed in the matching response.
    pub id: u64,
    /// Type tag identifying the body schema.
    pub tag: u32,
    /// Serialized body.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(id: u64, tag: u32, body: impl Into<Bytes>) -> Self {
        Self {
            id,
            tag,
            body: body.into(),
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format (all big-endian):
/// ```text
/// ┌──────────────┬────────────┬──────────────┬─────────────────┐
/// │ ID (8B)      │ Tag (4B)   │ Length (4B)  │ Body            │
/// │              │            │              │ (Length bytes)  │
/// └──────────────┴────────────┴──────────────┴─────────────────┘
/// ```
///
/// Fails with [`FrameError::BodyTooLarge`] before touching `dst` if the body
/// exceeds `max_body`.
pub fn encode_frame(id: u64, tag: u32, body: &[u8], max_body: usize, dst: &mut BytesMut) -> Result<()> {
    let limit = max_body.min(u32::MAX as usize);
    if body.len() > limit {
        return Err(FrameError::BodyTooLarge {
            size: body.len(),
            max: limit,
        });
    }
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_u64(id);
    dst.put_u32(tag);
    dst.put_u32(body.len() as u32);
    dst.put_slice(body);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// The declared length is checked as soon as the header is available, so an
/// oversized frame is rejected without waiting for (or buffering) its body.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_body: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &src[..HEADER_SIZE];
    let id = header.get_u64();
    let tag = header.get_u32();
    let length = header.get_u32() as usize;

    if length > max_body {
        return Err(FrameError::FrameTooLarge {
            size: length,
            max: max_body,
        });
    }

    if src.len() < HEADER_SIZE + length {
        src.reserve(HEADER_SIZE + length - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(length).freeze();

    Ok(Some(Frame { id, tag, body }))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
