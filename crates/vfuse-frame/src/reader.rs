use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use vfuse_transport::Stream;

use crate::codec::{decode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// A frame whose header declares an oversized body fails with
/// [`FrameError::FrameTooLarge`] before any of that body is read.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached,
    /// whether cleanly between frames or in the middle of one.
    pub fn read_frame(&mut self) -> Result<Frame> {
        self.next_frame()?.ok_or(FrameError::ConnectionClosed)
    }

    /// Read the next complete frame, or `Ok(None)` on EOF at a frame boundary.
    ///
    /// EOF in the middle of a frame is still `ConnectionClosed`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_frame_size)? {
                return Ok(Some(frame));
            }

            // Read only the header until the body length is known.
            let want = if self.buf.len() < HEADER_SIZE {
                HEADER_SIZE - self.buf.len()
            } else {
                READ_CHUNK_SIZE
            };

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk[..want]) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }
}

impl FrameReader<Stream> {
    /// Create a frame reader for a [`Stream`] and apply the read timeout from config.
    pub fn for_stream(inner: Stream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(crate::writer::transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
