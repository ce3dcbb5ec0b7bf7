use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use vfuse_transport::{Stream, TransportError};

use crate::codec::{encode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Each frame is encoded into one contiguous buffer and written in full
/// before returning, so a writer shared behind a mutex never interleaves
/// the bytes of two frames.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.id, frame.tag, frame.body.as_ref())
    }

    /// Encode and send one body under `id` and `tag`.
    ///
    /// An oversized body fails with [`FrameError::BodyTooLarge`] and nothing
    /// reaches the stream.
    pub fn send(&mut self, id: u64, tag: u32, body: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(id, tag, body, self.config.max_frame_size, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        // Don't let one large body pin its buffer for the rest of the session.
        if self.buf.capacity() > INITIAL_BUFFER_CAPACITY * 16 {
            self.buf = BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY);
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl FrameWriter<Stream> {
    /// Create a frame writer for a [`Stream`] and apply the write timeout from config.
    pub fn for_stream(inner: Stream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
