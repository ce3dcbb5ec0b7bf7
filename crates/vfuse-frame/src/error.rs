/// Errors that can occur during frame encoding/decoding.
///
/// Apart from `BodyTooLarge`, which is caught before any byte is written,
/// every variant is terminal for the connection it occurred on.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An incoming header declared a body larger than the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An outgoing body exceeds the configured maximum; nothing was written.
    #[error("body too large ({size} bytes, max {max})")]
    BodyTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection closed, or closed partway through a frame.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
