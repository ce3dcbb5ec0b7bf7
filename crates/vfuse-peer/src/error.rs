use vfuse_proto::MessageKind;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] vfuse_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] vfuse_frame::FrameError),

    /// Message mapping error.
    #[error("protocol error: {0}")]
    Proto(#[from] vfuse_proto::ProtoError),

    /// The connection is gone; every pending and future call fails with this.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A response arrived for an id with no pending call.
    #[error("response for unknown call id {0}")]
    UnknownCallId(u64),

    /// A message arrived in the wrong direction (a request at the
    /// initiator, or a response at the responder).
    #[error("unexpected {kind} (id {id})")]
    UnexpectedMessage { id: u64, kind: MessageKind },

    /// A response did not match the request it answers.
    #[error("call {id} expected {expected}, got {got}")]
    UnexpectedResponse {
        id: u64,
        expected: MessageKind,
        got: MessageKind,
    },

    /// The call's deadline passed; the connection stays usable.
    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, PeerError>;
