use crate::messages::MessageKind;

/// Errors raised while mapping frames to messages and back.
///
/// Apart from [`ProtoError::DuplicateRegistration`] and
/// [`ProtoError::MisplacedKind`], which are startup configuration errors,
/// every variant is fatal to the connection it occurred on.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// A frame carried a tag with no registered schema.
    #[error("unknown message type tag {0}")]
    UnknownType(u32),

    /// A body did not decode as the schema its tag names.
    #[error("malformed {kind} body: {source}")]
    Decode {
        kind: MessageKind,
        #[source]
        source: postcard::Error,
    },

    /// A message could not be serialized.
    #[error("failed to encode {kind}: {source}")]
    Encode {
        kind: MessageKind,
        #[source]
        source: postcard::Error,
    },

    /// The same schema was registered twice.
    #[error("{0} registered more than once")]
    DuplicateRegistration(MessageKind),

    /// A response schema was registered in a request slot or vice versa.
    #[error("{0} registered in the wrong slot of its pair")]
    MisplacedKind(MessageKind),

    /// A message of this kind has no tag in the registry in use.
    #[error("{0} is not registered")]
    Unregistered(MessageKind),

    /// A serialized body exceeds the frame limit; nothing was written.
    #[error("{kind} body too large ({size} bytes, max {max})")]
    BodyTooLarge {
        kind: MessageKind,
        size: usize,
        max: usize,
    },

    /// Frame-level failure.
    #[error(transparent)]
    Frame(#[from] vfuse_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
