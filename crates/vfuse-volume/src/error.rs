use std::path::PathBuf;

/// Errors raised while setting a volume up. Per-request failures are
/// [`vfuse_proto::FsError`] values instead.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    /// The root could not be resolved.
    #[error("cannot open volume root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The root exists but is not a directory.
    #[error("volume root {0} is not a directory")]
    NotADirectory(PathBuf),
}

pub type Result<T> = std::result::Result<T, VolumeError>;
