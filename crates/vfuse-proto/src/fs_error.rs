use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

/// Structured filesystem error carried inside a response body.
///
/// These are ordinary negative results, never transport failures. A
/// response holds at most one of them, and none on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsError {
    NotExist,
    ReadOnly,
    NotDir,
    NotEmpty,
    BadHandle,
    BadPath,
    Other(String),
}

impl FsError {
    /// The kernel status code the VFS layer should report for this error.
    #[cfg(unix)]
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotExist => libc::ENOENT,
            FsError::ReadOnly => libc::EROFS,
            FsError::NotDir => libc::ENOTDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::BadHandle => libc::EBADF,
            FsError::BadPath => libc::EINVAL,
            FsError::Other(_) => libc::EIO,
        }
    }

    /// Short machine-friendly name.
    pub fn code(&self) -> &'static str {
        match self {
            FsError::NotExist => "not_exist",
            FsError::ReadOnly => "read_only",
            FsError::NotDir => "not_dir",
            FsError::NotEmpty => "not_empty",
            FsError::BadHandle => "bad_handle",
            FsError::BadPath => "bad_path",
            FsError::Other(_) => "other",
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::NotExist => f.write_str("no such file or directory"),
            FsError::ReadOnly => f.write_str("read-only volume"),
            FsError::NotDir => f.write_str("not a directory"),
            FsError::NotEmpty => f.write_str("directory not empty"),
            FsError::BadHandle => f.write_str("unknown file handle"),
            FsError::BadPath => f.write_str("path must be relative and clean"),
            FsError::Other(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for FsError {}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotExist,
            io::ErrorKind::NotADirectory => FsError::NotDir,
            io::ErrorKind::DirectoryNotEmpty => FsError::NotEmpty,
            io::ErrorKind::ReadOnlyFilesystem => FsError::ReadOnly,
            _ => FsError::Other(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_structured_kinds() {
        let cases = [
            (io::ErrorKind::NotFound, FsError::NotExist),
            (io::ErrorKind::NotADirectory, FsError::NotDir),
            (io::ErrorKind::DirectoryNotEmpty, FsError::NotEmpty),
            (io::ErrorKind::ReadOnlyFilesystem, FsError::ReadOnly),
        ];
        for (kind, expected) in cases {
            assert_eq!(FsError::from(io::Error::from(kind)), expected, "{kind:?}");
        }
    }

    #[test]
    fn unmapped_io_error_keeps_message() {
        let err = FsError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert_eq!(err, FsError::Other("nope".to_string()));
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    #[cfg(unix)]
    fn errno_mapping() {
        assert_eq!(FsError::NotExist.errno(), libc::ENOENT);
        assert_eq!(FsError::ReadOnly.errno(), libc::EROFS);
        assert_eq!(FsError::NotEmpty.errno(), libc::ENOTEMPTY);
        assert_eq!(FsError::BadHandle.errno(), libc::EBADF);
        assert_eq!(FsError::Other("x".into()).errno(), libc::EIO);
    }

    #[cfg(unix)]
    #[test]
    fn raw_os_errors_map_through_kind() {
        let err = FsError::from(io::Error::from_raw_os_error(libc::ENOTEMPTY));
        assert_eq!(err, FsError::NotEmpty);
    }
}
