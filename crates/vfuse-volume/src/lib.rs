//! Responder-side filesystem handlers for the vfuse protocol.
//!
//! A [`Volume`] shares one directory tree. It answers every request type
//! by running the matching operation against local storage and folds
//! ordinary failures into the response's [`FsError`](vfuse_proto::FsError).
//!
//! Unix only: ownership, device nodes and permission bits are passed
//! through to the host's native calls.
#![cfg(unix)]

pub mod error;
pub mod handles;
pub mod mode;
pub mod path;
pub mod volume;

pub use error::{Result, VolumeError};
pub use volume::{FsResult, Volume, VolumeConfig};
