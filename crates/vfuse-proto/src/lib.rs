//! Message schemas and the tag registry for the vfuse protocol.
//!
//! Both peers build the same [`MessageRegistry`] at startup. Tags are
//! positional: the k-th registered request/response pair owns tags `2k`
//! and `2k+1`, so the registration order in [`MessageRegistry::standard`]
//! is append-only. Retired pairs become placeholders that still consume
//! their two tags.
//!
//! Bodies are serialized with `postcard`. Decoding a frame yields a
//! [`Packet`] carrying a [`Message`], which is either a [`Request`] or a
//! [`Response`]; both are closed enums so dispatch is an exhaustive match.

pub mod error;
pub mod fs_error;
pub mod messages;
pub mod packet;
pub mod registry;

pub use error::{ProtoError, Result};
pub use fs_error::FsError;
pub use messages::*;
pub use packet::{decode_packet, encode_packet, Packet};
pub use registry::{MessageRegistry, RegistryBuilder};
