//! Stream transports for vfuse.
//!
//! The two vfuse peers talk over one long-lived byte stream. This crate
//! provides that stream over either:
//! - TCP (the default deployment: the responder dials the initiator)
//! - Unix domain sockets (local testing and same-host setups)
//!
//! Everything else builds on the [`Stream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::{connect, Listener};
pub use stream::Stream;
pub use tcp::TcpSocket;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
