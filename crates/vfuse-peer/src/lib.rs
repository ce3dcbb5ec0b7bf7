//! Call correlation and request dispatch over one vfuse connection.
//!
//! The initiator wraps its connection in a [`Client`]: callers on any
//! thread issue requests, a single reader thread routes each response back
//! to the caller waiting on its id. The responder runs [`serve`] with a
//! [`Dispatcher`] that answers every request with exactly one response.
//!
//! Transport and protocol failures end the connection, never the process.
//! On the initiator side every pending call then fails with
//! [`PeerError::ConnectionLost`].

pub mod client;
pub mod connection;
pub mod connector;
pub mod error;
pub mod listener;
pub mod server;

pub use client::{Client, ClientConfig};
pub use connection::{split, PacketReader, PacketWriter};
pub use connector::{connect, connect_with_timeout};
pub use error::{PeerError, Result};
pub use listener::PeerListener;
pub use server::{serve, Dispatcher, ServerConfig};
