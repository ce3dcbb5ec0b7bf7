//! Split-filesystem proxy.
//!
//! vfuse lets a VFS front end on one machine serve a directory tree that
//! lives on another. The two sides share one long-lived stream and speak a
//! framed, typed request/response protocol over it.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix-domain stream endpoints
//! - [`frame`]: the 16-byte header framing and its size limit
//! - [`proto`]: message schemas and the positional type registry
//! - [`peer`]: call correlation (initiator) and dispatch (responder)
//! - [`volume`]: filesystem handlers for a shared directory (unix, `volume` feature)

/// Re-export transport types.
pub mod transport {
    pub use vfuse_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use vfuse_frame::*;
}

/// Re-export protocol types.
pub mod proto {
    pub use vfuse_proto::*;
}

/// Re-export peer types.
pub mod peer {
    pub use vfuse_peer::*;
}

/// Re-export volume types (requires `volume` feature).
#[cfg(all(unix, feature = "volume"))]
pub mod volume {
    pub use vfuse_volume::*;
}
