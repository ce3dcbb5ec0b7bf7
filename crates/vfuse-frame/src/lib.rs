//! Length-delimited frame codec for the vfuse wire protocol.
//!
//! Every message travels in one frame:
//! - an 8-byte big-endian request id, echoed verbatim by the response
//! - a 4-byte big-endian type tag naming the body schema
//! - a 4-byte big-endian body length (at most 16 MiB)
//!
//! This layer knows nothing about what the tags mean; see `vfuse-proto`.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, HEADER_SIZE, MAX_FRAME_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
