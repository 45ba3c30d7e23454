//! Chunked framing protocol.
//!
//! Turns arbitrary-length packets into the small length-prefixed units that
//! fit a radio frame, and back. Independent of scheduling.

mod channel;
pub mod cloak;

pub use channel::{AckOutcome, FrameChannel};
