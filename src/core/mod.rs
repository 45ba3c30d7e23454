//! Core constants, error types and identity handles.

mod constants;
mod error;
mod link;

pub use constants::*;
pub use error::*;
pub use link::*;
