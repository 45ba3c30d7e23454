//! Radio driver interface and medium validation.
//!
//! - [`RadioDriver`]: the three-operation contract hardware backends implement
//! - [`RadioRegistry`]: bounded driver table plus the shared medium cache
//! - [`Medium`]: a validated technology/band descriptor with timing bounds

mod driver;
mod medium;

pub use driver::*;
pub use medium::*;
