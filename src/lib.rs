//! # tmesh
//!
//! Time-synchronized scheduling and chunked framing for duty-cycled,
//! channel-hopping radio meshes.
//!
//! Two devices holding the same epoch secret compute the same rendezvous
//! (start time and channel) for every window without any beacon. The
//! [`Tmesh`](mesh::Tmesh) manager multiplexes one radio across many
//! neighbors by always picking the earliest upcoming operation, and the
//! [`FrameChannel`](chunks::FrameChannel) turns arbitrary packets into the
//! small length-prefixed chunks exchanged during those brief windows.
//!
//! ## Feature Flags
//!
//! - `host` (default): async knock loop on tokio
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and neighbor handles
//! - [`radio`]: radio driver contract, registry and mediums
//! - [`chunks`]: chunked framing with acks, flow control and cloaking
//! - [`schedule`]: epochs, motes and knocks
//! - [`mesh`]: communities and the manager
//! - [`host`]: tokio loop driving a transceiver (requires `host` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use tmesh::prelude::*;
//!
//! #[derive(Debug)]
//! struct Lora;
//!
//! impl RadioDriver for Lora {
//!     fn energy(&self, _medium: &MediumId) -> u32 {
//!         10
//!     }
//!
//!     fn acquire(&mut self, _medium: &MediumId) -> Result<MediumTiming, RadioError> {
//!         Ok(MediumTiming { min: 2_000, max: 10_000, chans: 8 })
//!     }
//!
//!     fn release(&mut self, _medium: &Medium) {}
//! }
//!
//! let mut mesh = Tmesh::new(TmeshConfig::default()).unwrap();
//! let radio = mesh.radios_mut().register(Box::new(Lora)).unwrap();
//! let community = mesh
//!     .join(&MediumId::from_bytes([1, 2, 3, 4, 5]), "lora", JoinOptions::default())
//!     .unwrap();
//!
//! let mote = mesh.link(community, LinkId::from_bytes([7; 32])).unwrap();
//! mesh.mote_mut(community, mote)
//!     .unwrap()
//!     .add_epoch(Epoch::new(EpochKind::Link, Direction::Tx, [9; 32]));
//! mesh.send(community, mote, b"hello").unwrap();
//!
//! let knock = mesh.knock(0, radio).unwrap();
//! let frame = mesh.knocking(&knock).unwrap().unwrap();
//! assert_eq!(frame.len(), 64);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod chunks;
pub mod core;
pub mod mesh;
pub mod radio;
pub mod schedule;

// Host loop (feature-gated)
#[cfg(feature = "host")]
#[cfg_attr(docsrs, doc(cfg(feature = "host")))]
pub mod host;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::chunks::{AckOutcome, FrameChannel};
    pub use crate::core::*;
    pub use crate::mesh::*;
    pub use crate::radio::*;
    pub use crate::schedule::{
        CommunityId, Direction, Epoch, EpochKind, Knock, Mote, MoteId, Rendezvous, Slot,
    };

    #[cfg(feature = "host")]
    pub use crate::host::{Clock, KnockLoop, Transceiver};
}

// Re-export commonly used items at crate root
pub use crate::core::{LinkId, TmeshError, TmeshResult};
pub use crate::mesh::{Delivered, Tmesh, TmeshConfig};
