//! Time-synchronized scheduling.
//!
//! Epochs derive rendezvous, motes pick their best epoch, knocks carry the
//! chosen operation to the host. The frame helpers define the bytes a knock
//! moves over the air.

mod epoch;
pub mod frame;
mod knock;
mod mote;

pub use epoch::*;
pub use knock::*;
pub use mote::*;
