//! Medium descriptors.
//!
//! A medium is the validated, hardware-bound description of one radio
//! technology/band/rate: how long a transmit or receive takes and how many
//! channels exist. Communities share mediums by identity.

use std::fmt;

use super::RadioId;
use crate::core::{MEDIUM_ID_SIZE, RadioError};
use crate::schedule::Direction;

/// Opaque 5-byte medium identity (technology, band and rate code).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediumId([u8; MEDIUM_ID_SIZE]);

impl MediumId {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; MEDIUM_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; MEDIUM_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for MediumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MediumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediumId({self})")
    }
}

/// Timing and channel parameters a driver reports for a medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediumTiming {
    /// Minimum microseconds to perform one operation.
    pub min: u32,
    /// Maximum microseconds to perform one operation.
    pub max: u32,
    /// Number of channels.
    pub chans: u8,
}

/// A validated medium, bound to the driver that acquired it.
///
/// Only the [`RadioRegistry`](super::RadioRegistry) constructs these, after a
/// driver accepted the identity.
#[derive(Debug, PartialEq, Eq)]
pub struct Medium {
    id: MediumId,
    min: u32,
    max: u32,
    chans: u8,
    radio: RadioId,
}

impl Medium {
    pub(crate) fn new(
        id: MediumId,
        timing: MediumTiming,
        radio: RadioId,
    ) -> Result<Self, RadioError> {
        if timing.chans == 0 {
            return Err(RadioError::Hardware(format!("medium {id} has no channels")));
        }
        if timing.min > timing.max {
            return Err(RadioError::Hardware(format!(
                "medium {id} timing inverted: {} > {}",
                timing.min, timing.max
            )));
        }

        Ok(Self {
            id,
            min: timing.min,
            max: timing.max,
            chans: timing.chans,
            radio,
        })
    }

    /// Medium identity.
    pub fn id(&self) -> MediumId {
        self.id
    }

    /// Minimum microseconds per operation.
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Maximum microseconds per operation.
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Number of channels.
    pub fn chans(&self) -> u8 {
        self.chans
    }

    /// Driver that acquired this medium.
    pub fn radio(&self) -> RadioId {
        self.radio
    }

    /// Time budget for one operation in the given direction.
    ///
    /// Transmitters only need the airtime; receivers listen for the full
    /// bound to absorb clock drift.
    pub fn op_time(&self, dir: Direction) -> u32 {
        match dir {
            Direction::Tx => self.min,
            Direction::Rx => self.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(min: u32, max: u32, chans: u8) -> MediumTiming {
        MediumTiming { min, max, chans }
    }

    #[test]
    fn test_medium_id_display() {
        let id = MediumId::from_bytes([0x0a, 0x1b, 0x2c, 0x3d, 0x4e]);
        assert_eq!(id.to_string(), "0a1b2c3d4e");
        assert_eq!(format!("{id:?}"), "MediumId(0a1b2c3d4e)");
    }

    #[test]
    fn test_medium_validation() {
        let id = MediumId::from_bytes([1; 5]);

        assert!(Medium::new(id, timing(100, 200, 0), RadioId(0)).is_err());
        assert!(Medium::new(id, timing(300, 200, 8), RadioId(0)).is_err());

        let medium = Medium::new(id, timing(100, 200, 8), RadioId(1)).unwrap();
        assert_eq!(medium.id(), id);
        assert_eq!(medium.chans(), 8);
        assert_eq!(medium.radio(), RadioId(1));
    }

    #[test]
    fn test_op_time_by_direction() {
        let id = MediumId::from_bytes([1; 5]);
        let medium = Medium::new(id, timing(1_000, 5_000, 4), RadioId(0)).unwrap();

        assert_eq!(medium.op_time(Direction::Tx), 1_000);
        assert_eq!(medium.op_time(Direction::Rx), 5_000);
    }
}
