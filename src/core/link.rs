//! Neighbor identity handles.

use std::fmt;

use super::constants::LINK_ID_SIZE;

/// Identity of a neighbor as resolved by the routing layer (its hashname).
///
/// tmesh never interprets the bytes; it only compares them to find the mote
/// tracking a neighbor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId([u8; LINK_ID_SIZE]);

impl LinkId {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; LINK_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; LINK_ID_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for LinkId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form, like a git hash
        for b in &self.0[..4] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinkId({self})")
    }
}
