//! Knocks: single scheduled radio operations.

use super::epoch::{Direction, EpochKind};

/// Stable handle of a community within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommunityId(pub(crate) u32);

/// Stable handle of a mote within its community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MoteId(pub(crate) u32);

impl MoteId {
    /// The community's discovery-only sync mote.
    pub const SYNC: MoteId = MoteId(0);

    /// Check if this is the sync mote.
    pub fn is_sync(self) -> bool {
        self == Self::SYNC
    }
}

/// The best upcoming operation of one mote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Index of the winning epoch in the mote's collection.
    pub epoch: usize,
    /// Stage of the winning epoch.
    pub kind: EpochKind,
    /// Direction to perform.
    pub dir: Direction,
    /// Resolved window index.
    pub window: u32,
    /// Absolute start in microseconds.
    pub start: u64,
    /// Absolute stop in microseconds.
    pub stop: u64,
    /// Channel to tune.
    pub chan: u8,
}

impl Slot {
    /// Check if this slot should run instead of `other`.
    ///
    /// Earlier start wins; equal starts go to the more mature stage.
    pub fn beats(&self, other: &Slot) -> bool {
        (self.start, std::cmp::Reverse(self.kind)) < (other.start, std::cmp::Reverse(other.kind))
    }
}

/// Exactly one upcoming radio operation.
///
/// Transient: produced by [`Tmesh::knock`](crate::mesh::Tmesh::knock),
/// executed by the host and reported back, then discarded. A knock that is
/// never executed simply ages out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Knock {
    /// Community the operation belongs to.
    pub community: CommunityId,
    /// Mote the operation belongs to.
    pub mote: MoteId,
    /// Mote-level schedule details.
    pub slot: Slot,
}

impl Knock {
    /// Direction to perform.
    pub fn dir(&self) -> Direction {
        self.slot.dir
    }

    /// Check if this is a transmit.
    pub fn is_tx(&self) -> bool {
        self.slot.dir == Direction::Tx
    }

    /// Absolute start in microseconds.
    pub fn start(&self) -> u64 {
        self.slot.start
    }

    /// Absolute stop in microseconds.
    pub fn stop(&self) -> u64 {
        self.slot.stop
    }

    /// Channel to tune.
    pub fn chan(&self) -> u8 {
        self.slot.chan
    }

    /// Resolved window index.
    pub fn window(&self) -> u32 {
        self.slot.window
    }
}
