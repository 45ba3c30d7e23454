//! Per-neighbor scheduling and framing state.

use blake2::{Blake2s256, Digest};
use tracing::trace;

use super::epoch::{Direction, Epoch, EpochKind};
use super::knock::Slot;
use crate::chunks::FrameChannel;
use crate::core::{LinkId, ScheduleError};
use crate::radio::Medium;

/// One neighbor: its epochs, in insertion order, plus its framing channel.
///
/// The link stays unknown until discovery resolves it; an unresolved mote
/// still schedules its discovery epochs.
#[derive(Debug)]
pub struct Mote {
    link: Option<LinkId>,
    epochs: Vec<Epoch>,
    frames: FrameChannel,
    /// Every exchange resyncs the echo epoch.
    ping: bool,
    z: u8,
    /// Picks a side when one schedule is held in both directions.
    coin: u64,
}

impl Mote {
    /// Create a mote with no epochs.
    pub fn new(link: Option<LinkId>, frames: FrameChannel) -> Self {
        Self {
            link,
            epochs: Vec::new(),
            frames,
            ping: false,
            z: 0,
            coin: rand::random(),
        }
    }

    /// Neighbor identity, once known.
    pub fn link(&self) -> Option<LinkId> {
        self.link
    }

    /// Bind the neighbor identity.
    pub fn bind(&mut self, link: LinkId) {
        self.link = Some(link);
    }

    /// Add an epoch, superseding any with the same stage and direction.
    ///
    /// A superseded epoch keeps its position and is returned.
    pub fn add_epoch(&mut self, epoch: Epoch) -> Option<Epoch> {
        match self
            .epochs
            .iter_mut()
            .find(|e| e.kind() == epoch.kind() && e.dir() == epoch.dir())
        {
            Some(existing) => Some(std::mem::replace(existing, epoch)),
            None => {
                self.epochs.push(epoch);
                None
            }
        }
    }

    /// Remove the epoch for a stage and direction.
    pub fn remove_epoch(&mut self, kind: EpochKind, dir: Direction) -> Option<Epoch> {
        let index = self
            .epochs
            .iter()
            .position(|e| e.kind() == kind && e.dir() == dir)?;
        Some(self.epochs.remove(index))
    }

    /// Epoch for a stage and direction.
    pub fn epoch(&self, kind: EpochKind, dir: Direction) -> Option<&Epoch> {
        self.epochs.iter().find(|e| e.kind() == kind && e.dir() == dir)
    }

    /// All epochs in insertion order.
    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }

    /// Most mature stage among the epochs, `Reset` if none.
    pub fn stage(&self) -> EpochKind {
        self.epochs
            .iter()
            .map(Epoch::kind)
            .max()
            .unwrap_or(EpochKind::Reset)
    }

    /// Check if the relationship is still in discovery.
    pub fn is_discovering(&self) -> bool {
        self.stage().is_discovery()
    }

    /// Check the ping flag.
    pub fn is_ping(&self) -> bool {
        self.ping
    }

    /// Set the ping flag.
    pub fn set_ping(&mut self, ping: bool) {
        self.ping = ping;
    }

    /// Priority index for cross-neighbor ties.
    pub fn z(&self) -> u8 {
        self.z
    }

    /// Set the priority index.
    pub fn set_z(&mut self, z: u8) {
        self.z = z;
    }

    /// Reseed the coin that splits shared-schedule windows.
    pub fn set_coin(&mut self, coin: u64) {
        self.coin = coin;
    }

    /// Direction this mote takes in a window where a stage is held both ways.
    ///
    /// Two peers with different coins face each other in about half the
    /// windows.
    pub fn facing(&self, window: u32) -> Direction {
        let digest = Blake2s256::new()
            .chain_update(self.coin.to_le_bytes())
            .chain_update(window.to_le_bytes())
            .finalize();
        if digest[0] & 1 == 1 {
            Direction::Tx
        } else {
            Direction::Rx
        }
    }

    /// Framing channel.
    pub fn frames(&self) -> &FrameChannel {
        &self.frames
    }

    /// Framing channel, mutably.
    pub fn frames_mut(&mut self) -> &mut FrameChannel {
        &mut self.frames
    }

    /// Best upcoming operation at or after `from`.
    ///
    /// Earliest start wins, ties go to the more mature stage. A stage held
    /// in both directions on one schedule runs the side [`facing`] picks.
    /// `Reset` epochs never win; a mote with nothing else has no schedule.
    ///
    /// [`facing`]: Mote::facing
    pub fn knock(&self, from: u64, medium: &Medium) -> Result<Slot, ScheduleError> {
        let mut best: Option<Slot> = None;

        for (index, epoch) in self.epochs.iter().enumerate() {
            if epoch.kind() == EpochKind::Reset {
                continue;
            }
            let rendezvous = match epoch.next_after(from, medium.chans()) {
                Ok(r) => r,
                Err(e) => {
                    trace!(kind = ?epoch.kind(), error = %e, "epoch skipped");
                    continue;
                }
            };

            let slot = Slot {
                epoch: index,
                kind: epoch.kind(),
                dir: epoch.dir(),
                window: rendezvous.window,
                start: rendezvous.start,
                stop: rendezvous
                    .start
                    .saturating_add(medium.op_time(epoch.dir()) as u64),
                chan: rendezvous.chan,
            };
            let wins = match best.as_ref() {
                None => true,
                Some(b) if b.start == slot.start && b.kind == slot.kind && b.dir != slot.dir => {
                    slot.dir == self.facing(slot.window)
                }
                Some(b) => slot.beats(b),
            };
            if wins {
                best = Some(slot);
            }
        }

        best.ok_or(ScheduleError::NoSchedule)
    }

    /// Rebase echo epochs so their window 0 starts at `at`.
    ///
    /// Returns whether any epoch moved.
    pub fn resync(&mut self, at: u64) -> bool {
        let mut moved = false;
        for epoch in self.epochs.iter_mut().filter(|e| e.kind() == EpochKind::Echo) {
            epoch.sync(0, at);
            moved = true;
        }
        moved
    }
}
