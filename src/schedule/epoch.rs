//! Deterministic rendezvous epochs.
//!
//! An epoch turns a shared secret into an endless sequence of windows, each
//! holding exactly one rendezvous: a start time and a channel. Two devices
//! holding the same secret and base compute the same rendezvous for every
//! window without exchanging anything else.
//!
//! ```text
//!  base          base + W        base + 2W       base + 3W
//!   |---------------|---------------|---------------|
//!        ^ w0             ^ w1    ^ w2
//!        offset = BLAKE2s(secret || w)[0..4] mod W
//!        chan   = BLAKE2s(secret || w)[4..8] mod chans
//! ```

use std::fmt;

use blake2::{Blake2s256, Digest};
use rand::{RngCore, rngs::OsRng};
use zeroize::Zeroize;

use crate::core::{EPOCH_SECRET_SIZE, EPOCH_WINDOW, ScheduleError};

/// Which side of a rendezvous this device performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Transmit.
    Tx,
    /// Receive.
    Rx,
}

impl Direction {
    /// The direction the peer performs.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Tx => Direction::Rx,
            Direction::Rx => Direction::Tx,
        }
    }
}

/// Relationship stage an epoch belongs to.
///
/// Ordered by maturity; scheduling ties go to the more mature stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EpochKind {
    /// No active schedule.
    Reset,
    /// Presence advertisement.
    Ping,
    /// Answer to a ping.
    Echo,
    /// Handshake in progress.
    Pair,
    /// Established link.
    Link,
}

impl EpochKind {
    /// Check if this stage is still discovering the neighbor.
    pub fn is_discovery(self) -> bool {
        self <= EpochKind::Echo
    }
}

/// One resolved rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendezvous {
    /// Window index.
    pub window: u32,
    /// Absolute start in microseconds.
    pub start: u64,
    /// Channel, below the medium's channel count.
    pub chan: u8,
}

/// A secret-keyed rendezvous generator for one relationship stage.
///
/// The secret is wiped on drop.
#[derive(Clone)]
pub struct Epoch {
    secret: [u8; EPOCH_SECRET_SIZE],
    base: u64,
    dir: Direction,
    kind: EpochKind,
}

impl Epoch {
    /// Create an epoch from a shared secret, with window 0 at time 0.
    pub fn new(kind: EpochKind, dir: Direction, secret: [u8; EPOCH_SECRET_SIZE]) -> Self {
        Self {
            secret,
            base: 0,
            dir,
            kind,
        }
    }

    /// Create an epoch with a fresh random secret.
    pub fn random(kind: EpochKind, dir: Direction) -> Self {
        let mut secret = [0u8; EPOCH_SECRET_SIZE];
        OsRng.fill_bytes(&mut secret);
        Self::new(kind, dir, secret)
    }

    /// Set the base time.
    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Shared secret.
    pub fn secret(&self) -> &[u8; EPOCH_SECRET_SIZE] {
        &self.secret
    }

    /// Absolute microsecond where window 0 starts.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Direction this device performs.
    pub fn dir(&self) -> Direction {
        self.dir
    }

    /// Relationship stage.
    pub fn kind(&self) -> EpochKind {
        self.kind
    }

    /// Window containing time `at`, window 0 if `at` precedes the base.
    pub fn window_at(&self, at: u64) -> u32 {
        let elapsed = at.saturating_sub(self.base) / EPOCH_WINDOW;
        elapsed.min(u32::MAX as u64) as u32
    }

    /// Rendezvous for a window.
    ///
    /// Pure: depends only on the secret, the base and `window`.
    pub fn rendezvous(&self, window: u32, chans: u8) -> Result<Rendezvous, ScheduleError> {
        if chans == 0 {
            return Err(ScheduleError::InvalidArgument("medium has no channels"));
        }

        let mut hasher = Blake2s256::new();
        hasher.update(self.secret);
        hasher.update(window.to_le_bytes());
        let digest = hasher.finalize();

        let offset = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as u64
            % EPOCH_WINDOW;
        let chan = u32::from_le_bytes([digest[4], digest[5], digest[6], digest[7]]) % chans as u32;

        Ok(Rendezvous {
            window,
            start: self.base.saturating_add(window as u64 * EPOCH_WINDOW + offset),
            chan: chan as u8,
        })
    }

    /// First rendezvous starting at or after `from`.
    pub fn next_after(&self, from: u64, chans: u8) -> Result<Rendezvous, ScheduleError> {
        let window = self.window_at(from);
        let current = self.rendezvous(window, chans)?;
        if current.start >= from {
            return Ok(current);
        }

        let next = window
            .checked_add(1)
            .ok_or(ScheduleError::InvalidArgument("epoch windows exhausted"))?;
        self.rendezvous(next, chans)
    }

    /// Rebase so that `window` begins exactly at `at`.
    pub fn sync(&mut self, window: u32, at: u64) {
        self.base = at.saturating_sub(window as u64 * EPOCH_WINDOW);
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Epoch")
            .field("kind", &self.kind)
            .field("dir", &self.dir)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl Drop for Epoch {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch(seed: u8) -> Epoch {
        Epoch::new(EpochKind::Link, Direction::Tx, [seed; EPOCH_SECRET_SIZE])
    }

    #[test]
    fn test_window_math() {
        let e = epoch(1);
        assert_eq!(e.window_at(0), 0);
        assert_eq!(e.window_at(EPOCH_WINDOW - 1), 0);
        assert_eq!(e.window_at(EPOCH_WINDOW), 1);
        assert_eq!(e.window_at(3 * EPOCH_WINDOW + 100), 3);
    }

    #[test]
    fn test_window_before_base() {
        let e = epoch(1).with_base(10 * EPOCH_WINDOW);
        assert_eq!(e.window_at(0), 0);
        assert_eq!(e.window_at(10 * EPOCH_WINDOW + 5), 0);
        assert_eq!(e.window_at(12 * EPOCH_WINDOW), 2);
    }

    #[test]
    fn test_rendezvous_deterministic() {
        let a = epoch(7).with_base(1234);
        let b = Epoch::new(EpochKind::Ping, Direction::Rx, [7; EPOCH_SECRET_SIZE]).with_base(1234);

        for window in [0, 1, 2, 17, 1000, u32::MAX] {
            let ra = a.rendezvous(window, 16).unwrap();
            assert_eq!(ra, a.rendezvous(window, 16).unwrap());
            // direction and stage never change timing
            assert_eq!(ra, b.rendezvous(window, 16).unwrap());
        }
    }

    #[test]
    fn test_rendezvous_bounds() {
        let e = epoch(3).with_base(5_000);
        for window in 0..64 {
            let r = e.rendezvous(window, 5).unwrap();
            let window_start = 5_000 + window as u64 * EPOCH_WINDOW;
            assert!(r.start >= window_start);
            assert!(r.start < window_start + EPOCH_WINDOW);
            assert!(r.chan < 5);
            assert_eq!(r.window, window);
        }
    }

    #[test]
    fn test_rendezvous_secret_dependent() {
        let a = epoch(1);
        let b = epoch(2);
        let differs = (0..16).any(|w| a.rendezvous(w, 8).unwrap() != b.rendezvous(w, 8).unwrap());
        assert!(differs);
    }

    #[test]
    fn test_rendezvous_zero_channels() {
        assert!(matches!(
            epoch(1).rendezvous(0, 0),
            Err(ScheduleError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_next_after() {
        let e = epoch(9);
        let w3 = e.rendezvous(3, 8).unwrap();

        // just before the window 3 rendezvous
        assert_eq!(e.next_after(w3.start, 8).unwrap(), w3);
        assert_eq!(e.next_after(3 * EPOCH_WINDOW, 8).unwrap(), w3);

        // just after it rolls to window 4
        let next = e.next_after(w3.start + 1, 8).unwrap();
        assert_eq!(next, e.rendezvous(4, 8).unwrap());
        assert!(next.start > w3.start);
    }

    #[test]
    fn test_sync_rebases() {
        let mut e = epoch(4);
        e.sync(0, 77_000);
        assert_eq!(e.base(), 77_000);

        e.sync(2, 3 * EPOCH_WINDOW);
        assert_eq!(e.base(), EPOCH_WINDOW);
        assert_eq!(e.window_at(3 * EPOCH_WINDOW), 2);
    }

    #[test]
    fn test_kind_order() {
        assert!(EpochKind::Reset < EpochKind::Ping);
        assert!(EpochKind::Ping < EpochKind::Echo);
        assert!(EpochKind::Echo < EpochKind::Pair);
        assert!(EpochKind::Pair < EpochKind::Link);
        assert!(EpochKind::Echo.is_discovery());
        assert!(!EpochKind::Pair.is_discovery());
    }

    #[test]
    fn test_debug_hides_secret() {
        let e = epoch(0xab);
        let debug = format!("{e:?}");
        assert!(debug.contains("Link"));
        assert!(!debug.contains("171"));
    }
}
