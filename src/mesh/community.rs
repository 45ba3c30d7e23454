//! Communities: named neighbor groups sharing one medium.
//!
//! ```text
//! Community "lora"
//!   medium  ──► Arc<Medium>  (shared with every community on the same id)
//!   pipe    ──► frame/chunk sizing shared by all motes
//!   sync    ──► Mote (PING both ways, ECHO after a ping, no framed data)
//!   motes   ──► MoteId(1) Mote ─ MoteId(2) Mote ─ ... (≤ capacity)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use blake2::{Blake2s256, Digest};
use tracing::debug;

use crate::chunks::FrameChannel;
use crate::core::{EPOCH_SECRET_SIZE, LinkId, TmeshError, TmeshResult};
use crate::radio::Medium;
use crate::schedule::{CommunityId, Direction, Epoch, EpochKind, Knock, Mote, MoteId};

/// Community visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommunityKind {
    /// Advertises presence openly.
    #[default]
    Public,
    /// Only known neighbors take part.
    Private,
}

/// Parameters for [`Tmesh::join`](super::Tmesh::join).
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinOptions {
    /// Community visibility.
    pub kind: CommunityKind,
}

impl JoinOptions {
    /// Set the community visibility.
    pub fn with_kind(mut self, kind: CommunityKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Transport resource shared by every mote of a community.
///
/// All motes share the same air time, so frame sizing and cloaking are
/// decided once per community.
#[derive(Debug, Clone)]
pub struct Pipe {
    frame_size: usize,
    chunk_size: u8,
    cloak: Option<u8>,
    sent: u64,
    received: u64,
}

impl Pipe {
    pub(crate) fn new(frame_size: usize, chunk_size: u8, cloak: Option<u8>) -> Self {
        Self {
            frame_size,
            chunk_size,
            cloak,
            sent: 0,
            received: 0,
        }
    }

    /// Radio frame size in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Chunk size including the length byte.
    pub fn chunk_size(&self) -> u8 {
        self.chunk_size
    }

    /// Frames handed to the radio.
    pub fn frames_sent(&self) -> u64 {
        self.sent
    }

    /// Frames accepted from the radio.
    pub fn frames_received(&self) -> u64 {
        self.received
    }

    /// A fresh framing channel sized for this pipe.
    pub fn channel(&self) -> FrameChannel {
        let channel = FrameChannel::new(self.chunk_size);
        match self.cloak {
            Some(rounds) => channel.with_cloak(rounds),
            None => channel,
        }
    }

    pub(crate) fn record_sent(&mut self) {
        self.sent += 1;
    }

    pub(crate) fn record_received(&mut self) {
        self.received += 1;
    }
}

/// A named group of neighbors on one medium.
#[derive(Debug)]
pub struct Community {
    id: CommunityId,
    name: String,
    kind: CommunityKind,
    medium: Arc<Medium>,
    motes: BTreeMap<MoteId, Mote>,
    next_mote: u32,
    sync: Option<Mote>,
    pipe: Pipe,
    max: usize,
    z: u8,
}

impl Community {
    pub(crate) fn new(
        id: CommunityId,
        name: String,
        kind: CommunityKind,
        medium: Arc<Medium>,
        pipe: Pipe,
        max: usize,
        z: u8,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            medium,
            motes: BTreeMap::new(),
            next_mote: 1,
            sync: None,
            pipe,
            max,
            z,
        }
    }

    /// Handle within the manager.
    pub fn id(&self) -> CommunityId {
        self.id
    }

    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Visibility.
    pub fn kind(&self) -> CommunityKind {
        self.kind
    }

    /// Shared medium.
    pub fn medium(&self) -> &Arc<Medium> {
        &self.medium
    }

    /// Shared transport resource.
    pub fn pipe(&self) -> &Pipe {
        &self.pipe
    }

    pub(crate) fn pipe_mut(&mut self) -> &mut Pipe {
        &mut self.pipe
    }

    /// Neighbor capacity.
    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Active motes, not counting the sync mote.
    pub fn len(&self) -> usize {
        self.motes.len()
    }

    /// Check if there are no active motes.
    pub fn is_empty(&self) -> bool {
        self.motes.is_empty()
    }

    /// Check if the community is at capacity.
    pub fn is_full(&self) -> bool {
        self.motes.len() >= self.max
    }

    /// Mote bound to a link.
    pub fn find(&self, link: &LinkId) -> Option<MoteId> {
        self.motes
            .iter()
            .find(|(_, mote)| mote.link().as_ref() == Some(link))
            .map(|(&id, _)| id)
    }

    /// Add or update the mote tracking a neighbor.
    ///
    /// An existing mote for the link is returned as is; a new one is only
    /// created below capacity.
    pub fn link(&mut self, link: LinkId) -> TmeshResult<MoteId> {
        if let Some(id) = self.find(&link) {
            return Ok(id);
        }
        self.insert(Some(link))
    }

    /// Add a mote for a neighbor whose identity is not known yet.
    pub fn expect_neighbor(&mut self) -> TmeshResult<MoteId> {
        self.insert(None)
    }

    /// Bind the identity of a mote once discovery resolves it.
    pub fn bind(&mut self, id: MoteId, link: LinkId) -> TmeshResult<()> {
        if self.find(&link).is_some_and(|bound| bound != id) {
            return Err(TmeshError::AlreadyBound(link));
        }
        let mote = self.motes.get_mut(&id).ok_or(TmeshError::UnknownMote)?;
        mote.bind(link);
        debug!(community = %self.name, mote = id.0, %link, "mote bound");
        Ok(())
    }

    /// Remove the mote bound to a link.
    pub fn unlink(&mut self, link: &LinkId) -> Option<Mote> {
        let id = self.find(link)?;
        self.remove(id)
    }

    /// Remove a mote, dropping its buffered data.
    pub fn remove(&mut self, id: MoteId) -> Option<Mote> {
        let mote = self.motes.remove(&id)?;
        debug!(community = %self.name, mote = id.0, "mote removed");
        Some(mote)
    }

    /// Mote by id; [`MoteId::SYNC`] addresses the sync mote.
    pub fn mote(&self, id: MoteId) -> Option<&Mote> {
        if id.is_sync() {
            return self.sync.as_ref();
        }
        self.motes.get(&id)
    }

    /// Mote by id, mutably.
    pub fn mote_mut(&mut self, id: MoteId) -> Option<&mut Mote> {
        if id.is_sync() {
            return self.sync.as_mut();
        }
        self.motes.get_mut(&id)
    }

    /// The discovery-only sync mote, if advertising.
    pub fn sync(&self) -> Option<&Mote> {
        self.sync.as_ref()
    }

    /// Start or rekey presence advertising.
    ///
    /// The sync mote is created on first use. It holds PING on the community
    /// secret in both directions and its coin picks the side per window, so
    /// two advertising peers face each other in about half the windows. The
    /// ECHO reply epoch is only armed by a ping exchange.
    pub fn advertise(&mut self, secret: [u8; EPOCH_SECRET_SIZE]) -> &mut Mote {
        let name = &self.name;
        let pipe = &self.pipe;
        let z = self.z;
        let sync = self.sync.get_or_insert_with(|| {
            debug!(community = %name, "sync mote created");
            let mut mote = Mote::new(None, pipe.channel());
            mote.set_ping(true);
            mote.set_z(z);
            mote
        });
        sync.add_epoch(Epoch::new(EpochKind::Ping, Direction::Tx, secret));
        sync.add_epoch(Epoch::new(EpochKind::Ping, Direction::Rx, secret));
        sync.remove_epoch(EpochKind::Echo, Direction::Tx);
        sync.remove_epoch(EpochKind::Echo, Direction::Rx);
        sync
    }

    /// Resync a mote with its ping flag set after a completed exchange.
    ///
    /// ECHO epochs are rebased to the knock's start, which both peers share.
    /// A ping on the sync mote arms the ECHO reply: the pinger listens and
    /// the side that heard it answers.
    pub(crate) fn exchanged(&mut self, knock: &Knock) {
        let Some(mote) = self.mote_mut(knock.mote) else {
            return;
        };
        if !mote.is_ping() {
            return;
        }
        if !(knock.mote.is_sync() && knock.slot.kind == EpochKind::Ping) {
            mote.resync(knock.start());
            return;
        }

        let Some(secret) = mote
            .epoch(EpochKind::Ping, knock.dir())
            .map(|ping| echo_secret(ping.secret()))
        else {
            return;
        };
        mote.remove_epoch(EpochKind::Echo, knock.dir());
        let echo = Epoch::new(EpochKind::Echo, knock.dir().opposite(), secret);
        mote.add_epoch(echo.with_base(knock.start()));
        debug!(community = %self.name, dir = ?knock.dir(), at = knock.start(), "echo armed");
    }

    /// Stop advertising.
    pub fn silence(&mut self) -> Option<Mote> {
        self.sync.take()
    }

    /// Every mote, sync mote first.
    pub fn motes(&self) -> impl Iterator<Item = (MoteId, &Mote)> {
        self.sync
            .iter()
            .map(|m| (MoteId::SYNC, m))
            .chain(self.motes.iter().map(|(&id, m)| (id, m)))
    }

    /// Every mote, mutably.
    pub fn motes_mut(&mut self) -> impl Iterator<Item = (MoteId, &mut Mote)> {
        self.sync
            .iter_mut()
            .map(|m| (MoteId::SYNC, m))
            .chain(self.motes.iter_mut().map(|(&id, m)| (id, m)))
    }

    fn insert(&mut self, link: Option<LinkId>) -> TmeshResult<MoteId> {
        if self.is_full() {
            return Err(TmeshError::CapacityExceeded {
                community: self.name.clone(),
                max: self.max,
            });
        }

        let id = MoteId(self.next_mote);
        self.next_mote += 1;

        let mut mote = Mote::new(link, self.pipe.channel());
        mote.set_z(self.z);
        self.motes.insert(id, mote);
        debug!(community = %self.name, mote = id.0, linked = link.is_some(), "mote created");
        Ok(id)
    }
}

/// ECHO secret paired with a community secret.
pub fn echo_secret(secret: &[u8; EPOCH_SECRET_SIZE]) -> [u8; EPOCH_SECRET_SIZE] {
    Blake2s256::new()
        .chain_update(secret)
        .chain_update(b"echo")
        .finalize()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NEIGHBORS_MAX;
    use crate::radio::{MediumId, MediumTiming, RadioId};
    use crate::schedule::Slot;

    fn community(max: usize) -> Community {
        let medium = Medium::new(
            MediumId::from_bytes([1; 5]),
            MediumTiming {
                min: 1_000,
                max: 4_000,
                chans: 4,
            },
            RadioId(0),
        )
        .unwrap();
        Community::new(
            CommunityId(0),
            "lora".into(),
            CommunityKind::Public,
            Arc::new(medium),
            Pipe::new(64, 63, None),
            max,
            0,
        )
    }

    fn link(n: u8) -> LinkId {
        LinkId::from_bytes([n; 32])
    }

    #[test]
    fn test_capacity_bound() {
        let mut c = community(NEIGHBORS_MAX);
        for n in 0..8 {
            c.link(link(n)).unwrap();
        }
        assert!(c.is_full());

        let err = c.link(link(8)).unwrap_err();
        assert!(matches!(err, TmeshError::CapacityExceeded { max: 8, .. }));
        assert_eq!(c.len(), 8);
        assert!(c.find(&link(8)).is_none());

        // an existing neighbor still resolves when full
        assert!(c.link(link(3)).is_ok());
    }

    #[test]
    fn test_link_is_idempotent() {
        let mut c = community(2);
        let a = c.link(link(1)).unwrap();
        assert_eq!(c.link(link(1)).unwrap(), a);
        assert_eq!(c.len(), 1);
        assert_eq!(c.mote(a).unwrap().link(), Some(link(1)));
    }

    #[test]
    fn test_expect_then_bind() {
        let mut c = community(4);
        let unknown = c.expect_neighbor().unwrap();
        assert!(c.mote(unknown).unwrap().link().is_none());

        c.bind(unknown, link(5)).unwrap();
        assert_eq!(c.find(&link(5)), Some(unknown));

        let other = c.expect_neighbor().unwrap();
        assert!(matches!(
            c.bind(other, link(5)),
            Err(TmeshError::AlreadyBound(_))
        ));
        assert!(matches!(
            c.bind(MoteId(99), link(6)),
            Err(TmeshError::UnknownMote)
        ));
    }

    #[test]
    fn test_unlink_reclaims_capacity() {
        let mut c = community(1);
        c.link(link(1)).unwrap();
        assert!(c.link(link(2)).is_err());

        assert!(c.unlink(&link(1)).is_some());
        assert!(c.unlink(&link(1)).is_none());
        assert!(c.link(link(2)).is_ok());
    }

    #[test]
    fn test_sync_mote() {
        let mut c = community(1);
        assert!(c.mote(MoteId::SYNC).is_none());

        let sync = c.advertise([7; 32]);
        assert!(sync.is_ping());
        assert_eq!(sync.epochs().len(), 2);

        // rekeying supersedes instead of stacking epochs
        c.advertise([8; 32]);
        let sync = c.mote(MoteId::SYNC).unwrap();
        assert_eq!(sync.epochs().len(), 2);
        for dir in [Direction::Tx, Direction::Rx] {
            assert_eq!(sync.epoch(EpochKind::Ping, dir).unwrap().secret(), &[8; 32]);
        }
        assert_ne!(echo_secret(&[8; 32]), [8; 32]);

        // never counts against capacity
        assert!(c.link(link(1)).is_ok());
        assert_eq!(c.motes().count(), 2);
        assert_eq!(c.motes().next().unwrap().0, MoteId::SYNC);

        assert!(c.silence().is_some());
        assert!(c.sync().is_none());
    }

    #[test]
    fn test_ping_arms_echo_reply() {
        let mut c = community(1);
        c.advertise([7; 32]);
        let medium = Arc::clone(c.medium());
        let slot = c.sync().unwrap().knock(0, &medium).unwrap();
        let knock = Knock {
            community: c.id(),
            mote: MoteId::SYNC,
            slot,
        };

        c.exchanged(&knock);
        let sync = c.sync().unwrap();
        let echo = sync.epoch(EpochKind::Echo, knock.dir().opposite()).unwrap();
        assert_eq!(echo.secret(), &echo_secret(&[7; 32]));
        assert_eq!(echo.base(), knock.start());
        assert!(sync.epoch(EpochKind::Echo, knock.dir()).is_none());

        // hearing a ping later turns the reply around
        let turned = Knock {
            slot: Slot {
                dir: knock.dir().opposite(),
                start: knock.start() + 10,
                ..slot
            },
            ..knock
        };
        c.exchanged(&turned);
        let sync = c.sync().unwrap();
        assert_eq!(sync.epochs().len(), 3);
        let echo = sync.epoch(EpochKind::Echo, knock.dir()).unwrap();
        assert_eq!(echo.base(), knock.start() + 10);

        // rekeying drops the armed reply
        c.advertise([9; 32]);
        assert_eq!(c.sync().unwrap().epochs().len(), 2);
    }

    #[test]
    fn test_pipe_channel_sizing() {
        let pipe = Pipe::new(16, 15, Some(2));
        let channel = pipe.channel();
        assert_eq!(channel.space(), 14);
        assert_eq!(channel.cloak_rounds(), Some(2));
    }
}
