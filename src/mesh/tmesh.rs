//! The tmesh manager.
//!
//! Owns the radio registry and every community. The host drives it with
//! three calls per radio operation:
//!
//! ```text
//!   knock(now, radio) ──► Knock          pure, picks the earliest operation
//!        │
//!        ├─ tx: knocking(&knock) ──► frame bytes to transmit
//!        │
//!   ...hardware runs between knock.start() and knock.stop()...
//!        │
//!   knocked(&knock, frame)               feeds rx bytes, acks, resyncs
//!        │
//!   process() ──► Vec<Delivered>         complete packets for the router
//! ```
//!
//! A knock that is never run is simply forgotten; the next `knock` call
//! recomputes from the current time.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::community::{Community, JoinOptions, Pipe};
use crate::chunks::FrameChannel;
use crate::core::{
    ChunkError, DEFAULT_CLOAK_ROUNDS, DEFAULT_FRAME_SIZE, EPOCH_SECRET_SIZE, LinkId,
    MAX_FRAME_SIZE, MIN_FRAME_SIZE, NEIGHBORS_MAX, TmeshError, TmeshResult,
};
use crate::radio::{Medium, MediumId, RadioId, RadioRegistry};
use crate::schedule::{CommunityId, Knock, Mote, MoteId, frame};

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct TmeshConfig {
    /// Radio frame size handed to and from the host.
    pub frame_size: usize,

    /// Chunk size including its length byte; 0 derives it from the frame.
    pub chunk_size: u8,

    /// Cloak every packet.
    pub cloak: bool,

    /// Cloaking rounds when enabled.
    pub cloak_rounds: u8,

    /// Neighbor capacity of each community.
    pub neighbors_max: usize,

    /// Priority index inherited by new motes.
    pub z: u8,
}

impl Default for TmeshConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            chunk_size: 0,
            cloak: false,
            cloak_rounds: DEFAULT_CLOAK_ROUNDS,
            neighbors_max: NEIGHBORS_MAX,
            z: 0,
        }
    }
}

impl TmeshConfig {
    /// Set the radio frame size.
    pub fn with_frame_size(mut self, size: usize) -> Self {
        self.frame_size = size;
        self
    }

    /// Set the chunk size.
    pub fn with_chunk_size(mut self, size: u8) -> Self {
        self.chunk_size = size;
        self
    }

    /// Enable cloaking with the given number of rounds.
    pub fn with_cloak(mut self, rounds: u8) -> Self {
        self.cloak = true;
        self.cloak_rounds = rounds;
        self
    }

    /// Set the neighbor capacity.
    pub fn with_neighbors_max(mut self, max: usize) -> Self {
        self.neighbors_max = max;
        self
    }

    /// Set the priority index.
    pub fn with_z(mut self, z: u8) -> Self {
        self.z = z;
        self
    }

    /// Chunk size actually used by framing channels.
    pub fn effective_chunk_size(&self) -> u8 {
        if self.chunk_size == 0 {
            self.frame_size.saturating_sub(1).min(u8::MAX as usize) as u8
        } else {
            self.chunk_size
        }
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> TmeshResult<()> {
        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&self.frame_size) {
            return Err(TmeshError::Config(format!(
                "frame size {} outside {MIN_FRAME_SIZE}..={MAX_FRAME_SIZE}",
                self.frame_size
            )));
        }
        if self.neighbors_max == 0 {
            return Err(TmeshError::Config("neighbors_max must be non-zero".into()));
        }
        if self.cloak_rounds == 0 {
            return Err(TmeshError::Config("cloak_rounds must be non-zero".into()));
        }

        // out() may return a full chunk plus its length byte
        let largest = FrameChannel::new(self.effective_chunk_size()).space() as usize + 1;
        if largest > self.frame_size - 1 {
            return Err(TmeshError::Config(format!(
                "chunk size {} does not fit frame size {}",
                self.effective_chunk_size(),
                self.frame_size
            )));
        }
        Ok(())
    }

    fn pipe(&self) -> Pipe {
        Pipe::new(
            self.frame_size,
            self.effective_chunk_size(),
            self.cloak.then_some(self.cloak_rounds),
        )
    }
}

/// A complete packet reassembled from a neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Community it arrived on.
    pub community: CommunityId,
    /// Community name.
    pub name: String,
    /// Mote it arrived on.
    pub mote: MoteId,
    /// Neighbor identity, if bound.
    pub link: Option<LinkId>,
    /// Packet bytes, decloaked.
    pub packet: Vec<u8>,
}

/// Scheduling and framing manager.
#[derive(Debug)]
pub struct Tmesh {
    config: TmeshConfig,
    radios: RadioRegistry,
    communities: BTreeMap<CommunityId, Community>,
    next_community: u32,
}

impl Tmesh {
    /// Create a manager with an empty radio registry.
    pub fn new(config: TmeshConfig) -> TmeshResult<Self> {
        Self::with_radios(config, RadioRegistry::new())
    }

    /// Create a manager around an existing radio registry.
    pub fn with_radios(config: TmeshConfig, radios: RadioRegistry) -> TmeshResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            radios,
            communities: BTreeMap::new(),
            next_community: 0,
        })
    }

    /// Configuration.
    pub fn config(&self) -> &TmeshConfig {
        &self.config
    }

    /// Radio registry.
    pub fn radios(&self) -> &RadioRegistry {
        &self.radios
    }

    /// Radio registry, for registering drivers.
    pub fn radios_mut(&mut self) -> &mut RadioRegistry {
        &mut self.radios
    }

    /// Energy cost of a medium, 0 if no driver recognizes it.
    pub fn medium_check(&self, id: &MediumId) -> u32 {
        self.radios.energy(id)
    }

    /// Shared medium for an identity, acquired on first use.
    pub fn medium_get(&mut self, id: &MediumId) -> TmeshResult<Arc<Medium>> {
        Ok(self.radios.medium(id)?)
    }

    /// Join a community, or return the existing one with this name.
    pub fn join(
        &mut self,
        medium: &MediumId,
        name: &str,
        options: JoinOptions,
    ) -> TmeshResult<CommunityId> {
        let medium = self.medium_get(medium)?;

        if let Some(id) = self.find_community(name) {
            drop(medium);
            self.radios.release_unused();
            return Ok(id);
        }

        let id = CommunityId(self.next_community);
        self.next_community += 1;
        debug!(
            community = name,
            medium = %medium.id(),
            kind = ?options.kind,
            "joined community"
        );
        let community = Community::new(
            id,
            name.to_owned(),
            options.kind,
            medium,
            self.config.pipe(),
            self.config.neighbors_max,
            self.config.z,
        );
        self.communities.insert(id, community);
        Ok(id)
    }

    /// Leave a community, releasing its medium if nothing else uses it.
    pub fn leave(&mut self, name: &str) -> TmeshResult<()> {
        let id = self
            .find_community(name)
            .ok_or(TmeshError::UnknownCommunity)?;
        self.communities.remove(&id);
        let released = self.radios.release_unused();
        debug!(community = name, released, "left community");
        Ok(())
    }

    /// Community id by name.
    pub fn find_community(&self, name: &str) -> Option<CommunityId> {
        self.communities
            .values()
            .find(|c| c.name() == name)
            .map(Community::id)
    }

    /// Community by id.
    pub fn community(&self, id: CommunityId) -> TmeshResult<&Community> {
        self.communities.get(&id).ok_or(TmeshError::UnknownCommunity)
    }

    /// Community by id, mutably.
    pub fn community_mut(&mut self, id: CommunityId) -> TmeshResult<&mut Community> {
        self.communities
            .get_mut(&id)
            .ok_or(TmeshError::UnknownCommunity)
    }

    /// All communities.
    pub fn communities(&self) -> impl Iterator<Item = &Community> {
        self.communities.values()
    }

    /// Add or update the mote tracking a neighbor.
    pub fn link(&mut self, community: CommunityId, link: LinkId) -> TmeshResult<MoteId> {
        self.community_mut(community)?.link(link)
    }

    /// Add a mote for a not yet identified neighbor.
    pub fn expect_neighbor(&mut self, community: CommunityId) -> TmeshResult<MoteId> {
        self.community_mut(community)?.expect_neighbor()
    }

    /// Bind a discovered neighbor's identity to its mote.
    pub fn bind(&mut self, community: CommunityId, mote: MoteId, link: LinkId) -> TmeshResult<()> {
        self.community_mut(community)?.bind(mote, link)
    }

    /// Remove the mote tracking a neighbor.
    pub fn unlink(&mut self, community: CommunityId, link: &LinkId) -> TmeshResult<bool> {
        Ok(self.community_mut(community)?.unlink(link).is_some())
    }

    /// Start or rekey presence advertising on a community.
    pub fn advertise(
        &mut self,
        community: CommunityId,
        secret: [u8; EPOCH_SECRET_SIZE],
    ) -> TmeshResult<()> {
        self.community_mut(community)?.advertise(secret);
        Ok(())
    }

    /// Mote by id.
    pub fn mote(&self, community: CommunityId, mote: MoteId) -> TmeshResult<&Mote> {
        self.community(community)?
            .mote(mote)
            .ok_or(TmeshError::UnknownMote)
    }

    /// Mote by id, mutably.
    pub fn mote_mut(&mut self, community: CommunityId, mote: MoteId) -> TmeshResult<&mut Mote> {
        self.community_mut(community)?
            .mote_mut(mote)
            .ok_or(TmeshError::UnknownMote)
    }

    /// Queue a packet to a neighbor.
    pub fn send(&mut self, community: CommunityId, mote: MoteId, packet: &[u8]) -> TmeshResult<()> {
        if mote.is_sync() {
            return Err(ChunkError::InvalidArgument("sync mote carries no data").into());
        }
        self.mote_mut(community, mote)?.frames_mut().send(packet)?;
        Ok(())
    }

    /// Earliest operation at or after `from` on a radio.
    ///
    /// Equal starts go to the mote with the higher `z`, then to the more
    /// mature epoch. Motes without a schedule are skipped.
    pub fn knock(&self, from: u64, radio: RadioId) -> Option<Knock> {
        if !self.radios.contains(radio) {
            trace!(radio = radio.0, "knock for unregistered radio");
            return None;
        }

        let mut best: Option<(Knock, u8)> = None;
        for community in self.communities.values() {
            let medium = community.medium();
            if medium.radio() != radio {
                continue;
            }

            for (id, mote) in community.motes() {
                let slot = match mote.knock(from, medium) {
                    Ok(slot) => slot,
                    Err(e) => {
                        trace!(community = community.name(), mote = id.0, error = %e, "mote skipped");
                        continue;
                    }
                };
                let knock = Knock {
                    community: community.id(),
                    mote: id,
                    slot,
                };
                let rank = |k: &Knock, z: u8| (k.start(), Reverse(z), Reverse(k.slot.kind));
                if best
                    .as_ref()
                    .is_none_or(|(b, bz)| rank(&knock, mote.z()) < rank(b, *bz))
                {
                    best = Some((knock, mote.z()));
                }
            }
        }

        let (knock, _) = best?;
        trace!(
            community = knock.community.0,
            mote = knock.mote.0,
            kind = ?knock.slot.kind,
            dir = ?knock.dir(),
            start = knock.start(),
            chan = knock.chan(),
            "knock selected"
        );
        Some(knock)
    }

    /// Frame to transmit for a knock about to run.
    ///
    /// Receive knocks and motes past discovery with nothing queued yield
    /// `None`. A mote still in discovery always sends at least a ping-only
    /// frame.
    pub fn knocking(&mut self, knock: &Knock) -> TmeshResult<Option<Vec<u8>>> {
        let frame_size = self.config.frame_size;
        let mote = self.mote_mut(knock.community, knock.mote)?;
        if !knock.is_tx() {
            return Ok(None);
        }

        let discovering = mote.is_discovering();
        let frame = match mote.frames_mut().out() {
            Some(chunk) => frame::pack(chunk, frame_size)?,
            None if discovering => frame::pack(&[], frame_size)?,
            None => return Ok(None),
        };
        trace!(mote = knock.mote.0, used = frame[0], "frame ready");
        Ok(Some(frame))
    }

    /// Report a completed knock.
    ///
    /// For receive knocks the frame's chunks go to the mote's inbox and are
    /// acknowledged. A mote with its ping flag set then rebases its ECHO
    /// epoch to the knock's start, the one instant both peers agree on.
    /// Malformed frames are rejected before any state changes.
    pub fn knocked(&mut self, knock: &Knock, received: &[u8]) -> TmeshResult<()> {
        let community = self.community_mut(knock.community)?;
        let mote = community
            .mote_mut(knock.mote)
            .ok_or(TmeshError::UnknownMote)?;

        if knock.is_tx() {
            community.exchanged(knock);
            community.pipe_mut().record_sent();
            return Ok(());
        }

        let chunks = frame::unpack(received)
            .and_then(|bytes| frame::chunk_count(bytes).map(|count| (bytes, count)));
        let (bytes, count) = match chunks {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(mote = knock.mote.0, len = received.len(), error = %e, "dropped frame");
                return Err(TmeshError::MalformedFrame(e.to_string()));
            }
        };

        if count > 0 {
            mote.frames_mut().chunk_in(bytes)?;
            let outcome = mote.frames_mut().ack()?;
            trace!(mote = knock.mote.0, chunks = count, ?outcome, "frame received");
        }
        community.exchanged(knock);
        community.pipe_mut().record_received();
        Ok(())
    }

    /// Drain every complete packet from every mote.
    ///
    /// Packets that fail to decloak are dropped with a warning; only an
    /// allocation failure aborts.
    pub fn process(&mut self) -> TmeshResult<Vec<Delivered>> {
        let mut delivered = Vec::new();

        for community in self.communities.values_mut() {
            let id = community.id();
            let name = community.name().to_owned();
            for (mote_id, mote) in community.motes_mut() {
                loop {
                    match mote.frames_mut().receive() {
                        Ok(Some(packet)) => {
                            debug!(community = %name, mote = mote_id.0, bytes = packet.len(), "packet delivered");
                            delivered.push(Delivered {
                                community: id,
                                name: name.clone(),
                                mote: mote_id,
                                link: mote.link(),
                                packet,
                            });
                        }
                        Ok(None) => break,
                        Err(ChunkError::AllocationFailure) => {
                            return Err(ChunkError::AllocationFailure.into());
                        }
                        Err(e) => warn!(community = %name, mote = mote_id.0, error = %e, "packet dropped"),
                    }
                }
            }
        }
        Ok(delivered)
    }
}
