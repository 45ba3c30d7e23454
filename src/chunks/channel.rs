//! Chunked framing with acknowledgement and flow control.
//!
//! Packets are split into chunks of one length byte followed by up to
//! `space` payload bytes; a zero-length chunk terminates the packet. On its
//! own, a zero-length chunk is an acknowledgement.
//!
//! ```text
//! +-----+----------------+-----+----------------+-----+
//! | len | payload (len)  | len | payload (len)  |  0  |
//! +-----+----------------+-----+----------------+-----+
//! ```
//!
//! The same channel serves fixed-size frame transports ([`FrameChannel::out`],
//! [`FrameChannel::chunk_in`]) and byte streams ([`FrameChannel::write`],
//! [`FrameChannel::read`]). Both rely on in-order delivery.

use std::borrow::Cow;

use tracing::trace;

use super::cloak;
use crate::core::{ChunkError, MAX_CHUNK_PAYLOAD};

/// Outcome of [`FrameChannel::ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// No chunks arrived since the last ack.
    Nothing,
    /// The only new chunk was an ack answering our ack.
    Suppressed,
    /// Data is already queued; it carries the ack implicitly.
    Piggybacked,
    /// A zero-length ack chunk was queued.
    Queued,
}

/// Framing state for one neighbor.
#[derive(Debug, Clone)]
pub struct FrameChannel {
    /// Maximum payload bytes per chunk.
    space: u8,
    /// Outbound chunks, sent up to `write_at`.
    writing: Vec<u8>,
    write_at: usize,
    /// Inbound chunks not yet reassembled.
    reading: Vec<u8>,
    /// Inbound chunks acknowledged so far.
    acked: usize,
    /// Set once a payload chunk went out, until the peer responds.
    blocked: bool,
    /// Cloaking rounds, if enabled.
    cloak: Option<u8>,
}

impl FrameChannel {
    /// Create a channel for chunks of `size` bytes including the length byte.
    ///
    /// A size of 0 selects the maximum (255 payload bytes), 1 the minimum
    /// (1 payload byte).
    pub fn new(size: u8) -> Self {
        let space = match size {
            0 => MAX_CHUNK_PAYLOAD,
            1 => 1,
            n => n - 1,
        };

        Self {
            space,
            writing: Vec::new(),
            write_at: 0,
            reading: Vec::new(),
            acked: 0,
            blocked: false,
            cloak: None,
        }
    }

    /// Enable automatic cloaking of every packet.
    pub fn with_cloak(mut self, rounds: u8) -> Self {
        self.cloak = Some(rounds.max(1));
        self
    }

    /// Maximum payload bytes per chunk.
    pub fn space(&self) -> u8 {
        self.space
    }

    /// Cloaking rounds, if enabled.
    pub fn cloak_rounds(&self) -> Option<u8> {
        self.cloak
    }

    /// Check if issuing further chunks waits on the peer.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Queue a packet for sending.
    pub fn send(&mut self, packet: &[u8]) -> Result<(), ChunkError> {
        if packet.is_empty() {
            return Err(ChunkError::InvalidArgument("empty packet"));
        }

        let raw = match self.cloak {
            Some(rounds) => Cow::Owned(cloak::cloak(packet, rounds)?),
            None => Cow::Borrowed(packet),
        };

        let space = self.space as usize;
        let needed = raw.len() + raw.len().div_ceil(space) + 1;
        self.writing
            .try_reserve(needed)
            .map_err(|_| ChunkError::AllocationFailure)?;

        for piece in raw.chunks(space) {
            self.writing.push(piece.len() as u8);
            self.writing.extend_from_slice(piece);
        }
        self.writing.push(0);

        trace!(bytes = raw.len(), queued = self.pending_len(), "packet queued");
        Ok(())
    }

    /// Reassemble the next complete packet, if one is buffered.
    ///
    /// Partial data stays buffered. A packet that fails to decloak is
    /// consumed and reported so the stream stays aligned.
    pub fn receive(&mut self) -> Result<Option<Vec<u8>>, ChunkError> {
        let reading = &self.reading;

        // leading zeros are stray acks
        let start = reading.iter().take_while(|&&b| b == 0).count();

        let mut len = 0;
        let mut at = start;
        let mut chunks = 0;
        while at < reading.len() && reading[at] != 0 {
            len += reading[at] as usize;
            at += reading[at] as usize + 1;
            chunks += 1;
        }
        if len == 0 || at >= reading.len() {
            return Ok(None);
        }

        let mut raw = Vec::new();
        raw.try_reserve(len)
            .map_err(|_| ChunkError::AllocationFailure)?;
        let mut pos = start;
        while reading[pos] != 0 {
            let size = reading[pos] as usize;
            raw.extend_from_slice(&reading[pos + 1..pos + 1 + size]);
            pos += size + 1;
        }

        // consume through the terminator
        self.reading.drain(..=at);
        self.acked = self.acked.saturating_sub(start + chunks + 1);

        match self.cloak {
            Some(rounds) => cloak::decloak(&raw, rounds).map(Some),
            None => Ok(Some(raw)),
        }
    }

    /// Take the next chunk for a frame transport.
    ///
    /// Zero-length chunks directly following it are folded in while they
    /// fit. Returns `None` when blocked or when nothing is pending.
    pub fn out(&mut self) -> Option<&[u8]> {
        self.collect();
        if self.blocked || self.write_at >= self.writing.len() {
            return None;
        }

        let start = self.write_at;
        let mut len = self.writing[start] as usize + 1;
        while len < self.space as usize
            && start + len < self.writing.len()
            && self.writing[start + len] == 0
        {
            len += 1;
        }

        self.write_at += len;
        if len > 1 {
            self.blocked = true;
        }
        trace!(len, blocked = self.blocked, "chunk out");
        Some(&self.writing[start..start + len])
    }

    /// Clear the outbound block.
    pub fn next(&mut self) {
        self.blocked = false;
    }

    /// Accept one length-prefixed chunk from a frame transport.
    pub fn chunk_in(&mut self, chunk: &[u8]) -> Result<(), ChunkError> {
        let Some(&declared) = chunk.first() else {
            return Err(ChunkError::InvalidArgument("empty chunk"));
        };
        if chunk.len() < declared as usize + 1 {
            return Err(ChunkError::ProtocolViolation {
                declared: declared as usize,
                supplied: chunk.len() - 1,
            });
        }
        self.append(chunk)
    }

    /// Accept raw bytes from a stream transport.
    pub fn read(&mut self, data: &[u8]) -> Result<(), ChunkError> {
        if data.is_empty() {
            return Err(ChunkError::InvalidArgument("empty read"));
        }
        self.append(data)
    }

    /// Bytes waiting to be sent.
    pub fn pending_len(&self) -> usize {
        self.writing.len().saturating_sub(self.write_at)
    }

    /// Check if anything waits to be sent.
    pub fn is_pending(&self) -> bool {
        self.pending_len() > 0
    }

    /// Bytes buffered inbound.
    pub fn inbox_len(&self) -> usize {
        self.reading.len()
    }

    /// All unsent bytes, for a stream transport.
    pub fn write(&self) -> Option<&[u8]> {
        if !self.is_pending() {
            return None;
        }
        Some(&self.writing[self.write_at..])
    }

    /// Advance the stream write cursor.
    pub fn written(&mut self, len: usize) -> Result<(), ChunkError> {
        if len > self.pending_len() {
            return Err(ChunkError::OutOfRange {
                requested: len,
                available: self.pending_len(),
            });
        }
        self.write_at += len;
        self.collect();
        Ok(())
    }

    /// Acknowledge new inbound chunks.
    ///
    /// Any new chunk clears the outbound block. A lone new zero-length chunk
    /// on top of an earlier one is an ack of our ack and is not answered,
    /// which stops acks from bouncing back and forth forever.
    pub fn ack(&mut self) -> Result<AckOutcome, ChunkError> {
        let mut count = 0;
        let mut zeros = 0;
        let mut at = 0;
        while at < self.reading.len() {
            count += 1;
            let len = self.reading[at] as usize;
            if len == 0 {
                zeros += 1;
            } else {
                zeros = 0;
            }
            at += len + 1;
        }

        if count <= self.acked {
            return Ok(AckOutcome::Nothing);
        }

        self.next();

        if zeros > 1 && count - self.acked == 1 {
            trace!(count, acked = self.acked, "ack of ack suppressed");
            return Ok(AckOutcome::Suppressed);
        }

        self.acked = count;

        if self.is_pending() {
            return Ok(AckOutcome::Piggybacked);
        }

        self.writing
            .try_reserve(1)
            .map_err(|_| ChunkError::AllocationFailure)?;
        self.writing.push(0);
        trace!(count, "ack queued");
        Ok(AckOutcome::Queued)
    }

    /// Drop all in-flight outbound and inbound state.
    pub fn clear(&mut self) {
        self.writing.clear();
        self.write_at = 0;
        self.reading.clear();
        self.acked = 0;
        self.blocked = false;
    }

    /// Check if anything is in flight in either direction.
    pub fn is_busy(&self) -> bool {
        self.is_pending() || !self.reading.is_empty()
    }

    fn append(&mut self, data: &[u8]) -> Result<(), ChunkError> {
        self.reading
            .try_reserve(data.len())
            .map_err(|_| ChunkError::AllocationFailure)?;
        self.reading.extend_from_slice(data);
        Ok(())
    }

    /// Drop already sent bytes from the front of the outbox.
    fn collect(&mut self) {
        if self.write_at == 0 {
            return;
        }
        self.writing.drain(..self.write_at);
        self.write_at = 0;
    }
}

impl Default for FrameChannel {
    fn default() -> Self {
        Self::new(0)
    }
}
