//! Scheduling and framing constants.
//!
//! Peers only rendezvous if they agree on these values, so they are fixed
//! for the lifetime of a deployment.

// =============================================================================
// EPOCHS
// =============================================================================

/// Length of one epoch window in microseconds (2^22, about 4.19 s).
pub const EPOCH_WINDOW: u64 = 1 << 22;

/// Size of the shared secret an epoch derives its schedule from.
pub const EPOCH_SECRET_SIZE: usize = 32;

// =============================================================================
// COMMUNITIES
// =============================================================================

/// Maximum neighbors tracked per community.
pub const NEIGHBORS_MAX: usize = 8;

/// Size of a neighbor identity (hashname).
pub const LINK_ID_SIZE: usize = 32;

// =============================================================================
// RADIOS
// =============================================================================

/// Maximum number of radio drivers in one registry.
pub const RADIOS_MAX: usize = 4;

/// Size of a medium identity (technology, band and rate code).
pub const MEDIUM_ID_SIZE: usize = 5;

/// Default radio frame size handed to the host.
pub const DEFAULT_FRAME_SIZE: usize = 64;

/// Smallest radio frame that can carry a used-count plus a one-byte chunk.
pub const MIN_FRAME_SIZE: usize = 3;

/// Largest radio frame; the used-count header is a single byte.
pub const MAX_FRAME_SIZE: usize = 256;

// =============================================================================
// CHUNKS
// =============================================================================

/// Largest payload one chunk can carry (one length byte).
pub const MAX_CHUNK_PAYLOAD: u8 = 255;

/// Per-round nonce prepended by the cloaking transform.
pub const CLOAK_NONCE_SIZE: usize = 8;

/// Default number of cloaking rounds.
pub const DEFAULT_CLOAK_ROUNDS: u8 = 1;

/// Public cloaking key. Cloaking hides packet structure from passive
/// observers; it is not encryption.
pub const CLOAK_KEY: [u8; 32] = [
    0xd7, 0xf0, 0xe5, 0x55, 0x54, 0x62, 0x41, 0xb2, 0xa9, 0x44, 0xec, 0xd6, 0xd0, 0xde, 0x66,
    0x85, 0x6a, 0xc5, 0x0b, 0x0b, 0xab, 0xa7, 0x6a, 0x6f, 0x5a, 0x47, 0x82, 0x95, 0x6c, 0xa9,
    0x45, 0x9a,
];
