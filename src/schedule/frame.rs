//! Radio frame layout exchanged with the host.
//!
//! ```text
//! +------+------------------------+-------------+
//! | used | chunk bytes (used)     | zero pad    |
//! +------+------------------------+-------------+
//!  1 byte                          to frame size
//! ```
//!
//! A used-count of 0 is a ping-only frame.

use crate::core::ChunkError;

/// Wrap chunk bytes into a zero-padded frame of `size` bytes.
pub fn pack(chunk: &[u8], size: usize) -> Result<Vec<u8>, ChunkError> {
    let available = size.saturating_sub(1).min(u8::MAX as usize);
    if chunk.len() > available {
        return Err(ChunkError::OutOfRange {
            requested: chunk.len(),
            available,
        });
    }

    let mut frame = vec![0u8; size];
    frame[0] = chunk.len() as u8;
    frame[1..=chunk.len()].copy_from_slice(chunk);
    Ok(frame)
}

/// Extract the chunk bytes a frame carries.
pub fn unpack(frame: &[u8]) -> Result<&[u8], ChunkError> {
    let Some(&used) = frame.first() else {
        return Err(ChunkError::InvalidArgument("empty frame"));
    };
    let used = used as usize;
    if frame.len() < used + 1 {
        return Err(ChunkError::ProtocolViolation {
            declared: used,
            supplied: frame.len() - 1,
        });
    }
    Ok(&frame[1..=used])
}

/// Count the length-prefixed chunks in a frame's used bytes.
///
/// Every prefix must be backed by its payload; a frame whose last chunk runs
/// past the used bytes would desync the peer's inbox.
pub fn chunk_count(bytes: &[u8]) -> Result<usize, ChunkError> {
    let mut count = 0;
    let mut at = 0;
    while at < bytes.len() {
        let declared = bytes[at] as usize;
        let supplied = bytes.len() - at - 1;
        if declared > supplied {
            return Err(ChunkError::ProtocolViolation { declared, supplied });
        }
        at += declared + 1;
        count += 1;
    }
    Ok(count)
}
