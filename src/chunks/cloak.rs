//! Cloaking transform.
//!
//! Each round prepends a random 8-byte nonce and XORs everything after it
//! with a ChaCha20 keystream under the public [`CLOAK_KEY`]. Cloaking hides
//! packet structure (lengths, headers) from passive observers on the air but
//! offers no confidentiality; payloads are already encrypted by the routing
//! layer.

use chacha20::ChaCha20;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use rand::{RngCore, rngs::OsRng};

use crate::core::{CLOAK_KEY, CLOAK_NONCE_SIZE, ChunkError};

/// Bytes added by `rounds` rounds of cloaking.
pub fn overhead(rounds: u8) -> usize {
    CLOAK_NONCE_SIZE * rounds as usize
}

/// Cloak raw packet bytes for the given number of rounds.
pub fn cloak(raw: &[u8], rounds: u8) -> Result<Vec<u8>, ChunkError> {
    let mut out = raw.to_vec();
    for _ in 0..rounds {
        let mut nonce = [0u8; CLOAK_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);
        apply_keystream(&nonce, &mut out);

        let mut round = Vec::new();
        round
            .try_reserve(out.len() + CLOAK_NONCE_SIZE)
            .map_err(|_| ChunkError::AllocationFailure)?;
        round.extend_from_slice(&nonce);
        round.extend_from_slice(&out);
        out = round;
    }
    Ok(out)
}

/// Reverse `rounds` rounds of cloaking.
pub fn decloak(cloaked: &[u8], rounds: u8) -> Result<Vec<u8>, ChunkError> {
    if cloaked.len() < overhead(rounds) {
        return Err(ChunkError::Cloak(format!(
            "{} bytes cannot hold {rounds} rounds",
            cloaked.len()
        )));
    }

    let mut out = cloaked.to_vec();
    for _ in 0..rounds {
        let mut nonce = [0u8; CLOAK_NONCE_SIZE];
        nonce.copy_from_slice(&out[..CLOAK_NONCE_SIZE]);
        out.drain(..CLOAK_NONCE_SIZE);
        apply_keystream(&nonce, &mut out);
    }
    Ok(out)
}

fn apply_keystream(nonce: &[u8; CLOAK_NONCE_SIZE], buf: &mut [u8]) {
    // 64-bit nonce in the low bytes of the IETF 96-bit nonce
    let mut iv = [0u8; 12];
    iv[4..].copy_from_slice(nonce);
    let mut cipher = ChaCha20::new(&CLOAK_KEY.into(), &iv.into());
    cipher.apply_keystream(buf);
}
