//! Identifier generators — device ids, file ids, and session codes.

use rand::Rng;
use static_assertions::const_assert_eq;
use uuid::Uuid;

/// Session-code alphabet: 32 symbols, ~30 bits over six characters.
/// 0/O and 1/I are excluded so codes survive being read aloud.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a session code.
pub const CODE_LEN: usize = 6;

const_assert_eq!(CODE_ALPHABET.len(), 32);

/// Mint a fresh device id — a hyphenated v4 UUID, 36 characters.
pub fn device_id() -> String {
    Uuid::new_v4().to_string()
}

/// Mint a fresh file id. Same shape as a device id; the 36-character
/// rendering is what fixes the binary-frame prefix width.
pub fn file_id() -> String {
    Uuid::new_v4().to_string()
}

/// Mint a random session code. Uniqueness is the registry's job —
/// it retries on collision.
pub fn session_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
