//! Order and review identifiers.
//!
//! Format: prefix + epoch milliseconds + 8 random base-36 characters
//! (about 41 bits), e.g. `OYI1736500000000K3J9Q2ZD`. The random suffix makes
//! collisions within one millisecond unlikely; the store's create-if-absent
//! write remains the authoritative uniqueness check.

use chrono::Utc;
use rand::Rng;

pub const ORDER_ID_PREFIX: &str = "OYI";
pub const REVIEW_ID_PREFIX: &str = "REV";
pub const MAX_ID_LEN: usize = 64;

const SUFFIX_LEN: usize = 8;
const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn generate(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}{}{}", prefix, Utc::now().timestamp_millis(), suffix)
}

pub fn new_order_id() -> String {
    generate(ORDER_ID_PREFIX)
}

pub fn new_review_id() -> String {
    generate(REVIEW_ID_PREFIX)
}

/// Whether `id` could name a stored record. Anything else is rejected before
/// it reaches a storage key.
pub fn is_well_formed(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
