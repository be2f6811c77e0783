//! Name indexer — deterministic 32-bit fingerprint of a logical path.
//!
//! The index is the archive's primary key: xxhash32 (seed 0) over the
//! UTF-16-LE code units of the normalised path.  Normalisation replaces
//! every `\` with `/` and lowercases, so `A\B.TXT` and `a/b.txt` collide by
//! construction.  Index collisions between distinct normalised paths are
//! undefined behaviour; archive populations are small enough not to care.

use xxhash_rust::xxh32::xxh32;

/// Seed for every hash in the format — names, content hashes, tamper checks.
pub const HASH_SEED: u32 = 0;

/// Replace backslashes with forward slashes and lowercase.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Fingerprint of a logical path.  `0` never identifies a live entry (it
/// marks free records), which no real path hashes to in practice.
pub fn name_index(path: &str) -> u32 {
    let normalized = normalize(path);
    let mut units = Vec::with_capacity(normalized.len() * 2);
    for u in normalized.encode_utf16() {
        units.extend_from_slice(&u.to_le_bytes());
    }
    xxh32(&units, HASH_SEED)
}

/// Integrity hash of a plaintext payload, stored per entry and verified on
/// every read.
#[inline]
pub fn content_hash(data: &[u8]) -> u32 {
    xxh32(data, HASH_SEED)
}
