use sha2::{Digest, Sha256};

const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Number of digest bytes kept from the SHA-256 output.
const TRUNCATED_LEN: usize = 16;

/// Compute the content hash for a file's bytes.
///
/// hash = lowercase hex of the first 16 bytes of SHA-256(bytes), 32 chars.
///
/// The algorithm is fixed so exported caches are portable across processes.
/// This is a cache key, not a collision-resistant content identifier.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(TRUNCATED_LEN * 2);
    for b in &digest[..TRUNCATED_LEN] {
        out.push(HEX_CHARS[(b >> 4) as usize] as char);
        out.push(HEX_CHARS[(b & 0x0f) as usize] as char);
    }
    out
}

/// The cache key for a `(path, content)` pair: `"<path>:<contentHash>"`.
pub fn cache_key(path: &str, hash: &str) -> String {
    format!("{path}:{hash}")
}

/// The sentinel cache key recorded after a failed parse, which suppresses
/// retries until the file's content changes.
pub fn error_cache_key(path: &str) -> String {
    format!("{path}:error")
}
