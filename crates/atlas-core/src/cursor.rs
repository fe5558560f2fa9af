//! Opaque pagination cursors.
//!
//! A cursor is `"<offset hex>.<fingerprint hex>"`: the position of the next
//! page plus an xxh64 fingerprint of the query inputs and the ranked result
//! ids. Identical query inputs reproduce the fingerprint, so a cursor stays
//! valid exactly until the underlying result set changes; then decoding
//! against the fresh fingerprint fails with `InvalidArgument`.

use xxhash_rust::xxh64::xxh64;

use crate::error::EngineError;

/// Fingerprint the query inputs plus the ranked ids they produced.
pub fn fingerprint<'a>(parts: impl IntoIterator<Item = &'a str>) -> u64 {
    let mut material = String::new();
    for part in parts {
        material.push_str(part);
        material.push('\u{0}');
    }
    xxh64(material.as_bytes(), 0)
}

/// Encode the next page's offset against a result-set fingerprint.
pub fn encode(offset: usize, fingerprint: u64) -> String {
    format!("{offset:x}.{fingerprint:016x}")
}

/// Decode a cursor and check it against the current fingerprint. Malformed
/// tokens and fingerprint mismatches both fail with `InvalidArgument`.
pub fn decode(cursor: &str, current_fingerprint: u64) -> Result<usize, EngineError> {
    let (offset_part, fp_part) = cursor
        .split_once('.')
        .ok_or_else(|| EngineError::InvalidArgument("malformed cursor".to_string()))?;
    let offset = usize::from_str_radix(offset_part, 16)
        .map_err(|_| EngineError::InvalidArgument("malformed cursor".to_string()))?;
    let fp = u64::from_str_radix(fp_part, 16)
        .map_err(|_| EngineError::InvalidArgument("malformed cursor".to_string()))?;
    if fp != current_fingerprint {
        return Err(EngineError::InvalidArgument(
            "cursor expired: result set changed".to_string(),
        ));
    }
    Ok(offset)
}
