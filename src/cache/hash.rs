//! Content hashing for segment keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 of the JSON encoding of `value`, as 64 lowercase hex digits.
///
/// Field order is fixed by the `Serialize` impl, so equal values always
/// hash alike.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(format!("{:x}", Sha256::digest(&json)))
}

/// First 12 hex digits of the hash, for log lines.
pub fn short_hash<T: Serialize>(value: &T) -> String {
    compute_hash(value)
        .map(|h| h[..12].to_string())
        .unwrap_or_else(|_| "unhashable".into())
}
