//! Deterministic cache-key fingerprints.
//!
//! A key has the shape `{repository}@{method}-{digest}`. The prefix stays
//! readable so registry documents and backend keys can be eyeballed; only the
//! variable tail (arguments, criteria state, ambient context) is digested.

use sha2::{Digest, Sha256};

/// Ambient contribution used when a call happens outside any request.
pub const NO_REQUEST_CONTEXT: &str = "<no-request>";

/// SHA-256 over `parts`, newline separated, hex encoded.
pub fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Build the full cache key for a repository call.
pub fn cache_key(repository: &str, method: &str, tail: &[&str]) -> String {
    format!("{repository}@{method}-{}", digest(tail))
}
