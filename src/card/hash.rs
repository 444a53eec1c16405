use sha2::{Digest, Sha256};

use crate::api::card::AgentCardSpec;

/// Hex-encoded SHA-256 of the canonical JSON serialization of a card spec.
///
/// The digest covers the embedded public document, so translator drift shows
/// up as a content change. Metadata is a sorted map and field order is fixed
/// by the type, the serialization is therefore deterministic for a given spec
/// value.
pub fn spec_hash(spec: &AgentCardSpec) -> Result<String, serde_json::Error> {
    let serialized = serde_json::to_vec(spec)?;
    Ok(format!("{:x}", Sha256::digest(serialized)))
}
