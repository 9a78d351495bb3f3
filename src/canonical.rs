//! Canonical serialization for deterministic fingerprints.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable Vec order: vectors serialize in index order
//! - No HashMap in fingerprinted data: attribute maps are BTreeMaps

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<u64, serde_json::Error> {
    let bytes = to_canonical_bytes(value)?;
    Ok(xxh64(&bytes, 0))
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attributes, Network, Node};
    use serde_json::json;

    #[test]
    fn test_determinism() {
        let mut attributes = Attributes::new();
        attributes.insert("z".to_string(), json!(1));
        attributes.insert("a".to_string(), json!(2));
        let network = Network::new(vec![Node::new("n1", attributes)], vec![]);

        let h1 = canonical_hash_hex(&network).unwrap();
        let h2 = canonical_hash_hex(&network.clone()).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn test_node_order_changes_hash() {
        let a = Network::new(vec![Node::bare("a"), Node::bare("b")], vec![]);
        let b = Network::new(vec![Node::bare("b"), Node::bare("a")], vec![]);
        assert_ne!(canonical_hash(&a).unwrap(), canonical_hash(&b).unwrap());
    }
}
