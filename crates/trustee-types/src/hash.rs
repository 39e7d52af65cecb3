//! Participant-list hashing
//!
//! A negotiation carries the initiator's whitelist together with its hash so
//! the receiver can detect a list altered in transit. The hash is SHA-256
//! over the compact JSON serialization of the list, in list order.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::participant::Participant;

/// Compute the hex-encoded SHA-256 hash of a participant list
pub fn compute_hash(participants: &[Participant]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(participants).as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a received hash against a participant list
pub fn verify_hash(participants: &[Participant], expected: &str) -> bool {
    compute_hash(participants) == expected
}

/// Compact JSON with keys in `id`, `name`, `url` order, identical to the wire form
fn canonical_json(participants: &[Participant]) -> String {
    Value::Array(
        participants
            .iter()
            .map(|p| json!({ "id": p.id, "name": p.name, "url": p.url }))
            .collect(),
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trustees() -> Vec<Participant> {
        vec![
            Participant::new("did:example:1", "DataTrustee1", "http://datatrustee1.com"),
            Participant::new("did:example:2", "DataTrustee2", "http://datatrustee2.com"),
        ]
    }

    #[test]
    fn test_hash_is_stable_hex() {
        let hash = compute_hash(&trustees());
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(hash, compute_hash(&trustees()));
    }

    #[test]
    fn test_hash_depends_on_order_and_content() {
        let list = trustees();
        let mut reversed = list.clone();
        reversed.reverse();
        assert_ne!(compute_hash(&list), compute_hash(&reversed));

        let mut tampered = list.clone();
        tampered[0].url = "http://evil.com".into();
        assert!(!verify_hash(&tampered, &compute_hash(&list)));
        assert!(verify_hash(&list, &compute_hash(&list)));
    }

    #[test]
    fn test_canonical_form_matches_serde_output() {
        let list = trustees();
        let mut anonymous = list.clone();
        anonymous[1].id = None;
        for participants in [list, anonymous] {
            assert_eq!(
                canonical_json(&participants),
                serde_json::to_string(&participants).unwrap()
            );
        }
    }

    #[test]
    fn test_empty_list_hash() {
        // SHA-256 of "[]"
        assert_eq!(
            compute_hash(&[]),
            "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
        );
    }
}
