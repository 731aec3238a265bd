//! Audit entries and the hash computation binding them together.

use crate::canonical::canonical_event_bytes;
use crate::AuditError;
use alder_types::Event;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The `previous_hash` of sequence 0.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One link of the audit chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub previous_hash: String,
    pub self_hash: String,
    /// Optional Ed25519 signature over `self_hash`, hex-encoded.
    pub signature: Option<String>,
    pub event: Event,
}

/// `SHA-256(previous_hash ‖ canonical(event))`, hex-encoded.
pub fn compute_self_hash(previous_hash: &str, event: &Event) -> Result<String, AuditError> {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(canonical_event_bytes(event)?);
    Ok(hex::encode(hasher.finalize()))
}

impl AuditEntry {
    /// Build the successor of `previous` (or the genesis entry) for `event`.
    pub fn next(previous: Option<&AuditEntry>, event: Event) -> Result<Self, AuditError> {
        let (sequence, previous_hash) = match previous {
            Some(prev) => (prev.sequence + 1, prev.self_hash.clone()),
            None => (0, GENESIS_HASH.to_string()),
        };
        let self_hash = compute_self_hash(&previous_hash, &event)?;
        Ok(Self {
            sequence,
            previous_hash,
            self_hash,
            signature: None,
            event,
        })
    }

    /// Recompute this entry's hash and check it against the stored value.
    pub fn verify_self(&self) -> Result<(), AuditError> {
        let expected = compute_self_hash(&self.previous_hash, &self.event)?;
        if expected != self.self_hash {
            return Err(AuditError::ChainBroken {
                sequence: self.sequence,
                detail: "self hash does not match canonical event".to_string(),
            });
        }
        Ok(())
    }

    /// Check the linkage from `previous` to this entry, then this entry's
    /// own hash.
    pub fn verify_linkage(&self, previous: Option<&AuditEntry>) -> Result<(), AuditError> {
        match previous {
            Some(prev) => {
                if self.sequence != prev.sequence + 1 {
                    return Err(AuditError::ChainBroken {
                        sequence: self.sequence,
                        detail: format!(
                            "sequence {} does not follow {}",
                            self.sequence, prev.sequence
                        ),
                    });
                }
                if self.previous_hash != prev.self_hash {
                    return Err(AuditError::ChainBroken {
                        sequence: self.sequence,
                        detail: "previous_hash does not match predecessor".to_string(),
                    });
                }
            }
            None => {
                if self.sequence != 0 || self.previous_hash != GENESIS_HASH {
                    return Err(AuditError::ChainBroken {
                        sequence: self.sequence,
                        detail: "first entry is not a genesis entry".to_string(),
                    });
                }
            }
        }
        self.verify_self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alder_types::ComponentId;

    fn event(n: u32) -> Event {
        Event::new("test.tick", ComponentId::new("tests"))
            .with_payload(serde_json::json!({ "n": n }))
    }

    #[test]
    fn genesis_links_to_zero_hash() {
        let entry = AuditEntry::next(None, event(0)).unwrap();
        assert_eq!(entry.sequence, 0);
        assert_eq!(entry.previous_hash, GENESIS_HASH);
        entry.verify_linkage(None).unwrap();
    }

    #[test]
    fn successors_chain() {
        let first = AuditEntry::next(None, event(0)).unwrap();
        let second = AuditEntry::next(Some(&first), event(1)).unwrap();
        assert_eq!(second.sequence, 1);
        assert_eq!(second.previous_hash, first.self_hash);
        second.verify_linkage(Some(&first)).unwrap();
    }

    #[test]
    fn tampered_event_fails_verification() {
        let first = AuditEntry::next(None, event(0)).unwrap();
        let mut second = AuditEntry::next(Some(&first), event(1)).unwrap();
        second.event = event(99);
        assert!(matches!(
            second.verify_linkage(Some(&first)),
            Err(AuditError::ChainBroken { sequence: 1, .. })
        ));
    }

    #[test]
    fn broken_linkage_is_detected() {
        let first = AuditEntry::next(None, event(0)).unwrap();
        let mut second = AuditEntry::next(Some(&first), event(1)).unwrap();
        second.previous_hash = GENESIS_HASH.to_string();
        // Rehash so the self hash is internally consistent but the link is not.
        second.self_hash = compute_self_hash(&second.previous_hash, &second.event).unwrap();
        assert!(matches!(
            second.verify_linkage(Some(&first)),
            Err(AuditError::ChainBroken { sequence: 1, .. })
        ));
    }
}
