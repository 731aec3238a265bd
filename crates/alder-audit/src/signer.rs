//! Optional asymmetric signatures over entry hashes.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Capability for signing entry hashes. The chain is valid without
/// signatures; deployments that need non-repudiation plug one in.
pub trait EntrySigner: Send + Sync {
    /// Sign the hex-encoded self hash; returns a hex-encoded signature.
    fn sign_hash(&self, self_hash: &str) -> String;
}

/// Ed25519 signer over entry hashes.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Check a hex-encoded signature produced by [`EntrySigner::sign_hash`].
    pub fn verify(key: &VerifyingKey, self_hash: &str, signature_hex: &str) -> bool {
        let Ok(bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&bytes) else {
            return false;
        };
        key.verify(self_hash.as_bytes(), &signature).is_ok()
    }
}

impl EntrySigner for Ed25519Signer {
    fn sign_hash(&self, self_hash: &str) -> String {
        hex::encode(self.key.sign(self_hash.as_bytes()).to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_round_trip() {
        let signer = Ed25519Signer::from_bytes(&[7u8; 32]);
        let hash = "ab".repeat(32);
        let sig = signer.sign_hash(&hash);
        assert!(Ed25519Signer::verify(&signer.verifying_key(), &hash, &sig));
        assert!(!Ed25519Signer::verify(
            &signer.verifying_key(),
            &"cd".repeat(32),
            &sig
        ));
    }
}
