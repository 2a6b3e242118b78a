//! Transaction signing
//!
//! Key management lives outside the wallet core; orchestrators only need
//! something that can sign a payload and name the paying account.

use ed25519_dalek::{Signer as _, SigningKey, Verifier, VerifyingKey};
use rand_core::{OsRng, TryRngCore};
use thiserror::Error;

use crate::ledger::Address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("entropy source unavailable: {0}")]
    Entropy(String),

    #[error("signing key unavailable: {0}")]
    KeyUnavailable(String),
}

/// Signs ledger transactions on behalf of the wallet owner
pub trait Signer: Send + Sync {
    /// Account paying for and authorising transactions
    fn address(&self) -> Address;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// Ed25519 signer holding its key in memory.
/// NEVER expose the signing key.
pub struct KeypairSigner {
    signing_key: SigningKey,
}

impl KeypairSigner {
    /// Fresh random key from the OS entropy source
    pub fn generate() -> Result<Self, SignerError> {
        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| SignerError::Entropy(e.to_string()))?;
        Ok(Self::from_seed(&seed))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }
}

impl Signer for KeypairSigner {
    fn address(&self) -> Address {
        Address(self.signing_key.verifying_key().to_bytes())
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        Ok(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

/// Check an ed25519 signature produced by [`KeypairSigner`]
pub fn verify_signature(address: &Address, message: &[u8], signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(address.as_bytes()) else {
        return false;
    };
    let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signer = KeypairSigner::from_seed(&[7u8; 32]);
        let sig = signer.sign(b"deposit").unwrap();

        assert_eq!(sig.len(), 64);
        assert!(verify_signature(&signer.address(), b"deposit", &sig));
        assert!(!verify_signature(&signer.address(), b"withdraw", &sig));
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = KeypairSigner::generate().unwrap();
        let b = KeypairSigner::generate().unwrap();
        assert_ne!(a.address(), b.address());
    }
}
