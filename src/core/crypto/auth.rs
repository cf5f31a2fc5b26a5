/*!
Authentication primitives: digital signatures and confirmation tags.

Digital signatures authenticate the server response of the signed
handshake; HMAC confirmation tags prove to each party that the peer
derived the identical secret.
*/

use ed25519_dalek::{Signer, Verifier};
use hmac::{Hmac, Mac};
use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _, SecretKey as _,
};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::core::constants::sizes;
use crate::core::error::{AuthError, CryptoError, Error, Result};
use crate::core::spec::SignatureAlgorithm;

type HmacSha256 = Hmac<Sha256>;

/// A long-term signing key pair
pub enum SigningKeyPair {
    /// Ed25519 signing key
    Ed25519(ed25519_dalek::SigningKey),
    /// Dilithium3 signing key pair
    Dilithium3 {
        public: dilithium3::PublicKey,
        secret: dilithium3::SecretKey,
    },
}

impl SigningKeyPair {
    /// Generate a fresh signing key pair for the given algorithm
    pub fn generate(algorithm: SignatureAlgorithm) -> Self {
        match algorithm {
            SignatureAlgorithm::Ed25519 => {
                let mut seed = [0u8; 32];
                rand::rng().fill_bytes(&mut seed);
                let key = ed25519_dalek::SigningKey::from_bytes(&seed);
                seed.zeroize();
                SigningKeyPair::Ed25519(key)
            }
            SignatureAlgorithm::Dilithium3 => {
                let (public, secret) = dilithium3::keypair();
                SigningKeyPair::Dilithium3 { public, secret }
            }
        }
    }

    /// Algorithm of this key pair
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            SigningKeyPair::Ed25519(_) => SignatureAlgorithm::Ed25519,
            SigningKeyPair::Dilithium3 { .. } => SignatureAlgorithm::Dilithium3,
        }
    }

    /// Verification half of this key pair
    pub fn verifying_key(&self) -> VerifyingKey {
        match self {
            SigningKeyPair::Ed25519(key) => VerifyingKey::Ed25519(key.verifying_key()),
            SigningKeyPair::Dilithium3 { public, .. } => {
                VerifyingKey::Dilithium3(public.clone())
            }
        }
    }

    /// Produce a detached signature over the message
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            SigningKeyPair::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
            SigningKeyPair::Dilithium3 { secret, .. } => {
                dilithium3::detached_sign(message, secret).as_bytes().to_vec()
            }
        }
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKeyPair({})", self.algorithm())
    }
}

/// A long-term verification key
#[derive(Clone)]
pub enum VerifyingKey {
    /// Ed25519 verification key
    Ed25519(ed25519_dalek::VerifyingKey),
    /// Dilithium3 verification key
    Dilithium3(dilithium3::PublicKey),
}

impl VerifyingKey {
    /// Algorithm of this key
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            VerifyingKey::Ed25519(_) => SignatureAlgorithm::Ed25519,
            VerifyingKey::Dilithium3(_) => SignatureAlgorithm::Dilithium3,
        }
    }

    /// Verify a detached signature produced with the given algorithm.
    ///
    /// The wire algorithm must match this key's algorithm; a mismatch is
    /// an authentication failure, not a format error.
    pub fn verify(&self, algorithm: SignatureAlgorithm, message: &[u8], signature: &[u8]) -> Result<()> {
        if algorithm != self.algorithm() {
            return Err(Error::Authentication(AuthError::SignatureAlgorithmMismatch));
        }
        match self {
            VerifyingKey::Ed25519(key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature)
                    .map_err(|_| Error::Authentication(AuthError::InvalidKeyFormat))?;
                key.verify(message, &signature)
                    .map_err(|_| Error::Authentication(AuthError::SignatureVerificationFailed))
            }
            VerifyingKey::Dilithium3(public) => {
                let signature = dilithium3::DetachedSignature::from_bytes(signature)
                    .map_err(|_| Error::Authentication(AuthError::InvalidKeyFormat))?;
                dilithium3::verify_detached_signature(&signature, message, public)
                    .map_err(|_| Error::Authentication(AuthError::SignatureVerificationFailed))
            }
        }
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", self.algorithm())
    }
}

/// Compute an HMAC-SHA-256 confirmation tag over the given parts
pub fn confirmation_tag(key: &[u8], parts: &[&[u8]]) -> Result<[u8; sizes::CONFIRM_TAG]> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| Error::Crypto(CryptoError::OperationFailed))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Verify an HMAC-SHA-256 confirmation tag in constant time
pub fn verify_confirmation_tag(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| Error::Crypto(CryptoError::OperationFailed))?;
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(tag)
        .map_err(|_| Error::Authentication(AuthError::ConfirmationMismatch))
}

/// Constant-time equality for fixed secrets already held by both sides
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        for algorithm in [SignatureAlgorithm::Ed25519, SignatureAlgorithm::Dilithium3] {
            let signer = SigningKeyPair::generate(algorithm);
            let message = b"handshake transcript";
            let signature = signer.sign(message);
            let verifier = signer.verifying_key();
            assert!(verifier.verify(algorithm, message, &signature).is_ok());
        }
    }

    #[test]
    fn test_signature_rejects_tampered_message() {
        let signer = SigningKeyPair::generate(SignatureAlgorithm::Ed25519);
        let signature = signer.sign(b"original");
        let result = signer
            .verifying_key()
            .verify(SignatureAlgorithm::Ed25519, b"tampered", &signature);
        assert!(matches!(
            result,
            Err(Error::Authentication(AuthError::SignatureVerificationFailed))
        ));
    }

    #[test]
    fn test_signature_algorithm_mismatch() {
        let signer = SigningKeyPair::generate(SignatureAlgorithm::Ed25519);
        let signature = signer.sign(b"message");
        let result = signer
            .verifying_key()
            .verify(SignatureAlgorithm::Dilithium3, b"message", &signature);
        assert!(matches!(
            result,
            Err(Error::Authentication(AuthError::SignatureAlgorithmMismatch))
        ));
    }

    #[test]
    fn test_confirmation_tag_order_sensitivity() {
        let key = [7u8; 32];
        let a = confirmation_tag(&key, &[b"first", b"second"]).unwrap();
        let b = confirmation_tag(&key, &[b"second", b"first"]).unwrap();
        assert_ne!(a, b);

        assert!(verify_confirmation_tag(&key, &[b"first", b"second"], &a).is_ok());
        assert!(matches!(
            verify_confirmation_tag(&key, &[b"first", b"second"], &b),
            Err(Error::Authentication(AuthError::ConfirmationMismatch))
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"same", b"same"));
        assert!(!constant_time_eq(b"same", b"diff"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
