/*!
Result shapes of a completed agreement.

The caller picks one of four shapes before the handshake begins: the raw
512-bit secret, a deterministically reseeded factory, a symmetric key-set,
or an initialized cipher pair. All of them wipe their secret material on
drop.
*/

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::core::constants::sizes;
use crate::core::error::{CryptoError, Error, Result};
use crate::core::spec::ResultType;

/// Raw 512-bit derived secret
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes([u8; sizes::RAW_SECRET]);

impl SecretBytes {
    pub(crate) fn new(bytes: [u8; sizes::RAW_SECRET]) -> Self {
        Self(bytes)
    }

    /// The secret bytes
    pub fn as_bytes(&self) -> &[u8; sizes::RAW_SECRET] {
        &self.0
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes(..)")
    }
}

/// Deterministic factory reseeded from the derived secret.
///
/// Both peers obtain factories that mint identical sequences of symmetric
/// key material.
pub struct SeededFactory {
    rng: StdRng,
}

impl SeededFactory {
    pub(crate) fn from_seed(seed: [u8; sizes::FACTORY_SEED]) -> Self {
        Self {
            rng: StdRng::from_seed(seed),
        }
    }

    /// Mint the next symmetric key
    pub fn next_key(&mut self) -> [u8; sizes::SYMMETRIC_KEY] {
        let mut key = [0u8; sizes::SYMMETRIC_KEY];
        self.rng.fill_bytes(&mut key);
        key
    }

    /// Mint the next cipher init-vector
    pub fn next_iv(&mut self) -> [u8; sizes::CIPHER_NONCE] {
        let mut iv = [0u8; sizes::CIPHER_NONCE];
        self.rng.fill_bytes(&mut iv);
        iv
    }
}

impl fmt::Debug for SeededFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeededFactory(..)")
    }
}

/// Symmetric key-set: a 256-bit key and a 256-bit init-vector
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeySet {
    key: [u8; sizes::SYMMETRIC_KEY],
    iv: [u8; sizes::KEY_SET_IV],
}

impl KeySet {
    pub(crate) fn new(key: [u8; sizes::SYMMETRIC_KEY], iv: [u8; sizes::KEY_SET_IV]) -> Self {
        Self { key, iv }
    }

    /// The symmetric key
    pub fn key(&self) -> &[u8; sizes::SYMMETRIC_KEY] {
        &self.key
    }

    /// The init-vector
    pub fn iv(&self) -> &[u8; sizes::KEY_SET_IV] {
        &self.iv
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeySet(..)")
    }
}

/// Initialized XChaCha20-Poly1305 cipher pair: one encrypt direction and
/// one decrypt direction built from the same derived key and init-vector
pub struct CipherPair {
    sealer: XChaCha20Poly1305,
    opener: XChaCha20Poly1305,
    nonce: [u8; sizes::CIPHER_NONCE],
}

impl CipherPair {
    pub(crate) fn new(
        key: &[u8; sizes::SYMMETRIC_KEY],
        nonce: [u8; sizes::CIPHER_NONCE],
    ) -> Self {
        Self {
            sealer: XChaCha20Poly1305::new(key.into()),
            opener: XChaCha20Poly1305::new(key.into()),
            nonce,
        }
    }

    /// Encrypt plaintext with the encrypt-direction cipher
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.sealer
            .encrypt(XNonce::from_slice(&self.nonce), plaintext)
            .map_err(|_| Error::Crypto(CryptoError::EncryptionFailed))
    }

    /// Decrypt ciphertext with the decrypt-direction cipher
    pub fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.opener
            .decrypt(XNonce::from_slice(&self.nonce), ciphertext)
            .map_err(|_| Error::Crypto(CryptoError::DecryptionFailed))
    }
}

impl fmt::Debug for CipherPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherPair(..)")
    }
}

/// The output of a completed agreement, shaped by the requested
/// [`ResultType`]
#[derive(Debug)]
pub enum AgreementOutput {
    /// Raw 512-bit secret
    RawSecret(SecretBytes),
    /// Reseeded deterministic factory
    SeededFactory(SeededFactory),
    /// Symmetric key-set
    KeySet(KeySet),
    /// Initialized cipher pair
    CipherPair(CipherPair),
}

impl AgreementOutput {
    /// The result type this output was derived for
    pub fn result_type(&self) -> ResultType {
        match self {
            AgreementOutput::RawSecret(_) => ResultType::RawSecret,
            AgreementOutput::SeededFactory(_) => ResultType::SeededFactory,
            AgreementOutput::KeySet(_) => ResultType::KeySet,
            AgreementOutput::CipherPair(_) => ResultType::CipherPair,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_factories_agree() {
        let mut a = SeededFactory::from_seed([9u8; 32]);
        let mut b = SeededFactory::from_seed([9u8; 32]);
        assert_eq!(a.next_key(), b.next_key());
        assert_eq!(a.next_iv(), b.next_iv());

        let mut c = SeededFactory::from_seed([10u8; 32]);
        assert_ne!(a.next_key(), c.next_key());
    }

    #[test]
    fn test_cipher_pair_roundtrip() {
        let pair = CipherPair::new(&[3u8; 32], [4u8; 24]);
        let sealed = pair.seal(b"attack at dawn").unwrap();
        assert_eq!(pair.open(&sealed).unwrap(), b"attack at dawn");
    }

    #[test]
    fn test_cipher_pair_rejects_tampered_ciphertext() {
        let pair = CipherPair::new(&[3u8; 32], [4u8; 24]);
        let mut sealed = pair.seal(b"attack at dawn").unwrap();
        sealed[0] ^= 0x01;
        assert!(matches!(
            pair.open(&sealed),
            Err(Error::Crypto(CryptoError::DecryptionFailed))
        ));
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let secret = SecretBytes::new([0xAA; 64]);
        assert_eq!(format!("{:?}", secret), "SecretBytes(..)");
        let keys = KeySet::new([0xBB; 32], [0xCC; 32]);
        assert_eq!(format!("{:?}", keys), "KeySet(..)");
    }
}
