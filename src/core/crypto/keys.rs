/*!
Key pairs and raw key agreement.

This module provides generation, encoding, raw Diffie-Hellman agreement,
and KEM encapsulation for every supported key-pair family, plus the
share-combination models used by the ephemeral handshake shapes.
*/

use std::fmt;

use p256::elliptic_curve::sec1::ToEncodedPoint;
use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use rand::RngCore;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, Zeroizing};

use crate::core::error::{CryptoError, Error, Result};
use crate::core::spec::{HandshakeVariant, KeyPairSpec};

/// Endpoint role within one handshake, used to order role-sensitive
/// share combinations identically on both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiating party
    Client,
    /// Responding party
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Client => write!(f, "Client"),
            Role::Server => write!(f, "Server"),
        }
    }
}

/// A key pair of one of the supported families
#[derive(Clone)]
pub enum KeyPair {
    /// X25519 key pair
    X25519(StaticSecret),
    /// NIST P-256 key pair
    P256(p256::SecretKey),
    /// NIST P-384 key pair
    P384(p384::SecretKey),
    /// Kyber768 KEM key pair
    Kyber768 {
        public: kyber768::PublicKey,
        secret: kyber768::SecretKey,
    },
    /// Compound key pair, one component per composite child
    Composite(Vec<KeyPair>),
}

impl KeyPair {
    /// Generate a fresh key pair for the given family
    pub fn generate(spec: &KeyPairSpec) -> Result<Self> {
        match spec {
            KeyPairSpec::X25519 => {
                let mut seed = [0u8; 32];
                rand::rng().fill_bytes(&mut seed);
                let secret = StaticSecret::from(seed);
                seed.zeroize();
                Ok(KeyPair::X25519(secret))
            }
            KeyPairSpec::P256 => {
                let mut bytes = Zeroizing::new([0u8; 32]);
                loop {
                    rand::rng().fill_bytes(bytes.as_mut());
                    // Rejection-sample until the bytes form a valid scalar.
                    if let Ok(secret) = p256::SecretKey::from_slice(bytes.as_ref()) {
                        return Ok(KeyPair::P256(secret));
                    }
                }
            }
            KeyPairSpec::P384 => {
                let mut bytes = Zeroizing::new([0u8; 48]);
                loop {
                    rand::rng().fill_bytes(bytes.as_mut());
                    if let Ok(secret) = p384::SecretKey::from_slice(bytes.as_ref()) {
                        return Ok(KeyPair::P384(secret));
                    }
                }
            }
            KeyPairSpec::Kyber768 => {
                let (public, secret) = kyber768::keypair();
                Ok(KeyPair::Kyber768 { public, secret })
            }
            KeyPairSpec::Composite(children) => {
                let mut components = Vec::with_capacity(children.len());
                for child in children {
                    components.push(KeyPair::generate(child)?);
                }
                Ok(KeyPair::Composite(components))
            }
        }
    }

    /// Specification of this key pair's family
    pub fn spec(&self) -> KeyPairSpec {
        match self {
            KeyPair::X25519(_) => KeyPairSpec::X25519,
            KeyPair::P256(_) => KeyPairSpec::P256,
            KeyPair::P384(_) => KeyPairSpec::P384,
            KeyPair::Kyber768 { .. } => KeyPairSpec::Kyber768,
            KeyPair::Composite(children) => {
                KeyPairSpec::Composite(children.iter().map(KeyPair::spec).collect())
            }
        }
    }

    /// Public half of this key pair
    pub fn public(&self) -> PublicKey {
        match self {
            KeyPair::X25519(secret) => {
                PublicKey::X25519(x25519_dalek::PublicKey::from(secret))
            }
            KeyPair::P256(secret) => PublicKey::P256(secret.public_key()),
            KeyPair::P384(secret) => PublicKey::P384(secret.public_key()),
            KeyPair::Kyber768 { public, .. } => PublicKey::Kyber768(public.clone()),
            KeyPair::Composite(children) => {
                PublicKey::Composite(children.iter().map(KeyPair::public).collect())
            }
        }
    }

    /// Component key pairs of a composite
    pub fn components(&self) -> Result<&[KeyPair]> {
        match self {
            KeyPair::Composite(children) => Ok(children),
            _ => Err(Error::Crypto(CryptoError::KeyTypeMismatch)),
        }
    }

    /// Raw Diffie-Hellman agreement with a peer public key of the same
    /// family. The returned buffer is wiped on drop.
    pub fn agree(&self, peer: &PublicKey) -> Result<Zeroizing<Vec<u8>>> {
        match (self, peer) {
            (KeyPair::X25519(secret), PublicKey::X25519(public)) => {
                let shared = secret.diffie_hellman(public);
                if !shared.was_contributory() {
                    return Err(Error::Crypto(CryptoError::OperationFailed));
                }
                Ok(Zeroizing::new(shared.as_bytes().to_vec()))
            }
            (KeyPair::P256(secret), PublicKey::P256(public)) => {
                let shared =
                    p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            (KeyPair::P384(secret), PublicKey::P384(public)) => {
                let shared =
                    p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            (KeyPair::Kyber768 { .. }, _) | (KeyPair::Composite(_), _) => {
                Err(Error::Crypto(CryptoError::OperationFailed))
            }
            _ => Err(Error::Crypto(CryptoError::KeyTypeMismatch)),
        }
    }

    /// Recover the encapsulated secret from a KEM ciphertext
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            KeyPair::Kyber768 { secret, .. } => {
                let ct = kyber768::Ciphertext::from_bytes(ciphertext)
                    .map_err(|_| Error::Crypto(CryptoError::DecapsulationFailed))?;
                let shared = kyber768::decapsulate(&ct, secret);
                Ok(Zeroizing::new(shared.as_bytes().to_vec()))
            }
            _ => Err(Error::Crypto(CryptoError::KeyTypeMismatch)),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret material.
        write!(f, "KeyPair({})", self.spec())
    }
}

/// A public key of one of the supported families
#[derive(Clone)]
pub enum PublicKey {
    /// X25519 public key
    X25519(x25519_dalek::PublicKey),
    /// NIST P-256 public key
    P256(p256::PublicKey),
    /// NIST P-384 public key
    P384(p384::PublicKey),
    /// Kyber768 public key
    Kyber768(kyber768::PublicKey),
    /// Compound public key, one component per composite child
    Composite(Vec<PublicKey>),
}

impl PublicKey {
    /// Specification of this key's family
    pub fn spec(&self) -> KeyPairSpec {
        match self {
            PublicKey::X25519(_) => KeyPairSpec::X25519,
            PublicKey::P256(_) => KeyPairSpec::P256,
            PublicKey::P384(_) => KeyPairSpec::P384,
            PublicKey::Kyber768(_) => KeyPairSpec::Kyber768,
            PublicKey::Composite(children) => {
                KeyPairSpec::Composite(children.iter().map(PublicKey::spec).collect())
            }
        }
    }

    /// Wire encoding of this public key (SEC1 uncompressed for the NIST
    /// curves, raw bytes otherwise). Composite keys concatenate their
    /// components and are never decoded as a unit.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            PublicKey::X25519(public) => public.as_bytes().to_vec(),
            PublicKey::P256(public) => public.to_encoded_point(false).as_bytes().to_vec(),
            PublicKey::P384(public) => public.to_encoded_point(false).as_bytes().to_vec(),
            PublicKey::Kyber768(public) => public.as_bytes().to_vec(),
            PublicKey::Composite(children) => {
                children.iter().flat_map(PublicKey::encode).collect()
            }
        }
    }

    /// Decode a public key of the given family from its wire encoding
    pub fn decode(spec: &KeyPairSpec, bytes: &[u8]) -> Result<Self> {
        match spec {
            KeyPairSpec::X25519 => {
                let raw: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Error::Crypto(CryptoError::InvalidKeyFormat))?;
                Ok(PublicKey::X25519(x25519_dalek::PublicKey::from(raw)))
            }
            KeyPairSpec::P256 => p256::PublicKey::from_sec1_bytes(bytes)
                .map(PublicKey::P256)
                .map_err(|_| Error::Crypto(CryptoError::InvalidKeyFormat)),
            KeyPairSpec::P384 => p384::PublicKey::from_sec1_bytes(bytes)
                .map(PublicKey::P384)
                .map_err(|_| Error::Crypto(CryptoError::InvalidKeyFormat)),
            KeyPairSpec::Kyber768 => kyber768::PublicKey::from_bytes(bytes)
                .map(PublicKey::Kyber768)
                .map_err(|_| Error::Crypto(CryptoError::InvalidKeyFormat)),
            KeyPairSpec::Composite(_) => Err(Error::UnsupportedSpec(
                "composite public keys are not wire-decoded as a unit".into(),
            )),
        }
    }

    /// Component public keys of a composite
    pub fn components(&self) -> Result<&[PublicKey]> {
        match self {
            PublicKey::Composite(children) => Ok(children),
            _ => Err(Error::Crypto(CryptoError::KeyTypeMismatch)),
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.spec())
    }
}

/// Encapsulate a fresh secret toward a KEM public key.
///
/// Returns the shared secret (wiped on drop) and the ciphertext to send.
pub fn encapsulate(peer: &PublicKey) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>)> {
    match peer {
        PublicKey::Kyber768(public) => {
            let (shared, ciphertext) = kyber768::encapsulate(public);
            Ok((
                Zeroizing::new(shared.as_bytes().to_vec()),
                ciphertext.as_bytes().to_vec(),
            ))
        }
        _ => Err(Error::Crypto(CryptoError::EncapsulationFailed)),
    }
}

/// Combine the Diffie-Hellman shares of an ephemeral handshake according
/// to the requested model.
///
/// Role-sensitive combinations are ordered client-side-first on both
/// endpoints so the resulting buffers are byte-identical.
pub fn combined_agreement(
    variant: HandshakeVariant,
    role: Role,
    local_static: &KeyPair,
    local_ephemeral: &KeyPair,
    peer_static: &PublicKey,
    peer_ephemeral: &PublicKey,
) -> Result<Zeroizing<Vec<u8>>> {
    // es = DH(client ephemeral, server static), se = DH(client static,
    // server ephemeral), computed from whichever side we are on.
    let (es, se) = match role {
        Role::Client => (
            local_ephemeral.agree(peer_static)?,
            local_static.agree(peer_ephemeral)?,
        ),
        Role::Server => (
            local_static.agree(peer_ephemeral)?,
            local_ephemeral.agree(peer_static)?,
        ),
    };

    let mut combined = Zeroizing::new(Vec::new());
    match variant {
        HandshakeVariant::Unified => {
            let ee = local_ephemeral.agree(peer_ephemeral)?;
            let ss = local_static.agree(peer_static)?;
            combined.extend_from_slice(&ee);
            combined.extend_from_slice(&ss);
        }
        HandshakeVariant::Mqv => {
            combined.extend_from_slice(&es);
            combined.extend_from_slice(&se);
        }
        HandshakeVariant::Sm2 => {
            let ee = local_ephemeral.agree(peer_ephemeral)?;
            combined.extend_from_slice(&ee);
            combined.extend_from_slice(&es);
            combined.extend_from_slice(&se);
        }
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dh_agreement_symmetry() -> Result<()> {
        for spec in [KeyPairSpec::X25519, KeyPairSpec::P256, KeyPairSpec::P384] {
            let alice = KeyPair::generate(&spec)?;
            let bob = KeyPair::generate(&spec)?;

            let ab = alice.agree(&bob.public())?;
            let ba = bob.agree(&alice.public())?;
            assert_eq!(&*ab, &*ba, "asymmetric agreement for {}", spec);
            assert!(!ab.is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_kem_roundtrip() -> Result<()> {
        let receiver = KeyPair::generate(&KeyPairSpec::Kyber768)?;
        let (sent, ciphertext) = encapsulate(&receiver.public())?;
        let received = receiver.decapsulate(&ciphertext)?;
        assert_eq!(&*sent, &*received);
        Ok(())
    }

    #[test]
    fn test_public_key_encoding_roundtrip() -> Result<()> {
        for spec in [
            KeyPairSpec::X25519,
            KeyPairSpec::P256,
            KeyPairSpec::P384,
            KeyPairSpec::Kyber768,
        ] {
            let pair = KeyPair::generate(&spec)?;
            let encoded = pair.public().encode();
            let decoded = PublicKey::decode(&spec, &encoded)?;
            assert_eq!(decoded.encode(), encoded, "encoding round-trip for {}", spec);
        }
        Ok(())
    }

    #[test]
    fn test_family_mismatch_rejected() -> Result<()> {
        let x = KeyPair::generate(&KeyPairSpec::X25519)?;
        let p = KeyPair::generate(&KeyPairSpec::P256)?;
        assert!(matches!(
            x.agree(&p.public()),
            Err(Error::Crypto(CryptoError::KeyTypeMismatch))
        ));
        Ok(())
    }

    #[test]
    fn test_kem_pair_cannot_raw_agree() -> Result<()> {
        let a = KeyPair::generate(&KeyPairSpec::Kyber768)?;
        let b = KeyPair::generate(&KeyPairSpec::Kyber768)?;
        assert!(a.agree(&b.public()).is_err());
        Ok(())
    }

    #[test]
    fn test_combined_agreement_matches_across_roles() -> Result<()> {
        let client_static = KeyPair::generate(&KeyPairSpec::P256)?;
        let client_eph = KeyPair::generate(&KeyPairSpec::P256)?;
        let server_static = KeyPair::generate(&KeyPairSpec::P256)?;
        let server_eph = KeyPair::generate(&KeyPairSpec::P256)?;

        for variant in [
            HandshakeVariant::Unified,
            HandshakeVariant::Mqv,
            HandshakeVariant::Sm2,
        ] {
            let client_view = combined_agreement(
                variant,
                Role::Client,
                &client_static,
                &client_eph,
                &server_static.public(),
                &server_eph.public(),
            )?;
            let server_view = combined_agreement(
                variant,
                Role::Server,
                &server_static,
                &server_eph,
                &client_static.public(),
                &client_eph.public(),
            )?;
            assert_eq!(&*client_view, &*server_view, "variant {}", variant);
        }
        Ok(())
    }

    #[test]
    fn test_variants_produce_distinct_secrets() -> Result<()> {
        let client_static = KeyPair::generate(&KeyPairSpec::X25519)?;
        let client_eph = KeyPair::generate(&KeyPairSpec::X25519)?;
        let server_static = KeyPair::generate(&KeyPairSpec::X25519)?;
        let server_eph = KeyPair::generate(&KeyPairSpec::X25519)?;

        let mut secrets = Vec::new();
        for variant in [
            HandshakeVariant::Unified,
            HandshakeVariant::Mqv,
            HandshakeVariant::Sm2,
        ] {
            secrets.push(combined_agreement(
                variant,
                Role::Client,
                &client_static,
                &client_eph,
                &server_static.public(),
                &server_eph.public(),
            )?);
        }
        assert_ne!(&*secrets[0], &*secrets[1]);
        assert_ne!(&*secrets[1], &*secrets[2]);
        assert_ne!(&*secrets[0], &*secrets[2]);
        Ok(())
    }

    #[test]
    fn test_composite_generation() -> Result<()> {
        let spec = KeyPairSpec::Composite(vec![KeyPairSpec::X25519, KeyPairSpec::Kyber768]);
        let pair = KeyPair::generate(&spec)?;
        assert_eq!(pair.spec(), spec);
        assert_eq!(pair.components()?.len(), 2);
        assert_eq!(pair.public().components()?.len(), 2);
        Ok(())
    }
}
