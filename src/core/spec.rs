/*!
Agreement and key-pair specifications.

This module defines the immutable value types that describe a key
agreement: the key-pair family, the handshake shape, the KDF digest, and
the requested result shape. Invalid combinations are rejected at
construction time, never silently accepted.
*/

use std::fmt;

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::core::constants::MAX_COMPOSITE_COMPONENTS;
use crate::core::error::{Error, Result};

/// Supported key-pair families
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum KeyPairSpec {
    /// X25519 Diffie-Hellman key pair
    X25519,
    /// NIST P-256 ECDH key pair
    P256,
    /// NIST P-384 ECDH key pair
    P384,
    /// CRYSTALS-Kyber-768 KEM key pair
    Kyber768,
    /// Compound key pair made of independently-simple components
    Composite(Vec<KeyPairSpec>),
}

impl KeyPairSpec {
    /// Whether this family only supports the encapsulated (KEM) shape
    pub fn is_kem(&self) -> bool {
        matches!(self, KeyPairSpec::Kyber768)
    }

    /// Whether this family supports raw Diffie-Hellman agreement
    pub fn is_dh(&self) -> bool {
        matches!(
            self,
            KeyPairSpec::X25519 | KeyPairSpec::P256 | KeyPairSpec::P384
        )
    }

    /// Whether this is a compound key-pair specification
    pub fn is_composite(&self) -> bool {
        matches!(self, KeyPairSpec::Composite(_))
    }

    /// Component specifications of a composite, or a single-element view
    /// of a simple family
    pub fn components(&self) -> &[KeyPairSpec] {
        match self {
            KeyPairSpec::Composite(children) => children,
            simple => std::slice::from_ref(simple),
        }
    }

    fn check_components(&self) -> Result<()> {
        let KeyPairSpec::Composite(children) = self else {
            return Ok(());
        };
        if children.len() < 2 {
            return Err(Error::UnsupportedSpec(
                "composite key pair requires at least two components".into(),
            ));
        }
        if children.len() > MAX_COMPOSITE_COMPONENTS {
            return Err(Error::UnsupportedSpec(format!(
                "composite key pair is limited to {} components",
                MAX_COMPOSITE_COMPONENTS
            )));
        }
        // Nesting composites inside composites is not supported.
        if let Some(nested) = children.iter().find(|child| child.is_composite()) {
            return Err(Error::UnsupportedSpec(format!(
                "nested composite component {} is not supported",
                nested
            )));
        }
        Ok(())
    }
}

impl fmt::Display for KeyPairSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPairSpec::X25519 => write!(f, "X25519"),
            KeyPairSpec::P256 => write!(f, "P-256"),
            KeyPairSpec::P384 => write!(f, "P-384"),
            KeyPairSpec::Kyber768 => write!(f, "Kyber768"),
            KeyPairSpec::Composite(children) => {
                write!(f, "Composite[")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, "+")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Share-combination model for the ephemeral handshake shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum HandshakeVariant {
    /// Unified model: ephemeral-ephemeral and static-static shares
    Unified,
    /// MQV-style one-flow model: each ephemeral paired with the peer's
    /// long-term key
    Mqv,
    /// SM2-style full-matrix model: all three share combinations
    Sm2,
}

impl fmt::Display for HandshakeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeVariant::Unified => write!(f, "Unified"),
            HandshakeVariant::Mqv => write!(f, "MQV"),
            HandshakeVariant::Sm2 => write!(f, "SM2"),
        }
    }
}

/// Handshake shape of an agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum AgreementKind {
    /// One-message encapsulated agreement (KEM families)
    Kem,
    /// One-message anonymous agreement toward a known public key
    Anonymous,
    /// Single round trip over the long-term key pairs, no ephemeral keys
    Basic,
    /// Fresh ephemeral key pairs per session, optional mutual confirmation
    Ephemeral(HandshakeVariant),
    /// Ephemeral handshake with a digitally signed server response
    Signed(HandshakeVariant),
}

impl AgreementKind {
    /// Whether this shape completes inside a single message
    pub fn is_one_message(&self) -> bool {
        matches!(self, AgreementKind::Kem | AgreementKind::Anonymous)
    }

    /// Whether this shape exchanges fresh ephemeral key pairs
    pub fn uses_ephemeral_keys(&self) -> bool {
        matches!(self, AgreementKind::Ephemeral(_) | AgreementKind::Signed(_))
    }

    /// Share-combination model, for the shapes that have one
    pub fn variant(&self) -> Option<HandshakeVariant> {
        match self {
            AgreementKind::Ephemeral(v) | AgreementKind::Signed(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AgreementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgreementKind::Kem => write!(f, "KEM"),
            AgreementKind::Anonymous => write!(f, "Anonymous"),
            AgreementKind::Basic => write!(f, "Basic"),
            AgreementKind::Ephemeral(v) => write!(f, "Ephemeral({})", v),
            AgreementKind::Signed(v) => write!(f, "Signed({})", v),
        }
    }
}

/// KDF digest driving the secret-derivation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum KdfAlgorithm {
    /// SHA-256 chain (extended by squeezing for wide outputs)
    Sha256,
    /// SHA-512 chain
    Sha512,
}

impl fmt::Display for KdfAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KdfAlgorithm::Sha256 => write!(f, "SHA-256"),
            KdfAlgorithm::Sha512 => write!(f, "SHA-512"),
        }
    }
}

/// Supported digital signature algorithms for the signed handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum SignatureAlgorithm {
    /// Ed25519
    Ed25519,
    /// CRYSTALS-Dilithium (dilithium3)
    Dilithium3,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureAlgorithm::Ed25519 => write!(f, "Ed25519"),
            SignatureAlgorithm::Dilithium3 => write!(f, "Dilithium3"),
        }
    }
}

/// Caller-chosen output shape of a completed agreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum ResultType {
    /// Raw 512-bit secret
    #[default]
    RawSecret,
    /// Deterministic factory reseeded from the derived secret
    SeededFactory,
    /// Symmetric key-set (key plus init-vector)
    KeySet,
    /// Initialized encrypt/decrypt cipher pair
    CipherPair,
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultType::RawSecret => write!(f, "RawSecret"),
            ResultType::SeededFactory => write!(f, "SeededFactory"),
            ResultType::KeySet => write!(f, "KeySet"),
            ResultType::CipherPair => write!(f, "CipherPair"),
        }
    }
}

/// Immutable description of one key agreement.
///
/// Construction validates the combination; an `AgreementSpec` that exists
/// is always structurally legal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct AgreementSpec {
    key_pair: KeyPairSpec,
    kind: AgreementKind,
    kdf: KdfAlgorithm,
    with_confirm: bool,
}

impl AgreementSpec {
    /// Create a validated agreement specification
    pub fn new(
        key_pair: KeyPairSpec,
        kind: AgreementKind,
        kdf: KdfAlgorithm,
        with_confirm: bool,
    ) -> Result<Self> {
        let spec = Self {
            key_pair,
            kind,
            kdf,
            with_confirm,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// The standardized three-algorithm bundle: P-256 + P-384 + X25519,
    /// each component running unified-model semantics.
    pub fn fixed_set(signed: bool, with_confirm: bool) -> Result<Self> {
        let kind = if signed {
            AgreementKind::Signed(HandshakeVariant::Unified)
        } else {
            AgreementKind::Ephemeral(HandshakeVariant::Unified)
        };
        Self::new(
            KeyPairSpec::Composite(vec![
                KeyPairSpec::P256,
                KeyPairSpec::P384,
                KeyPairSpec::X25519,
            ]),
            kind,
            KdfAlgorithm::Sha512,
            with_confirm,
        )
    }

    /// Key-pair family of this agreement
    pub fn key_pair(&self) -> &KeyPairSpec {
        &self.key_pair
    }

    /// Handshake shape of this agreement
    pub fn kind(&self) -> AgreementKind {
        self.kind
    }

    /// KDF digest of this agreement
    pub fn kdf(&self) -> KdfAlgorithm {
        self.kdf
    }

    /// Whether mutual confirmation is enabled
    pub fn with_confirm(&self) -> bool {
        self.with_confirm
    }

    /// Handshake shape a composite component runs under.
    ///
    /// Signed shapes degrade to the plain ephemeral equivalent, since only
    /// the outer composite signs or confirms; one-message shapes pick KEM
    /// or anonymous per component family.
    pub fn component_kind(&self, component: &KeyPairSpec) -> AgreementKind {
        match self.kind {
            AgreementKind::Kem | AgreementKind::Anonymous => {
                if component.is_kem() {
                    AgreementKind::Kem
                } else {
                    AgreementKind::Anonymous
                }
            }
            AgreementKind::Basic => AgreementKind::Basic,
            AgreementKind::Ephemeral(v) | AgreementKind::Signed(v) => AgreementKind::Ephemeral(v),
        }
    }

    fn validate(&self) -> Result<()> {
        self.key_pair.check_components()?;

        // Confirmation exists only for the ephemeral handshake, and the
        // SM2-style model never confirms.
        if self.with_confirm {
            match self.kind {
                AgreementKind::Ephemeral(HandshakeVariant::Sm2) => {
                    return Err(Error::UnsupportedSpec(
                        "SM2-style agreement cannot be combined with confirmation".into(),
                    ));
                }
                AgreementKind::Ephemeral(_) => {}
                other => {
                    return Err(Error::UnsupportedSpec(format!(
                        "{} agreement cannot be combined with confirmation",
                        other
                    )));
                }
            }
        }

        for component in self.key_pair.components() {
            let kind = if self.key_pair.is_composite() {
                self.component_kind(component)
            } else {
                self.kind
            };
            validate_family_kind(component, kind)?;
            // The P-384 family pairs with the wide KDF only.
            if *component == KeyPairSpec::P384 && self.kdf != KdfAlgorithm::Sha512 {
                return Err(Error::UnsupportedSpec(format!(
                    "P-384 requires the SHA-512 KDF, not {}",
                    self.kdf
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for AgreementSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}{}",
            self.key_pair,
            self.kind,
            self.kdf,
            if self.with_confirm { "+confirm" } else { "" }
        )
    }
}

fn validate_family_kind(family: &KeyPairSpec, kind: AgreementKind) -> Result<()> {
    match (family.is_kem(), kind) {
        (true, AgreementKind::Kem) => Ok(()),
        (true, other) => Err(Error::UnsupportedSpec(format!(
            "{} supports only the KEM shape, not {}",
            family, other
        ))),
        (false, AgreementKind::Kem) => Err(Error::UnsupportedSpec(format!(
            "{} is not an encapsulation family",
            family
        ))),
        (false, _) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_specs() {
        assert!(AgreementSpec::new(
            KeyPairSpec::X25519,
            AgreementKind::Ephemeral(HandshakeVariant::Unified),
            KdfAlgorithm::Sha256,
            true,
        )
        .is_ok());

        assert!(AgreementSpec::new(
            KeyPairSpec::Kyber768,
            AgreementKind::Kem,
            KdfAlgorithm::Sha512,
            false,
        )
        .is_ok());

        assert!(AgreementSpec::new(
            KeyPairSpec::P256,
            AgreementKind::Signed(HandshakeVariant::Mqv),
            KdfAlgorithm::Sha256,
            false,
        )
        .is_ok());
    }

    #[test]
    fn test_confirm_rejected_outside_ephemeral() {
        for kind in [
            AgreementKind::Anonymous,
            AgreementKind::Basic,
            AgreementKind::Signed(HandshakeVariant::Unified),
        ] {
            let result =
                AgreementSpec::new(KeyPairSpec::X25519, kind, KdfAlgorithm::Sha256, true);
            assert!(matches!(result, Err(Error::UnsupportedSpec(_))));
        }
    }

    #[test]
    fn test_sm2_confirm_rejected() {
        let result = AgreementSpec::new(
            KeyPairSpec::X25519,
            AgreementKind::Ephemeral(HandshakeVariant::Sm2),
            KdfAlgorithm::Sha256,
            true,
        );
        assert!(matches!(result, Err(Error::UnsupportedSpec(_))));
    }

    #[test]
    fn test_kem_family_restrictions() {
        let result = AgreementSpec::new(
            KeyPairSpec::Kyber768,
            AgreementKind::Basic,
            KdfAlgorithm::Sha256,
            false,
        );
        assert!(matches!(result, Err(Error::UnsupportedSpec(_))));

        let result = AgreementSpec::new(
            KeyPairSpec::X25519,
            AgreementKind::Kem,
            KdfAlgorithm::Sha256,
            false,
        );
        assert!(matches!(result, Err(Error::UnsupportedSpec(_))));
    }

    #[test]
    fn test_p384_kdf_width_rule() {
        let result = AgreementSpec::new(
            KeyPairSpec::P384,
            AgreementKind::Basic,
            KdfAlgorithm::Sha256,
            false,
        );
        assert!(matches!(result, Err(Error::UnsupportedSpec(_))));

        assert!(AgreementSpec::new(
            KeyPairSpec::P384,
            AgreementKind::Basic,
            KdfAlgorithm::Sha512,
            false,
        )
        .is_ok());
    }

    #[test]
    fn test_nested_composite_rejected() {
        let nested = KeyPairSpec::Composite(vec![
            KeyPairSpec::X25519,
            KeyPairSpec::Composite(vec![KeyPairSpec::P256, KeyPairSpec::X25519]),
        ]);
        let result = AgreementSpec::new(
            nested,
            AgreementKind::Ephemeral(HandshakeVariant::Unified),
            KdfAlgorithm::Sha256,
            false,
        );
        assert!(matches!(result, Err(Error::UnsupportedSpec(_))));
    }

    #[test]
    fn test_hybrid_composite_valid_for_one_message_shapes() {
        let hybrid = KeyPairSpec::Composite(vec![KeyPairSpec::X25519, KeyPairSpec::Kyber768]);
        let spec = AgreementSpec::new(
            hybrid.clone(),
            AgreementKind::Anonymous,
            KdfAlgorithm::Sha512,
            false,
        )
        .unwrap();
        assert_eq!(
            spec.component_kind(&KeyPairSpec::Kyber768),
            AgreementKind::Kem
        );
        assert_eq!(
            spec.component_kind(&KeyPairSpec::X25519),
            AgreementKind::Anonymous
        );

        // A KEM component cannot take part in an ephemeral handshake.
        let result = AgreementSpec::new(
            hybrid,
            AgreementKind::Ephemeral(HandshakeVariant::Unified),
            KdfAlgorithm::Sha512,
            false,
        );
        assert!(matches!(result, Err(Error::UnsupportedSpec(_))));
    }

    #[test]
    fn test_fixed_set_shape() {
        let spec = AgreementSpec::fixed_set(true, false).unwrap();
        assert_eq!(
            spec.kind(),
            AgreementKind::Signed(HandshakeVariant::Unified)
        );
        assert_eq!(spec.key_pair().components().len(), 3);
        // Components degrade to the plain ephemeral handshake.
        assert_eq!(
            spec.component_kind(&KeyPairSpec::P256),
            AgreementKind::Ephemeral(HandshakeVariant::Unified)
        );

        // A signed fixed set cannot also confirm.
        assert!(AgreementSpec::fixed_set(true, true).is_err());
    }

    #[test]
    fn test_structural_equality() {
        let a = AgreementSpec::new(
            KeyPairSpec::X25519,
            AgreementKind::Basic,
            KdfAlgorithm::Sha256,
            false,
        )
        .unwrap();
        let b = AgreementSpec::new(
            KeyPairSpec::X25519,
            AgreementKind::Basic,
            KdfAlgorithm::Sha256,
            false,
        )
        .unwrap();
        assert_eq!(a, b);
    }
}
