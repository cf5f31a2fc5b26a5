/*!
Registry mapping specifications to compact wire identifiers.

Every agreement specification, key-pair specification, and result type has
a deterministic hierarchical byte path used inside wire messages. Lookup
failure on decode is a fatal wire-format error, never a silent default: it
signals tampering or registry-version skew between the peers.
*/

use once_cell::sync::Lazy;

use crate::core::constants::MAX_COMPOSITE_COMPONENTS;
use crate::core::error::{Error, Result};
use crate::core::spec::{
    AgreementKind, AgreementSpec, HandshakeVariant, KdfAlgorithm, KeyPairSpec, ResultType,
    SignatureAlgorithm,
};

// Key-pair family codes
const KP_X25519: u8 = 0x01;
const KP_P256: u8 = 0x02;
const KP_P384: u8 = 0x03;
const KP_KYBER768: u8 = 0x04;
const KP_COMPOSITE: u8 = 0x10;

// Handshake shape codes; ephemeral and signed encode the variant in the
// low nibble
const KIND_KEM: u8 = 0x01;
const KIND_ANONYMOUS: u8 = 0x02;
const KIND_BASIC: u8 = 0x03;
const KIND_EPHEMERAL: u8 = 0x10;
const KIND_SIGNED: u8 = 0x20;

const KDF_SHA256: u8 = 0x01;
const KDF_SHA512: u8 = 0x02;

const RESULT_RAW_SECRET: u8 = 0x01;
const RESULT_SEEDED_FACTORY: u8 = 0x02;
const RESULT_KEY_SET: u8 = 0x03;
const RESULT_CIPHER_PAIR: u8 = 0x04;

const SIG_ED25519: u8 = 0x01;
const SIG_DILITHIUM3: u8 = 0x02;

/// Encode a key-pair specification into its identifier path.
///
/// Composite identifiers recursively encode the component list, prefixed
/// with the component count.
pub fn key_pair_identifier(spec: &KeyPairSpec) -> Vec<u8> {
    match spec {
        KeyPairSpec::X25519 => vec![KP_X25519],
        KeyPairSpec::P256 => vec![KP_P256],
        KeyPairSpec::P384 => vec![KP_P384],
        KeyPairSpec::Kyber768 => vec![KP_KYBER768],
        KeyPairSpec::Composite(children) => {
            let mut id = vec![KP_COMPOSITE, children.len() as u8];
            for child in children {
                id.extend_from_slice(&key_pair_identifier(child));
            }
            id
        }
    }
}

/// Decode a key-pair specification, consuming the whole identifier
pub fn key_pair_spec_from(id: &[u8]) -> Result<KeyPairSpec> {
    let mut cursor = Cursor::new(id);
    let spec = read_key_pair(&mut cursor, true)?;
    cursor.finish()?;
    Ok(spec)
}

/// Encode an agreement specification into its identifier path:
/// key-pair path, then shape, KDF, and confirmation-flag bytes.
pub fn agreement_identifier(spec: &AgreementSpec) -> Vec<u8> {
    let mut id = key_pair_identifier(spec.key_pair());
    id.push(kind_code(spec.kind()));
    id.push(match spec.kdf() {
        KdfAlgorithm::Sha256 => KDF_SHA256,
        KdfAlgorithm::Sha512 => KDF_SHA512,
    });
    id.push(u8::from(spec.with_confirm()));
    id
}

/// Decode an agreement specification, consuming the whole identifier.
///
/// Unknown bytes are a wire-format error; known bytes that form a
/// structurally invalid combination are an unsupported-spec error.
pub fn agreement_spec_from(id: &[u8]) -> Result<AgreementSpec> {
    let mut cursor = Cursor::new(id);
    let key_pair = read_key_pair(&mut cursor, true)?;
    let kind = kind_from(cursor.take()?)?;
    let kdf = match cursor.take()? {
        KDF_SHA256 => KdfAlgorithm::Sha256,
        KDF_SHA512 => KdfAlgorithm::Sha512,
        other => return Err(unknown("KDF", other)),
    };
    let with_confirm = match cursor.take()? {
        0x00 => false,
        0x01 => true,
        other => return Err(unknown("confirmation flag", other)),
    };
    cursor.finish()?;
    AgreementSpec::new(key_pair, kind, kdf, with_confirm)
}

/// Encode a result type into its identifier byte
pub fn result_identifier(result_type: ResultType) -> u8 {
    match result_type {
        ResultType::RawSecret => RESULT_RAW_SECRET,
        ResultType::SeededFactory => RESULT_SEEDED_FACTORY,
        ResultType::KeySet => RESULT_KEY_SET,
        ResultType::CipherPair => RESULT_CIPHER_PAIR,
    }
}

/// Decode a result type from its identifier byte
pub fn result_type_from(id: u8) -> Result<ResultType> {
    match id {
        RESULT_RAW_SECRET => Ok(ResultType::RawSecret),
        RESULT_SEEDED_FACTORY => Ok(ResultType::SeededFactory),
        RESULT_KEY_SET => Ok(ResultType::KeySet),
        RESULT_CIPHER_PAIR => Ok(ResultType::CipherPair),
        other => Err(unknown("result type", other)),
    }
}

/// Encode a signature algorithm into its identifier byte
pub fn signature_identifier(algorithm: SignatureAlgorithm) -> u8 {
    match algorithm {
        SignatureAlgorithm::Ed25519 => SIG_ED25519,
        SignatureAlgorithm::Dilithium3 => SIG_DILITHIUM3,
    }
}

/// Decode a signature algorithm from its identifier byte
pub fn signature_algorithm_from(id: u8) -> Result<SignatureAlgorithm> {
    match id {
        SIG_ED25519 => Ok(SignatureAlgorithm::Ed25519),
        SIG_DILITHIUM3 => Ok(SignatureAlgorithm::Dilithium3),
        other => Err(unknown("signature algorithm", other)),
    }
}

/// Every supported agreement specification over the simple key-pair
/// families, plus the fixed-set bundles. Built once, in deterministic
/// order.
pub fn supported_agreements() -> &'static [AgreementSpec] {
    static SUPPORTED: Lazy<Vec<AgreementSpec>> = Lazy::new(enumerate_supported);
    &SUPPORTED
}

/// Every structurally valid specification for the given key-pair family
pub fn agreements_for(key_pair: &KeyPairSpec) -> Vec<AgreementSpec> {
    let kinds = [
        AgreementKind::Kem,
        AgreementKind::Anonymous,
        AgreementKind::Basic,
        AgreementKind::Ephemeral(HandshakeVariant::Unified),
        AgreementKind::Ephemeral(HandshakeVariant::Mqv),
        AgreementKind::Ephemeral(HandshakeVariant::Sm2),
        AgreementKind::Signed(HandshakeVariant::Unified),
        AgreementKind::Signed(HandshakeVariant::Mqv),
        AgreementKind::Signed(HandshakeVariant::Sm2),
    ];
    let kdfs = [KdfAlgorithm::Sha256, KdfAlgorithm::Sha512];

    let mut specs = Vec::new();
    for kind in kinds {
        for kdf in kdfs {
            for with_confirm in [false, true] {
                if let Ok(spec) =
                    AgreementSpec::new(key_pair.clone(), kind, kdf, with_confirm)
                {
                    specs.push(spec);
                }
            }
        }
    }
    specs
}

fn enumerate_supported() -> Vec<AgreementSpec> {
    let families = [
        KeyPairSpec::X25519,
        KeyPairSpec::P256,
        KeyPairSpec::P384,
        KeyPairSpec::Kyber768,
    ];
    let mut specs: Vec<AgreementSpec> = families
        .iter()
        .flat_map(agreements_for)
        .collect();
    // The standardized composite bundles.
    for signed in [false, true] {
        for with_confirm in [false, true] {
            if let Ok(spec) = AgreementSpec::fixed_set(signed, with_confirm) {
                specs.push(spec);
            }
        }
    }
    specs
}

fn kind_code(kind: AgreementKind) -> u8 {
    match kind {
        AgreementKind::Kem => KIND_KEM,
        AgreementKind::Anonymous => KIND_ANONYMOUS,
        AgreementKind::Basic => KIND_BASIC,
        AgreementKind::Ephemeral(v) => KIND_EPHEMERAL | variant_code(v),
        AgreementKind::Signed(v) => KIND_SIGNED | variant_code(v),
    }
}

fn kind_from(code: u8) -> Result<AgreementKind> {
    match code {
        KIND_KEM => Ok(AgreementKind::Kem),
        KIND_ANONYMOUS => Ok(AgreementKind::Anonymous),
        KIND_BASIC => Ok(AgreementKind::Basic),
        _ => {
            let variant = variant_from(code & 0x0F)?;
            match code & 0xF0 {
                KIND_EPHEMERAL => Ok(AgreementKind::Ephemeral(variant)),
                KIND_SIGNED => Ok(AgreementKind::Signed(variant)),
                _ => Err(unknown("agreement shape", code)),
            }
        }
    }
}

fn variant_code(variant: HandshakeVariant) -> u8 {
    match variant {
        HandshakeVariant::Unified => 0x00,
        HandshakeVariant::Mqv => 0x01,
        HandshakeVariant::Sm2 => 0x02,
    }
}

fn variant_from(code: u8) -> Result<HandshakeVariant> {
    match code {
        0x00 => Ok(HandshakeVariant::Unified),
        0x01 => Ok(HandshakeVariant::Mqv),
        0x02 => Ok(HandshakeVariant::Sm2),
        other => Err(unknown("handshake variant", other)),
    }
}

fn read_key_pair(cursor: &mut Cursor<'_>, allow_composite: bool) -> Result<KeyPairSpec> {
    match cursor.take()? {
        KP_X25519 => Ok(KeyPairSpec::X25519),
        KP_P256 => Ok(KeyPairSpec::P256),
        KP_P384 => Ok(KeyPairSpec::P384),
        KP_KYBER768 => Ok(KeyPairSpec::Kyber768),
        KP_COMPOSITE if allow_composite => {
            let count = cursor.take()? as usize;
            if !(2..=MAX_COMPOSITE_COMPONENTS).contains(&count) {
                return Err(Error::WireFormat(format!(
                    "composite component count out of range: {}",
                    count
                )));
            }
            let mut children = Vec::with_capacity(count);
            for _ in 0..count {
                // Components must be simple: composites do not nest.
                children.push(read_key_pair(cursor, false)?);
            }
            Ok(KeyPairSpec::Composite(children))
        }
        KP_COMPOSITE => Err(Error::WireFormat(
            "nested composite key-pair identifier".into(),
        )),
        other => Err(unknown("key-pair family", other)),
    }
}

fn unknown(what: &str, code: u8) -> Error {
    Error::WireFormat(format!("unknown {} identifier: {:#04x}", what, code))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self) -> Result<u8> {
        let byte = self
            .bytes
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::WireFormat("truncated identifier".into()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(Error::WireFormat("trailing identifier bytes".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_identifier_roundtrip() {
        for spec in supported_agreements() {
            let id = agreement_identifier(spec);
            let decoded = agreement_spec_from(&id).unwrap();
            assert_eq!(*spec, decoded, "identifier round-trip for {}", spec);
        }
    }

    #[test]
    fn test_composite_identifier_nests_children() {
        let composite = KeyPairSpec::Composite(vec![KeyPairSpec::X25519, KeyPairSpec::Kyber768]);
        let id = key_pair_identifier(&composite);
        assert_eq!(id, vec![KP_COMPOSITE, 2, KP_X25519, KP_KYBER768]);
        assert_eq!(key_pair_spec_from(&id).unwrap(), composite);
    }

    #[test]
    fn test_composite_component_count_bounds() {
        // Zero and single-child composites are not valid identifiers.
        assert!(matches!(
            key_pair_spec_from(&[KP_COMPOSITE, 0]),
            Err(Error::WireFormat(_))
        ));
        assert!(matches!(
            key_pair_spec_from(&[KP_COMPOSITE, 1, KP_X25519]),
            Err(Error::WireFormat(_))
        ));
        let mut oversized = vec![KP_COMPOSITE, 9];
        oversized.extend(std::iter::repeat(KP_X25519).take(9));
        assert!(matches!(
            key_pair_spec_from(&oversized),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn test_unknown_identifier_is_fatal() {
        assert!(matches!(
            key_pair_spec_from(&[0x7F]),
            Err(Error::WireFormat(_))
        ));
        assert!(matches!(result_type_from(0x7F), Err(Error::WireFormat(_))));
        assert!(matches!(
            signature_algorithm_from(0x7F),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn test_truncated_and_trailing_identifiers() {
        let spec = AgreementSpec::new(
            KeyPairSpec::P256,
            AgreementKind::Basic,
            KdfAlgorithm::Sha256,
            false,
        )
        .unwrap();
        let mut id = agreement_identifier(&spec);

        let truncated = &id[..id.len() - 1];
        assert!(matches!(
            agreement_spec_from(truncated),
            Err(Error::WireFormat(_))
        ));

        id.push(0x00);
        assert!(matches!(
            agreement_spec_from(&id),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn test_invalid_combination_distinct_from_parse_error() {
        // Kyber with the basic shape parses but is structurally invalid.
        let mut id = key_pair_identifier(&KeyPairSpec::Kyber768);
        id.extend_from_slice(&[KIND_BASIC, KDF_SHA256, 0x00]);
        assert!(matches!(
            agreement_spec_from(&id),
            Err(Error::UnsupportedSpec(_))
        ));
    }

    #[test]
    fn test_supported_enumeration_is_deduplicated_and_valid() {
        let specs = supported_agreements();
        assert!(!specs.is_empty());
        for (i, a) in specs.iter().enumerate() {
            for b in &specs[i + 1..] {
                assert_ne!(a, b, "duplicate spec in enumeration");
            }
        }
        // KEM families never appear with a handshake shape.
        assert!(specs
            .iter()
            .filter(|s| *s.key_pair() == KeyPairSpec::Kyber768)
            .all(|s| s.kind() == AgreementKind::Kem));
    }
}
