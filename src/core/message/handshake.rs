/*!
The four handshake message shapes.

Each shape owns its encode/decode pair over the tagged-field codec. The
agreement and result identifiers travel inside the opening message of
every flow so that both peers validate the same specification before any
key material is processed.
*/

use crate::core::constants::sizes;
use crate::core::error::{Error, Result};
use crate::core::message::codec::{
    FieldReader, FieldWriter, MessageType, TAG_AGREEMENT_ID, TAG_CLIENT_ID, TAG_CONFIRMATION,
    TAG_ENCAPSULATED, TAG_EPHEMERAL_KEY, TAG_INIT_VECTOR, TAG_RESULT_ID, TAG_SERVER_ID,
    TAG_SIGNATURE,
};
use crate::core::registry;
use crate::core::spec::{AgreementSpec, ResultType, SignatureAlgorithm};

/// One key-material payload inside a hello message.
///
/// A composite agreement carries one payload per component, in component
/// order; a simple agreement carries at most one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelloPayload {
    /// Encoded ephemeral public key
    Ephemeral(Vec<u8>),
    /// KEM ciphertext
    Encapsulated(Vec<u8>),
}

impl HelloPayload {
    /// Raw payload bytes
    pub fn data(&self) -> &[u8] {
        match self {
            HelloPayload::Ephemeral(data) | HelloPayload::Encapsulated(data) => data,
        }
    }

    fn tag(&self) -> u8 {
        match self {
            HelloPayload::Ephemeral(_) => TAG_EPHEMERAL_KEY,
            HelloPayload::Encapsulated(_) => TAG_ENCAPSULATED,
        }
    }
}

/// Server authentication material inside a server hello.
///
/// Confirmation and signature are mutually exclusive on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAuth {
    /// HMAC confirmation tag over the session transcript
    Confirmation(Vec<u8>),
    /// Detached signature over the session transcript
    Signature {
        algorithm: SignatureAlgorithm,
        signature: Vec<u8>,
    },
}

/// Opening message of every round-trip handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub spec: AgreementSpec,
    pub result_type: ResultType,
    pub client_id: Option<u64>,
    pub client_iv: [u8; sizes::INIT_VECTOR],
    pub payloads: Vec<HelloPayload>,
}

impl ClientHello {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = FieldWriter::new(MessageType::ClientHello);
        writer.field(TAG_AGREEMENT_ID, &registry::agreement_identifier(&self.spec));
        writer.field(TAG_RESULT_ID, &[registry::result_identifier(self.result_type)]);
        if let Some(client_id) = self.client_id {
            writer.u64_field(TAG_CLIENT_ID, client_id);
        }
        writer.field(TAG_INIT_VECTOR, &self.client_iv);
        for payload in &self.payloads {
            writer.field(payload.tag(), payload.data());
        }
        writer.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = FieldReader::new(MessageType::ClientHello, bytes)?;
        let spec = registry::agreement_spec_from(reader.require(TAG_AGREEMENT_ID)?)?;
        let result_type = read_result_type(&mut reader)?;
        let client_id = reader.optional_u64(TAG_CLIENT_ID)?;
        let client_iv = read_init_vector(&mut reader)?;
        let payloads = read_payloads(&mut reader)?;
        reader.finish()?;
        Ok(Self {
            spec,
            result_type,
            client_id,
            client_iv,
            payloads,
        })
    }
}

/// The complete one-message agreement.
///
/// Carries no session identifiers: the sender is anonymous and no
/// response message exists in this flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KemRequest {
    pub spec: AgreementSpec,
    pub result_type: ResultType,
    pub client_iv: [u8; sizes::INIT_VECTOR],
    pub payloads: Vec<HelloPayload>,
}

impl KemRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = FieldWriter::new(MessageType::KemRequest);
        writer.field(TAG_AGREEMENT_ID, &registry::agreement_identifier(&self.spec));
        writer.field(TAG_RESULT_ID, &[registry::result_identifier(self.result_type)]);
        writer.field(TAG_INIT_VECTOR, &self.client_iv);
        for payload in &self.payloads {
            writer.field(payload.tag(), payload.data());
        }
        writer.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = FieldReader::new(MessageType::KemRequest, bytes)?;
        let spec = registry::agreement_spec_from(reader.require(TAG_AGREEMENT_ID)?)?;
        let result_type = read_result_type(&mut reader)?;
        let client_iv = read_init_vector(&mut reader)?;
        let payloads = read_payloads(&mut reader)?;
        reader.finish()?;
        Ok(Self {
            spec,
            result_type,
            client_iv,
            payloads,
        })
    }
}

/// Server response to a client hello
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub spec: AgreementSpec,
    pub client_id: Option<u64>,
    pub server_id: Option<u64>,
    pub server_iv: [u8; sizes::INIT_VECTOR],
    pub payloads: Vec<HelloPayload>,
    pub auth: Option<ServerAuth>,
}

impl ServerHello {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = FieldWriter::new(MessageType::ServerHello);
        writer.field(TAG_AGREEMENT_ID, &registry::agreement_identifier(&self.spec));
        if let Some(client_id) = self.client_id {
            writer.u64_field(TAG_CLIENT_ID, client_id);
        }
        if let Some(server_id) = self.server_id {
            writer.u64_field(TAG_SERVER_ID, server_id);
        }
        writer.field(TAG_INIT_VECTOR, &self.server_iv);
        for payload in &self.payloads {
            writer.field(payload.tag(), payload.data());
        }
        match &self.auth {
            Some(ServerAuth::Confirmation(tag)) => writer.field(TAG_CONFIRMATION, tag),
            Some(ServerAuth::Signature {
                algorithm,
                signature,
            }) => {
                let mut value = vec![registry::signature_identifier(*algorithm)];
                value.extend_from_slice(signature);
                writer.field(TAG_SIGNATURE, &value);
            }
            None => {}
        }
        writer.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = FieldReader::new(MessageType::ServerHello, bytes)?;
        let spec = registry::agreement_spec_from(reader.require(TAG_AGREEMENT_ID)?)?;
        let client_id = reader.optional_u64(TAG_CLIENT_ID)?;
        let server_id = reader.optional_u64(TAG_SERVER_ID)?;
        let server_iv = read_init_vector(&mut reader)?;
        let payloads = read_payloads(&mut reader)?;

        let confirmation = reader.optional(TAG_CONFIRMATION)?.map(<[u8]>::to_vec);
        let signature = reader.optional(TAG_SIGNATURE)?;
        let auth = match (confirmation, signature) {
            (Some(_), Some(_)) => {
                return Err(Error::WireFormat(
                    "server hello carries both confirmation and signature".into(),
                ));
            }
            (Some(tag), None) => Some(ServerAuth::Confirmation(tag)),
            (None, Some(value)) => {
                let (&algorithm, signature) = value
                    .split_first()
                    .ok_or_else(|| Error::WireFormat("empty signature field".into()))?;
                Some(ServerAuth::Signature {
                    algorithm: registry::signature_algorithm_from(algorithm)?,
                    signature: signature.to_vec(),
                })
            }
            (None, None) => None,
        };

        reader.finish()?;
        Ok(Self {
            spec,
            client_id,
            server_id,
            server_iv,
            payloads,
            auth,
        })
    }
}

/// Closing message of a confirmed handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfirm {
    pub spec: AgreementSpec,
    pub server_id: Option<u64>,
    pub confirmation: Vec<u8>,
}

impl ClientConfirm {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = FieldWriter::new(MessageType::ClientConfirm);
        writer.field(TAG_AGREEMENT_ID, &registry::agreement_identifier(&self.spec));
        if let Some(server_id) = self.server_id {
            writer.u64_field(TAG_SERVER_ID, server_id);
        }
        writer.field(TAG_CONFIRMATION, &self.confirmation);
        writer.finish()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = FieldReader::new(MessageType::ClientConfirm, bytes)?;
        let spec = registry::agreement_spec_from(reader.require(TAG_AGREEMENT_ID)?)?;
        let server_id = reader.optional_u64(TAG_SERVER_ID)?;
        let confirmation = reader.require(TAG_CONFIRMATION)?.to_vec();
        reader.finish()?;
        Ok(Self {
            spec,
            server_id,
            confirmation,
        })
    }
}

fn read_result_type(reader: &mut FieldReader<'_>) -> Result<ResultType> {
    let value = reader.require(TAG_RESULT_ID)?;
    let [id] = value else {
        return Err(Error::WireFormat(format!(
            "expected 1-byte result identifier, found {} bytes",
            value.len()
        )));
    };
    registry::result_type_from(*id)
}

fn read_init_vector(reader: &mut FieldReader<'_>) -> Result<[u8; sizes::INIT_VECTOR]> {
    let value = reader.require(TAG_INIT_VECTOR)?;
    value.try_into().map_err(|_| {
        Error::WireFormat(format!(
            "init-vector must be {} bytes, found {}",
            sizes::INIT_VECTOR,
            value.len()
        ))
    })
}

fn read_payloads(reader: &mut FieldReader<'_>) -> Result<Vec<HelloPayload>> {
    let mut payloads = Vec::new();
    loop {
        match reader.peek_tag() {
            Some(TAG_EPHEMERAL_KEY) => {
                let data = reader.require(TAG_EPHEMERAL_KEY)?.to_vec();
                payloads.push(HelloPayload::Ephemeral(data));
            }
            Some(TAG_ENCAPSULATED) => {
                let data = reader.require(TAG_ENCAPSULATED)?.to_vec();
                payloads.push(HelloPayload::Encapsulated(data));
            }
            _ => return Ok(payloads),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spec::{AgreementKind, HandshakeVariant, KdfAlgorithm, KeyPairSpec};

    fn ephemeral_spec() -> AgreementSpec {
        AgreementSpec::new(
            KeyPairSpec::X25519,
            AgreementKind::Ephemeral(HandshakeVariant::Unified),
            KdfAlgorithm::Sha256,
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_client_hello_roundtrip() {
        let hello = ClientHello {
            spec: ephemeral_spec(),
            result_type: ResultType::KeySet,
            client_id: Some(7),
            client_iv: [1u8; 32],
            payloads: vec![HelloPayload::Ephemeral(vec![2u8; 32])],
        };
        assert_eq!(ClientHello::decode(&hello.encode()).unwrap(), hello);
    }

    #[test]
    fn test_client_hello_without_session_id() {
        let hello = ClientHello {
            spec: ephemeral_spec(),
            result_type: ResultType::RawSecret,
            client_id: None,
            client_iv: [1u8; 32],
            payloads: vec![],
        };
        let decoded = ClientHello::decode(&hello.encode()).unwrap();
        assert_eq!(decoded.client_id, None);
    }

    #[test]
    fn test_kem_request_roundtrip() {
        let spec = AgreementSpec::new(
            KeyPairSpec::Kyber768,
            AgreementKind::Kem,
            KdfAlgorithm::Sha512,
            false,
        )
        .unwrap();
        let request = KemRequest {
            spec,
            result_type: ResultType::CipherPair,
            client_iv: [9u8; 32],
            payloads: vec![HelloPayload::Encapsulated(vec![3u8; 1088])],
        };
        assert_eq!(KemRequest::decode(&request.encode()).unwrap(), request);
    }

    #[test]
    fn test_server_hello_roundtrip_with_confirmation() {
        let hello = ServerHello {
            spec: ephemeral_spec(),
            client_id: Some(7),
            server_id: Some(8),
            server_iv: [4u8; 32],
            payloads: vec![HelloPayload::Ephemeral(vec![5u8; 32])],
            auth: Some(ServerAuth::Confirmation(vec![6u8; 32])),
        };
        assert_eq!(ServerHello::decode(&hello.encode()).unwrap(), hello);
    }

    #[test]
    fn test_server_hello_roundtrip_with_signature() {
        let spec = AgreementSpec::new(
            KeyPairSpec::P256,
            AgreementKind::Signed(HandshakeVariant::Mqv),
            KdfAlgorithm::Sha256,
            false,
        )
        .unwrap();
        let hello = ServerHello {
            spec,
            client_id: Some(1),
            server_id: Some(2),
            server_iv: [4u8; 32],
            payloads: vec![HelloPayload::Ephemeral(vec![5u8; 65])],
            auth: Some(ServerAuth::Signature {
                algorithm: SignatureAlgorithm::Ed25519,
                signature: vec![7u8; 64],
            }),
        };
        assert_eq!(ServerHello::decode(&hello.encode()).unwrap(), hello);
    }

    #[test]
    fn test_server_hello_rejects_confirmation_and_signature() {
        let hello = ServerHello {
            spec: ephemeral_spec(),
            client_id: None,
            server_id: None,
            server_iv: [4u8; 32],
            payloads: vec![],
            auth: Some(ServerAuth::Confirmation(vec![6u8; 32])),
        };
        let mut bytes = hello.encode();
        // Append a signature field after the confirmation field.
        bytes.push(TAG_SIGNATURE);
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[0x01, 0xFF]);
        assert!(matches!(
            ServerHello::decode(&bytes),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn test_client_confirm_roundtrip() {
        let confirm = ClientConfirm {
            spec: ephemeral_spec(),
            server_id: Some(8),
            confirmation: vec![6u8; 32],
        };
        assert_eq!(ClientConfirm::decode(&confirm.encode()).unwrap(), confirm);
    }

    #[test]
    fn test_composite_payload_order_preserved() {
        let spec = AgreementSpec::fixed_set(false, false).unwrap();
        let payloads = vec![
            HelloPayload::Ephemeral(vec![1u8; 65]),
            HelloPayload::Ephemeral(vec![2u8; 97]),
            HelloPayload::Ephemeral(vec![3u8; 32]),
        ];
        let hello = ClientHello {
            spec,
            result_type: ResultType::RawSecret,
            client_id: Some(1),
            client_iv: [0u8; 32],
            payloads: payloads.clone(),
        };
        assert_eq!(ClientHello::decode(&hello.encode()).unwrap().payloads, payloads);
    }

    #[test]
    fn test_short_init_vector_rejected() {
        let hello = ClientHello {
            spec: ephemeral_spec(),
            result_type: ResultType::RawSecret,
            client_id: None,
            client_iv: [1u8; 32],
            payloads: vec![],
        };
        let bytes = hello.encode();
        // Rewrite the init-vector length from 32 down to 16.
        let mut truncated = Vec::new();
        let iv_header = bytes
            .windows(5)
            .position(|w| w[0] == TAG_INIT_VECTOR && w[1..5] == 32u32.to_be_bytes())
            .unwrap();
        truncated.extend_from_slice(&bytes[..iv_header + 1]);
        truncated.extend_from_slice(&16u32.to_be_bytes());
        truncated.extend_from_slice(&bytes[iv_header + 5..iv_header + 5 + 16]);
        assert!(matches!(
            ClientHello::decode(&truncated),
            Err(Error::WireFormat(_))
        ));
    }
}
