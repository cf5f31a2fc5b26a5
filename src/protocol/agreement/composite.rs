/*!
Composite agreement: several component algorithms handshaking in
lock-step inside one message exchange.

Every message carries one payload per component, in component order.
Each component derives its own 512-bit secret; the merged raw secret is
their concatenation, so the result is secure as long as any one
component algorithm holds. Confirmation and signing happen once, at the
outer layer, over the concatenated payload transcript.
*/

use zeroize::Zeroizing;

use crate::core::crypto::keys::{self, combined_agreement, KeyPair, PublicKey, Role};
use crate::core::crypto::output::AgreementOutput;
use crate::core::crypto::{auth, derive};
use crate::core::error::{AuthError, CryptoError, Error, Result};
use crate::core::message::handshake::{
    ClientConfirm, ClientHello, HelloPayload, KemRequest, ServerAuth, ServerHello,
};
use crate::core::spec::{AgreementKind, AgreementSpec, KdfAlgorithm, KeyPairSpec, ResultType};
use crate::protocol::agreement::{
    Agreement, AgreementCore, AgreementStatus, LocalIdentity, PeerIdentity,
};

/// Per-component handshake state inside a composite agreement
struct SubKex {
    kind: AgreementKind,
    local_ephemeral: Option<KeyPair>,
    share: Option<Zeroizing<Vec<u8>>>,
}

impl std::fmt::Debug for SubKex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the share.
        write!(f, "SubKex({})", self.kind)
    }
}

impl SubKex {
    fn new(kind: AgreementKind) -> Self {
        Self {
            kind,
            local_ephemeral: None,
            share: None,
        }
    }

    /// Client-side opening step, producing this component's payload
    fn client_start(
        &mut self,
        family: &KeyPairSpec,
        peer_static: Option<&PublicKey>,
    ) -> Result<Option<HelloPayload>> {
        match self.kind {
            AgreementKind::Kem => {
                let peer = required(peer_static)?;
                let (share, ciphertext) = keys::encapsulate(peer)?;
                self.share = Some(share);
                Ok(Some(HelloPayload::Encapsulated(ciphertext)))
            }
            AgreementKind::Anonymous => {
                let peer = required(peer_static)?;
                let ephemeral = KeyPair::generate(family)?;
                self.share = Some(ephemeral.agree(peer)?);
                Ok(Some(HelloPayload::Ephemeral(ephemeral.public().encode())))
            }
            AgreementKind::Basic => Ok(None),
            AgreementKind::Ephemeral(_) => {
                let ephemeral = KeyPair::generate(family)?;
                let payload = HelloPayload::Ephemeral(ephemeral.public().encode());
                self.local_ephemeral = Some(ephemeral);
                Ok(Some(payload))
            }
            // Components never run signed semantics themselves.
            AgreementKind::Signed(_) => Err(Error::UnsupportedSpec(
                "signed composite component".into(),
            )),
        }
    }

    /// Server-side step, consuming the client payload and producing the
    /// response payload where the component shape has one
    fn server_accept(
        &mut self,
        family: &KeyPairSpec,
        local_static: Option<&KeyPair>,
        peer_static: Option<&PublicKey>,
        payload: Option<&HelloPayload>,
    ) -> Result<Option<HelloPayload>> {
        match self.kind {
            AgreementKind::Kem => {
                let HelloPayload::Encapsulated(ciphertext) = required_payload(payload)? else {
                    return Err(payload_mismatch());
                };
                self.share = Some(required(local_static)?.decapsulate(ciphertext)?);
                Ok(None)
            }
            AgreementKind::Anonymous => {
                let HelloPayload::Ephemeral(encoded) = required_payload(payload)? else {
                    return Err(payload_mismatch());
                };
                let client_ephemeral = PublicKey::decode(family, encoded)?;
                self.share = Some(required(local_static)?.agree(&client_ephemeral)?);
                Ok(None)
            }
            AgreementKind::Basic => {
                if payload.is_some() {
                    return Err(payload_mismatch());
                }
                self.share = Some(required(local_static)?.agree(required(peer_static)?)?);
                Ok(None)
            }
            AgreementKind::Ephemeral(variant) => {
                let HelloPayload::Ephemeral(encoded) = required_payload(payload)? else {
                    return Err(payload_mismatch());
                };
                let client_ephemeral = PublicKey::decode(family, encoded)?;
                let server_ephemeral = KeyPair::generate(family)?;
                self.share = Some(combined_agreement(
                    variant,
                    Role::Server,
                    required(local_static)?,
                    &server_ephemeral,
                    required(peer_static)?,
                    &client_ephemeral,
                )?);
                Ok(Some(HelloPayload::Ephemeral(
                    server_ephemeral.public().encode(),
                )))
            }
            AgreementKind::Signed(_) => Err(Error::UnsupportedSpec(
                "signed composite component".into(),
            )),
        }
    }

    /// Client-side closing step, consuming the server payload
    fn client_finish(
        &mut self,
        family: &KeyPairSpec,
        local_static: Option<&KeyPair>,
        peer_static: Option<&PublicKey>,
        payload: Option<&HelloPayload>,
    ) -> Result<()> {
        match self.kind {
            AgreementKind::Basic => {
                if payload.is_some() {
                    return Err(payload_mismatch());
                }
                self.share = Some(required(local_static)?.agree(required(peer_static)?)?);
                Ok(())
            }
            AgreementKind::Ephemeral(variant) => {
                let HelloPayload::Ephemeral(encoded) = required_payload(payload)? else {
                    return Err(payload_mismatch());
                };
                let server_ephemeral = PublicKey::decode(family, encoded)?;
                let local_ephemeral = self
                    .local_ephemeral
                    .take()
                    .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))?;
                self.share = Some(combined_agreement(
                    variant,
                    Role::Client,
                    required(local_static)?,
                    &local_ephemeral,
                    required(peer_static)?,
                    &server_ephemeral,
                )?);
                Ok(())
            }
            // One-message components already hold their share.
            _ => {
                if payload.is_some() {
                    return Err(payload_mismatch());
                }
                Ok(())
            }
        }
    }

    fn take_share(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        self.share
            .take()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))
    }

    fn reset(&mut self) {
        self.local_ephemeral = None;
        self.share = None;
    }
}

fn required<T>(value: Option<T>) -> Result<T> {
    value.ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))
}

fn required_payload(payload: Option<&HelloPayload>) -> Result<&HelloPayload> {
    payload.ok_or_else(|| Error::WireFormat("missing component payload".into()))
}

fn payload_mismatch() -> Error {
    Error::WireFormat("component payload does not match component shape".into())
}

/// State machine driving the component handshakes in lock-step
#[derive(Debug)]
pub(crate) struct CompositeAgreement {
    core: AgreementCore,
    children: Vec<SubKex>,
    /// Concatenated payload bytes this side sent, kept for the outer
    /// authentication transcript
    sent_transcript: Option<Vec<u8>>,
    expected_confirmation: Option<Vec<u8>>,
}

impl CompositeAgreement {
    pub(crate) fn new(spec: AgreementSpec, session_id: Option<u64>) -> Self {
        let children = spec
            .key_pair()
            .components()
            .iter()
            .map(|family| SubKex::new(spec.component_kind(family)))
            .collect();
        Self {
            core: AgreementCore::new(spec, session_id),
            children,
            sent_transcript: None,
            expected_confirmation: None,
        }
    }

    fn kdf(&self) -> KdfAlgorithm {
        self.core.spec().kdf()
    }

    fn families(&self) -> Vec<KeyPairSpec> {
        self.core.spec().key_pair().components().to_vec()
    }

    /// Merge the per-component secrets into the composite raw secret
    fn merge_shares(
        &mut self,
        client_iv: &[u8],
        server_iv: Option<&[u8]>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let kdf = self.kdf();
        let mut merged = Zeroizing::new(Vec::new());
        for child in &mut self.children {
            let share = child.take_share()?;
            let part = derive::derive_secret(kdf, &share, client_iv, server_iv);
            merged.extend_from_slice(&part);
        }
        Ok(merged)
    }

    /// Distribute wire payloads one per payload-bearing component
    fn split_payloads<'a>(
        &self,
        payloads: &'a [HelloPayload],
    ) -> Result<Vec<Option<&'a HelloPayload>>> {
        let expected = self
            .children
            .iter()
            .filter(|child| child.kind != AgreementKind::Basic)
            .count();
        if payloads.len() != expected {
            return Err(Error::WireFormat(format!(
                "expected {} component payloads, found {}",
                expected,
                payloads.len()
            )));
        }
        let mut iter = payloads.iter();
        Ok(self
            .children
            .iter()
            .map(|child| {
                if child.kind == AgreementKind::Basic {
                    None
                } else {
                    iter.next()
                }
            })
            .collect())
    }

    fn reset_on_failure(&mut self, error: Error) -> Error {
        self.reset();
        error
    }
}

fn transcript_of(payloads: &[HelloPayload]) -> Vec<u8> {
    payloads
        .iter()
        .flat_map(|payload| payload.data().iter().copied())
        .collect()
}

fn component_statics(identity_key: Option<&KeyPair>, expected: usize) -> Result<Option<&[KeyPair]>> {
    let components = identity_key.map(KeyPair::components).transpose()?;
    if let Some(keys) = components {
        if keys.len() != expected {
            return Err(Error::Crypto(CryptoError::KeyTypeMismatch));
        }
    }
    Ok(components)
}

fn component_publics(peer_key: Option<&PublicKey>, expected: usize) -> Result<Option<&[PublicKey]>> {
    let components = peer_key.map(PublicKey::components).transpose()?;
    if let Some(keys) = components {
        if keys.len() != expected {
            return Err(Error::Crypto(CryptoError::KeyTypeMismatch));
        }
    }
    Ok(components)
}

impl Agreement for CompositeAgreement {
    fn spec(&self) -> &AgreementSpec {
        self.core.spec()
    }

    fn status(&self) -> AgreementStatus {
        self.core.status()
    }

    fn result_type(&self) -> ResultType {
        self.core.result_type()
    }

    fn set_result_type(&mut self, result_type: ResultType) -> Result<()> {
        self.core.set_result_type(result_type)
    }

    fn create_client_hello(
        &mut self,
        _local: &LocalIdentity,
        peer: &PeerIdentity,
    ) -> Result<Vec<u8>> {
        self.core.check_status(AgreementStatus::Clean)?;
        let families = self.families();
        let peer_components = component_publics(peer.public_key().ok(), self.children.len())?;

        let mut payloads = Vec::with_capacity(self.children.len());
        for (index, child) in self.children.iter_mut().enumerate() {
            let peer_static = peer_components.map(|keys| &keys[index]);
            if let Some(payload) = child.client_start(&families[index], peer_static)? {
                payloads.push(payload);
            }
        }

        let client_iv = self.core.new_client_iv();
        let one_message = self.core.spec().kind().is_one_message();

        let encoded = if one_message {
            let request = KemRequest {
                spec: self.core.spec().clone(),
                result_type: self.core.result_type(),
                client_iv,
                payloads,
            };
            // Every component already holds its share.
            let merged = self.merge_shares(&client_iv, None)?;
            self.core.store_secret(merged, None)?;
            self.core.set_status(AgreementStatus::ResultAvailable);
            request.encode()
        } else {
            self.sent_transcript = Some(transcript_of(&payloads));
            let hello = ClientHello {
                spec: self.core.spec().clone(),
                result_type: self.core.result_type(),
                client_id: self.core.session_id(),
                client_iv,
                payloads,
            };
            self.core.set_status(AgreementStatus::AwaitingServerHello);
            hello.encode()
        };
        Ok(encoded)
    }

    fn accept_client_hello(
        &mut self,
        local: &LocalIdentity,
        peer: &PeerIdentity,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        self.core.check_status(AgreementStatus::Clean)?;
        let one_message = self.core.spec().kind().is_one_message();

        let (spec, result_type, client_iv, client_payloads, client_id) = if one_message {
            let request = KemRequest::decode(message)?;
            (
                request.spec,
                request.result_type,
                request.client_iv,
                request.payloads,
                None,
            )
        } else {
            let hello = ClientHello::decode(message)?;
            (
                hello.spec,
                hello.result_type,
                hello.client_iv,
                hello.payloads,
                hello.client_id,
            )
        };
        self.core.ensure_spec(&spec)?;
        self.core.ensure_result_type(result_type)?;

        let families = self.families();
        let local_components = component_statics(local.key_pair().ok(), self.children.len())?;
        let peer_components = component_publics(peer.public_key().ok(), self.children.len())?;
        let slots = self.split_payloads(&client_payloads)?;

        let mut response_payloads = Vec::new();
        for (index, child) in self.children.iter_mut().enumerate() {
            let local_static = local_components.map(|keys| &keys[index]);
            let peer_static = peer_components.map(|keys| &keys[index]);
            if let Some(payload) =
                child.server_accept(&families[index], local_static, peer_static, slots[index])?
            {
                response_payloads.push(payload);
            }
        }

        self.core.set_client_iv(client_iv);
        self.core.set_peer_id(client_id);

        if one_message {
            let merged = self.merge_shares(&client_iv, None)?;
            self.core.store_secret(merged, None)?;
            self.core.set_status(AgreementStatus::ResultAvailable);
            return Ok(None);
        }

        let server_iv = self.core.new_server_iv();
        let merged = self.merge_shares(&client_iv, Some(&server_iv))?;

        let client_transcript = transcript_of(&client_payloads);
        let server_transcript = transcript_of(&response_payloads);

        let auth_field = match self.core.spec().kind() {
            AgreementKind::Signed(_) => {
                let signer = local.signer()?;
                let message = signed_transcript(
                    &client_transcript,
                    &client_iv,
                    &server_transcript,
                    &server_iv,
                );
                Some(ServerAuth::Signature {
                    algorithm: signer.algorithm(),
                    signature: signer.sign(&message),
                })
            }
            _ if self.core.spec().with_confirm() => {
                let confirm_key =
                    derive::confirmation_key(self.kdf(), &merged, &client_iv, &server_iv);
                let server_tag = auth::confirmation_tag(
                    &confirm_key,
                    &[&server_transcript, &client_transcript, &server_iv, &client_iv],
                )?;
                let client_tag = auth::confirmation_tag(
                    &confirm_key,
                    &[&client_transcript, &server_transcript, &client_iv, &server_iv],
                )?;
                self.expected_confirmation = Some(client_tag.to_vec());
                Some(ServerAuth::Confirmation(server_tag.to_vec()))
            }
            _ => None,
        };

        self.core.store_secret(merged, Some(&server_iv))?;

        let response = ServerHello {
            spec: self.core.spec().clone(),
            client_id,
            server_id: self.core.session_id(),
            server_iv,
            payloads: response_payloads,
            auth: auth_field,
        };

        if self.core.spec().with_confirm() {
            self.core.set_status(AgreementStatus::AwaitingClientConfirm);
        } else {
            self.core.set_status(AgreementStatus::ResultAvailable);
        }
        Ok(Some(response.encode()))
    }

    fn accept_server_hello(
        &mut self,
        local: &LocalIdentity,
        peer: &PeerIdentity,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        self.core.check_status(AgreementStatus::AwaitingServerHello)?;
        let hello = ServerHello::decode(message)?;
        self.core.ensure_spec(&hello.spec)?;
        self.core.ensure_echoed_id(hello.client_id)?;

        let families = self.families();
        let local_components = component_statics(local.key_pair().ok(), self.children.len())?;
        let peer_components = component_publics(peer.public_key().ok(), self.children.len())?;
        let slots = self.split_payloads(&hello.payloads)?;

        for (index, child) in self.children.iter_mut().enumerate() {
            let local_static = local_components.map(|keys| &keys[index]);
            let peer_static = peer_components.map(|keys| &keys[index]);
            child.client_finish(&families[index], local_static, peer_static, slots[index])?;
        }

        let client_iv = *self.core.client_iv()?;
        let merged = self.merge_shares(&client_iv, Some(&hello.server_iv))?;

        let client_transcript = self
            .sent_transcript
            .take()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))?;
        let server_transcript = transcript_of(&hello.payloads);

        let confirm = match self.core.spec().kind() {
            AgreementKind::Signed(_) => {
                let Some(ServerAuth::Signature {
                    algorithm,
                    signature,
                }) = &hello.auth
                else {
                    return Err(self.reset_on_failure(Error::Authentication(
                        AuthError::SignatureVerificationFailed,
                    )));
                };
                let message = signed_transcript(
                    &client_transcript,
                    &client_iv,
                    &server_transcript,
                    &hello.server_iv,
                );
                if let Err(error) = peer.verifier()?.verify(*algorithm, &message, signature) {
                    return Err(self.reset_on_failure(error));
                }
                None
            }
            _ if self.core.spec().with_confirm() => {
                let Some(ServerAuth::Confirmation(server_tag)) = &hello.auth else {
                    return Err(self.reset_on_failure(Error::Authentication(
                        AuthError::ConfirmationMismatch,
                    )));
                };
                let confirm_key = derive::confirmation_key(
                    self.kdf(),
                    &merged,
                    &client_iv,
                    &hello.server_iv,
                );
                if let Err(error) = auth::verify_confirmation_tag(
                    &confirm_key,
                    &[
                        &server_transcript,
                        &client_transcript,
                        &hello.server_iv,
                        &client_iv,
                    ],
                    server_tag,
                ) {
                    return Err(self.reset_on_failure(error));
                }
                let client_tag = auth::confirmation_tag(
                    &confirm_key,
                    &[
                        &client_transcript,
                        &server_transcript,
                        &client_iv,
                        &hello.server_iv,
                    ],
                )?;
                let confirm = ClientConfirm {
                    spec: self.core.spec().clone(),
                    server_id: hello.server_id,
                    confirmation: client_tag.to_vec(),
                };
                Some(confirm.encode())
            }
            _ => {
                if hello.auth.is_some() {
                    return Err(Error::WireFormat(
                        "unexpected authentication on unconfirmed handshake".into(),
                    ));
                }
                None
            }
        };

        self.core.set_server_iv(hello.server_iv);
        self.core.set_peer_id(hello.server_id);
        self.core.store_secret(merged, Some(&hello.server_iv))?;
        self.core.set_status(AgreementStatus::ResultAvailable);
        Ok(confirm)
    }

    fn accept_client_confirm(&mut self, message: &[u8]) -> Result<()> {
        self.core.check_status(AgreementStatus::AwaitingClientConfirm)?;
        let confirm = ClientConfirm::decode(message)?;
        self.core.ensure_spec(&confirm.spec)?;
        if confirm.server_id != self.core.session_id() {
            return Err(Error::spec_mismatch(
                format!("session id {:?}", self.core.session_id()),
                format!("session id {:?}", confirm.server_id),
            ));
        }

        let expected = self
            .expected_confirmation
            .take()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))?;
        if !auth::constant_time_eq(&expected, &confirm.confirmation) {
            return Err(self.reset_on_failure(Error::Authentication(
                AuthError::ConfirmationMismatch,
            )));
        }
        self.core.set_status(AgreementStatus::ResultAvailable);
        Ok(())
    }

    fn take_result(&mut self) -> Result<AgreementOutput> {
        let result = self.core.take_result()?;
        for child in &mut self.children {
            child.reset();
        }
        self.sent_transcript = None;
        self.expected_confirmation = None;
        Ok(result)
    }

    fn reset(&mut self) {
        for child in &mut self.children {
            child.reset();
        }
        self.sent_transcript = None;
        self.expected_confirmation = None;
        self.core.reset();
    }
}

fn signed_transcript(
    client_transcript: &[u8],
    client_iv: &[u8],
    server_transcript: &[u8],
    server_iv: &[u8],
) -> Vec<u8> {
    let mut message = Vec::with_capacity(
        client_transcript.len() + client_iv.len() + server_transcript.len() + server_iv.len(),
    );
    message.extend_from_slice(client_transcript);
    message.extend_from_slice(client_iv);
    message.extend_from_slice(server_transcript);
    message.extend_from_slice(server_iv);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_composite(children: Vec<KeyPairSpec>) -> CompositeAgreement {
        let spec = AgreementSpec::new(
            KeyPairSpec::Composite(children),
            AgreementKind::Basic,
            KdfAlgorithm::Sha512,
            false,
        )
        .unwrap();
        CompositeAgreement::new(spec, Some(1))
    }

    #[test]
    fn test_merged_secret_is_order_sensitive() {
        let share_a = Zeroizing::new(vec![0x11u8; 32]);
        let share_b = Zeroizing::new(vec![0x22u8; 32]);
        let client_iv = [0u8; 32];
        let server_iv = [1u8; 32];

        let mut forward = basic_composite(vec![KeyPairSpec::X25519, KeyPairSpec::P256]);
        forward.children[0].share = Some(share_a.clone());
        forward.children[1].share = Some(share_b.clone());
        let merged_forward = forward.merge_shares(&client_iv, Some(&server_iv)).unwrap();

        // Same shares, same init-vectors, swapped component order.
        let mut reversed = basic_composite(vec![KeyPairSpec::P256, KeyPairSpec::X25519]);
        reversed.children[0].share = Some(share_b);
        reversed.children[1].share = Some(share_a);
        let merged_reversed = reversed.merge_shares(&client_iv, Some(&server_iv)).unwrap();

        assert_eq!(merged_forward.len(), merged_reversed.len());
        assert_ne!(*merged_forward, *merged_reversed);
    }

    #[test]
    fn test_short_component_identity_is_an_error() {
        let key = KeyPair::generate(&KeyPairSpec::Composite(vec![KeyPairSpec::X25519])).unwrap();
        assert!(matches!(
            component_statics(Some(&key), 2),
            Err(Error::Crypto(CryptoError::KeyTypeMismatch))
        ));
        assert!(matches!(
            component_publics(Some(&key.public()), 2),
            Err(Error::Crypto(CryptoError::KeyTypeMismatch))
        ));
    }
}
