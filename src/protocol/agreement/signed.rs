/*!
Signed agreement: an ephemeral handshake whose server response carries a
detached signature instead of a confirmation tag.

The signature covers the client ephemeral key, the client init-vector,
the server ephemeral key, and the server init-vector, binding the
server's long-term signing identity to exactly this session.
*/

use crate::core::crypto::keys::{combined_agreement, KeyPair, PublicKey, Role};
use crate::core::crypto::output::AgreementOutput;
use crate::core::error::{AuthError, CryptoError, Error, Result};
use crate::core::message::handshake::{ClientHello, HelloPayload, ServerAuth, ServerHello};
use crate::core::spec::{AgreementSpec, HandshakeVariant, ResultType};
use crate::protocol::agreement::{
    Agreement, AgreementCore, AgreementStatus, LocalIdentity, PeerIdentity,
};

/// State machine for the signed ephemeral shape
#[derive(Debug)]
pub(crate) struct SignedAgreement {
    core: AgreementCore,
    variant: HandshakeVariant,
    local_ephemeral: Option<KeyPair>,
}

impl SignedAgreement {
    pub(crate) fn new(spec: AgreementSpec, variant: HandshakeVariant, session_id: u64) -> Self {
        Self {
            core: AgreementCore::new(spec, Some(session_id)),
            variant,
            local_ephemeral: None,
        }
    }
}

fn signed_transcript(
    client_ephemeral: &[u8],
    client_iv: &[u8],
    server_ephemeral: &[u8],
    server_iv: &[u8],
) -> Vec<u8> {
    let mut message =
        Vec::with_capacity(client_ephemeral.len() + client_iv.len() + server_ephemeral.len() + server_iv.len());
    message.extend_from_slice(client_ephemeral);
    message.extend_from_slice(client_iv);
    message.extend_from_slice(server_ephemeral);
    message.extend_from_slice(server_iv);
    message
}

impl Agreement for SignedAgreement {
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
        _peer: &PeerIdentity,
    ) -> Result<Vec<u8>> {
        self.core.check_status(AgreementStatus::Clean)?;
        let key_spec = self.core.spec().key_pair().clone();
        let ephemeral = KeyPair::generate(&key_spec)?;
        let ephemeral_public = ephemeral.public().encode();
        self.local_ephemeral = Some(ephemeral);

        let client_iv = self.core.new_client_iv();
        let hello = ClientHello {
            spec: self.core.spec().clone(),
            result_type: self.core.result_type(),
            client_id: self.core.session_id(),
            client_iv,
            payloads: vec![HelloPayload::Ephemeral(ephemeral_public)],
        };
        self.core.set_status(AgreementStatus::AwaitingServerHello);
        Ok(hello.encode())
    }

    fn accept_client_hello(
        &mut self,
        local: &LocalIdentity,
        peer: &PeerIdentity,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        self.core.check_status(AgreementStatus::Clean)?;
        let hello = ClientHello::decode(message)?;
        self.core.ensure_spec(&hello.spec)?;
        self.core.ensure_result_type(hello.result_type)?;

        let [HelloPayload::Ephemeral(client_eph_bytes)] = hello.payloads.as_slice() else {
            return Err(Error::WireFormat(
                "expected exactly one ephemeral payload".into(),
            ));
        };
        let key_spec = self.core.spec().key_pair().clone();
        let client_ephemeral = PublicKey::decode(&key_spec, client_eph_bytes)?;

        let signer = local.signer()?;
        let local_static = local.key_pair()?;
        let peer_static = peer.public_key()?;
        let server_ephemeral = KeyPair::generate(&key_spec)?;

        let raw = combined_agreement(
            self.variant,
            Role::Server,
            local_static,
            &server_ephemeral,
            peer_static,
            &client_ephemeral,
        )?;

        self.core.set_client_iv(hello.client_iv);
        self.core.set_peer_id(hello.client_id);
        let server_iv = self.core.new_server_iv();

        let server_eph_enc = server_ephemeral.public().encode();
        let transcript =
            signed_transcript(client_eph_bytes, &hello.client_iv, &server_eph_enc, &server_iv);
        let signature = signer.sign(&transcript);

        self.core.store_secret(raw, Some(&server_iv))?;

        let response = ServerHello {
            spec: self.core.spec().clone(),
            client_id: hello.client_id,
            server_id: self.core.session_id(),
            server_iv,
            payloads: vec![HelloPayload::Ephemeral(server_eph_enc)],
            auth: Some(ServerAuth::Signature {
                algorithm: signer.algorithm(),
                signature,
            }),
        };
        self.core.set_status(AgreementStatus::ResultAvailable);
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

        let [HelloPayload::Ephemeral(server_eph_bytes)] = hello.payloads.as_slice() else {
            return Err(Error::WireFormat(
                "expected exactly one ephemeral payload".into(),
            ));
        };
        let Some(ServerAuth::Signature {
            algorithm,
            signature,
        }) = &hello.auth
        else {
            self.reset();
            return Err(Error::Authentication(
                AuthError::SignatureVerificationFailed,
            ));
        };

        let local_ephemeral = self
            .local_ephemeral
            .as_ref()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))?;
        let client_eph_enc = local_ephemeral.public().encode();
        let client_iv = *self.core.client_iv()?;

        let transcript =
            signed_transcript(&client_eph_enc, &client_iv, server_eph_bytes, &hello.server_iv);
        if let Err(error) = peer.verifier()?.verify(*algorithm, &transcript, signature) {
            self.reset();
            return Err(error);
        }

        let key_spec = self.core.spec().key_pair().clone();
        let server_ephemeral = PublicKey::decode(&key_spec, server_eph_bytes)?;
        let raw = combined_agreement(
            self.variant,
            Role::Client,
            local.key_pair()?,
            local_ephemeral,
            peer.public_key()?,
            &server_ephemeral,
        )?;

        self.core.set_server_iv(hello.server_iv);
        self.core.set_peer_id(hello.server_id);
        self.core.store_secret(raw, Some(&hello.server_iv))?;
        self.local_ephemeral = None;
        self.core.set_status(AgreementStatus::ResultAvailable);
        Ok(None)
    }

    fn accept_client_confirm(&mut self, _message: &[u8]) -> Result<()> {
        Err(Error::invalid_state(
            AgreementStatus::AwaitingClientConfirm.to_string(),
            self.core.status().to_string(),
        ))
    }

    fn take_result(&mut self) -> Result<AgreementOutput> {
        let result = self.core.take_result()?;
        self.local_ephemeral = None;
        Ok(result)
    }

    fn reset(&mut self) {
        self.local_ephemeral = None;
        self.core.reset();
    }
}
