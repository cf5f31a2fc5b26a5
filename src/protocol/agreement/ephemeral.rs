/*!
Ephemeral agreement: fresh ephemeral key pairs per session, combined
with the long-term keys under the configured share-combination model,
with optional mutual key confirmation.

Confirmation tags are HMAC-SHA-256 over the four public-key encodings
under a key derived from the shared secret. The server tag and client
tag cover the same material in mirrored order, so neither can be
replayed as the other.
*/

use zeroize::Zeroizing;

use crate::core::crypto::keys::{combined_agreement, KeyPair, PublicKey, Role};
use crate::core::crypto::output::AgreementOutput;
use crate::core::crypto::{auth, derive};
use crate::core::error::{AuthError, CryptoError, Error, Result};
use crate::core::message::handshake::{ClientConfirm, ClientHello, HelloPayload, ServerAuth, ServerHello};
use crate::core::spec::{AgreementSpec, HandshakeVariant, ResultType};
use crate::protocol::agreement::{
    Agreement, AgreementCore, AgreementStatus, LocalIdentity, PeerIdentity,
};

/// State machine for the confirmed ephemeral shape
#[derive(Debug)]
pub(crate) struct EphemeralAgreement {
    core: AgreementCore,
    variant: HandshakeVariant,
    local_ephemeral: Option<KeyPair>,
    /// Client tag the server expects in the closing message
    expected_confirmation: Option<Vec<u8>>,
}

impl EphemeralAgreement {
    pub(crate) fn new(spec: AgreementSpec, variant: HandshakeVariant, session_id: u64) -> Self {
        Self {
            core: AgreementCore::new(spec, Some(session_id)),
            variant,
            local_ephemeral: None,
            expected_confirmation: None,
        }
    }

    fn with_confirm(&self) -> bool {
        self.core.spec().with_confirm()
    }

    fn fresh_ephemeral(&mut self) -> Result<&KeyPair> {
        let spec = self.core.spec().key_pair().clone();
        if self.local_ephemeral.is_none() {
            self.local_ephemeral = Some(KeyPair::generate(&spec)?);
        }
        self.local_ephemeral
            .as_ref()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))
    }

    fn reset_on_failure(&mut self, error: Error) -> Error {
        self.reset();
        error
    }
}

/// Tag material ordered for the given sender role: own static, peer
/// static, own ephemeral, peer ephemeral.
fn tag_parts<'a>(
    sender: Role,
    client_static: &'a [u8],
    server_static: &'a [u8],
    client_ephemeral: &'a [u8],
    server_ephemeral: &'a [u8],
) -> [&'a [u8]; 4] {
    match sender {
        Role::Server => [server_static, client_static, server_ephemeral, client_ephemeral],
        Role::Client => [client_static, server_static, client_ephemeral, server_ephemeral],
    }
}

impl Agreement for EphemeralAgreement {
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
        let ephemeral_public = self.fresh_ephemeral()?.public().encode();
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

        let local_static = local.key_pair()?;
        let peer_static = peer.public_key()?;
        let server_ephemeral = self.fresh_ephemeral()?.clone();

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

        let auth_field = if self.with_confirm() {
            let confirm_key = derive::confirmation_key(
                self.core.spec().kdf(),
                &raw,
                &hello.client_iv,
                &server_iv,
            );
            let server_static_enc = local_static.public().encode();
            let client_static_enc = peer_static.encode();
            let server_eph_enc = server_ephemeral.public().encode();

            let server_tag = auth::confirmation_tag(
                &confirm_key,
                &tag_parts(
                    Role::Server,
                    &client_static_enc,
                    &server_static_enc,
                    client_eph_bytes,
                    &server_eph_enc,
                ),
            )?;
            let client_tag = auth::confirmation_tag(
                &confirm_key,
                &tag_parts(
                    Role::Client,
                    &client_static_enc,
                    &server_static_enc,
                    client_eph_bytes,
                    &server_eph_enc,
                ),
            )?;
            self.expected_confirmation = Some(client_tag.to_vec());
            Some(ServerAuth::Confirmation(server_tag.to_vec()))
        } else {
            None
        };

        self.core.store_secret(raw, Some(&server_iv))?;

        let response = ServerHello {
            spec: self.core.spec().clone(),
            client_id: hello.client_id,
            server_id: self.core.session_id(),
            server_iv,
            payloads: vec![HelloPayload::Ephemeral(server_ephemeral.public().encode())],
            auth: auth_field,
        };

        if self.with_confirm() {
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

        let [HelloPayload::Ephemeral(server_eph_bytes)] = hello.payloads.as_slice() else {
            return Err(Error::WireFormat(
                "expected exactly one ephemeral payload".into(),
            ));
        };
        let key_spec = self.core.spec().key_pair().clone();
        let server_ephemeral = PublicKey::decode(&key_spec, server_eph_bytes)?;

        let local_static = local.key_pair()?;
        let peer_static = peer.public_key()?;
        let local_ephemeral = self
            .local_ephemeral
            .as_ref()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))?;

        let raw = combined_agreement(
            self.variant,
            Role::Client,
            local_static,
            local_ephemeral,
            peer_static,
            &server_ephemeral,
        )?;

        let client_iv = *self.core.client_iv()?;
        self.core.set_server_iv(hello.server_iv);
        self.core.set_peer_id(hello.server_id);

        let confirm = if self.with_confirm() {
            let Some(ServerAuth::Confirmation(server_tag)) = &hello.auth else {
                return Err(self.reset_on_failure(Error::Authentication(
                    AuthError::ConfirmationMismatch,
                )));
            };
            let confirm_key: Zeroizing<Vec<u8>> = derive::confirmation_key(
                self.core.spec().kdf(),
                &raw,
                &client_iv,
                &hello.server_iv,
            );
            let client_static_enc = local_static.public().encode();
            let server_static_enc = peer_static.encode();
            let client_eph_enc = local_ephemeral.public().encode();

            if let Err(error) = auth::verify_confirmation_tag(
                &confirm_key,
                &tag_parts(
                    Role::Server,
                    &client_static_enc,
                    &server_static_enc,
                    &client_eph_enc,
                    server_eph_bytes,
                ),
                server_tag,
            ) {
                return Err(self.reset_on_failure(error));
            }

            let client_tag = auth::confirmation_tag(
                &confirm_key,
                &tag_parts(
                    Role::Client,
                    &client_static_enc,
                    &server_static_enc,
                    &client_eph_enc,
                    server_eph_bytes,
                ),
            )?;
            let confirm = ClientConfirm {
                spec: self.core.spec().clone(),
                server_id: hello.server_id,
                confirmation: client_tag.to_vec(),
            };
            Some(confirm.encode())
        } else {
            if hello.auth.is_some() {
                return Err(Error::WireFormat(
                    "unexpected authentication on unconfirmed handshake".into(),
                ));
            }
            None
        };

        self.core.store_secret(raw, Some(&hello.server_iv))?;
        self.local_ephemeral = None;
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

        self.local_ephemeral = None;
        self.core.set_status(AgreementStatus::ResultAvailable);
        Ok(())
    }

    fn take_result(&mut self) -> Result<AgreementOutput> {
        let result = self.core.take_result()?;
        self.local_ephemeral = None;
        self.expected_confirmation = None;
        Ok(result)
    }

    fn reset(&mut self) {
        self.local_ephemeral = None;
        self.expected_confirmation = None;
        self.core.reset();
    }
}
