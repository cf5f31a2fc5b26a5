/*!
One-message agreements: KEM encapsulation and anonymous Diffie-Hellman
toward a known public key.

The client completes immediately after sending; the server completes on
receipt and never answers. No session identifiers travel on the wire.
*/

use crate::core::crypto::keys::{self, KeyPair, PublicKey};
use crate::core::crypto::output::AgreementOutput;
use crate::core::error::{Error, Result};
use crate::core::message::handshake::{HelloPayload, KemRequest};
use crate::core::spec::{AgreementKind, AgreementSpec, ResultType};
use crate::protocol::agreement::{
    Agreement, AgreementCore, AgreementStatus, LocalIdentity, PeerIdentity,
};

/// State machine for the KEM and anonymous one-message shapes
#[derive(Debug)]
pub(crate) struct OneMessageAgreement {
    core: AgreementCore,
}

impl OneMessageAgreement {
    pub(crate) fn new(spec: AgreementSpec) -> Self {
        Self {
            core: AgreementCore::new(spec, None),
        }
    }
}

impl Agreement for OneMessageAgreement {
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
        let peer_key = peer.public_key()?;

        let (raw, payload) = match self.core.spec().kind() {
            AgreementKind::Kem => {
                let (shared, ciphertext) = keys::encapsulate(peer_key)?;
                (shared, HelloPayload::Encapsulated(ciphertext))
            }
            _ => {
                // Anonymous: a throwaway ephemeral key agrees with the
                // peer's long-term key.
                let ephemeral = KeyPair::generate(&peer_key.spec())?;
                let shared = ephemeral.agree(peer_key)?;
                (shared, HelloPayload::Ephemeral(ephemeral.public().encode()))
            }
        };

        let client_iv = self.core.new_client_iv();
        let request = KemRequest {
            spec: self.core.spec().clone(),
            result_type: self.core.result_type(),
            client_iv,
            payloads: vec![payload],
        };

        self.core.store_secret(raw, None)?;
        self.core.set_status(AgreementStatus::ResultAvailable);
        Ok(request.encode())
    }

    fn accept_client_hello(
        &mut self,
        local: &LocalIdentity,
        _peer: &PeerIdentity,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        self.core.check_status(AgreementStatus::Clean)?;
        let request = KemRequest::decode(message)?;
        self.core.ensure_spec(&request.spec)?;
        self.core.ensure_result_type(request.result_type)?;

        let [payload] = request.payloads.as_slice() else {
            return Err(Error::WireFormat(format!(
                "expected one payload, found {}",
                request.payloads.len()
            )));
        };
        let key_pair = local.key_pair()?;
        let raw = match payload {
            HelloPayload::Encapsulated(ciphertext) => key_pair.decapsulate(ciphertext)?,
            HelloPayload::Ephemeral(encoded) => {
                let peer_ephemeral = PublicKey::decode(&key_pair.spec(), encoded)?;
                key_pair.agree(&peer_ephemeral)?
            }
        };

        self.core.set_client_iv(request.client_iv);
        self.core.store_secret(raw, None)?;
        self.core.set_status(AgreementStatus::ResultAvailable);
        Ok(None)
    }

    fn accept_server_hello(
        &mut self,
        _local: &LocalIdentity,
        _peer: &PeerIdentity,
        _message: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        // This flow has no server response.
        Err(Error::invalid_state(
            AgreementStatus::Clean.to_string(),
            self.core.status().to_string(),
        ))
    }

    fn accept_client_confirm(&mut self, _message: &[u8]) -> Result<()> {
        Err(Error::invalid_state(
            AgreementStatus::Clean.to_string(),
            self.core.status().to_string(),
        ))
    }

    fn take_result(&mut self) -> Result<AgreementOutput> {
        self.core.take_result()
    }

    fn reset(&mut self) {
        self.core.reset();
    }
}
