/*!
Basic agreement: one round trip over the long-term key pairs only.

Neither side contributes ephemeral keys; the round trip exists to
exchange init-vectors and session identifiers, so the derived secret is
fresh per session even though the raw agreement is static.
*/

use crate::core::crypto::output::AgreementOutput;
use crate::core::error::{Error, Result};
use crate::core::message::handshake::{ClientHello, ServerHello};
use crate::core::spec::{AgreementSpec, ResultType};
use crate::protocol::agreement::{
    Agreement, AgreementCore, AgreementStatus, LocalIdentity, PeerIdentity,
};

/// State machine for the basic static-static shape
#[derive(Debug)]
pub(crate) struct BasicAgreement {
    core: AgreementCore,
}

impl BasicAgreement {
    pub(crate) fn new(spec: AgreementSpec, session_id: u64) -> Self {
        Self {
            core: AgreementCore::new(spec, Some(session_id)),
        }
    }
}

impl Agreement for BasicAgreement {
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
        let client_iv = self.core.new_client_iv();
        let hello = ClientHello {
            spec: self.core.spec().clone(),
            result_type: self.core.result_type(),
            client_id: self.core.session_id(),
            client_iv,
            payloads: vec![],
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
        if !hello.payloads.is_empty() {
            return Err(Error::WireFormat(
                "basic agreement carries no key payloads".into(),
            ));
        }

        self.core.set_client_iv(hello.client_iv);
        self.core.set_peer_id(hello.client_id);
        let server_iv = self.core.new_server_iv();

        let raw = local.key_pair()?.agree(peer.public_key()?)?;
        self.core.store_secret(raw, Some(&server_iv))?;

        let response = ServerHello {
            spec: self.core.spec().clone(),
            client_id: hello.client_id,
            server_id: self.core.session_id(),
            server_iv,
            payloads: vec![],
            auth: None,
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
        if hello.auth.is_some() {
            return Err(Error::WireFormat(
                "basic agreement carries no authentication".into(),
            ));
        }

        self.core.set_server_iv(hello.server_iv);
        self.core.set_peer_id(hello.server_id);

        let raw = local.key_pair()?.agree(peer.public_key()?)?;
        self.core.store_secret(raw, Some(&hello.server_iv))?;
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
        self.core.take_result()
    }

    fn reset(&mut self) {
        self.core.reset();
    }
}
