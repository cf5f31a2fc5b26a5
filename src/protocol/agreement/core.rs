/*!
State shared by every agreement shape: lifecycle status, session
identifiers, init-vectors, and the derived result.
*/

use rand::RngCore;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::core::constants::sizes;
use crate::core::crypto::derive;
use crate::core::crypto::output::AgreementOutput;
use crate::core::error::{CryptoError, Error, Result};
use crate::core::spec::{AgreementSpec, ResultType};
use crate::protocol::agreement::AgreementStatus;

/// Shared state machine core embedded in every agreement shape
#[derive(Debug)]
pub(crate) struct AgreementCore {
    spec: AgreementSpec,
    result_type: ResultType,
    status: AgreementStatus,
    session_id: Option<u64>,
    peer_id: Option<u64>,
    client_iv: Option<[u8; sizes::INIT_VECTOR]>,
    server_iv: Option<[u8; sizes::INIT_VECTOR]>,
    result: Option<AgreementOutput>,
}

impl AgreementCore {
    pub(crate) fn new(spec: AgreementSpec, session_id: Option<u64>) -> Self {
        Self {
            spec,
            result_type: ResultType::default(),
            status: AgreementStatus::Clean,
            session_id,
            peer_id: None,
            client_iv: None,
            server_iv: None,
            result: None,
        }
    }

    pub(crate) fn spec(&self) -> &AgreementSpec {
        &self.spec
    }

    pub(crate) fn status(&self) -> AgreementStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: AgreementStatus) {
        debug!(session_id = ?self.session_id, from = %self.status, to = %status, "status transition");
        self.status = status;
    }

    /// Reject a message arriving in the wrong lifecycle position
    pub(crate) fn check_status(&self, expected: AgreementStatus) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(Error::invalid_state(expected.to_string(), self.status.to_string()))
        }
    }

    pub(crate) fn result_type(&self) -> ResultType {
        self.result_type
    }

    /// Result shape can only change while no handshake is in flight
    pub(crate) fn set_result_type(&mut self, result_type: ResultType) -> Result<()> {
        self.check_status(AgreementStatus::Clean)?;
        self.result_type = result_type;
        Ok(())
    }

    pub(crate) fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    pub(crate) fn peer_id(&self) -> Option<u64> {
        self.peer_id
    }

    pub(crate) fn set_peer_id(&mut self, peer_id: Option<u64>) {
        self.peer_id = peer_id;
    }

    /// Mint the client init-vector once per handshake
    pub(crate) fn new_client_iv(&mut self) -> [u8; sizes::INIT_VECTOR] {
        *self.client_iv.get_or_insert_with(fresh_iv)
    }

    /// Mint the server init-vector once per handshake
    pub(crate) fn new_server_iv(&mut self) -> [u8; sizes::INIT_VECTOR] {
        *self.server_iv.get_or_insert_with(fresh_iv)
    }

    pub(crate) fn set_client_iv(&mut self, iv: [u8; sizes::INIT_VECTOR]) {
        self.client_iv = Some(iv);
    }

    pub(crate) fn set_server_iv(&mut self, iv: [u8; sizes::INIT_VECTOR]) {
        self.server_iv = Some(iv);
    }

    pub(crate) fn client_iv(&self) -> Result<&[u8; sizes::INIT_VECTOR]> {
        self.client_iv
            .as_ref()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))
    }

    pub(crate) fn server_iv(&self) -> Result<&[u8; sizes::INIT_VECTOR]> {
        self.server_iv
            .as_ref()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))
    }

    /// Derive and store the configured result shape from the raw secret.
    ///
    /// The raw buffer is consumed and wiped; the caller sets the final
    /// status separately.
    pub(crate) fn store_secret(
        &mut self,
        raw: Zeroizing<Vec<u8>>,
        server_iv: Option<&[u8]>,
    ) -> Result<()> {
        let client_iv = *self.client_iv()?;
        let output = derive::derive_result(
            self.spec.kdf(),
            &raw,
            &client_iv,
            server_iv,
            self.result_type,
        )?;
        self.result = Some(output);
        Ok(())
    }

    /// Take the derived result and reset for the next handshake
    pub(crate) fn take_result(&mut self) -> Result<AgreementOutput> {
        self.check_status(AgreementStatus::ResultAvailable)?;
        let result = self
            .result
            .take()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))?;
        self.reset();
        Ok(result)
    }

    /// Wipe all per-handshake state. The session identifier survives.
    pub(crate) fn reset(&mut self) {
        if let Some(iv) = self.client_iv.as_mut() {
            iv.zeroize();
        }
        if let Some(iv) = self.server_iv.as_mut() {
            iv.zeroize();
        }
        self.client_iv = None;
        self.server_iv = None;
        self.peer_id = None;
        self.result = None;
        self.status = AgreementStatus::Clean;
    }

    /// Reject a decoded message carrying a different specification
    pub(crate) fn ensure_spec(&self, decoded: &AgreementSpec) -> Result<()> {
        if *decoded == self.spec {
            Ok(())
        } else {
            Err(Error::spec_mismatch(
                self.spec.to_string(),
                decoded.to_string(),
            ))
        }
    }

    /// Reject a decoded message echoing a different result type
    pub(crate) fn ensure_result_type(&self, decoded: ResultType) -> Result<()> {
        if decoded == self.result_type {
            Ok(())
        } else {
            Err(Error::spec_mismatch(
                self.result_type.to_string(),
                decoded.to_string(),
            ))
        }
    }

    /// Reject a response echoing the wrong session identifier
    pub(crate) fn ensure_echoed_id(&self, echoed: Option<u64>) -> Result<()> {
        if echoed == self.session_id {
            Ok(())
        } else {
            Err(Error::spec_mismatch(
                format!("session id {:?}", self.session_id),
                format!("session id {:?}", echoed),
            ))
        }
    }
}

fn fresh_iv() -> [u8; sizes::INIT_VECTOR] {
    let mut iv = [0u8; sizes::INIT_VECTOR];
    rand::rng().fill_bytes(&mut iv);
    iv
}
