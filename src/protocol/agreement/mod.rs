/*!
Agreement state machines.

Every handshake shape implements the [`Agreement`] trait over the same
message-driven state machine: the caller feeds in wire bytes, receives
wire bytes to send, and finally takes the derived result. Feeding a
message into the wrong state is rejected without touching key material.
*/

use std::fmt;

use crate::core::crypto::{KeyPair, PublicKey, SigningKeyPair, VerifyingKey};
use crate::core::crypto::output::AgreementOutput;
use crate::core::error::{AuthError, CryptoError, Error, Result};
use crate::core::spec::{AgreementSpec, ResultType};

mod core;

// One-message flows
mod anonymous;

// Round-trip flows
mod basic;
mod composite;
mod ephemeral;
mod signed;

pub(crate) use self::core::AgreementCore;
pub(crate) use anonymous::OneMessageAgreement;
pub(crate) use basic::BasicAgreement;
pub(crate) use composite::CompositeAgreement;
pub(crate) use ephemeral::EphemeralAgreement;
pub(crate) use signed::SignedAgreement;

/// Lifecycle position of an agreement state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgreementStatus {
    /// Ready to start a handshake
    Clean,
    /// Client sent its hello and waits for the server response
    AwaitingServerHello,
    /// Server answered a confirmed handshake and waits for the client tag
    AwaitingClientConfirm,
    /// The handshake completed and the result can be taken
    ResultAvailable,
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgreementStatus::Clean => write!(f, "CLEAN"),
            AgreementStatus::AwaitingServerHello => write!(f, "AWAITING_SERVER_HELLO"),
            AgreementStatus::AwaitingClientConfirm => write!(f, "AWAITING_CLIENT_CONFIRM"),
            AgreementStatus::ResultAvailable => write!(f, "RESULT_AVAILABLE"),
        }
    }
}

/// Local key material for one endpoint.
///
/// Anonymous flows carry no key pair at all; signed flows additionally
/// carry a signing key on the server side.
#[derive(Debug)]
pub struct LocalIdentity {
    key_pair: Option<KeyPair>,
    signer: Option<SigningKeyPair>,
}

impl LocalIdentity {
    /// Identity without any long-term key material
    pub fn anonymous() -> Self {
        Self {
            key_pair: None,
            signer: None,
        }
    }

    /// Identity holding a long-term key pair
    pub fn new(key_pair: KeyPair) -> Self {
        Self {
            key_pair: Some(key_pair),
            signer: None,
        }
    }

    /// Identity holding a long-term key pair and a signing key
    pub fn with_signer(key_pair: KeyPair, signer: SigningKeyPair) -> Self {
        Self {
            key_pair: Some(key_pair),
            signer: Some(signer),
        }
    }

    pub(crate) fn key_pair(&self) -> Result<&KeyPair> {
        self.key_pair
            .as_ref()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))
    }

    pub(crate) fn signer(&self) -> Result<&SigningKeyPair> {
        self.signer
            .as_ref()
            .ok_or(Error::Authentication(AuthError::MissingSigningKey))
    }
}

/// Peer key material known to one endpoint.
///
/// The server side of an ephemeral handshake learns nothing about an
/// anonymous peer; the client side of a signed handshake must hold the
/// server's verification key.
#[derive(Debug)]
pub struct PeerIdentity {
    public_key: Option<PublicKey>,
    verifier: Option<VerifyingKey>,
}

impl PeerIdentity {
    /// No knowledge about the peer
    pub fn unknown() -> Self {
        Self {
            public_key: None,
            verifier: None,
        }
    }

    /// Peer known by its long-term public key
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key: Some(public_key),
            verifier: None,
        }
    }

    /// Peer known by its long-term public key and verification key
    pub fn with_verifier(public_key: PublicKey, verifier: VerifyingKey) -> Self {
        Self {
            public_key: Some(public_key),
            verifier: Some(verifier),
        }
    }

    pub(crate) fn public_key(&self) -> Result<&PublicKey> {
        self.public_key
            .as_ref()
            .ok_or(Error::Crypto(CryptoError::MissingKeyMaterial))
    }

    pub(crate) fn verifier(&self) -> Result<&VerifyingKey> {
        self.verifier
            .as_ref()
            .ok_or(Error::Authentication(AuthError::MissingVerificationKey))
    }
}

/// A message-driven key-agreement state machine.
///
/// Clients call `create_client_hello`, feed the server response into
/// `accept_server_hello`, send back whatever bytes that returns, and take
/// the result. Servers feed incoming messages into `accept_client_hello`
/// and, for confirmed handshakes, `accept_client_confirm`.
pub trait Agreement {
    /// Specification this agreement was created for
    fn spec(&self) -> &AgreementSpec;

    /// Current lifecycle position
    fn status(&self) -> AgreementStatus;

    /// Result shape this agreement will derive
    fn result_type(&self) -> ResultType;

    /// Change the result shape. Allowed only before the handshake starts.
    fn set_result_type(&mut self, result_type: ResultType) -> Result<()>;

    /// Open the handshake as the client, producing the bytes to send
    fn create_client_hello(
        &mut self,
        local: &LocalIdentity,
        peer: &PeerIdentity,
    ) -> Result<Vec<u8>>;

    /// Process a client opening message as the server. Returns the
    /// response bytes, or `None` for one-message flows.
    fn accept_client_hello(
        &mut self,
        local: &LocalIdentity,
        peer: &PeerIdentity,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>>;

    /// Process the server response as the client. Returns the closing
    /// confirmation bytes when the handshake requires them.
    fn accept_server_hello(
        &mut self,
        local: &LocalIdentity,
        peer: &PeerIdentity,
        message: &[u8],
    ) -> Result<Option<Vec<u8>>>;

    /// Process the client confirmation as the server
    fn accept_client_confirm(&mut self, message: &[u8]) -> Result<()>;

    /// Take the derived result, resetting the machine for reuse
    fn take_result(&mut self) -> Result<AgreementOutput>;

    /// Abandon any progress and return to the clean state
    fn reset(&mut self);
}
