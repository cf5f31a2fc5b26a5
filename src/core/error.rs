/*!
Error handling for the key-agreement protocol.

The taxonomy separates "this handshake failed" conditions (authentication,
wire format, spec mismatch) from "this is a usage bug" conditions (calls
made outside their legal status, structurally invalid specifications).
Cryptographic failures carry limited detail to avoid leaking information.
*/

use std::fmt;
use thiserror::Error;

/// Result type for the key-agreement protocol
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the key-agreement protocol
#[derive(Error, Debug)]
pub enum Error {
    /// Call made outside its legal protocol status; the session must be
    /// abandoned or reset
    #[error("agreement not in correct status: expected {expected}, but was {actual}")]
    InvalidState {
        expected: String,
        actual: String,
    },

    /// Malformed, truncated, or mistyped message bytes
    #[error("malformed wire message: {0}")]
    WireFormat(String),

    /// Decoded algorithm or result identifier does not match the locally
    /// expected specification
    #[error("specification mismatch: expected {expected}, received {actual}")]
    SpecMismatch {
        expected: String,
        actual: String,
    },

    /// Requested agreement/result/key-pair combination is not structurally
    /// valid; raised before any key material is touched
    #[error("unsupported specification: {0}")]
    UnsupportedSpec(String),

    /// Authentication failure (limited details for security)
    #[error("authentication failed")]
    Authentication(#[source] AuthError),

    /// Cryptographic failure (limited details for security)
    #[error("cryptographic operation failed")]
    Crypto(#[source] CryptoError),
}

impl Error {
    /// Build an `InvalidState` error from the expected and actual status
    pub fn invalid_state(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Error::InvalidState {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Build a `SpecMismatch` error from the expected and received values
    pub fn spec_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Error::SpecMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Authentication errors with limited details to prevent leaking information
#[derive(Error, Debug)]
pub enum AuthError {
    /// Confirmation MAC tag mismatch
    #[error("confirmation tag mismatch")]
    ConfirmationMismatch,

    /// Signature verification failed
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Signature algorithm on the wire does not match the verification key
    #[error("signature algorithm mismatch")]
    SignatureAlgorithmMismatch,

    /// Missing verification key
    #[error("verification key not available")]
    MissingVerificationKey,

    /// Missing signing key
    #[error("signing key not available")]
    MissingSigningKey,

    /// Invalid key or signature format
    #[error("invalid key format")]
    InvalidKeyFormat,
}

/// Cryptographic errors with limited details to prevent leaking information
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// Invalid key format
    #[error("invalid key format")]
    InvalidKeyFormat,

    /// Key material does not belong to the expected algorithm family
    #[error("key type mismatch")]
    KeyTypeMismatch,

    /// Key encapsulation failed
    #[error("key encapsulation failed")]
    EncapsulationFailed,

    /// Key decapsulation failed
    #[error("key decapsulation failed")]
    DecapsulationFailed,

    /// Required key material is not present
    #[error("key material not available")]
    MissingKeyMaterial,

    /// Encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// Decryption failed
    #[error("decryption failed")]
    DecryptionFailed,

    /// Generic cryptographic operation error
    #[error("cryptographic operation failed")]
    OperationFailed,
}
