/*!
Cryptographic primitives for the key-agreement engine.

This module wraps the asymmetric and symmetric primitives the protocol
consumes: key-pair generation and raw agreement, signatures and
confirmation MACs, the secret-derivation engine, and the result shapes.
*/

// Key pairs, raw agreement, and encapsulation
pub mod keys;

// Signatures and confirmation tags
pub mod auth;

// Secret derivation engine
pub mod derive;

// Agreement result shapes
pub mod output;

// Re-export frequently used types
pub use auth::{SigningKeyPair, VerifyingKey};
pub use keys::{KeyPair, PublicKey, Role};
pub use output::{AgreementOutput, CipherPair, KeySet, SecretBytes, SeededFactory};
