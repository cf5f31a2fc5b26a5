//! Core components of the key-agreement engine.
//!
//! This module contains the building blocks the protocol layer is made of:
//! algorithm specifications, the wire-identifier registry, cryptographic
//! primitives, message formats, and error handling.

// Agreement and key-pair specifications
pub mod spec;

// Wire identifier registry
pub mod registry;

// Cryptographic primitives
pub mod crypto;

// Wire message handling
pub mod message;

// Protocol constants
pub mod constants;

// Error handling
pub mod error;

// Re-exports for convenience
pub use self::constants::VERSION;
pub use self::error::{AuthError, CryptoError, Error, Result};
pub use self::spec::{AgreementKind, AgreementSpec, KeyPairSpec, ResultType};
