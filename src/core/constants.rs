/*!
Constants for the key-agreement protocol.

This module contains all protocol constants including nonce and secret
sizes, derivation labels, and per-algorithm key sizes.
*/

/// Protocol wire version
pub const VERSION: u8 = 0x01;

/// Maximum number of component algorithms in a composite key pair
pub const MAX_COMPOSITE_COMPONENTS: usize = 8;

/// Size constants for the protocol
pub mod sizes {
    /// Size of a party init-vector (nonce) in bytes
    pub const INIT_VECTOR: usize = 32;

    /// Size of a derived raw secret in bytes (512 bits)
    pub const RAW_SECRET: usize = 64;

    /// Size of a derived symmetric key in bytes
    pub const SYMMETRIC_KEY: usize = 32;

    /// Size of a derived key-set init-vector in bytes
    pub const KEY_SET_IV: usize = 32;

    /// Size of the XChaCha20-Poly1305 nonce in bytes
    pub const CIPHER_NONCE: usize = 24;

    /// Size of a confirmation tag (HMAC-SHA-256) in bytes
    pub const CONFIRM_TAG: usize = 32;

    /// Size of a derived confirmation key in bytes
    pub const CONFIRM_KEY: usize = 32;

    /// Size of the seed for the reseeded factory result
    pub const FACTORY_SEED: usize = 32;

    /// X25519 constants
    pub mod x25519 {
        /// Size of an X25519 public key in bytes
        pub const PUBLIC_KEY_BYTES: usize = 32;
    }

    /// NIST P-256 constants
    pub mod p256 {
        /// Size of an uncompressed SEC1 P-256 public key in bytes
        pub const PUBLIC_KEY_BYTES: usize = 65;
    }

    /// NIST P-384 constants
    pub mod p384 {
        /// Size of an uncompressed SEC1 P-384 public key in bytes
        pub const PUBLIC_KEY_BYTES: usize = 97;
    }

    /// CRYSTALS-Kyber constants
    pub mod kyber {
        /// Size of a Kyber768 public key in bytes
        pub const PUBLIC_KEY_BYTES: usize = 1184;

        /// Size of a Kyber768 ciphertext in bytes
        pub const CIPHERTEXT_BYTES: usize = 1088;

        /// Size of a Kyber shared secret in bytes
        pub const SHARED_SECRET_BYTES: usize = 32;
    }
}

/// Domain-separation labels for the derivation chains.
///
/// Each result type has its own fixed label so that the four result
/// shapes can never collide even when derived from the same raw secret.
pub mod labels {
    /// Raw 512-bit secret result
    pub const RAW_SECRET: &[u8] = b"hybrid-kex v1 raw secret";

    /// Seeded-factory security phrase
    pub const FACTORY_SEED: &[u8] = b"hybrid-kex v1 factory seed";

    /// Symmetric key-set result
    pub const KEY_SET: &[u8] = b"hybrid-kex v1 key set";

    /// Cipher-pair init-vector squeeze
    pub const CIPHER_IV: &[u8] = b"hybrid-kex v1 cipher iv";

    /// Confirmation MAC key
    pub const CONFIRM_KEY: &[u8] = b"hybrid-kex v1 confirm key";

    /// Per-component secret inside a composite agreement
    pub const COMPONENT_SECRET: &[u8] = b"hybrid-kex v1 component secret";
}

/// HKDF info string for the cipher-pair encryption key
pub const HKDF_INFO_CIPHER_KEY: &[u8] = b"hybrid-kex v1 cipher key";
