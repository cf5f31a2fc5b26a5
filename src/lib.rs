/*!
# hybrid-kex

A message-driven key-agreement engine supporting classical, post-quantum,
and composite (hybrid) algorithms behind one state-machine interface.

## Features

- **Handshake shapes**: one-message KEM and anonymous flows, a basic
  static-static round trip, and ephemeral handshakes with optional mutual
  confirmation or a signed server response
- **Share-combination models**: unified, MQV-style, and SM2-style
  orderings of the Diffie-Hellman shares
- **Composite agreements**: several component algorithms handshaking in
  lock-step inside one exchange, secure as long as any one component holds
- **Result shapes**: raw 512-bit secret, reseeded deterministic factory,
  symmetric key-set, or an initialized XChaCha20-Poly1305 cipher pair

## Example

```no_run
use hybrid_kex::core::spec::{AgreementKind, AgreementSpec, HandshakeVariant, KdfAlgorithm, KeyPairSpec};
use hybrid_kex::core::crypto::KeyPair;
use hybrid_kex::protocol::{Agreement, AgreementFactory, LocalIdentity, PeerIdentity};

fn main() -> hybrid_kex::Result<()> {
    let spec = AgreementSpec::new(
        KeyPairSpec::X25519,
        AgreementKind::Ephemeral(HandshakeVariant::Unified),
        KdfAlgorithm::Sha256,
        true,
    )?;

    let client_key = KeyPair::generate(&KeyPairSpec::X25519)?;
    let server_key = KeyPair::generate(&KeyPairSpec::X25519)?;

    let factory = AgreementFactory::new();
    let mut client = factory.create_agreement(&spec)?;
    let mut server = factory.create_agreement(&spec)?;

    let client_identity = LocalIdentity::new(client_key.clone());
    let server_identity = LocalIdentity::new(server_key.clone());
    let client_view_of_server = PeerIdentity::new(server_key.public());
    let server_view_of_client = PeerIdentity::new(client_key.public());

    let hello = client.create_client_hello(&client_identity, &client_view_of_server)?;
    let response = server
        .accept_client_hello(&server_identity, &server_view_of_client, &hello)?
        .expect("round-trip handshake always answers");
    let confirm = client
        .accept_server_hello(&client_identity, &client_view_of_server, &response)?
        .expect("confirmed handshake closes with a confirmation");
    server.accept_client_confirm(&confirm)?;

    let client_result = client.take_result()?;
    let server_result = server.take_result()?;
    assert_eq!(client_result.result_type(), server_result.result_type());
    Ok(())
}
```
*/

// Core building blocks: specs, registry, crypto, messages, errors
pub mod core;

// Protocol layer: agreement state machines and their factory
pub mod protocol;

// Re-export the common surface at the crate root
pub use crate::core::constants::VERSION;
pub use crate::core::crypto::{
    AgreementOutput, CipherPair, KeyPair, KeySet, PublicKey, Role, SecretBytes, SeededFactory,
    SigningKeyPair, VerifyingKey,
};
pub use crate::core::error::{AuthError, CryptoError, Error, Result};
pub use crate::core::spec::{
    AgreementKind, AgreementSpec, HandshakeVariant, KdfAlgorithm, KeyPairSpec, ResultType,
    SignatureAlgorithm,
};
pub use crate::protocol::{
    Agreement, AgreementFactory, AgreementStatus, LocalIdentity, PeerIdentity,
};
