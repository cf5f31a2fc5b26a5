/*!
Integration tests for the simple-family handshake flows.
*/

use hybrid_kex::{
    Agreement, AgreementFactory, AgreementKind, AgreementOutput, AgreementSpec, AgreementStatus,
    AuthError, Error, HandshakeVariant, KdfAlgorithm, KeyPair, KeyPairSpec, LocalIdentity,
    PeerIdentity, ResultType, SignatureAlgorithm, SigningKeyPair,
};

struct Endpoints {
    client_local: LocalIdentity,
    client_peer: PeerIdentity,
    server_local: LocalIdentity,
    server_peer: PeerIdentity,
}

fn endpoints(key_pair: &KeyPairSpec) -> Endpoints {
    let client_key = KeyPair::generate(key_pair).unwrap();
    let server_key = KeyPair::generate(key_pair).unwrap();
    Endpoints {
        client_local: LocalIdentity::new(client_key.clone()),
        client_peer: PeerIdentity::new(server_key.public()),
        server_local: LocalIdentity::new(server_key),
        server_peer: PeerIdentity::new(client_key.public()),
    }
}

fn signed_endpoints(key_pair: &KeyPairSpec, algorithm: SignatureAlgorithm) -> Endpoints {
    let client_key = KeyPair::generate(key_pair).unwrap();
    let server_key = KeyPair::generate(key_pair).unwrap();
    let signer = SigningKeyPair::generate(algorithm);
    let verifier = signer.verifying_key();
    Endpoints {
        client_local: LocalIdentity::new(client_key.clone()),
        client_peer: PeerIdentity::with_verifier(server_key.public(), verifier),
        server_local: LocalIdentity::with_signer(server_key, signer),
        server_peer: PeerIdentity::new(client_key.public()),
    }
}

/// Drive a full exchange and return both raw secrets.
fn run_handshake(spec: &AgreementSpec, ends: &Endpoints) -> ([u8; 64], [u8; 64]) {
    let factory = AgreementFactory::new();
    let mut client = factory.create_agreement(spec).unwrap();
    let mut server = factory.create_agreement(spec).unwrap();

    let hello = client
        .create_client_hello(&ends.client_local, &ends.client_peer)
        .unwrap();

    if spec.kind().is_one_message() {
        assert_eq!(client.status(), AgreementStatus::ResultAvailable);
        assert!(server
            .accept_client_hello(&ends.server_local, &ends.server_peer, &hello)
            .unwrap()
            .is_none());
    } else {
        let response = server
            .accept_client_hello(&ends.server_local, &ends.server_peer, &hello)
            .unwrap()
            .expect("round-trip flow answers");
        let confirm = client
            .accept_server_hello(&ends.client_local, &ends.client_peer, &response)
            .unwrap();
        match confirm {
            Some(confirm) => {
                assert_eq!(server.status(), AgreementStatus::AwaitingClientConfirm);
                server.accept_client_confirm(&confirm).unwrap();
            }
            None => assert!(!spec.with_confirm()),
        }
    }

    assert_eq!(client.status(), AgreementStatus::ResultAvailable);
    assert_eq!(server.status(), AgreementStatus::ResultAvailable);

    let client_secret = take_raw_secret(client.as_mut());
    let server_secret = take_raw_secret(server.as_mut());
    (client_secret, server_secret)
}

fn take_raw_secret(agreement: &mut dyn Agreement) -> [u8; 64] {
    match agreement.take_result().unwrap() {
        AgreementOutput::RawSecret(secret) => *secret.as_bytes(),
        other => panic!("expected raw secret, got {:?}", other),
    }
}

#[test]
fn test_kem_one_message_flow() {
    let spec = AgreementSpec::new(
        KeyPairSpec::Kyber768,
        AgreementKind::Kem,
        KdfAlgorithm::Sha512,
        false,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::Kyber768);
    let (client, server) = run_handshake(&spec, &ends);
    assert_eq!(client, server);
}

#[test]
fn test_anonymous_one_message_flow() {
    let spec = AgreementSpec::new(
        KeyPairSpec::X25519,
        AgreementKind::Anonymous,
        KdfAlgorithm::Sha256,
        false,
    )
    .unwrap();

    // The anonymous client needs no key material of its own.
    let server_key = KeyPair::generate(&KeyPairSpec::X25519).unwrap();
    let ends = Endpoints {
        client_local: LocalIdentity::anonymous(),
        client_peer: PeerIdentity::new(server_key.public()),
        server_local: LocalIdentity::new(server_key),
        server_peer: PeerIdentity::unknown(),
    };
    let (client, server) = run_handshake(&spec, &ends);
    assert_eq!(client, server);
}

#[test]
fn test_basic_round_trip() {
    for key_pair in [KeyPairSpec::X25519, KeyPairSpec::P256] {
        let spec =
            AgreementSpec::new(key_pair.clone(), AgreementKind::Basic, KdfAlgorithm::Sha256, false)
                .unwrap();
        let ends = endpoints(&key_pair);
        let (client, server) = run_handshake(&spec, &ends);
        assert_eq!(client, server, "basic flow for {}", key_pair);
    }
}

#[test]
fn test_ephemeral_all_variants() {
    for variant in [
        HandshakeVariant::Unified,
        HandshakeVariant::Mqv,
        HandshakeVariant::Sm2,
    ] {
        let spec = AgreementSpec::new(
            KeyPairSpec::X25519,
            AgreementKind::Ephemeral(variant),
            KdfAlgorithm::Sha256,
            false,
        )
        .unwrap();
        let ends = endpoints(&KeyPairSpec::X25519);
        let (client, server) = run_handshake(&spec, &ends);
        assert_eq!(client, server, "ephemeral flow for {}", variant);
    }
}

#[test]
fn test_ephemeral_with_confirmation() {
    let spec = AgreementSpec::new(
        KeyPairSpec::P256,
        AgreementKind::Ephemeral(HandshakeVariant::Unified),
        KdfAlgorithm::Sha256,
        true,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::P256);
    let (client, server) = run_handshake(&spec, &ends);
    assert_eq!(client, server);
}

#[test]
fn test_p384_sha512_handshake() {
    let spec = AgreementSpec::new(
        KeyPairSpec::P384,
        AgreementKind::Ephemeral(HandshakeVariant::Mqv),
        KdfAlgorithm::Sha512,
        true,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::P384);
    let (client, server) = run_handshake(&spec, &ends);
    assert_eq!(client, server);
}

#[test]
fn test_signed_handshake_both_algorithms() {
    for algorithm in [SignatureAlgorithm::Ed25519, SignatureAlgorithm::Dilithium3] {
        let spec = AgreementSpec::new(
            KeyPairSpec::X25519,
            AgreementKind::Signed(HandshakeVariant::Unified),
            KdfAlgorithm::Sha256,
            false,
        )
        .unwrap();
        let ends = signed_endpoints(&KeyPairSpec::X25519, algorithm);
        let (client, server) = run_handshake(&spec, &ends);
        assert_eq!(client, server, "signed flow with {}", algorithm);
    }
}

#[test]
fn test_sessions_produce_distinct_secrets() {
    let spec = AgreementSpec::new(
        KeyPairSpec::X25519,
        AgreementKind::Basic,
        KdfAlgorithm::Sha256,
        false,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::X25519);
    // Same long-term keys, fresh init-vectors per session.
    let (first, _) = run_handshake(&spec, &ends);
    let (second, _) = run_handshake(&spec, &ends);
    assert_ne!(first, second);
}

#[test]
fn test_result_types_agree_across_roles() {
    let spec = AgreementSpec::new(
        KeyPairSpec::X25519,
        AgreementKind::Ephemeral(HandshakeVariant::Unified),
        KdfAlgorithm::Sha256,
        false,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::X25519);

    let factory = AgreementFactory::new();
    let mut client = factory.create_agreement(&spec).unwrap();
    let mut server = factory.create_agreement(&spec).unwrap();
    client.set_result_type(ResultType::CipherPair).unwrap();
    server.set_result_type(ResultType::CipherPair).unwrap();

    let hello = client
        .create_client_hello(&ends.client_local, &ends.client_peer)
        .unwrap();
    let response = server
        .accept_client_hello(&ends.server_local, &ends.server_peer, &hello)
        .unwrap()
        .unwrap();
    client
        .accept_server_hello(&ends.client_local, &ends.client_peer, &response)
        .unwrap();

    let (AgreementOutput::CipherPair(client_pair), AgreementOutput::CipherPair(server_pair)) =
        (client.take_result().unwrap(), server.take_result().unwrap())
    else {
        panic!("expected cipher pairs");
    };
    let sealed = client_pair.seal(b"cross-role payload").unwrap();
    assert_eq!(server_pair.open(&sealed).unwrap(), b"cross-role payload");
}

#[test]
fn test_mismatched_result_type_rejected() {
    let spec = AgreementSpec::new(
        KeyPairSpec::X25519,
        AgreementKind::Basic,
        KdfAlgorithm::Sha256,
        false,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::X25519);

    let factory = AgreementFactory::new();
    let mut client = factory.create_agreement(&spec).unwrap();
    let mut server = factory.create_agreement(&spec).unwrap();
    client.set_result_type(ResultType::KeySet).unwrap();

    let hello = client
        .create_client_hello(&ends.client_local, &ends.client_peer)
        .unwrap();
    let result = server.accept_client_hello(&ends.server_local, &ends.server_peer, &hello);
    assert!(matches!(result, Err(Error::SpecMismatch { .. })));
}

#[test]
fn test_tampered_confirmation_rejected() {
    let spec = AgreementSpec::new(
        KeyPairSpec::X25519,
        AgreementKind::Ephemeral(HandshakeVariant::Unified),
        KdfAlgorithm::Sha256,
        true,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::X25519);

    let factory = AgreementFactory::new();
    let mut client = factory.create_agreement(&spec).unwrap();
    let mut server = factory.create_agreement(&spec).unwrap();

    let hello = client
        .create_client_hello(&ends.client_local, &ends.client_peer)
        .unwrap();
    let mut response = server
        .accept_client_hello(&ends.server_local, &ends.server_peer, &hello)
        .unwrap()
        .unwrap();

    // Flip a bit in the trailing confirmation tag.
    let last = response.len() - 1;
    response[last] ^= 0x01;
    let result = client.accept_server_hello(&ends.client_local, &ends.client_peer, &response);
    assert!(matches!(
        result,
        Err(Error::Authentication(AuthError::ConfirmationMismatch))
    ));
    // A failed handshake never exposes a result.
    assert_eq!(client.status(), AgreementStatus::Clean);
    assert!(client.take_result().is_err());
}

#[test]
fn test_tampered_signature_rejected() {
    let spec = AgreementSpec::new(
        KeyPairSpec::P256,
        AgreementKind::Signed(HandshakeVariant::Unified),
        KdfAlgorithm::Sha256,
        false,
    )
    .unwrap();
    let ends = signed_endpoints(&KeyPairSpec::P256, SignatureAlgorithm::Ed25519);

    let factory = AgreementFactory::new();
    let mut client = factory.create_agreement(&spec).unwrap();
    let mut server = factory.create_agreement(&spec).unwrap();

    let hello = client
        .create_client_hello(&ends.client_local, &ends.client_peer)
        .unwrap();
    let mut response = server
        .accept_client_hello(&ends.server_local, &ends.server_peer, &hello)
        .unwrap()
        .unwrap();
    let last = response.len() - 1;
    response[last] ^= 0x01;

    let result = client.accept_server_hello(&ends.client_local, &ends.client_peer, &response);
    assert!(matches!(result, Err(Error::Authentication(_))));
    assert_eq!(client.status(), AgreementStatus::Clean);
}

#[test]
fn test_out_of_order_messages_rejected() {
    let spec = AgreementSpec::new(
        KeyPairSpec::X25519,
        AgreementKind::Ephemeral(HandshakeVariant::Unified),
        KdfAlgorithm::Sha256,
        false,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::X25519);

    let factory = AgreementFactory::new();
    let mut client = factory.create_agreement(&spec).unwrap();

    // A server hello before any client hello is a state error.
    let result = client.accept_server_hello(&ends.client_local, &ends.client_peer, &[0x01, 0x02]);
    assert!(matches!(result, Err(Error::InvalidState { .. })));

    // The client cannot open twice.
    client
        .create_client_hello(&ends.client_local, &ends.client_peer)
        .unwrap();
    let result = client.create_client_hello(&ends.client_local, &ends.client_peer);
    assert!(matches!(result, Err(Error::InvalidState { .. })));
}

#[test]
fn test_take_result_consumes_and_resets() {
    let spec = AgreementSpec::new(
        KeyPairSpec::Kyber768,
        AgreementKind::Kem,
        KdfAlgorithm::Sha256,
        false,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::Kyber768);

    let factory = AgreementFactory::new();
    let mut client = factory.create_agreement(&spec).unwrap();
    client
        .create_client_hello(&ends.client_local, &ends.client_peer)
        .unwrap();

    client.take_result().unwrap();
    assert_eq!(client.status(), AgreementStatus::Clean);
    assert!(matches!(
        client.take_result(),
        Err(Error::InvalidState { .. })
    ));

    // The machine is reusable after taking the result.
    client
        .create_client_hello(&ends.client_local, &ends.client_peer)
        .unwrap();
    client.take_result().unwrap();
}

#[test]
fn test_spec_mismatch_between_peers_rejected() {
    let client_spec = AgreementSpec::new(
        KeyPairSpec::X25519,
        AgreementKind::Ephemeral(HandshakeVariant::Unified),
        KdfAlgorithm::Sha256,
        false,
    )
    .unwrap();
    let server_spec = AgreementSpec::new(
        KeyPairSpec::X25519,
        AgreementKind::Ephemeral(HandshakeVariant::Mqv),
        KdfAlgorithm::Sha256,
        false,
    )
    .unwrap();
    let ends = endpoints(&KeyPairSpec::X25519);

    let factory = AgreementFactory::new();
    let mut client = factory.create_agreement(&client_spec).unwrap();
    let mut server = factory.create_agreement(&server_spec).unwrap();

    let hello = client
        .create_client_hello(&ends.client_local, &ends.client_peer)
        .unwrap();
    let result = server.accept_client_hello(&ends.server_local, &ends.server_peer, &hello);
    assert!(matches!(result, Err(Error::SpecMismatch { .. })));
}
