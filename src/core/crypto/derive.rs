/*!
Secret-derivation engine.

Every result shape is derived from the raw shared secret and the two
parties' init-vectors through a labeled digest chain. When the digest is
narrower than the requested output the chain squeezes more bytes by
re-digesting its own output. Every intermediate buffer holding secret
material is wiped on every exit path.
*/

use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha512};
use zeroize::{Zeroize, Zeroizing};

use crate::core::constants::{labels, sizes, HKDF_INFO_CIPHER_KEY};
use crate::core::crypto::output::{AgreementOutput, CipherPair, KeySet, SecretBytes, SeededFactory};
use crate::core::error::{CryptoError, Error, Result};
use crate::core::spec::{KdfAlgorithm, ResultType};

/// Labeled digest chain: the first block digests the label and inputs,
/// each following block digests its predecessor, and the concatenation is
/// truncated to `out_len`.
pub fn digest_chain(
    kdf: KdfAlgorithm,
    label: &[u8],
    inputs: &[&[u8]],
    out_len: usize,
) -> Zeroizing<Vec<u8>> {
    match kdf {
        KdfAlgorithm::Sha256 => chain::<Sha256>(label, inputs, out_len),
        KdfAlgorithm::Sha512 => chain::<Sha512>(label, inputs, out_len),
    }
}

fn chain<D: Digest>(label: &[u8], inputs: &[&[u8]], out_len: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(out_len));

    let mut hasher = D::new();
    hasher.update(label);
    for input in inputs {
        hasher.update(input);
    }
    let mut block = Zeroizing::new(hasher.finalize().to_vec());

    loop {
        let take = (out_len - out.len()).min(block.len());
        out.extend_from_slice(&block[..take]);
        if out.len() == out_len {
            break;
        }
        // Squeeze: the next block digests the previous one.
        let mut next = D::digest(&block[..]).to_vec();
        block.clear();
        block.extend_from_slice(&next);
        next.zeroize();
    }
    out
}

/// Derive the 512-bit secret for one agreement (or one composite
/// component) from the raw agreement output and the session init-vectors
pub fn derive_secret(
    kdf: KdfAlgorithm,
    raw: &[u8],
    client_iv: &[u8],
    server_iv: Option<&[u8]>,
) -> Zeroizing<Vec<u8>> {
    digest_chain(
        kdf,
        labels::COMPONENT_SECRET,
        &gather(raw, client_iv, server_iv),
        sizes::RAW_SECRET,
    )
}

/// Derive the confirmation MAC key binding the raw secret to this session
pub fn confirmation_key(
    kdf: KdfAlgorithm,
    raw: &[u8],
    client_iv: &[u8],
    server_iv: &[u8],
) -> Zeroizing<Vec<u8>> {
    digest_chain(
        kdf,
        labels::CONFIRM_KEY,
        &[raw, client_iv, server_iv],
        sizes::CONFIRM_KEY,
    )
}

/// Derive the caller-requested result shape from the raw shared secret.
///
/// The four shapes use distinct fixed derivation labels so they can never
/// collide; the cipher-pair key additionally runs through HKDF-SHA-256
/// salted with the session init-vectors.
pub fn derive_result(
    kdf: KdfAlgorithm,
    raw: &[u8],
    client_iv: &[u8],
    server_iv: Option<&[u8]>,
    result_type: ResultType,
) -> Result<AgreementOutput> {
    let inputs = gather(raw, client_iv, server_iv);
    match result_type {
        ResultType::RawSecret => {
            let buf = digest_chain(
                KdfAlgorithm::Sha512,
                labels::RAW_SECRET,
                &inputs,
                sizes::RAW_SECRET,
            );
            let mut secret = [0u8; sizes::RAW_SECRET];
            secret.copy_from_slice(&buf);
            let out = SecretBytes::new(secret);
            secret.zeroize();
            Ok(AgreementOutput::RawSecret(out))
        }
        ResultType::SeededFactory => {
            // The security phrase seeds the factory and is then wiped.
            let phrase = digest_chain(
                KdfAlgorithm::Sha512,
                labels::FACTORY_SEED,
                &inputs,
                sizes::RAW_SECRET,
            );
            let mut seed: [u8; sizes::FACTORY_SEED] = Sha256::digest(&phrase[..]).into();
            let factory = SeededFactory::from_seed(seed);
            seed.zeroize();
            Ok(AgreementOutput::SeededFactory(factory))
        }
        ResultType::KeySet => {
            let buf = digest_chain(
                KdfAlgorithm::Sha512,
                labels::KEY_SET,
                &inputs,
                sizes::SYMMETRIC_KEY + sizes::KEY_SET_IV,
            );
            let mut key = [0u8; sizes::SYMMETRIC_KEY];
            let mut iv = [0u8; sizes::KEY_SET_IV];
            key.copy_from_slice(&buf[..sizes::SYMMETRIC_KEY]);
            iv.copy_from_slice(&buf[sizes::SYMMETRIC_KEY..]);
            let out = KeySet::new(key, iv);
            key.zeroize();
            iv.zeroize();
            Ok(AgreementOutput::KeySet(out))
        }
        ResultType::CipherPair => {
            let mut salt = Zeroizing::new(client_iv.to_vec());
            if let Some(server_iv) = server_iv {
                salt.extend_from_slice(server_iv);
            }
            let mut key = Zeroizing::new([0u8; sizes::SYMMETRIC_KEY]);
            Hkdf::<Sha256>::new(Some(&salt), raw)
                .expand(HKDF_INFO_CIPHER_KEY, key.as_mut())
                .map_err(|_| Error::Crypto(CryptoError::KeyDerivationFailed))?;

            // The nonce squeeze is extensible to widths beyond one digest
            // block, which the SHA-256 chain does not cover in one step.
            let nonce_buf = digest_chain(kdf, labels::CIPHER_IV, &inputs, sizes::CIPHER_NONCE);
            let mut nonce = [0u8; sizes::CIPHER_NONCE];
            nonce.copy_from_slice(&nonce_buf);

            let pair = CipherPair::new(&key, nonce);
            nonce.zeroize();
            Ok(AgreementOutput::CipherPair(pair))
        }
    }
}

fn gather<'a>(raw: &'a [u8], client_iv: &'a [u8], server_iv: Option<&'a [u8]>) -> Vec<&'a [u8]> {
    let mut inputs = vec![raw, client_iv];
    if let Some(server_iv) = server_iv {
        inputs.push(server_iv);
    }
    inputs
}
