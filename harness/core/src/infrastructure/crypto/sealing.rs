// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sealed payloads for the AKE `ake1_enc_payload`.
//!
//! ECIES over the recipient's signing curve: an ephemeral ECDH key pair,
//! HKDF-SHA256 to derive an AES-256-GCM key, and the layout
//! `base64url(ephemeral_pub_compressed || iv || ciphertext)`.
//! Only `ES256K` and `ES256` keys can receive sealed payloads.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hkdf::Hkdf;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

use super::keys::{KeyError, PublicKey, SecretKey};

const KDF_INFO: &[u8] = b"didflow-ake1-enc-payload";
const COMPRESSED_POINT_LEN: usize = 33;
const IV_LEN: usize = 12;

fn derive_cipher(shared_secret: &[u8]) -> Result<Aes256Gcm, KeyError> {
    let mut key = [0u8; 32];
    Hkdf::<Sha256>::new(None, shared_secret)
        .expand(KDF_INFO, &mut key)
        .map_err(|e| KeyError::Unseal(e.to_string()))?;
    Aes256Gcm::new_from_slice(&key).map_err(|e| KeyError::Unseal(e.to_string()))
}

/// Seal `plaintext` so only the holder of `recipient`'s private key can open it.
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<String, KeyError> {
    let (ephemeral_public, shared) = match recipient {
        PublicKey::Es256k(key) => {
            let ephemeral = k256::ecdh::EphemeralSecret::random(&mut OsRng);
            let shared = ephemeral.diffie_hellman(&k256::PublicKey::from(key));
            (
                ephemeral.public_key().to_encoded_point(true).as_bytes().to_vec(),
                shared.raw_secret_bytes().to_vec(),
            )
        }
        PublicKey::Es256(key) => {
            let ephemeral = p256::ecdh::EphemeralSecret::random(&mut OsRng);
            let shared = ephemeral.diffie_hellman(&p256::PublicKey::from(key));
            (
                ephemeral.public_key().to_encoded_point(true).as_bytes().to_vec(),
                shared.raw_secret_bytes().to_vec(),
            )
        }
        other => return Err(KeyError::NoKeyAgreement(other.algorithm())),
    };

    let cipher = derive_cipher(&shared)?;
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| KeyError::Signing(format!("sealing failed: {}", e)))?;

    let mut sealed = ephemeral_public;
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(sealed))
}

/// Open a payload sealed to `recipient`'s public key.
pub fn open(recipient: &SecretKey, sealed: &str) -> Result<Vec<u8>, KeyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(sealed)
        .map_err(|e| KeyError::Unseal(format!("not base64url: {}", e)))?;
    if bytes.len() <= COMPRESSED_POINT_LEN + IV_LEN {
        return Err(KeyError::Unseal("sealed payload too short".into()));
    }
    let (ephemeral, rest) = bytes.split_at(COMPRESSED_POINT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);

    let shared = match recipient {
        SecretKey::Es256k(key) => {
            let ephemeral = k256::PublicKey::from_sec1_bytes(ephemeral)
                .map_err(|e| KeyError::Unseal(format!("bad ephemeral key: {}", e)))?;
            k256::ecdh::diffie_hellman(key.as_nonzero_scalar(), ephemeral.as_affine())
                .raw_secret_bytes()
                .to_vec()
        }
        SecretKey::Es256(key) => {
            let ephemeral = p256::PublicKey::from_sec1_bytes(ephemeral)
                .map_err(|e| KeyError::Unseal(format!("bad ephemeral key: {}", e)))?;
            p256::ecdh::diffie_hellman(key.as_nonzero_scalar(), ephemeral.as_affine())
                .raw_secret_bytes()
                .to_vec()
        }
        other => return Err(KeyError::NoKeyAgreement(other.algorithm())),
    };

    derive_cipher(&shared)?
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| KeyError::Unseal("authentication tag mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::Algorithm;

    #[test]
    fn test_seal_open_on_both_curves() {
        for algorithm in [Algorithm::Es256k, Algorithm::Es256] {
            let secret = SecretKey::generate(algorithm).unwrap();
            let sealed = seal(&secret.public_key(), b"{\"access_token\":\"a.b.c\"}").unwrap();
            assert_eq!(open(&secret, &sealed).unwrap(), b"{\"access_token\":\"a.b.c\"}");
        }
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let recipient = SecretKey::generate(Algorithm::Es256k).unwrap();
        let intruder = SecretKey::generate(Algorithm::Es256k).unwrap();
        let sealed = seal(&recipient.public_key(), b"secret").unwrap();
        assert!(matches!(open(&intruder, &sealed), Err(KeyError::Unseal(_))));
    }

    #[test]
    fn test_ed25519_has_no_key_agreement() {
        let secret = SecretKey::generate(Algorithm::EdDsa).unwrap();
        assert!(matches!(
            seal(&secret.public_key(), b"x"),
            Err(KeyError::NoKeyAgreement(Algorithm::EdDsa))
        ));
    }
}
