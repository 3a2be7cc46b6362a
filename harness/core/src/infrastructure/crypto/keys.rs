// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Algorithm-tagged key material over the RustCrypto signature crates.

use std::fmt;

use rand_core::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use signature::{SignatureEncoding, Signer, Verifier};
use thiserror::Error;

use crate::domain::identity::Algorithm;

const RSA_KEY_BITS: usize = 2048;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Signature verification failed: {0}")]
    Verification(String),

    #[error("Key agreement is not available for {0} keys")]
    NoKeyAgreement(Algorithm),

    #[error("Sealed payload could not be opened: {0}")]
    Unseal(String),
}

/// Private key for one of the supported algorithms.
#[derive(Clone)]
pub enum SecretKey {
    Es256k(k256::ecdsa::SigningKey),
    Es256(p256::ecdsa::SigningKey),
    Rs256(Box<RsaPrivateKey>),
    EdDsa(ed25519_dalek::SigningKey),
}

/// Public key for one of the supported algorithms.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicKey {
    Es256k(k256::ecdsa::VerifyingKey),
    Es256(p256::ecdsa::VerifyingKey),
    Rs256(Box<RsaPublicKey>),
    EdDsa(ed25519_dalek::VerifyingKey),
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&self.algorithm()).finish()
    }
}

impl SecretKey {
    /// Generate a fresh key from the OS RNG.
    pub fn generate(algorithm: Algorithm) -> Result<Self, KeyError> {
        Ok(match algorithm {
            Algorithm::Es256k => SecretKey::Es256k(k256::ecdsa::SigningKey::random(&mut OsRng)),
            Algorithm::Es256 => SecretKey::Es256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            Algorithm::Rs256 => {
                let key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
                    .map_err(|e| KeyError::Generation(e.to_string()))?;
                SecretKey::Rs256(Box::new(key))
            }
            Algorithm::EdDsa => SecretKey::EdDsa(ed25519_dalek::SigningKey::generate(&mut OsRng)),
        })
    }

    /// Import a raw private scalar / seed given as hex (`0x` prefix optional).
    pub fn from_hex(algorithm: Algorithm, value: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(value.trim_start_matches("0x"))
            .map_err(|e| KeyError::InvalidKey(format!("private key is not hex: {}", e)))?;

        match algorithm {
            Algorithm::Es256k => k256::ecdsa::SigningKey::from_slice(&bytes)
                .map(SecretKey::Es256k)
                .map_err(|e| KeyError::InvalidKey(e.to_string())),
            Algorithm::Es256 => p256::ecdsa::SigningKey::from_slice(&bytes)
                .map(SecretKey::Es256)
                .map_err(|e| KeyError::InvalidKey(e.to_string())),
            Algorithm::EdDsa => {
                let seed: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| KeyError::InvalidKey("Ed25519 seed must be 32 bytes".into()))?;
                Ok(SecretKey::EdDsa(ed25519_dalek::SigningKey::from_bytes(&seed)))
            }
            Algorithm::Rs256 => Err(KeyError::InvalidKey(
                "RS256 keys are imported from PEM, not hex".into(),
            )),
        }
    }

    /// Import an RSA private key from PKCS#8 or PKCS#1 PEM.
    pub fn from_rsa_pem(pem: &str) -> Result<Self, KeyError> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| KeyError::InvalidKey(format!("invalid RSA PEM: {}", e)))?;
        Ok(SecretKey::Rs256(Box::new(key)))
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            SecretKey::Es256k(_) => Algorithm::Es256k,
            SecretKey::Es256(_) => Algorithm::Es256,
            SecretKey::Rs256(_) => Algorithm::Rs256,
            SecretKey::EdDsa(_) => Algorithm::EdDsa,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            SecretKey::Es256k(key) => PublicKey::Es256k(*key.verifying_key()),
            SecretKey::Es256(key) => PublicKey::Es256(*key.verifying_key()),
            SecretKey::Rs256(key) => PublicKey::Rs256(Box::new(key.to_public_key())),
            SecretKey::EdDsa(key) => PublicKey::EdDsa(key.verifying_key()),
        }
    }

    /// JWS signature bytes over `message`.
    ///
    /// ECDSA signatures are returned as fixed-size `r || s`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        match self {
            SecretKey::Es256k(key) => {
                let sig: k256::ecdsa::Signature = key
                    .try_sign(message)
                    .map_err(|e| KeyError::Signing(e.to_string()))?;
                Ok(sig.to_bytes().to_vec())
            }
            SecretKey::Es256(key) => {
                let sig: p256::ecdsa::Signature = key
                    .try_sign(message)
                    .map_err(|e| KeyError::Signing(e.to_string()))?;
                Ok(sig.to_bytes().to_vec())
            }
            SecretKey::Rs256(key) => {
                let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.as_ref().clone());
                let sig = signer
                    .try_sign(message)
                    .map_err(|e| KeyError::Signing(e.to_string()))?;
                Ok(sig.to_vec())
            }
            SecretKey::EdDsa(key) => Ok(key.sign(message).to_bytes().to_vec()),
        }
    }
}

impl PublicKey {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PublicKey::Es256k(_) => Algorithm::Es256k,
            PublicKey::Es256(_) => Algorithm::Es256,
            PublicKey::Rs256(_) => Algorithm::Rs256,
            PublicKey::EdDsa(_) => Algorithm::EdDsa,
        }
    }

    /// Import an RSA public key from SPKI PEM.
    pub fn from_rsa_pem(pem: &str) -> Result<Self, KeyError> {
        let key = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| KeyError::InvalidKey(format!("invalid RSA public key PEM: {}", e)))?;
        Ok(PublicKey::Rs256(Box::new(key)))
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        let fail = |e: signature::Error| KeyError::Verification(e.to_string());

        match self {
            PublicKey::Es256k(key) => {
                let sig = k256::ecdsa::Signature::from_slice(signature).map_err(fail)?;
                let sig = sig.normalize_s().unwrap_or(sig);
                key.verify(message, &sig).map_err(fail)
            }
            PublicKey::Es256(key) => {
                let sig = p256::ecdsa::Signature::from_slice(signature).map_err(fail)?;
                key.verify(message, &sig).map_err(fail)
            }
            PublicKey::Rs256(key) => {
                let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.as_ref().clone());
                let sig = rsa::pkcs1v15::Signature::try_from(signature).map_err(fail)?;
                verifier.verify(message, &sig).map_err(fail)
            }
            PublicKey::EdDsa(key) => {
                let sig = ed25519_dalek::Signature::from_slice(signature).map_err(fail)?;
                key.verify(message, &sig).map_err(fail)
            }
        }
    }
}
