// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! JSON Web Key conversion and RFC 7638 thumbprints.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::keys::{KeyError, PublicKey};

/// Public JWK as advertised by identities and trusted applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl Jwk {
    fn member<'a>(&'a self, value: &'a Option<String>, name: &str) -> Result<&'a str, KeyError> {
        value
            .as_deref()
            .ok_or_else(|| KeyError::InvalidKey(format!("JWK is missing '{}'", name)))
    }

    fn decode_member(&self, value: &Option<String>, name: &str) -> Result<Vec<u8>, KeyError> {
        URL_SAFE_NO_PAD
            .decode(self.member(value, name)?)
            .map_err(|e| KeyError::InvalidKey(format!("JWK member '{}' is not base64url: {}", name, e)))
    }

    /// Required members only, keys in lexicographic order.
    fn required_members(&self) -> Result<serde_json::Value, KeyError> {
        Ok(match self.kty.as_str() {
            "EC" => json!({
                "crv": self.member(&self.crv, "crv")?,
                "kty": "EC",
                "x": self.member(&self.x, "x")?,
                "y": self.member(&self.y, "y")?,
            }),
            "RSA" => json!({
                "e": self.member(&self.e, "e")?,
                "kty": "RSA",
                "n": self.member(&self.n, "n")?,
            }),
            "OKP" => json!({
                "crv": self.member(&self.crv, "crv")?,
                "kty": "OKP",
                "x": self.member(&self.x, "x")?,
            }),
            other => return Err(KeyError::InvalidKey(format!("unsupported JWK kty '{}'", other))),
        })
    }

    /// Compact JSON of the required members with sorted keys.
    pub fn canonical_json(&self) -> Result<String, KeyError> {
        serde_json::to_string(&self.required_members()?).map_err(|e| KeyError::InvalidKey(e.to_string()))
    }

    /// RFC 7638 SHA-256 thumbprint, base64url encoded.
    pub fn thumbprint(&self) -> Result<String, KeyError> {
        let digest = Sha256::digest(self.canonical_json()?.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }

    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    fn ec(crv: &str, x: &[u8], y: &[u8]) -> Self {
        Self {
            kty: "EC".into(),
            crv: Some(crv.into()),
            x: Some(URL_SAFE_NO_PAD.encode(x)),
            y: Some(URL_SAFE_NO_PAD.encode(y)),
            n: None,
            e: None,
            kid: None,
        }
    }

    fn uncompressed_point(&self) -> Result<Vec<u8>, KeyError> {
        let x = self.decode_member(&self.x, "x")?;
        let y = self.decode_member(&self.y, "y")?;
        let mut point = Vec::with_capacity(1 + x.len() + y.len());
        point.push(0x04);
        point.extend_from_slice(&x);
        point.extend_from_slice(&y);
        Ok(point)
    }
}

impl PublicKey {
    pub fn to_jwk(&self) -> Jwk {
        match self {
            PublicKey::Es256k(key) => {
                let point = key.to_encoded_point(false);
                Jwk::ec(
                    "secp256k1",
                    point.x().map(|x| x.as_slice()).unwrap_or_default(),
                    point.y().map(|y| y.as_slice()).unwrap_or_default(),
                )
            }
            PublicKey::Es256(key) => {
                let point = key.to_encoded_point(false);
                Jwk::ec(
                    "P-256",
                    point.x().map(|x| x.as_slice()).unwrap_or_default(),
                    point.y().map(|y| y.as_slice()).unwrap_or_default(),
                )
            }
            PublicKey::Rs256(key) => Jwk {
                kty: "RSA".into(),
                crv: None,
                x: None,
                y: None,
                n: Some(URL_SAFE_NO_PAD.encode(key.n().to_bytes_be())),
                e: Some(URL_SAFE_NO_PAD.encode(key.e().to_bytes_be())),
                kid: None,
            },
            PublicKey::EdDsa(key) => Jwk {
                kty: "OKP".into(),
                crv: Some("Ed25519".into()),
                x: Some(URL_SAFE_NO_PAD.encode(key.as_bytes())),
                y: None,
                n: None,
                e: None,
                kid: None,
            },
        }
    }

    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyError> {
        let invalid = |e: String| KeyError::InvalidKey(e);

        match (jwk.kty.as_str(), jwk.crv.as_deref()) {
            ("EC", Some("secp256k1")) => k256::ecdsa::VerifyingKey::from_sec1_bytes(&jwk.uncompressed_point()?)
                .map(PublicKey::Es256k)
                .map_err(|e| invalid(e.to_string())),
            ("EC", Some("P-256")) => p256::ecdsa::VerifyingKey::from_sec1_bytes(&jwk.uncompressed_point()?)
                .map(PublicKey::Es256)
                .map_err(|e| invalid(e.to_string())),
            ("RSA", _) => {
                let n = BigUint::from_bytes_be(&jwk.decode_member(&jwk.n, "n")?);
                let e = BigUint::from_bytes_be(&jwk.decode_member(&jwk.e, "e")?);
                RsaPublicKey::new(n, e)
                    .map(|key| PublicKey::Rs256(Box::new(key)))
                    .map_err(|e| invalid(e.to_string()))
            }
            ("OKP", Some("Ed25519")) => {
                let x: [u8; 32] = jwk
                    .decode_member(&jwk.x, "x")?
                    .try_into()
                    .map_err(|_| invalid("Ed25519 key must be 32 bytes".into()))?;
                ed25519_dalek::VerifyingKey::from_bytes(&x)
                    .map(PublicKey::EdDsa)
                    .map_err(|e| invalid(e.to_string()))
            }
            (kty, crv) => Err(invalid(format!("unsupported JWK kty '{}' crv '{:?}'", kty, crv))),
        }
    }
}
