// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Token Codec
//!
//! Compact JWS / JWT encoding and verification for every supported
//! [`Algorithm`], plus the detached-payload variant used by the
//! authenticated key exchange (`header..signature`, RFC 7515 Appendix F).
//!
//! ## Time claims
//!
//! - `exp <= now` is expired. No skew is granted on expiry, so a token whose
//!   `exp` equals the current second is already expired.
//! - `iat` or `nbf` later than `now + clock_skew` is not yet valid.
//!
//! Structural problems (bad segments, unknown `alg`, a header `alg` that does
//! not match the key) fail immediately and are never retried.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::identity::Algorithm;
use crate::infrastructure::crypto::{KeyError, PublicKey, SecretKey};

/// JWT claims set.
pub type Claims = Map<String, Value>;

/// Default tolerance for `iat` / `nbf` in the future.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 100;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Token malformed: {0}")]
    TokenMalformed(String),

    #[error("Token expired: exp {exp} <= now {now}")]
    TokenExpired { exp: i64, now: i64 },

    #[error("Token not yet valid: {claim} {value} is after now {now} (+{skew}s skew)")]
    TokenNotYetValid {
        claim: &'static str,
        value: i64,
        now: i64,
        skew: i64,
    },

    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Header alg {header} does not match {key} key")]
    AlgorithmMismatch { header: Algorithm, key: Algorithm },

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Represents the JWT `aud` claim, which may be either a single string or an array of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AudienceClaim {
    Single(String),
    Multiple(Vec<String>),
}

impl AudienceClaim {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            AudienceClaim::Single(aud) => aud == audience,
            AudienceClaim::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }

    /// First audience, used as the primary addressee.
    pub fn primary(&self) -> Option<&str> {
        match self {
            AudienceClaim::Single(aud) => Some(aud),
            AudienceClaim::Multiple(auds) => auds.first().map(String::as_str),
        }
    }
}

/// Protected JOSE header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwsHeader {
    pub alg: Algorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwsHeader {
    pub fn new(alg: Algorithm) -> Self {
        Self { alg, typ: None, kid: None }
    }

    pub fn jwt(alg: Algorithm, kid: impl Into<String>) -> Self {
        Self {
            alg,
            typ: Some("JWT".into()),
            kid: Some(kid.into()),
        }
    }
}

/// Detached-payload envelope: the payload travels beside the signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetachedEnvelope {
    /// base64url(canonical JSON of the payload)
    pub encoded_payload: String,
    /// `base64url(header)..base64url(signature)`
    pub detached_signature: String,
}

pub(crate) fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::TokenMalformed(format!("{} is not base64url: {}", what, e)))
}

/// Compact JSON with object keys in lexicographic order at every depth.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut out = Map::new();
                for key in keys {
                    out.insert(key.clone(), sorted(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    // Serializing a Value cannot fail.
    serde_json::to_vec(&sorted(value)).unwrap_or_default()
}

fn parse_header(segment: &str) -> Result<JwsHeader, TokenError> {
    let raw: Value = serde_json::from_slice(&decode_segment(segment, "header")?)
        .map_err(|e| TokenError::TokenMalformed(format!("header is not JSON: {}", e)))?;
    let alg = raw
        .get("alg")
        .and_then(Value::as_str)
        .ok_or_else(|| TokenError::TokenMalformed("header has no alg".into()))?;
    alg.parse::<Algorithm>()
        .map_err(|_| TokenError::UnsupportedAlgorithm(alg.to_string()))?;
    serde_json::from_value(raw).map_err(|e| TokenError::TokenMalformed(format!("invalid header: {}", e)))
}

fn parse_claims(segment: &str) -> Result<Claims, TokenError> {
    match serde_json::from_slice(&decode_segment(segment, "payload")?) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => Err(TokenError::TokenMalformed("payload is not a JSON object".into())),
        Err(e) => Err(TokenError::TokenMalformed(format!("payload is not JSON: {}", e))),
    }
}

fn numeric_claim(claims: &Claims, name: &'static str) -> Result<Option<i64>, TokenError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|v| v as i64))
            .map(Some)
            .ok_or_else(|| TokenError::TokenMalformed(format!("claim '{}' is not numeric", name))),
    }
}

/// String claim or [`TokenError::MissingClaim`].
pub fn require_str<'a>(claims: &'a Claims, name: &str) -> Result<&'a str, TokenError> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| TokenError::MissingClaim(name.to_string()))
}

/// JWT / JWS encoder and verifier.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    clock_skew_secs: i64,
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new(DEFAULT_CLOCK_SKEW_SECS)
    }
}

impl TokenCodec {
    pub fn new(clock_skew_secs: i64) -> Self {
        Self { clock_skew_secs }
    }

    pub fn clock_skew_secs(&self) -> i64 {
        self.clock_skew_secs
    }

    fn check_algorithm(header: &JwsHeader, key: Algorithm) -> Result<(), TokenError> {
        if header.alg != key {
            return Err(TokenError::AlgorithmMismatch { header: header.alg, key });
        }
        Ok(())
    }

    fn signing_input(header: &JwsHeader, payload: &[u8]) -> Result<String, TokenError> {
        let header = serde_json::to_vec(header)
            .map_err(|e| TokenError::TokenMalformed(format!("header not serializable: {}", e)))?;
        Ok(format!("{}.{}", encode_segment(&header), encode_segment(payload)))
    }

    /// Encode `claims` as a compact JWS signed with `key`.
    pub fn sign_jwt(&self, claims: &Claims, header: &JwsHeader, key: &SecretKey) -> Result<String, TokenError> {
        Self::check_algorithm(header, key.algorithm())?;
        let payload = serde_json::to_vec(claims)
            .map_err(|e| TokenError::TokenMalformed(format!("claims not serializable: {}", e)))?;
        let input = Self::signing_input(header, &payload)?;
        let signature = key.sign(input.as_bytes())?;
        Ok(format!("{}.{}", input, encode_segment(&signature)))
    }

    /// Split and decode a compact token without checking its signature.
    pub fn decode_unverified(&self, token: &str) -> Result<(JwsHeader, Claims), TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::TokenMalformed(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        }
        Ok((parse_header(parts[0])?, parse_claims(parts[1])?))
    }

    pub fn verify_jwt(&self, token: &str, key: &PublicKey) -> Result<Claims, TokenError> {
        self.verify_jwt_at(token, key, Utc::now().timestamp())
    }

    /// Verify signature and time claims against the given clock.
    pub fn verify_jwt_at(&self, token: &str, key: &PublicKey, now: i64) -> Result<Claims, TokenError> {
        let (header, claims) = self.decode_unverified(token)?;
        Self::check_algorithm(&header, key.algorithm()).map_err(|e| TokenError::SignatureInvalid(e.to_string()))?;

        let (input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| TokenError::TokenMalformed("missing signature segment".into()))?;
        key.verify(input.as_bytes(), &decode_segment(signature, "signature")?)
            .map_err(|e| TokenError::SignatureInvalid(e.to_string()))?;

        self.check_time_claims(&claims, now)?;
        Ok(claims)
    }

    /// Validity-window checks only.
    pub fn check_time_claims(&self, claims: &Claims, now: i64) -> Result<(), TokenError> {
        if let Some(exp) = numeric_claim(claims, "exp")? {
            if exp <= now {
                return Err(TokenError::TokenExpired { exp, now });
            }
        }
        for claim in ["nbf", "iat"] {
            if let Some(value) = numeric_claim(claims, claim)? {
                if value > now + self.clock_skew_secs {
                    return Err(TokenError::TokenNotYetValid {
                        claim,
                        value,
                        now,
                        skew: self.clock_skew_secs,
                    });
                }
            }
        }
        Ok(())
    }

    /// Sign the canonical serialization of `payload` with a detached payload.
    pub fn build_detached_envelope(
        &self,
        payload: &Value,
        key: &SecretKey,
        kid: Option<&str>,
    ) -> Result<DetachedEnvelope, TokenError> {
        let header = JwsHeader {
            alg: key.algorithm(),
            typ: None,
            kid: kid.map(str::to_string),
        };
        let canonical = canonical_json(payload);
        let input = Self::signing_input(&header, &canonical)?;
        let signature = key.sign(input.as_bytes())?;
        let (header_segment, encoded_payload) = input
            .split_once('.')
            .ok_or_else(|| TokenError::TokenMalformed("signing input has no separator".into()))?;

        Ok(DetachedEnvelope {
            detached_signature: format!("{}..{}", header_segment, encode_segment(&signature)),
            encoded_payload: encoded_payload.to_string(),
        })
    }

    /// Header of a detached signature, e.g. to look up its `kid`.
    pub fn detached_header(&self, detached_signature: &str) -> Result<JwsHeader, TokenError> {
        let (header, _) = split_detached(detached_signature)?;
        parse_header(header)
    }

    /// Verify a detached envelope and return its payload.
    pub fn verify_detached_envelope(&self, envelope: &DetachedEnvelope, key: &PublicKey) -> Result<Value, TokenError> {
        let (header_segment, signature) = split_detached(&envelope.detached_signature)?;
        let header = parse_header(header_segment)?;
        Self::check_algorithm(&header, key.algorithm()).map_err(|e| TokenError::SignatureInvalid(e.to_string()))?;

        let input = format!("{}.{}", header_segment, envelope.encoded_payload);
        key.verify(input.as_bytes(), &decode_segment(signature, "signature")?)
            .map_err(|e| TokenError::SignatureInvalid(e.to_string()))?;

        serde_json::from_slice(&decode_segment(&envelope.encoded_payload, "payload")?)
            .map_err(|e| TokenError::TokenMalformed(format!("payload is not JSON: {}", e)))
    }
}

fn split_detached(detached: &str) -> Result<(&str, &str), TokenError> {
    let parts: Vec<&str> = detached.split('.').collect();
    match parts.as_slice() {
        [header, "", signature] => Ok((header, signature)),
        _ => Err(TokenError::TokenMalformed(
            "detached signature must have the form header..signature".into(),
        )),
    }
}
