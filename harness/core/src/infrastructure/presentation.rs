// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Self-issued tokens: SIOP id tokens, verifiable credential fixtures and
//! verifiable presentations, all encoded as JWTs through the [`TokenCodec`].

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::command::CredentialValidity;
use crate::domain::identity::{Client, KeySet};
use crate::domain::siop::AuthenticationRequest;
use crate::infrastructure::jwt::{Claims, JwsHeader, TokenCodec, TokenError};

const CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
const ID_TOKEN_TTL_SECS: i64 = 600;
const PRESENTATION_TTL_SECS: i64 = 900;
const DAY_SECS: i64 = 86_400;

fn object(value: Value) -> Claims {
    match value {
        Value::Object(map) => map,
        _ => Claims::new(),
    }
}

fn rfc3339(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

/// `(iat, nbf, exp)` for a credential fixture relative to `now`.
pub fn validity_window(validity: CredentialValidity, now: i64) -> (i64, i64, i64) {
    match validity {
        CredentialValidity::Valid | CredentialValidity::Revoked => (now, now, now + DAY_SECS),
        CredentialValidity::Expired => (now - 2 * DAY_SECS, now - 2 * DAY_SECS, now - DAY_SECS),
        CredentialValidity::NotYetValid => (now + DAY_SECS, now + DAY_SECS, now + 2 * DAY_SECS),
    }
}

/// Credential id carried in `jti` (falling back to `vc.id`).
pub fn credential_id(claims: &Claims) -> Option<String> {
    claims
        .get("jti")
        .or_else(|| claims.get("vc").and_then(|vc| vc.get("id")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Self-issued SIOP id token answering an authentication request.
pub fn build_id_token(
    codec: &TokenCodec,
    client: &Client,
    keys: &KeySet,
    request: &AuthenticationRequest,
) -> Result<String, TokenError> {
    let now = Utc::now().timestamp();
    let claims = object(json!({
        "iss": "https://self-issued.me/v2",
        "sub": client.did,
        "did": client.did,
        "aud": request.client_id.clone().unwrap_or_default(),
        "nonce": request.nonce,
        "iat": now,
        "exp": now + ID_TOKEN_TTL_SECS,
        "sub_jwk": keys.jwk().with_kid(keys.kid.clone()),
    }));
    codec.sign_jwt(&claims, &JwsHeader::jwt(keys.algorithm, keys.kid.clone()), &keys.secret)
}

/// Credential fixture issued by `issuer` to itself.
pub fn issue_credential(
    codec: &TokenCodec,
    issuer: &Client,
    keys: &KeySet,
    validity: CredentialValidity,
    now: i64,
) -> Result<(String, String), TokenError> {
    let id = format!("urn:uuid:{}", Uuid::new_v4());
    let (iat, nbf, exp) = validity_window(validity, now);

    let claims = object(json!({
        "iss": issuer.did,
        "sub": issuer.did,
        "jti": id,
        "iat": iat,
        "nbf": nbf,
        "exp": exp,
        "vc": {
            "@context": [CREDENTIALS_CONTEXT],
            "id": id,
            "type": ["VerifiableCredential", "VerifiableAttestation"],
            "issuer": issuer.did,
            "issuanceDate": rfc3339(iat),
            "validFrom": rfc3339(nbf),
            "expirationDate": rfc3339(exp),
            "credentialSubject": {"id": issuer.did},
        }
    }));
    let token = codec.sign_jwt(&claims, &JwsHeader::jwt(keys.algorithm, keys.kid.clone()), &keys.secret)?;
    Ok((id, token))
}

/// Verifiable presentation binding `credentials` to the request nonce and audience.
pub fn build_presentation(
    codec: &TokenCodec,
    holder: &Client,
    keys: &KeySet,
    credentials: &[String],
    request: &AuthenticationRequest,
) -> Result<String, TokenError> {
    let now = Utc::now().timestamp();
    let id = format!("urn:uuid:{}", Uuid::new_v4());
    let claims = object(json!({
        "iss": holder.did,
        "sub": holder.did,
        "aud": request.audience.clone().unwrap_or_default(),
        "nonce": request.nonce,
        "jti": id,
        "iat": now,
        "nbf": now,
        "exp": now + PRESENTATION_TTL_SECS,
        "vp": {
            "@context": [CREDENTIALS_CONTEXT],
            "id": id,
            "type": ["VerifiablePresentation"],
            "holder": holder.did,
            "verifiableCredential": credentials,
        }
    }));
    codec.sign_jwt(&claims, &JwsHeader::jwt(keys.algorithm, keys.kid.clone()), &keys.secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{Algorithm, IdentityKind};
    use crate::infrastructure::crypto::keys::tests::test_secret;

    fn client(algorithm: Algorithm) -> Client {
        Client::new(IdentityKind::LegalEntity, None, vec![test_secret(algorithm)]).unwrap()
    }

    #[test]
    fn test_credential_windows_verify_as_expected() {
        let codec = TokenCodec::default();
        let issuer = client(Algorithm::Es256);
        let keys = issuer.keys(Algorithm::Es256).unwrap();
        let now = Utc::now().timestamp();

        let (id, valid) = issue_credential(&codec, &issuer, keys, CredentialValidity::Valid, now).unwrap();
        let claims = codec.verify_jwt(&valid, &keys.public).unwrap();
        assert_eq!(credential_id(&claims), Some(id));

        let (_, expired) = issue_credential(&codec, &issuer, keys, CredentialValidity::Expired, now).unwrap();
        assert!(matches!(
            codec.verify_jwt(&expired, &keys.public),
            Err(TokenError::TokenExpired { .. })
        ));

        let (_, future) = issue_credential(&codec, &issuer, keys, CredentialValidity::NotYetValid, now).unwrap();
        assert!(matches!(
            codec.verify_jwt(&future, &keys.public),
            Err(TokenError::TokenNotYetValid { .. })
        ));
    }

    #[test]
    fn test_presentation_binds_nonce_and_credentials() {
        let codec = TokenCodec::default();
        let holder = client(Algorithm::Rs256);
        let keys = holder.keys(Algorithm::Rs256).unwrap();
        let request = AuthenticationRequest::parse("openid://?client_id=verifier&nonce=n-42", &codec).unwrap();

        let vp = build_presentation(&codec, &holder, keys, &["a.b.c".to_string()], &request).unwrap();
        let (header, claims) = codec.decode_unverified(&vp).unwrap();

        assert_eq!(header.kid.as_deref(), Some(keys.kid.as_str()));
        assert_eq!(claims["nonce"], "n-42");
        assert_eq!(claims["aud"], "verifier");
        assert_eq!(claims["vp"]["verifiableCredential"][0], "a.b.c");
    }

    #[test]
    fn test_id_token_carries_subject_key() {
        let codec = TokenCodec::default();
        let me = client(Algorithm::Es256k);
        let keys = me.keys(Algorithm::Es256k).unwrap();
        let request = AuthenticationRequest::parse("openid://?client_id=app&nonce=n", &codec).unwrap();

        let token = build_id_token(&codec, &me, keys, &request).unwrap();
        let claims = codec.verify_jwt(&token, &keys.public).unwrap();
        assert_eq!(claims["did"], me.did.as_str());
        assert_eq!(claims["sub_jwk"]["kid"], keys.kid.as_str());
    }
}
