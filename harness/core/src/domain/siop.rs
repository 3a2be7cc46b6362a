// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # SIOP Presentation Exchange
//!
//! ```text
//! Init → RequestReceived → PresentationBuilt → Submitted → Verified | Rejected
//! ```
//!
//! A verifier refusing the presentation (4xx) is the `Rejected` terminal
//! state, recorded as an outcome for the conformance checker. It is not an
//! error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::identity::Algorithm;
use crate::infrastructure::jwt::{AudienceClaim, Claims, TokenCodec, TokenError};

/// Authentication request decoded from a challenge URI
/// (`openid://?response_type=id_token&client_id=…&nonce=…&request=<jwt>`).
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationRequest {
    pub uri: String,
    pub nonce: String,
    pub client_id: Option<String>,
    pub audience: Option<String>,
    pub scope: Option<String>,
    /// Claims of the embedded `request` object, decoded without verification.
    pub request_claims: Option<Claims>,
}

impl AuthenticationRequest {
    pub fn parse(uri: &str, codec: &TokenCodec) -> Result<Self, TokenError> {
        let query = uri
            .split_once('?')
            .map(|(_, query)| query)
            .ok_or_else(|| TokenError::TokenMalformed(format!("challenge URI has no query: {}", uri)))?;

        let mut nonce = None;
        let mut client_id = None;
        let mut scope = None;
        let mut request = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "nonce" => nonce = Some(value.into_owned()),
                "client_id" => client_id = Some(value.into_owned()),
                "scope" => scope = Some(value.into_owned()),
                "request" => request = Some(value.into_owned()),
                _ => {}
            }
        }

        let request_claims = match request {
            Some(jwt) => Some(codec.decode_unverified(&jwt)?.1),
            None => None,
        };
        let claim = |name: &str| {
            request_claims
                .as_ref()
                .and_then(|claims| claims.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let nonce = nonce
            .or_else(|| claim("nonce"))
            .ok_or_else(|| TokenError::MissingClaim("nonce".into()))?;
        let client_id = client_id.or_else(|| claim("client_id"));
        let audience = request_claims
            .as_ref()
            .and_then(|claims| claims.get("aud"))
            .and_then(|aud| serde_json::from_value::<AudienceClaim>(aud.clone()).ok())
            .and_then(|aud| aud.primary().map(str::to_string))
            .or_else(|| client_id.clone());

        Ok(Self {
            uri: uri.to_string(),
            nonce,
            client_id,
            audience,
            scope,
            request_claims,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PresentationOutcome {
    Verified { response: Value },
    Rejected { status: u16, body: String },
}

/// Captured result of the last presentation, consumed by conformance checks.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationRecord {
    pub algorithm: Algorithm,
    pub holder: String,
    /// Credential JWTs bound into the presentation.
    pub credentials: Vec<String>,
    pub vp_token: String,
    pub outcome: PresentationOutcome,
}

impl PresentationRecord {
    pub fn accepted(&self) -> bool {
        matches!(self.outcome, PresentationOutcome::Verified { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiopState {
    Init,
    RequestReceived,
    PresentationBuilt,
    Submitted,
    Verified,
    Rejected,
}

#[derive(Debug, Error)]
#[error("Invalid SIOP transition from {from:?} to {to:?}")]
pub struct SiopTransitionError {
    pub from: SiopState,
    pub to: SiopState,
}

#[derive(Debug, Clone)]
pub struct SiopExchange {
    pub algorithm: Algorithm,
    state: SiopState,
    request: Option<AuthenticationRequest>,
    vp_token: Option<String>,
}

impl SiopExchange {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            state: SiopState::Init,
            request: None,
            vp_token: None,
        }
    }

    pub fn state(&self) -> SiopState {
        self.state
    }

    pub fn request(&self) -> Option<&AuthenticationRequest> {
        self.request.as_ref()
    }

    pub fn vp_token(&self) -> Option<&str> {
        self.vp_token.as_deref()
    }

    fn advance(&mut self, from: SiopState, to: SiopState) -> Result<(), SiopTransitionError> {
        if self.state != from {
            return Err(SiopTransitionError { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    pub fn request_received(&mut self, request: AuthenticationRequest) -> Result<(), SiopTransitionError> {
        self.advance(SiopState::Init, SiopState::RequestReceived)?;
        self.request = Some(request);
        Ok(())
    }

    pub fn presentation_built(&mut self, vp_token: String) -> Result<(), SiopTransitionError> {
        self.advance(SiopState::RequestReceived, SiopState::PresentationBuilt)?;
        self.vp_token = Some(vp_token);
        Ok(())
    }

    pub fn submitted(&mut self) -> Result<(), SiopTransitionError> {
        self.advance(SiopState::PresentationBuilt, SiopState::Submitted)
    }

    pub fn conclude(&mut self, outcome: &PresentationOutcome) -> Result<SiopState, SiopTransitionError> {
        let to = match outcome {
            PresentationOutcome::Verified { .. } => SiopState::Verified,
            PresentationOutcome::Rejected { .. } => SiopState::Rejected,
        };
        self.advance(SiopState::Submitted, to)?;
        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::jwt::JwsHeader;
    use crate::infrastructure::crypto::SecretKey;
    use serde_json::json;

    #[test]
    fn test_parse_nonce_from_query() {
        let request = AuthenticationRequest::parse(
            "openid://?response_type=id_token&client_id=https%3A%2F%2Fapi%2Fsiop-sessions&scope=openid%20did_authn&nonce=abc",
            &TokenCodec::default(),
        )
        .unwrap();

        assert_eq!(request.nonce, "abc");
        assert_eq!(request.client_id.as_deref(), Some("https://api/siop-sessions"));
        assert_eq!(request.audience.as_deref(), Some("https://api/siop-sessions"));
        assert_eq!(request.scope.as_deref(), Some("openid did_authn"));
    }

    #[test]
    fn test_parse_nonce_from_request_object() {
        let codec = TokenCodec::default();
        let key = SecretKey::generate(Algorithm::Es256k).unwrap();
        let claims = json!({"nonce": "from-jwt", "client_id": "verifier", "aud": ["aud-1"]});
        let jwt = codec
            .sign_jwt(claims.as_object().unwrap(), &JwsHeader::new(Algorithm::Es256k), &key)
            .unwrap();

        let request = AuthenticationRequest::parse(&format!("openid://?request={}", jwt), &codec).unwrap();
        assert_eq!(request.nonce, "from-jwt");
        assert_eq!(request.client_id.as_deref(), Some("verifier"));
        assert_eq!(request.audience.as_deref(), Some("aud-1"));
    }

    #[test]
    fn test_missing_nonce_is_structural() {
        assert!(matches!(
            AuthenticationRequest::parse("openid://?client_id=x", &TokenCodec::default()),
            Err(TokenError::MissingClaim(claim)) if claim == "nonce"
        ));
    }

    #[test]
    fn test_rejected_is_terminal_outcome() {
        let mut exchange = SiopExchange::new(Algorithm::Es256);
        assert!(exchange.submitted().is_err());

        let request = AuthenticationRequest::parse("openid://?nonce=n", &TokenCodec::default()).unwrap();
        exchange.request_received(request).unwrap();
        exchange.presentation_built("a.b.c".into()).unwrap();
        exchange.submitted().unwrap();

        let state = exchange
            .conclude(&PresentationOutcome::Rejected { status: 400, body: "expired".into() })
            .unwrap();
        assert_eq!(state, SiopState::Rejected);
        assert!(exchange.conclude(&PresentationOutcome::Verified { response: Value::Null }).is_err());
    }
}
