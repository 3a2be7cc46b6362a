// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Session Context
//!
//! Mutable state threaded through one scenario's command sequence: the active
//! identity, issued tokens, the in-flight transaction, flow-scoped variables
//! and the HTTP header overlay.
//!
//! ## Invariants
//!
//! - At most one identity is active. Steps that need one fail fast with
//!   [`SessionError::NoActiveIdentity`].
//! - Every mutation is visible to the next command immediately.
//! - One context per [`Scenario`]; contexts are never shared between scenarios.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::authorization::Authorization;
use crate::domain::identity::{Client, IdentityStore};
use crate::domain::siop::PresentationRecord;
use crate::domain::transaction::{TransactionDescriptor, TransactionError, TransactionPatch};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No active identity: select one with 'using user <ALG> <did1|did2>'")]
    NoActiveIdentity,

    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("No {0} token in session")]
    NoToken(TokenKind),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Values held in flow-scoped variables.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionValue {
    Text(String),
    Number(f64),
    Json(Value),
    /// Compact JWT / JWS.
    Token(String),
}

/// Three base64url segments whose first decodes to a JSON object header.
fn is_compact_token(raw: &str) -> bool {
    let parts: Vec<&str> = raw.split('.').collect();
    let [header, payload, signature] = parts.as_slice() else {
        return false;
    };
    if header.is_empty() || payload.is_empty() {
        return false;
    }
    let decoded_header = match URL_SAFE_NO_PAD.decode(header) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    matches!(serde_json::from_slice::<Value>(&decoded_header), Ok(Value::Object(_)))
        && URL_SAFE_NO_PAD.decode(payload).is_ok()
        && URL_SAFE_NO_PAD.decode(signature).is_ok()
}

impl SessionValue {
    /// Classify a raw string from a script line.
    pub fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return SessionValue::Number(n);
            }
        }
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(json) = serde_json::from_str::<Value>(trimmed) {
                return SessionValue::Json(json);
            }
        }
        if is_compact_token(trimmed) {
            return SessionValue::Token(trimmed.to_string());
        }
        SessionValue::Text(raw.to_string())
    }

    pub fn as_token(&self) -> Option<&str> {
        match self {
            SessionValue::Token(token) => Some(token),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SessionValue::Text(s) | SessionValue::Token(s) => Value::String(s.clone()),
            SessionValue::Number(n) => serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            SessionValue::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for SessionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionValue::Text(s) | SessionValue::Token(s) => f.write_str(s),
            SessionValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            SessionValue::Number(n) => write!(f, "{}", n),
            SessionValue::Json(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Bearer,
    OAuth2,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Bearer => f.write_str("bearer"),
            TokenKind::OAuth2 => f.write_str("OAuth2"),
        }
    }
}

/// Headers added to every outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderOverlay {
    pub authorization: Option<String>,
    pub conformance: Option<String>,
}

impl HeaderOverlay {
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(auth) = &self.authorization {
            pairs.push(("Authorization", auth.clone()));
        }
        if let Some(trace) = &self.conformance {
            pairs.push(("Conformance", trace.clone()));
        }
        pairs
    }
}

#[derive(Debug, Default)]
pub struct SessionContext {
    active: Option<Arc<Client>>,
    bearer_token: Option<String>,
    oauth2_token: Option<String>,
    transaction: TransactionDescriptor,
    variables: HashMap<String, SessionValue>,
    headers: HeaderOverlay,
    last_presentation: Option<PresentationRecord>,
    last_authorization: Option<Authorization>,
    revoked_credentials: HashSet<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate an identity, or clear the active one with `None`.
    pub fn set_active(&mut self, client: Option<Arc<Client>>) {
        self.active = client;
    }

    pub fn active(&self) -> Result<Arc<Client>, SessionError> {
        self.active.clone().ok_or(SessionError::NoActiveIdentity)
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// Store a token and point the `Authorization` header at it.
    pub fn set_token(&mut self, kind: TokenKind, value: impl Into<String>) {
        let value = value.into();
        self.headers.authorization = Some(format!("Bearer {}", value));
        match kind {
            TokenKind::Bearer => self.bearer_token = Some(value),
            TokenKind::OAuth2 => self.oauth2_token = Some(value),
        }
    }

    pub fn token(&self, kind: TokenKind) -> Result<&str, SessionError> {
        match kind {
            TokenKind::Bearer => self.bearer_token.as_deref(),
            TokenKind::OAuth2 => self.oauth2_token.as_deref(),
        }
        .ok_or(SessionError::NoToken(kind))
    }

    pub fn set_transaction(&mut self, patch: TransactionPatch) -> Result<(), SessionError> {
        Ok(self.transaction.merge(patch)?)
    }

    pub fn transaction(&self) -> &TransactionDescriptor {
        &self.transaction
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: SessionValue) {
        self.variables.insert(key.into(), value);
    }

    pub fn get_variable(&self, key: &str) -> Result<&SessionValue, SessionError> {
        self.variables
            .get(key)
            .ok_or_else(|| SessionError::UnknownVariable(key.to_string()))
    }

    pub fn set_conformance_header(&mut self, trace_id: Option<String>) -> String {
        let trace_id = trace_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.headers.conformance = Some(trace_id.clone());
        trace_id
    }

    pub fn headers(&self) -> &HeaderOverlay {
        &self.headers
    }

    pub fn record_presentation(&mut self, record: PresentationRecord) {
        self.last_presentation = Some(record);
    }

    pub fn last_presentation(&self) -> Option<&PresentationRecord> {
        self.last_presentation.as_ref()
    }

    pub fn record_authorization(&mut self, authorization: Authorization) {
        self.last_authorization = Some(authorization);
    }

    pub fn last_authorization(&self) -> Option<&Authorization> {
        self.last_authorization.as_ref()
    }

    pub fn revoke_credential(&mut self, id: impl Into<String>) {
        self.revoked_credentials.insert(id.into());
    }

    pub fn is_revoked(&self, id: &str) -> bool {
        self.revoked_credentials.contains(id)
    }
}

/// One independent scenario: a session plus the identities it created.
#[derive(Debug, Default)]
pub struct Scenario {
    pub session: SessionContext,
    pub identities: IdentityStore,
}

impl Scenario {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.session = SessionContext::new();
        self.identities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{Algorithm, IdentityKind};
    use crate::domain::transaction::TransactionTarget;
    use crate::infrastructure::crypto::SecretKey;
    use serde_json::json;

    #[test]
    fn test_value_classification() {
        assert_eq!(SessionValue::classify("42"), SessionValue::Number(42.0));
        assert_eq!(SessionValue::classify(r#"{"a":1}"#), SessionValue::Json(json!({"a": 1})));
        assert_eq!(
            SessionValue::classify("eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJ4In0.c2ln"),
            SessionValue::Token("eyJhbGciOiJFUzI1NiJ9.eyJzdWIiOiJ4In0.c2ln".into())
        );
        assert_eq!(SessionValue::classify("did:ebsi:zAbc"), SessionValue::Text("did:ebsi:zAbc".into()));
        assert_eq!(SessionValue::classify("1.2.3"), SessionValue::Text("1.2.3".into()));
        assert_eq!(SessionValue::classify("v1.alpha.beta"), SessionValue::Text("v1.alpha.beta".into()));
        assert_eq!(
            SessionValue::classify("eyJhbGciOiJFUzI1NksifQ.eyJzdWIiOiJ4In0."),
            SessionValue::Token("eyJhbGciOiJFUzI1NksifQ.eyJzdWIiOiJ4In0.".into())
        );
        assert_eq!(SessionValue::classify("{broken"), SessionValue::Text("{broken".into()));
        assert_eq!(SessionValue::Number(7.0).to_string(), "7");
    }

    #[test]
    fn test_no_active_identity() {
        let mut session = SessionContext::new();
        assert!(matches!(session.active(), Err(SessionError::NoActiveIdentity)));

        let client = Client::new(
            IdentityKind::LegalEntity,
            None,
            vec![SecretKey::generate(Algorithm::Es256).unwrap()],
        )
        .unwrap();
        session.set_active(Some(Arc::new(client)));
        assert!(session.active().is_ok());

        session.set_active(None);
        assert!(matches!(session.active(), Err(SessionError::NoActiveIdentity)));
    }

    #[test]
    fn test_token_sets_authorization_header() {
        let mut session = SessionContext::new();
        session.set_token(TokenKind::OAuth2, "a.b.c");

        assert_eq!(session.token(TokenKind::OAuth2).unwrap(), "a.b.c");
        assert!(matches!(session.token(TokenKind::Bearer), Err(SessionError::NoToken(TokenKind::Bearer))));
        assert_eq!(session.headers().pairs(), vec![("Authorization", "Bearer a.b.c".to_string())]);
    }

    #[test]
    fn test_conformance_header_generated_when_new() {
        let mut session = SessionContext::new();
        let generated = session.set_conformance_header(None);
        assert!(Uuid::parse_str(&generated).is_ok());
        assert_eq!(session.set_conformance_header(Some("trace-1".into())), "trace-1");
        assert_eq!(session.headers().conformance.as_deref(), Some("trace-1"));
    }

    #[test]
    fn test_reset_tears_down_everything() {
        let mut scenario = Scenario::new();
        let client = scenario.identities.register(
            Client::new(
                IdentityKind::NaturalPerson,
                None,
                vec![SecretKey::generate(Algorithm::EdDsa).unwrap()],
            )
            .unwrap(),
        );
        scenario.session.set_active(Some(client));
        scenario.session.set_variable("x", SessionValue::Text("y".into()));
        scenario
            .session
            .set_transaction(TransactionPatch {
                target: Some(TransactionTarget::Tar),
                ..Default::default()
            })
            .unwrap();

        scenario.reset();

        assert!(scenario.identities.is_empty());
        assert!(!scenario.session.has_active());
        assert!(scenario.session.get_variable("x").is_err());
        assert_eq!(scenario.session.transaction().target, None);
    }
}
