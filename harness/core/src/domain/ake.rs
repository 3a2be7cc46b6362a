// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Authenticated Key Exchange
//!
//! Wire types for the Ake1 envelope and the [`AkeHandshake`] state machine:
//!
//! ```text
//! Init → AwaitingChallenge → Exchanging → Authenticated | Failed
//! ```
//!
//! ## Invariants
//!
//! - The responder's inner `ake1_enc_payload` equals the outer one.
//! - The responder echoes the challenge nonce in `ake1_nonce`.
//! - The responder's inner `did` is the DID that initiated the exchange.
//! - `Failed` and `Authenticated` are terminal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::identity::Algorithm;
use crate::infrastructure::jwt::{canonical_json, encode_segment, DetachedEnvelope};

/// Signed inner payload of an Ake1 envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ake1SigPayload {
    pub ake1_enc_payload: String,
    pub ake1_nonce: String,
    pub did: String,
    pub iat: i64,
    pub iss: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ake1Envelope {
    pub ake1_enc_payload: String,
    pub ake1_sig_payload: Ake1SigPayload,
    pub ake1_jws_detached: String,
}

impl Ake1Envelope {
    /// Detached-JWS view: the signature covers the canonical inner payload.
    pub fn detached(&self) -> Result<DetachedEnvelope, serde_json::Error> {
        let payload = serde_json::to_value(&self.ake1_sig_payload)?;
        Ok(DetachedEnvelope {
            encoded_payload: encode_segment(&canonical_json(&payload)),
            detached_signature: self.ake1_jws_detached.clone(),
        })
    }
}

/// Plaintext of the responder's sealed `ake1_enc_payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AkeSessionGrant {
    pub access_token: String,
    pub did: String,
    pub nonce: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AkeState {
    Init,
    AwaitingChallenge,
    Exchanging,
    Authenticated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AkeViolation {
    #[error("inner ake1_enc_payload does not match the outer payload")]
    EncPayloadMismatch,

    #[error("nonce not echoed: expected '{expected}', got '{actual}'")]
    NonceMismatch { expected: String, actual: String },

    #[error("response bound to '{actual}' instead of initiator '{expected}'")]
    DidMismatch { expected: String, actual: String },

    #[error("invalid AKE transition from {from:?} to {to:?}")]
    InvalidTransition { from: AkeState, to: AkeState },
}

#[derive(Debug, Clone)]
pub struct AkeHandshake {
    pub algorithm: Algorithm,
    pub initiator: String,
    state: AkeState,
    nonce: Option<String>,
}

impl AkeHandshake {
    pub fn new(algorithm: Algorithm, initiator: impl Into<String>) -> Self {
        Self {
            algorithm,
            initiator: initiator.into(),
            state: AkeState::Init,
            nonce: None,
        }
    }

    pub fn state(&self) -> AkeState {
        self.state
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    fn advance(&mut self, from: AkeState, to: AkeState) -> Result<(), AkeViolation> {
        if self.state != from {
            return Err(AkeViolation::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    pub fn challenge_requested(&mut self) -> Result<(), AkeViolation> {
        self.advance(AkeState::Init, AkeState::AwaitingChallenge)
    }

    pub fn exchanging(&mut self, nonce: impl Into<String>) -> Result<(), AkeViolation> {
        self.advance(AkeState::AwaitingChallenge, AkeState::Exchanging)?;
        self.nonce = Some(nonce.into());
        Ok(())
    }

    /// Binding checks on a response whose signature already verified.
    pub fn check_response(&self, response: &Ake1Envelope) -> Result<(), AkeViolation> {
        let inner = &response.ake1_sig_payload;
        if inner.ake1_enc_payload != response.ake1_enc_payload {
            return Err(AkeViolation::EncPayloadMismatch);
        }
        let expected = self.nonce.clone().unwrap_or_default();
        if inner.ake1_nonce != expected {
            return Err(AkeViolation::NonceMismatch {
                expected,
                actual: inner.ake1_nonce.clone(),
            });
        }
        if inner.did != self.initiator {
            return Err(AkeViolation::DidMismatch {
                expected: self.initiator.clone(),
                actual: inner.did.clone(),
            });
        }
        Ok(())
    }

    pub fn authenticated(&mut self) -> Result<(), AkeViolation> {
        self.advance(AkeState::Exchanging, AkeState::Authenticated)
    }

    /// Move to `Failed` from any non-terminal state.
    pub fn fail(&mut self) {
        if !matches!(self.state, AkeState::Authenticated | AkeState::Failed) {
            self.state = AkeState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(enc: &str, inner_enc: &str, nonce: &str, did: &str) -> Ake1Envelope {
        Ake1Envelope {
            ake1_enc_payload: enc.into(),
            ake1_sig_payload: Ake1SigPayload {
                ake1_enc_payload: inner_enc.into(),
                ake1_nonce: nonce.into(),
                did: did.into(),
                iat: 1_700_000_000,
                iss: "resource-app".into(),
            },
            ake1_jws_detached: "h..s".into(),
        }
    }

    fn exchanging() -> AkeHandshake {
        let mut handshake = AkeHandshake::new(Algorithm::Es256k, "did:ebsi:zMe");
        handshake.challenge_requested().unwrap();
        handshake.exchanging("n-1").unwrap();
        handshake
    }

    #[test]
    fn test_binding_checks() {
        let handshake = exchanging();
        assert!(handshake.check_response(&response("e", "e", "n-1", "did:ebsi:zMe")).is_ok());
        assert_eq!(
            handshake.check_response(&response("e", "x", "n-1", "did:ebsi:zMe")),
            Err(AkeViolation::EncPayloadMismatch)
        );
        assert!(matches!(
            handshake.check_response(&response("e", "e", "n-2", "did:ebsi:zMe")),
            Err(AkeViolation::NonceMismatch { .. })
        ));
        assert!(matches!(
            handshake.check_response(&response("e", "e", "n-1", "did:ebsi:zOther")),
            Err(AkeViolation::DidMismatch { .. })
        ));
    }

    #[test]
    fn test_terminal_states() {
        let mut handshake = exchanging();
        handshake.authenticated().unwrap();
        handshake.fail();
        assert_eq!(handshake.state(), AkeState::Authenticated);

        let mut failed = AkeHandshake::new(Algorithm::Es256, "did:ebsi:zMe");
        failed.challenge_requested().unwrap();
        failed.fail();
        assert_eq!(failed.state(), AkeState::Failed);
        assert!(failed.exchanging("n").is_err());
    }

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(response("e", "e", "n", "did:ebsi:zMe")).unwrap();
        assert_eq!(value["ake1_sig_payload"]["ake1_nonce"], "n");
        assert!(value.get("ake1_jws_detached").is_some());
    }
}
