// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Authorisation API Client
//
// Challenge issuance, the AKE session exchange and SIOP presentation
// submission against the authorisation service.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ClientError, HttpTransport};
use crate::domain::ake::Ake1Envelope;
use crate::domain::harness_config::CallKind;
use crate::domain::session::HeaderOverlay;

pub const DID_AUTHN_SCOPE: &str = "openid did_authn";

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticationRequestResponse {
    pub uri: String,
}

pub const PRESENTATION_SCOPE: &str = "openid";

/// Initiator's half of the AKE exchange: the id token plus an Ake1 envelope
/// whose `ake1_enc_payload` is the base64url id token.
#[derive(Debug, Clone, Serialize)]
pub struct SiopSessionRequest {
    pub id_token: String,
    #[serde(flatten)]
    pub ake1: Ake1Envelope,
}

#[derive(Clone)]
pub struct AuthorisationClient {
    transport: Arc<HttpTransport>,
    base_url: String,
}

impl AuthorisationClient {
    pub fn new(transport: Arc<HttpTransport>, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn request_authentication(
        &self,
        scope: &str,
        headers: &HeaderOverlay,
    ) -> Result<AuthenticationRequestResponse, ClientError> {
        self.transport
            .post_json(
                &self.url("/authentication-requests"),
                &json!({ "scope": scope }),
                headers,
                CallKind::ChallengeIssuance,
            )
            .await
    }

    pub async fn create_siop_session(
        &self,
        request: &SiopSessionRequest,
        headers: &HeaderOverlay,
    ) -> Result<Ake1Envelope, ClientError> {
        self.transport
            .post_json(&self.url("/siop-sessions"), request, headers, CallKind::Default)
            .await
    }

    /// Verifier response body. A 4xx refusal is returned as `HttpStatus`.
    pub async fn submit_presentation(
        &self,
        vp_token: &str,
        nonce: &str,
        headers: &HeaderOverlay,
    ) -> Result<Value, ClientError> {
        self.transport
            .post_json(
                &self.url("/presentations"),
                &json!({ "vp_token": vp_token, "nonce": nonce }),
                headers,
                CallKind::Default,
            )
            .await
    }
}
