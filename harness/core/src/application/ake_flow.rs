// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Authenticated Key Exchange Flow
//!
//! Drives [`AkeHandshake`] against the authorisation API:
//!
//! 1. request a challenge URI and decode its nonce;
//! 2. answer with an id token wrapped in a signed Ake1 envelope;
//! 3. verify the responder's detached signature with the key the trusted-app
//!    directory advertises for the header `kid`, then the nonce and DID
//!    bindings;
//! 4. open the sealed session grant and store its access token.
//!
//! Nothing is written into the session unless every step succeeds.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::application::error::{AtStep, FlowError, FlowStep};
use crate::domain::ake::{Ake1Envelope, Ake1SigPayload, AkeHandshake, AkeSessionGrant, AkeViolation};
use crate::domain::directory::KeyDirectory;
use crate::domain::identity::{Algorithm, Capability, Client, Flow, KeySet};
use crate::domain::session::{SessionContext, TokenKind};
use crate::domain::siop::AuthenticationRequest;
use crate::infrastructure::clients::authorisation::{SiopSessionRequest, DID_AUTHN_SCOPE};
use crate::infrastructure::clients::AuthorisationClient;
use crate::infrastructure::crypto::sealing;
use crate::infrastructure::jwt::{encode_segment, TokenCodec, TokenError};
use crate::infrastructure::presentation::build_id_token;

pub struct AkeFlow<'a> {
    pub authorisation: &'a AuthorisationClient,
    pub directory: &'a dyn KeyDirectory,
    pub codec: &'a TokenCodec,
    /// Trusted-app name whose keys sign the responder envelope.
    pub resource_app: &'a str,
}

impl AkeFlow<'_> {
    /// Run the handshake for the active identity. Returns the access token.
    pub async fn run(&self, session: &mut SessionContext, algorithm: Algorithm) -> Result<String, FlowError> {
        let client = session.active().at(FlowStep::Identity)?;
        let keys = client.keys(algorithm).at(FlowStep::Identity)?.clone();
        Capability::require(Flow::Ake, algorithm, client.kind).at(FlowStep::Identity)?;

        let mut handshake = AkeHandshake::new(algorithm, client.did.clone());
        match self.exchange(&mut handshake, session, &client, &keys).await {
            Ok(grant) => {
                session.set_token(TokenKind::OAuth2, grant.access_token.clone());
                session.set_token(TokenKind::Bearer, grant.access_token.clone());
                info!(did = %client.did, %algorithm, "AKE authenticated");
                Ok(grant.access_token)
            }
            Err(e) => {
                handshake.fail();
                warn!(did = %client.did, %algorithm, error = %e, "AKE failed");
                Err(e)
            }
        }
    }

    async fn exchange(
        &self,
        handshake: &mut AkeHandshake,
        session: &SessionContext,
        client: &Client,
        keys: &KeySet,
    ) -> Result<AkeSessionGrant, FlowError> {
        handshake.challenge_requested().at(FlowStep::Challenge)?;
        let challenge = self
            .authorisation
            .request_authentication(DID_AUTHN_SCOPE, session.headers())
            .await
            .at(FlowStep::Challenge)?;
        let request = AuthenticationRequest::parse(&challenge.uri, self.codec).at(FlowStep::Challenge)?;
        handshake.exchanging(request.nonce.clone()).at(FlowStep::Challenge)?;
        debug!(nonce = %request.nonce, "AKE challenge received");

        let id_token = build_id_token(self.codec, client, keys, &request).at(FlowStep::AkeExchange)?;
        let ake1 = self.initiator_envelope(client, keys, &request.nonce, &id_token)?;
        let response = self
            .authorisation
            .create_siop_session(&SiopSessionRequest { id_token, ake1 }, session.headers())
            .await
            .at(FlowStep::AkeExchange)?;

        self.verify_response(&response).await?;
        handshake.check_response(&response).at(FlowStep::AkeVerification)?;

        let opened = sealing::open(&keys.secret, &response.ake1_enc_payload).at(FlowStep::SessionGrant)?;
        let grant: AkeSessionGrant = serde_json::from_slice(&opened)
            .map_err(|e| FlowError::malformed(FlowStep::SessionGrant, format!("session grant: {}", e)))?;
        if grant.nonce != request.nonce {
            return Err(FlowError::new(
                FlowStep::SessionGrant,
                AkeViolation::NonceMismatch {
                    expected: request.nonce,
                    actual: grant.nonce,
                },
            ));
        }

        handshake.authenticated().at(FlowStep::SessionGrant)?;
        Ok(grant)
    }

    fn initiator_envelope(
        &self,
        client: &Client,
        keys: &KeySet,
        nonce: &str,
        id_token: &str,
    ) -> Result<Ake1Envelope, FlowError> {
        let ake1_enc_payload = encode_segment(id_token.as_bytes());
        let inner = Ake1SigPayload {
            ake1_enc_payload: ake1_enc_payload.clone(),
            ake1_nonce: nonce.to_string(),
            did: client.did.clone(),
            iat: Utc::now().timestamp(),
            iss: client.did.clone(),
        };
        let payload: Value = serde_json::to_value(&inner)
            .map_err(|e| FlowError::malformed(FlowStep::AkeExchange, e.to_string()))?;
        let detached = self
            .codec
            .build_detached_envelope(&payload, &keys.secret, Some(&keys.kid))
            .at(FlowStep::AkeExchange)?;

        Ok(Ake1Envelope {
            ake1_enc_payload,
            ake1_sig_payload: inner,
            ake1_jws_detached: detached.detached_signature,
        })
    }

    async fn verify_response(&self, response: &Ake1Envelope) -> Result<(), FlowError> {
        let header = self
            .codec
            .detached_header(&response.ake1_jws_detached)
            .at(FlowStep::AkeVerification)?;
        let key = self
            .directory
            .resolve_app_key(self.resource_app, header.kid.as_deref())
            .await
            .at(FlowStep::AkeVerification)?;

        let envelope = response
            .detached()
            .map_err(|e| FlowError::new(FlowStep::AkeVerification, TokenError::TokenMalformed(e.to_string())))?;
        self.codec
            .verify_detached_envelope(&envelope, &key)
            .at(FlowStep::AkeVerification)?;
        debug!(kid = ?header.kid, "AKE response signature verified");
        Ok(())
    }
}
