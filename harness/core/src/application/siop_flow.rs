// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! SIOP Presentation Flow
//!
//! Presents self-issued credentials held in session variables to the
//! authorisation API's verifier. The capability table is consulted before the
//! first network call. A 4xx answer from the verifier ends in `Rejected` and
//! is recorded for the conformance checker; it is not an error.

use tracing::{info, warn};

use crate::application::error::{AtStep, FlowError, FlowStep};
use crate::domain::identity::{Algorithm, Capability, Flow};
use crate::domain::session::SessionContext;
use crate::domain::siop::{AuthenticationRequest, PresentationOutcome, PresentationRecord, SiopExchange};
use crate::infrastructure::clients::authorisation::PRESENTATION_SCOPE;
use crate::infrastructure::clients::{AuthorisationClient, ClientError};
use crate::infrastructure::jwt::TokenCodec;
use crate::infrastructure::presentation::build_presentation;

pub struct SiopFlow<'a> {
    pub authorisation: &'a AuthorisationClient,
    pub codec: &'a TokenCodec,
}

impl SiopFlow<'_> {
    pub async fn run(
        &self,
        session: &mut SessionContext,
        algorithm: Algorithm,
        credential_vars: &[String],
    ) -> Result<PresentationOutcome, FlowError> {
        let holder = session.active().at(FlowStep::Identity)?;
        Capability::require(Flow::Siop, algorithm, holder.kind).at(FlowStep::Identity)?;
        let keys = holder.keys(algorithm).at(FlowStep::Identity)?.clone();

        let mut credentials = Vec::with_capacity(credential_vars.len());
        for name in credential_vars {
            let value = session.get_variable(name).at(FlowStep::Presentation)?;
            let token = value.as_token().ok_or_else(|| {
                FlowError::malformed(FlowStep::Presentation, format!("variable '{}' does not hold a credential token", name))
            })?;
            credentials.push(token.to_string());
        }

        let mut exchange = SiopExchange::new(algorithm);
        let challenge = self
            .authorisation
            .request_authentication(PRESENTATION_SCOPE, session.headers())
            .await
            .at(FlowStep::Challenge)?;
        let request = AuthenticationRequest::parse(&challenge.uri, self.codec).at(FlowStep::Challenge)?;
        exchange.request_received(request.clone()).at(FlowStep::Challenge)?;

        let vp_token =
            build_presentation(self.codec, &holder, &keys, &credentials, &request).at(FlowStep::Presentation)?;
        exchange.presentation_built(vp_token.clone()).at(FlowStep::Presentation)?;

        exchange.submitted().at(FlowStep::PresentationSubmission)?;
        let outcome = match self
            .authorisation
            .submit_presentation(&vp_token, &request.nonce, session.headers())
            .await
        {
            Ok(response) => PresentationOutcome::Verified { response },
            Err(ClientError::HttpStatus { status, body }) if (400..500).contains(&status) => {
                PresentationOutcome::Rejected { status, body }
            }
            Err(e) => return Err(FlowError::new(FlowStep::PresentationSubmission, e)),
        };
        let state = exchange.conclude(&outcome).at(FlowStep::PresentationSubmission)?;

        match &outcome {
            PresentationOutcome::Verified { .. } => info!(holder = %holder.did, %algorithm, ?state, "Presentation verified"),
            PresentationOutcome::Rejected { status, .. } => {
                warn!(holder = %holder.did, %algorithm, status, "Presentation rejected by verifier")
            }
        }

        session.record_presentation(PresentationRecord {
            algorithm,
            holder: holder.did.clone(),
            credentials,
            vp_token,
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::harness_config::TimeoutConfig;
    use crate::domain::identity::{Client, IdentityKind};
    use crate::domain::session::SessionValue;
    use crate::infrastructure::clients::HttpTransport;
    use crate::infrastructure::crypto::keys::tests::test_secret;

    fn flow_parts(url: &str) -> (AuthorisationClient, TokenCodec) {
        (
            AuthorisationClient::new(Arc::new(HttpTransport::new(TimeoutConfig::default())), url),
            TokenCodec::default(),
        )
    }

    #[tokio::test]
    async fn test_natural_person_rsa_fails_before_network() {
        // Nothing listens on the discard port: any request would surface a NetworkError.
        let (authorisation, codec) = flow_parts("http://127.0.0.1:9");
        let flow = SiopFlow {
            authorisation: &authorisation,
            codec: &codec,
        };
        let person = Client::new(IdentityKind::NaturalPerson, None, vec![test_secret(Algorithm::Rs256)]).unwrap();
        let mut session = SessionContext::new();
        session.set_active(Some(Arc::new(person)));

        let err = flow.run(&mut session, Algorithm::Rs256, &[]).await.unwrap_err();

        assert_eq!(err.kind_name(), "UnsupportedKeyType");
        assert!(err.matches("key pair generation for RSA"));
        assert!(session.last_presentation().is_none());
    }

    #[tokio::test]
    async fn test_verifier_refusal_is_recorded_outcome() {
        let mut server = mockito::Server::new_async().await;
        let _challenge = server
            .mock("POST", "/authentication-requests")
            .with_status(200)
            .with_body(r#"{"uri": "openid://?client_id=verifier&nonce=n-9"}"#)
            .create_async()
            .await;
        let _refusal = server
            .mock("POST", "/presentations")
            .with_status(400)
            .with_body(r#"{"title": "Credential expired"}"#)
            .create_async()
            .await;

        let (authorisation, codec) = flow_parts(&server.url());
        let flow = SiopFlow {
            authorisation: &authorisation,
            codec: &codec,
        };
        let holder = Client::new(IdentityKind::LegalEntity, None, vec![test_secret(Algorithm::Es256)]).unwrap();
        let mut session = SessionContext::new();
        session.set_active(Some(Arc::new(holder)));
        session.set_variable("vc", SessionValue::Token("aGVhZGVy.Y2xhaW1z.c2ln".into()));

        let outcome = flow
            .run(&mut session, Algorithm::Es256, &["vc".to_string()])
            .await
            .unwrap();

        assert!(matches!(outcome, PresentationOutcome::Rejected { status: 400, .. }));
        let record = session.last_presentation().unwrap();
        assert!(!record.accepted());
        assert_eq!(record.credentials, vec!["aGVhZGVy.Y2xhaW1z.c2ln".to_string()]);
    }

    #[tokio::test]
    async fn test_verifier_outage_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _challenge = server
            .mock("POST", "/authentication-requests")
            .with_status(200)
            .with_body(r#"{"uri": "openid://?client_id=verifier&nonce=n-9"}"#)
            .create_async()
            .await;
        let _outage = server
            .mock("POST", "/presentations")
            .with_status(503)
            .create_async()
            .await;

        let (authorisation, codec) = flow_parts(&server.url());
        let flow = SiopFlow {
            authorisation: &authorisation,
            codec: &codec,
        };
        let holder = Client::new(IdentityKind::LegalEntity, None, vec![test_secret(Algorithm::EdDsa)]).unwrap();
        let mut session = SessionContext::new();
        session.set_active(Some(Arc::new(holder)));

        let err = flow.run(&mut session, Algorithm::EdDsa, &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.step, FlowStep::PresentationSubmission);
    }
}
