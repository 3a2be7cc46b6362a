// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Flow Engine Application Service
//!
//! Interprets one [`Command`] against a [`Scenario`]: resolves the session
//! state the command needs, runs the matching step, and writes results back
//! into the session.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Command dispatch
//! - **Dependencies:** Domain (session, identities, commands), Infrastructure
//!   (service clients, token codec, ledger signing)
//!
//! The engine holds no per-scenario state. One instance serves any number of
//! scenarios, sequentially or in parallel; every call receives the scenario it
//! acts on. Errors from the codec and the clients propagate unchanged, wrapped
//! in a [`FlowError`] naming the failing step.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::application::ake_flow::AkeFlow;
use crate::application::conformance::ConformanceChecker;
use crate::application::error::{AtStep, FlowError, FlowErrorKind, FlowStep};
use crate::application::siop_flow::SiopFlow;
use crate::application::transaction_flow::TransactionFlow;
use crate::domain::command::{Command, CredentialValidity, RpcService};
use crate::domain::conformance::CheckOutcome;
use crate::domain::directory::KeyDirectory;
use crate::domain::harness_config::{CallKind, HarnessConfig};
use crate::domain::identity::{Algorithm, Client, IdentityError, IdentityKind};
use crate::domain::pagination::PageRequest;
use crate::domain::session::{Scenario, SessionValue};
use crate::domain::siop::PresentationOutcome;
use crate::domain::transaction::TransactionTarget;
use crate::infrastructure::clients::notifications::Notification;
use crate::infrastructure::clients::ServiceClients;
use crate::infrastructure::crypto::SecretKey;
use crate::infrastructure::jwt::TokenCodec;
use crate::infrastructure::presentation::issue_credential;

/// Result of a successfully executed command.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Done(String),
    Data(Value),
    Check(CheckOutcome),
}

impl fmt::Display for StepOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutput::Done(message) => f.write_str(message),
            StepOutput::Data(value) => write!(f, "{}", value),
            StepOutput::Check(outcome) => write!(
                f,
                "{}: {{success: {}}}{}",
                outcome.name,
                outcome.success,
                outcome.detail.as_deref().map(|d| format!(" ({})", d)).unwrap_or_default()
            ),
        }
    }
}

fn data<T: Serialize>(step: FlowStep, value: &T) -> Result<StepOutput, FlowError> {
    serde_json::to_value(value)
        .map(StepOutput::Data)
        .map_err(|e| FlowError::malformed(step, e.to_string()))
}

pub struct FlowEngine {
    config: HarnessConfig,
    clients: ServiceClients,
    directory: Arc<dyn KeyDirectory>,
    codec: TokenCodec,
}

impl FlowEngine {
    /// Engine over the services named in `config`. Trusted-app keys are
    /// resolved through the registry.
    pub fn new(config: HarnessConfig) -> Self {
        let clients = ServiceClients::from_config(&config);
        let directory: Arc<dyn KeyDirectory> = Arc::new(clients.registry.clone());
        Self {
            codec: TokenCodec::new(config.spec.clock_skew_secs),
            config,
            clients,
            directory,
        }
    }

    /// Replace the trusted-app key directory.
    pub fn with_directory(mut self, directory: Arc<dyn KeyDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Parse and execute one script line.
    pub async fn execute_line(&self, scenario: &mut Scenario, line: &str) -> Result<StepOutput, FlowError> {
        let command = Command::parse(line).at(FlowStep::Parse)?;
        self.execute(scenario, command).await
    }

    pub async fn execute(&self, scenario: &mut Scenario, command: Command) -> Result<StepOutput, FlowError> {
        let kind = command.kind();
        metrics::counter!("didflow_commands_total", "kind" => kind).increment(1);
        debug!(kind, "Executing command");

        let result = self.dispatch(scenario, command).await;
        if let Err(e) = &result {
            metrics::counter!("didflow_command_failures_total", "kind" => kind).increment(1);
            debug!(kind, step = %e.step, category = %e.category(), "Command failed");
        }
        result
    }

    async fn dispatch(&self, scenario: &mut Scenario, command: Command) -> Result<StepOutput, FlowError> {
        let clients = &self.clients;
        match command {
            Command::ClearIdentity => {
                scenario.session.set_active(None);
                Ok(StepOutput::Done("no active identity".into()))
            }

            Command::UseIdentity {
                algorithms,
                kind,
                key,
                did,
            } => self.use_identity(scenario, algorithms, kind, key, did).await,

            Command::Authenticate { algorithm } => {
                let flow = AkeFlow {
                    authorisation: &clients.authorisation,
                    directory: self.directory.as_ref(),
                    codec: &self.codec,
                    resource_app: &self.config.spec.resource_app,
                };
                let token = flow.run(&mut scenario.session, algorithm).await?;
                Ok(StepOutput::Done(format!("authenticated ({}): {}", algorithm, token)))
            }

            Command::Present { algorithm, credentials } => {
                let flow = SiopFlow {
                    authorisation: &clients.authorisation,
                    codec: &self.codec,
                };
                match flow.run(&mut scenario.session, algorithm, &credentials).await? {
                    PresentationOutcome::Verified { .. } => Ok(StepOutput::Done("presentation verified".into())),
                    PresentationOutcome::Rejected { status, .. } => {
                        Ok(StepOutput::Done(format!("presentation rejected ({})", status)))
                    }
                }
            }

            Command::IssueCredential {
                variable,
                validity,
                algorithm,
            } => {
                let issuer = scenario.session.active().at(FlowStep::Credential)?;
                let algorithm = match algorithm.or_else(|| issuer.algorithms().next()) {
                    Some(algorithm) => algorithm,
                    None => return Err(FlowError::malformed(FlowStep::Credential, "issuer holds no keys")),
                };
                let keys = issuer.keys(algorithm).at(FlowStep::Credential)?;
                let (id, token) = issue_credential(&self.codec, &issuer, keys, validity, Utc::now().timestamp())
                    .at(FlowStep::Credential)?;
                if validity == CredentialValidity::Revoked {
                    scenario.session.revoke_credential(id.clone());
                }
                scenario.session.set_variable(variable.clone(), SessionValue::Token(token));
                Ok(StepOutput::Done(format!("{} = credential {}", variable, id)))
            }

            Command::Transact { target, method, params } => self.transact(scenario, target, &method, params).await,

            Command::TimestampHashes { hashes } => {
                self.transact(
                    scenario,
                    TransactionTarget::Timestamp,
                    "timestampHashes",
                    Some(json!({ "hashValues": hashes })),
                )
                .await
            }

            Command::GetTimestamp { id } => {
                let record = clients
                    .timestamp
                    .get_timestamp(&id, scenario.session.headers())
                    .await
                    .at(FlowStep::Timestamp)?;
                Ok(StepOutput::Data(record))
            }

            Command::JsonRpc {
                service,
                id,
                method,
                params,
            } => {
                let headers = scenario.session.headers();
                let result = match service {
                    RpcService::Timestamp => {
                        clients
                            .timestamp
                            .rpc()
                            .call_with_id(id, &method, params, headers, CallKind::JsonRpcSubmission)
                            .await
                    }
                    RpcService::Registry => {
                        clients
                            .registry
                            .rpc()
                            .call_with_id(id, &method, params, headers, CallKind::JsonRpcSubmission)
                            .await
                    }
                    RpcService::Ledger => clients.ledger.call(id, &method, params, headers).await,
                }
                .at(FlowStep::JsonRpc)?;
                Ok(StepOutput::Data(result))
            }

            Command::ListApps => {
                let page = clients
                    .registry
                    .list_apps(PageRequest::default(), scenario.session.headers())
                    .await
                    .at(FlowStep::Registry)?;
                data(FlowStep::Registry, &page)
            }

            Command::GetApp { name } => {
                let app = clients
                    .registry
                    .get_app(&name, scenario.session.headers())
                    .await
                    .at(FlowStep::Registry)?;
                data(FlowStep::Registry, &app)
            }

            Command::GetAuthorization { id } => {
                let authorization = clients
                    .registry
                    .get_authorization(&id, scenario.session.headers())
                    .await
                    .at(FlowStep::Registry)?;
                let output = data(FlowStep::Registry, &authorization)?;
                scenario.session.record_authorization(authorization);
                Ok(output)
            }

            Command::SendNotification { to, payload } => {
                let notification = Notification {
                    to,
                    from: scenario.session.active().ok().map(|client| client.did.clone()),
                    payload,
                };
                let response = clients
                    .notifications
                    .send(&notification, scenario.session.headers())
                    .await
                    .at(FlowStep::Notifications)?;
                Ok(StepOutput::Data(response))
            }

            Command::ListNotifications => {
                let page = clients
                    .notifications
                    .list(PageRequest::default(), scenario.session.headers())
                    .await
                    .at(FlowStep::Notifications)?;
                data(FlowStep::Notifications, &page)
            }

            Command::StoreAttribute { payload } => {
                let stored = clients
                    .datahub
                    .store(&payload, scenario.session.headers())
                    .await
                    .at(FlowStep::DataHub)?;
                Ok(StepOutput::Data(stored))
            }

            Command::GetAttribute { id } => {
                let attribute = clients
                    .datahub
                    .get(&id, scenario.session.headers())
                    .await
                    .at(FlowStep::DataHub)?;
                Ok(StepOutput::Data(attribute))
            }

            Command::ListAttributes => {
                let page = clients
                    .datahub
                    .list(scenario.session.headers())
                    .await
                    .at(FlowStep::DataHub)?;
                data(FlowStep::DataHub, &page)
            }

            Command::SetVariable { name, value } => {
                let value = SessionValue::classify(&value);
                let message = format!("{} = {}", name, value);
                scenario.session.set_variable(name, value);
                Ok(StepOutput::Done(message))
            }

            Command::ViewVariable { name } => {
                let value = scenario.session.get_variable(&name).at(FlowStep::Variables)?;
                Ok(StepOutput::Done(format!("{} = {}", name, value)))
            }

            Command::SetConformanceHeader { trace_id } => {
                let trace_id = scenario.session.set_conformance_header(trace_id);
                Ok(StepOutput::Done(format!("Conformance: {}", trace_id)))
            }

            Command::Check { name } => {
                let outcome = ConformanceChecker::new(&self.codec).check(name, scenario, Utc::now());
                info!(check = %name, success = outcome.success, "Conformance check evaluated");
                Ok(StepOutput::Check(outcome))
            }

            Command::Expect(_) => Err(FlowError::new(
                FlowStep::Expectation,
                FlowErrorKind::ExpectationFailed("expect must directly follow a failing command".into()),
            )),

            Command::Reset => {
                scenario.reset();
                Ok(StepOutput::Done("scenario reset".into()))
            }
        }
    }

    async fn use_identity(
        &self,
        scenario: &mut Scenario,
        algorithms: Vec<Algorithm>,
        kind: IdentityKind,
        key: Option<String>,
        did: Option<String>,
    ) -> Result<StepOutput, FlowError> {
        let mut secrets = Vec::with_capacity(algorithms.len());
        for algorithm in &algorithms {
            let secret = match (&key, algorithm) {
                (None, _) => SecretKey::generate(*algorithm),
                (Some(path), Algorithm::Rs256) => {
                    let pem = tokio::fs::read_to_string(path).await.map_err(|e| {
                        FlowError::malformed(FlowStep::Identity, format!("cannot read RSA key '{}': {}", path, e))
                    })?;
                    SecretKey::from_rsa_pem(&pem)
                }
                (Some(hex), _) => SecretKey::from_hex(*algorithm, hex),
            }
            .map_err(IdentityError::from)
            .at(FlowStep::Identity)?;
            secrets.push(secret);
        }

        let client = Client::new(kind, did, secrets).at(FlowStep::Identity)?;
        let client = scenario.identities.register(client);
        scenario.session.set_active(Some(client.clone()));

        let names: Vec<&str> = algorithms.iter().map(Algorithm::as_str).collect();
        info!(did = %client.did, %kind, algorithms = ?names, "Identity activated");
        Ok(StepOutput::Done(format!("using {} ({}) with {}", client.did, kind, names.join(","))))
    }

    async fn transact(
        &self,
        scenario: &mut Scenario,
        target: TransactionTarget,
        method: &str,
        params: Option<Value>,
    ) -> Result<StepOutput, FlowError> {
        let flow = TransactionFlow {
            timestamp_rpc: self.clients.timestamp.rpc(),
            registry_rpc: self.clients.registry.rpc(),
            ledger: &self.clients.ledger,
            polling: &self.config.spec.polling,
            chain_id: self.config.spec.ledger.chain_id,
        };
        let receipt = flow.run(&mut scenario.session, target, method, params).await?;
        Ok(StepOutput::Done(format!(
            "{} {} mined in block {}",
            target,
            receipt.transaction_hash,
            receipt.block_number.map(|n| n.to_string()).unwrap_or_else(|| "?".into())
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::harness_config::ServiceUrls;

    fn offline_engine() -> FlowEngine {
        let mut config = HarnessConfig::default();
        config.spec.services = ServiceUrls::from_base("http://127.0.0.1:9");
        FlowEngine::new(config)
    }

    #[tokio::test]
    async fn test_steps_need_an_active_identity() {
        let engine = offline_engine();
        let mut scenario = Scenario::new();

        engine.execute_line(&mut scenario, "using user null").await.unwrap();
        for line in [
            "onboarding authentication ES256K",
            "authorisation siop ES256",
            "credential issue vc valid",
            "transaction timestamp timestampHashes",
        ] {
            let err = engine.execute_line(&mut scenario, line).await.unwrap_err();
            assert_eq!(err.kind_name(), "NoActiveIdentity", "{}", line);
        }
    }

    #[tokio::test]
    async fn test_missing_algorithm_fails_before_network() {
        let engine = offline_engine();
        let mut scenario = Scenario::new();

        engine.execute_line(&mut scenario, "using user ES256 did1").await.unwrap();
        let err = engine
            .execute_line(&mut scenario, "onboarding authentication ES256K")
            .await
            .unwrap_err();

        assert_eq!(err.kind_name(), "NoKeyForAlgorithm");
        assert_eq!(err.step, FlowStep::Identity);
    }

    #[tokio::test]
    async fn test_identity_import_and_variables() {
        let engine = offline_engine();
        let mut scenario = Scenario::new();

        let key = "46".repeat(32);
        engine
            .execute_line(&mut scenario, &format!("using user ES256K did1 {} did:ebsi:zFixed", key))
            .await
            .unwrap();
        let active = scenario.session.active().unwrap();
        assert_eq!(active.did, "did:ebsi:zFixed");
        assert_eq!(scenario.identities.len(), 1);

        engine.execute_line(&mut scenario, "credential issue vc revoked").await.unwrap();
        let token = scenario.session.get_variable("vc").unwrap().as_token().unwrap().to_string();
        assert_eq!(token.split('.').count(), 3);

        engine.execute_line(&mut scenario, "set answer 42").await.unwrap();
        let shown = engine.execute_line(&mut scenario, "view answer").await.unwrap();
        assert_eq!(shown, StepOutput::Done("answer = 42".into()));

        engine.execute_line(&mut scenario, "reset").await.unwrap();
        assert!(scenario.identities.is_empty());
        assert!(!scenario.session.has_active());
    }

    #[test]
    fn test_conformance_header_overlay() {
        let engine = offline_engine();
        let mut scenario = Scenario::new();

        let output = tokio_test::block_on(engine.execute_line(&mut scenario, "header conformance trace-42")).unwrap();
        assert_eq!(output, StepOutput::Done("Conformance: trace-42".into()));
        assert_eq!(scenario.session.headers().conformance.as_deref(), Some("trace-42"));

        tokio_test::block_on(engine.execute_line(&mut scenario, "header conformance new")).unwrap();
        let generated = scenario.session.headers().conformance.clone().unwrap();
        assert_ne!(generated, "trace-42");
    }

    #[tokio::test]
    async fn test_unknown_verb_and_check_output() {
        let engine = offline_engine();
        let mut scenario = Scenario::new();

        let err = engine.execute_line(&mut scenario, "teleport now").await.unwrap_err();
        assert_eq!(err.kind_name(), "UnknownCommand");
        assert_eq!(err.step, FlowStep::Parse);

        let output = engine
            .execute_line(&mut scenario, "conformance-new check transaction_mined")
            .await
            .unwrap();
        assert!(matches!(output, StepOutput::Check(CheckOutcome { success: false, .. })));
    }
}
