// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Remote Service Clients
//
// One thin typed facade per external service. Every call returns a typed
// payload or one of the ClientError variants; no client retries.

pub mod transport;
pub mod jsonrpc;
pub mod authorisation;
pub mod registry;
pub mod timestamp;
pub mod ledger;
pub mod notifications;
pub mod datahub;

use std::sync::Arc;

use thiserror::Error;

use crate::domain::harness_config::HarnessConfig;
use crate::domain::jsonrpc::{RpcErrorObject, RpcFault, RpcId};

pub use authorisation::AuthorisationClient;
pub use datahub::DataHubClient;
pub use jsonrpc::JsonRpcClient;
pub use ledger::LedgerClient;
pub use notifications::NotificationsClient;
pub use registry::TrustedAppsClient;
pub use timestamp::TimestampClient;
pub use transport::HttpTransport;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("RPC error: {0}")]
    Rpc(RpcErrorObject),

    #[error("JSON-RPC id mismatch: expected {expected}, got {}", .actual.as_ref().map(ToString::to_string).unwrap_or_else(|| "none".into()))]
    IdMismatch { expected: RpcId, actual: Option<RpcId> },
}

impl ClientError {
    /// HTTP status of the response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RpcFault> for ClientError {
    fn from(fault: RpcFault) -> Self {
        match fault {
            RpcFault::IdMismatch { expected, actual } => ClientError::IdMismatch { expected, actual },
            RpcFault::Error(error) => ClientError::Rpc(error),
        }
    }
}

/// `base` with each segment appended as one percent-encoded path segment.
pub(crate) fn resource_url(base: &str, segments: &[&str]) -> Result<String, ClientError> {
    let mut url = url::Url::parse(base).map_err(|e| ClientError::Network(format!("invalid URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::Network(format!("URL {} cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.into())
}

/// Every service client over one shared transport.
#[derive(Clone)]
pub struct ServiceClients {
    pub authorisation: AuthorisationClient,
    pub registry: TrustedAppsClient,
    pub timestamp: TimestampClient,
    pub ledger: LedgerClient,
    pub notifications: NotificationsClient,
    pub datahub: DataHubClient,
}

impl ServiceClients {
    pub fn from_config(config: &HarnessConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.spec.timeouts.clone()));
        let services = &config.spec.services;
        Self {
            authorisation: AuthorisationClient::new(transport.clone(), &services.authorisation),
            registry: TrustedAppsClient::new(transport.clone(), &services.registry),
            timestamp: TimestampClient::new(transport.clone(), &services.timestamp),
            ledger: LedgerClient::new(transport.clone(), &services.ledger),
            notifications: NotificationsClient::new(transport.clone(), &services.notifications),
            datahub: DataHubClient::new(transport, &services.datahub),
        }
    }
}
