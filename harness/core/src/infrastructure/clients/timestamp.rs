// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Timestamp Service Client
//
// Timestamp writes are ledger transactions built and relayed through the
// service's JSON-RPC endpoint; records are read back over REST.

use std::sync::Arc;

use serde_json::Value;

use super::{ClientError, HttpTransport, JsonRpcClient, resource_url};
use crate::domain::harness_config::CallKind;
use crate::domain::session::HeaderOverlay;

#[derive(Clone)]
pub struct TimestampClient {
    transport: Arc<HttpTransport>,
    base_url: String,
    rpc: JsonRpcClient,
}

impl TimestampClient {
    pub fn new(transport: Arc<HttpTransport>, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            rpc: JsonRpcClient::new(transport.clone(), format!("{}/jsonrpc", base_url)),
            transport,
            base_url,
        }
    }

    pub fn rpc(&self) -> &JsonRpcClient {
        &self.rpc
    }

    pub async fn get_timestamp(&self, id: &str, headers: &HeaderOverlay) -> Result<Value, ClientError> {
        self.transport
            .get_json(
                &resource_url(&self.base_url, &["timestamps", id])?,
                &[],
                headers,
                CallKind::Default,
            )
            .await
    }
}
