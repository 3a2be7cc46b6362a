// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// JSON-RPC Client
//
// POSTs JSON-RPC 2.0 envelopes to a single endpoint. Enforces the id echo and
// surfaces `error` objects as ClientError::Rpc with the payload intact.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{ClientError, HttpTransport};
use crate::domain::harness_config::CallKind;
use crate::domain::jsonrpc::{JsonRpcRequest, JsonRpcResponse, RpcId};
use crate::domain::session::HeaderOverlay;

#[derive(Clone)]
pub struct JsonRpcClient {
    transport: Arc<HttpTransport>,
    endpoint: String,
}

impl JsonRpcClient {
    pub fn new(transport: Arc<HttpTransport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Call with a fresh id.
    pub async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
        headers: &HeaderOverlay,
        kind: CallKind,
    ) -> Result<Value, ClientError> {
        self.call_with_id(RpcId::generate(), method, params, headers, kind).await
    }

    pub async fn call_with_id(
        &self,
        id: RpcId,
        method: &str,
        params: Vec<Value>,
        headers: &HeaderOverlay,
        kind: CallKind,
    ) -> Result<Value, ClientError> {
        let request = JsonRpcRequest::new(id.clone(), method, params);
        debug!(endpoint = %self.endpoint, method, id = %id, "JSON-RPC call");

        let response: JsonRpcResponse = self
            .transport
            .post_json(&self.endpoint, &request, headers, kind)
            .await?;
        Ok(response.into_result(&id)?)
    }
}
