// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ledger Client
//
// Raw JSON-RPC access to the ledger node. Receipt lookups use the
// receipt-polling timeout; polling cadence is owned by the flow engine.

use std::sync::Arc;

use serde_json::{json, Value};

use super::{ClientError, HttpTransport, JsonRpcClient};
use crate::domain::harness_config::CallKind;
use crate::domain::jsonrpc::RpcId;
use crate::domain::session::HeaderOverlay;
use crate::domain::transaction::Receipt;

#[derive(Clone)]
pub struct LedgerClient {
    rpc: JsonRpcClient,
}

impl LedgerClient {
    pub fn new(transport: Arc<HttpTransport>, base_url: &str) -> Self {
        Self {
            rpc: JsonRpcClient::new(transport, format!("{}/blockchains/besu", base_url.trim_end_matches('/'))),
        }
    }

    pub fn rpc(&self) -> &JsonRpcClient {
        &self.rpc
    }

    pub async fn call(
        &self,
        id: RpcId,
        method: &str,
        params: Vec<Value>,
        headers: &HeaderOverlay,
    ) -> Result<Value, ClientError> {
        self.rpc
            .call_with_id(id, method, params, headers, CallKind::JsonRpcSubmission)
            .await
    }

    /// `None` while the transaction is still pending.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
        headers: &HeaderOverlay,
    ) -> Result<Option<Receipt>, ClientError> {
        let result = self
            .rpc
            .call("eth_getTransactionReceipt", vec![json!(tx_hash)], headers, CallKind::ReceiptPolling)
            .await?;
        Ok(Receipt::from_json(&result))
    }
}
