// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ledger Transaction Flow
//!
//! ```text
//! Init → ParamsBuilt → Signed → Submitted → Mined | Reverted
//! ```
//!
//! The target service builds the unsigned transaction for a contract method
//! over JSON-RPC, the harness signs it with the active identity's ES256K key
//! and relays it with `sendSignedTransaction`, then polls the ledger for the
//! receipt. Each step is merged into the session's transaction descriptor as
//! soon as it completes; fields a new transaction has not reached yet keep
//! the previous transaction's values.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::application::error::{AtStep, FlowError, FlowErrorKind, FlowStep};
use crate::domain::harness_config::{CallKind, PollingConfig};
use crate::domain::identity::{Algorithm, Capability, Flow};
use crate::domain::session::SessionContext;
use crate::domain::transaction::{
    Receipt, TransactionFlow as TransactionMachine, TransactionPatch, TransactionState, TransactionTarget,
    UnsignedTransaction,
};
use crate::infrastructure::clients::{JsonRpcClient, LedgerClient};
use crate::infrastructure::ledger_signing::{ethereum_address, sign_transaction};

pub struct TransactionFlow<'a> {
    pub timestamp_rpc: &'a JsonRpcClient,
    pub registry_rpc: &'a JsonRpcClient,
    pub ledger: &'a LedgerClient,
    pub polling: &'a PollingConfig,
    /// Used when the service omits `chainId`.
    pub chain_id: Option<u64>,
}

impl TransactionFlow<'_> {
    fn rpc_for(&self, target: TransactionTarget) -> &JsonRpcClient {
        match target {
            TransactionTarget::Timestamp => self.timestamp_rpc,
            TransactionTarget::Tar => self.registry_rpc,
        }
    }

    pub async fn run(
        &self,
        session: &mut SessionContext,
        target: TransactionTarget,
        method: &str,
        params: Option<Value>,
    ) -> Result<Receipt, FlowError> {
        let client = session.active().at(FlowStep::Identity)?;
        Capability::require(Flow::LedgerSigning, Algorithm::Es256k, client.kind).at(FlowStep::Identity)?;
        let keys = client.keys(Algorithm::Es256k).at(FlowStep::Identity)?.clone();
        let from = ethereum_address(&keys.public).at(FlowStep::Identity)?;

        let params = build_params(params, &from);
        let mut machine = TransactionMachine::new(target, method);
        session
            .set_transaction(TransactionPatch {
                target: Some(target),
                method: Some(method.to_string()),
                params: Some(Value::Array(params.clone())),
                ..Default::default()
            })
            .at(FlowStep::ParamsBuilding)?;

        let rpc = self.rpc_for(target);
        let built = rpc
            .call(method, params, session.headers(), CallKind::JsonRpcSubmission)
            .await
            .at(FlowStep::ParamsBuilding)?;
        let unsigned_json = built.get("unsignedTransaction").cloned().unwrap_or(built);
        let unsigned = UnsignedTransaction::from_json(&unsigned_json).at(FlowStep::ParamsBuilding)?;
        machine.params_built().at(FlowStep::ParamsBuilding)?;
        session
            .set_transaction(TransactionPatch {
                unsigned: Some(unsigned.clone()),
                ..Default::default()
            })
            .at(FlowStep::ParamsBuilding)?;
        debug!(%target, method, to = %unsigned.to, "Unsigned transaction built");

        let signed = sign_transaction(&unsigned, &keys.secret, self.chain_id).at(FlowStep::Signing)?;
        machine.signed().at(FlowStep::Signing)?;
        session
            .set_transaction(TransactionPatch {
                signed: Some(signed.clone()),
                ..Default::default()
            })
            .at(FlowStep::Signing)?;

        let submission = json!({
            "protocol": "eth",
            "unsignedTransaction": unsigned.raw,
            "r": signed.r,
            "s": signed.s,
            "v": signed.v,
            "signedRawTransaction": signed.raw,
        });
        let sent = rpc
            .call("sendSignedTransaction", vec![submission], session.headers(), CallKind::JsonRpcSubmission)
            .await
            .at(FlowStep::Submission)?;
        let tx_hash = sent.as_str().map(str::to_string).unwrap_or_else(|| signed.hash.clone());
        machine.submitted().at(FlowStep::Submission)?;
        session
            .set_transaction(TransactionPatch {
                tx_hash: Some(tx_hash.clone()),
                ..Default::default()
            })
            .at(FlowStep::Submission)?;
        info!(%target, method, %tx_hash, "Transaction submitted");

        let receipt = self.wait_for_receipt(session, &tx_hash).await?;
        let state = machine.finish(&receipt).at(FlowStep::ReceiptPolling)?;
        session
            .set_transaction(TransactionPatch {
                receipt: Some(receipt.clone()),
                ..Default::default()
            })
            .at(FlowStep::ReceiptPolling)?;

        if state == TransactionState::Reverted {
            warn!(%tx_hash, reason = ?receipt.revert_reason, "Transaction reverted");
            return Err(FlowError::new(
                FlowStep::ReceiptPolling,
                FlowErrorKind::TransactionReverted {
                    reason: receipt.revert_reason,
                },
            ));
        }
        info!(%tx_hash, block = ?receipt.block_number, "Transaction mined");
        Ok(receipt)
    }

    async fn wait_for_receipt(&self, session: &SessionContext, tx_hash: &str) -> Result<Receipt, FlowError> {
        let interval = Duration::from_millis(self.polling.interval_ms);
        for attempt in 1..=self.polling.max_attempts {
            if let Some(receipt) = self
                .ledger
                .get_transaction_receipt(tx_hash, session.headers())
                .await
                .at(FlowStep::ReceiptPolling)?
            {
                return Ok(receipt);
            }
            debug!(tx_hash, attempt, "Receipt not available yet");
            if attempt < self.polling.max_attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(FlowError::new(
            FlowStep::ReceiptPolling,
            FlowErrorKind::ReceiptTimeout {
                tx_hash: tx_hash.to_string(),
                attempts: self.polling.max_attempts,
            },
        ))
    }
}

/// JSON-RPC params for a build call. An object gets the sender address when
/// it has none; an array is passed through.
fn build_params(params: Option<Value>, from: &str) -> Vec<Value> {
    match params {
        Some(Value::Array(items)) => items,
        Some(Value::Object(mut object)) => {
            object.entry("from").or_insert_with(|| json!(from));
            vec![Value::Object(object)]
        }
        Some(other) => vec![other],
        None => {
            let mut object = Map::new();
            object.insert("from".into(), json!(from));
            vec![Value::Object(object)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mockito::Matcher;

    use crate::domain::harness_config::TimeoutConfig;
    use crate::domain::identity::{Client, IdentityKind};
    use crate::infrastructure::clients::HttpTransport;
    use crate::infrastructure::crypto::SecretKey;

    fn echo(result: Value) -> impl Fn(&mockito::Request) -> Vec<u8> + Send + Sync + 'static {
        move |request: &mockito::Request| {
            let body: Value = serde_json::from_slice(request.body().unwrap()).unwrap();
            json!({"jsonrpc": "2.0", "id": body["id"], "result": result}).to_string().into_bytes()
        }
    }

    fn signer() -> Client {
        let key = SecretKey::from_hex(Algorithm::Es256k, &"46".repeat(32)).unwrap();
        Client::new(IdentityKind::LegalEntity, Some("did:ebsi:zSigner".into()), vec![key]).unwrap()
    }

    fn unsigned() -> Value {
        json!({
            "from": "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f",
            "to": "0x3535353535353535353535353535353535353535",
            "data": "0x",
            "nonce": "0x9",
            "gasPrice": "0x4a817c800",
            "gasLimit": "0x5208",
            "value": "0xde0b6b3a7640000",
            "chainId": "0x1"
        })
    }

    async fn run(server: &mockito::ServerGuard, polling: PollingConfig) -> (Result<Receipt, FlowError>, SessionContext) {
        let mut session = SessionContext::new();
        session.set_active(Some(Arc::new(signer())));
        let result = run_in(server, polling, &mut session, "timestampHashes").await;
        (result, session)
    }

    async fn run_in(
        server: &mockito::ServerGuard,
        polling: PollingConfig,
        session: &mut SessionContext,
        method: &str,
    ) -> Result<Receipt, FlowError> {
        let transport = Arc::new(HttpTransport::new(TimeoutConfig::default()));
        let timestamp_rpc = JsonRpcClient::new(transport.clone(), format!("{}/timestamp/jsonrpc", server.url()));
        let registry_rpc = JsonRpcClient::new(transport.clone(), format!("{}/tar/jsonrpc", server.url()));
        let ledger = LedgerClient::new(transport, &format!("{}/ledger", server.url()));
        let flow = TransactionFlow {
            timestamp_rpc: &timestamp_rpc,
            registry_rpc: &registry_rpc,
            ledger: &ledger,
            polling: &polling,
            chain_id: None,
        };

        flow.run(session, TransactionTarget::Timestamp, method, Some(json!({"hashValues": ["0x01"]})))
            .await
    }

    #[test]
    fn test_build_params_adds_sender() {
        assert_eq!(build_params(None, "0xabc"), vec![json!({"from": "0xabc"})]);
        assert_eq!(
            build_params(Some(json!({"from": "0xdef", "x": 1})), "0xabc"),
            vec![json!({"from": "0xdef", "x": 1})]
        );
        assert_eq!(build_params(Some(json!([1, 2])), "0xabc"), vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_mined_transaction_recorded() {
        let mut server = mockito::Server::new_async().await;
        let _build = server
            .mock("POST", "/timestamp/jsonrpc")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"method": "timestampHashes"})),
                Matcher::Regex(r#""from":"0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f""#.into()),
            ]))
            .with_status(200)
            .with_body_from_request(echo(unsigned()))
            .create_async()
            .await;
        let send = server
            .mock("POST", "/timestamp/jsonrpc")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"method": "sendSignedTransaction"})),
                Matcher::Regex(r#""protocol":"eth""#.into()),
                Matcher::Regex(r#""v":"0x25""#.into()),
            ]))
            .with_status(200)
            .with_body_from_request(echo(json!("0xfeed")))
            .create_async()
            .await;
        let _receipt = server
            .mock("POST", "/ledger/blockchains/besu")
            .with_status(200)
            .with_body_from_request(echo(json!({"transactionHash": "0xfeed", "blockNumber": "0x2a", "status": "0x1"})))
            .create_async()
            .await;

        let (result, session) = run(&server, PollingConfig { interval_ms: 1, max_attempts: 3 }).await;

        let receipt = result.unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.block_number, Some(42));
        let descriptor = session.transaction();
        assert_eq!(descriptor.tx_hash.as_deref(), Some("0xfeed"));
        assert_eq!(descriptor.unsigned.as_ref().and_then(|u| u.chain_id), Some(1));
        assert!(descriptor.receipt.is_some());
        send.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_second_transaction_keeps_first_receipt() {
        let mut server = mockito::Server::new_async().await;
        let _build = server
            .mock("POST", "/timestamp/jsonrpc")
            .match_body(Matcher::PartialJson(json!({"method": "timestampHashes"})))
            .with_status(200)
            .with_body_from_request(echo(unsigned()))
            .create_async()
            .await;
        let _send = server
            .mock("POST", "/timestamp/jsonrpc")
            .match_body(Matcher::PartialJson(json!({"method": "sendSignedTransaction"})))
            .with_status(200)
            .with_body_from_request(echo(json!("0xfeed")))
            .create_async()
            .await;
        let _receipt = server
            .mock("POST", "/ledger/blockchains/besu")
            .with_status(200)
            .with_body_from_request(echo(json!({"transactionHash": "0xfeed", "blockNumber": "0x2a", "status": "0x1"})))
            .create_async()
            .await;
        let _broken = server
            .mock("POST", "/timestamp/jsonrpc")
            .match_body(Matcher::PartialJson(json!({"method": "timestampVersionHashes"})))
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let polling = PollingConfig { interval_ms: 1, max_attempts: 3 };
        let mut session = SessionContext::new();
        session.set_active(Some(Arc::new(signer())));
        run_in(&server, polling.clone(), &mut session, "timestampHashes").await.unwrap();

        let err = run_in(&server, polling, &mut session, "timestampVersionHashes")
            .await
            .unwrap_err();
        assert_eq!(err.step, FlowStep::ParamsBuilding);

        let descriptor = session.transaction();
        assert_eq!(descriptor.method.as_deref(), Some("timestampVersionHashes"));
        assert_eq!(descriptor.tx_hash.as_deref(), Some("0xfeed"));
        assert!(descriptor.signed.is_some());
        assert_eq!(
            descriptor.receipt.as_ref().map(|r| r.transaction_hash.as_str()),
            Some("0xfeed")
        );
    }

    #[tokio::test]
    async fn test_reverted_and_timeout() {
        let mut server = mockito::Server::new_async().await;
        let _build = server
            .mock("POST", "/timestamp/jsonrpc")
            .match_body(Matcher::PartialJson(json!({"method": "timestampHashes"})))
            .with_status(200)
            .with_body_from_request(echo(json!({"unsignedTransaction": unsigned()})))
            .create_async()
            .await;
        let _send = server
            .mock("POST", "/timestamp/jsonrpc")
            .match_body(Matcher::PartialJson(json!({"method": "sendSignedTransaction"})))
            .with_status(200)
            .with_body_from_request(echo(json!("0xbad")))
            .create_async()
            .await;
        let reverted = server
            .mock("POST", "/ledger/blockchains/besu")
            .with_status(200)
            .with_body_from_request(echo(
                json!({"transactionHash": "0xbad", "status": "0x0", "revertReason": "Hash already timestamped"}),
            ))
            .create_async()
            .await;

        let (result, session) = run(&server, PollingConfig { interval_ms: 1, max_attempts: 3 }).await;
        let err = result.unwrap_err();
        assert!(err.matches("hash already timestamped"));
        assert_eq!(err.kind_name(), "TransactionReverted");
        assert!(session.transaction().receipt.is_some());

        reverted.remove_async().await;
        let _pending = server
            .mock("POST", "/ledger/blockchains/besu")
            .with_status(200)
            .with_body_from_request(echo(Value::Null))
            .expect(2)
            .create_async()
            .await;

        let (result, session) = run(&server, PollingConfig { interval_ms: 1, max_attempts: 2 }).await;
        assert!(matches!(
            result.unwrap_err().kind,
            FlowErrorKind::ReceiptTimeout { attempts: 2, .. }
        ));
        assert!(session.transaction().receipt.is_none());
    }

    #[tokio::test]
    async fn test_missing_secp256k1_key_fails_before_network() {
        let key = SecretKey::generate(Algorithm::Es256).unwrap();
        let client = Client::new(IdentityKind::LegalEntity, None, vec![key]).unwrap();
        let transport = Arc::new(HttpTransport::new(TimeoutConfig::default()));
        let rpc = JsonRpcClient::new(transport.clone(), "http://127.0.0.1:9/jsonrpc");
        let ledger = LedgerClient::new(transport, "http://127.0.0.1:9");
        let polling = PollingConfig::default();
        let flow = TransactionFlow {
            timestamp_rpc: &rpc,
            registry_rpc: &rpc,
            ledger: &ledger,
            polling: &polling,
            chain_id: None,
        };

        let mut session = SessionContext::new();
        session.set_active(Some(Arc::new(client)));
        let err = flow
            .run(&mut session, TransactionTarget::Tar, "insertIssuer", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind_name(), "NoKeyForAlgorithm");
        assert_eq!(err.step, FlowStep::Identity);
        assert!(session.transaction().method.is_none());
    }
}
