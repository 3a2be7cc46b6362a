// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Ledger Transactions
//!
//! The transaction descriptor kept in the session, the receipt it ends with,
//! and the [`TransactionFlow`] state machine:
//!
//! ```text
//! Init → ParamsBuilt → Signed → Submitted → Mined | Reverted
//! ```
//!
//! ## Invariants
//!
//! - A receipt is recorded once per transaction hash. Merging a second
//!   receipt for the same hash fails with
//!   [`TransactionError::ReceiptAlreadyRecorded`].
//! - Patches only add or replace fields; nothing is cleared before `reset`.
//! - Numeric fields are parsed tolerantly: `0x` hex, decimal strings and JSON
//!   numbers are accepted, anything else is logged and treated as absent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Unknown transaction target '{0}' (expected timestamp or tar)")]
    UnknownTarget(String),

    #[error("Unsigned transaction is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid hex in field '{field}': {reason}")]
    InvalidHex { field: &'static str, reason: String },

    #[error("Receipt already recorded for transaction {0}")]
    ReceiptAlreadyRecorded(String),

    #[error("Invalid transaction transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: TransactionState,
        to: TransactionState,
    },
}

/// Service whose contract a transaction calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionTarget {
    Timestamp,
    Tar,
}

impl FromStr for TransactionTarget {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timestamp" => Ok(TransactionTarget::Timestamp),
            "tar" => Ok(TransactionTarget::Tar),
            other => Err(TransactionError::UnknownTarget(other.to_string())),
        }
    }
}

impl fmt::Display for TransactionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionTarget::Timestamp => f.write_str("timestamp"),
            TransactionTarget::Tar => f.write_str("tar"),
        }
    }
}

/// Parse a numeric transaction field, or `None` when absent or malformed.
pub fn parse_quantity(field: &str, value: Option<&Value>) -> Option<u128> {
    let value = match value {
        None | Some(Value::Null) => return None,
        Some(value) => value,
    };

    let parsed = match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some("") => Some(0),
                Some(hex) => u128::from_str_radix(hex, 16).ok(),
                None => s.parse::<u128>().ok(),
            }
        }
        _ => None,
    };

    if parsed.is_none() {
        warn!(field, value = %value, "Malformed numeric transaction field treated as absent");
    }
    parsed
}

fn parse_hex_bytes(field: &'static str, value: &str) -> Result<Vec<u8>, TransactionError> {
    let digits = value.trim_start_matches("0x");
    let digits = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    hex::decode(digits).map_err(|e| TransactionError::InvalidHex {
        field,
        reason: e.to_string(),
    })
}

/// Transaction parameters supplied by the service for a contract method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub from: Option<String>,
    pub to: String,
    pub data: String,
    pub nonce: Option<u128>,
    pub gas_limit: Option<u128>,
    pub gas_price: Option<u128>,
    pub value: Option<u128>,
    pub chain_id: Option<u64>,
    /// Parameters exactly as the service returned them.
    pub raw: Value,
}

impl UnsignedTransaction {
    pub fn from_json(raw: &Value) -> Result<Self, TransactionError> {
        let text = |name: &'static str| raw.get(name).and_then(Value::as_str).map(str::to_string);

        let chain_id = parse_quantity("chainId", raw.get("chainId")).and_then(|id| {
            let narrowed = u64::try_from(id).ok();
            if narrowed.is_none() {
                warn!(chain_id = %id, "Chain id out of range treated as absent");
            }
            narrowed
        });

        Ok(Self {
            from: text("from"),
            to: text("to").ok_or(TransactionError::MissingField("to"))?,
            data: text("data").unwrap_or_else(|| "0x".to_string()),
            nonce: parse_quantity("nonce", raw.get("nonce")),
            gas_limit: parse_quantity("gasLimit", raw.get("gasLimit").or_else(|| raw.get("gas"))),
            gas_price: parse_quantity("gasPrice", raw.get("gasPrice")),
            value: parse_quantity("value", raw.get("value")),
            chain_id,
            raw: raw.clone(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        parse_hex_bytes("to", &self.to)
    }

    pub fn data_bytes(&self) -> Result<Vec<u8>, TransactionError> {
        parse_hex_bytes("data", &self.data)
    }
}

/// Output of ledger signing, hex encoded with `0x` prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub r: String,
    pub s: String,
    pub v: String,
    pub raw: String,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub from: Option<String>,
    pub status: ReceiptStatus,
    pub revert_reason: Option<String>,
}

impl Receipt {
    /// Parse an `eth_getTransactionReceipt` result. `null` means not mined yet.
    ///
    /// Receipts without `status` (pre-Byzantium) count as successful once
    /// they carry a block number.
    pub fn from_json(value: &Value) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        let block_number =
            parse_quantity("blockNumber", value.get("blockNumber")).and_then(|n| u64::try_from(n).ok());
        let status = match value.get("status").filter(|s| !s.is_null()) {
            None if block_number.is_some() => ReceiptStatus::Success,
            None => ReceiptStatus::Failure,
            Some(raw) => match parse_quantity("status", Some(raw)) {
                Some(1) => ReceiptStatus::Success,
                _ => ReceiptStatus::Failure,
            },
        };
        Some(Self {
            transaction_hash: value
                .get("transactionHash")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            block_number,
            from: value.get("from").and_then(Value::as_str).map(str::to_string),
            status,
            revert_reason: value.get("revertReason").and_then(Value::as_str).map(str::to_string),
        })
    }

    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Success
    }
}

/// In-flight transaction kept in the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionDescriptor {
    pub target: Option<TransactionTarget>,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub unsigned: Option<UnsignedTransaction>,
    pub signed: Option<SignedTransaction>,
    pub tx_hash: Option<String>,
    pub receipt: Option<Receipt>,
}

/// Partial update for a [`TransactionDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub target: Option<TransactionTarget>,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub unsigned: Option<UnsignedTransaction>,
    pub signed: Option<SignedTransaction>,
    pub tx_hash: Option<String>,
    pub receipt: Option<Receipt>,
}

impl TransactionDescriptor {
    pub fn merge(&mut self, patch: TransactionPatch) -> Result<(), TransactionError> {
        if let (Some(incoming), Some(existing)) = (&patch.receipt, &self.receipt) {
            if incoming.transaction_hash == existing.transaction_hash {
                return Err(TransactionError::ReceiptAlreadyRecorded(existing.transaction_hash.clone()));
            }
        }

        if patch.target.is_some() {
            self.target = patch.target;
        }
        if patch.method.is_some() {
            self.method = patch.method;
        }
        if patch.params.is_some() {
            self.params = patch.params;
        }
        if patch.unsigned.is_some() {
            self.unsigned = patch.unsigned;
        }
        if patch.signed.is_some() {
            self.signed = patch.signed;
        }
        if patch.tx_hash.is_some() {
            self.tx_hash = patch.tx_hash;
        }
        if patch.receipt.is_some() {
            self.receipt = patch.receipt;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Init,
    ParamsBuilt,
    Signed,
    Submitted,
    Mined,
    Reverted,
}

/// One ledger write from parameter building to receipt.
#[derive(Debug, Clone)]
pub struct TransactionFlow {
    pub target: TransactionTarget,
    pub method: String,
    state: TransactionState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TransactionFlow {
    pub fn new(target: TransactionTarget, method: impl Into<String>) -> Self {
        Self {
            target,
            method: method.into(),
            state: TransactionState::Init,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    fn advance(&mut self, from: TransactionState, to: TransactionState) -> Result<(), TransactionError> {
        if self.state != from {
            return Err(TransactionError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }

    pub fn params_built(&mut self) -> Result<(), TransactionError> {
        self.advance(TransactionState::Init, TransactionState::ParamsBuilt)
    }

    pub fn signed(&mut self) -> Result<(), TransactionError> {
        self.advance(TransactionState::ParamsBuilt, TransactionState::Signed)
    }

    pub fn submitted(&mut self) -> Result<(), TransactionError> {
        self.advance(TransactionState::Signed, TransactionState::Submitted)
    }

    /// Terminal transition chosen by the receipt status.
    pub fn finish(&mut self, receipt: &Receipt) -> Result<TransactionState, TransactionError> {
        let to = if receipt.succeeded() {
            TransactionState::Mined
        } else {
            TransactionState::Reverted
        };
        self.advance(TransactionState::Submitted, to)?;
        self.ended_at = Some(Utc::now());
        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_quantity_forms() {
        assert_eq!(parse_quantity("nonce", Some(&json!("0x1a"))), Some(26));
        assert_eq!(parse_quantity("nonce", Some(&json!("26"))), Some(26));
        assert_eq!(parse_quantity("nonce", Some(&json!(26))), Some(26));
        assert_eq!(parse_quantity("value", Some(&json!("0x"))), Some(0));
        assert_eq!(parse_quantity("chainId", Some(&json!("not-a-number"))), None);
        assert_eq!(parse_quantity("chainId", Some(&json!(-1))), None);
        assert_eq!(parse_quantity("chainId", None), None);
    }

    #[test]
    fn test_malformed_chain_id_is_absent_not_an_error() {
        let unsigned = UnsignedTransaction::from_json(&json!({
            "from": "0xabc",
            "to": "0x00000000000000000000000000000000000000aa",
            "data": "0x1234",
            "nonce": "0x2",
            "chainId": "ebsi",
            "gasLimit": "21000",
            "gasPrice": 0,
            "value": "0x0"
        }))
        .unwrap();

        assert_eq!(unsigned.chain_id, None);
        assert_eq!(unsigned.nonce, Some(2));
        assert_eq!(unsigned.gas_limit, Some(21000));
        assert_eq!(unsigned.data_bytes().unwrap(), vec![0x12, 0x34]);
    }

    #[test]
    fn test_missing_to_is_structural() {
        assert!(matches!(
            UnsignedTransaction::from_json(&json!({"data": "0x"})),
            Err(TransactionError::MissingField("to"))
        ));
    }

    #[test]
    fn test_receipt_parsing() {
        assert!(Receipt::from_json(&Value::Null).is_none());

        let mined = Receipt::from_json(&json!({
            "transactionHash": "0xfeed",
            "blockNumber": "0x10",
            "from": "0xabc",
            "status": "0x1"
        }))
        .unwrap();
        assert!(mined.succeeded());
        assert_eq!(mined.block_number, Some(16));

        let reverted = Receipt::from_json(&json!({
            "transactionHash": "0xfeed",
            "status": "0x0",
            "revertReason": "Policy violation"
        }))
        .unwrap();
        assert_eq!(reverted.status, ReceiptStatus::Failure);
        assert_eq!(reverted.revert_reason.as_deref(), Some("Policy violation"));

        let legacy = Receipt::from_json(&json!({"transactionHash": "0xold", "blockNumber": "0x2a"})).unwrap();
        assert!(legacy.succeeded());
        assert_eq!(legacy.block_number, Some(42));

        let unplaced = Receipt::from_json(&json!({"transactionHash": "0xold", "status": null})).unwrap();
        assert_eq!(unplaced.status, ReceiptStatus::Failure);
    }

    #[test]
    fn test_merge_keeps_fields_and_locks_receipt() {
        let mut descriptor = TransactionDescriptor::default();
        descriptor
            .merge(TransactionPatch {
                target: Some(TransactionTarget::Timestamp),
                method: Some("timestampHashes".into()),
                ..Default::default()
            })
            .unwrap();
        descriptor
            .merge(TransactionPatch {
                tx_hash: Some("0xfeed".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(descriptor.method.as_deref(), Some("timestampHashes"));
        assert_eq!(descriptor.tx_hash.as_deref(), Some("0xfeed"));

        let receipt = Receipt::from_json(&json!({"transactionHash": "0xfeed", "status": "0x1"})).unwrap();
        descriptor
            .merge(TransactionPatch {
                receipt: Some(receipt.clone()),
                ..Default::default()
            })
            .unwrap();
        assert!(matches!(
            descriptor.merge(TransactionPatch {
                receipt: Some(receipt),
                ..Default::default()
            }),
            Err(TransactionError::ReceiptAlreadyRecorded(_))
        ));

        let next = Receipt::from_json(&json!({"transactionHash": "0xbeef", "status": "0x1"})).unwrap();
        descriptor
            .merge(TransactionPatch {
                receipt: Some(next),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(descriptor.receipt.as_ref().map(|r| r.transaction_hash.as_str()), Some("0xbeef"));
        assert_eq!(descriptor.method.as_deref(), Some("timestampHashes"));
    }

    #[test]
    fn test_flow_transitions() {
        let mut flow = TransactionFlow::new(TransactionTarget::Tar, "insertIssuer");
        assert!(flow.signed().is_err());

        flow.params_built().unwrap();
        flow.signed().unwrap();
        flow.submitted().unwrap();
        let receipt = Receipt::from_json(&json!({"transactionHash": "0x1", "status": "0x0"})).unwrap();
        assert_eq!(flow.finish(&receipt).unwrap(), TransactionState::Reverted);
        assert!(flow.ended_at.is_some());
    }
}
