// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! JSON-RPC 2.0 request / response types.
//!
//! A response must echo the request id exactly (`7` and `"7"` are different
//! ids) and carries either `result` or `error`. When both are present the
//! error wins.

use std::fmt;

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    Text(String),
}

impl RpcId {
    /// Fresh id for one request/response pair. Not globally unique.
    pub fn generate() -> Self {
        RpcId::Number(i64::from(OsRng.next_u32() % 1_000_000))
    }

    /// Numeric when the text is an integer, else a string id.
    pub fn parse(text: &str) -> Self {
        text.parse::<i64>()
            .map(RpcId::Number)
            .unwrap_or_else(|_| RpcId::Text(text.to_string()))
    }
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcId::Number(n) => write!(f, "{}", n),
            RpcId::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i64> for RpcId {
    fn from(value: i64) -> Self {
        RpcId::Number(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RpcId,
    pub method: String,
    pub params: Vec<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RpcId, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Remote-reported application error, kept intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for RpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)?;
        if let Some(data) = &self.data {
            write!(f, ": {}", data)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RpcId>,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RpcFault {
    IdMismatch { expected: RpcId, actual: Option<RpcId> },
    Error(RpcErrorObject),
}

impl JsonRpcResponse {
    /// Check the id echo, then split into result or error.
    ///
    /// Error responses with a null id (parse errors, invalid requests)
    /// carry no echo and surface their error directly.
    pub fn into_result(self, expected: &RpcId) -> Result<Value, RpcFault> {
        if self.id.is_none() {
            if let Some(error) = self.error {
                return Err(RpcFault::Error(error));
            }
        }
        if self.id.as_ref() != Some(expected) {
            return Err(RpcFault::IdMismatch {
                expected: expected.clone(),
                actual: self.id,
            });
        }
        match self.error {
            Some(error) => Err(RpcFault::Error(error)),
            None => Ok(self.result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = JsonRpcRequest::new(RpcId::Number(7), "timestampHashes", vec![json!({"hashes": []})]);
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"jsonrpc": "2.0", "id": 7, "method": "timestampHashes", "params": [{"hashes": []}]})
        );
    }

    #[test]
    fn test_id_echo_is_exact() {
        let response: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 7, "result": "0xabc"})).unwrap();
        assert_eq!(response.clone().into_result(&RpcId::Number(7)).unwrap(), json!("0xabc"));

        assert!(matches!(
            response.into_result(&RpcId::Text("7".into())),
            Err(RpcFault::IdMismatch { actual: Some(RpcId::Number(7)), .. })
        ));
    }

    #[test]
    fn test_error_wins_over_result() {
        let response: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "a",
            "result": null,
            "error": {"code": -32601, "message": "Method not found"}
        }))
        .unwrap();

        match response.into_result(&RpcId::Text("a".into())) {
            Err(RpcFault::Error(error)) => {
                assert_eq!(error.code, -32601);
                assert_eq!(error.to_string(), "Method not found (code -32601)");
            }
            other => panic!("expected rpc error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_result_is_a_value() {
        let response: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": null})).unwrap();
        assert_eq!(response.into_result(&RpcId::Number(1)).unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(RpcId::parse("7"), RpcId::Number(7));
        assert_eq!(RpcId::parse("abc"), RpcId::Text("abc".into()));
    }
}
