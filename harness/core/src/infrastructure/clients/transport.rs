// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP Transport
//
// Shared reqwest client for every service facade. Applies the session header
// overlay and the per-call-kind timeout to each request, and maps failures
// onto ClientError. Holds no per-scenario state.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::ClientError;
use crate::domain::harness_config::{CallKind, TimeoutConfig};
use crate::domain::session::HeaderOverlay;

pub struct HttpTransport {
    client: reqwest::Client,
    timeouts: TimeoutConfig,
}

impl HttpTransport {
    pub fn new(timeouts: TimeoutConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeouts,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &HeaderOverlay,
        kind: CallKind,
    ) -> Result<T, ClientError> {
        let request = self.client.get(url).query(query);
        self.send(request, url, headers, kind).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        headers: &HeaderOverlay,
        kind: CallKind,
    ) -> Result<T, ClientError> {
        let request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        self.send(request, url, headers, kind).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut request: reqwest::RequestBuilder,
        url: &str,
        headers: &HeaderOverlay,
        kind: CallKind,
    ) -> Result<T, ClientError> {
        let timeout = self.timeouts.for_call(kind);
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }

        debug!(url, ?kind, timeout_ms = timeout.as_millis() as u64, "Sending request");
        let response = request.timeout(timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Network(format!("{} timed out after {}ms", url, timeout.as_millis()))
            } else {
                ClientError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Network(format!("Failed to read response body: {}", e)))?;
        debug!(url, status = status.as_u16(), "Received response");

        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body)
            .map_err(|e| ClientError::SchemaMismatch(format!("{}: {}", url, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[derive(Debug, serde::Deserialize)]
    struct Uri {
        uri: String,
    }

    #[tokio::test]
    async fn test_overlay_headers_are_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/apps")
            .match_header("Authorization", "Bearer a.b.c")
            .match_header("Conformance", "trace-1")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let headers = HeaderOverlay {
            authorization: Some("Bearer a.b.c".into()),
            conformance: Some("trace-1".into()),
        };
        let transport = HttpTransport::new(TimeoutConfig::default());
        let body: Value = transport
            .get_json(&format!("{}/apps", server.url()), &[], &headers, CallKind::Default)
            .await
            .unwrap();

        assert_eq!(body, json!({"ok": true}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_and_schema_errors() {
        let mut server = mockito::Server::new_async().await;
        let _denied = server
            .mock("POST", "/denied")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;
        let _wrong = server
            .mock("POST", "/wrong")
            .with_status(200)
            .with_body(r#"{"url": "x"}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(TimeoutConfig::default());
        let headers = HeaderOverlay::default();

        let denied = transport
            .post_json::<_, Uri>(&format!("{}/denied", server.url()), &json!({}), &headers, CallKind::Default)
            .await
            .unwrap_err();
        assert_eq!(denied.status(), Some(403));
        assert!(matches!(denied, ClientError::HttpStatus { ref body, .. } if body == "forbidden"));

        let wrong = transport
            .post_json::<_, Uri>(&format!("{}/wrong", server.url()), &json!({}), &headers, CallKind::Default)
            .await
            .unwrap_err();
        assert!(matches!(wrong, ClientError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let transport = HttpTransport::new(TimeoutConfig::default());
        let err = transport
            .get_json::<Value>("http://127.0.0.1:9/none", &[], &HeaderOverlay::default(), CallKind::Default)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }
}
