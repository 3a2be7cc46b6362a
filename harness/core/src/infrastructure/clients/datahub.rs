// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Proxy Data Hub Client
//
// Attribute storage. The collection is storage backed and comes back in the
// reduced paginated form (no total, `next` link only).

use std::sync::Arc;

use serde_json::Value;

use super::{ClientError, HttpTransport, resource_url};
use crate::domain::harness_config::CallKind;
use crate::domain::pagination::Page;
use crate::domain::session::HeaderOverlay;

#[derive(Clone)]
pub struct DataHubClient {
    transport: Arc<HttpTransport>,
    base_url: String,
}

impl DataHubClient {
    pub fn new(transport: Arc<HttpTransport>, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn store(&self, attribute: &Value, headers: &HeaderOverlay) -> Result<Value, ClientError> {
        self.transport
            .post_json(&format!("{}/attributes", self.base_url), attribute, headers, CallKind::Default)
            .await
    }

    pub async fn get(&self, id: &str, headers: &HeaderOverlay) -> Result<Value, ClientError> {
        self.transport
            .get_json(&resource_url(&self.base_url, &["attributes", id])?, &[], headers, CallKind::Default)
            .await
    }

    pub async fn list(&self, headers: &HeaderOverlay) -> Result<Page<Value>, ClientError> {
        self.transport
            .get_json(&format!("{}/attributes", self.base_url), &[], headers, CallKind::Default)
            .await
    }
}
