// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Notifications Client
//
// Inbox of the authenticated identity. Listing returns the full paginated
// collection form.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ClientError, HttpTransport};
use crate::domain::harness_config::CallKind;
use crate::domain::pagination::{Page, PageRequest};
use crate::domain::session::HeaderOverlay;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub payload: Value,
}

#[derive(Clone)]
pub struct NotificationsClient {
    transport: Arc<HttpTransport>,
    base_url: String,
}

impl NotificationsClient {
    pub fn new(transport: Arc<HttpTransport>, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn send(&self, notification: &Notification, headers: &HeaderOverlay) -> Result<Value, ClientError> {
        self.transport
            .post_json(
                &format!("{}/notifications", self.base_url),
                notification,
                headers,
                CallKind::Default,
            )
            .await
    }

    pub async fn list(&self, page: PageRequest, headers: &HeaderOverlay) -> Result<Page<Value>, ClientError> {
        self.transport
            .get_json(
                &format!("{}/notifications", self.base_url),
                &page.query(),
                headers,
                CallKind::Default,
            )
            .await
    }
}
