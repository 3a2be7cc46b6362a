// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Authorization objects issued by the trusted-app registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Statuses treated as active.
const ACTIVE_STATUSES: &[&str] = &["active", "granted", "valid"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    #[serde(alias = "authorizationId")]
    pub id: String,
    #[serde(default)]
    pub resource_app_id: Option<String>,
    #[serde(default)]
    pub resource_app_name: Option<String>,
    #[serde(default)]
    pub requester_app_id: Option<String>,
    #[serde(default)]
    pub requester_app_name: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    /// Opaque scope strings (create / read / update / delete).
    #[serde(default)]
    pub permissions: Vec<String>,
    pub status: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthorizationIssue {
    #[error("authorization status '{0}' is not active")]
    Inactive(String),
    #[error("authorization not valid before {0}")]
    NotYetValid(DateTime<Utc>),
    #[error("authorization expired at {0}")]
    Expired(DateTime<Utc>),
}

impl Authorization {
    pub fn is_active(&self) -> bool {
        ACTIVE_STATUSES
            .iter()
            .any(|status| self.status.eq_ignore_ascii_case(status))
    }

    pub fn allows(&self, scope: &str) -> bool {
        self.permissions.iter().any(|p| p.eq_ignore_ascii_case(scope))
    }

    /// Usable when active and `notBefore <= now <= notAfter`.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), AuthorizationIssue> {
        if !self.is_active() {
            return Err(AuthorizationIssue::Inactive(self.status.clone()));
        }
        if now < self.not_before {
            return Err(AuthorizationIssue::NotYetValid(self.not_before));
        }
        if now > self.not_after {
            return Err(AuthorizationIssue::Expired(self.not_after));
        }
        Ok(())
    }
}
