// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Named conformance checks and their outcomes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    VerifierVpValidVc,
    VerifierVpExpiredVc,
    VerifierVpNotYetValidVc,
    VerifierVpRevokedVc,
    AuthorisationTokenWellFormed,
    AuthorizationWindowValid,
    TransactionMined,
}

impl CheckName {
    pub const ALL: [CheckName; 7] = [
        CheckName::VerifierVpValidVc,
        CheckName::VerifierVpExpiredVc,
        CheckName::VerifierVpNotYetValidVc,
        CheckName::VerifierVpRevokedVc,
        CheckName::AuthorisationTokenWellFormed,
        CheckName::AuthorizationWindowValid,
        CheckName::TransactionMined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::VerifierVpValidVc => "verifier_vp_valid_vc",
            CheckName::VerifierVpExpiredVc => "verifier_vp_expired_vc",
            CheckName::VerifierVpNotYetValidVc => "verifier_vp_not_yet_valid_vc",
            CheckName::VerifierVpRevokedVc => "verifier_vp_revoked_vc",
            CheckName::AuthorisationTokenWellFormed => "authorisation_token_well_formed",
            CheckName::AuthorizationWindowValid => "authorization_window_valid",
            CheckName::TransactionMined => "transaction_mined",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown conformance check '{0}'")]
pub struct UnknownCheck(pub String);

impl FromStr for CheckName {
    type Err = UnknownCheck;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CheckName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownCheck(s.to_string()))
    }
}

/// Result of one check. `success: false` is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: CheckName,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckOutcome {
    pub fn pass(name: CheckName, detail: impl Into<String>) -> Self {
        Self {
            name,
            success: true,
            detail: Some(detail.into()),
        }
    }

    pub fn fail(name: CheckName, detail: impl Into<String>) -> Self {
        Self {
            name,
            success: false,
            detail: Some(detail.into()),
        }
    }
}
