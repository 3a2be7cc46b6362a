// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conformance Checker
//!
//! Evaluates named protocol properties over what a scenario has already
//! collected. Checks never touch the network: presented credentials are
//! re-verified with the issuer keys held in the scenario's identity store.
//!
//! A check that does not hold is reported as `success: false`; it is a
//! result, not an error.

use chrono::{DateTime, Utc};

use crate::domain::conformance::{CheckName, CheckOutcome};
use crate::domain::session::{Scenario, TokenKind};
use crate::domain::siop::PresentationRecord;
use crate::infrastructure::jwt::{Claims, TokenCodec, TokenError};
use crate::infrastructure::presentation::credential_id;

/// Local verification result for one presented credential.
#[derive(Debug)]
enum CredentialVerdict {
    Valid,
    Invalid(TokenError),
    /// Issuer or key not known to this scenario.
    Unresolved(String),
}

pub struct ConformanceChecker<'a> {
    codec: &'a TokenCodec,
}

impl<'a> ConformanceChecker<'a> {
    pub fn new(codec: &'a TokenCodec) -> Self {
        Self { codec }
    }

    pub fn check(&self, name: CheckName, scenario: &Scenario, now: DateTime<Utc>) -> CheckOutcome {
        match name {
            CheckName::VerifierVpValidVc => self.presentation_check(name, scenario, now, |verdicts, record| {
                match verdicts.iter().find(|(_, v)| !matches!(v, CredentialVerdict::Valid)) {
                    Some((id, verdict)) => Err(format!("credential {} did not verify locally: {:?}", id, verdict)),
                    None if record.accepted() => Ok("valid credentials accepted by the verifier".into()),
                    None => Err("verifier rejected valid credentials".into()),
                }
            }),
            CheckName::VerifierVpExpiredVc => self.rejection_check(name, scenario, now, "expired", |v, _| {
                matches!(v, CredentialVerdict::Invalid(TokenError::TokenExpired { .. }))
            }),
            CheckName::VerifierVpNotYetValidVc => self.rejection_check(name, scenario, now, "not yet valid", |v, _| {
                matches!(v, CredentialVerdict::Invalid(TokenError::TokenNotYetValid { .. }))
            }),
            CheckName::VerifierVpRevokedVc => self.rejection_check(name, scenario, now, "revoked", |_, id| {
                id.is_some_and(|id| scenario.session.is_revoked(id))
            }),
            CheckName::AuthorisationTokenWellFormed => match scenario.session.token(TokenKind::OAuth2) {
                Err(e) => CheckOutcome::fail(name, e.to_string()),
                Ok(token) => match self.codec.decode_unverified(token) {
                    Ok((header, _)) => CheckOutcome::pass(name, format!("three-part {} token", header.alg)),
                    Err(e) => CheckOutcome::fail(name, e.to_string()),
                },
            },
            CheckName::AuthorizationWindowValid => match scenario.session.last_authorization() {
                None => CheckOutcome::fail(name, "no authorization fetched in this scenario"),
                Some(authorization) => match authorization.check_usable(now) {
                    Ok(()) => CheckOutcome::pass(name, format!("authorization {} is usable", authorization.id)),
                    Err(issue) => CheckOutcome::fail(name, issue.to_string()),
                },
            },
            CheckName::TransactionMined => match &scenario.session.transaction().receipt {
                None => CheckOutcome::fail(name, "no receipt recorded"),
                Some(receipt) if receipt.succeeded() => CheckOutcome::pass(
                    name,
                    format!("{} mined in block {:?}", receipt.transaction_hash, receipt.block_number),
                ),
                Some(receipt) => CheckOutcome::fail(
                    name,
                    format!(
                        "{} reverted: {}",
                        receipt.transaction_hash,
                        receipt.revert_reason.as_deref().unwrap_or("no reason given")
                    ),
                ),
            },
        }
    }

    fn presentation_check<F>(&self, name: CheckName, scenario: &Scenario, now: DateTime<Utc>, judge: F) -> CheckOutcome
    where
        F: FnOnce(&[(String, CredentialVerdict)], &PresentationRecord) -> Result<String, String>,
    {
        let Some(record) = scenario.session.last_presentation() else {
            return CheckOutcome::fail(name, "no presentation submitted in this scenario");
        };
        if record.credentials.is_empty() {
            return CheckOutcome::fail(name, "the last presentation carried no credentials");
        }

        let verdicts: Vec<(String, CredentialVerdict)> = record
            .credentials
            .iter()
            .map(|token| self.verify_credential(scenario, token, now.timestamp()))
            .collect();

        match judge(&verdicts, record) {
            Ok(detail) => CheckOutcome::pass(name, detail),
            Err(detail) => CheckOutcome::fail(name, detail),
        }
    }

    /// The flawed credential is detected locally and the verifier refused the presentation.
    fn rejection_check<P>(
        &self,
        name: CheckName,
        scenario: &Scenario,
        now: DateTime<Utc>,
        flaw: &str,
        is_flawed: P,
    ) -> CheckOutcome
    where
        P: Fn(&CredentialVerdict, Option<&str>) -> bool,
    {
        self.presentation_check(name, scenario, now, |verdicts, record| {
            let flawed = verdicts.iter().find(|(id, v)| is_flawed(v, Some(id.as_str())));
            match (flawed, record.accepted()) {
                (None, _) => Err(format!("no {} credential in the last presentation", flaw)),
                (Some((id, _)), true) => Err(format!("verifier accepted {} credential {}", flaw, id)),
                (Some((id, _)), false) => Ok(format!("verifier rejected {} credential {}", flaw, id)),
            }
        })
    }

    fn verify_credential(&self, scenario: &Scenario, token: &str, now: i64) -> (String, CredentialVerdict) {
        let (header, claims) = match self.codec.decode_unverified(token) {
            Ok(decoded) => decoded,
            Err(e) => return (token.to_string(), CredentialVerdict::Invalid(e)),
        };
        let id = credential_label(&claims, token);

        let Some(issuer) = claims.get("iss").and_then(|iss| iss.as_str()) else {
            return (id, CredentialVerdict::Invalid(TokenError::MissingClaim("iss".into())));
        };
        let key = match scenario
            .identities
            .resolve_public_key(issuer, header.kid.as_deref(), header.alg)
        {
            Ok(key) => key,
            Err(e) => return (id, CredentialVerdict::Unresolved(e.to_string())),
        };

        match self.codec.verify_jwt_at(token, &key, now) {
            Ok(_) => (id, CredentialVerdict::Valid),
            Err(e) => (id, CredentialVerdict::Invalid(e)),
        }
    }
}

fn credential_label(claims: &Claims, token: &str) -> String {
    credential_id(claims).unwrap_or_else(|| token.chars().take(24).collect())
}
