// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Flow Errors
//!
//! Every failure leaving the flow engine is a [`FlowError`]: the underlying
//! error, unchanged, annotated with the [`FlowStep`] that produced it. The
//! [`ErrorCategory`] classification drives reporting; it never changes how an
//! error propagates.
//!
//! A conformance check reporting `success: false` is not a `FlowError`.

use std::fmt;

use thiserror::Error;

use crate::domain::ake::AkeViolation;
use crate::domain::command::CommandError;
use crate::domain::conformance::UnknownCheck;
use crate::domain::directory::DirectoryError;
use crate::domain::identity::IdentityError;
use crate::domain::session::SessionError;
use crate::domain::siop::SiopTransitionError;
use crate::domain::transaction::TransactionError;
use crate::infrastructure::clients::ClientError;
use crate::infrastructure::crypto::KeyError;
use crate::infrastructure::jwt::TokenError;
use crate::infrastructure::ledger_signing::LedgerSigningError;

/// Step of a command at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStep {
    Parse,
    Identity,
    Challenge,
    AkeExchange,
    AkeVerification,
    SessionGrant,
    Presentation,
    PresentationSubmission,
    Credential,
    ParamsBuilding,
    Signing,
    Submission,
    ReceiptPolling,
    Registry,
    Timestamp,
    JsonRpc,
    Notifications,
    DataHub,
    Variables,
    Conformance,
    Expectation,
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowStep::Parse => "parse",
            FlowStep::Identity => "identity",
            FlowStep::Challenge => "challenge",
            FlowStep::AkeExchange => "ake-exchange",
            FlowStep::AkeVerification => "ake-verification",
            FlowStep::SessionGrant => "session-grant",
            FlowStep::Presentation => "presentation",
            FlowStep::PresentationSubmission => "presentation-submission",
            FlowStep::Credential => "credential",
            FlowStep::ParamsBuilding => "params-building",
            FlowStep::Signing => "signing",
            FlowStep::Submission => "submission",
            FlowStep::ReceiptPolling => "receipt-polling",
            FlowStep::Registry => "registry",
            FlowStep::Timestamp => "timestamp",
            FlowStep::JsonRpc => "jsonrpc",
            FlowStep::Notifications => "notifications",
            FlowStep::DataHub => "datahub",
            FlowStep::Variables => "variables",
            FlowStep::Conformance => "conformance",
            FlowStep::Expectation => "expectation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed command or payload; never retried.
    Structural,
    /// Signature, validity window or key availability.
    Crypto,
    /// Network fault or non-2xx status.
    Transport,
    /// Application error reported by a remote service.
    Rpc,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Structural => f.write_str("structural"),
            ErrorCategory::Crypto => f.write_str("crypto"),
            ErrorCategory::Transport => f.write_str("transport"),
            ErrorCategory::Rpc => f.write_str("rpc"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowErrorKind {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("AKE response rejected: {0}")]
    Ake(#[from] AkeViolation),

    #[error(transparent)]
    Siop(#[from] SiopTransitionError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    LedgerSigning(#[from] LedgerSigningError),

    #[error(transparent)]
    UnknownCheck(#[from] UnknownCheck),

    #[error("No receipt for {tx_hash} after {attempts} attempts")]
    ReceiptTimeout { tx_hash: String, attempts: u32 },

    #[error("Transaction reverted: {}", .reason.as_deref().unwrap_or("no reason given"))]
    TransactionReverted { reason: Option<String> },

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Expectation not met: {0}")]
    ExpectationFailed(String),
}

/// A failure annotated with the step that produced it.
#[derive(Debug, Error)]
#[error("[{step}] {kind}")]
pub struct FlowError {
    pub step: FlowStep,
    #[source]
    pub kind: FlowErrorKind,
}

impl FlowError {
    pub fn new(step: FlowStep, kind: impl Into<FlowErrorKind>) -> Self {
        Self {
            step,
            kind: kind.into(),
        }
    }

    pub fn malformed(step: FlowStep, detail: impl Into<String>) -> Self {
        Self::new(step, FlowErrorKind::Malformed(detail.into()))
    }

    /// HTTP status of the failed call, if the failure was a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            FlowErrorKind::Client(e) => e.status(),
            FlowErrorKind::Directory(DirectoryError::Client(e)) => e.status(),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        fn client(e: &ClientError) -> ErrorCategory {
            match e {
                ClientError::Network(_) | ClientError::HttpStatus { .. } | ClientError::SchemaMismatch(_) => {
                    ErrorCategory::Transport
                }
                ClientError::Rpc(_) | ClientError::IdMismatch { .. } => ErrorCategory::Rpc,
            }
        }

        match &self.kind {
            FlowErrorKind::Command(_)
            | FlowErrorKind::Session(_)
            | FlowErrorKind::Siop(_)
            | FlowErrorKind::Transaction(_)
            | FlowErrorKind::UnknownCheck(_)
            | FlowErrorKind::Malformed(_)
            | FlowErrorKind::ExpectationFailed(_) => ErrorCategory::Structural,
            FlowErrorKind::Identity(IdentityError::UnknownAlgorithm(_) | IdentityError::UnknownIdentity(_)) => {
                ErrorCategory::Structural
            }
            FlowErrorKind::Identity(_) | FlowErrorKind::Key(_) | FlowErrorKind::Ake(_) => ErrorCategory::Crypto,
            FlowErrorKind::LedgerSigning(LedgerSigningError::Transaction(_)) => ErrorCategory::Structural,
            FlowErrorKind::LedgerSigning(_) => ErrorCategory::Crypto,
            FlowErrorKind::Token(
                TokenError::TokenMalformed(_) | TokenError::MissingClaim(_) | TokenError::UnsupportedAlgorithm(_),
            ) => ErrorCategory::Structural,
            FlowErrorKind::Token(_) => ErrorCategory::Crypto,
            FlowErrorKind::Client(e) => client(e),
            FlowErrorKind::Directory(DirectoryError::Client(e)) => client(e),
            FlowErrorKind::Directory(_) => ErrorCategory::Crypto,
            FlowErrorKind::ReceiptTimeout { .. } => ErrorCategory::Transport,
            FlowErrorKind::TransactionReverted { .. } => ErrorCategory::Rpc,
        }
    }

    /// Name of the originating condition, e.g. `SignatureInvalid`.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            FlowErrorKind::Command(CommandError::UnknownCommand(_)) => "UnknownCommand",
            FlowErrorKind::Command(CommandError::MissingArgument { .. }) => "MissingArgument",
            FlowErrorKind::Command(CommandError::InvalidArgument { .. }) => "InvalidArgument",
            FlowErrorKind::Identity(IdentityError::UnknownAlgorithm(_)) => "UnknownAlgorithm",
            FlowErrorKind::Identity(IdentityError::NoKeyForAlgorithm { .. }) => "NoKeyForAlgorithm",
            FlowErrorKind::Identity(IdentityError::UnsupportedKeyType { .. }) => "UnsupportedKeyType",
            FlowErrorKind::Identity(IdentityError::UnknownIdentity(_)) => "UnknownIdentity",
            FlowErrorKind::Identity(IdentityError::Key(_)) | FlowErrorKind::Key(_) => "KeyError",
            FlowErrorKind::Session(SessionError::NoActiveIdentity) => "NoActiveIdentity",
            FlowErrorKind::Session(SessionError::UnknownVariable(_)) => "UnknownVariable",
            FlowErrorKind::Session(SessionError::NoToken(_)) => "NoToken",
            FlowErrorKind::Session(SessionError::Transaction(_)) | FlowErrorKind::Transaction(_) => {
                "TransactionError"
            }
            FlowErrorKind::Token(TokenError::SignatureInvalid(_)) => "SignatureInvalid",
            FlowErrorKind::Token(TokenError::TokenMalformed(_)) => "TokenMalformed",
            FlowErrorKind::Token(TokenError::TokenExpired { .. }) => "TokenExpired",
            FlowErrorKind::Token(TokenError::TokenNotYetValid { .. }) => "TokenNotYetValid",
            FlowErrorKind::Token(TokenError::MissingClaim(_)) => "MissingClaim",
            FlowErrorKind::Token(TokenError::UnsupportedAlgorithm(_)) => "UnsupportedAlgorithm",
            FlowErrorKind::Token(TokenError::AlgorithmMismatch { .. }) => "KeyError",
            FlowErrorKind::Token(TokenError::Key(_)) => "KeyError",
            FlowErrorKind::Client(e) | FlowErrorKind::Directory(DirectoryError::Client(e)) => match e {
                ClientError::Network(_) => "NetworkError",
                ClientError::HttpStatus { .. } => "HttpStatusError",
                ClientError::SchemaMismatch(_) => "SchemaMismatch",
                ClientError::Rpc(_) => "RpcError",
                ClientError::IdMismatch { .. } => "IdMismatch",
            },
            FlowErrorKind::Directory(DirectoryError::UnknownKey { .. }) => "UnknownKey",
            FlowErrorKind::Directory(DirectoryError::Key(_)) => "KeyError",
            FlowErrorKind::Ake(_) => "AkeViolation",
            FlowErrorKind::Siop(_) => "InvalidTransition",
            FlowErrorKind::LedgerSigning(_) => "LedgerSigningError",
            FlowErrorKind::UnknownCheck(_) => "UnknownCheck",
            FlowErrorKind::ReceiptTimeout { .. } => "ReceiptTimeout",
            FlowErrorKind::TransactionReverted { .. } => "TransactionReverted",
            FlowErrorKind::Malformed(_) => "Malformed",
            FlowErrorKind::ExpectationFailed(_) => "ExpectationFailed",
        }
    }

    /// Case-insensitive match on the kind name or the message.
    pub fn matches(&self, phrase: &str) -> bool {
        let phrase = phrase.to_lowercase();
        self.kind_name().to_lowercase().contains(&phrase) || self.to_string().to_lowercase().contains(&phrase)
    }
}

/// Attach a step to any error convertible into [`FlowErrorKind`].
pub(crate) trait AtStep<T> {
    fn at(self, step: FlowStep) -> Result<T, FlowError>;
}

impl<T, E: Into<FlowErrorKind>> AtStep<T> for Result<T, E> {
    fn at(self, step: FlowStep) -> Result<T, FlowError> {
        self.map_err(|e| FlowError::new(step, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::{Algorithm, Flow, IdentityKind};

    #[test]
    fn test_unsupported_key_type_is_crypto_and_descriptive() {
        let err = FlowError::new(
            FlowStep::Presentation,
            IdentityError::UnsupportedKeyType {
                flow: Flow::Siop,
                algorithm: Algorithm::Rs256,
                kind: IdentityKind::NaturalPerson,
            },
        );

        assert_eq!(err.category(), ErrorCategory::Crypto);
        assert!(err.matches("key pair generation for RSA is not supported"));
        assert!(err.matches("unsupportedkeytype"));
        assert!(err.to_string().starts_with("[presentation]"));
    }

    #[test]
    fn test_status_only_for_http_failures() {
        let http = FlowError::new(
            FlowStep::Registry,
            ClientError::HttpStatus {
                status: 404,
                body: String::new(),
            },
        );
        assert_eq!(http.status(), Some(404));
        assert_eq!(http.category(), ErrorCategory::Transport);

        let structural = FlowError::new(FlowStep::Identity, SessionError::NoActiveIdentity);
        assert_eq!(structural.status(), None);
        assert_eq!(structural.kind_name(), "NoActiveIdentity");
    }
}
