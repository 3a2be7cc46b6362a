// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Trusted-App Key Directory
//!
//! Domain interface for resolving a trusted application's advertised public
//! key. The AKE flow uses it to verify the resource application's detached
//! signature. Implemented by the trusted-apps registry client in
//! `infrastructure/clients/registry.rs`.

use async_trait::async_trait;
use thiserror::Error;

use crate::infrastructure::clients::ClientError;
use crate::infrastructure::crypto::{KeyError, PublicKey};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Trusted app '{app}' advertises no key{}", .kid.as_deref().map(|k| format!(" with kid '{}'", k)).unwrap_or_default())]
    UnknownKey { app: String, kid: Option<String> },

    #[error("Trusted app key is unusable: {0}")]
    Key(#[from] KeyError),
}

#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Public key of `app`, selected by `kid` when given, else the first key.
    async fn resolve_app_key(&self, app: &str, kid: Option<&str>) -> Result<PublicKey, DirectoryError>;
}
