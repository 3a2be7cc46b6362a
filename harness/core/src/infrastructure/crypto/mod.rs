// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Key material, JWK conversion and payload sealing.

pub mod jwk;
pub mod keys;
pub mod sealing;

pub use jwk::Jwk;
pub use keys::{KeyError, PublicKey, SecretKey};
