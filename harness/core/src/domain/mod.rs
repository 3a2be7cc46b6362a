// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure data and state machines. Nothing here performs I/O except the
//! configuration loader.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer

pub mod identity;
pub mod session;
pub mod command;
pub mod ake;
pub mod siop;
pub mod transaction;
pub mod authorization;
pub mod jsonrpc;
pub mod pagination;
pub mod conformance;
pub mod harness_config;
pub mod directory;
