// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! didflow core
//!
//! Scripted conformance harness for decentralized-identity networks.
//!
//! # Architecture
//!
//! - **Domain:** identities, session context, command grammar, flow state machines
//! - **Infrastructure:** key material, token codec, service clients
//! - **Application:** flow engine, conformance checker, scenario runner

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::engine::FlowEngine;
pub use application::error::{ErrorCategory, FlowError, FlowStep};
pub use application::scenario::{ScenarioReport, ScenarioRunner};
pub use domain::harness_config::HarnessConfig;
