// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod error;
pub mod engine;
pub mod ake_flow;
pub mod siop_flow;
pub mod transaction_flow;
pub mod conformance;
pub mod scenario;
