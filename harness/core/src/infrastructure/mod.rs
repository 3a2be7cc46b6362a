// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod crypto;
pub mod jwt;
pub mod presentation;
pub mod ledger_signing;
pub mod clients;
