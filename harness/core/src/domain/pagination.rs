// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Paginated collection responses.
//!
//! Registry-backed collections return the full form with `total` and all four
//! links. Storage-backed collections (the data hub) return a reduced form
//! without `total` and with only a `next` link. Both deserialize into [`Page`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(rename = "self")]
    pub self_link: String,
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(rename = "pageSize")]
    pub page_size: u64,
    #[serde(default)]
    pub links: PageLinks,
}

impl<T> Page<T> {
    /// Full form: `total` and every navigation link present.
    pub fn is_full(&self) -> bool {
        self.total.is_some()
            && self.links.first.is_some()
            && self.links.last.is_some()
    }

    pub fn has_next(&self) -> bool {
        self.links.next.is_some()
    }
}

/// Page selection sent as query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub after: Option<u64>,
    pub size: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { after: None, size: 10 }
    }
}

impl PageRequest {
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("page[size]", self.size.to_string())];
        if let Some(after) = self.after {
            query.push(("page[after]", after.to_string()));
        }
        query
    }
}
