// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Result summaries and update counters

use crate::error::Result;
use crate::transport::WireMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Update statistics reported at the end of a result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub constraints_added: i64,
    pub constraints_removed: i64,
    pub indexes_added: i64,
    pub indexes_removed: i64,
    pub labels_added: i64,
    pub labels_removed: i64,
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub properties_set: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
}

impl Counters {
    /// True if any counter is non-zero
    pub fn contains_updates(&self) -> bool {
        self != &Counters::default()
    }

    /// Parse the `stats` object; keys may use `-` or `_` as separator
    pub(crate) fn from_wire(stats: Option<&Json>) -> Result<Self> {
        let Some(Json::Object(stats)) = stats else {
            return Ok(Counters::default());
        };
        let normalized: serde_json::Map<String, Json> = stats
            .iter()
            .map(|(k, v)| (k.replace('-', "_"), v.clone()))
            .filter(|(_, v)| v.is_i64())
            .collect();
        Ok(serde_json::from_value(Json::Object(normalized))?)
    }
}

/// Server notification attached to a result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notification {
    pub code: String,
    pub title: String,
    pub description: String,
    pub severity: String,
}

/// Everything known about a finished result besides its records
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub statement: String,
    pub counters: Counters,
    pub plan: Option<Json>,
    pub notifications: Vec<Notification>,
    /// Raw summary metadata as received
    pub metadata: WireMap,
}

impl Summary {
    pub(crate) fn from_metadata(statement: &str, metadata: WireMap) -> Result<Self> {
        let counters = Counters::from_wire(metadata.get("stats"))?;
        let plan = metadata
            .get("plan")
            .or_else(|| metadata.get("profile"))
            .cloned();
        let notifications = match metadata.get("notifications") {
            Some(list @ Json::Array(_)) => serde_json::from_value(list.clone())?,
            _ => Vec::new(),
        };
        Ok(Summary {
            statement: statement.to_string(),
            counters,
            plan,
            notifications,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counters_accept_both_separators() {
        let counters = Counters::from_wire(Some(&json!({
            "nodes-created": 2,
            "properties_set": 3,
            "contains-updates": true
        })))
        .unwrap();
        assert_eq!(counters.nodes_created, 2);
        assert_eq!(counters.properties_set, 3);
        assert!(counters.contains_updates());
        assert!(!Counters::default().contains_updates());
    }

    #[test]
    fn test_summary_from_metadata() {
        let metadata = json!({
            "stats": {"relationships-created": 1},
            "notifications": [{"code": "Neo.ClientNotification.Statement.CartesianProduct", "title": "cartesian"}]
        });
        let Json::Object(metadata) = metadata else {
            panic!("expected object");
        };
        let summary = Summary::from_metadata("MATCH (a), (b) CREATE (a)-[:R]->(b)", metadata).unwrap();
        assert_eq!(summary.counters.relationships_created, 1);
        assert_eq!(summary.notifications.len(), 1);
        assert!(summary.plan.is_none());
    }
}
