// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Schema management: indexes and uniqueness constraints

use crate::error::Result;
use crate::graph::Graph;
use crate::result::Record;
use crate::txn::cypher_escape;
use crate::types::Value;

/// Index and constraint operations for a [`Graph`]
#[derive(Debug, Clone)]
pub struct Schema {
    graph: Graph,
}

struct IndexEntry {
    labels: Vec<String>,
    properties: Vec<String>,
    unique: bool,
}

impl Schema {
    pub(crate) fn new(graph: Graph) -> Self {
        Self { graph }
    }

    /// Create an index on `label` over `keys`
    pub async fn create_index(&self, label: &str, keys: &[&str]) -> Result<()> {
        let statement = format!(
            "CREATE INDEX ON :{}({})",
            cypher_escape(label),
            escape_keys(keys)
        );
        self.execute(statement).await
    }

    pub async fn drop_index(&self, label: &str, keys: &[&str]) -> Result<()> {
        let statement = format!(
            "DROP INDEX ON :{}({})",
            cypher_escape(label),
            escape_keys(keys)
        );
        self.execute(statement).await
    }

    /// Property key lists of the (non-unique) indexes on `label`
    pub async fn get_indexes(&self, label: &str) -> Result<Vec<Vec<String>>> {
        Ok(self
            .index_entries(label)
            .await?
            .into_iter()
            .filter(|entry| !entry.unique)
            .map(|entry| entry.properties)
            .collect())
    }

    pub async fn create_uniqueness_constraint(&self, label: &str, key: &str) -> Result<()> {
        let statement = format!(
            "CREATE CONSTRAINT ON (_:{}) ASSERT _.{} IS UNIQUE",
            cypher_escape(label),
            cypher_escape(key)
        );
        self.execute(statement).await
    }

    pub async fn drop_uniqueness_constraint(&self, label: &str, key: &str) -> Result<()> {
        let statement = format!(
            "DROP CONSTRAINT ON (_:{}) ASSERT _.{} IS UNIQUE",
            cypher_escape(label),
            cypher_escape(key)
        );
        self.execute(statement).await
    }

    /// Property key lists covered by uniqueness constraints on `label`
    pub async fn get_uniqueness_constraints(&self, label: &str) -> Result<Vec<Vec<String>>> {
        Ok(self
            .index_entries(label)
            .await?
            .into_iter()
            .filter(|entry| entry.unique)
            .map(|entry| entry.properties)
            .collect())
    }

    async fn execute(&self, statement: String) -> Result<()> {
        log::debug!("Schema change: {}", statement);
        self.graph.run(statement)?.consume().await?;
        Ok(())
    }

    async fn index_entries(&self, label: &str) -> Result<Vec<IndexEntry>> {
        let mut cursor = self.graph.run("CALL db.indexes()")?;
        let mut entries = Vec::new();
        while cursor.advance().await? {
            let entry = parse_index(cursor.current()?);
            if entry.labels.iter().any(|l| l == label) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

fn escape_keys(keys: &[&str]) -> String {
    keys.iter()
        .map(|key| cypher_escape(key))
        .collect::<Vec<_>>()
        .join(", ")
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Read one `db.indexes()` row; column names differ between server versions
fn parse_index(record: &Record) -> IndexEntry {
    let labels = ["labelsOrTypes", "tokenNames", "label"]
        .iter()
        .map(|key| strings(record.get(key)))
        .find(|labels| !labels.is_empty())
        .unwrap_or_default();
    let properties = strings(record.get("properties"));
    let unique = record
        .get("uniqueness")
        .and_then(Value::as_str)
        .map(|u| u.eq_ignore_ascii_case("UNIQUE"))
        .unwrap_or(false)
        || record
            .get("type")
            .and_then(Value::as_str)
            .map(|t| t.to_ascii_lowercase().contains("unique"))
            .unwrap_or(false);
    IndexEntry {
        labels,
        properties,
        unique,
    }
}
