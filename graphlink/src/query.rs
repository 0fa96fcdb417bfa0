// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query values
//!
//! A [`Query`] couples statement text with its parameters and an idempotency
//! flag. Anything that converts into a `Query` (string slices, `String`s) can
//! be passed to [`crate::Graph::run`] and [`crate::Transaction::run`].

use crate::types::Value;
use std::collections::BTreeMap;

/// Statement text plus parameters
///
/// # Examples
///
/// ```no_run
/// # use graphlink::{Graph, Query};
/// # async fn demo(graph: Graph) -> graphlink::Result<()> {
/// let query = Query::new("MATCH (p:Person) WHERE p.age > $age RETURN p.name")
///     .param("age", 25)
///     .idempotent(true);
///
/// let mut cursor = graph.run(query)?;
/// while let Some(record) = cursor.next().await? {
///     println!("{}", record);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    text: String,
    parameters: BTreeMap<String, Value>,
    idempotent: bool,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Query {
            text: text.into(),
            parameters: BTreeMap::new(),
            idempotent: false,
        }
    }

    /// Add (or replace) a single parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Add several parameters at once
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.parameters
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Mark the query as safe to re-run after a transient failure.
    ///
    /// Only autocommit queries started with [`crate::Graph::run`] are ever
    /// retried, and only before the first record has been delivered.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

impl From<&String> for Query {
    fn from(text: &String) -> Self {
        Query::new(text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let query = Query::new("RETURN $a + $b")
            .param("a", 1)
            .params([("b", 2), ("c", 3)])
            .param("a", 10);
        assert_eq!(query.parameters().len(), 3);
        assert_eq!(query.parameters()["a"], Value::Integer(10));
        assert!(!query.is_idempotent());
        assert!(query.clone().idempotent(true).is_idempotent());
    }

    #[test]
    fn test_from_str() {
        let query: Query = "RETURN 1".into();
        assert_eq!(query.text(), "RETURN 1");
        assert!(query.parameters().is_empty());
    }
}
