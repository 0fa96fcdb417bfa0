// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Entity-level operations on a transaction
//!
//! Creation groups abstract nodes by label set and abstract relationships by
//! type, sending one `UNWIND` statement per group.

use super::transaction::Transaction;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::types::{Identity, Node, PropertyValue, Relationship, Subgraph, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Quote an identifier (label, type, property key) for use in a statement.
///
/// Identifiers that start with a letter or underscore and continue with
/// letters, digits or underscores are returned as-is; anything else is
/// wrapped in backticks with embedded backticks doubled.
pub fn cypher_escape(identifier: &str) -> String {
    let mut chars = identifier.chars();
    let simple = match chars.next() {
        Some(first) => {
            (first.is_alphabetic() || first == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        None => false,
    };
    if simple {
        identifier.to_string()
    } else {
        format!("`{}`", identifier.replace('`', "``"))
    }
}

pub(crate) fn label_fragment(labels: &BTreeSet<String>) -> String {
    labels
        .iter()
        .map(|label| format!(":{}", cypher_escape(label)))
        .collect()
}

pub(super) fn properties_value(properties: &crate::types::PropertyMap) -> Value {
    Value::from(PropertyValue::Map(properties.clone()))
}

/// How relationships are written: always new, or matched on endpoints and type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RelationshipWrite {
    Create,
    Merge,
}

impl RelationshipWrite {
    fn clause(self) -> &'static str {
        match self {
            RelationshipWrite::Create => "CREATE",
            RelationshipWrite::Merge => "MERGE",
        }
    }

    /// Create replaces the property map, merge adds to it
    fn assignment(self) -> &'static str {
        match self {
            RelationshipWrite::Create => "=",
            RelationshipWrite::Merge => "+=",
        }
    }
}

impl Transaction {
    /// First value of the first record, or `None` for an empty result
    pub async fn evaluate(&mut self, query: impl Into<Query>) -> Result<Option<Value>> {
        let mut cursor = self.run(query)?;
        let value = cursor.evaluate().await?;
        cursor.close().await?;
        Ok(value)
    }

    /// Create every abstract entity of `subgraph` on the server.
    ///
    /// Returns a copy of the subgraph in which every entity is concrete.
    /// Entities that were already concrete are carried over unchanged; they
    /// must belong to this transaction's graph. A failure after the first
    /// statement was sent rolls the transaction back.
    pub async fn create(&mut self, subgraph: &Subgraph) -> Result<Subgraph> {
        self.assert_open()?;
        self.check_local(subgraph)?;
        match self.create_entities(subgraph).await {
            Ok(created) => {
                log::debug!(
                    "Transaction {} created {} nodes and {} relationships",
                    self.id(),
                    created.order(),
                    created.size()
                );
                Ok(created)
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    async fn create_entities(&mut self, subgraph: &Subgraph) -> Result<Subgraph> {
        let graph = self.graph_id().clone();
        let mut bound: HashMap<Identity, Node> = HashMap::new();

        let mut node_groups: BTreeMap<BTreeSet<String>, Vec<&Node>> = BTreeMap::new();
        for node in subgraph.nodes() {
            if node.is_abstract() {
                node_groups
                    .entry(node.labels().clone())
                    .or_default()
                    .push(node);
            } else {
                bound.insert(node.identity().clone(), node.clone());
            }
        }
        for (labels, nodes) in node_groups {
            let statement = format!(
                "UNWIND $x AS properties CREATE (_{}) SET _ = properties RETURN id(_)",
                label_fragment(&labels)
            );
            let rows: Vec<Value> = nodes
                .iter()
                .map(|node| properties_value(node.properties()))
                .collect();
            let ids = self
                .fetch_ids(Query::new(statement).param("x", rows), nodes.len())
                .await?;
            for (node, id) in nodes.into_iter().zip(ids) {
                bound.insert(node.identity().clone(), node.clone().bind(&graph, id)?);
            }
        }

        self.write_relationships(subgraph, bound, RelationshipWrite::Create)
            .await
    }

    /// Every concrete entity of `subgraph` must belong to this graph
    pub(super) fn check_local(&self, subgraph: &Subgraph) -> Result<()> {
        let graph = self.graph_id();
        let foreign_node = subgraph
            .nodes()
            .find(|node| node.graph().map_or(false, |g| g != graph))
            .map(|node| node.to_string());
        let foreign_rel = subgraph
            .relationships()
            .find(|rel| rel.graph().map_or(false, |g| g != graph))
            .map(|rel| rel.to_string());
        match foreign_node.or(foreign_rel) {
            Some(entity) => Err(Error::Bind(format!(
                "{} belongs to another graph than {}",
                entity, graph
            ))),
            None => Ok(()),
        }
    }

    /// Write the abstract relationships of `subgraph` between the nodes in
    /// `bound`, returning every node and relationship as a concrete subgraph
    pub(super) async fn write_relationships(
        &mut self,
        subgraph: &Subgraph,
        bound: HashMap<Identity, Node>,
        mode: RelationshipWrite,
    ) -> Result<Subgraph> {
        let graph = self.graph_id().clone();
        let mut written = Subgraph::empty();
        for node in bound.values() {
            written.add_node(node.clone());
        }

        let endpoints = |rel: &Relationship| -> Result<(Node, Node)> {
            let lookup = |node: &Node| {
                bound
                    .get(node.identity())
                    .cloned()
                    .ok_or_else(|| Error::Bind(format!("endpoint {} was not written", node)))
            };
            Ok((lookup(rel.start_node())?, lookup(rel.end_node())?))
        };

        let mut rel_groups: BTreeMap<String, Vec<&Relationship>> = BTreeMap::new();
        for rel in subgraph.relationships() {
            if rel.is_abstract() {
                rel_groups
                    .entry(rel.rel_type().to_string())
                    .or_default()
                    .push(rel);
            } else {
                written.add_relationship(rel.clone());
            }
        }
        for (rel_type, rels) in rel_groups {
            let statement = format!(
                "UNWIND $x AS data MATCH (a) WHERE id(a) = data[0] MATCH (b) WHERE id(b) = data[1] \
                 {} (a)-[_:{}]->(b) SET _ {} data[2] RETURN id(_)",
                mode.clause(),
                cypher_escape(&rel_type),
                mode.assignment()
            );
            let mut resolved = Vec::with_capacity(rels.len());
            let mut rows = Vec::with_capacity(rels.len());
            for rel in &rels {
                let (start, end) = endpoints(rel)?;
                rows.push(Value::List(vec![
                    Value::from(start.id()),
                    Value::from(end.id()),
                    properties_value(rel.properties()),
                ]));
                resolved.push((start, end));
            }
            let ids = self
                .fetch_ids(Query::new(statement).param("x", rows), rels.len())
                .await?;
            for ((rel, (start, end)), id) in rels.into_iter().zip(resolved).zip(ids) {
                let rel = rel.clone().replace_endpoints(start, end).bind(&graph, id)?;
                written.add_relationship(rel);
            }
        }
        Ok(written)
    }

    /// Delete the concrete nodes and relationships of `subgraph`.
    ///
    /// Nodes are detached first, so relationships outside the subgraph that
    /// touch deleted nodes go too. Abstract entities are ignored.
    pub async fn delete(&mut self, subgraph: &Subgraph) -> Result<()> {
        self.assert_open()?;
        self.check_local(subgraph)?;
        let (node_ids, rel_ids) = self.concrete_ids(subgraph);
        if !rel_ids.is_empty() {
            self.enqueue(
                &Query::new("MATCH ()-[_]->() WHERE id(_) IN $x DELETE _").param("x", rel_ids),
            )?;
        }
        if !node_ids.is_empty() {
            self.enqueue(
                &Query::new("MATCH (_) WHERE id(_) IN $x DETACH DELETE _").param("x", node_ids),
            )?;
        }
        self.flush().await
    }

    /// Delete the concrete relationships of `subgraph`, keeping its nodes
    pub async fn separate(&mut self, subgraph: &Subgraph) -> Result<()> {
        self.assert_open()?;
        self.check_local(subgraph)?;
        let (_, rel_ids) = self.concrete_ids(subgraph);
        if !rel_ids.is_empty() {
            self.enqueue(
                &Query::new("MATCH ()-[_]->() WHERE id(_) IN $x DELETE _").param("x", rel_ids),
            )?;
        }
        self.flush().await
    }

    /// True if every entity of `subgraph` exists in this graph.
    ///
    /// Abstract entities, and entities from another graph, never exist.
    pub async fn exists(&mut self, subgraph: &Subgraph) -> Result<bool> {
        if subgraph.is_empty() {
            return Ok(false);
        }
        let graph = self.graph_id().clone();
        let foreign = subgraph.nodes().any(|n| n.graph() != Some(&graph))
            || subgraph.relationships().any(|r| r.graph() != Some(&graph));
        if foreign {
            return Ok(false);
        }

        let (node_ids, rel_ids) = self.concrete_ids(subgraph);
        let expected_nodes = node_ids.len() as i64;
        let nodes = self
            .evaluate(
                Query::new("MATCH (_) WHERE id(_) IN $x RETURN count(_)").param("x", node_ids),
            )
            .await?;
        if nodes.and_then(|v| v.as_i64()) != Some(expected_nodes) {
            return Ok(false);
        }
        if rel_ids.is_empty() {
            return Ok(true);
        }
        let expected_rels = rel_ids.len() as i64;
        let rels = self
            .evaluate(
                Query::new("MATCH ()-[_]->() WHERE id(_) IN $x RETURN count(_)")
                    .param("x", rel_ids),
            )
            .await?;
        Ok(rels.and_then(|v| v.as_i64()) == Some(expected_rels))
    }

    pub(super) fn concrete_ids(&self, subgraph: &Subgraph) -> (Vec<i64>, Vec<i64>) {
        (
            subgraph.nodes().filter_map(Node::id).collect(),
            subgraph.relationships().filter_map(Relationship::id).collect(),
        )
    }

    pub(super) async fn fetch_ids(&mut self, query: Query, expected: usize) -> Result<Vec<i64>> {
        let mut cursor = self.run(query)?;
        let mut ids = Vec::with_capacity(expected);
        while cursor.advance().await? {
            let id = cursor
                .current()?
                .value_at(0)?
                .as_i64()
                .ok_or_else(|| Error::Protocol("expected an integer id".into()))?;
            ids.push(id);
        }
        if ids.len() != expected {
            return Err(Error::Protocol(format!(
                "expected {} ids, received {}",
                expected,
                ids.len()
            )));
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cypher_escape() {
        assert_eq!(cypher_escape("Person"), "Person");
        assert_eq!(cypher_escape("_private1"), "_private1");
        assert_eq!(cypher_escape("1st"), "`1st`");
        assert_eq!(cypher_escape("has space"), "`has space`");
        assert_eq!(cypher_escape("back`tick"), "`back``tick`");
        assert_eq!(cypher_escape(""), "``");
    }

    #[test]
    fn test_label_fragment() {
        let labels: BTreeSet<String> = ["Person".to_string(), "Big Cat".to_string()].into();
        assert_eq!(label_fragment(&labels), ":`Big Cat`:Person");
        assert_eq!(label_fragment(&BTreeSet::new()), "");
    }
}
