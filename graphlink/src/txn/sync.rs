// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Keeping local entities and their server counterparts in step
//!
//! `merge` writes abstract entities unless an equivalent already exists,
//! `pull` refreshes concrete entities from the server, `push` overwrites the
//! server copies with the local labels and properties, and `degree` counts
//! the relationships attached to a subgraph's nodes.

use super::operations::{cypher_escape, label_fragment, properties_value, RelationshipWrite};
use super::transaction::Transaction;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::types::{Identity, Node, Relationship, Subgraph, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Nodes merged by one statement share the match label, match keys and the
/// full label set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct MergeGroup {
    primary_label: Option<String>,
    keys: Vec<String>,
    labels: BTreeSet<String>,
}

impl MergeGroup {
    fn for_node(node: &Node, primary_label: Option<&str>, primary_keys: &[&str]) -> Result<Self> {
        let primary_label = primary_label
            .map(str::to_string)
            .or_else(|| node.labels().iter().next().cloned());
        let keys: Vec<String> = if primary_keys.is_empty() {
            node.properties().keys().cloned().collect()
        } else {
            primary_keys.iter().map(|k| k.to_string()).collect()
        };
        if let Some(missing) = keys.iter().find(|key| node.get(key).is_none()) {
            return Err(Error::InvalidProperty(format!(
                "cannot merge {} without a value for '{}'",
                node, missing
            )));
        }
        let mut labels = node.labels().clone();
        if let Some(label) = &primary_label {
            labels.insert(label.clone());
        }
        Ok(Self {
            primary_label,
            keys,
            labels,
        })
    }

    fn statement(&self) -> String {
        let label = self
            .primary_label
            .as_deref()
            .map(|l| format!(":{}", cypher_escape(l)))
            .unwrap_or_default();
        let pattern = if self.keys.is_empty() {
            String::new()
        } else {
            let pairs: Vec<String> = self
                .keys
                .iter()
                .enumerate()
                .map(|(i, key)| format!("{}: data[0][{}]", cypher_escape(key), i))
                .collect();
            format!(" {{{}}}", pairs.join(", "))
        };
        let extra: BTreeSet<String> = self
            .labels
            .iter()
            .filter(|l| Some(l.as_str()) != self.primary_label.as_deref())
            .cloned()
            .collect();
        let set_labels = if extra.is_empty() {
            String::new()
        } else {
            format!(" SET _{}", label_fragment(&extra))
        };
        format!(
            "UNWIND $x AS data MERGE (_{}{}) SET _ += data[1]{} RETURN id(_)",
            label, pattern, set_labels
        )
    }

    fn row(&self, node: &Node) -> Value {
        let key_values: Vec<Value> = self
            .keys
            .iter()
            .map(|key| {
                node.get(key)
                    .cloned()
                    .map(Value::from)
                    .unwrap_or(Value::Null)
            })
            .collect();
        Value::List(vec![Value::List(key_values), properties_value(node.properties())])
    }
}

impl Transaction {
    /// Merge the abstract entities of `subgraph` into the graph.
    ///
    /// Each abstract node is matched against existing nodes carrying
    /// `primary_label` (default: the node's first label) with equal values
    /// for `primary_keys` (default: all of the node's property keys). A match
    /// gains the node's labels and properties; otherwise a new node is
    /// created. Abstract relationships are then matched on endpoints and type
    /// in the same way. Returns the subgraph with every entity concrete.
    pub async fn merge(
        &mut self,
        subgraph: &Subgraph,
        primary_label: Option<&str>,
        primary_keys: &[&str],
    ) -> Result<Subgraph> {
        self.assert_open()?;
        self.check_local(subgraph)?;

        let mut groups: BTreeMap<MergeGroup, Vec<&Node>> = BTreeMap::new();
        let mut bound: HashMap<Identity, Node> = HashMap::new();
        for node in subgraph.nodes() {
            if node.is_abstract() {
                let group = MergeGroup::for_node(node, primary_label, primary_keys)?;
                groups.entry(group).or_default().push(node);
            } else {
                bound.insert(node.identity().clone(), node.clone());
            }
        }

        match self.merge_entities(subgraph, groups, bound).await {
            Ok(merged) => {
                log::debug!(
                    "Transaction {} merged {} nodes and {} relationships",
                    self.id(),
                    merged.order(),
                    merged.size()
                );
                Ok(merged)
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    async fn merge_entities(
        &mut self,
        subgraph: &Subgraph,
        groups: BTreeMap<MergeGroup, Vec<&Node>>,
        mut bound: HashMap<Identity, Node>,
    ) -> Result<Subgraph> {
        let graph = self.graph_id().clone();
        for (group, nodes) in groups {
            let rows: Vec<Value> = nodes.iter().map(|node| group.row(node)).collect();
            let ids = self
                .fetch_ids(Query::new(group.statement()).param("x", rows), nodes.len())
                .await?;
            for (node, id) in nodes.into_iter().zip(ids) {
                let mut merged = node.clone();
                for label in &group.labels {
                    merged.add_label(label.clone());
                }
                bound.insert(node.identity().clone(), merged.bind(&graph, id)?);
            }
        }
        self.write_relationships(subgraph, bound, RelationshipWrite::Merge)
            .await
    }

    /// Fetch the current server state of the concrete entities of `subgraph`.
    ///
    /// Returns a copy in which concrete nodes and relationships carry the
    /// labels and properties held by the server. Abstract entities are
    /// carried over unchanged. Fails with [`Error::EntityNotFound`] if a
    /// concrete entity no longer exists.
    pub async fn pull(&mut self, subgraph: &Subgraph) -> Result<Subgraph> {
        self.assert_open()?;
        self.check_local(subgraph)?;
        let (node_ids, rel_ids) = self.concrete_ids(subgraph);

        let mut nodes: HashMap<i64, Node> = HashMap::new();
        if !node_ids.is_empty() {
            for value in self
                .first_column(
                    Query::new("MATCH (_) WHERE id(_) IN $x RETURN _").param("x", node_ids.clone()),
                )
                .await?
            {
                if let Value::Node(node) = value {
                    if let Some(id) = node.id() {
                        nodes.insert(id, node);
                    }
                }
            }
            if let Some(missing) = node_ids.iter().find(|id| !nodes.contains_key(id)) {
                return Err(Error::EntityNotFound(format!("node {}", missing)));
            }
        }

        let mut rels: HashMap<i64, Relationship> = HashMap::new();
        if !rel_ids.is_empty() {
            for value in self
                .first_column(
                    Query::new("MATCH ()-[_]->() WHERE id(_) IN $x RETURN _")
                        .param("x", rel_ids.clone()),
                )
                .await?
            {
                if let Value::Relationship(rel) = value {
                    if let Some(id) = rel.id() {
                        rels.insert(id, rel);
                    }
                }
            }
            if let Some(missing) = rel_ids.iter().find(|id| !rels.contains_key(id)) {
                return Err(Error::EntityNotFound(format!("relationship {}", missing)));
            }
        }

        let refreshed = |node: &Node| -> Node {
            node.id()
                .and_then(|id| nodes.get(&id))
                .cloned()
                .unwrap_or_else(|| node.clone())
        };
        let mut pulled = Subgraph::empty();
        for node in subgraph.nodes() {
            pulled.add_node(refreshed(node));
        }
        for rel in subgraph.relationships() {
            let base = rel
                .id()
                .and_then(|id| rels.get(&id))
                .cloned()
                .unwrap_or_else(|| rel.clone());
            let (start, end) = (refreshed(rel.start_node()), refreshed(rel.end_node()));
            pulled.add_relationship(base.replace_endpoints(start, end));
        }
        log::debug!(
            "Transaction {} pulled {} nodes and {} relationships",
            self.id(),
            nodes.len(),
            rels.len()
        );
        Ok(pulled)
    }

    /// Overwrite the server copies of the concrete entities of `subgraph`
    /// with their local labels and properties.
    ///
    /// Abstract entities are ignored. Fails with [`Error::EntityNotFound`],
    /// before anything is written, if a concrete entity no longer exists.
    pub async fn push(&mut self, subgraph: &Subgraph) -> Result<()> {
        self.assert_open()?;
        self.check_local(subgraph)?;
        let (node_ids, rel_ids) = self.concrete_ids(subgraph);

        let mut remote_labels: HashMap<i64, BTreeSet<String>> = HashMap::new();
        if !node_ids.is_empty() {
            let mut cursor = self.run(
                Query::new("MATCH (_) WHERE id(_) IN $x RETURN id(_), labels(_)")
                    .param("x", node_ids.clone()),
            )?;
            while cursor.advance().await? {
                let record = cursor.current()?;
                let id = record.value_at(0)?.as_i64();
                let labels = record
                    .value_at(1)?
                    .as_list()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|l| l.as_str().map(str::to_string))
                            .collect::<BTreeSet<_>>()
                    })
                    .unwrap_or_default();
                if let Some(id) = id {
                    remote_labels.insert(id, labels);
                }
            }
            if let Some(missing) = node_ids.iter().find(|id| !remote_labels.contains_key(id)) {
                return Err(Error::EntityNotFound(format!("node {}", missing)));
            }
        }
        if !rel_ids.is_empty() {
            let found: BTreeSet<i64> = self
                .first_column(
                    Query::new("MATCH ()-[_]->() WHERE id(_) IN $x RETURN id(_)")
                        .param("x", rel_ids.clone()),
                )
                .await?
                .iter()
                .filter_map(Value::as_i64)
                .collect();
            if let Some(missing) = rel_ids.iter().find(|id| !found.contains(id)) {
                return Err(Error::EntityNotFound(format!("relationship {}", missing)));
            }
        }

        match self.push_entities(subgraph, &remote_labels).await {
            Ok(()) => {
                log::debug!(
                    "Transaction {} pushed {} nodes and {} relationships",
                    self.id(),
                    node_ids.len(),
                    rel_ids.len()
                );
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    async fn push_entities(
        &mut self,
        subgraph: &Subgraph,
        remote_labels: &HashMap<i64, BTreeSet<String>>,
    ) -> Result<()> {
        for node in subgraph.nodes() {
            let Some(id) = node.id() else { continue };
            let mut statement = String::from("MATCH (_) WHERE id(_) = $x SET _ = $y");
            if let Some(remote) = remote_labels.get(&id) {
                let stale: BTreeSet<String> = remote.difference(node.labels()).cloned().collect();
                if !stale.is_empty() {
                    statement.push_str(&format!(" REMOVE _{}", label_fragment(&stale)));
                }
                let fresh: BTreeSet<String> = node.labels().difference(remote).cloned().collect();
                if !fresh.is_empty() {
                    statement.push_str(&format!(" SET _{}", label_fragment(&fresh)));
                }
            }
            self.enqueue(
                &Query::new(statement)
                    .param("x", id)
                    .param("y", properties_value(node.properties())),
            )?;
        }

        let rows: Vec<Value> = subgraph
            .relationships()
            .filter_map(|rel| {
                rel.id().map(|id| {
                    Value::List(vec![Value::from(id), properties_value(rel.properties())])
                })
            })
            .collect();
        if !rows.is_empty() {
            let expected = rows.len();
            self.fetch_ids(
                Query::new(
                    "UNWIND $x AS data MATCH ()-[_]->() WHERE id(_) = data[0] \
                     SET _ = data[1] RETURN id(_)",
                )
                .param("x", rows),
                expected,
            )
            .await?;
        }
        self.flush().await
    }

    /// Number of distinct relationships attached to the concrete nodes of
    /// `subgraph`
    pub async fn degree(&mut self, subgraph: &Subgraph) -> Result<i64> {
        self.assert_open()?;
        self.check_local(subgraph)?;
        let (node_ids, _) = self.concrete_ids(subgraph);
        if node_ids.is_empty() {
            return Ok(0);
        }
        let count = self
            .evaluate(
                Query::new("MATCH (_)-[r]-() WHERE id(_) IN $x RETURN count(DISTINCT r)")
                    .param("x", node_ids),
            )
            .await?;
        Ok(count.and_then(|v| v.as_i64()).unwrap_or(0))
    }

    async fn first_column(&mut self, query: Query) -> Result<Vec<Value>> {
        let mut cursor = self.run(query)?;
        let mut values = Vec::new();
        while cursor.advance().await? {
            values.push(cursor.current()?.value_at(0)?.clone());
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_statement_uses_primary_label_and_keys() {
        let node = Node::new(["Person", "Admin"])
            .with_property("name", "Alice")
            .with_property("age", 33);
        let group = MergeGroup::for_node(&node, Some("Person"), &["name"]).unwrap();
        assert_eq!(
            group.statement(),
            "UNWIND $x AS data MERGE (_:Person {name: data[0][0]}) SET _ += data[1] \
             SET _:Admin RETURN id(_)"
        );
        let row = group.row(&node);
        let items = row.as_list().unwrap();
        assert_eq!(items[0], Value::List(vec![Value::from("Alice")]));
    }

    #[test]
    fn test_merge_defaults_to_first_label_and_all_keys() {
        let node = Node::new(["Person"])
            .with_property("name", "Bob")
            .with_property("team name", "x");
        let group = MergeGroup::for_node(&node, None, &[]).unwrap();
        assert_eq!(group.primary_label.as_deref(), Some("Person"));
        assert_eq!(
            group.statement(),
            "UNWIND $x AS data MERGE (_:Person {name: data[0][0], `team name`: data[0][1]}) \
             SET _ += data[1] RETURN id(_)"
        );
    }

    #[test]
    fn test_merge_requires_key_values() {
        let node = Node::new(["Person"]).with_property("age", 3);
        assert!(matches!(
            MergeGroup::for_node(&node, None, &["name"]),
            Err(Error::InvalidProperty(_))
        ));
    }
}
