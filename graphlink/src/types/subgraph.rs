// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Subgraph: an unordered collection of nodes and relationships
//!
//! A subgraph is always closed: every relationship's endpoints are members of
//! its node set. Members are keyed by identity, so iteration order does not
//! depend on insertion order.

use super::path::check_single_graph;
use super::{Identity, Node, Path, Relationship};
use crate::error::Result;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subgraph {
    nodes: BTreeMap<Identity, Node>,
    relationships: BTreeMap<Identity, Relationship>,
}

impl Subgraph {
    /// Build a subgraph; relationship endpoints are added to the node set.
    ///
    /// Concrete entities from different graphs cannot be mixed.
    pub fn new<N, R>(nodes: N, relationships: R) -> Result<Subgraph>
    where
        N: IntoIterator<Item = Node>,
        R: IntoIterator<Item = Relationship>,
    {
        let mut subgraph = Subgraph::default();
        for node in nodes {
            subgraph.add_node(node);
        }
        for rel in relationships {
            subgraph.add_relationship(rel);
        }
        subgraph.check_graphs()?;
        Ok(subgraph)
    }

    pub fn empty() -> Subgraph {
        Subgraph::default()
    }

    pub(crate) fn add_node(&mut self, node: Node) {
        self.nodes.entry(node.identity().clone()).or_insert(node);
    }

    pub(crate) fn add_relationship(&mut self, rel: Relationship) {
        self.add_node(rel.start_node().clone());
        self.add_node(rel.end_node().clone());
        self.relationships
            .entry(rel.identity().clone())
            .or_insert(rel);
    }

    fn check_graphs(&self) -> Result<()> {
        check_single_graph(
            self.nodes
                .values()
                .filter_map(Node::graph)
                .chain(self.relationships.values().filter_map(Relationship::graph)),
        )
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    /// Number of nodes
    pub fn order(&self) -> usize {
        self.nodes.len()
    }

    /// Number of relationships
    pub fn size(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains_node(&self, node: &Node) -> bool {
        self.nodes.contains_key(node.identity())
    }

    pub fn contains_relationship(&self, rel: &Relationship) -> bool {
        self.relationships.contains_key(rel.identity())
    }

    /// Union of all node labels
    pub fn labels(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .flat_map(|n| n.labels().iter().cloned())
            .collect()
    }

    /// Union of all relationship types
    pub fn types(&self) -> BTreeSet<String> {
        self.relationships
            .values()
            .map(|r| r.rel_type().to_string())
            .collect()
    }

    /// Union of all property keys on nodes and relationships
    pub fn keys(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .flat_map(|n| n.properties().keys().cloned())
            .chain(
                self.relationships
                    .values()
                    .flat_map(|r| r.properties().keys().cloned()),
            )
            .collect()
    }

    /// Members of either subgraph; where both hold an entity, `self`'s copy is kept
    pub fn union(&self, other: &Subgraph) -> Result<Subgraph> {
        let mut out = self.clone();
        for node in other.nodes.values() {
            out.add_node(node.clone());
        }
        for rel in other.relationships.values() {
            out.add_relationship(rel.clone());
        }
        out.check_graphs()?;
        Ok(out)
    }

    /// Members of both subgraphs, plus endpoints of shared relationships
    pub fn intersection(&self, other: &Subgraph) -> Subgraph {
        let mut out = Subgraph::default();
        for (id, node) in &self.nodes {
            if other.nodes.contains_key(id) {
                out.add_node(node.clone());
            }
        }
        for (id, rel) in &self.relationships {
            if other.relationships.contains_key(id) {
                out.add_relationship(rel.clone());
            }
        }
        out
    }

    /// Members of `self` not in `other`, plus endpoints of remaining relationships
    pub fn difference(&self, other: &Subgraph) -> Subgraph {
        let mut out = Subgraph::default();
        for (id, node) in &self.nodes {
            if !other.nodes.contains_key(id) {
                out.add_node(node.clone());
            }
        }
        for (id, rel) in &self.relationships {
            if !other.relationships.contains_key(id) {
                out.add_relationship(rel.clone());
            }
        }
        out
    }

    /// Members of exactly one subgraph, plus endpoints of those relationships
    pub fn symmetric_difference(&self, other: &Subgraph) -> Result<Subgraph> {
        let mut out = self.difference(other);
        let rest = other.difference(self);
        for node in rest.nodes.into_values() {
            out.add_node(node);
        }
        for rel in rest.relationships.into_values() {
            out.add_relationship(rel);
        }
        out.check_graphs()?;
        Ok(out)
    }
}

impl From<Node> for Subgraph {
    fn from(node: Node) -> Self {
        let mut subgraph = Subgraph::default();
        subgraph.add_node(node);
        subgraph
    }
}

impl From<Relationship> for Subgraph {
    fn from(rel: Relationship) -> Self {
        let mut subgraph = Subgraph::default();
        subgraph.add_relationship(rel);
        subgraph
    }
}

impl From<Path> for Subgraph {
    fn from(path: Path) -> Self {
        let mut subgraph = Subgraph::default();
        for node in path.nodes() {
            subgraph.add_node(node.clone());
        }
        for rel in path.relationships() {
            subgraph.add_relationship(rel.clone());
        }
        subgraph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::GraphId;

    #[test]
    fn test_closure_from_relationships() {
        let a = Node::new(["Person"]).with_property("name", "Alice");
        let b = Node::new(["Person"]).with_property("age", 30);
        let r = Relationship::new(&a, "KNOWS", &b).with_property("since", 2001);
        let subgraph = Subgraph::new(Vec::new(), vec![r.clone()]).unwrap();

        assert_eq!(subgraph.order(), 2);
        assert_eq!(subgraph.size(), 1);
        assert!(subgraph.contains_node(&a));
        assert!(subgraph.contains_node(&b));
        assert!(subgraph.contains_relationship(&r));
        assert_eq!(subgraph.labels(), BTreeSet::from(["Person".to_string()]));
        assert_eq!(subgraph.types(), BTreeSet::from(["KNOWS".to_string()]));
        assert_eq!(subgraph.keys().len(), 3);
    }

    #[test]
    fn test_set_operations_keep_closure() {
        let a = Node::new(["A"]);
        let b = Node::new(["B"]);
        let c = Node::new(["C"]);
        let ab = Relationship::new(&a, "TO", &b);
        let bc = Relationship::new(&b, "TO", &c);
        let left = Subgraph::from(ab.clone());
        let right = Subgraph::from(bc.clone());

        let union = left.union(&right).unwrap();
        assert_eq!((union.order(), union.size()), (3, 2));

        let inter = left.intersection(&right);
        assert_eq!((inter.order(), inter.size()), (1, 0));
        assert!(inter.contains_node(&b));

        let diff = union.difference(&right);
        assert_eq!(diff.size(), 1);
        assert!(diff.contains_node(&a) && diff.contains_node(&b));

        let sym = left.symmetric_difference(&right).unwrap();
        assert_eq!((sym.order(), sym.size()), (3, 2));
    }

    #[test]
    fn test_mixing_graphs_is_a_join_error() {
        let g1 = GraphId::new("bolt://one:7687", None);
        let g2 = GraphId::new("bolt://two:7687", None);
        let a = Node::new(["A"]).bind(&g1, 1).unwrap();
        let b = Node::new(["B"]).bind(&g2, 1).unwrap();
        assert!(matches!(
            Subgraph::new(vec![a.clone(), b.clone()], Vec::new()),
            Err(Error::Join(_))
        ));
        assert!(Subgraph::from(a).union(&Subgraph::from(b)).is_err());
    }
}
