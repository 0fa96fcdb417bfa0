// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Path: an alternating walk of nodes and relationships

use super::{GraphId, Node, Relationship};
use crate::error::{Error, Result};
use std::fmt;

/// One step of a walk along a [`Path`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    Node(&'a Node),
    Relationship(&'a Relationship),
}

/// A connected sequence `n0, r0, n1, r1, ..., nk`
///
/// Relationship `r[i]` links `n[i]` and `n[i+1]` in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    nodes: Vec<Node>,
    relationships: Vec<Relationship>,
}

impl Path {
    pub fn new(nodes: Vec<Node>, relationships: Vec<Relationship>) -> Result<Path> {
        if nodes.is_empty() {
            return Err(Error::Join("a path needs at least one node".into()));
        }
        if nodes.len() != relationships.len() + 1 {
            return Err(Error::Join(format!(
                "{} nodes cannot be joined by {} relationships",
                nodes.len(),
                relationships.len()
            )));
        }
        for (i, rel) in relationships.iter().enumerate() {
            if !rel.connects(&nodes[i], &nodes[i + 1]) {
                return Err(Error::Join(format!(
                    "relationship {} does not connect {} and {}",
                    rel,
                    nodes[i],
                    nodes[i + 1]
                )));
            }
        }
        check_single_graph(
            nodes
                .iter()
                .filter_map(Node::graph)
                .chain(relationships.iter().filter_map(Relationship::graph)),
        )?;
        Ok(Path {
            nodes,
            relationships,
        })
    }

    /// A zero-length path consisting of one node
    pub fn from_node(node: Node) -> Path {
        Path {
            nodes: vec![node],
            relationships: Vec::new(),
        }
    }

    pub fn from_relationship(rel: Relationship) -> Path {
        Path {
            nodes: vec![rel.start_node().clone(), rel.end_node().clone()],
            relationships: vec![rel],
        }
    }

    pub fn start_node(&self) -> &Node {
        &self.nodes[0]
    }

    pub fn end_node(&self) -> &Node {
        &self.nodes[self.nodes.len() - 1]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Number of relationships traversed
    pub fn length(&self) -> usize {
        self.relationships.len()
    }

    pub fn walk(&self) -> impl Iterator<Item = Step<'_>> + '_ {
        let rels = self.relationships.iter().map(Step::Relationship);
        let mut nodes = self.nodes.iter().map(Step::Node);
        let first = nodes.next();
        first.into_iter().chain(
            rels.zip(nodes)
                .flat_map(|(rel, node)| [rel, node].into_iter()),
        )
    }

    pub fn reversed(&self) -> Path {
        Path {
            nodes: self.nodes.iter().rev().cloned().collect(),
            relationships: self.relationships.iter().rev().cloned().collect(),
        }
    }

    /// Concatenate `other` onto the end of this path.
    ///
    /// `other` may be walked in either direction; its first (or last) node
    /// must be this path's end node.
    pub fn join(&self, other: &Path) -> Result<Path> {
        let other = if other.start_node() == self.end_node() {
            other.clone()
        } else if other.end_node() == self.end_node() {
            other.reversed()
        } else {
            return Err(Error::Join(format!(
                "path ending at {} cannot be joined to a path from {} to {}",
                self.end_node(),
                other.start_node(),
                other.end_node()
            )));
        };
        let mut nodes = self.nodes.clone();
        nodes.extend(other.nodes.into_iter().skip(1));
        let mut relationships = self.relationships.clone();
        relationships.extend(other.relationships);
        Path::new(nodes, relationships)
    }
}

pub(crate) fn check_single_graph<'a>(graphs: impl Iterator<Item = &'a GraphId>) -> Result<()> {
    let mut seen: Option<&GraphId> = None;
    for graph in graphs {
        match seen {
            Some(first) if first != graph => {
                return Err(Error::Join(format!(
                    "entities from {} and {} cannot be combined",
                    first, graph
                )))
            }
            Some(_) => {}
            None => seen = Some(graph),
        }
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nodes[0])?;
        for (i, rel) in self.relationships.iter().enumerate() {
            let next = &self.nodes[i + 1];
            let label = match rel.id() {
                Some(id) => format!("_{}:{}", id, rel.rel_type()),
                None => format!(":{}", rel.rel_type()),
            };
            if rel.end_node() == next {
                write!(f, "-[{}]->{}", label, next)?;
            } else {
                write!(f, "<-[{}]-{}", label, next)?;
            }
        }
        Ok(())
    }
}
