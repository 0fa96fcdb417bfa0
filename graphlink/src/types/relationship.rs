// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Relationship entity

use super::value::{write_map, PropertyMap, PropertyValue};
use super::{GraphId, Identity, Node};
use crate::error::{Error, Result};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A typed, directed edge between two nodes
#[derive(Debug, Clone)]
pub struct Relationship {
    identity: Identity,
    start: Node,
    end: Node,
    rel_type: String,
    properties: PropertyMap,
}

impl Relationship {
    /// Create an abstract relationship `(start)-[:rel_type]->(end)`
    pub fn new(start: &Node, rel_type: impl Into<String>, end: &Node) -> Self {
        Self {
            identity: Identity::fresh(),
            start: start.clone(),
            end: end.clone(),
            rel_type: rel_type.into(),
            properties: PropertyMap::new(),
        }
    }

    pub(crate) fn concrete(
        graph: GraphId,
        id: i64,
        start: Node,
        end: Node,
        rel_type: String,
        properties: PropertyMap,
    ) -> Self {
        Self {
            identity: Identity::Concrete { graph, id },
            start,
            end,
            rel_type,
            properties,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set_property(key, value);
        self
    }

    /// Set a property; setting `Null` removes the key
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        let key = key.into();
        match value.into() {
            PropertyValue::Null => {
                self.properties.remove(&key);
            }
            value => {
                self.properties.insert(key, value);
            }
        }
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn start_node(&self) -> &Node {
        &self.start
    }

    pub fn end_node(&self) -> &Node {
        &self.end
    }

    pub fn nodes(&self) -> [&Node; 2] {
        [&self.start, &self.end]
    }

    /// True if this relationship links `a` and `b`, in either direction
    pub fn connects(&self, a: &Node, b: &Node) -> bool {
        (self.start == *a && self.end == *b) || (self.start == *b && self.end == *a)
    }

    /// The endpoint opposite `node`, if `node` is an endpoint
    pub fn other_node(&self, node: &Node) -> Option<&Node> {
        if self.start == *node {
            Some(&self.end)
        } else if self.end == *node {
            Some(&self.start)
        } else {
            None
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn is_abstract(&self) -> bool {
        self.identity.is_abstract()
    }

    pub fn id(&self) -> Option<i64> {
        self.identity.id()
    }

    pub fn graph(&self) -> Option<&GraphId> {
        self.identity.graph()
    }

    /// Bind an abstract relationship to a server-assigned id.
    ///
    /// Both endpoints must already be concrete in `graph`.
    pub fn bind(self, graph: &GraphId, id: i64) -> Result<Relationship> {
        if let Identity::Concrete { id: existing, .. } = self.identity {
            return Err(Error::Bind(format!(
                "relationship is already bound to id {}",
                existing
            )));
        }
        for endpoint in self.nodes() {
            match endpoint.graph() {
                Some(g) if g == graph => {}
                Some(g) => {
                    return Err(Error::Bind(format!(
                        "endpoint {} belongs to graph {}, not {}",
                        endpoint, g, graph
                    )))
                }
                None => {
                    return Err(Error::Bind(format!(
                        "endpoint {} is abstract",
                        endpoint
                    )))
                }
            }
        }
        Ok(Relationship {
            identity: Identity::Concrete {
                graph: graph.clone(),
                id,
            },
            ..self
        })
    }

    /// Swap endpoints for their bound counterparts after a create
    pub(crate) fn replace_endpoints(self, start: Node, end: Node) -> Self {
        Relationship { start, end, ..self }
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Relationship {}

impl Hash for Relationship {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-[", self.start)?;
        if let Some(id) = self.id() {
            write!(f, "_{}", id)?;
        }
        write!(f, ":{}", self.rel_type)?;
        if !self.properties.is_empty() {
            write!(f, " ")?;
            write_map(f, &self.properties)?;
        }
        write!(f, "]->{}", self.end)
    }
}
