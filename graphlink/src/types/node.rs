// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Node entity

use super::value::{write_map, PropertyMap, PropertyValue};
use super::{GraphId, Identity};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A labelled vertex with properties
#[derive(Debug, Clone)]
pub struct Node {
    identity: Identity,
    labels: BTreeSet<String>,
    properties: PropertyMap,
}

impl Node {
    /// Create an abstract node with the given labels
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity: Identity::fresh(),
            labels: labels.into_iter().map(Into::into).collect(),
            properties: PropertyMap::new(),
        }
    }

    /// Create an abstract node with no labels
    pub fn unlabelled() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub(crate) fn concrete(
        graph: GraphId,
        id: i64,
        labels: BTreeSet<String>,
        properties: PropertyMap,
    ) -> Self {
        Self {
            identity: Identity::Concrete { graph, id },
            labels,
            properties,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
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

    pub fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn add_label(&mut self, label: impl Into<String>) {
        self.labels.insert(label.into());
    }

    pub fn remove_label(&mut self, label: &str) -> bool {
        self.labels.remove(label)
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

    /// Bind an abstract node to a server-assigned id.
    ///
    /// Binding is one-way and happens once; a concrete node cannot be rebound.
    pub fn bind(self, graph: &GraphId, id: i64) -> Result<Node> {
        if let Identity::Concrete { id: existing, .. } = self.identity {
            return Err(Error::Bind(format!(
                "node is already bound to id {}",
                existing
            )));
        }
        Ok(Node {
            identity: Identity::Concrete {
                graph: graph.clone(),
                id,
            },
            labels: self.labels,
            properties: self.properties,
        })
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        if let Some(id) = self.id() {
            write!(f, "_{}", id)?;
        }
        for label in &self.labels {
            write!(f, ":{}", label)?;
        }
        if !self.properties.is_empty() {
            write!(f, " ")?;
            write_map(f, &self.properties)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> GraphId {
        GraphId::new("bolt://localhost:7687", None)
    }

    #[test]
    fn test_bind_once() {
        let node = Node::new(["Person"]).with_property("name", "Alice");
        assert!(node.is_abstract());
        assert_eq!(node.id(), None);

        let bound = node.bind(&graph(), 42).unwrap();
        assert!(!bound.is_abstract());
        assert_eq!(bound.id(), Some(42));
        assert_eq!(bound.get("name"), Some(&PropertyValue::from("Alice")));

        let err = bound.clone().bind(&graph(), 43).unwrap_err();
        assert!(matches!(err, Error::Bind(_)));
        assert_eq!(bound.id(), Some(42));
    }

    #[test]
    fn test_identity_equality() {
        let a = Node::new(["Person"]);
        let b = Node::new(["Person"]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let x = Node::concrete(graph(), 1, BTreeSet::new(), PropertyMap::new());
        let y = Node::concrete(graph(), 1, ["Other".to_string()].into(), PropertyMap::new());
        assert_eq!(x, y);

        let elsewhere = Node::concrete(
            GraphId::new("bolt://elsewhere:7687", None),
            1,
            BTreeSet::new(),
            PropertyMap::new(),
        );
        assert_ne!(x, elsewhere);
    }

    #[test]
    fn test_null_removes_property() {
        let mut node = Node::new(["Person"]).with_property("age", 33);
        node.set_property("age", PropertyValue::Null);
        assert!(node.get("age").is_none());
    }

    #[test]
    fn test_display() {
        let node = Node::new(["Person"]).with_property("name", "Alice");
        assert_eq!(node.to_string(), "(:Person {name: 'Alice'})");
    }
}
