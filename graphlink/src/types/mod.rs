// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph entity model
//!
//! Nodes and relationships start out *abstract* (created locally, unknown to
//! the server) and become *concrete* once bound to a server-assigned id within
//! a particular graph. Equality and hashing follow identity only: two concrete
//! entities are equal when they come from the same graph with the same id, and
//! an abstract entity is only ever equal to itself (or a clone of itself).

pub mod node;
pub mod path;
pub mod relationship;
pub mod subgraph;
pub mod value;

pub use node::Node;
pub use path::{Path, Step};
pub use relationship::Relationship;
pub use subgraph::Subgraph;
pub use value::{PropertyMap, PropertyValue, Value};

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Identifies the graph a concrete entity was materialized from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(Arc<str>);

impl GraphId {
    /// Build from a normalized service URI and optional database name
    pub fn new(uri: &str, database: Option<&str>) -> Self {
        match database {
            Some(db) => GraphId(Arc::from(format!("{}/{}", uri, db))),
            None => GraphId(Arc::from(uri)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entity identity: a local token until the server assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    Abstract(Uuid),
    Concrete { graph: GraphId, id: i64 },
}

impl Identity {
    pub(crate) fn fresh() -> Self {
        Identity::Abstract(Uuid::new_v4())
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self, Identity::Abstract(_))
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Identity::Concrete { id, .. } => Some(*id),
            Identity::Abstract(_) => None,
        }
    }

    pub fn graph(&self) -> Option<&GraphId> {
        match self {
            Identity::Concrete { graph, .. } => Some(graph),
            Identity::Abstract(_) => None,
        }
    }
}
