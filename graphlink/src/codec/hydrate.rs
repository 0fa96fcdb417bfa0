// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Row hydration
//!
//! Turns wire rows into [`Record`]s. Every entity produced is concrete in the
//! hydrator's graph. Within one row, a node that appears in full anywhere
//! (as a column, a path member, or a relationship endpoint) is the node every
//! id-only reference in that row resolves to.

use super::{FLOAT_TAG, MAP_TAG, NODE_TAG, PATH_TAG, RELATIONSHIP_TAG};
use crate::error::{Error, Result};
use crate::result::{Keys, Record};
use crate::types::{GraphId, Node, Path, PropertyMap, PropertyValue, Relationship, Value};
use serde_json::{Map, Value as Json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

type NodeIndex = HashMap<i64, Node>;

/// Materializes records for one graph
#[derive(Debug, Clone)]
pub struct Hydrator {
    graph: GraphId,
}

impl Hydrator {
    pub fn new(graph: GraphId) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &GraphId {
        &self.graph
    }

    pub fn hydrate_row(&self, keys: &Arc<Keys>, row: Vec<Json>) -> Result<Record> {
        if row.len() != keys.len() {
            return Err(Error::Protocol(format!(
                "row has {} values but the result has {} fields",
                row.len(),
                keys.len()
            )));
        }
        let mut nodes = NodeIndex::new();
        for value in &row {
            self.collect_nodes(value, &mut nodes)?;
        }
        let values = row
            .iter()
            .map(|value| self.decode(value, &nodes))
            .collect::<Result<Vec<_>>>()?;
        Record::from_parts(keys.clone(), values)
    }

    /// Decode one standalone value
    pub fn hydrate_value(&self, value: &Json) -> Result<Value> {
        let mut nodes = NodeIndex::new();
        self.collect_nodes(value, &mut nodes)?;
        self.decode(value, &nodes)
    }

    fn collect_nodes(&self, value: &Json, nodes: &mut NodeIndex) -> Result<()> {
        match value {
            Json::Array(items) => {
                for item in items {
                    self.collect_nodes(item, nodes)?;
                }
            }
            Json::Object(object) => match single_tag(object) {
                Some((NODE_TAG, body)) => {
                    let node = self.node(body)?;
                    if let Some(id) = node.id() {
                        nodes.entry(id).or_insert(node);
                    }
                }
                Some((MAP_TAG, body)) => {
                    if let Json::Object(inner) = body {
                        for item in inner.values() {
                            self.collect_nodes(item, nodes)?;
                        }
                    }
                }
                Some((FLOAT_TAG, _)) => {}
                Some((_, body)) => self.collect_nodes(body, nodes)?,
                None => {
                    for item in object.values() {
                        self.collect_nodes(item, nodes)?;
                    }
                }
            },
            _ => {}
        }
        Ok(())
    }

    fn decode(&self, value: &Json, nodes: &NodeIndex) -> Result<Value> {
        Ok(match value {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Boolean(*b),
            Json::Number(n) => decode_number(n)?,
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.decode(item, nodes))
                    .collect::<Result<_>>()?,
            ),
            Json::Object(object) => match single_tag(object) {
                Some((NODE_TAG, body)) => Value::Node(self.resolve_node(body, nodes)?),
                Some((RELATIONSHIP_TAG, body)) => {
                    Value::Relationship(self.relationship(body, nodes)?)
                }
                Some((PATH_TAG, body)) => Value::Path(self.path(body, nodes)?),
                Some((MAP_TAG, Json::Object(inner))) => self.decode_map(inner, nodes)?,
                Some((FLOAT_TAG, Json::String(text))) => Value::Float(decode_float(text)?),
                Some((tag, _)) => {
                    return Err(Error::Protocol(format!("unsupported wire tag '{}'", tag)))
                }
                None => self.decode_map(object, nodes)?,
            },
        })
    }

    fn decode_map(&self, object: &Map<String, Json>, nodes: &NodeIndex) -> Result<Value> {
        Ok(Value::Map(
            object
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.decode(v, nodes)?)))
                .collect::<Result<BTreeMap<_, _>>>()?,
        ))
    }

    fn node(&self, body: &Json) -> Result<Node> {
        let object = as_object(body, NODE_TAG)?;
        let id = required_id(object, "id", NODE_TAG)?;
        let labels = match object.get("labels") {
            Some(Json::Array(items)) => items
                .iter()
                .map(|label| {
                    label.as_str().map(str::to_string).ok_or_else(|| {
                        Error::Protocol(format!("node {} has a non-string label", id))
                    })
                })
                .collect::<Result<BTreeSet<_>>>()?,
            None | Some(Json::Null) => BTreeSet::new(),
            Some(_) => return Err(Error::Protocol(format!("node {} labels must be a list", id))),
        };
        let properties = self.properties(object.get("properties"))?;
        Ok(Node::concrete(self.graph.clone(), id, labels, properties))
    }

    fn resolve_node(&self, body: &Json, nodes: &NodeIndex) -> Result<Node> {
        let id = required_id(as_object(body, NODE_TAG)?, "id", NODE_TAG)?;
        match nodes.get(&id) {
            Some(node) => Ok(node.clone()),
            None => self.node(body),
        }
    }

    /// Endpoint given as an id or as a full node
    fn endpoint(&self, value: Option<&Json>, nodes: &NodeIndex) -> Result<Node> {
        match value {
            Some(Json::Number(n)) => {
                let id = n
                    .as_i64()
                    .ok_or_else(|| Error::Protocol(format!("invalid endpoint id {}", n)))?;
                Ok(nodes.get(&id).cloned().unwrap_or_else(|| {
                    Node::concrete(self.graph.clone(), id, BTreeSet::new(), PropertyMap::new())
                }))
            }
            Some(Json::Object(object)) => match single_tag(object) {
                Some((NODE_TAG, body)) => self.resolve_node(body, nodes),
                _ => Err(Error::Protocol("relationship endpoint must be a node".into())),
            },
            _ => Err(Error::Protocol("relationship endpoint missing".into())),
        }
    }

    fn relationship(&self, body: &Json, nodes: &NodeIndex) -> Result<Relationship> {
        let object = as_object(body, RELATIONSHIP_TAG)?;
        let id = required_id(object, "id", RELATIONSHIP_TAG)?;
        let rel_type = object
            .get("type")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::Protocol(format!("relationship {} has no type", id)))?
            .to_string();
        let start = self.endpoint(object.get("start"), nodes)?;
        let end = self.endpoint(object.get("end"), nodes)?;
        let properties = self.properties(object.get("properties"))?;
        Ok(Relationship::concrete(
            self.graph.clone(),
            id,
            start,
            end,
            rel_type,
            properties,
        ))
    }

    fn path(&self, body: &Json, nodes: &NodeIndex) -> Result<Path> {
        let object = as_object(body, PATH_TAG)?;
        let path_nodes = match object.get("nodes") {
            Some(Json::Array(items)) => items
                .iter()
                .map(|item| self.endpoint(Some(item), nodes))
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(Error::Protocol("path without nodes".into())),
        };
        let path_rels = match object.get("relationships") {
            Some(Json::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Json::Object(o) => match single_tag(o) {
                        Some((RELATIONSHIP_TAG, body)) => self.relationship(body, nodes),
                        _ => Err(Error::Protocol("path member is not a relationship".into())),
                    },
                    _ => Err(Error::Protocol("path member is not a relationship".into())),
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
            Some(_) => return Err(Error::Protocol("path relationships must be a list".into())),
        };
        Path::new(path_nodes, path_rels)
            .map_err(|e| Error::Protocol(format!("malformed path: {}", e)))
    }

    fn properties(&self, value: Option<&Json>) -> Result<PropertyMap> {
        match value {
            None | Some(Json::Null) => Ok(PropertyMap::new()),
            Some(Json::Object(object)) => {
                let empty = NodeIndex::new();
                object
                    .iter()
                    .map(|(k, v)| {
                        let value = PropertyValue::try_from(self.decode(v, &empty)?)?;
                        Ok((k.clone(), value))
                    })
                    .collect()
            }
            Some(_) => Err(Error::Protocol("properties must be an object".into())),
        }
    }
}

fn single_tag(object: &Map<String, Json>) -> Option<(&str, &Json)> {
    if object.len() != 1 {
        return None;
    }
    object
        .iter()
        .next()
        .filter(|(key, _)| key.starts_with('$'))
        .map(|(key, value)| (key.as_str(), value))
}

fn as_object<'a>(body: &'a Json, tag: &str) -> Result<&'a Map<String, Json>> {
    body.as_object()
        .ok_or_else(|| Error::Protocol(format!("{} payload must be an object", tag)))
}

fn required_id(object: &Map<String, Json>, field: &str, tag: &str) -> Result<i64> {
    object
        .get(field)
        .and_then(Json::as_i64)
        .ok_or_else(|| Error::Protocol(format!("{} payload has no integer '{}'", tag, field)))
}

fn decode_number(n: &serde_json::Number) -> Result<Value> {
    if let Some(i) = n.as_i64() {
        Ok(Value::Integer(i))
    } else if n.is_u64() {
        Err(Error::Protocol(format!("integer {} exceeds 64-bit range", n)))
    } else {
        n.as_f64()
            .map(Value::Float)
            .ok_or_else(|| Error::Protocol(format!("unreadable number {}", n)))
    }
}

fn decode_float(text: &str) -> Result<f64> {
    match text {
        "NaN" => Ok(f64::NAN),
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        other => Err(Error::Protocol(format!("unknown float literal '{}'", other))),
    }
}
