// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Parameter encoding

use super::{FLOAT_TAG, MAP_TAG, NODE_TAG, PATH_TAG, RELATIONSHIP_TAG};
use crate::error::{Error, Result};
use crate::transport::WireMap;
use crate::types::{Node, PropertyMap, Relationship, Value};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;

/// Encode query parameters
pub fn encode_parameters(parameters: &BTreeMap<String, Value>) -> Result<WireMap> {
    parameters
        .iter()
        .map(|(key, value)| Ok((key.clone(), encode_value(value)?)))
        .collect()
}

/// Encode a single value; abstract entities cannot be encoded
pub fn encode_value(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        Value::Float(f) => encode_float(*f),
        Value::String(s) => Json::String(s.clone()),
        Value::List(items) => Json::Array(items.iter().map(encode_value).collect::<Result<_>>()?),
        Value::Map(map) => {
            let object: serde_json::Map<String, Json> = map
                .iter()
                .map(|(k, v)| Ok((k.clone(), encode_value(v)?)))
                .collect::<Result<_>>()?;
            wrap_map(object)
        }
        Value::Node(node) => json!({ NODE_TAG: encode_node(node)? }),
        Value::Relationship(rel) => json!({ RELATIONSHIP_TAG: encode_relationship(rel)? }),
        Value::Path(path) => json!({
            PATH_TAG: {
                "nodes": path.nodes().iter().map(encode_node).collect::<Result<Vec<_>>>()?,
                "relationships": path
                    .relationships()
                    .iter()
                    .map(encode_relationship)
                    .collect::<Result<Vec<_>>>()?,
            }
        }),
    })
}

fn encode_float(f: f64) -> Json {
    match serde_json::Number::from_f64(f) {
        Some(n) => Json::Number(n),
        None => {
            let text = if f.is_nan() {
                "NaN"
            } else if f > 0.0 {
                "Infinity"
            } else {
                "-Infinity"
            };
            json!({ FLOAT_TAG: text })
        }
    }
}

fn wrap_map(object: serde_json::Map<String, Json>) -> Json {
    let ambiguous = object.len() == 1 && object.keys().all(|k| k.starts_with('$'));
    if ambiguous {
        json!({ MAP_TAG: Json::Object(object) })
    } else {
        Json::Object(object)
    }
}

fn encode_properties(properties: &PropertyMap) -> Result<Json> {
    let object: serde_json::Map<String, Json> = properties
        .iter()
        .map(|(k, v)| Ok((k.clone(), encode_value(&Value::from(v.clone()))?)))
        .collect::<Result<_>>()?;
    Ok(Json::Object(object))
}

fn concrete_id(id: Option<i64>, what: &dyn std::fmt::Display) -> Result<i64> {
    id.ok_or_else(|| Error::Bind(format!("{} is abstract and cannot be sent as a value", what)))
}

fn encode_node(node: &Node) -> Result<Json> {
    Ok(json!({
        "id": concrete_id(node.id(), node)?,
        "labels": node.labels().iter().collect::<Vec<_>>(),
        "properties": encode_properties(node.properties())?,
    }))
}

fn encode_relationship(rel: &Relationship) -> Result<Json> {
    Ok(json!({
        "id": concrete_id(rel.id(), rel)?,
        "type": rel.rel_type(),
        "start": concrete_id(rel.start_node().id(), rel.start_node())?,
        "end": concrete_id(rel.end_node().id(), rel.end_node())?,
        "properties": encode_properties(rel.properties())?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GraphId;

    #[test]
    fn test_scalars_and_ambiguous_maps() {
        let mut params = BTreeMap::new();
        params.insert("n".to_string(), Value::Integer(3));
        params.insert("f".to_string(), Value::Float(1.5));
        params.insert("nan".to_string(), Value::Float(f64::NAN));
        let mut tricky = BTreeMap::new();
        tricky.insert("$node".to_string(), Value::Integer(1));
        params.insert("m".to_string(), Value::Map(tricky));

        let wire = encode_parameters(&params).unwrap();
        assert_eq!(wire["n"], json!(3));
        assert_eq!(wire["f"], json!(1.5));
        assert_eq!(wire["nan"], json!({"$float": "NaN"}));
        assert_eq!(wire["m"], json!({"$map": {"$node": 1}}));
    }

    #[test]
    fn test_abstract_entities_rejected() {
        let node = Node::new(["Person"]);
        let err = encode_value(&Value::Node(node.clone())).unwrap_err();
        assert!(matches!(err, Error::Bind(_)));

        let graph = GraphId::new("bolt://localhost:7687", None);
        let bound = node.bind(&graph, 5).unwrap();
        let wire = encode_value(&Value::Node(bound)).unwrap();
        assert_eq!(wire["$node"]["id"], json!(5));
        assert_eq!(wire["$node"]["labels"], json!(["Person"]));
    }
}
