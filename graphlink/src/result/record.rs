// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Result records

use crate::error::{Error, Result};
use crate::types::{Subgraph, Value};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Ordered field names of a result, shared by all of its records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Keys {
    pub fn new(names: Vec<String>) -> Result<Self> {
        let mut index = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if index.insert(name.clone(), position).is_some() {
                return Err(Error::DuplicateKey(name.clone()));
            }
        }
        Ok(Self { names, index })
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// An immutable row of named values
///
/// Values can be looked up by position or by key; both views always agree.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    keys: Arc<Keys>,
    values: Vec<Value>,
}

impl Record {
    /// Build a record from ordered `(key, value)` pairs
    pub fn new<I, K, V>(pairs: I) -> Result<Record>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (names, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Ok(Record {
            keys: Arc::new(Keys::new(names)?),
            values,
        })
    }

    pub(crate) fn from_parts(keys: Arc<Keys>, values: Vec<Value>) -> Result<Record> {
        if keys.len() != values.len() {
            return Err(Error::Protocol(format!(
                "{} keys but {} values",
                keys.len(),
                values.len()
            )));
        }
        Ok(Record { keys, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> &[String] {
        self.keys.names()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.keys
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.keys.position(key).map(|i| &self.values[i])
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value for `key`, failing with `KeyNotFound`
    pub fn value(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    /// Value at `index`, failing with `IndexOutOfRange`
    pub fn value_at(&self, index: usize) -> Result<&Value> {
        self.values.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.values.len(),
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.position(key).is_some()
    }

    /// Key to value mapping
    pub fn data(&self) -> BTreeMap<String, Value> {
        self.items()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Plain JSON object view of the record
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.items()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }

    /// Deserialize the whole record into a struct keyed by field name
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use graphlink::Record;
    /// #[derive(serde::Deserialize)]
    /// struct Person { name: String, age: i64 }
    ///
    /// # fn demo(record: Record) -> graphlink::Result<()> {
    /// let person: Person = record.deserialize()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| Error::TypeConversion(format!("cannot deserialize record: {}", e)))
    }

    /// Deserialize a single field
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.value(key)?;
        serde_json::from_value(value.to_json()).map_err(|e| {
            Error::TypeConversion(format!(
                "cannot convert {} field '{}': {}",
                value.type_name(),
                key,
                e
            ))
        })
    }

    /// Union of every node and relationship reachable from this record's
    /// values, or `None` if it holds no graph entities
    pub fn subgraph(&self) -> Option<Subgraph> {
        let mut subgraph = Subgraph::empty();
        for value in &self.values {
            collect_entities(value, &mut subgraph);
        }
        if subgraph.is_empty() {
            None
        } else {
            Some(subgraph)
        }
    }
}

fn collect_entities(value: &Value, subgraph: &mut Subgraph) {
    match value {
        Value::Node(node) => subgraph.add_node(node.clone()),
        Value::Relationship(rel) => subgraph.add_relationship(rel.clone()),
        Value::Path(path) => {
            for node in path.nodes() {
                subgraph.add_node(node.clone());
            }
            for rel in path.relationships() {
                subgraph.add_relationship(rel.clone());
            }
        }
        Value::List(items) => {
            for item in items {
                collect_entities(item, subgraph);
            }
        }
        Value::Map(map) => {
            for item in map.values() {
                collect_entities(item, subgraph);
            }
        }
        _ => {}
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (key, value)) in self.items().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Node, Relationship};

    #[test]
    fn test_positional_and_keyed_access_agree() {
        let pairs = vec![("name", Value::from("Alice")), ("age", Value::from(33))];
        let a = Record::new(pairs.clone()).unwrap();
        let b = Record::new(pairs).unwrap();
        assert_eq!(a, b);
        for (i, key) in a.keys().iter().enumerate() {
            assert_eq!(a.get(key), a.get_index(i));
            assert_eq!(a.get(key), b.get_index(i));
        }
        assert_eq!(a.to_string(), "(name: 'Alice', age: 33)");
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let err = Record::new(vec![("x", 1), ("x", 2)]).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey(k) if k == "x"));
    }

    #[test]
    fn test_lookup_errors() {
        let record = Record::new(vec![("x", 1)]).unwrap();
        assert!(matches!(record.value("y"), Err(Error::KeyNotFound(_))));
        assert!(matches!(
            record.value_at(3),
            Err(Error::IndexOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn test_typed_access() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Row {
            name: String,
            age: i64,
        }
        let record = Record::new(vec![("name", Value::from("Bob")), ("age", Value::from(40))])
            .unwrap();
        let row: Row = record.deserialize().unwrap();
        assert_eq!(row, Row { name: "Bob".into(), age: 40 });
        assert_eq!(record.get_as::<i64>("age").unwrap(), 40);
        assert!(matches!(
            record.get_as::<i64>("name"),
            Err(Error::TypeConversion(_))
        ));
    }

    #[test]
    fn test_subgraph() {
        let a = Node::new(["A"]);
        let b = Node::new(["B"]);
        let r = Relationship::new(&a, "TO", &b);
        let record = Record::new(vec![
            ("rels", Value::List(vec![Value::Relationship(r.clone())])),
            ("n", Value::Integer(1)),
        ])
        .unwrap();
        let subgraph = record.subgraph().unwrap();
        assert_eq!(subgraph.order(), 2);
        assert_eq!(subgraph.size(), 1);

        let plain = Record::new(vec![("x", 1)]).unwrap();
        assert!(plain.subgraph().is_none());
    }
}
