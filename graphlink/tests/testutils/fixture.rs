//! Graph fixture backed by an in-process server
//!
//! The server keeps a tiny entity store so that the statements generated by
//! the entity operations (`create`, `merge`, `pull`, `push`, `delete`,
//! `separate`, `exists`, `degree` and lookups) behave like a real database
//! would. Changes apply as soon as a statement runs; the store does not model
//! transaction isolation.

#![allow(dead_code)]

use graphlink::transport::{TransportError, WireMap};
use graphlink::{blocking, Config, Graph, MemoryServer, Reply, RetryPolicy};
use parking_lot::Mutex;
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_URI: &str = "bolt://localhost:7687";

#[derive(Debug, Clone)]
pub struct StoredNode {
    pub labels: Vec<String>,
    pub properties: Json,
}

#[derive(Debug, Clone)]
pub struct StoredRelationship {
    pub rel_type: String,
    pub start: i64,
    pub end: i64,
    pub properties: Json,
}

#[derive(Debug, Default)]
pub struct Store {
    pub nodes: BTreeMap<i64, StoredNode>,
    pub relationships: BTreeMap<i64, StoredRelationship>,
}

/// A graph handle wired to a scripted server
pub struct GraphFixture {
    pub server: MemoryServer,
    pub graph: Graph,
    pub store: Arc<Mutex<Store>>,
}

impl GraphFixture {
    pub fn new() -> Self {
        Self::with_config(fast_retry_config())
    }

    pub fn with_config(config: Config) -> Self {
        init_logging();
        let server = MemoryServer::new();
        let store = Arc::new(Mutex::new(Store::default()));
        install_entity_store(&server, &store);
        server.reply("RETURN 1 AS x", Reply::new(["x"]).row(vec![json!(1)]));
        let graph = Graph::with_config(TEST_URI, server.connector(), config)
            .expect("fixture graph should configure");
        GraphFixture {
            server,
            graph,
            store,
        }
    }

    pub fn blocking(&self) -> blocking::Graph {
        blocking::Graph::from_async(self.graph.clone()).expect("runtime should start")
    }

    pub fn node_count(&self) -> usize {
        self.store.lock().nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.store.lock().relationships.len()
    }

    /// Reply to `statement` with one integer column `x` holding `values`
    pub fn reply_integers(&self, statement: &str, values: &[i64]) {
        let mut reply = Reply::new(["x"]);
        for value in values {
            reply = reply.row(vec![json!(value)]);
        }
        self.server.reply(statement, reply);
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Default config with millisecond retry delays
pub fn fast_retry_config() -> Config {
    Config::default().with_retry(RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(1),
        multiplier: 1.0,
        jitter: 0.0,
        max_delay: Duration::from_millis(5),
    })
}

pub fn node_json(id: i64, labels: &[&str], properties: Json) -> Json {
    json!({ "$node": { "id": id, "labels": labels, "properties": properties } })
}

pub fn relationship_json(id: i64, rel_type: &str, start: Json, end: Json, properties: Json) -> Json {
    json!({
        "$relationship": {
            "id": id,
            "type": rel_type,
            "start": start,
            "end": end,
            "properties": properties,
        }
    })
}

pub fn transient(code: &str) -> TransportError {
    TransportError::Failure {
        code: format!("Neo.TransientError.{}", code),
        message: "try again".into(),
    }
}

fn ids(parameters: &WireMap) -> Vec<i64> {
    parameters
        .get("x")
        .and_then(Json::as_array)
        .map(|items| items.iter().filter_map(Json::as_i64).collect())
        .unwrap_or_default()
}

fn between<'s>(text: &'s str, open: &str, close: &str) -> &'s str {
    text.split_once(open)
        .and_then(|(_, rest)| rest.split_once(close))
        .map(|(inner, _)| inner)
        .unwrap_or("")
}

fn labels_of(statement: &str) -> Vec<String> {
    between(statement, "CREATE (_", ")")
        .split(':')
        .filter(|label| !label.is_empty())
        .map(|label| label.trim_matches('`').to_string())
        .collect()
}

fn id_reply(ids: Vec<i64>) -> Reply {
    let mut reply = Reply::new(["id(_)"]);
    for id in ids {
        reply = reply.row(vec![json!(id)]);
    }
    reply
}

fn count_reply(count: usize) -> Reply {
    Reply::new(["count(_)"]).row(vec![json!(count)])
}

fn merge_properties(target: &mut Json, update: Option<&Json>) {
    let Some(Json::Object(update)) = update else { return };
    if !target.is_object() {
        *target = json!({});
    }
    if let Json::Object(target) = target {
        for (key, value) in update {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn label_list(fragment: &str) -> Vec<String> {
    fragment
        .split(':')
        .map(|label| label.trim().trim_matches('`'))
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

/// Label and key names of `MERGE (_:Label {key: data[0][0], ...})`
fn merge_pattern(statement: &str) -> (String, Vec<String>) {
    let pattern = between(statement, "MERGE (_", ")");
    let (label, keys) = pattern.split_once(" {").unwrap_or((pattern, ""));
    let keys = keys
        .trim_end_matches('}')
        .split(", ")
        .filter_map(|pair| pair.split_once(": "))
        .map(|(key, _)| key.trim_matches('`').to_string())
        .collect();
    (label.trim_start_matches(':').trim_matches('`').to_string(), keys)
}

/// Labels removed and added by `... SET _ = $y [REMOVE _:A] [SET _:B]`
fn push_labels(statement: &str) -> (Vec<String>, Vec<String>) {
    let tail = statement.split_once("SET _ = $y").map(|(_, t)| t).unwrap_or("");
    let (removed, added) = match tail.split_once(" SET _") {
        Some((removed, added)) => (removed, added),
        None => (tail, ""),
    };
    (
        label_list(removed.trim().trim_start_matches("REMOVE _")),
        label_list(added),
    )
}

fn install_entity_store(server: &MemoryServer, store: &Arc<Mutex<Store>>) {
    let s = store.clone();
    server.on("CREATE (n) RETURN n", move |ctx, _| {
        let id = ctx.allocate_id();
        s.lock().nodes.insert(
            id,
            StoredNode {
                labels: Vec::new(),
                properties: json!({}),
            },
        );
        Ok(Reply::new(["n"])
            .row(vec![node_json(id, &[], json!({}))])
            .with_stats(json!({ "nodes-created": 1 })))
    });

    let s = store.clone();
    server.on_prefix(
        "UNWIND $x AS properties CREATE",
        move |ctx, params| {
            let labels = labels_of(ctx.statement());
            let rows = params.get("x").and_then(Json::as_array).cloned().unwrap_or_default();
            let mut created = Vec::new();
            for properties in rows {
                let id = ctx.allocate_id();
                s.lock().nodes.insert(
                    id,
                    StoredNode {
                        labels: labels.clone(),
                        properties,
                    },
                );
                created.push(id);
            }
            let count = created.len();
            Ok(id_reply(created).with_stats(json!({ "nodes-created": count })))
        },
    );

    let s = store.clone();
    server.on_prefix(
        "UNWIND $x AS data MATCH (a)",
        move |ctx, params| {
            let rel_type = between(ctx.statement(), "[_:", "]").trim_matches('`').to_string();
            let merging = ctx.statement().contains("MERGE (a)");
            let rows = params.get("x").and_then(Json::as_array).cloned().unwrap_or_default();
            let mut created = Vec::new();
            for row in rows {
                let start = row.get(0).and_then(Json::as_i64).unwrap_or(-1);
                let end = row.get(1).and_then(Json::as_i64).unwrap_or(-1);
                let mut store = s.lock();
                if !store.nodes.contains_key(&start) || !store.nodes.contains_key(&end) {
                    continue;
                }
                if merging {
                    let existing = store.relationships.iter_mut().find(|(_, rel)| {
                        rel.start == start && rel.end == end && rel.rel_type == rel_type
                    });
                    if let Some((id, rel)) = existing {
                        merge_properties(&mut rel.properties, row.get(2));
                        created.push(*id);
                        continue;
                    }
                }
                let id = ctx.allocate_id();
                store.relationships.insert(
                    id,
                    StoredRelationship {
                        rel_type: rel_type.clone(),
                        start,
                        end,
                        properties: row.get(2).cloned().unwrap_or(Json::Null),
                    },
                );
                created.push(id);
            }
            Ok(id_reply(created))
        },
    );

    let s = store.clone();
    server.on("MATCH (_) WHERE id(_) IN $x RETURN count(_)", move |_, params| {
        let store = s.lock();
        Ok(count_reply(
            ids(params).iter().filter(|id| store.nodes.contains_key(id)).count(),
        ))
    });

    let s = store.clone();
    server.on(
        "MATCH ()-[_]->() WHERE id(_) IN $x RETURN count(_)",
        move |_, params| {
            let store = s.lock();
            Ok(count_reply(
                ids(params)
                    .iter()
                    .filter(|id| store.relationships.contains_key(id))
                    .count(),
            ))
        },
    );

    let s = store.clone();
    server.on("MATCH ()-[_]->() WHERE id(_) IN $x DELETE _", move |_, params| {
        let mut store = s.lock();
        let mut deleted = 0;
        for id in ids(params) {
            if store.relationships.remove(&id).is_some() {
                deleted += 1;
            }
        }
        Ok(Reply::empty().with_stats(json!({ "relationships-deleted": deleted })))
    });

    let s = store.clone();
    server.on("MATCH (_) WHERE id(_) IN $x DETACH DELETE _", move |_, params| {
        let mut store = s.lock();
        let doomed = ids(params);
        store
            .relationships
            .retain(|_, rel| !doomed.contains(&rel.start) && !doomed.contains(&rel.end));
        let mut deleted = 0;
        for id in doomed {
            if store.nodes.remove(&id).is_some() {
                deleted += 1;
            }
        }
        Ok(Reply::empty().with_stats(json!({ "nodes-deleted": deleted })))
    });

    let s = store.clone();
    server.on("MATCH (_) DETACH DELETE _", move |_, _| {
        let mut store = s.lock();
        let deleted = store.nodes.len();
        store.nodes.clear();
        store.relationships.clear();
        Ok(Reply::empty().with_stats(json!({ "nodes-deleted": deleted })))
    });

    let s = store.clone();
    server.on("MATCH (_) WHERE id(_) = $x RETURN _", move |_, params| {
        let store = s.lock();
        let id = params.get("x").and_then(Json::as_i64).unwrap_or(-1);
        let mut reply = Reply::new(["_"]);
        if let Some(node) = store.nodes.get(&id) {
            let labels: Vec<&str> = node.labels.iter().map(String::as_str).collect();
            reply = reply.row(vec![node_json(id, &labels, node.properties.clone())]);
        }
        Ok(reply)
    });

    let s = store.clone();
    server.on("MATCH ()-[_]->() WHERE id(_) = $x RETURN _", move |_, params| {
        let store = s.lock();
        let id = params.get("x").and_then(Json::as_i64).unwrap_or(-1);
        let mut reply = Reply::new(["_"]);
        if let Some(rel) = store.relationships.get(&id) {
            reply = reply.row(vec![relationship_json(
                id,
                &rel.rel_type,
                json!(rel.start),
                json!(rel.end),
                rel.properties.clone(),
            )]);
        }
        Ok(reply)
    });

    let s = store.clone();
    server.on("CALL db.labels()", move |_, _| {
        let store = s.lock();
        let mut labels: Vec<&String> = store.nodes.values().flat_map(|n| &n.labels).collect();
        labels.sort();
        labels.dedup();
        let mut reply = Reply::new(["label"]);
        for label in labels {
            reply = reply.row(vec![json!(label)]);
        }
        Ok(reply)
    });

    let s = store.clone();
    server.on("CALL db.relationshipTypes()", move |_, _| {
        let store = s.lock();
        let mut types: Vec<&String> = store.relationships.values().map(|r| &r.rel_type).collect();
        types.sort();
        types.dedup();
        let mut reply = Reply::new(["relationshipType"]);
        for rel_type in types {
            reply = reply.row(vec![json!(rel_type)]);
        }
        Ok(reply)
    });

    let s = store.clone();
    server.on_prefix("UNWIND $x AS data MERGE (_", move |ctx, params| {
        let (label, keys) = merge_pattern(ctx.statement());
        let extra = label_list(
            between(ctx.statement(), "SET _ += data[1]", "RETURN")
                .trim()
                .trim_start_matches("SET _"),
        );
        let rows = params.get("x").and_then(Json::as_array).cloned().unwrap_or_default();
        let mut merged = Vec::new();
        for row in rows {
            let key_values = row.get(0).and_then(Json::as_array).cloned().unwrap_or_default();
            let mut store = s.lock();
            let existing = store.nodes.iter().find_map(|(id, node)| {
                let same = node.labels.contains(&label)
                    && keys
                        .iter()
                        .zip(&key_values)
                        .all(|(key, value)| node.properties.get(key) == Some(value));
                same.then_some(*id)
            });
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = ctx.allocate_id();
                    store.nodes.insert(
                        id,
                        StoredNode {
                            labels: vec![label.clone()],
                            properties: json!({}),
                        },
                    );
                    id
                }
            };
            if let Some(node) = store.nodes.get_mut(&id) {
                merge_properties(&mut node.properties, row.get(1));
                for extra_label in &extra {
                    if !node.labels.contains(extra_label) {
                        node.labels.push(extra_label.clone());
                    }
                }
            }
            merged.push(id);
        }
        Ok(id_reply(merged))
    });

    let s = store.clone();
    server.on("MATCH (_) WHERE id(_) IN $x RETURN _", move |_, params| {
        let store = s.lock();
        let mut reply = Reply::new(["_"]);
        for id in ids(params) {
            if let Some(node) = store.nodes.get(&id) {
                let labels: Vec<&str> = node.labels.iter().map(String::as_str).collect();
                reply = reply.row(vec![node_json(id, &labels, node.properties.clone())]);
            }
        }
        Ok(reply)
    });

    let s = store.clone();
    server.on("MATCH ()-[_]->() WHERE id(_) IN $x RETURN _", move |_, params| {
        let store = s.lock();
        let mut reply = Reply::new(["_"]);
        for id in ids(params) {
            if let Some(rel) = store.relationships.get(&id) {
                reply = reply.row(vec![relationship_json(
                    id,
                    &rel.rel_type,
                    json!(rel.start),
                    json!(rel.end),
                    rel.properties.clone(),
                )]);
            }
        }
        Ok(reply)
    });

    let s = store.clone();
    server.on(
        "MATCH (_) WHERE id(_) IN $x RETURN id(_), labels(_)",
        move |_, params| {
            let store = s.lock();
            let mut reply = Reply::new(["id(_)", "labels(_)"]);
            for id in ids(params) {
                if let Some(node) = store.nodes.get(&id) {
                    reply = reply.row(vec![json!(id), json!(node.labels)]);
                }
            }
            Ok(reply)
        },
    );

    let s = store.clone();
    server.on("MATCH ()-[_]->() WHERE id(_) IN $x RETURN id(_)", move |_, params| {
        let store = s.lock();
        Ok(id_reply(
            ids(params)
                .into_iter()
                .filter(|id| store.relationships.contains_key(id))
                .collect(),
        ))
    });

    let s = store.clone();
    server.on_prefix("MATCH (_) WHERE id(_) = $x SET _ = $y", move |ctx, params| {
        let (removed, added) = push_labels(ctx.statement());
        let id = params.get("x").and_then(Json::as_i64).unwrap_or(-1);
        let mut store = s.lock();
        if let Some(node) = store.nodes.get_mut(&id) {
            node.properties = params.get("y").cloned().unwrap_or_else(|| json!({}));
            node.labels.retain(|label| !removed.contains(label));
            for label in added {
                if !node.labels.contains(&label) {
                    node.labels.push(label);
                }
            }
        }
        Ok(Reply::empty())
    });

    let s = store.clone();
    server.on(
        "UNWIND $x AS data MATCH ()-[_]->() WHERE id(_) = data[0] SET _ = data[1] RETURN id(_)",
        move |_, params| {
            let rows = params.get("x").and_then(Json::as_array).cloned().unwrap_or_default();
            let mut store = s.lock();
            let mut updated = Vec::new();
            for row in rows {
                let id = row.get(0).and_then(Json::as_i64).unwrap_or(-1);
                if let Some(rel) = store.relationships.get_mut(&id) {
                    rel.properties = row.get(1).cloned().unwrap_or_else(|| json!({}));
                    updated.push(id);
                }
            }
            Ok(id_reply(updated))
        },
    );

    let s = store.clone();
    server.on(
        "MATCH (_)-[r]-() WHERE id(_) IN $x RETURN count(DISTINCT r)",
        move |_, params| {
            let store = s.lock();
            let nodes = ids(params);
            let degree = store
                .relationships
                .values()
                .filter(|rel| nodes.contains(&rel.start) || nodes.contains(&rel.end))
                .count();
            Ok(Reply::new(["count(DISTINCT r)"]).row(vec![json!(degree)]))
        },
    );
}
