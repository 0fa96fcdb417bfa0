//! Blocking facade over the async client

#[path = "testutils/mod.rs"]
mod testutils;

use graphlink::transport::TransportError;
use graphlink::{Node, Relationship, Reply, Subgraph, TransactionStatus, Value};
use serde_json::json;
use testutils::fixture::GraphFixture;

#[test]
fn test_blocking_run_iterates_records() {
    let fixture = GraphFixture::new();
    fixture.server.reply(
        "UNWIND [1, 2, 3] AS x RETURN x",
        Reply::new(["x"])
            .row(vec![json!(1)])
            .row(vec![json!(2)])
            .row(vec![json!(3)]),
    );
    let graph = fixture.blocking();

    let values: Vec<i64> = graph
        .run("UNWIND [1, 2, 3] AS x RETURN x")
        .unwrap()
        .map(|record| record.unwrap().value("x").unwrap().as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(fixture.server.committed(), 1);
}

#[test]
fn test_blocking_iteration_stops_after_error() {
    let fixture = GraphFixture::new();
    fixture.server.reply(
        "UNWIND [1, 2] AS x RETURN x",
        Reply::new(["x"]).row(vec![json!(1)]).row(vec![json!(2)]),
    );
    fixture
        .server
        .fail_next_runs([TransportError::Broken("connection reset".into())]);
    let graph = fixture.blocking();

    let results: Vec<_> = graph.run("UNWIND [1, 2] AS x RETURN x").unwrap().collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}

#[test]
fn test_blocking_transaction() {
    let fixture = GraphFixture::new();
    let graph = fixture.blocking();

    let mut tx = graph.begin();
    let node = tx.evaluate("CREATE (n) RETURN n").unwrap();
    assert!(matches!(node, Some(Value::Node(ref n)) if !n.is_abstract()));
    assert_eq!(tx.status(), TransactionStatus::Open);
    tx.commit().unwrap();
    assert_eq!(fixture.server.committed(), 1);

    let mut tx = graph.begin();
    tx.run("CREATE (n) RETURN n").unwrap();
    tx.rollback().unwrap();
    assert!(fixture.server.statements().len() == 1);
}

#[test]
fn test_blocking_entity_operations() {
    let fixture = GraphFixture::new();
    let graph = fixture.blocking();

    let a = Node::new(["Person"]).with_property("name", "Alice");
    let b = Node::new(["Person"]).with_property("name", "Bob");
    let created = graph
        .create(&Subgraph::from(Relationship::new(&a, "KNOWS", &b)))
        .unwrap();
    assert!(graph.exists(&created).unwrap());
    assert_eq!(
        graph.node_labels().unwrap().into_iter().collect::<Vec<_>>(),
        vec!["Person"]
    );

    graph.delete(&created).unwrap();
    assert!(!graph.exists(&created).unwrap());
    assert_eq!(fixture.node_count(), 0);
}

#[test]
fn test_blocking_schema() {
    let fixture = GraphFixture::new();
    fixture
        .server
        .reply("CREATE INDEX ON :Person(name)", Reply::empty());
    let graph = fixture.blocking();

    graph
        .schema(|schema| async move { schema.create_index("Person", &["name"]).await })
        .unwrap();
    assert_eq!(
        fixture.server.statements(),
        vec!["CREATE INDEX ON :Person(name)"]
    );
}

#[test]
fn test_blocking_merge_push_and_degree() {
    let fixture = GraphFixture::new();
    let graph = fixture.blocking();
    let alice = Node::new(["Person"]).with_property("name", "Alice");
    let bob = Node::new(["Person"]).with_property("name", "Bob");
    let knows = Subgraph::from(Relationship::new(&alice, "KNOWS", &bob));

    let mut tx = graph.begin();
    let merged = tx.merge(&knows, Some("Person"), &["name"]).unwrap();
    tx.commit().unwrap();
    assert_eq!(fixture.node_count(), 2);
    assert_eq!(graph.degree(&merged).unwrap(), 1);

    let mut alice = merged
        .nodes()
        .find(|n| n.get("name").and_then(|v| v.as_str()) == Some("Alice"))
        .unwrap()
        .clone();
    alice.set_property("age", 33);
    graph.push(&Subgraph::from(alice.clone())).unwrap();
    let pulled = graph.pull(&Subgraph::from(alice)).unwrap();
    assert_eq!(pulled.nodes().next().unwrap().get("age").and_then(|v| v.as_i64()), Some(33));
}
