//! Record access and cursor navigation against a scripted server

#[path = "testutils/mod.rs"]
mod testutils;

use graphlink::transport::memory::Event;
use graphlink::{Error, Query, Reply, TransactionStatus, Value};
use serde::Deserialize;
use serde_json::json;
use testutils::fixture::GraphFixture;

fn people_reply() -> Reply {
    Reply::new(["name", "age"])
        .row(vec![json!("Alice"), json!(33)])
        .row(vec![json!("Bob"), json!(44)])
        .row(vec![json!("Carol"), json!(55)])
        .with_stats(json!({}))
}

const PEOPLE: &str = "MATCH (p:Person) RETURN p.name AS name, p.age AS age";

#[tokio::test]
async fn test_statement_is_sent_on_first_advance() {
    let fixture = GraphFixture::new();
    fixture.server.reply(PEOPLE, people_reply());

    let mut cursor = fixture.graph.run(PEOPLE).unwrap();
    assert!(fixture.server.statements().is_empty());
    assert_eq!(fixture.server.connections_opened(), 0);

    assert!(cursor.advance().await.unwrap());
    assert_eq!(fixture.server.statements(), vec![PEOPLE.to_string()]);
    assert_eq!(cursor.current().unwrap().value("name").unwrap(), &Value::from("Alice"));
}

#[tokio::test]
async fn test_cursor_walks_forward_and_stays_exhausted() {
    let fixture = GraphFixture::new();
    fixture.server.reply(PEOPLE, people_reply());

    let mut cursor = fixture.graph.run(PEOPLE).unwrap();
    assert!(matches!(cursor.current(), Err(Error::NoCurrentRecord)));
    assert_eq!(cursor.keys().await.unwrap(), vec!["name", "age"]);

    assert_eq!(cursor.forward(2).await.unwrap(), 2);
    assert_eq!(cursor.position(), 2);
    let record = cursor.current().unwrap();
    assert_eq!(record.value_at(0).unwrap(), &Value::from("Bob"));
    assert_eq!(record.get("age"), Some(&Value::Integer(44)));

    assert_eq!(cursor.forward(5).await.unwrap(), 1);
    assert!(!cursor.advance().await.unwrap());
    assert!(!cursor.advance().await.unwrap());
    assert!(cursor.is_exhausted());
    assert!(cursor.summary().is_some());
}

#[tokio::test]
async fn test_evaluate_on_empty_result_is_none() {
    let fixture = GraphFixture::new();
    fixture.server.reply("MATCH (n:Nothing) RETURN n", Reply::new(["n"]));

    assert_eq!(fixture.graph.evaluate("MATCH (n:Nothing) RETURN n").await.unwrap(), None);
    assert_eq!(
        fixture.graph.evaluate("RETURN 1 AS x").await.unwrap(),
        Some(Value::Integer(1))
    );
}

#[tokio::test]
async fn test_typed_records() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: i64,
    }

    let fixture = GraphFixture::new();
    fixture.server.reply(PEOPLE, people_reply());

    let mut cursor = fixture.graph.run(PEOPLE).unwrap();
    let people: Vec<Person> = cursor.deserialize_all().await.unwrap();
    assert_eq!(people.len(), 3);
    assert_eq!(
        people[2],
        Person {
            name: "Carol".into(),
            age: 55
        }
    );

    let mut cursor = fixture.graph.run(PEOPLE).unwrap();
    let record = cursor.next().await.unwrap().unwrap();
    assert_eq!(record.get_as::<String>("name").unwrap(), "Alice");
    assert!(matches!(record.get_as::<bool>("name"), Err(Error::TypeConversion(_))));
    assert!(matches!(record.value("missing"), Err(Error::KeyNotFound(_))));
    assert!(matches!(
        record.value_at(9),
        Err(Error::IndexOutOfRange { index: 9, len: 2 })
    ));
    cursor.close().await.unwrap();
}

#[tokio::test]
async fn test_consume_reports_counters() {
    let fixture = GraphFixture::new();
    fixture.server.reply(
        "CREATE (:A), (:B)",
        Reply::empty().with_stats(json!({"nodes-created": 2, "labels-added": 2})),
    );

    let mut cursor = fixture.graph.run("CREATE (:A), (:B)").unwrap();
    let summary = cursor.consume().await.unwrap();
    assert_eq!(summary.statement, "CREATE (:A), (:B)");
    assert_eq!(summary.counters.nodes_created, 2);
    assert_eq!(summary.counters.labels_added, 2);
    assert!(summary.counters.contains_updates());

    // Consuming again hands back the same summary
    assert_eq!(cursor.consume().await.unwrap(), summary);
}

#[tokio::test]
async fn test_closing_unsent_statement_never_sends_it() {
    let fixture = GraphFixture::new();
    let mut tx = fixture.graph.begin();
    {
        let mut cursor = tx.run("RETURN 1 AS x").unwrap();
        cursor.close().await.unwrap();
    }
    tx.commit().await.unwrap();

    assert!(fixture.server.statements().is_empty());
    assert_eq!(tx.status(), TransactionStatus::Committed);
}

#[tokio::test]
async fn test_abandoned_cursor_is_discarded_before_next_statement() {
    let fixture = GraphFixture::new();
    fixture.server.reply(PEOPLE, people_reply());

    let mut tx = fixture.graph.begin();
    {
        let mut cursor = tx.run(PEOPLE).unwrap();
        assert!(cursor.advance().await.unwrap());
    }
    let value = tx.evaluate("RETURN 1 AS x").await.unwrap();
    assert_eq!(value, Some(Value::Integer(1)));
    tx.commit().await.unwrap();

    let journal = fixture.server.journal();
    let discarded = journal.iter().position(|e| matches!(e, Event::Discard { .. }));
    let second_run = journal
        .iter()
        .rposition(|e| matches!(e, Event::Run { statement, .. } if statement == "RETURN 1 AS x"));
    assert!(discarded.unwrap() < second_run.unwrap());
}

#[tokio::test]
async fn test_earlier_statements_are_sent_first() {
    let fixture = GraphFixture::new();
    fixture.server.reply("CREATE (:A)", Reply::empty());
    fixture.server.reply("CREATE (:B)", Reply::empty());

    let mut tx = fixture.graph.begin();
    tx.run("CREATE (:A)").unwrap();
    tx.run("CREATE (:B)").unwrap();
    let value = tx.evaluate(Query::new("RETURN 1 AS x")).await.unwrap();
    assert_eq!(value, Some(Value::Integer(1)));
    tx.commit().await.unwrap();

    assert_eq!(
        fixture.server.statements(),
        vec!["CREATE (:A)", "CREATE (:B)", "RETURN 1 AS x"]
    );
}

#[tokio::test]
async fn test_failed_statement_keeps_failing() {
    let fixture = GraphFixture::new();
    fixture.server.fail_with(
        "RETURN oops",
        "Neo.ClientError.Statement.SyntaxError",
        "Invalid input 'oops'",
    );

    let mut cursor = fixture.graph.run("RETURN oops").unwrap();
    let first = cursor.advance().await.unwrap_err();
    let Error::Graph(graph_error) = &first else {
        panic!("expected a graph error, got {first:?}");
    };
    assert_eq!(graph_error.code, "Neo.ClientError.Statement.SyntaxError");
    assert_eq!(graph_error.title(), Some("SyntaxError"));

    // The failure is sticky; the cursor does not pretend the result ended
    assert!(matches!(cursor.advance().await, Err(Error::Graph(_))));
    assert!(matches!(cursor.consume().await, Err(Error::Graph(_))));
}

#[tokio::test]
async fn test_record_data_and_display() {
    let fixture = GraphFixture::new();
    fixture.server.reply(PEOPLE, people_reply());

    let mut cursor = fixture.graph.run(PEOPLE).unwrap();
    let data = cursor.data().await.unwrap();
    assert_eq!(data.len(), 3);
    assert_eq!(data[1]["name"], Value::from("Bob"));

    let mut cursor = fixture.graph.run(PEOPLE).unwrap();
    let record = cursor.next().await.unwrap().unwrap();
    assert_eq!(record.to_string(), "(name: 'Alice', age: 33)");
    assert_eq!(record.to_json(), json!({"name": "Alice", "age": 33}));
}
