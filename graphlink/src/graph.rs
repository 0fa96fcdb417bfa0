// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph facade
//!
//! A [`Graph`] is the handle to one remote graph service. It owns the
//! configuration and the connection pool; clones share both. Every
//! [`Graph::run`] or [`Graph::begin`] call is an independent transaction.

use crate::address::ServiceAddress;
use crate::codec::Hydrator;
use crate::config::Config;
use crate::error::Result;
use crate::query::Query;
use crate::result::cursor::TxRef;
use crate::result::Cursor;
use crate::schema::Schema;
use crate::transport::{ConnectionPool, Connector};
use crate::txn::{Transaction, TransactionOptions};
use crate::types::{GraphId, Node, Relationship, Subgraph, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const DEFAULT_URI: &str = "bolt://localhost:7687";

struct GraphInner {
    id: GraphId,
    address: ServiceAddress,
    config: Arc<Config>,
    pool: ConnectionPool,
}

/// Handle to a remote graph database
///
/// # Examples
///
/// ```no_run
/// use graphlink::{Graph, MemoryServer};
///
/// # async fn demo() -> graphlink::Result<()> {
/// let server = MemoryServer::new();
/// let graph = Graph::new("bolt://localhost:7687", server.connector())?;
///
/// let mut cursor = graph.run("RETURN 1 AS x")?;
/// if let Some(record) = cursor.next().await? {
///     println!("x = {}", record.value("x")?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphInner>,
}

impl Graph {
    /// Bind to the service at `uri` with default configuration.
    ///
    /// No connection is made until the first statement is sent.
    pub fn new(uri: &str, connector: Arc<dyn Connector>) -> Result<Graph> {
        Self::with_config(uri, connector, Config::default())
    }

    pub fn with_config(uri: &str, connector: Arc<dyn Connector>, config: Config) -> Result<Graph> {
        config.validate()?;
        let address = ServiceAddress::parse(uri)?;
        let auth = config.auth().or_else(|| address.auth.clone());
        let id = GraphId::new(&address.uri(), config.database.as_deref());
        let pool = ConnectionPool::new(address.clone(), auth, connector, &config);
        log::info!("Graph {} configured (pool size {})", id, config.max_connections);
        Ok(Graph {
            inner: Arc::new(GraphInner {
                id,
                address,
                config: Arc::new(config),
                pool,
            }),
        })
    }

    /// Bind using `GRAPHLINK_URI` (default `bolt://localhost:7687`) and
    /// [`Config::from_env`]
    pub fn from_env(connector: Arc<dyn Connector>) -> Result<Graph> {
        let uri = std::env::var("GRAPHLINK_URI").unwrap_or_else(|_| DEFAULT_URI.to_string());
        Self::with_config(&uri, connector, Config::from_env()?)
    }

    pub fn id(&self) -> &GraphId {
        &self.inner.id
    }

    pub fn address(&self) -> &ServiceAddress {
        &self.inner.address
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Start an explicit read-write transaction
    pub fn begin(&self) -> Transaction {
        self.begin_with(TransactionOptions::default())
    }

    pub fn begin_with(&self, options: TransactionOptions) -> Transaction {
        Transaction::new(
            self.inner.id.clone(),
            self.inner.pool.clone(),
            self.inner.config.clone(),
            options,
        )
    }

    /// Run a single statement in its own autocommit transaction.
    ///
    /// The statement is sent when the cursor is first advanced and committed
    /// once its result is exhausted or the cursor is closed. Queries marked
    /// idempotent are retried on transient failures before their first record.
    pub fn run(&self, query: impl Into<Query>) -> Result<Cursor<'static>> {
        let query = query.into();
        let mut tx = Box::new(self.begin_with(TransactionOptions::default().autocommit()));
        let seq = tx.enqueue(&query)?;
        let statement = query.text().to_string();
        let retry = query.is_idempotent().then_some(query);
        Ok(Cursor::new(
            TxRef::Owned(tx),
            seq,
            statement,
            retry,
            Hydrator::new(self.inner.id.clone()),
        ))
    }

    /// First value of the first record, or `None` for an empty result
    pub async fn evaluate(&self, query: impl Into<Query>) -> Result<Option<Value>> {
        let mut cursor = self.run(query)?;
        let value = cursor.evaluate().await?;
        cursor.close().await?;
        Ok(value)
    }

    /// Every record of `query` as a key to value map
    pub async fn data(&self, query: impl Into<Query>) -> Result<Vec<BTreeMap<String, Value>>> {
        self.run(query)?.data().await
    }

    /// Create the abstract entities of `subgraph` in one transaction
    pub async fn create(&self, subgraph: &Subgraph) -> Result<Subgraph> {
        let mut tx = self.begin();
        let created = tx.create(subgraph).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Merge `subgraph` in one transaction; see [`Transaction::merge`]
    pub async fn merge(
        &self,
        subgraph: &Subgraph,
        primary_label: Option<&str>,
        primary_keys: &[&str],
    ) -> Result<Subgraph> {
        let mut tx = self.begin();
        let merged = tx.merge(subgraph, primary_label, primary_keys).await?;
        tx.commit().await?;
        Ok(merged)
    }

    /// Server state of the concrete entities of `subgraph`
    pub async fn pull(&self, subgraph: &Subgraph) -> Result<Subgraph> {
        let mut tx = self.begin_with(TransactionOptions::default().read_only());
        let pulled = tx.pull(subgraph).await?;
        tx.commit().await?;
        Ok(pulled)
    }

    /// Write the local labels and properties of `subgraph` to the server
    pub async fn push(&self, subgraph: &Subgraph) -> Result<()> {
        let mut tx = self.begin();
        tx.push(subgraph).await?;
        tx.commit().await
    }

    pub async fn degree(&self, subgraph: &Subgraph) -> Result<i64> {
        let mut tx = self.begin_with(TransactionOptions::default().read_only());
        let degree = tx.degree(subgraph).await?;
        tx.commit().await?;
        Ok(degree)
    }

    pub async fn delete(&self, subgraph: &Subgraph) -> Result<()> {
        let mut tx = self.begin();
        tx.delete(subgraph).await?;
        tx.commit().await
    }

    pub async fn separate(&self, subgraph: &Subgraph) -> Result<()> {
        let mut tx = self.begin();
        tx.separate(subgraph).await?;
        tx.commit().await
    }

    pub async fn exists(&self, subgraph: &Subgraph) -> Result<bool> {
        let mut tx = self.begin_with(TransactionOptions::default().read_only());
        let exists = tx.exists(subgraph).await?;
        tx.commit().await?;
        Ok(exists)
    }

    /// Delete every node and relationship
    pub async fn delete_all(&self) -> Result<()> {
        self.run("MATCH (_) DETACH DELETE _")?.consume().await?;
        Ok(())
    }

    /// Fetch a node by id
    pub async fn node(&self, id: i64) -> Result<Option<Node>> {
        let value = self
            .evaluate(Query::new("MATCH (_) WHERE id(_) = $x RETURN _").param("x", id))
            .await?;
        Ok(match value {
            Some(Value::Node(node)) => Some(node),
            _ => None,
        })
    }

    /// Fetch a relationship by id
    pub async fn relationship(&self, id: i64) -> Result<Option<Relationship>> {
        let value = self
            .evaluate(Query::new("MATCH ()-[_]->() WHERE id(_) = $x RETURN _").param("x", id))
            .await?;
        Ok(match value {
            Some(Value::Relationship(rel)) => Some(rel),
            _ => None,
        })
    }

    /// Every node label in use
    pub async fn node_labels(&self) -> Result<BTreeSet<String>> {
        self.string_column("CALL db.labels()").await
    }

    /// Every relationship type in use
    pub async fn relationship_types(&self) -> Result<BTreeSet<String>> {
        self.string_column("CALL db.relationshipTypes()").await
    }

    async fn string_column(&self, statement: &str) -> Result<BTreeSet<String>> {
        let mut cursor = self.run(statement)?;
        let mut values = BTreeSet::new();
        while cursor.advance().await? {
            if let Some(s) = cursor.current()?.value_at(0)?.as_str() {
                values.insert(s.to_string());
            }
        }
        Ok(values)
    }

    /// Index and constraint management
    pub fn schema(&self) -> Schema {
        Schema::new(self.clone())
    }

    /// Close the pool. Transactions already holding a connection finish
    /// normally; new ones fail with a connection error.
    pub fn close(&self) {
        self.inner.pool.close();
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").field("id", &self.inner.id).finish()
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}
