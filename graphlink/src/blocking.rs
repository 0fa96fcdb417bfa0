// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Blocking facade
//!
//! Wrappers that drive the async client on a private current-thread tokio
//! runtime. None of these methods may be called from inside an async context;
//! tokio panics if a runtime is blocked on from within another.
//!
//! # Examples
//!
//! ```no_run
//! use graphlink::blocking::Graph;
//! use graphlink::MemoryServer;
//!
//! # fn main() -> graphlink::Result<()> {
//! let server = MemoryServer::new();
//! let graph = Graph::new("bolt://localhost:7687", server.connector())?;
//!
//! for record in graph.run("MATCH (p:Person) RETURN p.name AS name")? {
//!     println!("{}", record?.value("name")?);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::result::{Counters, Record, Summary};
use crate::schema::Schema;
use crate::transport::Connector;
use crate::txn::{TransactionOptions, TransactionStatus};
use crate::types::{Node, Relationship, Subgraph, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn runtime() -> Result<Arc<Runtime>> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(Arc::new)
        .map_err(|e| Error::Config(format!("failed to start runtime: {}", e)))
}

/// Blocking handle to a remote graph database
#[derive(Clone)]
pub struct Graph {
    inner: crate::Graph,
    runtime: Arc<Runtime>,
}

impl Graph {
    pub fn new(uri: &str, connector: Arc<dyn Connector>) -> Result<Graph> {
        Self::with_config(uri, connector, Config::default())
    }

    pub fn with_config(uri: &str, connector: Arc<dyn Connector>, config: Config) -> Result<Graph> {
        Ok(Graph {
            inner: crate::Graph::with_config(uri, connector, config)?,
            runtime: runtime()?,
        })
    }

    /// Wrap an existing async handle; the pool is shared with it
    pub fn from_async(inner: crate::Graph) -> Result<Graph> {
        Ok(Graph {
            inner,
            runtime: runtime()?,
        })
    }

    pub fn as_async(&self) -> &crate::Graph {
        &self.inner
    }

    pub fn begin(&self) -> Transaction {
        self.begin_with(TransactionOptions::default())
    }

    pub fn begin_with(&self, options: TransactionOptions) -> Transaction {
        Transaction {
            inner: self.inner.begin_with(options),
            runtime: self.runtime.clone(),
        }
    }

    pub fn run(&self, query: impl Into<Query>) -> Result<Cursor<'static>> {
        Ok(Cursor {
            inner: self.inner.run(query)?,
            runtime: self.runtime.clone(),
            failed: false,
        })
    }

    pub fn evaluate(&self, query: impl Into<Query>) -> Result<Option<Value>> {
        self.runtime.block_on(self.inner.evaluate(query))
    }

    pub fn data(&self, query: impl Into<Query>) -> Result<Vec<BTreeMap<String, Value>>> {
        self.runtime.block_on(self.inner.data(query))
    }

    pub fn create(&self, subgraph: &Subgraph) -> Result<Subgraph> {
        self.runtime.block_on(self.inner.create(subgraph))
    }

    pub fn merge(
        &self,
        subgraph: &Subgraph,
        primary_label: Option<&str>,
        primary_keys: &[&str],
    ) -> Result<Subgraph> {
        self.runtime
            .block_on(self.inner.merge(subgraph, primary_label, primary_keys))
    }

    pub fn pull(&self, subgraph: &Subgraph) -> Result<Subgraph> {
        self.runtime.block_on(self.inner.pull(subgraph))
    }

    pub fn push(&self, subgraph: &Subgraph) -> Result<()> {
        self.runtime.block_on(self.inner.push(subgraph))
    }

    pub fn degree(&self, subgraph: &Subgraph) -> Result<i64> {
        self.runtime.block_on(self.inner.degree(subgraph))
    }

    pub fn delete(&self, subgraph: &Subgraph) -> Result<()> {
        self.runtime.block_on(self.inner.delete(subgraph))
    }

    pub fn separate(&self, subgraph: &Subgraph) -> Result<()> {
        self.runtime.block_on(self.inner.separate(subgraph))
    }

    pub fn exists(&self, subgraph: &Subgraph) -> Result<bool> {
        self.runtime.block_on(self.inner.exists(subgraph))
    }

    pub fn delete_all(&self) -> Result<()> {
        self.runtime.block_on(self.inner.delete_all())
    }

    pub fn node(&self, id: i64) -> Result<Option<Node>> {
        self.runtime.block_on(self.inner.node(id))
    }

    pub fn relationship(&self, id: i64) -> Result<Option<Relationship>> {
        self.runtime.block_on(self.inner.relationship(id))
    }

    pub fn node_labels(&self) -> Result<BTreeSet<String>> {
        self.runtime.block_on(self.inner.node_labels())
    }

    pub fn relationship_types(&self) -> Result<BTreeSet<String>> {
        self.runtime.block_on(self.inner.relationship_types())
    }

    /// Run an async schema operation to completion
    ///
    /// ```no_run
    /// # fn demo(graph: graphlink::blocking::Graph) -> graphlink::Result<()> {
    /// graph.schema(|schema| async move { schema.create_index("Person", &["name"]).await })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn schema<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(Schema) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.runtime.block_on(operation(self.inner.schema()))
    }

    pub fn close(&self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("blocking::Graph").field(&self.inner).finish()
    }
}

/// Blocking transaction
#[derive(Debug)]
pub struct Transaction {
    inner: crate::Transaction,
    runtime: Arc<Runtime>,
}

impl Transaction {
    pub fn status(&self) -> TransactionStatus {
        self.inner.status()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn run(&mut self, query: impl Into<Query>) -> Result<Cursor<'_>> {
        let runtime = self.runtime.clone();
        Ok(Cursor {
            inner: self.inner.run(query)?,
            runtime,
            failed: false,
        })
    }

    pub fn evaluate(&mut self, query: impl Into<Query>) -> Result<Option<Value>> {
        self.runtime.block_on(self.inner.evaluate(query))
    }

    pub fn create(&mut self, subgraph: &Subgraph) -> Result<Subgraph> {
        self.runtime.block_on(self.inner.create(subgraph))
    }

    pub fn merge(
        &mut self,
        subgraph: &Subgraph,
        primary_label: Option<&str>,
        primary_keys: &[&str],
    ) -> Result<Subgraph> {
        self.runtime
            .block_on(self.inner.merge(subgraph, primary_label, primary_keys))
    }

    pub fn pull(&mut self, subgraph: &Subgraph) -> Result<Subgraph> {
        self.runtime.block_on(self.inner.pull(subgraph))
    }

    pub fn push(&mut self, subgraph: &Subgraph) -> Result<()> {
        self.runtime.block_on(self.inner.push(subgraph))
    }

    pub fn degree(&mut self, subgraph: &Subgraph) -> Result<i64> {
        self.runtime.block_on(self.inner.degree(subgraph))
    }

    pub fn delete(&mut self, subgraph: &Subgraph) -> Result<()> {
        self.runtime.block_on(self.inner.delete(subgraph))
    }

    pub fn separate(&mut self, subgraph: &Subgraph) -> Result<()> {
        self.runtime.block_on(self.inner.separate(subgraph))
    }

    pub fn exists(&mut self, subgraph: &Subgraph) -> Result<bool> {
        self.runtime.block_on(self.inner.exists(subgraph))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.flush())
    }

    pub fn commit(mut self) -> Result<()> {
        self.runtime.block_on(self.inner.commit())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.runtime.block_on(self.inner.rollback())
    }
}

/// Blocking cursor; iterating yields the remaining records
///
/// Iteration stops after the first error.
pub struct Cursor<'t> {
    inner: crate::Cursor<'t>,
    runtime: Arc<Runtime>,
    failed: bool,
}

impl Cursor<'_> {
    pub fn advance(&mut self) -> Result<bool> {
        self.runtime.block_on(self.inner.advance())
    }

    pub fn current(&self) -> Result<&Record> {
        self.inner.current()
    }

    pub fn keys(&mut self) -> Result<Vec<String>> {
        self.runtime.block_on(self.inner.keys())
    }

    pub fn evaluate(&mut self) -> Result<Option<Value>> {
        self.runtime.block_on(self.inner.evaluate())
    }

    pub fn data(&mut self) -> Result<Vec<BTreeMap<String, Value>>> {
        self.runtime.block_on(self.inner.data())
    }

    pub fn consume(&mut self) -> Result<Summary> {
        self.runtime.block_on(self.inner.consume())
    }

    pub fn stats(&mut self) -> Result<Counters> {
        self.runtime.block_on(self.inner.stats())
    }

    pub fn close(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.runtime.block_on(self.inner.next()).transpose();
        self.failed = matches!(next, Some(Err(_)));
        next
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("blocking::Cursor").field(&self.inner).finish()
    }
}
