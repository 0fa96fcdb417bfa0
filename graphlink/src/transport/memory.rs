// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-process transport
//!
//! [`MemoryServer`] answers statements from scripted handlers instead of a
//! real database. It keeps a journal of every request it receives and can be
//! told to fail in the ways a remote service fails: refusing connections,
//! rejecting statements, breaking mid-stream, or losing a commit
//! acknowledgment.

use super::{
    BeginOptions, Connection, Connector, Pull, RunHeader, StreamHandle, TransportError, TxToken,
    WireMap,
};
use crate::address::{Auth, ServiceAddress};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as Json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Statement handler: receives the parameters, returns the result
pub type Handler =
    Arc<dyn Fn(&mut ServerContext, &WireMap) -> Result<Reply, TransportError> + Send + Sync>;

/// Result produced by a handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply {
    pub fields: Vec<String>,
    pub rows: Vec<Vec<Json>>,
    /// Summary metadata returned at end of stream
    pub summary: WireMap,
}

impl Reply {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reply {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Reply::default()
        }
    }

    pub fn empty() -> Self {
        Reply::default()
    }

    pub fn row(mut self, values: Vec<Json>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn with_stats(mut self, stats: Json) -> Self {
        self.summary.insert("stats".to_string(), stats);
        self
    }

    pub fn with_summary(mut self, key: &str, value: Json) -> Self {
        self.summary.insert(key.to_string(), value);
        self
    }
}

/// Server facilities available to handlers
pub struct ServerContext<'a> {
    statement: &'a str,
    next_entity_id: &'a mut i64,
}

impl ServerContext<'_> {
    /// Text of the statement being answered
    pub fn statement(&self) -> &str {
        self.statement
    }

    /// Allocate a fresh entity id
    pub fn allocate_id(&mut self) -> i64 {
        let id = *self.next_entity_id;
        *self.next_entity_id += 1;
        id
    }
}

/// A request observed by the server
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open { connection: usize },
    Begin { connection: usize, tx: String, autocommit: bool },
    Run { connection: usize, tx: String, statement: String, parameters: WireMap },
    Pull { connection: usize, stream: u64 },
    Discard { connection: usize, stream: u64 },
    Commit { connection: usize, tx: String },
    Rollback { connection: usize, tx: String },
    Reset { connection: usize },
}

/// How the next commit should misbehave
#[derive(Debug, Clone, PartialEq)]
pub enum CommitFault {
    /// The server rejects the commit and rolls back
    Failure { code: String, message: String },
    /// The server commits but the acknowledgment is lost
    NoAcknowledgement,
    /// The commit request never reaches the server
    Unreachable,
}

enum Matcher {
    Exact(String),
    Prefix(String),
}

impl Matcher {
    fn matches(&self, statement: &str) -> bool {
        match self {
            Matcher::Exact(text) => statement.trim() == text,
            Matcher::Prefix(prefix) => statement.trim_start().starts_with(prefix.as_str()),
        }
    }
}

struct OpenStream {
    connection: usize,
    rows: VecDeque<Vec<Json>>,
    summary: WireMap,
}

struct OpenTransaction {
    connection: usize,
    autocommit: bool,
}

#[derive(Default)]
struct ServerState {
    handlers: Vec<(Matcher, Handler)>,
    next_entity_id: i64,
    next_tx: u64,
    next_stream: u64,
    next_connection: usize,
    transactions: HashMap<String, OpenTransaction>,
    streams: HashMap<u64, OpenStream>,
    journal: Vec<Event>,
    committed: usize,
    rolled_back: usize,
    credentials: Option<Auth>,
    refuse_connections: bool,
    run_failures: VecDeque<TransportError>,
    pull_failures: VecDeque<TransportError>,
    commit_faults: VecDeque<CommitFault>,
    latency: Option<Duration>,
}

/// Scripted in-process graph service
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector that opens connections to this server
    pub fn connector(&self) -> Arc<MemoryConnector> {
        Arc::new(MemoryConnector {
            server: self.clone(),
        })
    }

    /// Answer `statement` (exact text, surrounding whitespace ignored) with `handler`
    pub fn on<F>(&self, statement: &str, handler: F) -> &Self
    where
        F: Fn(&mut ServerContext, &WireMap) -> Result<Reply, TransportError> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .handlers
            .push((Matcher::Exact(statement.trim().to_string()), Arc::new(handler)));
        self
    }

    /// Answer every statement starting with `prefix` with `handler`
    pub fn on_prefix<F>(&self, prefix: &str, handler: F) -> &Self
    where
        F: Fn(&mut ServerContext, &WireMap) -> Result<Reply, TransportError> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .handlers
            .push((Matcher::Prefix(prefix.to_string()), Arc::new(handler)));
        self
    }

    /// Answer `statement` with a fixed result
    pub fn reply(&self, statement: &str, reply: Reply) -> &Self {
        self.on(statement, move |_, _| Ok(reply.clone()))
    }

    /// Reject `statement` with a server failure
    pub fn fail_with(&self, statement: &str, code: &str, message: &str) -> &Self {
        let error = TransportError::Failure {
            code: code.to_string(),
            message: message.to_string(),
        };
        self.on(statement, move |_, _| Err(error.clone()))
    }

    /// Only accept connections presenting these credentials
    pub fn require_auth(&self, auth: Auth) -> &Self {
        self.state.lock().credentials = Some(auth);
        self
    }

    pub fn refuse_connections(&self, refuse: bool) -> &Self {
        self.state.lock().refuse_connections = refuse;
        self
    }

    /// Fail the next `run` requests, in order, with these errors
    pub fn fail_next_runs<I: IntoIterator<Item = TransportError>>(&self, errors: I) -> &Self {
        self.state.lock().run_failures.extend(errors);
        self
    }

    /// Fail the next `pull` requests, in order, with these errors
    pub fn fail_next_pulls<I: IntoIterator<Item = TransportError>>(&self, errors: I) -> &Self {
        self.state.lock().pull_failures.extend(errors);
        self
    }

    pub fn fail_next_commit(&self, fault: CommitFault) -> &Self {
        self.state.lock().commit_faults.push_back(fault);
        self
    }

    /// Delay every response by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) -> &Self {
        self.state.lock().latency = latency;
        self
    }

    pub fn journal(&self) -> Vec<Event> {
        self.state.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }

    /// Statements received, in order
    pub fn statements(&self) -> Vec<String> {
        self.state
            .lock()
            .journal
            .iter()
            .filter_map(|event| match event {
                Event::Run { statement, .. } => Some(statement.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connections_opened(&self) -> usize {
        self.state.lock().next_connection
    }

    pub fn committed(&self) -> usize {
        self.state.lock().committed
    }

    pub fn rolled_back(&self) -> usize {
        self.state.lock().rolled_back
    }

    /// Server transactions neither committed nor rolled back
    pub fn open_transactions(&self) -> usize {
        self.state.lock().transactions.len()
    }

    fn latency(&self) -> Option<Duration> {
        self.state.lock().latency
    }
}

/// [`Connector`] for a [`MemoryServer`]
pub struct MemoryConnector {
    server: MemoryServer,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(
        &self,
        _address: &ServiceAddress,
        auth: Option<&Auth>,
    ) -> Result<Box<dyn Connection>, TransportError> {
        if let Some(latency) = self.server.latency() {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.server.state.lock();
        if state.refuse_connections {
            return Err(TransportError::Unavailable("connection refused".into()));
        }
        if let Some(required) = &state.credentials {
            if auth != Some(required) {
                return Err(TransportError::Unauthorized(
                    "the client is unauthorized due to authentication failure".into(),
                ));
            }
        }
        let id = state.next_connection;
        state.next_connection += 1;
        state.journal.push(Event::Open { connection: id });
        Ok(Box::new(MemoryConnection {
            server: self.server.clone(),
            id,
            defunct: false,
        }))
    }
}

struct MemoryConnection {
    server: MemoryServer,
    id: usize,
    defunct: bool,
}

impl MemoryConnection {
    async fn delay(&self) {
        if let Some(latency) = self.server.latency() {
            tokio::time::sleep(latency).await;
        }
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.defunct {
            Err(TransportError::Broken("connection is defunct".into()))
        } else {
            Ok(())
        }
    }

    fn broke(&mut self, error: TransportError) -> TransportError {
        if matches!(error, TransportError::Broken(_)) {
            self.defunct = true;
        }
        error
    }

    fn close_transaction(state: &mut ServerState, tx: &str) {
        state.transactions.remove(tx);
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn begin(&mut self, options: &BeginOptions) -> Result<TxToken, TransportError> {
        self.delay().await;
        self.check()?;
        let mut state = self.server.state.lock();
        if state
            .transactions
            .values()
            .any(|tx| tx.connection == self.id)
        {
            return Err(TransportError::Failure {
                code: "Neo.ClientError.Transaction.TransactionStartFailed".into(),
                message: "connection already has an open transaction".into(),
            });
        }
        state.next_tx += 1;
        let token = format!("tx-{}", state.next_tx);
        state.transactions.insert(
            token.clone(),
            OpenTransaction {
                connection: self.id,
                autocommit: options.autocommit,
            },
        );
        state.journal.push(Event::Begin {
            connection: self.id,
            tx: token.clone(),
            autocommit: options.autocommit,
        });
        Ok(TxToken(token))
    }

    async fn run(
        &mut self,
        tx: &TxToken,
        statement: &str,
        parameters: &WireMap,
    ) -> Result<RunHeader, TransportError> {
        self.delay().await;
        self.check()?;
        let mut guard = self.server.state.lock();
        let state = &mut *guard;
        state.journal.push(Event::Run {
            connection: self.id,
            tx: tx.0.clone(),
            statement: statement.to_string(),
            parameters: parameters.clone(),
        });
        if !state.transactions.contains_key(&tx.0) {
            return Err(TransportError::Failure {
                code: "Neo.ClientError.Transaction.TransactionNotFound".into(),
                message: format!("unknown transaction {}", tx.0),
            });
        }
        if let Some(error) = state.run_failures.pop_front() {
            drop(guard);
            return Err(self.broke(error));
        }

        let handler = state
            .handlers
            .iter()
            .rev()
            .find(|(matcher, _)| matcher.matches(statement))
            .map(|(_, handler)| handler.clone());
        let Some(handler) = handler else {
            return Err(TransportError::Failure {
                code: "Neo.ClientError.Statement.SyntaxError".into(),
                message: format!("no handler for statement: {}", statement),
            });
        };

        let mut context = ServerContext {
            statement,
            next_entity_id: &mut state.next_entity_id,
        };
        let reply = handler(&mut context, parameters)?;

        state.streams.retain(|_, stream| stream.connection != self.id);
        state.next_stream += 1;
        let handle = state.next_stream;
        state.streams.insert(
            handle,
            OpenStream {
                connection: self.id,
                rows: reply.rows.into(),
                summary: reply.summary,
            },
        );
        Ok(RunHeader {
            stream: StreamHandle(handle),
            fields: reply.fields,
        })
    }

    async fn pull(&mut self, stream: StreamHandle) -> Result<Pull, TransportError> {
        self.delay().await;
        self.check()?;
        let mut state = self.server.state.lock();
        state.journal.push(Event::Pull {
            connection: self.id,
            stream: stream.0,
        });
        if let Some(error) = state.pull_failures.pop_front() {
            drop(state);
            return Err(self.broke(error));
        }
        let open = state
            .streams
            .get_mut(&stream.0)
            .ok_or_else(|| TransportError::Protocol(format!("unknown stream {}", stream.0)))?;
        match open.rows.pop_front() {
            Some(row) => Ok(Pull::Row(row)),
            None => {
                let summary = open.summary.clone();
                state.streams.remove(&stream.0);
                Ok(Pull::End(summary))
            }
        }
    }

    async fn discard(&mut self, stream: StreamHandle) -> Result<WireMap, TransportError> {
        self.delay().await;
        self.check()?;
        let mut state = self.server.state.lock();
        state.journal.push(Event::Discard {
            connection: self.id,
            stream: stream.0,
        });
        let open = state
            .streams
            .remove(&stream.0)
            .ok_or_else(|| TransportError::Protocol(format!("unknown stream {}", stream.0)))?;
        Ok(open.summary)
    }

    async fn commit(&mut self, tx: &TxToken) -> Result<WireMap, TransportError> {
        self.check()?;
        let fault = self.server.state.lock().commit_faults.pop_front();
        if let Some(CommitFault::Unreachable) = fault {
            return Err(TransportError::Unavailable("commit could not be sent".into()));
        }
        self.delay().await;

        let mut state = self.server.state.lock();
        state.journal.push(Event::Commit {
            connection: self.id,
            tx: tx.0.clone(),
        });
        if !state.transactions.contains_key(&tx.0) {
            return Err(TransportError::Failure {
                code: "Neo.ClientError.Transaction.TransactionNotFound".into(),
                message: format!("unknown transaction {}", tx.0),
            });
        }
        Self::close_transaction(&mut state, &tx.0);
        state.streams.retain(|_, stream| stream.connection != self.id);
        match fault {
            Some(CommitFault::Failure { code, message }) => {
                state.rolled_back += 1;
                Err(TransportError::Failure { code, message })
            }
            Some(CommitFault::NoAcknowledgement) => {
                state.committed += 1;
                drop(state);
                self.defunct = true;
                Err(TransportError::Broken("connection lost before commit acknowledgment".into()))
            }
            _ => {
                state.committed += 1;
                let mut metadata = WireMap::new();
                metadata.insert("bookmark".into(), Json::String(format!("bm:{}", tx.0)));
                Ok(metadata)
            }
        }
    }

    async fn rollback(&mut self, tx: &TxToken) -> Result<(), TransportError> {
        self.delay().await;
        self.check()?;
        let mut state = self.server.state.lock();
        state.journal.push(Event::Rollback {
            connection: self.id,
            tx: tx.0.clone(),
        });
        if state.transactions.contains_key(&tx.0) {
            Self::close_transaction(&mut state, &tx.0);
            state.rolled_back += 1;
        }
        state.streams.retain(|_, stream| stream.connection != self.id);
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), TransportError> {
        self.delay().await;
        self.check()?;
        let mut state = self.server.state.lock();
        state.journal.push(Event::Reset {
            connection: self.id,
        });
        let abandoned: Vec<String> = state
            .transactions
            .iter()
            .filter(|(_, tx)| tx.connection == self.id)
            .map(|(token, _)| token.clone())
            .collect();
        for token in abandoned {
            Self::close_transaction(&mut state, &token);
            state.rolled_back += 1;
        }
        state.streams.retain(|_, stream| stream.connection != self.id);
        Ok(())
    }

    fn is_defunct(&self) -> bool {
        self.defunct
    }
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryServer")
            .field("handlers", &state.handlers.len())
            .field("open_transactions", &state.transactions.len())
            .field("autocommit_open", &state.transactions.values().filter(|t| t.autocommit).count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::AccessMode;
    use serde_json::json;

    fn options() -> BeginOptions {
        BeginOptions {
            access_mode: AccessMode::ReadWrite,
            autocommit: false,
            database: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_statement_streams_rows() {
        let server = MemoryServer::new();
        server.reply(
            "RETURN 1 AS x",
            Reply::new(["x"]).row(vec![json!(1)]),
        );
        let address = ServiceAddress::parse("bolt://localhost").unwrap();
        let mut conn = server.connector().open(&address, None).await.unwrap();

        let tx = conn.begin(&options()).await.unwrap();
        let header = conn.run(&tx, "RETURN 1 AS x", &WireMap::new()).await.unwrap();
        assert_eq!(header.fields, vec!["x".to_string()]);
        assert_eq!(conn.pull(header.stream).await.unwrap(), Pull::Row(vec![json!(1)]));
        assert!(matches!(conn.pull(header.stream).await.unwrap(), Pull::End(_)));
        conn.commit(&tx).await.unwrap();

        assert_eq!(server.committed(), 1);
        assert_eq!(server.open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_unknown_statement_is_syntax_error() {
        let server = MemoryServer::new();
        let address = ServiceAddress::parse("bolt://localhost").unwrap();
        let mut conn = server.connector().open(&address, None).await.unwrap();
        let tx = conn.begin(&options()).await.unwrap();
        let err = conn.run(&tx, "NONSENSE", &WireMap::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Failure { code, .. } if code.ends_with("SyntaxError")));
    }

    #[tokio::test]
    async fn test_reset_abandons_open_transaction() {
        let server = MemoryServer::new();
        let address = ServiceAddress::parse("bolt://localhost").unwrap();
        let mut conn = server.connector().open(&address, None).await.unwrap();
        conn.begin(&options()).await.unwrap();
        assert_eq!(server.open_transactions(), 1);
        conn.reset().await.unwrap();
        assert_eq!(server.open_transactions(), 0);
        assert_eq!(server.rolled_back(), 1);
    }
}
