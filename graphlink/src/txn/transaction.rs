// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Client transactions
//!
//! A [`Transaction`] queues statements lazily: `run` only records the
//! statement and hands back a [`Cursor`]. Statements are sent when a cursor is
//! first advanced, or when the transaction is flushed or committed. The
//! connection is checked out of the pool, and the server transaction begun, on
//! the first send.
//!
//! A cursor mutably borrows its transaction, so at most one result stream is
//! in flight per transaction at any time.

use super::state::{AccessMode, TransactionId, TransactionState, TransactionStatus};
use crate::codec::{encode_parameters, Hydrator};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::result::cursor::TxRef;
use crate::result::Cursor;
use crate::transport::{
    BeginOptions, ConnectionPool, PooledConnection, Pull, RunHeader, StreamHandle,
    TransportError, TxToken, WireMap,
};
use crate::types::GraphId;
use std::collections::VecDeque;
use std::sync::Arc;

/// Options for [`crate::Graph::begin_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    pub access_mode: AccessMode,
    /// Commit automatically when the single statement's result is exhausted
    pub autocommit: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::ReadWrite,
            autocommit: false,
        }
    }
}

impl TransactionOptions {
    pub fn read_only(mut self) -> Self {
        self.access_mode = AccessMode::ReadOnly;
        self
    }

    pub fn autocommit(mut self) -> Self {
        self.autocommit = true;
        self
    }
}

/// A request sent on the connection whose reply has not been read yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Run,
    Pull,
    Discard,
    Commit,
    Rollback,
}

#[derive(Debug, Clone)]
struct PendingStatement {
    seq: u64,
    statement: String,
    parameters: WireMap,
}

/// A unit of work against one graph
pub struct Transaction {
    state: TransactionState,
    graph: GraphId,
    pool: ConnectionPool,
    config: Arc<Config>,
    connection: Option<PooledConnection>,
    token: Option<TxToken>,
    pending: VecDeque<PendingStatement>,
    /// Stream currently open on the connection, with the statement it belongs to
    active: Option<(u64, StreamHandle)>,
    next_seq: u64,
    failure: Option<Error>,
    /// Set while a request awaits its reply; still set afterwards only if the
    /// awaiting future was dropped
    in_flight: Option<Request>,
}

impl Transaction {
    pub(crate) fn new(
        graph: GraphId,
        pool: ConnectionPool,
        config: Arc<Config>,
        options: TransactionOptions,
    ) -> Self {
        let state = TransactionState::new(options.access_mode, options.autocommit);
        log::debug!(
            "Transaction {} created (autocommit: {})",
            state.id,
            options.autocommit
        );
        Self {
            state,
            graph,
            pool,
            config,
            connection: None,
            token: None,
            pending: VecDeque::new(),
            active: None,
            next_seq: 0,
            failure: None,
            in_flight: None,
        }
    }

    /// A fresh autocommit transaction against the same graph
    pub(crate) fn sibling(&self) -> Transaction {
        Transaction::new(
            self.graph.clone(),
            self.pool.clone(),
            self.config.clone(),
            TransactionOptions {
                access_mode: self.state.access_mode,
                autocommit: self.state.autocommit,
            },
        )
    }

    pub fn id(&self) -> TransactionId {
        self.state.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.state.status
    }

    pub fn state(&self) -> &TransactionState {
        &self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.status.is_terminal()
    }

    pub fn is_autocommit(&self) -> bool {
        self.state.autocommit
    }

    pub fn graph_id(&self) -> &GraphId {
        &self.graph
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// The error that terminated this transaction, if any
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    pub(super) fn assert_open(&mut self) -> Result<()> {
        self.check_interrupted()?;
        if self.is_finished() {
            Err(Error::TransactionFinished)
        } else {
            Ok(())
        }
    }

    /// Queue a statement and return its sequence number
    pub(crate) fn enqueue(&mut self, query: &Query) -> Result<u64> {
        self.assert_open()?;
        if self.state.autocommit && self.state.statement_count > 0 {
            return Err(Error::TransactionFinished);
        }
        let parameters = encode_parameters(query.parameters())?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.state.record_statement();
        self.pending.push_back(PendingStatement {
            seq,
            statement: query.text().to_string(),
            parameters,
        });
        Ok(seq)
    }

    /// Queue a statement; nothing is sent until the cursor is advanced
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use graphlink::Graph;
    /// # async fn demo(graph: Graph) -> graphlink::Result<()> {
    /// let mut tx = graph.begin();
    /// {
    ///     let mut cursor = tx.run("CREATE (n:Person {name: 'Alice'}) RETURN n")?;
    ///     let alice = cursor.evaluate().await?;
    /// }
    /// tx.commit().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn run(&mut self, query: impl Into<Query>) -> Result<Cursor<'_>> {
        let query = query.into();
        let seq = self.enqueue(&query)?;
        let hydrator = Hydrator::new(self.graph.clone());
        Ok(Cursor::new(
            TxRef::Borrowed(self),
            seq,
            query.text().to_string(),
            None,
            hydrator,
        ))
    }

    /// Send every queued statement, discarding their results
    pub async fn flush(&mut self) -> Result<()> {
        self.assert_open()?;
        self.discard_active().await?;
        while let Some(pending) = self.pending.front().cloned() {
            let header = self.dispatch(&pending).await?;
            self.pending.pop_front();
            self.discard(header.stream).await?;
        }
        Ok(())
    }

    /// Commit the transaction
    ///
    /// On a server failure the transaction ends up rolled back. If the commit
    /// request was sent but never acknowledged the outcome is unknown: the
    /// transaction becomes `Indeterminate` and the error is
    /// [`Error::CommitOutcomeUnknown`]. Commits are never retried.
    pub async fn commit(&mut self) -> Result<()> {
        self.assert_open()?;
        self.flush().await?;

        let Some(token) = self.token.clone() else {
            log::debug!("Transaction {} committed (no statements sent)", self.state.id);
            self.state.finish(TransactionStatus::Committed);
            return Ok(());
        };
        self.in_flight = Some(Request::Commit);
        let result = match self.connection.as_mut() {
            Some(connection) => connection.commit(&token).await,
            None => Err(TransportError::Broken("connection lost".into())),
        };
        self.in_flight = None;

        match result {
            Ok(_) => {
                log::debug!("Transaction {} committed", self.state.id);
                self.state.finish(TransactionStatus::Committed);
                self.release();
                Ok(())
            }
            Err(TransportError::Unavailable(message)) => {
                let err = Error::from(TransportError::Unavailable(message));
                Err(self.fail(err))
            }
            Err(error @ (TransportError::Broken(_) | TransportError::TimedOut(_))) => {
                Err(self.indeterminate(error.to_string()))
            }
            Err(error) => {
                let err = Error::from(error);
                Err(self.fail(err))
            }
        }
    }

    /// Roll the transaction back, discarding queued statements
    pub async fn rollback(&mut self) -> Result<()> {
        if self.in_flight.is_some() && self.in_flight != Some(Request::Commit) {
            // The server abandons the transaction along with the connection
            self.in_flight = None;
            self.token = None;
            if let Some(connection) = self.connection.as_mut() {
                connection.discard();
            }
        }
        self.assert_open()?;
        self.pending.clear();
        self.active = None;
        if let (Some(token), Some(connection)) = (self.token.clone(), self.connection.as_mut()) {
            self.in_flight = Some(Request::Rollback);
            let result = connection.rollback(&token).await;
            self.in_flight = None;
            self.token = None;
            if let Err(e) = result {
                log::warn!(
                    "Rollback of transaction {} failed, closing its connection: {}",
                    self.state.id,
                    e
                );
                connection.discard();
            }
        }
        log::debug!("Transaction {} rolled back", self.state.id);
        self.state.finish(TransactionStatus::RolledBack);
        self.release();
        Ok(())
    }

    /// Record a terminating failure and release the connection for reset
    pub(super) fn fail(&mut self, error: Error) -> Error {
        if self.is_finished() {
            return error;
        }
        log::debug!("Transaction {} failed: {}", self.state.id, error);
        self.failure = Some(error.clone());
        self.state.finish(TransactionStatus::RolledBack);
        self.pending.clear();
        self.active = None;
        self.token = None;
        if let Some(mut connection) = self.connection.take() {
            connection.mark_dirty();
        }
        error
    }

    /// The commit may or may not have been applied
    fn indeterminate(&mut self, reason: String) -> Error {
        log::warn!(
            "Transaction {} commit outcome unknown: {}",
            self.state.id,
            reason
        );
        let err = Error::CommitOutcomeUnknown(reason);
        self.failure = Some(err.clone());
        self.state.finish(TransactionStatus::Indeterminate);
        self.pending.clear();
        self.active = None;
        self.token = None;
        if let Some(mut connection) = self.connection.take() {
            connection.discard();
        }
        err
    }

    /// A request whose reply was never read leaves the connection in an
    /// unknown state, so the transaction cannot continue on it
    fn check_interrupted(&mut self) -> Result<()> {
        let Some(request) = self.in_flight.take() else {
            return Ok(());
        };
        if let Some(connection) = self.connection.as_mut() {
            connection.discard();
        }
        if request == Request::Commit {
            return Err(self.indeterminate("commit was cancelled before it was acknowledged".into()));
        }
        Err(self.fail(Error::Protocol(format!(
            "{:?} request was cancelled before its reply arrived",
            request
        ))))
    }

    fn release(&mut self) {
        self.active = None;
        self.token = None;
        self.connection = None;
    }

    fn check_usable(&mut self) -> Result<()> {
        self.check_interrupted()?;
        match (&self.failure, self.is_finished()) {
            (Some(error), _) => Err(error.clone()),
            (None, true) => Err(Error::TransactionFinished),
            (None, false) => Ok(()),
        }
    }

    /// Connection and server transaction, opened on first use
    async fn ensure_begun(&mut self) -> Result<()> {
        if self.token.is_some() {
            return Ok(());
        }
        let mut connection = match self.pool.acquire().await {
            Ok(connection) => connection,
            Err(e) => return Err(self.fail(e)),
        };
        let options = BeginOptions {
            access_mode: self.state.access_mode,
            autocommit: self.state.autocommit,
            database: self.config.database.clone(),
        };
        match connection.begin(&options).await {
            Ok(token) => {
                log::debug!("Transaction {} begun as {}", self.state.id, token.0);
                self.token = Some(token);
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                self.connection = Some(connection);
                Err(self.fail(e.into()))
            }
        }
    }

    async fn dispatch(&mut self, pending: &PendingStatement) -> Result<RunHeader> {
        self.ensure_begun().await?;
        let token = self.token.clone().ok_or(Error::TransactionFinished)?;
        self.in_flight = Some(Request::Run);
        let result = match self.connection.as_mut() {
            Some(connection) => {
                connection
                    .run(&token, &pending.statement, &pending.parameters)
                    .await
            }
            None => Err(TransportError::Broken("connection lost".into())),
        };
        self.in_flight = None;
        match result {
            Ok(header) => {
                log::debug!(
                    "Transaction {} sent statement #{}: {}",
                    self.state.id,
                    pending.seq,
                    pending.statement
                );
                self.active = Some((pending.seq, header.stream));
                Ok(header)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    async fn discard(&mut self, stream: StreamHandle) -> Result<WireMap> {
        self.in_flight = Some(Request::Discard);
        let result = match self.connection.as_mut() {
            Some(connection) => connection.discard_stream(stream).await,
            None => Err(TransportError::Broken("connection lost".into())),
        };
        self.in_flight = None;
        self.active = None;
        result.map_err(|e| self.fail(e.into()))
    }

    /// Discard a stream whose cursor went away before exhausting it
    async fn discard_active(&mut self) -> Result<()> {
        if let Some((seq, stream)) = self.active.take() {
            log::debug!(
                "Transaction {} discarding abandoned result #{}",
                self.state.id,
                seq
            );
            self.discard(stream).await?;
        }
        Ok(())
    }

    /// Send statement `seq`, after every statement queued before it
    pub(crate) async fn open_stream(&mut self, seq: u64) -> Result<RunHeader> {
        self.check_usable()?;
        self.discard_active().await?;
        while let Some(pending) = self.pending.front().cloned() {
            if pending.seq > seq {
                break;
            }
            let header = self.dispatch(&pending).await?;
            self.pending.pop_front();
            if pending.seq == seq {
                return Ok(header);
            }
            self.discard(header.stream).await?;
        }
        let error = Error::Protocol(format!("statement #{} is no longer pending", seq));
        Err(self.fail(error))
    }

    pub(crate) async fn pull_stream(&mut self, seq: u64, stream: StreamHandle) -> Result<Pull> {
        self.check_usable()?;
        if self.active != Some((seq, stream)) {
            return Err(Error::Protocol(format!(
                "result #{} is no longer open",
                seq
            )));
        }
        self.in_flight = Some(Request::Pull);
        let result = match self.connection.as_mut() {
            Some(connection) => connection.pull(stream).await,
            None => Err(TransportError::Broken("connection lost".into())),
        };
        self.in_flight = None;
        match result {
            Ok(Pull::End(summary)) => {
                self.active = None;
                Ok(Pull::End(summary))
            }
            Ok(row) => Ok(row),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Discard the rest of stream `seq`, returning its summary metadata
    pub(crate) async fn discard_stream(&mut self, seq: u64, stream: StreamHandle) -> Result<WireMap> {
        self.check_usable()?;
        if self.active != Some((seq, stream)) {
            return Ok(WireMap::new());
        }
        self.discard(stream).await
    }

    /// Statement `seq` will never be sent
    pub(crate) fn forget(&mut self, seq: u64) {
        self.pending.retain(|pending| pending.seq != seq);
    }

    /// A result stream was exhausted or closed; autocommit transactions end here
    pub(crate) async fn stream_finished(&mut self) -> Result<()> {
        if self.state.autocommit && !self.is_finished() {
            self.commit().await?;
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_finished() {
            return;
        }
        if self.token.is_some() {
            if self.state.autocommit {
                log::debug!(
                    "Autocommit transaction {} dropped before its result was consumed",
                    self.state.id
                );
            } else {
                log::warn!(
                    "Transaction {} dropped while open; its connection will be reset",
                    self.state.id
                );
            }
        }
        if let Some(connection) = self.connection.as_mut() {
            if self.in_flight.is_some() {
                connection.discard();
            } else {
                connection.mark_dirty();
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.state.id)
            .field("status", &self.state.status)
            .field("autocommit", &self.state.autocommit)
            .field("pending", &self.pending.len())
            .finish()
    }
}
