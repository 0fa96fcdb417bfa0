// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Forward-only result cursors
//!
//! A cursor starts before the first record. Each [`Cursor::advance`] moves it
//! to the next record until the result is exhausted; after that every advance
//! returns `false`. If the owning transaction fails, advance returns that
//! failure on every call rather than pretending the result ended.

use super::record::{Keys, Record};
use super::summary::{Counters, Summary};
use crate::codec::Hydrator;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::transport::{Pull, StreamHandle};
use crate::txn::Transaction;
use crate::types::Value;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The transaction a cursor reads through
pub(crate) enum TxRef<'t> {
    Borrowed(&'t mut Transaction),
    /// Implicit autocommit transaction owned by the cursor
    Owned(Box<Transaction>),
}

impl TxRef<'_> {
    fn get(&mut self) -> &mut Transaction {
        match self {
            TxRef::Borrowed(tx) => &mut **tx,
            TxRef::Owned(tx) => &mut **tx,
        }
    }
}

enum CursorState {
    BeforeFirst,
    OnRecord(Record),
    AfterLast,
    Failed(Error),
}

/// Live view over one statement's result stream
pub struct Cursor<'t> {
    tx: TxRef<'t>,
    seq: u64,
    statement: String,
    /// Query to re-run after a transient failure; only set for idempotent autocommit
    retry: Option<Query>,
    hydrator: Hydrator,
    keys: Option<Arc<Keys>>,
    stream: Option<StreamHandle>,
    state: CursorState,
    summary: Option<Summary>,
    delivered: u64,
}

impl<'t> Cursor<'t> {
    pub(crate) fn new(
        tx: TxRef<'t>,
        seq: u64,
        statement: String,
        retry: Option<Query>,
        hydrator: Hydrator,
    ) -> Self {
        Self {
            tx,
            seq,
            statement,
            retry,
            hydrator,
            keys: None,
            stream: None,
            state: CursorState::BeforeFirst,
            summary: None,
            delivered: 0,
        }
    }

    /// Move to the next record.
    ///
    /// Returns `Ok(true)` when positioned on a record and `Ok(false)` once the
    /// result is exhausted.
    pub async fn advance(&mut self) -> Result<bool> {
        match &self.state {
            CursorState::AfterLast => return Ok(false),
            CursorState::Failed(error) => return Err(error.clone()),
            _ => {}
        }

        let mut attempt = 0;
        loop {
            match self.step().await {
                Ok(true) => {
                    self.delivered += 1;
                    return Ok(true);
                }
                Ok(false) => {
                    self.state = CursorState::AfterLast;
                    return Ok(false);
                }
                Err(error) => {
                    if self.can_retry(&error, attempt) {
                        let delay = self.tx.get().config().retry.delay_for(attempt);
                        attempt += 1;
                        log::warn!(
                            "Transient failure running '{}', retry {} in {:?}: {}",
                            self.statement,
                            attempt,
                            delay,
                            error
                        );
                        tokio::time::sleep(delay).await;
                        self.restart()?;
                        continue;
                    }
                    self.state = CursorState::Failed(error.clone());
                    return Err(error);
                }
            }
        }
    }

    async fn step(&mut self) -> Result<bool> {
        let stream = self.ensure_open().await?;
        let pulled = self.tx.get().pull_stream(self.seq, stream).await?;
        match pulled {
            Pull::Row(values) => {
                let keys = self
                    .keys
                    .clone()
                    .ok_or_else(|| Error::Protocol("row received before header".into()))?;
                let record = self.hydrator.hydrate_row(&keys, values)?;
                self.state = CursorState::OnRecord(record);
                Ok(true)
            }
            Pull::End(metadata) => {
                self.finish(metadata).await?;
                Ok(false)
            }
        }
    }

    async fn ensure_open(&mut self) -> Result<StreamHandle> {
        if let Some(stream) = self.stream {
            return Ok(stream);
        }
        let header = self.tx.get().open_stream(self.seq).await?;
        self.keys = Some(Arc::new(Keys::new(header.fields)?));
        self.stream = Some(header.stream);
        Ok(header.stream)
    }

    async fn finish(&mut self, metadata: crate::transport::WireMap) -> Result<()> {
        self.summary = Some(Summary::from_metadata(&self.statement, metadata)?);
        self.tx.get().stream_finished().await
    }

    fn can_retry(&self, error: &Error, attempt: u32) -> bool {
        let TxRef::Owned(tx) = &self.tx else {
            return false;
        };
        self.retry.is_some()
            && error.is_retryable()
            && self.delivered == 0
            && self.summary.is_none()
            && attempt < tx.config().retry.max_retries
    }

    /// Replace the failed implicit transaction with a fresh one
    fn restart(&mut self) -> Result<()> {
        let (TxRef::Owned(tx), Some(query)) = (&mut self.tx, &self.retry) else {
            return Err(Error::TransactionFinished);
        };
        let mut fresh = Box::new(tx.sibling());
        self.seq = fresh.enqueue(query)?;
        *tx = fresh;
        self.keys = None;
        self.stream = None;
        self.state = CursorState::BeforeFirst;
        Ok(())
    }

    /// The record the cursor is positioned on
    pub fn current(&self) -> Result<&Record> {
        match &self.state {
            CursorState::OnRecord(record) => Ok(record),
            _ => Err(Error::NoCurrentRecord),
        }
    }

    /// Advance and return the new current record, or `None` at the end
    pub async fn next(&mut self) -> Result<Option<Record>> {
        if self.advance().await? {
            Ok(Some(self.current()?.clone()))
        } else {
            Ok(None)
        }
    }

    /// Advance up to `amount` records, returning how many were passed
    pub async fn forward(&mut self, amount: usize) -> Result<usize> {
        let mut moved = 0;
        while moved < amount && self.advance().await? {
            moved += 1;
        }
        Ok(moved)
    }

    /// First value of the next record, or `None` if there is none
    pub async fn evaluate(&mut self) -> Result<Option<Value>> {
        self.evaluate_at(0).await
    }

    /// Value at `index` of the next record, or `None` if there is none
    pub async fn evaluate_at(&mut self, index: usize) -> Result<Option<Value>> {
        if self.advance().await? {
            Ok(Some(self.current()?.value_at(index)?.clone()))
        } else {
            Ok(None)
        }
    }

    /// Value for `key` of the next record, or `None` if there is none
    pub async fn evaluate_key(&mut self, key: &str) -> Result<Option<Value>> {
        if self.advance().await? {
            Ok(Some(self.current()?.value(key)?.clone()))
        } else {
            Ok(None)
        }
    }

    /// Field names; sends the statement if it has not been sent yet
    pub async fn keys(&mut self) -> Result<Vec<String>> {
        if let CursorState::Failed(error) = &self.state {
            return Err(error.clone());
        }
        if self.keys.is_none() && self.summary.is_none() {
            if let Err(error) = self.ensure_open().await {
                self.state = CursorState::Failed(error.clone());
                return Err(error);
            }
        }
        Ok(self
            .keys
            .as_ref()
            .map(|keys| keys.names().to_vec())
            .unwrap_or_default())
    }

    /// Every remaining record
    pub async fn collect(&mut self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        while self.advance().await? {
            records.push(self.current()?.clone());
        }
        Ok(records)
    }

    /// Every remaining record as a key to value map
    pub async fn data(&mut self) -> Result<Vec<BTreeMap<String, Value>>> {
        Ok(self.collect().await?.iter().map(Record::data).collect())
    }

    /// Every remaining record deserialized into `T`
    pub async fn deserialize_all<T: DeserializeOwned>(&mut self) -> Result<Vec<T>> {
        self.collect()
            .await?
            .iter()
            .map(Record::deserialize)
            .collect()
    }

    /// Summary of an exhausted result
    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    /// Skip every remaining record and return the summary
    pub async fn consume(&mut self) -> Result<Summary> {
        match &self.state {
            CursorState::Failed(error) => return Err(error.clone()),
            CursorState::AfterLast => {
                return self
                    .summary
                    .clone()
                    .ok_or_else(|| Error::Protocol("result was closed before it was sent".into()))
            }
            _ => {}
        }
        if let Err(error) = self.discard_rest().await {
            self.state = CursorState::Failed(error.clone());
            return Err(error);
        }
        self.summary
            .clone()
            .ok_or_else(|| Error::Protocol("result ended without a summary".into()))
    }

    async fn discard_rest(&mut self) -> Result<()> {
        let stream = self.ensure_open().await?;
        let metadata = self.tx.get().discard_stream(self.seq, stream).await?;
        self.state = CursorState::AfterLast;
        self.finish(metadata).await
    }

    /// Update counters; consumes the rest of the result
    pub async fn stats(&mut self) -> Result<Counters> {
        Ok(self.consume().await?.counters)
    }

    /// Stop reading. A statement that was never sent is dropped unsent.
    pub async fn close(&mut self) -> Result<()> {
        match self.state {
            CursorState::AfterLast | CursorState::Failed(_) => return Ok(()),
            _ => {}
        }
        if self.stream.is_none() {
            let seq = self.seq;
            let tx = self.tx.get();
            tx.forget(seq);
            self.state = CursorState::AfterLast;
            return tx.stream_finished().await;
        }
        match self.discard_rest().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.state = CursorState::Failed(error.clone());
                Err(error)
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, CursorState::AfterLast)
    }

    /// Number of records delivered so far
    pub fn position(&self) -> u64 {
        self.delivered
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }
}

impl std::fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            CursorState::BeforeFirst => "before-first",
            CursorState::OnRecord(_) => "on-record",
            CursorState::AfterLast => "after-last",
            CursorState::Failed(_) => "failed",
        };
        f.debug_struct("Cursor")
            .field("statement", &self.statement)
            .field("state", &state)
            .field("delivered", &self.delivered)
            .finish()
    }
}
