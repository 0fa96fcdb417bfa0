// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction state management
//!
//! This module defines the transaction state and lifecycle bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for a client transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Transaction is open and accepts statements
    Open,
    /// Transaction has been committed successfully
    Committed,
    /// Transaction has been rolled back, explicitly or after a failure
    RolledBack,
    /// Commit was sent but never acknowledged; the outcome is unknown
    Indeterminate,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Open)
    }
}

/// Transaction access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Lifecycle record of a client transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionState {
    pub id: TransactionId,
    pub status: TransactionStatus,
    pub access_mode: AccessMode,
    pub autocommit: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Number of statements accepted by `run`
    pub statement_count: u64,
}

impl TransactionState {
    pub fn new(access_mode: AccessMode, autocommit: bool) -> Self {
        Self {
            id: TransactionId::new(),
            status: TransactionStatus::Open,
            access_mode,
            autocommit,
            start_time: Utc::now(),
            end_time: None,
            statement_count: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Open
    }

    pub fn record_statement(&mut self) -> u64 {
        self.statement_count += 1;
        self.statement_count
    }

    /// Move to a terminal status; the first terminal status sticks
    pub fn finish(&mut self, status: TransactionStatus) {
        if self.is_active() {
            self.status = status;
            self.end_time = Some(Utc::now());
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }
}
