// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transport interface
//!
//! The wire protocol itself lives outside this crate. A transport supplies a
//! [`Connector`] that opens [`Connection`]s; everything above this layer
//! (pooling, transactions, cursors) is written against these traits only.
//! [`memory`] provides an in-process implementation.

pub mod memory;
pub mod pool;

pub use pool::{ConnectionPool, PooledConnection};

use crate::address::{Auth, ServiceAddress};
use crate::txn::AccessMode;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// JSON object as carried on the wire (parameters, summaries, metadata)
pub type WireMap = serde_json::Map<String, serde_json::Value>;

/// Server-side transaction handle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxToken(pub String);

/// Server-side result stream handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeginOptions {
    pub access_mode: AccessMode,
    pub autocommit: bool,
    pub database: Option<String>,
}

/// Reply to a `run` request
#[derive(Debug, Clone, PartialEq)]
pub struct RunHeader {
    pub stream: StreamHandle,
    pub fields: Vec<String>,
}

/// One message pulled from a result stream
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    Row(Vec<serde_json::Value>),
    /// End of stream with summary metadata
    End(WireMap),
}

/// Transport-level failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The server processed the request and reported a failure
    #[error("Server failure {code}: {message}")]
    Failure { code: String, message: String },

    /// The request could not be delivered
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The connection broke after the request may have been delivered
    #[error("Connection broken: {0}")]
    Broken(String),

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),
}

/// Opens connections to a service
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        address: &ServiceAddress,
        auth: Option<&Auth>,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

/// A single connection to the service
///
/// A connection carries at most one server transaction at a time and at most
/// one open result stream within it.
#[async_trait]
pub trait Connection: Send {
    async fn begin(&mut self, options: &BeginOptions) -> Result<TxToken, TransportError>;

    async fn run(
        &mut self,
        tx: &TxToken,
        statement: &str,
        parameters: &WireMap,
    ) -> Result<RunHeader, TransportError>;

    async fn pull(&mut self, stream: StreamHandle) -> Result<Pull, TransportError>;

    /// Drop the rest of a stream, returning its summary metadata
    async fn discard(&mut self, stream: StreamHandle) -> Result<WireMap, TransportError>;

    async fn commit(&mut self, tx: &TxToken) -> Result<WireMap, TransportError>;

    async fn rollback(&mut self, tx: &TxToken) -> Result<(), TransportError>;

    /// Return the connection to a clean state, abandoning any open transaction
    async fn reset(&mut self) -> Result<(), TransportError>;

    fn is_defunct(&self) -> bool;
}

/// Bound a transport call by `limit`
pub(crate) async fn timed<T, F>(limit: Duration, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::TimedOut(limit)),
    }
}
