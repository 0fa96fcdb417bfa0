// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Connection pool
//!
//! The pool bounds the number of live connections with a semaphore and keeps
//! released connections for reuse. A connection released while a server
//! transaction or stream may still be open is flagged and reset before it is
//! handed out again.

use super::{
    timed, BeginOptions, Connection, Connector, Pull, RunHeader, StreamHandle, TransportError,
    TxToken, WireMap,
};
use crate::address::{Auth, ServiceAddress};
use crate::config::Config;
use crate::error::{Error, GraphError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct IdleConnection {
    connection: Box<dyn Connection>,
    needs_reset: bool,
}

struct PoolInner {
    address: ServiceAddress,
    auth: Option<Auth>,
    connector: Arc<dyn Connector>,
    idle: Mutex<Vec<IdleConnection>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
    operation_timeout: Duration,
    closed: AtomicBool,
    opened: AtomicUsize,
}

/// Shared pool of connections to one service
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(
        address: ServiceAddress,
        auth: Option<Auth>,
        connector: Arc<dyn Connector>,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                address,
                auth,
                connector,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(config.max_connections)),
                acquire_timeout: config.acquire_timeout,
                operation_timeout: config.operation_timeout,
                closed: AtomicBool::new(false),
                opened: AtomicUsize::new(0),
            }),
        }
    }

    pub fn address(&self) -> &ServiceAddress {
        &self.inner.address
    }

    /// Check out a connection, reusing an idle one when possible
    pub async fn acquire(&self) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(Error::closed());
        }

        let permit = match tokio::time::timeout(
            self.inner.acquire_timeout,
            self.inner.permits.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::closed()),
            Err(_) => {
                return Err(Error::Graph(GraphError::transient(
                    "Pool.AcquisitionTimeout",
                    format!(
                        "no connection available within {:?}",
                        self.inner.acquire_timeout
                    ),
                )))
            }
        };

        loop {
            let candidate = self.inner.idle.lock().pop();
            let Some(IdleConnection {
                mut connection,
                needs_reset,
            }) = candidate
            else {
                break;
            };
            if connection.is_defunct() {
                log::debug!("Dropping defunct idle connection to {}", self.inner.address);
                continue;
            }
            if needs_reset {
                if let Err(e) = timed(self.inner.operation_timeout, connection.reset()).await {
                    log::debug!("Reset of idle connection failed, dropping it: {}", e);
                    continue;
                }
            }
            return Ok(PooledConnection::new(connection, self.inner.clone(), permit));
        }

        let connection = timed(
            self.inner.operation_timeout,
            self.inner
                .connector
                .open(&self.inner.address, self.inner.auth.as_ref()),
        )
        .await?;
        let opened = self.inner.opened.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!(
            "Opened connection #{} to {}",
            opened,
            self.inner.address
        );
        Ok(PooledConnection::new(connection, self.inner.clone(), permit))
    }

    /// Drop idle connections and refuse further acquisitions
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.permits.close();
            let dropped = {
                let mut idle = self.inner.idle.lock();
                let count = idle.len();
                idle.clear();
                count
            };
            log::info!(
                "Closed pool for {} ({} idle connections dropped)",
                self.inner.address,
                dropped
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }
}

/// A checked-out connection, returned to the pool on drop
pub struct PooledConnection {
    connection: Option<Box<dyn Connection>>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
    dirty: bool,
    discard: bool,
}

impl PooledConnection {
    fn new(
        connection: Box<dyn Connection>,
        pool: Arc<PoolInner>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            connection: Some(connection),
            pool,
            _permit: permit,
            dirty: false,
            discard: false,
        }
    }

    fn connection(&mut self) -> std::result::Result<&mut Box<dyn Connection>, TransportError> {
        self.connection
            .as_mut()
            .ok_or_else(|| TransportError::Broken("connection already released".into()))
    }

    /// Server-side state may be left behind; reset before reuse
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Close instead of returning to the pool
    pub fn discard(&mut self) {
        self.discard = true;
    }

    pub async fn begin(&mut self, options: &BeginOptions) -> std::result::Result<TxToken, TransportError> {
        let limit = self.pool.operation_timeout;
        self.dirty = true;
        timed(limit, self.connection()?.begin(options)).await
    }

    pub async fn run(
        &mut self,
        tx: &TxToken,
        statement: &str,
        parameters: &WireMap,
    ) -> std::result::Result<RunHeader, TransportError> {
        let limit = self.pool.operation_timeout;
        timed(limit, self.connection()?.run(tx, statement, parameters)).await
    }

    pub async fn pull(&mut self, stream: StreamHandle) -> std::result::Result<Pull, TransportError> {
        let limit = self.pool.operation_timeout;
        timed(limit, self.connection()?.pull(stream)).await
    }

    pub async fn discard_stream(
        &mut self,
        stream: StreamHandle,
    ) -> std::result::Result<WireMap, TransportError> {
        let limit = self.pool.operation_timeout;
        timed(limit, self.connection()?.discard(stream)).await
    }

    pub async fn commit(&mut self, tx: &TxToken) -> std::result::Result<WireMap, TransportError> {
        let limit = self.pool.operation_timeout;
        let metadata = timed(limit, self.connection()?.commit(tx)).await?;
        self.dirty = false;
        Ok(metadata)
    }

    pub async fn rollback(&mut self, tx: &TxToken) -> std::result::Result<(), TransportError> {
        let limit = self.pool.operation_timeout;
        timed(limit, self.connection()?.rollback(tx)).await?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if self.discard || connection.is_defunct() || self.pool.closed.load(Ordering::SeqCst) {
            log::debug!("Closing connection to {}", self.pool.address);
            return;
        }
        self.pool.idle.lock().push(IdleConnection {
            connection,
            needs_reset: self.dirty,
        });
    }
}
