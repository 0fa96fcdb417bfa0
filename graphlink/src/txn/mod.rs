// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transaction management
//!
//! - [`state`]: lifecycle bookkeeping (ids, status, timestamps)
//! - [`transaction`]: the client transaction and its statement pipeline
//! - [`operations`]: entity-level create/delete/exists helpers
//! - [`sync`]: merge, pull, push and degree

pub mod operations;
pub mod state;
pub mod sync;
pub mod transaction;

pub use operations::cypher_escape;
pub use state::{AccessMode, TransactionId, TransactionState, TransactionStatus};
pub use transaction::{Transaction, TransactionOptions};
