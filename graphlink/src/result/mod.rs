// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Query results: records, cursors and summaries

pub mod cursor;
pub mod record;
pub mod summary;

pub use cursor::Cursor;
pub use record::{Keys, Record};
pub use summary::{Counters, Notification, Summary};
