// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Value encoding on the wire
//!
//! Values travel as JSON. Scalars, arrays and objects map directly onto
//! [`Value`](crate::types::Value) (serde_json keeps integers and floats
//! apart). Graph entities and values JSON cannot carry are single-key objects
//! whose key starts with `$`:
//!
//! ```text
//! {"$node": {"id": 1, "labels": ["Person"], "properties": {...}}}
//! {"$relationship": {"id": 7, "type": "KNOWS", "start": 1, "end": 2, "properties": {...}}}
//! {"$path": {"nodes": [...], "relationships": [...]}}
//! {"$map": {...}}                      a map whose only key starts with '$'
//! {"$float": "NaN" | "Infinity" | "-Infinity"}
//! ```
//!
//! Relationship endpoints are either node ids or full `$node` objects.

mod encode;
mod hydrate;

pub use encode::{encode_parameters, encode_value};
pub use hydrate::Hydrator;

pub(crate) const NODE_TAG: &str = "$node";
pub(crate) const RELATIONSHIP_TAG: &str = "$relationship";
pub(crate) const PATH_TAG: &str = "$path";
pub(crate) const MAP_TAG: &str = "$map";
pub(crate) const FLOAT_TAG: &str = "$float";
