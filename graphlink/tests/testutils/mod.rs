//! Test utilities for graphlink integration tests
//!
//! - GraphFixture: a Graph wired to an in-process MemoryServer, with a small
//!   entity store behind the statements the client generates itself

pub mod fixture;
