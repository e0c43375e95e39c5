//! Integration test suite for docweave
//!
//! End-to-end tests driving the engine through its public API and the `docweave`
//! binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **scoping**: variable slot ordering, ref merging, local vars, laziness
//! - **references**: forward refs, lazy cycle detection, conflicts, depends_on
//! - **filtering**: `is_included` truthiness and the required tag gate
//! - **dynamic**: loop and condition expansion
//! - **data**: data targets and the bundled data sources
//! - **cli**: the `render`, `data` and `validate` commands

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod data;
mod dynamic;
mod filtering;
mod references;
mod scoping;
