//! Shared test utilities for il-operator integration tests.
//!
//! This module provides:
//! - `TestHarness` with a bare IL remote and seeded external repositories
//! - `CountingGit`, a `GitClient` that counts mirror syncs
//! - Resource builders

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{git, CountingGit, TestHarness, WEBHOOK_URL};
