//! Git operations for the IL repository and external sources.

pub mod auth;
pub mod client;
pub mod parse;
pub mod repository;
pub mod types;

pub use client::{CliGitClient, GitClient};
pub use repository::{GitCommandSettings, GitRepository};
pub use types::*;
