//! Secret resolution from multiple sources.
//!
//! A secret may be given in three ways, checked in this order:
//!
//! 1. **Direct value** - for local development (`value: "ghp_..."`)
//! 2. **File reference** - mounted Kubernetes/Docker secrets (`file: /var/run/secrets/token`)
//! 3. **Env var reference** - (`envVar: GITHUB_AUTH_TOKEN`)

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Where to find a secret. Serialized inside the operator config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Direct value. Stored in plaintext in the config; prefer `file` or `env_var`.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "valueInsecure")]
    pub value: Option<String>,

    /// Path to a file containing the secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Name of an environment variable containing the secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_var: Option<String>,
}

impl SecretRef {
    /// A reference that reads the given environment variable.
    pub fn env(name: impl Into<String>) -> Self {
        Self {
            env_var: Some(name.into()),
            ..Default::default()
        }
    }

    /// Returns true if at least one non-empty source is configured.
    pub fn is_configured(&self) -> bool {
        has_secret_source(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env_var.as_deref(),
        )
    }

    /// Resolves the secret using the process environment.
    pub fn resolve(&self) -> Result<SecretString> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolves the secret with a custom environment lookup.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<SecretString>
    where
        F: Fn(&str) -> Option<String>,
    {
        resolve_secret(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env_var.as_deref(),
            lookup,
        )
    }

    /// Like [`SecretRef::resolve`] but returns `None` when nothing is configured.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NoSourceProvided) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Resolves a secret from the first configured source:
/// direct value, then file contents, then environment variable.
pub fn resolve_secret<F>(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
    lookup: F,
) -> Result<SecretString>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return match fs::read_to_string(&expanded) {
            Ok(content) => Ok(SecretString::from(content.trim().to_string())),
            Err(e) => Err(SecretError::FileReadError {
                path: expanded,
                source: e,
            }),
        };
    }

    if let Some(var_name) = env_var.filter(|n| !n.is_empty()) {
        // Trim whitespace, mounted env values often carry a trailing newline
        return match lookup(var_name) {
            Some(value) => Ok(SecretString::from(value.trim().to_string())),
            None => Err(SecretError::EnvVarNotSet {
                name: var_name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Checks if at least one secret source is configured (non-empty).
pub fn has_secret_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    direct.is_some_and(|s| !s.is_empty())
        || file_path.is_some_and(|s| !s.is_empty())
        || env_var.is_some_and(|s| !s.is_empty())
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
