//! Pure data types for git operations.

use serde::{Deserialize, Serialize};

/// Identity recorded as author and committer of generated commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// `Name <email>`, the form `git commit --author` expects.
    pub fn signature(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

/// A path staged in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedChange {
    /// Path relative to the repository root.
    pub path: String,
    /// Index status code: 'M' (modified), 'A' (added), 'D' (deleted), 'R' (renamed).
    pub status: char,
}
