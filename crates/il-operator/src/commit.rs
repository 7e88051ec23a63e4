//! Staging, change detection, commit and push of generated paths.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::GitOperationError;
use crate::git::{CommitAuthor, GitClient};

/// Paths committed together, or not at all.
#[derive(Debug, Clone)]
pub struct CommitBatch {
    pub paths: Vec<PathBuf>,
    pub message: String,
    pub author: CommitAuthor,
}

impl CommitBatch {
    pub fn new(message: impl Into<String>, author: CommitAuthor) -> Self {
        Self {
            paths: Vec::new(),
            message: message.into(),
            author,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }
}

pub struct CommitPipeline {
    git: Arc<dyn GitClient>,
}

impl CommitPipeline {
    pub fn new(git: Arc<dyn GitClient>) -> Self {
        Self { git }
    }

    /// Commits `batch` in the working copy at `repo` and pushes it to `branch`.
    ///
    /// Returns `false` without committing or pushing when staging the batch
    /// leaves the index identical to the branch head. Push failures are
    /// returned as-is; nothing is retried here.
    pub async fn commit(
        &self,
        repo: &Path,
        batch: &CommitBatch,
        branch: &str,
    ) -> Result<bool, GitOperationError> {
        self.git.stage(repo, &batch.paths).await?;

        let staged = self.git.staged_changes(repo).await?;
        if staged.is_empty() {
            log::info!("No git changes to commit, no-op reconciliation");
            return Ok(false);
        }

        log::debug!("Committing {} changed paths", staged.len());
        let revision = self.git.commit(repo, &batch.message, &batch.author).await?;
        self.git.push(repo, branch).await?;
        log::info!(
            "Pushed {} to {}: {}",
            &revision[..revision.len().min(8)],
            branch,
            batch.message
        );
        Ok(true)
    }
}
