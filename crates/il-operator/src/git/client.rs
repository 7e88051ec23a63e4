//! The git collaborator seam.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::repository::{ls_remote, GitCommandSettings, GitRepository};
use super::types::{CommitAuthor, StagedChange};
use crate::error::GitOperationError;

type Result<T> = std::result::Result<T, GitOperationError>;

/// Git operations the engine depends on.
///
/// Every method is bounded by the implementation's deadline; dropping the
/// returned future aborts the underlying operation.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Commit `reference` (branch, tag or commit id) points at on the remote.
    /// The remote's default branch when `reference` is `None`.
    async fn remote_revision(&self, url: &str, reference: Option<&str>) -> Result<String>;

    /// Commit checked out in `dir`, `None` if `dir` is not a repository yet.
    async fn local_revision(&self, dir: &Path) -> Result<Option<String>>;

    /// Clones or fetches `url` into `dir` and detaches it at `reference`.
    /// Returns the checked-out revision.
    async fn sync_mirror(&self, url: &str, reference: Option<&str>, dir: &Path) -> Result<String>;

    /// Clones `url` into `dir` with `branch` checked out. An empty remote
    /// yields an unborn `branch`.
    async fn clone_branch(&self, url: &str, branch: &str, dir: &Path) -> Result<()>;

    /// Stages additions, modifications and deletions under `paths`.
    async fn stage(&self, repo: &Path, paths: &[PathBuf]) -> Result<()>;

    async fn staged_changes(&self, repo: &Path) -> Result<Vec<StagedChange>>;

    /// Commits the index and returns the new revision.
    async fn commit(&self, repo: &Path, message: &str, author: &CommitAuthor) -> Result<String>;

    async fn push(&self, repo: &Path, branch: &str) -> Result<()>;
}

/// [`GitClient`] that drives the `git` executable.
#[derive(Debug, Clone, Default)]
pub struct CliGitClient {
    settings: GitCommandSettings,
}

impl CliGitClient {
    pub fn new(settings: GitCommandSettings) -> Self {
        Self { settings }
    }

    fn open(&self, dir: &Path) -> GitRepository {
        GitRepository::new(dir, self.settings.clone())
    }
}

#[async_trait]
impl GitClient for CliGitClient {
    async fn remote_revision(&self, url: &str, reference: Option<&str>) -> Result<String> {
        ls_remote(url, reference, &self.settings).await
    }

    async fn local_revision(&self, dir: &Path) -> Result<Option<String>> {
        self.open(dir).head_revision().await
    }

    async fn sync_mirror(&self, url: &str, reference: Option<&str>, dir: &Path) -> Result<String> {
        let repo = self.open(dir);

        if repo.is_git_repo() {
            log::debug!("Fetching {} into {}", url, dir.display());
            repo.set_remote(url).await?;
            repo.fetch().await?;
            if reference.is_none() {
                repo.update_remote_head().await?;
            }
        } else {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(GitOperationError::Spawn(e)),
            }
            log::debug!("Cloning {} into {}", url, dir.display());
            repo.clone_from(url).await?;
        }

        let revision = repo.resolve_fetched(reference).await?;
        repo.checkout_detached(&revision).await?;
        Ok(revision)
    }

    async fn clone_branch(&self, url: &str, branch: &str, dir: &Path) -> Result<()> {
        let repo = self.open(dir);
        repo.clone_from(url).await?;
        repo.checkout_branch(branch).await
    }

    async fn stage(&self, repo: &Path, paths: &[PathBuf]) -> Result<()> {
        self.open(repo).stage(paths).await
    }

    async fn staged_changes(&self, repo: &Path) -> Result<Vec<StagedChange>> {
        self.open(repo).staged_changes().await
    }

    async fn commit(&self, repo: &Path, message: &str, author: &CommitAuthor) -> Result<String> {
        self.open(repo).commit(message, author).await
    }

    async fn push(&self, repo: &Path, branch: &str) -> Result<()> {
        self.open(repo).push(branch).await
    }
}
