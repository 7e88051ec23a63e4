//! Per-reconcile clone of the IL repository.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::GitOperationError;
use crate::git::GitClient;
use crate::layout::IlLayout;
use crate::storage::FileStorage;

/// A private working copy of the IL repository.
///
/// The clone lives in a temporary directory that is removed when the
/// workspace is dropped, whether the reconcile succeeded, failed or was
/// cancelled.
pub struct IlWorkspace {
    _temp: TempDir,
    root: PathBuf,
    branch: String,
}

impl IlWorkspace {
    /// Clones `repo_url` with `branch` checked out.
    pub async fn checkout(
        git: &dyn GitClient,
        repo_url: &str,
        branch: &str,
    ) -> Result<Self, GitOperationError> {
        let temp = tempfile::Builder::new()
            .prefix("il-")
            .tempdir()
            .map_err(GitOperationError::Spawn)?;
        let root = temp.path().join("repo");

        log::debug!("Cloning IL repository {} ({}) into {}", repo_url, branch, root.display());
        git.clone_branch(repo_url, branch, &root).await?;

        Ok(Self {
            _temp: temp,
            root,
            branch: branch.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn layout(&self) -> IlLayout {
        IlLayout::new(&self.root)
    }

    pub fn storage(&self) -> FileStorage {
        FileStorage::new(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::CliGitClient;

    #[tokio::test]
    async fn test_workspace_removed_on_drop() {
        let remote = TempDir::new().unwrap();
        let status = std::process::Command::new("git")
            .current_dir(remote.path())
            .args(["init", "--bare", "--quiet"])
            .status()
            .unwrap();
        assert!(status.success());

        let client = CliGitClient::default();
        let url = remote.path().to_string_lossy().into_owned();
        let workspace = IlWorkspace::checkout(&client, &url, "main").await.unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.join(".git").exists());
        assert_eq!(workspace.branch(), "main");

        drop(workspace);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_clone_leaves_nothing() {
        let client = CliGitClient::default();
        let missing = TempDir::new().unwrap().path().join("nope");
        let result =
            IlWorkspace::checkout(&client, &missing.to_string_lossy(), "main").await;
        assert!(result.is_err());
    }
}
