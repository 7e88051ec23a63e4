//! Local mirrors of external repositories.
//!
//! Every read of a file that lives outside the IL repository goes through
//! [`ExternalSources`]. It is the only place that decides whether a fetch can
//! be skipped: the tracker must have seen the remote revision and the mirror
//! must still be checked out at it. Hit or miss, the file is then read from
//! the mirror the same way.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{GitOperationError, VariableResolutionError};
use crate::git::GitClient;
use crate::resource::ObjectKey;
use crate::tracker::{GitStateRecord, GitStateTracker, TrackerKey};

/// A mirror checked out at a known revision.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub dir: PathBuf,
    pub revision: String,
    /// True when the fetch was skipped.
    pub reused: bool,
}

/// An external file read at a known revision.
#[derive(Debug, Clone)]
pub struct ExternalFile {
    pub path: PathBuf,
    pub revision: String,
    pub content: String,
}

pub struct ExternalSources {
    git: Arc<dyn GitClient>,
    tracker: GitStateTracker,
    mirror_root: PathBuf,
}

impl ExternalSources {
    pub fn new(git: Arc<dyn GitClient>, tracker: GitStateTracker, mirror_root: impl Into<PathBuf>) -> Self {
        Self {
            git,
            tracker,
            mirror_root: mirror_root.into(),
        }
    }

    pub fn tracker(&self) -> &GitStateTracker {
        &self.tracker
    }

    /// Brings the mirror of `key.repo` for `key.object` to the current remote
    /// revision of `key.reference`.
    pub async fn checkout(&self, key: &TrackerKey) -> Result<Checkout, GitOperationError> {
        let reference = key.reference.as_deref();
        let dir = self.mirror_dir(&key.object, &key.repo, reference);
        let remote = self.git.remote_revision(&key.repo, reference).await?;

        let tracked = self
            .tracker
            .lookup(key)
            .is_some_and(|record| record.revision == remote);
        if tracked && self.git.local_revision(&dir).await?.as_deref() == Some(remote.as_str()) {
            log::debug!("{} unchanged at {}, skipping fetch", key.repo, short(&remote));
            return Ok(Checkout {
                dir,
                revision: remote,
                reused: true,
            });
        }

        log::debug!("Syncing {} to {} for {}", key.repo, short(&remote), key.object);
        let revision = self.git.sync_mirror(&key.repo, reference, &dir).await?;
        Ok(Checkout {
            dir,
            revision,
            reused: false,
        })
    }

    /// Reads the file `key.path` of `key.repo` at `key.reference` and records the
    /// observation.
    pub async fn read_file(&self, key: &TrackerKey) -> Result<ExternalFile, VariableResolutionError> {
        let checkout = self
            .checkout(key)
            .await
            .map_err(|source| VariableResolutionError::Fetch {
                repo: key.repo.clone(),
                source,
            })?;

        let path = locate(&checkout.dir, &key.repo, &key.path)?;
        if !path.is_file() {
            return Err(VariableResolutionError::MissingFile {
                repo: key.repo.clone(),
                path: key.path.clone(),
            });
        }
        let bytes = std::fs::read(&path).map_err(|source| VariableResolutionError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let content = String::from_utf8(bytes).map_err(|e| VariableResolutionError::Malformed {
            path: key.path.clone(),
            line: 0,
            reason: format!("not valid UTF-8: {}", e),
        })?;

        self.tracker.update(
            key.clone(),
            GitStateRecord::new(&checkout.revision, digest(content.as_bytes())),
        );
        Ok(ExternalFile {
            path,
            revision: checkout.revision,
            content,
        })
    }

    /// Checks out `key.repo` and returns the location of `key.path` (a file
    /// or directory) inside the mirror.
    ///
    /// The returned path stays valid until the next checkout of the same
    /// repository for the same object.
    pub async fn locate_path(&self, key: &TrackerKey) -> Result<PathBuf, VariableResolutionError> {
        let checkout = self
            .checkout(key)
            .await
            .map_err(|source| VariableResolutionError::Fetch {
                repo: key.repo.clone(),
                source,
            })?;

        let path = locate(&checkout.dir, &key.repo, &key.path)?;
        if !path.exists() {
            return Err(VariableResolutionError::MissingFile {
                repo: key.repo.clone(),
                path: key.path.clone(),
            });
        }

        let digest = digest_tree(&path).map_err(|source| VariableResolutionError::Unreadable {
            path: path.clone(),
            source,
        })?;
        self.tracker
            .update(key.clone(), GitStateRecord::new(&checkout.revision, digest));
        Ok(path)
    }

    /// Mirror location, unique per object, repository and reference.
    fn mirror_dir(&self, object: &ObjectKey, repo: &str, reference: Option<&str>) -> PathBuf {
        let identity = format!("{}\n{}\n{}", object, repo, reference.unwrap_or("HEAD"));
        let hash = digest(identity.as_bytes());
        self.mirror_root
            .join(format!("{}-{}", object.name, &hash[..16]))
    }
}

/// Joins `path` onto the mirror root, refusing anything that leaves it.
pub fn locate(root: &Path, repo: &str, path: &str) -> Result<PathBuf, VariableResolutionError> {
    let relative = Path::new(path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(VariableResolutionError::PathTraversal(path.to_string()));
    }

    if relative.components().any(|c| c.as_os_str() == ".git") {
        return Err(VariableResolutionError::MissingFile {
            repo: repo.to_string(),
            path: path.to_string(),
        });
    }

    let joined = root.join(relative);
    // Symlinks inside the repository must not point outside of it either
    if let (Ok(real_root), Ok(real)) = (root.canonicalize(), joined.canonicalize()) {
        if !real.starts_with(&real_root) {
            return Err(VariableResolutionError::PathTraversal(path.to_string()));
        }
    }
    Ok(joined)
}

/// Hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Digest of a file, or of every file under a directory in path order.
fn digest_tree(path: &Path) -> std::io::Result<String> {
    if path.is_file() {
        return Ok(digest(&std::fs::read(path)?));
    }

    let mut hasher = Sha256::new();
    for entry in WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0]);
        hasher.update(std::fs::read(entry.path())?);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn short(revision: &str) -> &str {
    &revision[..revision.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        for bad in ["../secret", "/etc/passwd", "a/../../b"] {
            assert!(matches!(
                locate(dir.path(), "repo", bad),
                Err(VariableResolutionError::PathTraversal(_))
            ));
        }
        assert_eq!(
            locate(dir.path(), "repo", "./envs/dev.tfvars").unwrap(),
            dir.path().join("./envs/dev.tfvars")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_rejects_symlink_escape() {
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), "x").unwrap();
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret"), dir.path().join("link")).unwrap();

        assert!(matches!(
            locate(dir.path(), "repo", "link"),
            Err(VariableResolutionError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_locate_hides_git_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            locate(dir.path(), "repo", ".git/config"),
            Err(VariableResolutionError::MissingFile { .. })
        ));
    }

    #[test]
    fn test_digest_tree_is_order_stable() {
        let a = TempDir::new().unwrap();
        std::fs::write(a.path().join("b.tf"), "2").unwrap();
        std::fs::write(a.path().join("a.tf"), "1").unwrap();

        let b = TempDir::new().unwrap();
        std::fs::write(b.path().join("a.tf"), "1").unwrap();
        std::fs::write(b.path().join("b.tf"), "2").unwrap();

        assert_eq!(digest_tree(a.path()).unwrap(), digest_tree(b.path()).unwrap());
        std::fs::write(b.path().join("b.tf"), "3").unwrap();
        assert_ne!(digest_tree(a.path()).unwrap(), digest_tree(b.path()).unwrap());
    }
}
