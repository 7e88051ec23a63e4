//! Test harness for end-to-end reconciles.
//!
//! The `TestHarness` owns everything a reconcile touches:
//! - a bare IL remote on `main`
//! - bare external repositories seeded through `seed_repo`
//! - a mirror directory for external sources
//! - in-memory control plane and source hosting

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use il_operator::config::load_config_from_str;
use il_operator::fakes::{InMemoryControlPlane, InMemorySourceHosting};
use il_operator::git::{CommitAuthor, StagedChange};
use il_operator::{CliGitClient, GitClient, GitOperationError, Operator, OperatorConfig};

pub const WEBHOOK_URL: &str = "https://hooks.example.com/push";

/// Runs `git` in `dir` and returns trimmed stdout. Panics on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(
        dir,
        &[
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
            "commit",
            "--quiet",
            "-m",
            message,
        ],
    );
}

/// Isolated environment for one integration test.
pub struct TestHarness {
    temp_dir: TempDir,
    /// Clone URL of the bare IL remote.
    pub il_url: String,
    /// Root of external source mirrors.
    pub mirror_dir: PathBuf,
    pub control_plane: Arc<InMemoryControlPlane>,
    pub hosting: Arc<InMemorySourceHosting>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_collaborators(InMemoryControlPlane::new(), InMemorySourceHosting::new())
    }

    pub fn with_collaborators(
        control_plane: InMemoryControlPlane,
        hosting: InMemorySourceHosting,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let il_remote = temp_dir.path().join("il.git");
        std::fs::create_dir_all(&il_remote).unwrap();
        git(&il_remote, &["init", "--bare", "--quiet", "--initial-branch=main"]);

        let mirror_dir = temp_dir.path().join("mirrors");
        Self {
            il_url: il_remote.to_string_lossy().into_owned(),
            mirror_dir,
            control_plane: Arc::new(control_plane),
            hosting: Arc::new(hosting),
            temp_dir,
        }
    }

    /// Operator configuration pointing at the harness remotes.
    pub fn config(&self, tracker_enabled: bool) -> OperatorConfig {
        let mut config = load_config_from_str(
            "companyName: acme\nilRepo:\n  name: acme-il\n  url: placeholder\n  sourceOwner: acme\n",
        )
        .expect("Base config should load");
        config.il_repo.url = self.il_url.clone();
        config.git.mirror_dir = Some(self.mirror_dir.clone());
        config.git.network_timeout_secs = 30;
        config.tracker.enabled = tracker_enabled;
        config.gitops.webhook_url = Some(WEBHOOK_URL.to_string());
        config.github.owner = "acme".to_string();
        config
    }

    /// An operator using `git` and the harness collaborators.
    pub fn operator(&self, git: Arc<dyn GitClient>, tracker_enabled: bool) -> Operator {
        Operator::new(
            self.config(tracker_enabled),
            git,
            self.control_plane.clone(),
            self.hosting.clone(),
        )
    }

    /// An operator driving the `git` executable directly.
    pub fn cli_operator(&self) -> Operator {
        self.operator(Arc::new(CliGitClient::default()), true)
    }

    /// Creates a bare repository named `name` holding `files` in one commit
    /// on `main`, and returns its URL.
    pub fn seed_repo(&self, name: &str, files: &[(&str, &str)]) -> String {
        let remote = self.temp_dir.path().join(format!("{}.git", name));
        std::fs::create_dir_all(&remote).unwrap();
        git(&remote, &["init", "--bare", "--quiet", "--initial-branch=main"]);

        let work = TempDir::new().unwrap();
        git(work.path(), &["init", "--quiet", "--initial-branch=main"]);
        for (path, content) in files {
            write_file(work.path(), path, content);
        }
        commit_all(work.path(), "seed");

        let url = remote.to_string_lossy().into_owned();
        git(work.path(), &["push", "--quiet", &url, "main"]);
        url
    }

    /// Pushes a commit that sets `path` to `content` in the repository at `url`.
    pub fn push_file(&self, url: &str, path: &str, content: &str) {
        let work = TempDir::new().unwrap();
        git(work.path(), &["clone", "--quiet", url, "."]);
        write_file(work.path(), path, content);
        commit_all(work.path(), "update");
        git(work.path(), &["push", "--quiet", "origin", "main"]);
    }

    /// Pushes a new branch `branch`, forked from `main`, that sets `path` to
    /// `content`.
    pub fn push_branch(&self, url: &str, branch: &str, path: &str, content: &str) {
        let work = TempDir::new().unwrap();
        git(work.path(), &["clone", "--quiet", url, "."]);
        git(work.path(), &["checkout", "--quiet", "-b", branch]);
        write_file(work.path(), path, content);
        commit_all(work.path(), "branch");
        git(work.path(), &["push", "--quiet", "origin", branch]);
    }

    /// Head of `main` on the IL remote, `None` before the first push.
    pub fn il_head(&self) -> Option<String> {
        let output = Command::new("git")
            .current_dir(&self.il_url)
            .args(["rev-parse", "--verify", "--quiet", "refs/heads/main"])
            .output()
            .expect("Failed to run git");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn il_commit_count(&self) -> usize {
        match self.il_head() {
            Some(_) => git(Path::new(&self.il_url), &["rev-list", "--count", "main"])
                .parse()
                .unwrap(),
            None => 0,
        }
    }

    /// Content of `path` at the head of `main` on the IL remote.
    pub fn il_file(&self, path: &str) -> Option<String> {
        let output = Command::new("git")
            .current_dir(&self.il_url)
            .args(["show", &format!("main:{}", path)])
            .output()
            .expect("Failed to run git");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Every file path under `prefix` at the head of `main`.
    pub fn il_files(&self, prefix: &str) -> Vec<String> {
        if self.il_head().is_none() {
            return Vec::new();
        }
        git(
            Path::new(&self.il_url),
            &["ls-tree", "-r", "--name-only", "main", "--", prefix],
        )
        .lines()
        .map(str::to_string)
        .collect()
    }
}

fn write_file(root: &Path, path: &str, content: &str) {
    let target = root.join(path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(target, content).unwrap();
}

/// Delegates to [`CliGitClient`] and counts mirror syncs, i.e. external
/// repository fetches.
#[derive(Debug, Default)]
pub struct CountingGit {
    inner: CliGitClient,
    syncs: AtomicUsize,
}

impl CountingGit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GitClient for CountingGit {
    async fn remote_revision(
        &self,
        url: &str,
        reference: Option<&str>,
    ) -> Result<String, GitOperationError> {
        self.inner.remote_revision(url, reference).await
    }

    async fn local_revision(&self, dir: &Path) -> Result<Option<String>, GitOperationError> {
        self.inner.local_revision(dir).await
    }

    async fn sync_mirror(
        &self,
        url: &str,
        reference: Option<&str>,
        dir: &Path,
    ) -> Result<String, GitOperationError> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        self.inner.sync_mirror(url, reference, dir).await
    }

    async fn clone_branch(
        &self,
        url: &str,
        branch: &str,
        dir: &Path,
    ) -> Result<(), GitOperationError> {
        self.inner.clone_branch(url, branch, dir).await
    }

    async fn stage(&self, repo: &Path, paths: &[PathBuf]) -> Result<(), GitOperationError> {
        self.inner.stage(repo, paths).await
    }

    async fn staged_changes(&self, repo: &Path) -> Result<Vec<StagedChange>, GitOperationError> {
        self.inner.staged_changes(repo).await
    }

    async fn commit(
        &self,
        repo: &Path,
        message: &str,
        author: &CommitAuthor,
    ) -> Result<String, GitOperationError> {
        self.inner.commit(repo, message, author).await
    }

    async fn push(&self, repo: &Path, branch: &str) -> Result<(), GitOperationError> {
        self.inner.push(repo, branch).await
    }
}
