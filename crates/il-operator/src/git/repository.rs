//! Git repository operations backed by the `git` executable.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use super::auth::build_auth_env;
use super::parse::{format_git_error, is_full_sha, parse_ls_remote, parse_staged_changes};
use super::types::{CommitAuthor, StagedChange};
use crate::config::{GitAuthSettings, GitSettings};
use crate::error::{classify_git_error, GitOperationError};

type Result<T> = std::result::Result<T, GitOperationError>;

/// Settings shared by every git invocation.
#[derive(Debug, Clone)]
pub struct GitCommandSettings {
    pub auth: GitAuthSettings,
    /// Upper bound for any single git command.
    pub timeout: Duration,
}

impl From<&GitSettings> for GitCommandSettings {
    fn from(settings: &GitSettings) -> Self {
        Self {
            auth: settings.auth.clone(),
            timeout: Duration::from_secs(settings.network_timeout_secs),
        }
    }
}

impl Default for GitCommandSettings {
    fn default() -> Self {
        Self::from(&GitSettings::default())
    }
}

/// Whether a command talks to a remote and therefore needs credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Local,
    Network,
}

/// Handle on a local repository path.
pub struct GitRepository {
    repo_path: PathBuf,
    settings: GitCommandSettings,
}

impl GitRepository {
    pub fn new(repo_path: impl Into<PathBuf>, settings: GitCommandSettings) -> Self {
        Self {
            repo_path: repo_path.into(),
            settings,
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Checks if the directory is a git repository.
    pub fn is_git_repo(&self) -> bool {
        self.repo_path.join(".git").exists()
    }

    /// Clones `url` into this handle's path.
    pub async fn clone_from(&self, url: &str) -> Result<()> {
        let target = self.repo_path.to_string_lossy().into_owned();
        let parent = self.repo_path.parent().map(Path::to_path_buf);
        if let Some(parent) = &parent {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(GitOperationError::Spawn)?;
        }
        let output = run_git(
            parent.as_deref(),
            &["clone", "--quiet", "--", url, &target],
            Access::Network,
            &self.settings,
        )
        .await?;
        check("clone", &output)
    }

    /// Commit `HEAD` points at, `None` for a missing repository or unborn branch.
    pub async fn head_revision(&self) -> Result<Option<String>> {
        if !self.is_git_repo() {
            return Ok(None);
        }
        self.rev_parse("HEAD").await
    }

    /// Resolves a revision expression to a commit id, `None` when it does not exist.
    pub async fn rev_parse(&self, expression: &str) -> Result<Option<String>> {
        let spec = format!("{}^{{commit}}", expression);
        let output = self.git(&["rev-parse", "--verify", "--quiet", &spec]).await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    /// Checks out `branch`, tracking `origin/<branch>` when the remote has it.
    ///
    /// When it does not (an empty or new remote), the branch starts unborn
    /// with an empty index.
    pub async fn checkout_branch(&self, branch: &str) -> Result<()> {
        let remote_ref = format!("refs/remotes/origin/{}", branch);
        if self.rev_parse(&remote_ref).await?.is_some() {
            let output = self
                .git(&["checkout", "--quiet", "-B", branch, &remote_ref])
                .await?;
            return check("checkout", &output);
        }

        if self.head_revision().await?.is_none() {
            let head = format!("refs/heads/{}", branch);
            let output = self.git(&["symbolic-ref", "HEAD", &head]).await?;
            return check("symbolic-ref", &output);
        }

        let output = self
            .git(&["checkout", "--quiet", "--orphan", branch])
            .await?;
        check("checkout", &output)?;
        let output = self
            .git(&["rm", "-r", "-f", "--quiet", "--ignore-unmatch", "."])
            .await?;
        check("rm", &output)
    }

    /// Fetches all branches and tags from `origin`, pruning deleted ones.
    pub async fn fetch(&self) -> Result<()> {
        self.ensure_repo()?;
        let output = self
            .network_git(&["fetch", "--quiet", "--prune", "--tags", "--force", "origin"])
            .await?;
        check("fetch", &output)
    }

    /// Points `origin` at `url`.
    pub async fn set_remote(&self, url: &str) -> Result<()> {
        self.ensure_repo()?;
        let output = self.git(&["remote", "set-url", "origin", url]).await?;
        check("remote", &output)
    }

    /// Refreshes `origin/HEAD` from the remote's default branch.
    pub async fn update_remote_head(&self) -> Result<()> {
        let output = self
            .network_git(&["remote", "set-head", "origin", "--auto"])
            .await?;
        check("remote", &output)
    }

    /// Detaches the working tree at `revision`, discarding local changes.
    pub async fn checkout_detached(&self, revision: &str) -> Result<()> {
        let output = self
            .git(&["checkout", "--quiet", "--force", "--detach", revision])
            .await?;
        check("checkout", &output)
    }

    /// Resolves `reference` against the fetched refs of `origin`.
    ///
    /// Branches win over tags; a full commit id resolves to itself.
    /// Without a reference the remote's default branch is used.
    pub async fn resolve_fetched(&self, reference: Option<&str>) -> Result<String> {
        let candidates: Vec<String> = match reference {
            None => vec!["refs/remotes/origin/HEAD".to_string()],
            Some(r) => {
                let mut candidates = vec![
                    format!("refs/remotes/origin/{}", r),
                    format!("refs/tags/{}", r),
                ];
                if is_full_sha(r) {
                    candidates.push(r.to_string());
                }
                candidates
            }
        };

        for candidate in &candidates {
            if let Some(revision) = self.rev_parse(candidate).await? {
                return Ok(revision);
            }
        }

        Err(GitOperationError::Command {
            command: "rev-parse".to_string(),
            message: format!(
                "reference '{}' not found in {}",
                reference.unwrap_or("HEAD"),
                self.repo_path.display()
            ),
        })
    }

    /// Stages additions, modifications and deletions under `paths`.
    ///
    /// Paths that neither exist on disk nor are tracked are skipped, so a
    /// directory that was never generated does not fail the batch.
    pub async fn stage(&self, paths: &[PathBuf]) -> Result<()> {
        self.ensure_repo()?;

        let mut pathspecs = Vec::new();
        for path in paths {
            let relative = self.relative(path);
            if self.repo_path.join(&relative).exists() || self.is_tracked(&relative).await? {
                pathspecs.push(relative);
            }
        }
        if pathspecs.is_empty() {
            return Ok(());
        }

        let mut args = vec!["add", "--all", "--"];
        args.extend(pathspecs.iter().map(String::as_str));
        let output = self.git(&args).await?;
        check("add", &output)
    }

    /// Entries currently staged in the index.
    pub async fn staged_changes(&self) -> Result<Vec<StagedChange>> {
        self.ensure_repo()?;
        let output = self
            .git(&["status", "--porcelain", "--untracked-files=no"])
            .await?;
        check("status", &output)?;
        Ok(parse_staged_changes(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Commits the index and returns the new commit id.
    pub async fn commit(&self, message: &str, author: &CommitAuthor) -> Result<String> {
        self.ensure_repo()?;
        let name = format!("user.name={}", author.name);
        let email = format!("user.email={}", author.email);
        let signature = author.signature();
        let output = self
            .git(&[
                "-c",
                &name,
                "-c",
                &email,
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "--no-verify",
                "--author",
                &signature,
                "-m",
                message,
            ])
            .await?;
        check("commit", &output)?;

        self.head_revision().await?.ok_or_else(|| GitOperationError::Command {
            command: "commit".to_string(),
            message: "HEAD is unborn after commit".to_string(),
        })
    }

    /// Pushes `HEAD` to `branch` on `origin`.
    pub async fn push(&self, branch: &str) -> Result<()> {
        self.ensure_repo()?;
        let refspec = format!("HEAD:refs/heads/{}", branch);
        let output = self
            .network_git(&["push", "--porcelain", "origin", &refspec])
            .await?;
        check("push", &output)
    }

    async fn is_tracked(&self, relative: &str) -> Result<bool> {
        let output = self.git(&["ls-files", "--", relative]).await?;
        check("ls-files", &output)?;
        Ok(!output.stdout.is_empty())
    }

    fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.repo_path).unwrap_or(path);
        let rendered = relative.to_string_lossy();
        if rendered.is_empty() {
            ".".to_string()
        } else {
            rendered.into_owned()
        }
    }

    fn ensure_repo(&self) -> Result<()> {
        if self.is_git_repo() {
            Ok(())
        } else {
            Err(GitOperationError::NotARepository(self.repo_path.clone()))
        }
    }

    async fn git(&self, args: &[&str]) -> Result<Output> {
        run_git(Some(&self.repo_path), args, Access::Local, &self.settings).await
    }

    async fn network_git(&self, args: &[&str]) -> Result<Output> {
        run_git(Some(&self.repo_path), args, Access::Network, &self.settings).await
    }
}

/// Resolves the commit `reference` points at on the remote without cloning.
pub async fn ls_remote(
    url: &str,
    reference: Option<&str>,
    settings: &GitCommandSettings,
) -> Result<String> {
    let output = run_git(
        None,
        &["ls-remote", "--", url],
        Access::Network,
        settings,
    )
    .await?;
    check("ls-remote", &output)?;

    let listing = String::from_utf8_lossy(&output.stdout);
    if let Some(revision) = parse_ls_remote(&listing, reference) {
        return Ok(revision);
    }
    match reference {
        Some(r) if is_full_sha(r) => Ok(r.to_string()),
        _ => Err(GitOperationError::Command {
            command: "ls-remote".to_string(),
            message: format!(
                "reference '{}' not found on '{}'",
                reference.unwrap_or("HEAD"),
                url
            ),
        }),
    }
}

/// Runs git under the configured deadline.
///
/// The child is killed if the deadline passes or the future is dropped.
async fn run_git(
    cwd: Option<&Path>,
    args: &[&str],
    access: Access,
    settings: &GitCommandSettings,
) -> Result<Output> {
    let command_name = args
        .iter()
        .find(|a| !a.starts_with('-') && !a.contains('='))
        .copied()
        .unwrap_or("git")
        .to_string();

    let auth = match access {
        Access::Network => Some(build_auth_env(&settings.auth)?),
        Access::Local => None,
    };

    let mut cmd = Command::new("git");
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    cmd.args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(auth) = &auth {
        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }
    }

    log::trace!("git {}", args.join(" "));
    let result = tokio::time::timeout(settings.timeout, cmd.output()).await;
    // Keep the askpass script until the command has finished
    drop(auth);

    match result {
        Ok(output) => output.map_err(GitOperationError::Spawn),
        Err(_) => Err(GitOperationError::Timeout {
            command: command_name,
            secs: settings.timeout.as_secs(),
        }),
    }
}

fn check(command: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        Ok(())
    } else {
        Err(classify_git_error(command, &format_git_error(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings() -> GitCommandSettings {
        GitCommandSettings {
            auth: GitAuthSettings::default(),
            timeout: Duration::from_secs(30),
        }
    }

    fn git(dir: &Path, args: &[&str]) {
        let output = std::process::Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn bare_remote() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "--bare", "--quiet"]);
        git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
        dir
    }

    fn author() -> CommitAuthor {
        CommitAuthor::new("Test", "test@example.com")
    }

    #[tokio::test]
    async fn test_not_a_repository() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::new(dir.path(), settings());
        assert!(!repo.is_git_repo());
        assert_eq!(repo.head_revision().await.unwrap(), None);
        assert!(matches!(
            repo.staged_changes().await,
            Err(GitOperationError::NotARepository(_))
        ));
    }

    #[tokio::test]
    async fn test_clone_empty_remote_commit_and_push() {
        let remote = bare_remote();
        let work = TempDir::new().unwrap();
        let url = remote.path().to_string_lossy().into_owned();

        let repo = GitRepository::new(work.path().join("il"), settings());
        repo.clone_from(&url).await.unwrap();
        repo.checkout_branch("main").await.unwrap();
        assert_eq!(repo.head_revision().await.unwrap(), None);

        std::fs::write(repo.repo_path().join("a.yaml"), "a: 1\n").unwrap();
        repo.stage(&[repo.repo_path().join("a.yaml")]).await.unwrap();
        let staged = repo.staged_changes().await.unwrap();
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].status, 'A');

        let revision = repo.commit("first", &author()).await.unwrap();
        repo.push("main").await.unwrap();

        assert_eq!(
            ls_remote(&url, Some("main"), &settings()).await.unwrap(),
            revision
        );
    }

    #[tokio::test]
    async fn test_stage_skips_untracked_missing_paths_and_records_deletions() {
        let remote = bare_remote();
        let work = TempDir::new().unwrap();
        let url = remote.path().to_string_lossy().into_owned();

        let repo = GitRepository::new(work.path().join("il"), settings());
        repo.clone_from(&url).await.unwrap();
        repo.checkout_branch("main").await.unwrap();

        std::fs::create_dir_all(repo.repo_path().join("dir")).unwrap();
        std::fs::write(repo.repo_path().join("dir/f.tf"), "x").unwrap();
        repo.stage(&[repo.repo_path().join("dir")]).await.unwrap();
        repo.commit("add", &author()).await.unwrap();

        std::fs::remove_dir_all(repo.repo_path().join("dir")).unwrap();
        repo.stage(&[
            repo.repo_path().join("dir"),
            repo.repo_path().join("never-existed"),
        ])
        .await
        .unwrap();

        let staged = repo.staged_changes().await.unwrap();
        assert_eq!(
            staged,
            vec![StagedChange {
                path: "dir/f.tf".to_string(),
                status: 'D'
            }]
        );
    }

    #[tokio::test]
    async fn test_push_after_remote_moved_is_retryable() {
        let remote = bare_remote();
        let work = TempDir::new().unwrap();
        let url = remote.path().to_string_lossy().into_owned();

        let mut clones = Vec::new();
        for name in ["dev", "prod"] {
            let repo = GitRepository::new(work.path().join(name), settings());
            repo.clone_from(&url).await.unwrap();
            repo.checkout_branch("main").await.unwrap();
            let file = repo.repo_path().join(format!("{}.yaml", name));
            std::fs::write(&file, "a: 1\n").unwrap();
            repo.stage(&[file]).await.unwrap();
            repo.commit(name, &author()).await.unwrap();
            clones.push(repo);
        }

        clones[0].push("main").await.unwrap();
        let err = clones[1].push("main").await.unwrap_err();
        assert!(matches!(err, GitOperationError::Rejected(_)), "{:?}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_ls_remote_missing_reference() {
        let remote = bare_remote();
        let url = remote.path().to_string_lossy().into_owned();
        let err = ls_remote(&url, Some("nope"), &settings()).await.unwrap_err();
        assert!(matches!(err, GitOperationError::Command { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let dir = TempDir::new().unwrap();
        let settings = GitCommandSettings {
            auth: GitAuthSettings::default(),
            timeout: Duration::from_nanos(1),
        };
        let result = run_git(Some(dir.path()), &["--version"], Access::Local, &settings).await;
        // A 1ns deadline almost always elapses first; a finished command is also acceptable
        if let Err(e) = result {
            assert!(matches!(e, GitOperationError::Timeout { .. }));
        }
    }
}
