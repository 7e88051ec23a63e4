use std::path::PathBuf;
use thiserror::Error;

/// Top-level error returned by generation and reconciliation.
///
/// Callers inspect the variant, never the message text. Per-component
/// failures are always wrapped in [`OperatorError::EnvironmentComponent`]
/// so the offending component is known without parsing strings.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("environment component '{component}' failed: {cause}")]
    EnvironmentComponent {
        component: String,
        #[source]
        cause: Box<OperatorError>,
    },

    #[error("invalid environment component type: {0}")]
    InvalidComponentType(String),

    #[error("component '{component}' sets both inline variables and a variables file")]
    ConflictingVariableSources { component: String },

    #[error("component '{component}' is missing required field '{field}'")]
    MissingComponentField {
        component: String,
        field: &'static str,
    },

    #[error("duplicate component name '{0}' in environment")]
    DuplicateComponentName(String),

    #[error("component '{component}' depends on unknown component '{dependency}'")]
    UnknownDependency {
        component: String,
        dependency: String,
    },

    #[error("dependency cycle between components: {}", .components.join(", "))]
    DependencyCycle { components: Vec<String> },

    #[error("invalid {what} name '{name}': {reason}")]
    InvalidName {
        what: &'static str,
        name: String,
        reason: String,
    },

    #[error("variable resolution failed: {0}")]
    VariableResolution(#[from] VariableResolutionError),

    #[error("git operation failed: {0}")]
    Git(#[from] GitOperationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{service} call failed: {message}")]
    Collaborator {
        service: &'static str,
        message: String,
    },

    #[error("{operation} exceeded its deadline of {secs}s")]
    DeadlineExceeded { operation: String, secs: u64 },
}

impl OperatorError {
    /// Wraps `cause` with the name of the component that produced it.
    ///
    /// Already-wrapped errors for the same component are returned as-is so the
    /// chain never repeats the component name.
    pub fn in_component(component: &str, cause: OperatorError) -> Self {
        if cause.component() == Some(component) {
            return cause;
        }
        OperatorError::EnvironmentComponent {
            component: component.to_string(),
            cause: Box::new(cause),
        }
    }

    /// Returns the component name when this error is a per-component failure.
    pub fn component(&self) -> Option<&str> {
        match self {
            OperatorError::EnvironmentComponent { component, .. } => Some(component),
            _ => None,
        }
    }

    /// Returns the innermost non-wrapper cause.
    pub fn root_cause(&self) -> &OperatorError {
        match self {
            OperatorError::EnvironmentComponent { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Returns true if a retry of the whole reconcile is likely to succeed.
    pub fn is_retryable(&self) -> bool {
        match self.root_cause() {
            OperatorError::Git(e) => e.is_retryable(),
            OperatorError::VariableResolution(VariableResolutionError::Fetch { source, .. }) => {
                source.is_retryable()
            }
            OperatorError::DeadlineExceeded { .. } | OperatorError::Collaborator { .. } => true,
            _ => false,
        }
    }
}

/// Failures to produce the variable set of a component.
#[derive(Error, Debug)]
pub enum VariableResolutionError {
    #[error("variables file '{path}' not found in '{repo}'")]
    MissingFile { repo: String, path: String },

    #[error("failed to fetch '{repo}': {source}")]
    Fetch {
        repo: String,
        #[source]
        source: GitOperationError,
    },

    #[error("failed to read variables file '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed variables file '{path}' at line {line}: {reason}")]
    Malformed {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("path '{0}' escapes the repository root")]
    PathTraversal(String),
}

/// Errors raised by the git client.
#[derive(Error, Debug)]
pub enum GitOperationError {
    #[error("git {command} failed: {message}")]
    Command { command: String, message: String },

    #[error("git network error: {0}")]
    Network(String),

    /// The remote refused the update because the branch moved underneath us.
    #[error("git push rejected: {0}")]
    Rejected(String),

    #[error("git authentication failed: {0}")]
    AuthFailed(String),

    #[error("git {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),
}

impl GitOperationError {
    /// Returns true if the error is likely transient and the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GitOperationError::Network(_)
                | GitOperationError::Rejected(_)
                | GitOperationError::Timeout { .. }
        )
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(command: &str, stderr: &str) -> GitOperationError {
    let lower = stderr.to_lowercase();

    if lower.contains("[rejected]")
        || lower.contains("[remote rejected]")
        || lower.contains("updates were rejected")
        || lower.contains("non-fast-forward")
        || lower.contains("failed to update ref")
        || lower.contains("cannot lock ref")
    {
        return GitOperationError::Rejected(stderr.trim().to_string());
    }

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return GitOperationError::Network(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
    {
        return GitOperationError::AuthFailed(stderr.trim().to_string());
    }

    GitOperationError::Command {
        command: command.to_string(),
        message: stderr.trim().to_string(),
    }
}

/// Failure reported by an external service client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to serialize YAML for '{path}': {message}")]
    SerializeYaml { path: PathBuf, message: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Missing required setting '{0}'")]
    Missing(&'static str),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Secret resolution failed: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

pub type Result<T> = std::result::Result<T, OperatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_component_wraps_once() {
        let err = OperatorError::in_component(
            "vpc",
            OperatorError::InvalidComponentType("foo".to_string()),
        );
        let err = OperatorError::in_component("vpc", err);

        assert_eq!(err.component(), Some("vpc"));
        match err {
            OperatorError::EnvironmentComponent { cause, .. } => {
                assert!(matches!(*cause, OperatorError::InvalidComponentType(ref t) if t == "foo"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_root_cause_unwraps_nested_components() {
        let err = OperatorError::in_component(
            "outer",
            OperatorError::in_component(
                "inner",
                OperatorError::VariableResolution(VariableResolutionError::MissingFile {
                    repo: "r".to_string(),
                    path: "p".to_string(),
                }),
            ),
        );
        assert!(matches!(
            err.root_cause(),
            OperatorError::VariableResolution(VariableResolutionError::MissingFile { .. })
        ));
    }

    #[test]
    fn test_classify_git_error() {
        assert!(matches!(
            classify_git_error("fetch", "fatal: Could not resolve host: github.com"),
            GitOperationError::Network(_)
        ));
        assert!(matches!(
            classify_git_error("push", "remote: Permission denied to bot"),
            GitOperationError::AuthFailed(_)
        ));
        assert!(matches!(
            classify_git_error("push", "! [rejected] main -> main (fetch first)"),
            GitOperationError::Rejected(_)
        ));
        assert!(matches!(
            classify_git_error("status", "fatal: pathspec 'x' did not match any files"),
            GitOperationError::Command { .. }
        ));
    }

    #[test]
    fn test_lost_push_race_is_retryable() {
        let stderr = "error: failed to push some refs\n\
                      !\trefs/heads/main:refs/heads/main\t[remote rejected] (cannot lock ref 'refs/heads/main')";
        let err = classify_git_error("push", stderr);
        assert!(matches!(err, GitOperationError::Rejected(_)));
        assert!(err.is_retryable());

        let err = classify_git_error("push", "remote: error: failed to update ref");
        assert!(OperatorError::Git(err).is_retryable());
    }

    #[test]
    fn test_retryable_through_component_wrapper() {
        let err = OperatorError::in_component(
            "db",
            OperatorError::Git(GitOperationError::Timeout {
                command: "fetch".to_string(),
                secs: 5,
            }),
        );
        assert!(err.is_retryable());

        let err = OperatorError::in_component(
            "db",
            OperatorError::InvalidComponentType("foo".to_string()),
        );
        assert!(!err.is_retryable());
    }
}
