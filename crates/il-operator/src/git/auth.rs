//! Git authentication handling.

use std::path::PathBuf;

use secrecy::ExposeSecret;

use crate::config::{GitAuthSettings, GitAuthType};
use crate::error::GitOperationError;

/// Escapes a token for safe use in single-quoted shell strings.
pub fn shell_escape_token(token: &str) -> String {
    token.replace('\'', "'\\''")
}

/// Deletes the askpass script when dropped so tokens never outlive the command.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Environment for one authenticated git invocation.
#[derive(Debug)]
pub struct AuthEnv {
    pub env_vars: Vec<(String, String)>,
    /// Must outlive the git command.
    pub _cleanup: AskpassCleanup,
}

impl AuthEnv {
    fn without_credentials() -> Self {
        Self {
            env_vars: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
            _cleanup: AskpassCleanup::empty(),
        }
    }
}

/// Builds the environment that lets a non-interactive git command authenticate.
///
/// Prompts are always disabled so a missing credential fails the command
/// instead of blocking it.
pub fn build_auth_env(auth: &GitAuthSettings) -> Result<AuthEnv, GitOperationError> {
    let mut env = AuthEnv::without_credentials();

    match auth.auth_type {
        GitAuthType::None => Ok(env),
        GitAuthType::Token => {
            let token = auth.token.resolve().map_err(|e| {
                GitOperationError::AuthFailed(format!("Failed to resolve git token: {}", e))
            })?;
            let escaped_token = shell_escape_token(token.expose_secret());

            let askpass_path = std::env::temp_dir()
                .join(format!(".git-askpass-{}.sh", uuid::Uuid::new_v4()));
            let script = format!("#!/bin/sh\necho '{}'\n", escaped_token);
            write_private_script(&askpass_path, &script)?;
            let cleanup = AskpassCleanup::new(askpass_path.clone());

            let askpass = askpass_path
                .to_str()
                .ok_or_else(|| {
                    GitOperationError::AuthFailed(
                        "Temp directory path contains non-UTF8 characters".to_string(),
                    )
                })?
                .to_string();

            env.env_vars.push(("GIT_ASKPASS".to_string(), askpass));
            env._cleanup = cleanup;
            Ok(env)
        }
        GitAuthType::SshKey => {
            let key_path = expand_key_path(&auth.ssh_key_path);
            if !key_path.exists() {
                return Err(GitOperationError::AuthFailed(format!(
                    "SSH key file not found: {}",
                    key_path.display()
                )));
            }

            let escaped = key_path.display().to_string().replace('\'', "'\\''");
            let safe_path = if escaped.starts_with('-') {
                format!("'./{}'", escaped)
            } else {
                format!("'{}'", escaped)
            };

            env.env_vars.push((
                "GIT_SSH_COMMAND".to_string(),
                format!(
                    "ssh -i {} -o StrictHostKeyChecking=accept-new -o BatchMode=yes",
                    safe_path
                ),
            ));
            Ok(env)
        }
    }
}

fn expand_key_path(path: &str) -> PathBuf {
    if path.is_empty() {
        return dirs::home_dir()
            .map(|h| h.join(".ssh").join("id_ed25519"))
            .unwrap_or_else(|| PathBuf::from(".ssh/id_ed25519"));
    }
    if path == "~" {
        return dirs::home_dir().unwrap_or_default();
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

fn write_private_script(path: &std::path::Path, script: &str) -> Result<(), GitOperationError> {
    let io_err = |e: std::io::Error| {
        GitOperationError::AuthFailed(format!("Failed to write askpass script: {}", e))
    };

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o700)
            .open(path)
            .map_err(io_err)?;
        file.write_all(script.as_bytes()).map_err(io_err)?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, script).map_err(io_err)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretRef;

    #[test]
    fn test_auth_env_none_disables_prompt() {
        let auth = build_auth_env(&GitAuthSettings::default()).unwrap();
        assert_eq!(
            auth.env_vars,
            vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]
        );
    }

    #[test]
    fn test_auth_env_token_writes_and_cleans_askpass() {
        let settings = GitAuthSettings {
            auth_type: GitAuthType::Token,
            token: SecretRef {
                value: Some("it's-secret".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let auth = build_auth_env(&settings).unwrap();
        let askpass = auth
            .env_vars
            .iter()
            .find(|(k, _)| k == "GIT_ASKPASS")
            .map(|(_, v)| PathBuf::from(v))
            .unwrap();

        let script = std::fs::read_to_string(&askpass).unwrap();
        assert!(script.contains("it'\\''s-secret"));

        drop(auth);
        assert!(!askpass.exists());
    }

    #[test]
    fn test_auth_env_token_missing_source() {
        let settings = GitAuthSettings {
            auth_type: GitAuthType::Token,
            ..Default::default()
        };
        let err = build_auth_env(&settings).unwrap_err();
        assert!(matches!(err, GitOperationError::AuthFailed(_)));
    }

    #[test]
    fn test_auth_env_ssh_key_not_found() {
        let settings = GitAuthSettings {
            auth_type: GitAuthType::SshKey,
            ssh_key_path: "/nonexistent/path/id_rsa".to_string(),
            ..Default::default()
        };
        let err = build_auth_env(&settings).unwrap_err().to_string();
        assert!(err.contains("SSH key file not found"));
    }

    #[test]
    fn test_shell_escape_token() {
        assert_eq!(shell_escape_token("simple"), "simple");
        assert_eq!(shell_escape_token("a'b'c"), "a'\\''b'\\''c");
    }
}
