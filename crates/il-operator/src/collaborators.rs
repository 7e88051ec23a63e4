//! External services the reconcilers call: the GitOps control plane and the
//! source hosting provider.
//!
//! Only the interfaces live here. HTTP clients for Argo CD and GitHub are
//! provided by the embedding controller; [`crate::fakes`] has in-memory
//! versions.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::codegen::apps::Application;
use crate::error::{CollaboratorError, OperatorError, Result};

pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// A Kubernetes secret by namespace and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretLocation {
    pub namespace: String,
    pub name: String,
}

/// A cluster known to the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    /// API server URL used as application destination.
    pub endpoint: String,
}

#[async_trait]
pub trait GitOpsControlPlane: Send + Sync {
    /// Registers `repo_url` with the credentials in `ssh_secret`. Registering
    /// an already known repository succeeds.
    async fn register_repository(
        &self,
        repo_url: &str,
        ssh_secret: &SecretLocation,
    ) -> CollaboratorResult<()>;

    /// Registers the cluster named `name`, or looks it up if already known.
    async fn register_cluster(&self, name: &str) -> CollaboratorResult<ClusterInfo>;

    /// Creates `app`, or leaves an existing application of that name alone.
    async fn create_bootstrap_app(&self, app: &Application) -> CollaboratorResult<()>;
}

#[async_trait]
pub trait SourceHosting: Send + Sync {
    /// Creates `owner/name`. Returns false if it already existed.
    async fn create_repository(&self, owner: &str, name: &str) -> CollaboratorResult<bool>;

    /// Adds a push webhook to `repo_url`. Returns false if an identical
    /// hook already existed.
    async fn create_webhook(
        &self,
        repo_url: &str,
        hook_url: &str,
        secret: Option<&SecretString>,
    ) -> CollaboratorResult<bool>;
}

/// Awaits a collaborator call under `deadline`.
///
/// Timeouts become [`OperatorError::DeadlineExceeded`]; service failures become
/// [`OperatorError::Collaborator`] tagged with `service`.
pub async fn call<T, F>(service: &'static str, operation: &str, deadline: Duration, fut: F) -> Result<T>
where
    F: Future<Output = CollaboratorResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(OperatorError::Collaborator {
            service,
            message: format!("{}: {}", operation, e),
        }),
        Err(_) => Err(OperatorError::DeadlineExceeded {
            operation: format!("{} {}", service, operation),
            secs: deadline.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_maps_failure() {
        let result: Result<()> = call("argocd", "register cluster", Duration::from_secs(1), async {
            Err(CollaboratorError::new("boom"))
        })
        .await;
        match result {
            Err(OperatorError::Collaborator { service, message }) => {
                assert_eq!(service, "argocd");
                assert_eq!(message, "register cluster: boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_call_enforces_deadline() {
        let result: Result<()> = call("github", "create webhook", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(OperatorError::DeadlineExceeded { .. })));
        assert!(result.unwrap_err().is_retryable());
    }
}
