//! In-memory collaborators for tests and local runs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::codegen::apps::Application;
use crate::collaborators::{
    ClusterInfo, CollaboratorResult, GitOpsControlPlane, SecretLocation, SourceHosting,
};
use crate::error::CollaboratorError;

/// Records every call. Unknown clusters get a synthetic endpoint.
#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    repositories: Mutex<BTreeSet<String>>,
    clusters: Mutex<BTreeMap<String, String>>,
    bootstrap_apps: Mutex<BTreeMap<String, Application>>,
    cluster_registrations: Mutex<usize>,
    fail_clusters: bool,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// A control plane whose cluster registration always fails.
    pub fn failing_clusters() -> Self {
        Self {
            fail_clusters: true,
            ..Self::default()
        }
    }

    pub fn with_cluster(self, name: &str, endpoint: &str) -> Self {
        lock(&self.clusters).insert(name.to_string(), endpoint.to_string());
        self
    }

    pub fn repositories(&self) -> Vec<String> {
        lock(&self.repositories).iter().cloned().collect()
    }

    pub fn bootstrap_apps(&self) -> Vec<String> {
        lock(&self.bootstrap_apps).keys().cloned().collect()
    }

    pub fn cluster_registrations(&self) -> usize {
        *lock(&self.cluster_registrations)
    }
}

#[async_trait]
impl GitOpsControlPlane for InMemoryControlPlane {
    async fn register_repository(
        &self,
        repo_url: &str,
        _ssh_secret: &SecretLocation,
    ) -> CollaboratorResult<()> {
        lock(&self.repositories).insert(repo_url.to_string());
        Ok(())
    }

    async fn register_cluster(&self, name: &str) -> CollaboratorResult<ClusterInfo> {
        *lock(&self.cluster_registrations) += 1;
        if self.fail_clusters {
            return Err(CollaboratorError::new(format!(
                "cluster '{}' is not reachable",
                name
            )));
        }
        let endpoint = lock(&self.clusters)
            .entry(name.to_string())
            .or_insert_with(|| format!("https://{}.clusters.local", name))
            .clone();
        Ok(ClusterInfo {
            name: name.to_string(),
            endpoint,
        })
    }

    async fn create_bootstrap_app(&self, app: &Application) -> CollaboratorResult<()> {
        lock(&self.bootstrap_apps)
            .entry(app.name().to_string())
            .or_insert_with(|| app.clone());
        Ok(())
    }
}

/// Records repositories and webhooks. Webhook creation can be made to fail.
#[derive(Debug, Default)]
pub struct InMemorySourceHosting {
    repositories: Mutex<BTreeSet<String>>,
    webhooks: Mutex<BTreeSet<(String, String)>>,
    deny_webhooks: bool,
}

impl InMemorySourceHosting {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that refuses webhook creation, like a service account without
    /// admin rights.
    pub fn denying_webhooks() -> Self {
        Self {
            deny_webhooks: true,
            ..Self::default()
        }
    }

    pub fn repositories(&self) -> Vec<String> {
        lock(&self.repositories).iter().cloned().collect()
    }

    pub fn webhooks(&self) -> Vec<(String, String)> {
        lock(&self.webhooks).iter().cloned().collect()
    }
}

#[async_trait]
impl SourceHosting for InMemorySourceHosting {
    async fn create_repository(&self, owner: &str, name: &str) -> CollaboratorResult<bool> {
        Ok(lock(&self.repositories).insert(format!("{}/{}", owner, name)))
    }

    async fn create_webhook(
        &self,
        repo_url: &str,
        hook_url: &str,
        _secret: Option<&SecretString>,
    ) -> CollaboratorResult<bool> {
        if self.deny_webhooks {
            return Err(CollaboratorError::new("403 Forbidden: admin:repo_hook required"));
        }
        Ok(lock(&self.webhooks).insert((repo_url.to_string(), hook_url.to_string())))
    }
}

/// A poisoned lock only means another test thread panicked; the data is
/// still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
