use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::secrets::SecretRef;

/// Operator configuration.
///
/// Built once at startup (see [`crate::config::load_config`] and
/// [`OperatorConfig::from_env`]) and passed by reference to every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    pub company_name: String,

    pub il_repo: IlRepoSettings,

    #[serde(default)]
    pub operator: OperatorSettings,

    #[serde(default)]
    pub git: GitSettings,

    #[serde(default)]
    pub gitops: GitOpsSettings,

    #[serde(default)]
    pub github: GithubSettings,

    #[serde(default)]
    pub terraform: TerraformSettings,

    /// Helm charts repository registered with the GitOps control plane at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_charts_repo: Option<String>,

    #[serde(default)]
    pub tracker: TrackerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// The managed Infrastructure Lifecycle repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IlRepoSettings {
    /// Repository name on the source host.
    pub name: String,

    /// Clone URL.
    pub url: String,

    /// Owner (organization or user) of the repository on the source host.
    pub source_owner: String,

    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSettings {
    #[serde(default = "default_operator_namespace")]
    pub namespace: String,

    /// Name of the secret holding the SSH key used to register repositories.
    #[serde(default = "default_ssh_secret")]
    pub ssh_secret_name: String,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            namespace: default_operator_namespace(),
            ssh_secret_name: default_ssh_secret(),
        }
    }
}

/// Git client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSettings {
    #[serde(default)]
    pub auth: GitAuthSettings,

    /// Commit author name.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Commit author email.
    #[serde(default = "default_user_email")]
    pub user_email: String,

    /// Deadline for every network-bound git command, in seconds.
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,

    /// Where external repository mirrors live. Platform cache dir when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_dir: Option<PathBuf>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            auth: GitAuthSettings::default(),
            user_name: default_user_name(),
            user_email: default_user_email(),
            network_timeout_secs: default_network_timeout(),
            mirror_dir: None,
        }
    }
}

impl GitSettings {
    pub fn mirror_dir(&self) -> PathBuf {
        self.mirror_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("il-operator")
                .join("mirrors")
        })
    }
}

/// Git authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitAuthSettings {
    #[serde(default, rename = "type")]
    pub auth_type: GitAuthType,

    /// Token for HTTPS remotes.
    #[serde(default)]
    pub token: SecretRef,

    /// Path to SSH key file.
    #[serde(default)]
    pub ssh_key_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GitAuthType {
    #[default]
    None,
    Token,
    SshKey,
}

/// GitOps control plane (Argo CD) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsSettings {
    #[serde(default = "default_argocd_url")]
    pub server_url: String,

    /// Webhook endpoint source repositories notify on push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: SecretRef,

    /// Namespace Application manifests are created in.
    #[serde(default = "default_argocd_namespace")]
    pub namespace: String,

    #[serde(default = "default_project")]
    pub project: String,

    /// Namespace the environment workflows are submitted to.
    #[serde(default = "default_argocd_namespace")]
    pub workflows_namespace: String,

    /// API server of the cluster the operator runs in.
    #[serde(default = "default_k8s_api_url")]
    pub in_cluster_url: String,
}

impl Default for GitOpsSettings {
    fn default() -> Self {
        Self {
            server_url: default_argocd_url(),
            webhook_url: None,
            username: String::new(),
            password: SecretRef::default(),
            namespace: default_argocd_namespace(),
            project: default_project(),
            workflows_namespace: default_argocd_namespace(),
            in_cluster_url: default_k8s_api_url(),
        }
    }
}

/// Source hosting (GitHub) settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubSettings {
    #[serde(default)]
    pub token: SecretRef,

    #[serde(default)]
    pub webhook_secret: SecretRef,

    #[serde(default)]
    pub org: String,

    /// Owner the IL repository is created under.
    #[serde(default = "default_owner")]
    pub owner: String,
}

/// Values rendered into every generated Terraform backend and provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerraformSettings {
    #[serde(default = "default_state_bucket")]
    pub state_bucket: String,

    #[serde(default = "default_lock_table")]
    pub lock_table: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_required_version")]
    pub required_version: String,
}

impl Default for TerraformSettings {
    fn default() -> Self {
        Self {
            state_bucket: default_state_bucket(),
            lock_table: default_lock_table(),
            region: default_region(),
            required_version: default_required_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSettings {
    /// Disabling the tracker only costs extra fetches.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_tracker_capacity")]
    pub capacity: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_tracker_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    /// `EnvFilter` directive, e.g. `info` or `il_operator=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

pub(crate) fn default_branch() -> String {
    "main".to_string()
}

fn default_operator_namespace() -> String {
    "zlifecycle-il-operator-system".to_string()
}

pub(crate) fn default_ssh_secret() -> String {
    "zlifecycle-operator-ssh".to_string()
}

fn default_user_name() -> String {
    "zLifecycle".to_string()
}

fn default_user_email() -> String {
    "zLifecycle@compuzest.com".to_string()
}

fn default_network_timeout() -> u64 {
    120
}

pub(crate) fn default_argocd_url() -> String {
    "http://argocd-server.argocd.svc.cluster.local".to_string()
}

fn default_argocd_namespace() -> String {
    "argocd".to_string()
}

fn default_project() -> String {
    "default".to_string()
}

fn default_k8s_api_url() -> String {
    "https://kubernetes.default.svc".to_string()
}

pub(crate) fn default_owner() -> String {
    "zlifecycle-il".to_string()
}

fn default_state_bucket() -> String {
    "zlifecycle-tfstate".to_string()
}

fn default_lock_table() -> String {
    "zlifecycle-tflock".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_required_version() -> String {
    ">= 0.13".to_string()
}

fn default_true() -> bool {
    true
}

fn default_tracker_capacity() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}
