use std::path::{Path, PathBuf};

use crate::config::schema::*;
use crate::error::ConfigError;
use crate::secrets::SecretRef;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<OperatorConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<OperatorConfig, ConfigError> {
    let config: OperatorConfig = serde_yaml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

impl OperatorConfig {
    /// Builds the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let network_timeout_secs = match get("GIT_NETWORK_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "GIT_NETWORK_TIMEOUT_SECS",
                reason: format!("{}", e),
            })?,
            None => GitSettings::default().network_timeout_secs,
        };

        let tracker_enabled = match get("GIT_STATE_TRACKER_ENABLED") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "GIT_STATE_TRACKER_ENABLED",
                reason: format!("{}", e),
            })?,
            None => true,
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "LOG_FORMAT",
                    reason: format!("expected 'json' or 'pretty', got '{}'", other),
                })
            }
        };

        let config = OperatorConfig {
            company_name: require("companyName")?,
            il_repo: IlRepoSettings {
                name: require("ilRepoName")?,
                url: require("ilRepo")?,
                source_owner: require("ilRepoSourceOwner")?,
                branch: get("IL_REPO_BRANCH").unwrap_or_else(default_branch),
            },
            operator: OperatorSettings {
                namespace: require("ZLIFECYCLE_OPERATOR_NAMESPACE")?,
                ssh_secret_name: get("ZLIFECYCLE_MASTER_SSH").unwrap_or_else(default_ssh_secret),
            },
            git: GitSettings {
                network_timeout_secs,
                mirror_dir: get("GIT_MIRROR_DIR").map(PathBuf::from),
                ..GitSettings::default()
            },
            gitops: GitOpsSettings {
                server_url: get("ARGOCD_URL").unwrap_or_else(default_argocd_url),
                webhook_url: get("ARGOCD_WEBHOOK_URL"),
                username: get("ARGOCD_USERNAME").unwrap_or_default(),
                password: SecretRef::env("ARGOCD_PASSWORD"),
                workflows_namespace: get("ARGO_WORKFLOWS_NAMESPACE")
                    .unwrap_or_else(|| GitOpsSettings::default().workflows_namespace),
                ..GitOpsSettings::default()
            },
            github: GithubSettings {
                token: SecretRef::env("GITHUB_AUTH_TOKEN"),
                webhook_secret: SecretRef::env("GITHUB_WEBHOOK_SECRET"),
                org: get("GITHUB_ORG").unwrap_or_default(),
                owner: get("GITHUB_ZLIFECYCLE_OWNER").unwrap_or_else(default_owner),
            },
            terraform: TerraformSettings {
                state_bucket: get("TF_STATE_BUCKET")
                    .unwrap_or_else(|| TerraformSettings::default().state_bucket),
                lock_table: get("TF_LOCK_TABLE")
                    .unwrap_or_else(|| TerraformSettings::default().lock_table),
                region: get("AWS_REGION").unwrap_or_else(|| TerraformSettings::default().region),
                ..TerraformSettings::default()
            },
            helm_charts_repo: get("helmChartsRepo"),
            tracker: TrackerSettings {
                enabled: tracker_enabled,
                ..TrackerSettings::default()
            },
            logging: LoggingSettings {
                level: get("RUST_LOG").unwrap_or_else(|| LoggingSettings::default().level),
                format: log_format,
            },
        };

        validate_config(&config)?;
        Ok(config)
    }
}

fn validate_config(config: &OperatorConfig) -> Result<(), ConfigError> {
    crate::resource::validate_name("company", &config.company_name).map_err(|e| {
        ConfigError::InvalidValue {
            key: "companyName",
            reason: e.to_string(),
        }
    })?;

    if config.il_repo.url.trim().is_empty() {
        return Err(ConfigError::Missing("ilRepo.url"));
    }

    if config.il_repo.branch.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "IL repository branch must not be empty".to_string(),
        });
    }

    if config.git.network_timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "git.networkTimeoutSecs",
            reason: "must be greater than zero".to_string(),
        });
    }

    if config.tracker.capacity == 0 {
        return Err(ConfigError::InvalidValue {
            key: "tracker.capacity",
            reason: "must be greater than zero".to_string(),
        });
    }

    if config.git.auth.auth_type == GitAuthType::Token && !config.git.auth.token.is_configured() {
        return Err(ConfigError::Validation {
            message: "git auth type 'token' requires a token source".to_string(),
        });
    }

    Ok(())
}
