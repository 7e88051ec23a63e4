pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use schema::{
    GitAuthSettings, GitAuthType, GitOpsSettings, GitSettings, GithubSettings, IlRepoSettings,
    LogFormat, LoggingSettings, OperatorConfig, OperatorSettings, TerraformSettings,
    TrackerSettings,
};
