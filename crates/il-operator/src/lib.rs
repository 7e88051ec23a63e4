pub mod codegen;
pub mod collaborators;
pub mod commit;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fakes;
pub mod git;
pub mod layout;
pub mod logging;
pub mod reconciler;
pub mod resource;
pub mod secrets;
pub mod source;
pub mod storage;
pub mod tfvars;
pub mod tracker;
pub mod workspace;

pub use codegen::{generate_company_artifacts, generate_team_artifacts, GenerationContext};
pub use collaborators::{ClusterInfo, GitOpsControlPlane, SourceHosting};
pub use commit::{CommitBatch, CommitPipeline};
pub use config::{load_config, OperatorConfig};
pub use dispatcher::generate_environment_components;
pub use error::{
    ConfigError, GitOperationError, OperatorError, Result, StorageError, VariableResolutionError,
};
pub use git::{CliGitClient, GitClient};
pub use logging::init_logging;
pub use reconciler::{
    CompanyReconciler, EnvironmentReconciler, Operator, ReconcileOutcome, TeamReconciler,
};
pub use resource::{Company, ComponentKind, Environment, EnvironmentComponent, Team};
pub use secrets::{resolve_secret, SecretError};
pub use tracker::{GitStateRecord, GitStateTracker};
pub use workspace::IlWorkspace;
