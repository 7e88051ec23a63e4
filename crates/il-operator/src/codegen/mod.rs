//! Artifact generation into an IL working copy.

pub mod apps;
pub mod overlay;
pub mod terraform;
pub mod workflow;

use std::path::PathBuf;
use std::time::Duration;

use crate::collaborators::GitOpsControlPlane;
use crate::config::OperatorConfig;
use crate::error::Result;
use crate::layout::{manifest_file, IlLayout};
use crate::resource::{validate_name, Company, Environment, Team};
use crate::source::ExternalSources;
use crate::storage::FileStorage;

pub const CONFIG_WATCHER_FILE: &str = "config-watcher.yaml";

/// What a generator needs to write into one IL working copy.
pub struct GenerationContext<'a> {
    pub config: &'a OperatorConfig,
    pub storage: &'a FileStorage,
    pub layout: &'a IlLayout,
    pub sources: &'a ExternalSources,
    pub control_plane: &'a dyn GitOpsControlPlane,
}

impl GenerationContext<'_> {
    /// Deadline for a single collaborator call.
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.config.git.network_timeout_secs)
    }
}

/// Writes the company application and its config watcher.
///
/// Returns the company directory.
pub fn generate_company_artifacts(ctx: &GenerationContext<'_>, company: &Company) -> Result<PathBuf> {
    let name = &company.spec.company_name;
    validate_name("company", name)?;

    let dir = ctx.layout.company_dir(name);
    ctx.storage
        .save_yaml(&dir, "company.yaml", &apps::company_app(company, ctx.config))?;
    ctx.storage.save_yaml(
        &dir,
        CONFIG_WATCHER_FILE,
        &apps::company_config_watcher_app(company, ctx.config),
    )?;
    log::info!("Generated company artifacts for {}", name);
    Ok(dir)
}

/// Writes the team application and its config watcher.
///
/// Returns the files written; the team's environments are left alone.
pub fn generate_team_artifacts(ctx: &GenerationContext<'_>, team: &Team) -> Result<Vec<PathBuf>> {
    let name = &team.spec.team_name;
    validate_name("team", name)?;

    let dir = ctx.layout.team_dir(name);
    let written = vec![
        ctx.storage
            .save_yaml(&dir, "team.yaml", &apps::team_app(team, ctx.config))?,
        ctx.storage.save_yaml(
            &dir,
            CONFIG_WATCHER_FILE,
            &apps::team_config_watcher_app(team, ctx.config),
        )?,
    ];
    log::info!("Generated team artifacts for {}", name);
    Ok(written)
}

/// Writes `environments/<env>.yaml` for the environment.
pub fn generate_environment_app(
    ctx: &GenerationContext<'_>,
    environment: &Environment,
) -> Result<PathBuf> {
    let spec = &environment.spec;
    Ok(ctx.storage.save_yaml(
        &ctx.layout.environments_dir(&spec.team_name),
        &manifest_file(&spec.env_name),
        &apps::environment_app(environment, ctx.config),
    )?)
}

/// Writes the shared bootstrap applications and returns them.
pub fn generate_bootstrap_apps(ctx: &GenerationContext<'_>) -> Result<Vec<apps::Application>> {
    let bootstrap = apps::bootstrap_apps(ctx.config);
    let dir = ctx.layout.bootstrap_dir();
    for app in &bootstrap {
        ctx.storage.save_yaml(&dir, &manifest_file(app.name()), app)?;
    }
    Ok(bootstrap)
}
