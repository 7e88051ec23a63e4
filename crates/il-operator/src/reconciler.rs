//! Company, team and environment reconcilers.
//!
//! Each reconcile clones the IL repository into a private workspace,
//! regenerates the resource's artifacts, and commits them in one batch.
//! Reconciles of the same object are serialized; different objects run
//! concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::codegen::{self, GenerationContext};
use crate::collaborators::{self, GitOpsControlPlane, SecretLocation, SourceHosting};
use crate::commit::{CommitBatch, CommitPipeline};
use crate::config::OperatorConfig;
use crate::dispatcher::generate_environment_components;
use crate::error::Result;
use crate::git::{CliGitClient, CommitAuthor, GitClient, GitCommandSettings};
use crate::resource::{Company, Environment, ObjectKey, Team};
use crate::source::ExternalSources;
use crate::tracker::GitStateTracker;
use crate::workspace::IlWorkspace;

/// Result of one reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// True when a commit was pushed.
    pub dirty: bool,
    pub duration: Duration,
}

/// Shared dependencies of all reconcilers. Cloning is cheap.
#[derive(Clone)]
pub struct Operator {
    config: Arc<OperatorConfig>,
    git: Arc<dyn GitClient>,
    sources: Arc<ExternalSources>,
    control_plane: Arc<dyn GitOpsControlPlane>,
    hosting: Arc<dyn SourceHosting>,
    locks: Arc<ObjectLocks>,
}

impl Operator {
    pub fn new(
        config: OperatorConfig,
        git: Arc<dyn GitClient>,
        control_plane: Arc<dyn GitOpsControlPlane>,
        hosting: Arc<dyn SourceHosting>,
    ) -> Self {
        let tracker = GitStateTracker::from_settings(&config.tracker);
        let sources = ExternalSources::new(git.clone(), tracker, config.git.mirror_dir());
        Self {
            config: Arc::new(config),
            git,
            sources: Arc::new(sources),
            control_plane,
            hosting,
            locks: Arc::new(ObjectLocks::default()),
        }
    }

    /// An operator that drives the `git` executable with the configured
    /// credentials and deadline.
    pub fn with_git_cli(
        config: OperatorConfig,
        control_plane: Arc<dyn GitOpsControlPlane>,
        hosting: Arc<dyn SourceHosting>,
    ) -> Self {
        let git = CliGitClient::new(GitCommandSettings::from(&config.git));
        Self::new(config, Arc::new(git), control_plane, hosting)
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    pub fn tracker(&self) -> &GitStateTracker {
        self.sources.tracker()
    }

    /// One-time startup work: register the helm charts repository and hook
    /// the IL repository up to the control plane. Call once before the
    /// first reconcile.
    pub async fn initialize(&self) -> Result<()> {
        log::info!("Running operator init");

        let il_repo = &self.config.il_repo.url;
        self.try_create_webhook(il_repo).await;

        if let Some(helm_charts) = &self.config.helm_charts_repo {
            log::info!("Registering helm chart repo {}", helm_charts);
            self.register_repository(helm_charts).await?;
        }
        Ok(())
    }

    /// Forgets per-object state of a deleted object.
    pub fn forget(&self, object: &ObjectKey) {
        self.tracker().invalidate_object(object);
        self.locks.remove(object);
    }

    pub fn companies(&self) -> CompanyReconciler {
        CompanyReconciler {
            operator: self.clone(),
        }
    }

    pub fn teams(&self) -> TeamReconciler {
        TeamReconciler {
            operator: self.clone(),
        }
    }

    pub fn environments(&self) -> EnvironmentReconciler {
        EnvironmentReconciler {
            operator: self.clone(),
        }
    }

    fn deadline(&self) -> Duration {
        Duration::from_secs(self.config.git.network_timeout_secs)
    }

    fn author(&self) -> CommitAuthor {
        CommitAuthor::new(&self.config.git.user_name, &self.config.git.user_email)
    }

    async fn register_repository(&self, repo_url: &str) -> Result<()> {
        let secret = SecretLocation {
            namespace: self.config.operator.namespace.clone(),
            name: self.config.operator.ssh_secret_name.clone(),
        };
        collaborators::call(
            "argocd",
            "register repository",
            self.deadline(),
            self.control_plane.register_repository(repo_url, &secret),
        )
        .await
    }

    /// Adds the push webhook to `repo_url`. Failures are logged, never returned.
    async fn try_create_webhook(&self, repo_url: &str) {
        let Some(hook_url) = &self.config.gitops.webhook_url else {
            log::debug!("No webhook URL configured, skipping webhook for {}", repo_url);
            return;
        };

        let secret = match self.config.github.webhook_secret.resolve_optional() {
            Ok(secret) => secret,
            Err(e) => {
                log::warn!("Webhook secret unavailable, creating unsigned hook: {}", e);
                None
            }
        };

        let result = collaborators::call(
            "github",
            "create webhook",
            self.deadline(),
            self.hosting.create_webhook(repo_url, hook_url, secret.as_ref()),
        )
        .await;
        match result {
            Ok(true) => log::info!("Created webhook for {}", repo_url),
            Ok(false) => log::debug!("Webhook for {} already exists", repo_url),
            Err(e) => log::error!("Error creating webhook for {}: {}", repo_url, e),
        }
    }

    async fn workspace(&self) -> Result<IlWorkspace> {
        Ok(IlWorkspace::checkout(
            self.git.as_ref(),
            &self.config.il_repo.url,
            &self.config.il_repo.branch,
        )
        .await?)
    }

    async fn commit(&self, workspace: &IlWorkspace, batch: CommitBatch) -> Result<bool> {
        let pipeline = CommitPipeline::new(self.git.clone());
        Ok(pipeline
            .commit(workspace.path(), &batch, workspace.branch())
            .await?)
    }

    /// Runs `work` for `object` under its lock and a tracing span.
    async fn run<F>(&self, kind: &'static str, object: ObjectKey, work: F) -> Result<ReconcileOutcome>
    where
        F: std::future::Future<Output = Result<bool>>,
    {
        let span = tracing::info_span!("reconcile", kind, object = %object);
        async {
            let _guard = self.locks.acquire(&object).await;
            let start = Instant::now();

            let result = work.await;
            let duration = start.elapsed();
            match &result {
                Ok(true) => log::info!("Committed new changes to IL repo ({:?})", duration),
                Ok(false) => log::info!("Reconcile finished without changes ({:?})", duration),
                Err(e) => log::error!(
                    "Reconcile failed after {:?} (retryable: {}): {}",
                    duration,
                    e.is_retryable(),
                    e
                ),
            }
            result.map(|dirty| ReconcileOutcome { dirty, duration })
        }
        .instrument(span)
        .await
    }
}

pub struct CompanyReconciler {
    operator: Operator,
}

impl CompanyReconciler {
    pub async fn reconcile(&self, company: &Company) -> Result<ReconcileOutcome> {
        let op = &self.operator;
        op.run("Company", company.key(), async {
            let config = op.config();
            let name = &company.spec.company_name;
            let company_repo = &company.spec.config_repo.source;

            op.register_repository(company_repo).await?;

            let created = collaborators::call(
                "github",
                "create repository",
                op.deadline(),
                op.hosting
                    .create_repository(&config.github.owner, &config.il_repo.name),
            )
            .await?;
            if created {
                log::info!("Created IL repository {}/{}", config.github.owner, config.il_repo.name);
            }
            op.register_repository(&config.il_repo.url).await?;

            let workspace = op.workspace().await?;
            let (storage, layout) = (workspace.storage(), workspace.layout());
            let ctx = GenerationContext {
                config,
                storage: &storage,
                layout: &layout,
                sources: &op.sources,
                control_plane: op.control_plane.as_ref(),
            };
            let company_dir = codegen::generate_company_artifacts(&ctx, company)?;
            let bootstrap = codegen::generate_bootstrap_apps(&ctx)?;

            let batch = CommitBatch::new(format!("Reconciling company {}", name), op.author())
                .with_path(company_dir)
                .with_path(layout.bootstrap_dir());
            let dirty = op.commit(&workspace, batch).await?;

            for app in &bootstrap {
                collaborators::call(
                    "argocd",
                    "create bootstrap app",
                    op.deadline(),
                    op.control_plane.create_bootstrap_app(app),
                )
                .await?;
            }

            // The git service account may lack permission to add hooks
            op.try_create_webhook(company_repo).await;
            Ok(dirty)
        })
        .await
    }
}

pub struct TeamReconciler {
    operator: Operator,
}

impl TeamReconciler {
    pub async fn reconcile(&self, team: &Team) -> Result<ReconcileOutcome> {
        let op = &self.operator;
        op.run("Team", team.key(), async {
            let team_repo = &team.spec.config_repo.source;
            op.register_repository(team_repo).await?;

            let workspace = op.workspace().await?;
            let (storage, layout) = (workspace.storage(), workspace.layout());
            let ctx = GenerationContext {
                config: op.config(),
                storage: &storage,
                layout: &layout,
                sources: &op.sources,
                control_plane: op.control_plane.as_ref(),
            };
            let written = codegen::generate_team_artifacts(&ctx, team)?;

            let mut batch = CommitBatch::new(
                format!("Reconciling team {}", team.spec.team_name),
                op.author(),
            );
            batch.paths = written;
            let dirty = op.commit(&workspace, batch).await?;

            op.try_create_webhook(team_repo).await;
            Ok(dirty)
        })
        .await
    }
}

pub struct EnvironmentReconciler {
    operator: Operator,
}

impl EnvironmentReconciler {
    pub async fn reconcile(&self, environment: &Environment) -> Result<ReconcileOutcome> {
        let op = &self.operator;
        op.run("Environment", environment.key(), async {
            let spec = &environment.spec;
            let workspace = op.workspace().await?;
            let (storage, layout) = (workspace.storage(), workspace.layout());
            let ctx = GenerationContext {
                config: op.config(),
                storage: &storage,
                layout: &layout,
                sources: &op.sources,
                control_plane: op.control_plane.as_ref(),
            };

            let app = codegen::generate_environment_app(&ctx, environment)?;
            let generation = generate_environment_components(&ctx, environment).await?;
            log::debug!(
                "Generated {} components, pruned {}",
                generation.components.len(),
                generation.pruned.len()
            );

            let batch = CommitBatch::new(
                format!(
                    "Reconciling environment {}/{}",
                    spec.team_name, spec.env_name
                ),
                op.author(),
            )
            .with_path(app)
            .with_path(layout.environment_dir(&spec.team_name, &spec.env_name));
            op.commit(&workspace, batch).await
        })
        .await
    }
}

/// One async mutex per object.
#[derive(Default)]
struct ObjectLocks {
    locks: Mutex<HashMap<ObjectKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ObjectLocks {
    async fn acquire(&self, object: &ObjectKey) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(object.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the lock of `object` unless a reconcile holds or awaits it.
    fn remove(&self, object: &ObjectKey) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if locks
            .get(object)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(object);
        }
    }
}
