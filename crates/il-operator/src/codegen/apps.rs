//! Argo CD `Application` manifests.
//!
//! Every generator is a pure function of a resource and the operator config.
//! Generated names are a kind label followed by the identity parts joined
//! with `.`; identity parts are DNS labels, so a name always splits back into
//! exactly one kind and identity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::OperatorConfig;
use crate::layout::IlLayout;
use crate::resource::{Company, ComponentKind, Environment, EnvironmentComponent, Repo, Team};

pub const APPLICATION_API_VERSION: &str = "argoproj.io/v1alpha1";
pub const APPLICATION_KIND: &str = "Application";
pub const RESOURCES_FINALIZER: &str = "resources-finalizer.argocd.argoproj.io";

pub const COMPANY_BOOTSTRAP: &str = "company-bootstrap";
pub const CONFIG_WATCHER_BOOTSTRAP: &str = "config-watcher-bootstrap";

pub(crate) const LABEL_MODEL: &str = "zlifecycle.com/model";
const LABEL_COMPANY: &str = "zlifecycle.com/company";
pub(crate) const LABEL_TEAM: &str = "zlifecycle.com/team";
pub(crate) const LABEL_ENVIRONMENT: &str = "zlifecycle.com/environment";
const LABEL_COMPONENT: &str = "zlifecycle.com/component";
const ANNOTATION_COMPONENT_TYPE: &str = "zlifecycle.com/component-type";
const ANNOTATION_DEPENDS_ON: &str = "zlifecycle.com/depends-on";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub api_version: String,
    pub kind: String,
    pub metadata: ApplicationMetadata,
    pub spec: ApplicationSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationMetadata {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub project: String,
    pub source: ApplicationSource,
    pub destination: ApplicationDestination,
    pub sync_policy: SyncPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub path: String,
    pub target_revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<DirectorySource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySource {
    pub recurse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDestination {
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    pub automated: AutomatedSync,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomatedSync {
    pub prune: bool,
    pub self_heal: bool,
}

/// Which generator produced an application; the first label of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppKind {
    Company,
    CompanyWatcher,
    Team,
    TeamWatcher,
    Environment,
    Component,
    ComponentApps,
}

impl AppKind {
    pub fn label(self) -> &'static str {
        match self {
            AppKind::Company => "company",
            AppKind::CompanyWatcher => "company-watcher",
            AppKind::Team => "team",
            AppKind::TeamWatcher => "team-watcher",
            AppKind::Environment => "environment",
            AppKind::Component => "component",
            AppKind::ComponentApps => "component-apps",
        }
    }
}

/// Name of a generated application.
pub fn app_name(kind: AppKind, parts: &[&str]) -> String {
    let mut name = kind.label().to_string();
    for part in parts {
        name.push('.');
        name.push_str(part);
    }
    name
}

/// Deploys the team applications and team config watchers of the company.
pub fn company_app(company: &Company, config: &OperatorConfig) -> Application {
    let name = &company.spec.company_name;
    let layout = relative_layout();
    let mut app = il_app(
        app_name(AppKind::Company, &[name]),
        layout.relative(&layout.root().join(crate::layout::TEAM_DIR)),
        Some(DirectorySource {
            recurse: true,
            include: Some("{*/team.yaml,*/config-watcher.yaml}".to_string()),
        }),
        config,
    );
    app.label(LABEL_MODEL, "company").label(LABEL_COMPANY, name);
    app
}

/// Applies the Team resources kept in the company config repository.
pub fn company_config_watcher_app(company: &Company, config: &OperatorConfig) -> Application {
    let name = &company.spec.company_name;
    let mut app = watcher_app(
        app_name(AppKind::CompanyWatcher, &[name]),
        &company.spec.config_repo,
        config,
    );
    app.label(LABEL_MODEL, "config-watcher").label(LABEL_COMPANY, name);
    app
}

/// Deploys the environment applications of a team.
pub fn team_app(team: &Team, config: &OperatorConfig) -> Application {
    let name = &team.spec.team_name;
    let layout = relative_layout();
    let mut app = il_app(
        app_name(AppKind::Team, &[name]),
        layout.relative(&layout.environments_dir(name)),
        Some(DirectorySource {
            recurse: false,
            include: Some("*.yaml".to_string()),
        }),
        config,
    );
    app.label(LABEL_MODEL, "team").label(LABEL_TEAM, name);
    app
}

/// Applies the Environment resources kept in the team config repository.
pub fn team_config_watcher_app(team: &Team, config: &OperatorConfig) -> Application {
    let name = &team.spec.team_name;
    let mut app = watcher_app(
        app_name(AppKind::TeamWatcher, &[name]),
        &team.spec.config_repo,
        config,
    );
    app.label(LABEL_MODEL, "config-watcher").label(LABEL_TEAM, name);
    app
}

/// Deploys the component applications of an environment.
pub fn environment_app(environment: &Environment, config: &OperatorConfig) -> Application {
    let spec = &environment.spec;
    let layout = relative_layout();
    let mut app = il_app(
        app_name(AppKind::Environment, &[&spec.team_name, &spec.env_name]),
        layout.relative(&layout.components_dir(&spec.team_name, &spec.env_name)),
        Some(DirectorySource {
            recurse: false,
            include: Some("*.yaml".to_string()),
        }),
        config,
    );
    app.label(LABEL_MODEL, "environment")
        .label(LABEL_TEAM, &spec.team_name)
        .label(LABEL_ENVIRONMENT, &spec.env_name);
    app
}

/// Application for one environment component, pointing at its generated directory.
pub fn component_app(
    environment: &Environment,
    component: &EnvironmentComponent,
    kind: ComponentKind,
    config: &OperatorConfig,
) -> Application {
    let spec = &environment.spec;
    let layout = relative_layout();
    let dir = match kind {
        ComponentKind::Terraform => {
            layout.terraform_dir(&spec.team_name, &spec.env_name, &component.name)
        }
        ComponentKind::Argocd => layout.apps_dir(&spec.team_name, &spec.env_name, &component.name),
    };

    let mut app = il_app(
        app_name(
            AppKind::Component,
            &[&spec.team_name, &spec.env_name, &component.name],
        ),
        layout.relative(&dir),
        Some(DirectorySource {
            recurse: true,
            include: None,
        }),
        config,
    );
    app.label(LABEL_MODEL, "environment-component")
        .label(LABEL_TEAM, &spec.team_name)
        .label(LABEL_ENVIRONMENT, &spec.env_name)
        .label(LABEL_COMPONENT, &component.name);
    app.metadata
        .annotations
        .insert(ANNOTATION_COMPONENT_TYPE.to_string(), kind.to_string());
    if !component.depends_on.is_empty() {
        app.metadata.annotations.insert(
            ANNOTATION_DEPENDS_ON.to_string(),
            component.depends_on.join(","),
        );
    }
    app
}

/// Child application of an `argocd` component: the workload manifests of
/// `apps`, deployed to the registered cluster at `endpoint`.
pub fn component_apps_app(
    environment: &Environment,
    component: &EnvironmentComponent,
    apps: &Repo,
    endpoint: &str,
    config: &OperatorConfig,
) -> Application {
    let spec = &environment.spec;
    let mut app = Application::new(
        app_name(
            AppKind::ComponentApps,
            &[&spec.team_name, &spec.env_name, &component.name],
        ),
        config,
        ApplicationSource {
            repo_url: apps.source.clone(),
            path: apps.path.clone(),
            target_revision: "HEAD".to_string(),
            directory: Some(DirectorySource {
                recurse: true,
                include: None,
            }),
        },
        ApplicationDestination {
            server: endpoint.to_string(),
            namespace: None,
        },
    );
    app.label(LABEL_MODEL, "environment-component-apps")
        .label(LABEL_TEAM, &spec.team_name)
        .label(LABEL_ENVIRONMENT, &spec.env_name)
        .label(LABEL_COMPONENT, &component.name);
    app
}

/// The shared bootstrap applications, in creation order.
pub fn bootstrap_apps(config: &OperatorConfig) -> Vec<Application> {
    let layout = relative_layout();
    let company_root = layout.relative(&layout.root().join(crate::layout::COMPANY_DIR));
    [
        (COMPANY_BOOTSTRAP, "*/company.yaml"),
        (CONFIG_WATCHER_BOOTSTRAP, "*/config-watcher.yaml"),
    ]
    .into_iter()
    .map(|(name, include)| {
        let mut app = il_app(
            name.to_string(),
            company_root.clone(),
            Some(DirectorySource {
                recurse: true,
                include: Some(include.to_string()),
            }),
            config,
        );
        app.label(LABEL_MODEL, "bootstrap");
        app
    })
    .collect()
}

impl Application {
    fn new(
        name: String,
        config: &OperatorConfig,
        source: ApplicationSource,
        destination: ApplicationDestination,
    ) -> Self {
        Self {
            api_version: APPLICATION_API_VERSION.to_string(),
            kind: APPLICATION_KIND.to_string(),
            metadata: ApplicationMetadata {
                name,
                namespace: config.gitops.namespace.clone(),
                labels: BTreeMap::new(),
                annotations: BTreeMap::new(),
                finalizers: vec![RESOURCES_FINALIZER.to_string()],
            },
            spec: ApplicationSpec {
                project: config.gitops.project.clone(),
                source,
                destination,
                sync_policy: SyncPolicy {
                    automated: AutomatedSync {
                        prune: true,
                        self_heal: true,
                    },
                    sync_options: vec!["CreateNamespace=true".to_string()],
                },
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    fn label(&mut self, key: &str, value: &str) -> &mut Self {
        self.metadata
            .labels
            .insert(key.to_string(), value.to_string());
        self
    }
}

/// Application syncing a path of the IL repository into the operator's cluster.
fn il_app(
    name: String,
    path: String,
    directory: Option<DirectorySource>,
    config: &OperatorConfig,
) -> Application {
    Application::new(
        name,
        config,
        ApplicationSource {
            repo_url: config.il_repo.url.clone(),
            path,
            target_revision: config.il_repo.branch.clone(),
            directory,
        },
        ApplicationDestination {
            server: config.gitops.in_cluster_url.clone(),
            namespace: Some(config.gitops.namespace.clone()),
        },
    )
}

/// Application applying custom resources from a config repository.
fn watcher_app(name: String, repo: &Repo, config: &OperatorConfig) -> Application {
    Application::new(
        name,
        config,
        ApplicationSource {
            repo_url: repo.source.clone(),
            path: repo.path.clone(),
            target_revision: "HEAD".to_string(),
            directory: Some(DirectorySource {
                recurse: true,
                include: None,
            }),
        },
        ApplicationDestination {
            server: config.gitops.in_cluster_url.clone(),
            namespace: Some(config.operator.namespace.clone()),
        },
    )
}

fn relative_layout() -> IlLayout {
    IlLayout::new("")
}
