//! Routes each environment component to its generator.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::codegen::{apps, terraform, workflow, GenerationContext};
use crate::collaborators;
use crate::error::{OperatorError, Result};
use crate::layout::{manifest_file, WORKFLOW_MANIFEST};
use crate::resource::{ComponentKind, Environment, EnvironmentComponent};

/// Paths touched by one environment pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentGeneration {
    /// Generated component directories, in declaration order.
    pub components: Vec<PathBuf>,
    /// The environment workflow manifest.
    pub workflow: PathBuf,
    /// Files and directories removed because their component is gone.
    pub pruned: Vec<PathBuf>,
}

/// Generates every component of `environment`, in declaration order.
///
/// Dependencies are checked before anything is written. The first failing
/// component aborts the pass; files already written for earlier components
/// stay on disk. The workflow is written and undeclared component directories
/// are pruned only once every component succeeded.
pub async fn generate_environment_components(
    ctx: &GenerationContext<'_>,
    environment: &Environment,
) -> Result<EnvironmentGeneration> {
    let spec = &environment.spec;
    spec.validate()?;
    workflow::execution_order(&spec.components)?;

    let mut generation = EnvironmentGeneration::default();
    for component in &spec.components {
        let dir = generate_component(ctx, environment, component)
            .await
            .map_err(|e| OperatorError::in_component(&component.name, e))?;
        generation.components.push(dir);
    }

    generation.workflow = ctx.storage.save_yaml(
        &ctx.layout.components_dir(&spec.team_name, &spec.env_name),
        &manifest_file(WORKFLOW_MANIFEST),
        &workflow::environment_workflow(environment, ctx.layout, ctx.config)?,
    )?;
    generation.pruned = prune_orphans(ctx, environment)?;
    Ok(generation)
}

async fn generate_component(
    ctx: &GenerationContext<'_>,
    environment: &Environment,
    component: &EnvironmentComponent,
) -> Result<PathBuf> {
    let kind = component.kind()?;
    let spec = &environment.spec;

    ctx.storage.save_yaml(
        &ctx.layout.components_dir(&spec.team_name, &spec.env_name),
        &manifest_file(&component.name),
        &apps::component_app(environment, component, kind, ctx.config),
    )?;

    match kind {
        ComponentKind::Terraform => terraform::generate(ctx, environment, component).await,
        ComponentKind::Argocd => generate_apps(ctx, environment, component).await,
    }
}

/// Registers the target cluster and writes the component's child application.
async fn generate_apps(
    ctx: &GenerationContext<'_>,
    environment: &Environment,
    component: &EnvironmentComponent,
) -> Result<PathBuf> {
    let missing = |field| OperatorError::MissingComponentField {
        component: component.name.clone(),
        field,
    };
    let cluster = component.cluster.as_deref().ok_or_else(|| missing("cluster"))?;
    let apps_repo = component.apps.as_ref().ok_or_else(|| missing("apps"))?;

    let info = collaborators::call(
        "argocd",
        "register cluster",
        ctx.deadline(),
        ctx.control_plane.register_cluster(cluster),
    )
    .await?;

    let spec = &environment.spec;
    let dir = ctx
        .layout
        .apps_dir(&spec.team_name, &spec.env_name, &component.name);
    log::info!(
        "Generating argocd applications for environment component {} in {}",
        component.name,
        dir.display()
    );

    ctx.storage.remove_all(
        &ctx.layout
            .component_dir(&spec.team_name, &spec.env_name, &component.name),
    )?;
    ctx.storage.save_yaml(
        &dir,
        &manifest_file(&component.name),
        &apps::component_apps_app(environment, component, apps_repo, &info.endpoint, ctx.config),
    )?;
    Ok(dir)
}

/// Removes component manifests and directories no longer declared.
fn prune_orphans(ctx: &GenerationContext<'_>, environment: &Environment) -> Result<Vec<PathBuf>> {
    let spec = &environment.spec;
    let components_dir = ctx.layout.components_dir(&spec.team_name, &spec.env_name);
    let mut declared: BTreeSet<&str> = spec.component_names().collect();
    declared.insert(WORKFLOW_MANIFEST);

    let mut pruned = Vec::new();
    for entry in ctx.storage.list_entries(&components_dir)? {
        let path = components_dir.join(&entry);
        let component = if path.is_dir() {
            entry.as_str()
        } else {
            match entry.strip_suffix(".yaml") {
                Some(name) => name,
                None => continue,
            }
        };
        if declared.contains(component) {
            continue;
        }

        log::info!(
            "Pruning orphaned component {} from environment {}/{}",
            component,
            spec.team_name,
            spec.env_name
        );
        ctx.storage.remove_all(&path)?;
        pruned.push(path);
    }
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_from_str, OperatorConfig};
    use crate::fakes::InMemoryControlPlane;
    use crate::git::CliGitClient;
    use crate::layout::IlLayout;
    use crate::resource::{EnvironmentSpec, Repo, Resource, ResourceKind};
    use crate::source::ExternalSources;
    use crate::storage::FileStorage;
    use crate::tracker::GitStateTracker;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: OperatorConfig,
        storage: FileStorage,
        layout: IlLayout,
        sources: ExternalSources,
        plane: InMemoryControlPlane,
    }

    impl Fixture {
        fn new(plane: InMemoryControlPlane) -> Self {
            let dir = TempDir::new().unwrap();
            let il = dir.path().join("il");
            let config = load_config_from_str(
                "companyName: acme\nilRepo:\n  name: acme-il\n  url: git@example.com:acme/il.git\n  sourceOwner: acme\n",
            )
            .unwrap();
            Self {
                storage: FileStorage::new(&il),
                layout: IlLayout::new(&il),
                sources: ExternalSources::new(
                    Arc::new(CliGitClient::default()),
                    GitStateTracker::new(100),
                    dir.path().join("mirrors"),
                ),
                config,
                plane,
                _dir: dir,
            }
        }

        fn ctx(&self) -> GenerationContext<'_> {
            GenerationContext {
                config: &self.config,
                storage: &self.storage,
                layout: &self.layout,
                sources: &self.sources,
                control_plane: &self.plane,
            }
        }

        fn component_dir(&self, name: &str) -> PathBuf {
            self.layout.component_dir("checkout", "dev", name)
        }
    }

    fn terraform(name: &str, instance_type: &str) -> EnvironmentComponent {
        let mut component = EnvironmentComponent::new(name, "terraform");
        component.variables = Some(
            serde_json::from_value(json!({ "instance_type": instance_type })).unwrap(),
        );
        component
    }

    fn environment(components: Vec<EnvironmentComponent>) -> Environment {
        Resource::new(
            ResourceKind::Environment,
            "checkout-dev",
            EnvironmentSpec {
                team_name: "checkout".to_string(),
                env_name: "dev".to_string(),
                components,
            },
        )
    }

    #[tokio::test]
    async fn test_generates_components_in_order() {
        let fixture = Fixture::new(InMemoryControlPlane::new());
        let env = environment(vec![terraform("a", "t3.micro"), terraform("b", "t3.large")]);

        let generation = generate_environment_components(&fixture.ctx(), &env)
            .await
            .unwrap();
        assert_eq!(
            generation.components,
            vec![
                fixture.component_dir("a").join("terraform"),
                fixture.component_dir("b").join("terraform"),
            ]
        );

        let tfvars = std::fs::read_to_string(fixture.component_dir("b").join("terraform/b.tfvars")).unwrap();
        assert_eq!(tfvars, "instance_type = \"t3.large\"\n");
        assert!(fixture
            .layout
            .components_dir("checkout", "dev")
            .join("a.yaml")
            .is_file());
    }

    #[tokio::test]
    async fn test_invalid_type_stops_later_components() {
        let fixture = Fixture::new(InMemoryControlPlane::new());
        let env = environment(vec![
            terraform("a", "t3.micro"),
            EnvironmentComponent::new("bad", "foo"),
            terraform("c", "t3.large"),
        ]);

        let err = generate_environment_components(&fixture.ctx(), &env)
            .await
            .unwrap_err();
        assert_eq!(err.component(), Some("bad"));
        assert!(matches!(err.root_cause(), OperatorError::InvalidComponentType(t) if t == "foo"));

        assert!(fixture.component_dir("a").join("terraform/a.tfvars").is_file());
        assert!(!fixture.component_dir("bad").exists());
        assert!(!fixture.component_dir("c").exists());
    }

    #[tokio::test]
    async fn test_regeneration_removes_stale_files() {
        let fixture = Fixture::new(InMemoryControlPlane::new());
        let env = environment(vec![terraform("a", "t3.micro")]);
        generate_environment_components(&fixture.ctx(), &env).await.unwrap();

        let stale = fixture.component_dir("a").join("terraform/stale.tf");
        std::fs::write(&stale, "x").unwrap();
        generate_environment_components(&fixture.ctx(), &env).await.unwrap();
        assert!(!stale.exists());
    }

    #[tokio::test]
    async fn test_orphans_pruned_after_success_only() {
        let fixture = Fixture::new(InMemoryControlPlane::new());
        let full = environment(vec![terraform("a", "t3.micro"), terraform("b", "t3.large")]);
        generate_environment_components(&fixture.ctx(), &full).await.unwrap();

        let failing = environment(vec![EnvironmentComponent::new("a", "foo")]);
        assert!(generate_environment_components(&fixture.ctx(), &failing)
            .await
            .is_err());
        assert!(fixture.component_dir("b").exists());

        let reduced = environment(vec![terraform("a", "t3.micro")]);
        let generation = generate_environment_components(&fixture.ctx(), &reduced)
            .await
            .unwrap();
        let components_dir = fixture.layout.components_dir("checkout", "dev");
        assert_eq!(
            generation.pruned,
            vec![components_dir.join("b"), components_dir.join("b.yaml")]
        );
        assert!(!fixture.component_dir("b").exists());
        assert!(fixture.component_dir("a").exists());
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected_before_generation() {
        let fixture = Fixture::new(InMemoryControlPlane::new());
        let env = environment(vec![terraform("a", "t3.micro"), terraform("a", "t3.large")]);
        assert!(matches!(
            generate_environment_components(&fixture.ctx(), &env).await,
            Err(OperatorError::DuplicateComponentName(name)) if name == "a"
        ));
        assert!(!fixture.component_dir("a").exists());
    }

    #[tokio::test]
    async fn test_workflow_written_and_kept_by_pruning() {
        let fixture = Fixture::new(InMemoryControlPlane::new());
        let mut b = terraform("b", "t3.large");
        b.depends_on = vec!["a".to_string()];
        let env = environment(vec![b, terraform("a", "t3.micro")]);

        let generation = generate_environment_components(&fixture.ctx(), &env)
            .await
            .unwrap();
        let components_dir = fixture.layout.components_dir("checkout", "dev");
        assert_eq!(generation.workflow, components_dir.join("wofw.yaml"));
        assert!(generation.pruned.is_empty());

        let manifest = std::fs::read_to_string(&generation.workflow).unwrap();
        let workflow: workflow::Workflow = serde_yaml::from_str(&manifest).unwrap();
        let tasks: Vec<&str> = workflow.spec.templates[0]
            .dag
            .tasks
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(tasks, vec!["a", "b"]);

        let rerun = generate_environment_components(&fixture.ctx(), &env)
            .await
            .unwrap();
        assert!(rerun.pruned.is_empty());
        assert_eq!(std::fs::read_to_string(&rerun.workflow).unwrap(), manifest);
    }

    #[tokio::test]
    async fn test_dependency_errors_rejected_before_generation() {
        let fixture = Fixture::new(InMemoryControlPlane::new());
        let mut a = terraform("a", "t3.micro");
        a.depends_on = vec!["b".to_string()];
        let mut b = terraform("b", "t3.large");
        b.depends_on = vec!["a".to_string()];

        let err = generate_environment_components(&fixture.ctx(), &environment(vec![a.clone(), b]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperatorError::DependencyCycle { components } if components == vec!["a", "b"]
        ));
        assert!(!fixture.component_dir("a").exists());

        a.depends_on = vec!["cache".to_string()];
        let err = generate_environment_components(&fixture.ctx(), &environment(vec![a]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OperatorError::UnknownDependency { component, dependency }
                if component == "a" && dependency == "cache"
        ));
        assert!(!fixture.layout.components_dir("checkout", "dev").exists());
    }

    #[tokio::test]
    async fn test_argocd_component_targets_registered_cluster() {
        let plane = InMemoryControlPlane::new().with_cluster("dev-eks", "https://dev-eks.example.com");
        let fixture = Fixture::new(plane);
        let mut web = EnvironmentComponent::new("web", "argocd");
        web.cluster = Some("dev-eks".to_string());
        web.apps = Some(Repo {
            source: "git@example.com:acme/apps.git".to_string(),
            path: "web".to_string(),
        });
        let env = environment(vec![web]);

        generate_environment_components(&fixture.ctx(), &env).await.unwrap();

        let manifest = std::fs::read_to_string(fixture.component_dir("web").join("apps/web.yaml")).unwrap();
        let app: apps::Application = serde_yaml::from_str(&manifest).unwrap();
        assert_eq!(app.spec.destination.server, "https://dev-eks.example.com");
        assert_eq!(fixture.plane.cluster_registrations(), 1);
    }

    #[tokio::test]
    async fn test_type_change_removes_previous_output() {
        let plane = InMemoryControlPlane::new().with_cluster("dev-eks", "https://dev-eks.example.com");
        let fixture = Fixture::new(plane);
        generate_environment_components(&fixture.ctx(), &environment(vec![terraform("web", "t3.micro")]))
            .await
            .unwrap();
        assert!(fixture.component_dir("web").join("terraform").exists());

        let mut web = EnvironmentComponent::new("web", "argocd");
        web.cluster = Some("dev-eks".to_string());
        web.apps = Some(Repo {
            source: "git@example.com:acme/apps.git".to_string(),
            path: "web".to_string(),
        });
        generate_environment_components(&fixture.ctx(), &environment(vec![web]))
            .await
            .unwrap();
        assert!(!fixture.component_dir("web").join("terraform").exists());
        assert!(fixture.component_dir("web").join("apps/web.yaml").is_file());

        generate_environment_components(&fixture.ctx(), &environment(vec![terraform("web", "t3.large")]))
            .await
            .unwrap();
        assert!(!fixture.component_dir("web").join("apps").exists());
        assert!(fixture.component_dir("web").join("terraform/web.tfvars").is_file());
    }

    #[tokio::test]
    async fn test_argocd_component_errors() {
        let fixture = Fixture::new(InMemoryControlPlane::failing_clusters());
        let mut web = EnvironmentComponent::new("web", "argocd");
        let err = generate_environment_components(&fixture.ctx(), &environment(vec![web.clone()]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            OperatorError::MissingComponentField { field: "cluster", .. }
        ));

        web.cluster = Some("dev-eks".to_string());
        web.apps = Some(Repo {
            source: "git@example.com:acme/apps.git".to_string(),
            path: ".".to_string(),
        });
        let err = generate_environment_components(&fixture.ctx(), &environment(vec![web]))
            .await
            .unwrap_err();
        assert_eq!(err.component(), Some("web"));
        assert!(matches!(err.root_cause(), OperatorError::Collaborator { service: "argocd", .. }));
        assert!(err.is_retryable());
    }
}
