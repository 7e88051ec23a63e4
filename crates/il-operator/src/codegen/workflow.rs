//! The environment's workflow of workflows.
//!
//! One Argo `Workflow` per environment whose DAG runs each component after
//! everything it `dependsOn`. Tasks are listed in a topological order that
//! breaks ties by declaration order, so the same environment always renders
//! the same manifest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::apps::{LABEL_ENVIRONMENT, LABEL_MODEL, LABEL_TEAM};
use crate::config::OperatorConfig;
use crate::error::{OperatorError, Result};
use crate::layout::IlLayout;
use crate::resource::{ComponentKind, Environment, EnvironmentComponent};

pub const WORKFLOW_API_VERSION: &str = "argoproj.io/v1alpha1";
pub const WORKFLOW_KIND: &str = "Workflow";

const ENTRYPOINT: &str = "main";
const TEMPLATE_ENTRY: &str = "run";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub api_version: String,
    pub kind: String,
    pub metadata: WorkflowMetadata,
    pub spec: WorkflowSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub entrypoint: String,
    pub templates: Vec<WorkflowTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub name: String,
    pub dag: Dag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    pub tasks: Vec<DagTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagTask {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    pub template_ref: TemplateRef,
    pub arguments: Arguments,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Workflow template that provisions one component of `kind`.
fn template_for(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Terraform => "terraform-sync-template",
        ComponentKind::Argocd => "argocd-sync-template",
    }
}

/// Orders `components` so every component follows its dependencies.
///
/// Among components whose dependencies are all placed, the one declared
/// first goes next. Unknown dependencies and cycles, including a component
/// depending on itself, are rejected.
pub fn execution_order(components: &[EnvironmentComponent]) -> Result<Vec<&EnvironmentComponent>> {
    let index: BTreeMap<&str, usize> = components
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();

    let mut dependencies = Vec::with_capacity(components.len());
    for component in components {
        let mut deps = Vec::new();
        for dependency in &component.depends_on {
            let Some(&i) = index.get(dependency.as_str()) else {
                return Err(OperatorError::UnknownDependency {
                    component: component.name.clone(),
                    dependency: dependency.clone(),
                });
            };
            if !deps.contains(&i) {
                deps.push(i);
            }
        }
        dependencies.push(deps);
    }

    let mut placed = vec![false; components.len()];
    let mut order = Vec::with_capacity(components.len());
    while order.len() < components.len() {
        let next = (0..components.len())
            .find(|&i| !placed[i] && dependencies[i].iter().all(|&d| placed[d]));
        match next {
            Some(i) => {
                placed[i] = true;
                order.push(&components[i]);
            }
            None => return Err(cycle(components, &dependencies, &placed)),
        }
    }
    Ok(order)
}

/// Names the unplaced components that sit on a cycle.
///
/// Unplaced components nothing else unplaced depends on are only blocked by
/// a cycle, so they are peeled off until the cycle itself remains.
fn cycle(
    components: &[EnvironmentComponent],
    dependencies: &[Vec<usize>],
    placed: &[bool],
) -> OperatorError {
    let mut stuck: Vec<bool> = placed.iter().map(|p| !p).collect();
    loop {
        let leaf = (0..components.len()).find(|&i| {
            stuck[i]
                && !(0..components.len()).any(|j| stuck[j] && dependencies[j].contains(&i))
        });
        match leaf {
            Some(i) => stuck[i] = false,
            None => break,
        }
    }

    OperatorError::DependencyCycle {
        components: components
            .iter()
            .zip(stuck)
            .filter(|(_, stuck)| *stuck)
            .map(|(c, _)| c.name.clone())
            .collect(),
    }
}

/// Builds the workflow running `environment`'s components.
pub fn environment_workflow(
    environment: &Environment,
    layout: &IlLayout,
    config: &OperatorConfig,
) -> Result<Workflow> {
    let spec = &environment.spec;

    let mut tasks = Vec::with_capacity(spec.components.len());
    for component in execution_order(&spec.components)? {
        let kind = component.kind()?;
        let dir = match kind {
            ComponentKind::Terraform => {
                layout.terraform_dir(&spec.team_name, &spec.env_name, &component.name)
            }
            ComponentKind::Argocd => layout.apps_dir(&spec.team_name, &spec.env_name, &component.name),
        };

        let mut dependencies: Vec<String> = Vec::new();
        for dependency in &component.depends_on {
            if !dependencies.contains(dependency) {
                dependencies.push(dependency.clone());
            }
        }

        tasks.push(DagTask {
            name: component.name.clone(),
            dependencies,
            template_ref: TemplateRef {
                name: template_for(kind).to_string(),
                template: TEMPLATE_ENTRY.to_string(),
            },
            arguments: Arguments {
                parameters: vec![
                    Parameter::new("il_repo", config.il_repo.url.as_str()),
                    Parameter::new("team_name", spec.team_name.as_str()),
                    Parameter::new("env_name", spec.env_name.as_str()),
                    Parameter::new("config_name", component.name.as_str()),
                    Parameter::new("config_type", kind.to_string()),
                    Parameter::new("path", layout.relative(&dir)),
                ],
            },
        });
    }

    let labels = BTreeMap::from([
        (LABEL_MODEL.to_string(), "workflow-of-workflows".to_string()),
        (LABEL_TEAM.to_string(), spec.team_name.clone()),
        (LABEL_ENVIRONMENT.to_string(), spec.env_name.clone()),
    ]);

    Ok(Workflow {
        api_version: WORKFLOW_API_VERSION.to_string(),
        kind: WORKFLOW_KIND.to_string(),
        metadata: WorkflowMetadata {
            name: format!("{}-{}", spec.team_name, spec.env_name),
            namespace: config.gitops.workflows_namespace.clone(),
            labels,
        },
        spec: WorkflowSpec {
            entrypoint: ENTRYPOINT.to_string(),
            templates: vec![WorkflowTemplate {
                name: ENTRYPOINT.to_string(),
                dag: Dag { tasks },
            }],
        },
    })
}
