//! Builders for test resources.

#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::json;

use il_operator::resource::{
    CompanySpec, EnvironmentSpec, OverlayFile, Repo, Resource, ResourceKind, TeamSpec,
    VariablesFile,
};
use il_operator::{Company, Environment, EnvironmentComponent, Team};

pub fn company(name: &str, config_repo: &str) -> Company {
    Resource::new(
        ResourceKind::Company,
        name,
        CompanySpec {
            company_name: name.to_string(),
            config_repo: Repo {
                source: config_repo.to_string(),
                path: ".".to_string(),
            },
        },
    )
}

pub fn team(name: &str, config_repo: &str) -> Team {
    Resource::new(
        ResourceKind::Team,
        name,
        TeamSpec {
            team_name: name.to_string(),
            config_repo: Repo {
                source: config_repo.to_string(),
                path: ".".to_string(),
            },
            permissions: Vec::new(),
        },
    )
}

pub fn environment(team: &str, env: &str, components: Vec<EnvironmentComponent>) -> Environment {
    Resource::new(
        ResourceKind::Environment,
        format!("{}-{}", team, env),
        EnvironmentSpec {
            team_name: team.to_string(),
            env_name: env.to_string(),
            components,
        },
    )
}

/// Builder for terraform components.
pub struct TerraformComponentBuilder {
    component: EnvironmentComponent,
}

impl TerraformComponentBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            component: EnvironmentComponent::new(name, "terraform"),
        }
    }

    pub fn variable(mut self, name: &str, value: serde_json::Value) -> Self {
        self.component
            .variables
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value);
        self
    }

    pub fn variables_file(mut self, source: &str, path: &str) -> Self {
        self.component.variables_file = Some(VariablesFile {
            source: source.to_string(),
            path: path.to_string(),
            reference: None,
        });
        self
    }

    /// Variables file read at a branch or tag instead of the remote HEAD.
    pub fn variables_file_at(mut self, source: &str, path: &str, reference: &str) -> Self {
        self.component.variables_file = Some(VariablesFile {
            source: source.to_string(),
            path: path.to_string(),
            reference: Some(reference.to_string()),
        });
        self
    }

    pub fn overlay(mut self, source: &str, path: &str) -> Self {
        self.component.overlay_files.push(OverlayFile {
            source: source.to_string(),
            path: path.to_string(),
        });
        self
    }

    pub fn depends_on(mut self, name: &str) -> Self {
        self.component.depends_on.push(name.to_string());
        self
    }

    pub fn build(self) -> EnvironmentComponent {
        self.component
    }
}

/// A terraform component with one inline `instance_type` variable.
pub fn sized(name: &str, instance_type: &str) -> EnvironmentComponent {
    TerraformComponentBuilder::new(name)
        .variable("instance_type", json!(instance_type))
        .build()
}
