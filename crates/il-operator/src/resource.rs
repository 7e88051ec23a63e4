//! K8s-style custom resource types consumed by the operator.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use crate::error::{OperatorError, Result};
use crate::layout::WORKFLOW_MANIFEST;

/// The API version for all operator resources.
pub const API_VERSION: &str = "stable.compuzest.com/v1";

/// Namespace assumed when a resource omits `metadata.namespace`.
pub const DEFAULT_NAMESPACE: &str = "default";

static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// The kind of resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Company,
    Team,
    Environment,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Company => write!(f, "Company"),
            ResourceKind::Team => write!(f, "Team"),
            ResourceKind::Environment => write!(f, "Environment"),
        }
    }
}

/// Metadata for a resource, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Identity of a Kubernetes object: kind, namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// A generic K8s-style resource wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource<T> {
    pub api_version: String,
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
    pub spec: T,
}

impl<T> Resource<T> {
    /// Creates a new resource with the given kind and spec.
    pub fn new(kind: ResourceKind, name: impl Into<String>, spec: T) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind,
            metadata: ObjectMeta::new(name),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    /// The object identity used to key per-object state.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind, self.namespace(), self.name())
    }
}

/// A location inside a git repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub source: String,
    #[serde(default = "default_repo_path")]
    pub path: String,
}

fn default_repo_path() -> String {
    ".".to_string()
}

// ============================================================================
// Company / Team
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySpec {
    pub company_name: String,
    pub config_repo: Repo,
}

pub type Company = Resource<CompanySpec>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpec {
    pub team_name: String,
    pub config_repo: Repo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

pub type Team = Resource<TeamSpec>;

// ============================================================================
// Environment
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    pub team_name: String,
    pub env_name: String,
    /// Components in declaration order; generation follows this order.
    #[serde(default)]
    pub components: Vec<EnvironmentComponent>,
}

pub type Environment = Resource<EnvironmentSpec>;

impl EnvironmentSpec {
    /// Structural checks that do not depend on any single component's type.
    pub fn validate(&self) -> Result<()> {
        validate_name("team", &self.team_name)?;
        validate_name("environment", &self.env_name)?;

        let mut seen = HashSet::new();
        for component in &self.components {
            validate_name("component", &component.name)?;
            if component.name == WORKFLOW_MANIFEST {
                return Err(OperatorError::InvalidName {
                    what: "component",
                    name: component.name.clone(),
                    reason: "reserved for the environment workflow".to_string(),
                });
            }
            if !seen.insert(component.name.as_str()) {
                return Err(OperatorError::DuplicateComponentName(component.name.clone()));
            }
        }
        Ok(())
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.name.as_str())
    }
}

/// The closed set of component types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Terraform,
    Argocd,
}

impl std::str::FromStr for ComponentKind {
    type Err = OperatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "terraform" => Ok(ComponentKind::Terraform),
            "argocd" => Ok(ComponentKind::Argocd),
            other => Err(OperatorError::InvalidComponentType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentKind::Terraform => write!(f, "terraform"),
            ComponentKind::Argocd => write!(f, "argocd"),
        }
    }
}

/// One declared unit of infrastructure within an environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentComponent {
    pub name: String,

    /// Raw declared type. Parsed into [`ComponentKind`] by [`EnvironmentComponent::kind`].
    #[serde(rename = "type")]
    pub component_type: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Terraform module to invoke.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables_file: Option<VariablesFile>,

    /// Files from the team config repo copied over the generated terraform.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlay_files: Vec<OverlayFile>,

    /// Application manifests source for `argocd` components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apps: Option<Repo>,

    /// Target cluster name for `argocd` components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSource {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Reference to a tfvars file inside an external repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariablesFile {
    pub source: String,
    pub path: String,
    /// Branch or tag to read from; the remote HEAD when absent.
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayFile {
    pub source: String,
    pub path: String,
}

/// Where a component's variables come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariableSource<'a> {
    Inline(&'a BTreeMap<String, serde_json::Value>),
    File(&'a VariablesFile),
}

impl EnvironmentComponent {
    pub fn new(name: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component_type: component_type.into(),
            ..Default::default()
        }
    }

    pub fn kind(&self) -> Result<ComponentKind> {
        self.component_type.parse()
    }

    /// Returns the single variable source of this component, if any.
    ///
    /// Declaring both inline variables and a variables file is rejected.
    pub fn variable_source(&self) -> Result<Option<VariableSource<'_>>> {
        match (&self.variables, &self.variables_file) {
            (Some(_), Some(_)) => Err(OperatorError::ConflictingVariableSources {
                component: self.name.clone(),
            }),
            (Some(vars), None) => Ok(Some(VariableSource::Inline(vars))),
            (None, Some(file)) => Ok(Some(VariableSource::File(file))),
            (None, None) => Ok(None),
        }
    }
}

/// Checks that `name` is a DNS-1123 label.
///
/// Generated paths and application names are built from these, so a label
/// can never contain `/` or `.`.
pub fn validate_name(what: &'static str, name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("must not be empty".to_string())
    } else if name.len() > 63 {
        Some(format!("must be at most 63 characters, got {}", name.len()))
    } else if !DNS_LABEL.is_match(name) {
        Some("must consist of lowercase alphanumerics or '-', and start and end with an alphanumeric".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(OperatorError::InvalidName {
            what,
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
