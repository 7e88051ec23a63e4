//! Paths inside the IL repository.

use std::path::{Path, PathBuf};

pub const COMPANY_DIR: &str = "company";
pub const TEAM_DIR: &str = "team";
pub const BOOTSTRAP_DIR: &str = "bootstrap";
/// Manifest name of the environment workflow; no component may use it.
pub const WORKFLOW_MANIFEST: &str = "wofw";

/// Directory layout of one IL working copy.
#[derive(Debug, Clone)]
pub struct IlLayout {
    root: PathBuf,
}

impl IlLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn company_dir(&self, company: &str) -> PathBuf {
        self.root.join(COMPANY_DIR).join(company)
    }

    pub fn team_dir(&self, team: &str) -> PathBuf {
        self.root.join(TEAM_DIR).join(team)
    }

    pub fn bootstrap_dir(&self) -> PathBuf {
        self.root.join(BOOTSTRAP_DIR)
    }

    /// Holds `<env>.yaml` and one directory per environment.
    pub fn environments_dir(&self, team: &str) -> PathBuf {
        self.team_dir(team).join("environments")
    }

    pub fn environment_dir(&self, team: &str, env: &str) -> PathBuf {
        self.environments_dir(team).join(env)
    }

    /// Holds `<component>.yaml` and one directory per component.
    pub fn components_dir(&self, team: &str, env: &str) -> PathBuf {
        self.environment_dir(team, env).join("components")
    }

    pub fn component_dir(&self, team: &str, env: &str, component: &str) -> PathBuf {
        self.components_dir(team, env).join(component)
    }

    pub fn terraform_dir(&self, team: &str, env: &str, component: &str) -> PathBuf {
        self.component_dir(team, env, component).join("terraform")
    }

    pub fn apps_dir(&self, team: &str, env: &str, component: &str) -> PathBuf {
        self.component_dir(team, env, component).join("apps")
    }

    /// Path of `path` relative to the repository root, `/`-separated.
    ///
    /// Used as the `path` of generated applications.
    pub fn relative(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// File name of the manifest for an entity named `name`.
pub fn manifest_file(name: &str) -> String {
    format!("{}.yaml", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_paths() {
        let layout = IlLayout::new("/il");
        assert_eq!(
            layout.terraform_dir("core", "dev", "vpc"),
            PathBuf::from("/il/team/core/environments/dev/components/vpc/terraform")
        );
        assert_eq!(
            layout.apps_dir("core", "dev", "web"),
            PathBuf::from("/il/team/core/environments/dev/components/web/apps")
        );
        assert_eq!(
            layout.relative(&layout.components_dir("core", "dev")),
            "team/core/environments/dev/components"
        );
        assert_eq!(layout.company_dir("acme"), PathBuf::from("/il/company/acme"));
    }
}
