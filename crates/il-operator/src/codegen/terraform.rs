//! Terraform module tree of a `terraform` component.

use std::fmt::Write;
use std::path::PathBuf;

use super::GenerationContext;
use crate::config::TerraformSettings;
use crate::error::Result;
use crate::resource::{Environment, EnvironmentComponent, ModuleSource, VariableSource};
use crate::tfvars::{hcl_string, ResolvedVariables, TfvarsResolver};

pub const TERRAFORM_FILE: &str = "terraform.tf";
pub const PROVIDER_FILE: &str = "provider.tf";
pub const MODULE_FILE: &str = "module.tf";
pub const VARIABLES_FILE: &str = "variables.tf";

/// Everything the rendered files depend on.
#[derive(Debug, Clone, Copy)]
pub struct TerraformInputs<'a> {
    pub team: &'a str,
    pub environment: &'a str,
    pub component: &'a str,
    pub module: Option<&'a ModuleSource>,
    pub variables: &'a ResolvedVariables,
    pub settings: &'a TerraformSettings,
}

/// Renders the component's files as `(file name, content)` pairs, sorted by name.
pub fn render(inputs: &TerraformInputs<'_>) -> Vec<(String, String)> {
    let mut files = vec![
        (TERRAFORM_FILE.to_string(), render_backend(inputs)),
        (PROVIDER_FILE.to_string(), render_provider(inputs.settings)),
        (VARIABLES_FILE.to_string(), render_variables(&inputs.variables.names)),
        (tfvars_file(inputs.component), inputs.variables.content.clone()),
    ];
    if let Some(module) = inputs.module {
        files.push((
            MODULE_FILE.to_string(),
            render_module(inputs.component, module, &inputs.variables.names),
        ));
    }
    files.sort();
    files
}

pub fn tfvars_file(component: &str) -> String {
    format!("{}.tfvars", component)
}

fn render_backend(inputs: &TerraformInputs<'_>) -> String {
    let settings = inputs.settings;
    let key = format!(
        "{}/{}/{}/terraform.tfstate",
        inputs.team, inputs.environment, inputs.component
    );
    format!(
        "terraform {{\n  required_version = {}\n\n  backend \"s3\" {{\n    bucket         = {}\n    key            = {}\n    region         = {}\n    dynamodb_table = {}\n    encrypt        = true\n  }}\n}}\n",
        hcl_string(&settings.required_version),
        hcl_string(&settings.state_bucket),
        hcl_string(&key),
        hcl_string(&settings.region),
        hcl_string(&settings.lock_table),
    )
}

fn render_provider(settings: &TerraformSettings) -> String {
    format!(
        "provider \"aws\" {{\n  region = {}\n}}\n",
        hcl_string(&settings.region)
    )
}

fn render_module(component: &str, module: &ModuleSource, names: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "module {} {{", hcl_string(component));
    let _ = writeln!(out, "  source = {}", hcl_string(&module.source));
    if let Some(version) = &module.version {
        let _ = writeln!(out, "  version = {}", hcl_string(version));
    }
    if !names.is_empty() {
        out.push('\n');
        for name in names {
            let _ = writeln!(out, "  {} = var.{}", name, name);
        }
    }
    out.push_str("}\n");
    out
}

fn render_variables(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("variable {} {{}}\n", hcl_string(name)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Regenerates the terraform directory of `component` from scratch.
///
/// Variables are resolved before anything is deleted, so a resolution
/// failure leaves the previous directory in place.
pub async fn generate(
    ctx: &GenerationContext<'_>,
    environment: &Environment,
    component: &EnvironmentComponent,
) -> Result<PathBuf> {
    let spec = &environment.spec;
    let dir = ctx
        .layout
        .terraform_dir(&spec.team_name, &spec.env_name, &component.name);

    log::info!(
        "Generating terraform code for environment component {} in {}",
        component.name,
        dir.display()
    );

    let variables = match component.variable_source()? {
        Some(source) => {
            if matches!(source, VariableSource::File(_)) {
                log::info!("Reading tfvars file for component {}", component.name);
            }
            TfvarsResolver::new(ctx.sources)
                .resolve(&environment.key(), source)
                .await?
        }
        None => ResolvedVariables {
            names: Vec::new(),
            content: String::new(),
        },
    };

    let inputs = TerraformInputs {
        team: &spec.team_name,
        environment: &spec.env_name,
        component: &component.name,
        module: component.module.as_ref(),
        variables: &variables,
        settings: &ctx.config.terraform,
    };

    // The whole component directory, so output of a previous component type goes too
    ctx.storage.remove_all(
        &ctx.layout
            .component_dir(&spec.team_name, &spec.env_name, &component.name),
    )?;
    for (file_name, content) in render(&inputs) {
        ctx.storage.write_file(&dir.join(file_name), content.as_bytes())?;
    }

    super::overlay::apply(ctx, environment, component, &dir).await?;
    Ok(dir)
}
