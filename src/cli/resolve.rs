//! Resolve a template's dependencies.
//!
//! # Output Format
//!
//! ```text
//! Dependencies of python-ml
//!
//! NAME               VERSION    STATUS             SOURCE    REQUIRED BY
//! cuda-base          11.2       satisfied          fetched   python-ml
//! jupyter            -          missing (opt)      -         python-ml
//!
//! Build order: cuda-base → python-ml
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::OutputFormat;
use crate::manager::TemplateManager;
use crate::resolver::{DependencyStatus, ResolutionResult, ResolvedDependency};

/// Resolve the dependency closure of a template.
#[derive(Args, Debug)]
pub struct ResolveCommand {
    /// Template to resolve
    pub template: String,

    /// Fetch missing required dependencies from the registry
    #[arg(long)]
    pub fetch: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl ResolveCommand {
    /// Execute the command.
    pub async fn execute(self, manager: &TemplateManager) -> Result<()> {
        let result = manager.resolve_and_fetch_dependencies(&self.template, self.fetch).await?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            OutputFormat::Table => print!("{}", render_table(&result)),
        }
        Ok(())
    }
}

fn status_label(dep: &ResolvedDependency) -> String {
    match (dep.status, dep.is_optional) {
        (DependencyStatus::Missing, true) => "missing (opt)".to_string(),
        (status, _) => status.to_string(),
    }
}

fn colorize_status(dep: &ResolvedDependency, padded: String) -> String {
    match dep.status {
        DependencyStatus::Satisfied => padded.green().to_string(),
        DependencyStatus::Missing if dep.is_optional => padded.yellow().to_string(),
        DependencyStatus::Missing | DependencyStatus::VersionMismatch => padded.red().to_string(),
    }
}

/// Render a resolution result as a table followed by the build order and
/// any issues.
pub fn render_table(result: &ResolutionResult) -> String {
    let mut out = format!("Dependencies of {}\n\n", result.target.bold());

    if result.resolved.is_empty() {
        out.push_str("  (no dependencies)\n");
    } else {
        out.push_str(&format!(
            "{:<18} {:<10} {:<18} {:<9} {}\n",
            "NAME", "VERSION", "STATUS", "SOURCE", "REQUIRED BY"
        ));
        for dep in result.resolved.values() {
            let status = colorize_status(dep, format!("{:<18}", status_label(dep)));
            out.push_str(&format!(
                "{:<18} {:<10} {} {:<9} {}\n",
                dep.name,
                dep.version.as_deref().unwrap_or("-"),
                status,
                dep.source.map_or_else(|| "-".to_string(), |s| s.to_string()),
                dep.required_by
            ));
        }
    }

    out.push_str(&format!("\nBuild order: {}\n", result.build_order.join(" → ")));

    for dep in result.issues() {
        let detail = dep.diagnostic.as_deref().unwrap_or("not found");
        out.push_str(&format!("{} {}: {}\n", "✗".red(), dep.name, detail));
    }
    for conflict in &result.conflicts {
        out.push_str(&format!("{} {}", "✗".red(), conflict));
    }

    out
}
