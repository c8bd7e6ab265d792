//! Check that a template is buildable.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::core::EnvdepsError;
use crate::manager::TemplateManager;
use crate::resolver::ResolutionResult;

/// Resolve a template and fail unless it is buildable.
#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Template to validate
    pub template: String,

    /// Fetch missing required dependencies before validating
    #[arg(long)]
    pub fetch: bool,
}

impl ValidateCommand {
    /// Execute the command.
    ///
    /// Returns [`EnvdepsError::DependencyValidation`] listing every blocking
    /// issue when the template is not buildable.
    pub async fn execute(self, manager: &TemplateManager) -> Result<()> {
        let result = manager.resolve_and_fetch_dependencies(&self.template, self.fetch).await?;
        check_buildable(&result)?;
        println!("{} {} is buildable ({} dependencies)", "✓".green(), self.template, result.resolved.len());
        Ok(())
    }
}

/// Turn a non-buildable result into a validation error.
pub fn check_buildable(result: &ResolutionResult) -> Result<()> {
    if result.is_buildable() {
        return Ok(());
    }

    let mut failures: Vec<String> = result
        .issues()
        .into_iter()
        .map(|dep| match &dep.diagnostic {
            Some(diagnostic) => format!("{}: {} ({})", dep.name, dep.status, diagnostic),
            None => format!("{}: {}", dep.name, dep.status),
        })
        .collect();
    failures.extend(result.conflicts.iter().map(|c| {
        let reqs: Vec<String> =
            c.requirements.iter().map(|r| format!("{} requires {}", r.required_by, r.constraint)).collect();
        format!("{}: conflicting constraints ({})", c.name, reqs.join(", "))
    }));

    Err(EnvdepsError::DependencyValidation {
        template: result.target.clone(),
        failures,
    }
    .into())
}
