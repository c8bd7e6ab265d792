//! Summarise the dependency status of a template.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::OutputFormat;
use crate::manager::TemplateManager;
use crate::resolver::DependencySummary;

/// Count satisfied, missing and mismatched dependencies of a template.
#[derive(Args, Debug)]
pub struct AnalyzeCommand {
    /// Template to analyze
    pub template: String,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl AnalyzeCommand {
    /// Execute the command.
    pub async fn execute(self, manager: &TemplateManager) -> Result<()> {
        let summary = manager.analyze(&self.template).await?;
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            OutputFormat::Table => print!("{}", render_summary(&self.template, &summary)),
        }
        Ok(())
    }
}

/// Render a summary as aligned lines followed by a buildability verdict.
pub fn render_summary(template: &str, summary: &DependencySummary) -> String {
    let mut out = format!("Dependency analysis for {}\n\n", template.bold());
    for (label, value) in [
        ("Total", summary.total),
        ("Satisfied", summary.satisfied),
        ("Missing (required)", summary.missing_required),
        ("Missing (optional)", summary.missing_optional),
        ("Version mismatches", summary.mismatched),
        ("Conflicts", summary.conflicts),
    ] {
        out.push_str(&format!("  {label:<20} {value}\n"));
    }

    if summary.buildable {
        out.push_str(&format!("\n{} Template is buildable\n", "✓".green()));
    } else {
        out.push_str(&format!(
            "\n{} Template is not buildable: missing required dependencies, version mismatches or conflicts\n",
            "✗".red()
        ));
    }
    out
}
