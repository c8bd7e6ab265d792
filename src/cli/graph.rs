//! Show the build order or dependency tree of a template.

use anyhow::Result;
use clap::Args;

use crate::manager::TemplateManager;

/// Print the build order of a template, one name per line.
#[derive(Args, Debug)]
pub struct GraphCommand {
    /// Template to inspect
    pub template: String,

    /// Print the dependency tree instead of the build order
    #[arg(long)]
    pub tree: bool,
}

impl GraphCommand {
    /// Execute the command.
    pub fn execute(self, manager: &TemplateManager) -> Result<()> {
        if self.tree {
            print!("{}", manager.dependency_tree(&self.template)?);
            println!("\n(*) = already shown");
        } else {
            for (i, name) in manager.get_dependency_graph(&self.template)?.iter().enumerate() {
                println!("{:>3}. {}", i + 1, name);
            }
        }
        Ok(())
    }
}
