//! Command-line interface for envdeps.
//!
//! The CLI is a thin presentation layer over [`TemplateManager`]: each
//! subcommand resolves or inspects a template and renders the structured
//! result as a table or JSON.
//!
//! # Commands
//!
//! - `resolve` - Resolve a template's dependencies, optionally fetching missing ones
//! - `graph` - Print the build order or the dependency tree
//! - `analyze` - Summarise dependency status and buildability
//! - `validate` - Exit non-zero unless the template is buildable
//!
//! # Global Options
//!
//! - `--verbose` / `-v` - debug logging
//! - `--quiet` / `-q` - no logging
//! - `--config <PATH>` - alternative config file
//! - `--catalog <DIR>` - directory of local template declarations
//! - `--registry <DIR>` - directory-backed registry used for fetching
//!
//! # Examples
//!
//! ```bash
//! envdeps --catalog ./templates resolve python-ml
//! envdeps --registry /srv/registry resolve python-ml --fetch --format json
//! envdeps graph python-ml --tree
//! envdeps validate python-ml
//! ```

pub mod analyze;
pub mod graph;
pub mod resolve;
pub mod validate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ResolverConfig;
use crate::manager::TemplateManager;
use crate::registry::{DirectoryRegistry, RegistryFetcher, RetryingFetcher};
use crate::store::TemplateStore;

/// Catalog directory used when neither the flag nor the config names one.
pub const DEFAULT_CATALOG_DIR: &str = "templates";

/// Output format shared by commands that render results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table with colors.
    Table,
    /// Machine-readable JSON.
    Json,
}

/// Template dependency resolution from the command line.
#[derive(Parser, Debug)]
#[command(
    name = "envdeps",
    about = "Resolve template dependencies into an ordered build plan",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Disable logging
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the config file (default: ~/.envdeps/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of local template declarations
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Directory-backed registry used to fetch missing templates
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a template's dependency closure
    Resolve(resolve::ResolveCommand),
    /// Show the build order or dependency tree of a template
    Graph(graph::GraphCommand),
    /// Summarise the dependency status of a template
    Analyze(analyze::AnalyzeCommand),
    /// Fail unless a template is buildable
    Validate(validate::ValidateCommand),
}

impl Cli {
    /// The tracing filter directive implied by the verbosity flags.
    ///
    /// `None` means logging is disabled.
    pub fn log_filter(&self) -> Option<String> {
        if self.quiet {
            None
        } else if self.verbose {
            Some("envdeps=debug".to_string())
        } else {
            Some(std::env::var("RUST_LOG").unwrap_or_else(|_| "envdeps=info".to_string()))
        }
    }

    /// Load configuration, build the store and fetcher, and run the command.
    pub async fn execute(self) -> Result<()> {
        let mut config = ResolverConfig::load_with_optional(self.config.clone()).await?;
        if let Some(catalog) = self.catalog {
            config.catalog_dir = Some(catalog);
        }
        if let Some(registry) = self.registry {
            config.registry_dir = Some(registry);
        }

        let manager = build_manager(&config).await?;

        match self.command {
            Commands::Resolve(cmd) => cmd.execute(&manager).await,
            Commands::Graph(cmd) => cmd.execute(&manager),
            Commands::Analyze(cmd) => cmd.execute(&manager).await,
            Commands::Validate(cmd) => cmd.execute(&manager).await,
        }
    }
}

/// Build a [`TemplateManager`] from the catalog and registry named in `config`.
///
/// Without a configured catalog, `./templates` is used if it exists and an
/// empty store otherwise.
pub async fn build_manager(config: &ResolverConfig) -> Result<TemplateManager> {
    let catalog = config.catalog_dir.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CATALOG_DIR);
        default.is_dir().then_some(default)
    });

    let store = match catalog {
        Some(dir) => TemplateStore::load_dir(&dir).await?,
        None => TemplateStore::new(),
    };

    let fetcher = config.registry_dir.as_ref().map(|dir| {
        let registry = DirectoryRegistry::new(dir);
        Arc::new(RetryingFetcher::with_retries(registry, config.fetch_retries)) as Arc<dyn RegistryFetcher>
    });

    Ok(TemplateManager::with_config(Arc::new(store), fetcher, config))
}
