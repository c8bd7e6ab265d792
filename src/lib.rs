//! envdeps - template dependency resolution
//!
//! Machine environment definitions ("templates") may declare dependencies on
//! other templates, each with an optional version constraint and an
//! optionality flag. envdeps resolves a template's full dependency closure
//! into a buildable, ordered plan: it matches version constraints, detects
//! cycles, separates optional from required dependencies, and fetches
//! missing dependencies from a registry on demand.
//!
//! # Architecture Overview
//!
//! Components, leaves first:
//!
//! - [`version`] - numeric versions, operators and constraint evaluation
//! - [`store`] - thread-safe in-memory catalog of templates by name
//! - [`resolver::dependency_graph`] - build order and cycle detection
//! - [`registry`] - the [`registry::RegistryFetcher`] seam and implementations
//! - [`resolver`] - walks the closure, classifies and fetches dependencies
//! - [`manager`] - the API consumed by the CLI and build tooling
//!
//! ## Supporting Modules
//!
//! - [`cli`] - command-line front-end
//! - [`config`] - resolver settings from `~/.envdeps/config.toml`
//! - [`constants`] - timeouts, parallelism and back-off defaults
//! - [`core`] - error types and user-facing error reporting
//! - [`models`] - template and dependency declarations
//!
//! # Template Format
//!
//! ```toml
//! name = "python-ml"
//! version = "1.4.0"
//!
//! [[dependencies]]
//! name = "cuda-base"
//! version = "11.0"
//! version_operator = ">="
//!
//! [[dependencies]]
//! name = "jupyter"
//! optional = true
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use envdeps::manager::TemplateManager;
//! use envdeps::registry::{DirectoryRegistry, RegistryFetcher, RetryingFetcher};
//! use envdeps::store::TemplateStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(TemplateStore::load_dir("templates".as_ref()).await?);
//! let fetcher: Arc<dyn RegistryFetcher> =
//!     Arc::new(RetryingFetcher::new(DirectoryRegistry::new("/srv/registry")));
//! let manager = TemplateManager::new(store, Some(fetcher));
//!
//! let result = manager.resolve_and_fetch_dependencies("python-ml", true).await?;
//! println!("fetched: {:?}", result.fetched);
//! println!("build order: {}", result.build_order.join(" → "));
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod manager;
pub mod models;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod version;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
