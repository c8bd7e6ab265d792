//! High-level template dependency operations.
//!
//! [`TemplateManager`] is the programmatic surface consumed by the CLI and
//! by build tooling. It owns a [`DependencyResolver`] and the shared
//! [`TemplateStore`], and adds editing and analysis operations on top of
//! resolution.
//!
//! # Examples
//!
//! ```rust,no_run
//! use envdeps::manager::TemplateManager;
//! use envdeps::models::TemplateDependency;
//! use envdeps::store::TemplateStore;
//! use envdeps::version::VersionOperator;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(TemplateStore::load_dir("templates".as_ref()).await?);
//! let manager = TemplateManager::new(store, None);
//!
//! manager.add_dependency(
//!     "python-ml",
//!     TemplateDependency::new("cuda-base").with_version(VersionOperator::GreaterOrEqual, "11.0"),
//! )?;
//! let order = manager.get_dependency_graph("python-ml")?;
//! println!("build order: {}", order.join(" → "));
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ResolverConfig;
use crate::core::EnvdepsError;
use crate::models::{Template, TemplateDependency};
use crate::registry::{FetchContext, RegistryFetcher};
use crate::resolver::{
    DependencyGraph, DependencyResolver, DependencyStatus, DependencySummary, ResolutionResult,
    build_order,
};
use crate::store::TemplateStore;
use crate::version::{ConstraintSet, VersionComparator, VersionConstraint};

/// Entry point for dependency operations on a template store.
pub struct TemplateManager {
    resolver: DependencyResolver,
}

impl TemplateManager {
    /// Create a manager with default resolver limits.
    pub fn new(store: Arc<TemplateStore>, fetcher: Option<Arc<dyn RegistryFetcher>>) -> Self {
        Self::from_resolver(DependencyResolver::new(store, fetcher))
    }

    /// Create a manager whose resolver takes its limits from `config`.
    pub fn with_config(
        store: Arc<TemplateStore>,
        fetcher: Option<Arc<dyn RegistryFetcher>>,
        config: &ResolverConfig,
    ) -> Self {
        Self::from_resolver(DependencyResolver::with_config(store, fetcher, config))
    }

    /// Wrap an existing resolver.
    pub fn from_resolver(resolver: DependencyResolver) -> Self {
        Self { resolver }
    }

    /// The shared template store.
    pub fn store(&self) -> &Arc<TemplateStore> {
        self.resolver.store()
    }

    /// The underlying resolver.
    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    fn template(&self, name: &str) -> Result<Arc<Template>> {
        self.store().get(name).ok_or_else(|| {
            EnvdepsError::TemplateNotFound {
                name: name.to_string(),
                suggestions: self.store().similar_names(name),
            }
            .into()
        })
    }

    /// Resolve `template_name` against the local store without fetching.
    ///
    /// The result carries both the resolved map and the build order.
    pub async fn resolve_dependencies(&self, template_name: &str) -> Result<ResolutionResult> {
        self.resolver.resolve(template_name, false).await
    }

    /// Resolve `template_name`, fetching missing required dependencies when
    /// `fetch_missing` is set. Fetched names are in [`ResolutionResult::fetched`].
    pub async fn resolve_and_fetch_dependencies(
        &self,
        template_name: &str,
        fetch_missing: bool,
    ) -> Result<ResolutionResult> {
        self.resolver.resolve(template_name, fetch_missing).await
    }

    /// Build order for `template_name` over the templates currently in the store.
    pub fn get_dependency_graph(&self, template_name: &str) -> Result<Vec<String>> {
        build_order(template_name, self.store())
    }

    /// Render the dependency tree of `template_name`.
    pub fn dependency_tree(&self, template_name: &str) -> Result<String> {
        let graph = DependencyGraph::from_store(template_name, self.store())?;
        Ok(graph.to_tree_string(template_name))
    }

    /// Add `dependency` to `template_name`.
    ///
    /// A required dependency that is missing or does not satisfy its own
    /// constraint is rejected; an optional one is added with a warning.
    ///
    /// # Errors
    ///
    /// - [`EnvdepsError::TemplateNotFound`] if the template is unknown
    /// - [`EnvdepsError::DuplicateDependency`] if the template already declares it
    /// - [`EnvdepsError::DependencyValidation`] for an invalid required dependency
    /// - [`EnvdepsError::CircularDependency`] if the new edge closes a cycle
    pub fn add_dependency(&self, template_name: &str, dependency: TemplateDependency) -> Result<()> {
        let template = self.template(template_name)?;

        if template.dependency(&dependency.name).is_some() {
            return Err(EnvdepsError::DuplicateDependency {
                template: template_name.to_string(),
                dependency: dependency.name,
            }
            .into());
        }

        let check = self.resolver.check_dependency(template_name, &dependency);
        if check.status != DependencyStatus::Satisfied {
            let failure = describe_failure(&check.name, check.status, check.diagnostic.as_deref());
            if dependency.optional {
                tracing::warn!(
                    "Adding optional dependency to '{}' despite validation failure: {}",
                    template_name,
                    failure
                );
            } else {
                return Err(EnvdepsError::DependencyValidation {
                    template: template_name.to_string(),
                    failures: vec![failure],
                }
                .into());
            }
        }

        self.check_new_edge(template_name, &dependency.name)?;

        let updated = (*template).clone().with_dependency(dependency);
        tracing::info!("Added dependency to '{}'", template_name);
        self.store().put(updated);
        Ok(())
    }

    /// Fail if adding `from → to` would create a cycle.
    fn check_new_edge(&self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return Err(EnvdepsError::CircularDependency {
                path: vec![from.to_string(), to.to_string()],
            }
            .into());
        }
        if !self.store().contains(to) {
            return Ok(());
        }

        let mut graph = DependencyGraph::from_store(to, self.store())?;
        graph.add_dependency(from, to);
        graph.build_order(from).map(|_| ())
    }

    /// Remove the dependency `dependency_name` from `template_name`.
    ///
    /// Returns `false` if the template does not declare it.
    pub fn remove_dependency(&self, template_name: &str, dependency_name: &str) -> Result<bool> {
        let template = self.template(template_name)?;
        if template.dependency(dependency_name).is_none() {
            return Ok(false);
        }

        let mut updated = (*template).clone();
        updated.dependencies.retain(|d| d.name != dependency_name);
        self.store().put(updated);
        tracing::info!("Removed dependency '{}' from '{}'", dependency_name, template_name);
        Ok(true)
    }

    /// Check `dependencies` of `template_name` against the store.
    ///
    /// Fails if any required dependency is missing or mismatched. Optional
    /// dependencies never cause a failure.
    pub fn validate_template_dependencies(
        &self,
        template_name: &str,
        dependencies: &[TemplateDependency],
    ) -> Result<()> {
        let failures: Vec<String> = dependencies
            .iter()
            .filter(|dep| !dep.optional)
            .map(|dep| self.resolver.check_dependency(template_name, dep))
            .filter(|check| check.status != DependencyStatus::Satisfied)
            .map(|check| describe_failure(&check.name, check.status, check.diagnostic.as_deref()))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EnvdepsError::DependencyValidation {
                template: template_name.to_string(),
                failures,
            }
            .into())
        }
    }

    /// Summarise the resolution of `template_name` without fetching.
    pub async fn analyze(&self, template_name: &str) -> Result<DependencySummary> {
        Ok(self.resolve_dependencies(template_name).await?.summary())
    }

    /// Versions known locally or in the registry.
    async fn available_versions(&self, name: &str) -> Result<Vec<String>> {
        let mut versions = match self.resolver.fetcher() {
            Some(fetcher) => fetcher.list_versions(name, &FetchContext::new()).await?,
            None => Vec::new(),
        };
        if let Some(local) = self.store().get(name) {
            if !versions.contains(&local.version) {
                versions.push(local.version.clone());
            }
        }
        Ok(versions)
    }

    /// Versions of `name` satisfying `constraint`, newest first.
    ///
    /// Candidates come from the registry when a fetcher is configured, plus
    /// the version in the local store.
    pub async fn find_compatible_versions(
        &self,
        name: &str,
        constraint: &VersionConstraint,
    ) -> Result<Vec<String>> {
        let versions = self.available_versions(name).await?;
        Ok(VersionComparator::find_compatible(&versions, constraint))
    }

    /// Pick one version per template that satisfies all of its constraints.
    ///
    /// For each template the exact version is chosen if one is required,
    /// otherwise the newest available version inside the allowed range,
    /// otherwise the lower bound, otherwise the upper bound.
    ///
    /// # Errors
    ///
    /// - [`EnvdepsError::InvalidVersion`] if a constraint version is malformed
    /// - [`EnvdepsError::VersionConflict`] if no version satisfies a template's constraints
    pub async fn resolve_constraint_conflicts(
        &self,
        constraints: &BTreeMap<String, Vec<VersionConstraint>>,
    ) -> Result<BTreeMap<String, String>> {
        let mut chosen = BTreeMap::new();

        for (name, list) in constraints {
            let mut set = ConstraintSet::new();
            for constraint in list {
                set.add(constraint)?;
            }

            let details = || list.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            if !set.is_satisfiable() {
                return Err(EnvdepsError::VersionConflict {
                    name: name.clone(),
                    details: details(),
                }
                .into());
            }

            let available = self.available_versions(name).await?;
            let Some(version) = set.pick(&available) else {
                return Err(EnvdepsError::VersionConflict {
                    name: name.clone(),
                    details: format!("no known version satisfies {}", details()),
                }
                .into());
            };
            tracing::debug!("Chose {} {} for [{}]", name, version, details());
            chosen.insert(name.clone(), version);
        }

        Ok(chosen)
    }
}

fn describe_failure(name: &str, status: DependencyStatus, diagnostic: Option<&str>) -> String {
    match diagnostic {
        Some(diagnostic) => format!("{name}: {status} ({diagnostic})"),
        None => format!("{name}: {status}"),
    }
}
