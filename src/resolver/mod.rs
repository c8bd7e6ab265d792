//! Template dependency resolution.
//!
//! The [`DependencyResolver`] walks the dependency closure of a target
//! template, classifies every dependency it meets, optionally fetches
//! missing required dependencies from a [`RegistryFetcher`], and finally
//! computes a build order with [`dependency_graph`].
//!
//! # Resolution Process
//!
//! 1. **Target lookup**: the target must be in the store. When it is absent
//!    and fetching is enabled it is fetched first; otherwise the call fails
//!    with [`EnvdepsError::TemplateNotFound`].
//! 2. **Closure walk**: dependencies are visited breadth-first, one wave per
//!    depth level, in declaration order. Each name is resolved once; the
//!    first requirement reached decides how it is looked up, and later
//!    requirements on the same name are checked against that outcome.
//! 3. **Classification** of each dependency:
//!    - present and matching its constraint → `Satisfied`, `Local`
//!    - present but not matching → `VersionMismatch` (its own dependencies
//!      are still walked)
//!    - absent and optional → `Missing`, never fetched, not walked
//!    - absent and required without fetching → `Missing`
//!    - absent and required with fetching → fetched; `Satisfied`, `Fetched`
//!      on success, `Missing` with the fetch error as diagnostic on failure
//! 4. **Build order**: computed over the populated store; a cycle aborts the
//!    call with [`EnvdepsError::CircularDependency`].
//!
//! Only structural problems (cycle, unknown target, missing fetcher,
//! overall timeout) are returned as errors. Everything else is recorded in
//! the [`ResolutionResult`] so a caller can report the full picture.
//!
//! # Concurrency
//!
//! The walk itself runs on one task. Required dependencies that must be
//! fetched within one wave are fetched concurrently, bounded by
//! `max_parallel_fetches`, and their outcomes are merged in declaration
//! order. Fetched templates are written to the shared [`TemplateStore`],
//! whose lock is the only shared mutable state; several resolutions may run
//! against the same store at once.
//!
//! # Timeouts
//!
//! Every fetch receives a [`FetchContext`] whose deadline is the earlier of
//! the per-fetch timeout and the overall deadline. When the overall deadline
//! expires, [`EnvdepsError::ResolutionTimeout`] is returned carrying
//! everything resolved so far.
//!
//! # Example
//!
//! ```rust,no_run
//! use envdeps::resolver::DependencyResolver;
//! use envdeps::store::TemplateStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(TemplateStore::load_dir("templates".as_ref()).await?);
//! let resolver = DependencyResolver::new(store, None);
//!
//! let result = resolver.resolve("python-ml", false).await?;
//! for name in &result.build_order {
//!     println!("{name}");
//! }
//! if !result.is_buildable() {
//!     println!("{} issue(s)", result.issues().len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod dependency_graph;

pub use dependency_graph::{DependencyGraph, build_order};

use anyhow::Result;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::ResolverConfig;
use crate::constants::{DEFAULT_FETCH_TIMEOUT, DEFAULT_RESOLVE_TIMEOUT, default_max_parallel_fetches};
use crate::core::EnvdepsError;
use crate::models::{Template, TemplateDependency};
use crate::registry::{FetchContext, RegistryFetcher};
use crate::store::TemplateStore;
use crate::version::{ConflictDetector, VersionConflict};

/// Outcome of resolving a single dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    /// Present and matching its constraint.
    Satisfied,
    /// Absent from the store (and not fetched).
    Missing,
    /// Present but the version does not satisfy the constraint, or a
    /// version could not be parsed.
    VersionMismatch,
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Satisfied => "satisfied",
            Self::Missing => "missing",
            Self::VersionMismatch => "version mismatch",
        })
    }
}

/// Where a resolved template came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencySource {
    /// Already in the local store.
    Local,
    /// Retrieved from the registry during this resolution.
    Fetched,
}

impl fmt::Display for DependencySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Fetched => "fetched",
        })
    }
}

/// One dependency of the closure, as resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDependency {
    /// Template name
    pub name: String,
    /// Version found; `None` when missing
    pub version: Option<String>,
    /// Resolution outcome
    pub status: DependencyStatus,
    /// True only if every requirement on this template is optional
    pub is_optional: bool,
    /// Where the template came from; `None` when missing
    pub source: Option<DependencySource>,
    /// Template whose requirement was resolved first
    pub required_by: String,
    /// That requirement's constraint, e.g. `>= 11.0`
    pub constraint: Option<String>,
    /// Why the dependency is missing or mismatched
    pub diagnostic: Option<String>,
}

impl ResolvedDependency {
    /// Whether this entry prevents the target from being built.
    ///
    /// Missing optional dependencies never do; a mismatched version does,
    /// optional or not.
    pub fn is_blocking(&self) -> bool {
        match self.status {
            DependencyStatus::Satisfied => false,
            DependencyStatus::Missing => !self.is_optional,
            DependencyStatus::VersionMismatch => true,
        }
    }
}

/// Aggregate counts over a [`ResolutionResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DependencySummary {
    /// Number of distinct dependencies in the closure
    pub total: usize,
    /// Dependencies with status `Satisfied`
    pub satisfied: usize,
    /// Required dependencies with status `Missing`
    pub missing_required: usize,
    /// Optional dependencies with status `Missing`
    pub missing_optional: usize,
    /// Dependencies with status `VersionMismatch`
    pub mismatched: usize,
    /// Templates fetched from the registry
    pub fetched: usize,
    /// Templates with unsatisfiable combined constraints
    pub conflicts: usize,
    /// Whether the target can be built
    pub buildable: bool,
}

/// The result of resolving a target template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    /// Template that was resolved
    pub target: String,
    /// Every dependency of the closure, by name (the target is not included)
    pub resolved: BTreeMap<String, ResolvedDependency>,
    /// Names retrieved from the registry during this run
    pub fetched: BTreeSet<String>,
    /// Build order; dependencies first, the target last
    pub build_order: Vec<String>,
    /// Templates whose combined constraints admit no version
    pub conflicts: Vec<VersionConflict>,
}

impl ResolutionResult {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            resolved: BTreeMap::new(),
            fetched: BTreeSet::new(),
            build_order: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    /// Whether the target can be built: no required dependency missing, no
    /// version mismatch, and no constraint conflict.
    pub fn is_buildable(&self) -> bool {
        self.conflicts.is_empty() && self.resolved.values().all(|d| !d.is_blocking())
    }

    /// Entries that prevent the target from being built.
    pub fn issues(&self) -> Vec<&ResolvedDependency> {
        self.resolved.values().filter(|d| d.is_blocking()).collect()
    }

    /// Look up a dependency by name.
    pub fn get(&self, name: &str) -> Option<&ResolvedDependency> {
        self.resolved.get(name)
    }

    /// Count entries by status.
    pub fn summary(&self) -> DependencySummary {
        let mut summary = DependencySummary {
            total: self.resolved.len(),
            satisfied: 0,
            missing_required: 0,
            missing_optional: 0,
            mismatched: 0,
            fetched: self.fetched.len(),
            conflicts: self.conflicts.len(),
            buildable: self.is_buildable(),
        };
        for dep in self.resolved.values() {
            match (dep.status, dep.is_optional) {
                (DependencyStatus::Satisfied, _) => summary.satisfied += 1,
                (DependencyStatus::Missing, false) => summary.missing_required += 1,
                (DependencyStatus::Missing, true) => summary.missing_optional += 1,
                (DependencyStatus::VersionMismatch, _) => summary.mismatched += 1,
            }
        }
        summary
    }
}

/// A dependency declaration together with the template declaring it.
#[derive(Debug, Clone)]
struct Requirement {
    required_by: String,
    dependency: TemplateDependency,
}

fn requirements_of(template: &Template) -> impl Iterator<Item = Requirement> + '_ {
    template.dependencies.iter().map(|dep| Requirement {
        required_by: template.name.clone(),
        dependency: dep.clone(),
    })
}

/// Mutable state of one resolution run, owned by the resolving task.
struct Walk {
    result: ResolutionResult,
    visited: HashSet<String>,
    detector: ConflictDetector,
}

impl Walk {
    fn new(target: &str) -> Self {
        Self {
            result: ResolutionResult::new(target),
            visited: HashSet::from([target.to_string()]),
            detector: ConflictDetector::new(),
        }
    }

    fn record(&mut self, resolved: ResolvedDependency) {
        self.result.resolved.insert(resolved.name.clone(), resolved);
    }

    /// Absent optional dependencies never block, so their conflicts are dropped.
    fn finish(mut self) -> ResolutionResult {
        let resolved = &self.result.resolved;
        self.result.conflicts = self
            .detector
            .detect_conflicts()
            .into_iter()
            .filter(|conflict| {
                resolved
                    .get(&conflict.name)
                    .is_none_or(|d| !(d.status == DependencyStatus::Missing && d.is_optional))
            })
            .collect();
        self.result
    }
}

/// Classify `dependency` against `found`, the template present under its name.
///
/// A dependency without a version accepts any present version. A version
/// that cannot be parsed is reported as a mismatch, never as satisfied.
pub fn classify_dependency(
    required_by: &str,
    dependency: &TemplateDependency,
    found: Option<&Template>,
    source: DependencySource,
) -> ResolvedDependency {
    let constraint = dependency.constraint();
    let mut resolved = ResolvedDependency {
        name: dependency.name.clone(),
        version: None,
        status: DependencyStatus::Missing,
        is_optional: dependency.optional,
        source: None,
        required_by: required_by.to_string(),
        constraint: constraint.as_ref().map(ToString::to_string),
        diagnostic: None,
    };

    let Some(template) = found else {
        return resolved;
    };

    resolved.version = Some(template.version.clone());
    resolved.source = Some(source);
    resolved.status = DependencyStatus::Satisfied;

    if let Some(constraint) = constraint {
        match constraint.matches_str(&template.version) {
            Ok(true) => {}
            Ok(false) => {
                resolved.status = DependencyStatus::VersionMismatch;
                resolved.diagnostic = Some(format!(
                    "found {}, {} requires {}",
                    template.version, required_by, constraint
                ));
            }
            Err(e) => {
                resolved.status = DependencyStatus::VersionMismatch;
                resolved.diagnostic = Some(e.to_string());
            }
        }
    }

    resolved
}

/// Fold a later requirement on an already resolved name into its entry.
///
/// Returns `true` when the entry must be resolved again: it was missing
/// because only optional requirements had been seen, and now a required one
/// arrives.
fn merge_requirement(entry: &mut ResolvedDependency, req: &Requirement) -> bool {
    let dep = &req.dependency;

    if entry.is_optional && !dep.optional {
        if entry.status == DependencyStatus::Missing {
            return true;
        }
        entry.is_optional = false;
    }

    if entry.status == DependencyStatus::Satisfied {
        if let (Some(constraint), Some(version)) = (dep.constraint(), entry.version.as_deref()) {
            let diagnostic = match constraint.matches_str(version) {
                Ok(true) => None,
                Ok(false) => Some(format!("found {version}, {} requires {constraint}", req.required_by)),
                Err(e) => Some(e.to_string()),
            };
            if diagnostic.is_some() {
                entry.status = DependencyStatus::VersionMismatch;
                entry.diagnostic = diagnostic;
            }
        }
    }

    false
}

/// Resolves template dependency closures against a [`TemplateStore`].
///
/// The registry fetcher is an explicit constructor argument. Requesting
/// `fetch_missing` from a resolver built without one fails immediately with
/// [`EnvdepsError::FetcherNotConfigured`].
pub struct DependencyResolver {
    store: Arc<TemplateStore>,
    fetcher: Option<Arc<dyn RegistryFetcher>>,
    max_parallel_fetches: usize,
    fetch_timeout: Duration,
    resolve_timeout: Option<Duration>,
}

impl DependencyResolver {
    /// Create a resolver with default limits.
    pub fn new(store: Arc<TemplateStore>, fetcher: Option<Arc<dyn RegistryFetcher>>) -> Self {
        Self {
            store,
            fetcher,
            max_parallel_fetches: default_max_parallel_fetches(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            resolve_timeout: Some(DEFAULT_RESOLVE_TIMEOUT),
        }
    }

    /// Create a resolver with limits taken from `config`.
    pub fn with_config(
        store: Arc<TemplateStore>,
        fetcher: Option<Arc<dyn RegistryFetcher>>,
        config: &ResolverConfig,
    ) -> Self {
        Self::new(store, fetcher)
            .with_max_parallel_fetches(config.max_parallel_fetches)
            .with_fetch_timeout(config.fetch_timeout())
            .with_resolve_timeout(config.resolve_timeout())
    }

    /// Bound concurrent fetches within one wave. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_parallel_fetches(mut self, max: usize) -> Self {
        self.max_parallel_fetches = max.max(1);
        self
    }

    /// Deadline for each registry fetch.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Deadline for a whole resolution; `None` disables it.
    #[must_use]
    pub fn with_resolve_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    /// The store this resolver reads and populates.
    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    /// Whether a registry fetcher is configured.
    pub fn has_fetcher(&self) -> bool {
        self.fetcher.is_some()
    }

    /// The configured registry fetcher, if any.
    pub fn fetcher(&self) -> Option<&Arc<dyn RegistryFetcher>> {
        self.fetcher.as_ref()
    }

    /// Classify `dependency` of `required_by` against the store, without fetching.
    pub fn check_dependency(&self, required_by: &str, dependency: &TemplateDependency) -> ResolvedDependency {
        let found = self.store.get(&dependency.name);
        classify_dependency(required_by, dependency, found.as_deref(), DependencySource::Local)
    }

    /// Resolve the dependency closure of `target`.
    ///
    /// With `fetch_missing`, required dependencies absent from the store are
    /// fetched from the registry and added to the store.
    ///
    /// # Errors
    ///
    /// - [`EnvdepsError::FetcherNotConfigured`] if `fetch_missing` is set without a fetcher
    /// - [`EnvdepsError::TemplateNotFound`] if the target is unknown
    /// - [`EnvdepsError::CircularDependency`] if the closure has a cycle
    /// - [`EnvdepsError::ResolutionTimeout`] if the overall deadline expires
    pub async fn resolve(&self, target: &str, fetch_missing: bool) -> Result<ResolutionResult> {
        if fetch_missing && self.fetcher.is_none() {
            return Err(EnvdepsError::FetcherNotConfigured.into());
        }

        tracing::debug!("Resolving dependencies of '{}' (fetch_missing={})", target, fetch_missing);
        let deadline = self.resolve_timeout.map(|t| Instant::now() + t);
        let mut walk = Walk::new(target);

        let outcome = match deadline {
            Some(deadline) => {
                tokio::time::timeout_at(deadline, self.walk(target, fetch_missing, Some(deadline), &mut walk))
                    .await
            }
            None => Ok(self.walk(target, fetch_missing, None, &mut walk).await),
        };

        // Fetches are cut at the overall deadline too, so a walk that
        // completes after it may hold truncated entries.
        let timed_out = match outcome {
            Ok(Ok(())) => deadline.is_some_and(|d| Instant::now() >= d),
            Ok(Err(e)) => return Err(e),
            Err(_) => true,
        };

        if timed_out {
            let partial = walk.finish();
            tracing::warn!(
                "Resolution of '{}' timed out with {} dependencies resolved",
                target,
                partial.resolved.len()
            );
            return Err(EnvdepsError::ResolutionTimeout {
                partial: Box::new(partial),
            }
            .into());
        }

        let mut result = walk.finish();
        result.build_order = build_order(target, &self.store)?;

        let summary = result.summary();
        tracing::info!(
            "Resolved '{}': {} dependencies, {} satisfied, {} missing, {} mismatched, {} fetched",
            target,
            summary.total,
            summary.satisfied,
            summary.missing_required + summary.missing_optional,
            summary.mismatched,
            summary.fetched
        );
        for conflict in &result.conflicts {
            tracing::warn!("{}", conflict.to_string().trim_end());
        }

        Ok(result)
    }

    async fn walk(
        &self,
        target: &str,
        fetch_missing: bool,
        deadline: Option<Instant>,
        walk: &mut Walk,
    ) -> Result<()> {
        let root = match self.store.get(target) {
            Some(template) => template,
            None => self.fetch_target(target, fetch_missing, deadline, walk).await?,
        };

        let mut wave: Vec<Requirement> = requirements_of(&root).collect();
        let mut depth = 0usize;

        while !wave.is_empty() {
            depth += 1;
            tracing::debug!("Resolving wave {} of '{}' ({} requirements)", depth, target, wave.len());

            let mut next = Vec::new();
            let mut to_fetch = Vec::new();
            let mut deferred = Vec::new();

            for req in wave {
                let dep = &req.dependency;
                if let Some(constraint) = dep.constraint() {
                    walk.detector.add_requirement(&dep.name, &req.required_by, &constraint);
                }

                if !walk.visited.insert(dep.name.clone()) {
                    match walk.result.resolved.get_mut(&dep.name) {
                        Some(entry) => {
                            if !merge_requirement(entry, &req) {
                                tracing::debug!("Skipping '{}' (already resolved)", dep.name);
                                continue;
                            }
                            tracing::debug!("'{}' is now required by '{}'", dep.name, req.required_by);
                            walk.result.resolved.remove(&dep.name);
                        }
                        None => {
                            // The target itself, or a name still waiting to be fetched.
                            if dep.name != target {
                                deferred.push(req);
                            }
                            continue;
                        }
                    }
                }

                match self.store.get(&dep.name) {
                    Some(template) => {
                        let resolved = classify_dependency(
                            &req.required_by,
                            dep,
                            Some(template.as_ref()),
                            DependencySource::Local,
                        );
                        tracing::debug!("'{}' {} locally ({})", dep.name, resolved.status, template.version);
                        walk.record(resolved);
                        next.extend(requirements_of(&template));
                    }
                    None if dep.optional => {
                        tracing::debug!("Optional dependency '{}' is missing", dep.name);
                        walk.record(classify_dependency(&req.required_by, dep, None, DependencySource::Local));
                    }
                    None if !fetch_missing => {
                        tracing::debug!("Required dependency '{}' is missing", dep.name);
                        walk.record(classify_dependency(&req.required_by, dep, None, DependencySource::Local));
                    }
                    None => to_fetch.push(req),
                }
            }

            if !to_fetch.is_empty() {
                let outcomes = self.fetch_wave(&to_fetch, deadline).await;
                for (req, outcome) in to_fetch.iter().zip(outcomes) {
                    let dep = &req.dependency;
                    match outcome {
                        Ok(template) => {
                            tracing::info!("Fetched '{}' {} from registry", template.name, template.version);
                            let resolved = classify_dependency(
                                &req.required_by,
                                dep,
                                Some(&template),
                                DependencySource::Fetched,
                            );
                            next.extend(requirements_of(&template));
                            walk.result.fetched.insert(template.name.clone());
                            self.store.put(template);
                            walk.record(resolved);
                        }
                        Err(e) => {
                            tracing::warn!("Could not fetch '{}': {:#}", dep.name, e);
                            let mut resolved =
                                classify_dependency(&req.required_by, dep, None, DependencySource::Fetched);
                            resolved.diagnostic = Some(format!("{e:#}"));
                            walk.record(resolved);
                        }
                    }
                }
            }

            for req in deferred {
                if let Some(entry) = walk.result.resolved.get_mut(&req.dependency.name) {
                    merge_requirement(entry, &req);
                }
            }

            wave = next;
        }

        Ok(())
    }

    async fn fetch_target(
        &self,
        target: &str,
        fetch_missing: bool,
        deadline: Option<Instant>,
        walk: &mut Walk,
    ) -> Result<Arc<Template>> {
        let not_found = || EnvdepsError::TemplateNotFound {
            name: target.to_string(),
            suggestions: self.store.similar_names(target),
        };

        let Some(fetcher) = self.fetcher.as_ref().filter(|_| fetch_missing) else {
            return Err(not_found().into());
        };

        tracing::info!("Target '{}' not in store, fetching from registry", target);
        let ctx = self.fetch_context(deadline);
        match fetch_checked(fetcher.as_ref(), target, None, &ctx).await {
            Ok(template) => {
                walk.result.fetched.insert(template.name.clone());
                self.store.put(template);
                self.store.get(target).ok_or_else(|| not_found().into())
            }
            Err(e) => {
                tracing::warn!("Could not fetch target '{}': {:#}", target, e);
                Err(not_found().into())
            }
        }
    }

    /// Fetch every requirement concurrently; outcomes come back in input order.
    async fn fetch_wave(&self, reqs: &[Requirement], deadline: Option<Instant>) -> Vec<Result<Template>> {
        let Some(fetcher) = self.fetcher.as_ref() else {
            return reqs.iter().map(|_| Err(EnvdepsError::FetcherNotConfigured.into())).collect();
        };

        tracing::debug!(
            "Fetching {} templates (max {} concurrent)",
            reqs.len(),
            self.max_parallel_fetches
        );

        // Each fetch owns its inputs so the resolve future stays `Send`.
        let fetches: Vec<_> = reqs
            .iter()
            .map(|req| {
                let fetcher = Arc::clone(fetcher);
                let name = req.dependency.name.clone();
                let constraint = req.dependency.constraint();
                let ctx = self.fetch_context(deadline);
                async move { fetch_checked(fetcher.as_ref(), &name, constraint.as_ref(), &ctx).await }
            })
            .collect();

        stream::iter(fetches).buffered(self.max_parallel_fetches).collect().await
    }

    fn fetch_context(&self, deadline: Option<Instant>) -> FetchContext {
        FetchContext::with_timeout(self.fetch_timeout).narrowed(deadline)
    }
}

/// Fetch under the context deadline and verify the registry returned the
/// template that was asked for.
async fn fetch_checked(
    fetcher: &dyn RegistryFetcher,
    name: &str,
    constraint: Option<&crate::version::VersionConstraint>,
    ctx: &FetchContext,
) -> Result<Template> {
    let template = ctx.run(name, fetcher.fetch(name, constraint, ctx)).await?;
    if template.name != name {
        return Err(EnvdepsError::FetchFailed {
            name: name.to_string(),
            reason: format!("registry returned template '{}'", template.name),
        }
        .into());
    }
    Ok(template)
}
