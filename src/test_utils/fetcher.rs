//! A registry fetcher whose behavior tests can script.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::core::EnvdepsError;
use crate::models::Template;
use crate::registry::{FetchContext, MemoryRegistry, RegistryFetcher};
use crate::version::VersionConstraint;

/// Registry fetcher backed by a [`MemoryRegistry`] that records every call
/// and can inject failures and delays per template name.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    registry: MemoryRegistry,
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter even when the fetch future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedFetcher {
    /// An empty fetcher: every fetch fails with "not found in registry".
    pub fn new() -> Self {
        Self::default()
    }

    /// A fetcher serving `templates`.
    pub fn with_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        Self {
            registry: MemoryRegistry::with_templates(templates),
            ..Self::default()
        }
    }

    /// Make every fetch of `name` fail with `reason`.
    #[must_use]
    pub fn failing(mut self, name: &str, reason: &str) -> Self {
        self.failures.insert(name.to_string(), reason.to_string());
        self
    }

    /// Delay every fetch of `name` by `delay`.
    #[must_use]
    pub fn delayed(mut self, name: &str, delay: Duration) -> Self {
        self.delays.insert(name.to_string(), delay);
        self
    }

    /// Delay every fetch without a per-name delay by `delay`.
    #[must_use]
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    /// Names fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of fetches of `name`.
    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).iter().filter(|n| *n == name).count()
    }

    /// Highest number of fetches observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        ctx: &FetchContext,
    ) -> Result<Template> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(name.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delays.get(name).copied().or(self.default_delay) {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = self.failures.get(name) {
            return Err(EnvdepsError::FetchFailed {
                name: name.to_string(),
                reason: reason.clone(),
            }
            .into());
        }

        self.registry.fetch(name, constraint, ctx).await
    }

    async fn list_versions(&self, name: &str, ctx: &FetchContext) -> Result<Vec<String>> {
        self.registry.list_versions(name, ctx).await
    }
}
