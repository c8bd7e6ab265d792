//! Retry decorator for registry fetchers.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

use super::{FetchContext, RegistryFetcher};
use crate::constants::{DEFAULT_FETCH_RETRIES, MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use crate::core::EnvdepsError;
use crate::models::Template;
use crate::version::VersionConstraint;

/// Wraps a fetcher and retries failed calls with exponential backoff.
///
/// Retries stop once the [`FetchContext`] deadline has passed, so the
/// decorator never extends a caller's deadline.
///
/// # Retry Strategy
/// - Delays: 10ms, 100ms, then 500ms (capped)
/// - Attempts: 1 + `retries`
/// - Only transient errors are retried; a template the registry does not
///   have, or a malformed version, fails immediately
pub struct RetryingFetcher<F> {
    inner: F,
    retries: usize,
}

impl<F: RegistryFetcher> RetryingFetcher<F> {
    /// Wrap `inner` with the default number of retries.
    pub fn new(inner: F) -> Self {
        Self::with_retries(inner, DEFAULT_FETCH_RETRIES)
    }

    /// Wrap `inner`, retrying up to `retries` times after the first failure.
    pub fn with_retries(inner: F, retries: usize) -> Self {
        Self { inner, retries }
    }

    /// The wrapped fetcher.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    fn strategy(&self) -> std::iter::Take<ExponentialBackoff> {
        ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
            .take(self.retries)
    }
}

/// Whether a failed call is worth repeating.
fn is_transient(error: &anyhow::Error) -> bool {
    !matches!(
        error.downcast_ref::<EnvdepsError>(),
        Some(
            EnvdepsError::FetchFailed { .. }
                | EnvdepsError::InvalidVersion { .. }
                | EnvdepsError::InvalidOperator { .. }
        )
    )
}

#[async_trait]
impl<F: RegistryFetcher> RegistryFetcher for RetryingFetcher<F> {
    async fn fetch(
        &self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        ctx: &FetchContext,
    ) -> Result<Template> {
        let mut attempt = 0usize;
        RetryIf::start(
            self.strategy(),
            || {
                attempt += 1;
                let attempt = attempt;
                async move {
                    self.inner.fetch(name, constraint, ctx).await.inspect_err(|e| {
                        tracing::warn!("Fetch of '{}' failed (attempt {}): {:#}", name, attempt, e);
                    })
                }
            },
            |e: &anyhow::Error| is_transient(e) && !ctx.is_expired(),
        )
        .await
    }

    async fn list_versions(&self, name: &str, ctx: &FetchContext) -> Result<Vec<String>> {
        RetryIf::start(
            self.strategy(),
            || self.inner.list_versions(name, ctx),
            |e: &anyhow::Error| is_transient(e) && !ctx.is_expired(),
        )
        .await
    }
}
