//! Remote template registries.
//!
//! The resolver obtains templates that are missing from the local
//! [`TemplateStore`](crate::store::TemplateStore) through the
//! [`RegistryFetcher`] trait. The wire protocol and authentication of a real
//! registry live behind this trait; the resolver only relies on the contract:
//!
//! - `fetch` returns a template named `name` whose version satisfies the
//!   constraint (or any version when there is none), including its own
//!   declared dependencies.
//! - Every call receives a [`FetchContext`] carrying the caller's deadline.
//!   Implementations should stop work once it has passed; the resolver also
//!   cancels calls that overrun it.
//! - Retry and back-off are the fetcher's responsibility. Wrap any fetcher in
//!   [`RetryingFetcher`] to add exponential back-off.
//!
//! # Implementations
//!
//! - [`MemoryRegistry`] - in-process registry holding several versions per name
//! - [`DirectoryRegistry`] - `<root>/<name>/<version>.toml` on disk
//! - [`RetryingFetcher`] - retry decorator for any fetcher

pub mod directory;
pub mod memory;
pub mod retry;

pub use directory::DirectoryRegistry;
pub use memory::MemoryRegistry;
pub use retry::RetryingFetcher;

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::EnvdepsError;
use crate::models::Template;
use crate::version::VersionConstraint;

/// Deadline and cancellation information passed to every registry call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchContext {
    deadline: Option<Instant>,
}

impl FetchContext {
    /// A context without a deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Narrow the deadline to `deadline` if that is earlier.
    #[must_use]
    pub fn narrowed(self, deadline: Option<Instant>) -> Self {
        let deadline = match (self.deadline, deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self { deadline }
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Drive `fut` to completion, cancelling it at the deadline.
    ///
    /// An expired deadline surfaces as [`EnvdepsError::FetchFailed`] for `name`.
    pub async fn run<T, F>(&self, name: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => result,
                Err(_) => Err(EnvdepsError::FetchFailed {
                    name: name.to_string(),
                    reason: "deadline exceeded".to_string(),
                }
                .into()),
            },
            None => fut.await,
        }
    }
}

/// Source of template definitions that are not in the local store.
#[async_trait]
pub trait RegistryFetcher: Send + Sync {
    /// Fetch the newest template called `name` that satisfies `constraint`.
    async fn fetch(
        &self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        ctx: &FetchContext,
    ) -> Result<Template>;

    /// List every version of `name` the registry holds.
    async fn list_versions(&self, name: &str, ctx: &FetchContext) -> Result<Vec<String>>;
}
