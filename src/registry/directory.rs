//! Directory-backed registry.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   cuda-base/
//!     10.0.toml
//!     11.2.toml
//!   python-ml/
//!     1.4.0.toml
//! ```
//!
//! Each file holds one template declaration whose `name` must match the
//! directory name. Such a tree is typically a mounted share or a synced
//! mirror, so reads retry briefly on `NotFound` while files appear.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

use super::{FetchContext, RegistryFetcher};
use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use crate::core::EnvdepsError;
use crate::models::Template;
use crate::version::{VersionComparator, VersionConstraint};

/// Registry reading `<root>/<name>/<version>.toml` files.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    /// Create a registry rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The registry root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the versions of `name`.
    ///
    /// Names must be a single normal path component so a request cannot
    /// escape the registry root.
    fn template_dir(&self, name: &str) -> Result<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.root.join(name)),
            _ => Err(EnvdepsError::FetchFailed {
                name: name.to_string(),
                reason: "invalid template name".to_string(),
            }
            .into()),
        }
    }

    async fn versions_of(&self, name: &str) -> Result<Vec<String>> {
        let dir = self.template_dir(name)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read registry directory {}", dir.display()));
            }
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    versions.push(stem.to_string());
                }
            }
        }
        versions.sort();
        Ok(versions)
    }

    async fn read_template(&self, name: &str, version: &str, ctx: &FetchContext) -> Result<Template> {
        let path = self.template_dir(name)?.join(format!("{version}.toml"));
        let content = read_with_retry(&path, ctx).await?;
        let template = Template::from_toml_str(&content)
            .with_context(|| format!("Invalid template file {}", path.display()))?;

        if template.name != name {
            return Err(EnvdepsError::FetchFailed {
                name: name.to_string(),
                reason: format!("{} declares template '{}'", path.display(), template.name),
            }
            .into());
        }
        Ok(template)
    }
}

/// Read a file, retrying `NotFound` with exponential backoff until the
/// context deadline.
///
/// # Retry Strategy
/// - Initial delay: 10ms
/// - Max delay: 500ms (capped)
/// - Retries: 5
/// - Only retries on `NotFound` errors; other errors fail immediately
async fn read_with_retry(path: &Path, ctx: &FetchContext) -> Result<String> {
    let strategy = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
        .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
        .take(5);

    RetryIf::start(
        strategy,
        || async move {
            tokio::fs::read_to_string(path).await.inspect_err(|e| {
                tracing::debug!(
                    target: "registry::directory",
                    "Read of {} failed ({:?}), may retry",
                    path.display(),
                    e.kind()
                );
            })
        },
        |e: &std::io::Error| e.kind() == std::io::ErrorKind::NotFound && !ctx.is_expired(),
    )
    .await
    .with_context(|| format!("Failed to read template file {}", path.display()))
}

#[async_trait]
impl RegistryFetcher for DirectoryRegistry {
    async fn fetch(
        &self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        ctx: &FetchContext,
    ) -> Result<Template> {
        ctx.run(name, async {
            let versions = self.versions_of(name).await?;
            if versions.is_empty() {
                return Err(EnvdepsError::FetchFailed {
                    name: name.to_string(),
                    reason: format!("not found in registry {}", self.root.display()),
                }
                .into());
            }

            let chosen = match constraint {
                Some(c) => VersionComparator::find_compatible(&versions, c).into_iter().next(),
                None => VersionComparator::get_latest(&versions),
            };
            let Some(version) = chosen else {
                let wanted = constraint.map_or_else(|| "any version".to_string(), ToString::to_string);
                return Err(EnvdepsError::FetchFailed {
                    name: name.to_string(),
                    reason: format!("no published version satisfies {wanted}"),
                }
                .into());
            };

            tracing::debug!("Reading '{}' {} from {}", name, version, self.root.display());
            self.read_template(name, &version, ctx).await
        })
        .await
    }

    async fn list_versions(&self, name: &str, ctx: &FetchContext) -> Result<Vec<String>> {
        ctx.run(name, self.versions_of(name)).await
    }
}
