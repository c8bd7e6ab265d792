//! In-process registry.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{FetchContext, RegistryFetcher};
use crate::core::EnvdepsError;
use crate::models::Template;
use crate::version::{Version, VersionConstraint};

/// Registry that keeps every published version of each template in memory.
///
/// `fetch` returns the newest published version that satisfies the
/// constraint. Versions that do not parse are never selected.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    templates: RwLock<HashMap<String, Vec<Template>>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding `templates`.
    pub fn with_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let registry = Self::new();
        for template in templates {
            registry.publish(template);
        }
        registry
    }

    /// Publish a template version. Publishing the same version again replaces it.
    pub fn publish(&self, template: Template) {
        let mut templates = self.templates.write().unwrap_or_else(PoisonError::into_inner);
        let versions = templates.entry(template.name.clone()).or_default();
        versions.retain(|t| t.version != template.version);
        versions.push(template);
    }

    fn select(&self, name: &str, constraint: Option<&VersionConstraint>) -> Result<Template> {
        let templates = self.templates.read().unwrap_or_else(PoisonError::into_inner);
        let versions = templates.get(name).ok_or_else(|| EnvdepsError::FetchFailed {
            name: name.to_string(),
            reason: "not found in registry".to_string(),
        })?;

        let mut best: Option<(Version, &Template)> = None;
        for template in versions {
            let Ok(version) = Version::parse(&template.version) else {
                continue;
            };
            let acceptable = match constraint {
                Some(c) => c.matches(&version)?,
                None => true,
            };
            if acceptable && best.as_ref().is_none_or(|(v, _)| version > *v) {
                best = Some((version, template));
            }
        }

        best.map(|(_, t)| t.clone()).ok_or_else(|| {
            let wanted = constraint.map_or_else(|| "any version".to_string(), ToString::to_string);
            EnvdepsError::FetchFailed {
                name: name.to_string(),
                reason: format!("no published version satisfies {wanted}"),
            }
            .into()
        })
    }
}

#[async_trait]
impl RegistryFetcher for MemoryRegistry {
    async fn fetch(
        &self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        ctx: &FetchContext,
    ) -> Result<Template> {
        if ctx.is_expired() {
            return Err(EnvdepsError::FetchFailed {
                name: name.to_string(),
                reason: "deadline exceeded".to_string(),
            }
            .into());
        }
        self.select(name, constraint)
    }

    async fn list_versions(&self, name: &str, _ctx: &FetchContext) -> Result<Vec<String>> {
        let templates = self.templates.read().unwrap_or_else(PoisonError::into_inner);
        Ok(templates
            .get(name)
            .map(|versions| versions.iter().map(|t| t.version.clone()).collect())
            .unwrap_or_default())
    }
}
