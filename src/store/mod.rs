//! In-memory catalog of known templates.
//!
//! [`TemplateStore`] maps template names to [`Template`] definitions. There is
//! one entry per name: [`put`](TemplateStore::put) replaces any existing entry
//! wholesale (last write wins). Entries are handed out as `Arc<Template>`, so
//! readers keep a consistent snapshot even if the entry is replaced while
//! they hold it.
//!
//! All mutation goes through a single `RwLock`. The store is shared between
//! concurrent resolutions as `Arc<TemplateStore>`, and fetched templates are
//! inserted while other readers traverse it.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::constants::SIMILARITY_THRESHOLD_PERCENT;
use crate::models::Template;

/// Thread-safe template catalog.
#[derive(Debug, Default)]
pub struct TemplateStore {
    templates: RwLock<HashMap<String, Arc<Template>>>,
}

impl TemplateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `templates`.
    pub fn with_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let store = Self::new();
        for template in templates {
            store.put(template);
        }
        store
    }

    /// Look up a template by name.
    pub fn get(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Insert a template, replacing any entry with the same name.
    ///
    /// Returns the replaced entry, if any.
    pub fn put(&self, template: Template) -> Option<Arc<Template>> {
        let name = template.name.clone();
        let previous = self
            .templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Arc::new(template));
        if let Some(ref old) = previous {
            tracing::debug!("Replaced template '{}' {} in store", name, old.version);
        }
        previous
    }

    /// Remove a template by name, returning it if it was present.
    pub fn remove(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.write().unwrap_or_else(PoisonError::into_inner).remove(name)
    }

    /// Whether a template with this name is present.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    /// All template names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.templates.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of templates in the store.
    pub fn len(&self) -> usize {
        self.templates.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to three known names close to `name`, closest first.
    ///
    /// Used to suggest alternatives when a template is not found.
    pub fn similar_names(&self, name: &str) -> Vec<String> {
        let mut scored: Vec<(String, usize)> = self
            .names()
            .into_iter()
            .map(|candidate| {
                let distance = strsim::levenshtein(name, &candidate);
                (candidate, distance)
            })
            .collect();

        scored.sort_by_key(|(_, dist)| *dist);

        scored
            .into_iter()
            .filter(|(_, dist)| *dist > 0 && *dist <= name.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
            .take(3)
            .map(|(candidate, _)| candidate)
            .collect()
    }

    /// Load every `*.toml` file in `dir` (non-recursive) into a new store.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be read or any file is not a valid
    /// template declaration; the error names the offending file.
    pub async fn load_dir(dir: &Path) -> Result<Self> {
        let store = Self::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read template catalog {}", dir.display()))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read template file {}", path.display()))?;
            let template = Template::from_toml_str(&content)
                .with_context(|| format!("Invalid template file {}", path.display()))?;
            store.put(template);
        }

        tracing::debug!("Loaded {} templates from {}", store.len(), dir.display());
        Ok(store)
    }
}
