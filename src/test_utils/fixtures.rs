//! Template fixtures for tests.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::models::{Template, TemplateDependency};
use crate::store::TemplateStore;
use crate::version::VersionOperator;

/// Build a template with the given dependencies.
pub fn template(
    name: &str,
    version: &str,
    dependencies: impl IntoIterator<Item = TemplateDependency>,
) -> Template {
    dependencies.into_iter().fold(Template::new(name, version), Template::with_dependency)
}

/// A required dependency accepting any version.
pub fn dep(name: &str) -> TemplateDependency {
    TemplateDependency::new(name)
}

/// A required `>= version` dependency.
pub fn dep_ge(name: &str, version: &str) -> TemplateDependency {
    TemplateDependency::new(name).with_version(VersionOperator::GreaterOrEqual, version)
}

/// An optional dependency accepting any version.
pub fn optional(name: &str) -> TemplateDependency {
    TemplateDependency::new(name).optional()
}

/// A shared store holding `templates`.
pub fn store(templates: impl IntoIterator<Item = Template>) -> Arc<TemplateStore> {
    Arc::new(TemplateStore::with_templates(templates))
}

/// Write each template to `<dir>/<name>.toml`, the catalog layout read by
/// [`TemplateStore::load_dir`].
pub fn write_catalog<'a>(dir: &Path, templates: impl IntoIterator<Item = &'a Template>) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for template in templates {
        let path = dir.join(format!("{}.toml", template.name));
        std::fs::write(&path, template.to_toml_string()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Write each template to `<root>/<name>/<version>.toml`, the layout read by
/// [`crate::registry::DirectoryRegistry`].
pub fn write_registry<'a>(root: &Path, templates: impl IntoIterator<Item = &'a Template>) -> Result<()> {
    for template in templates {
        let dir = root.join(&template.name);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.toml", template.version));
        std::fs::write(&path, template.to_toml_string()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}
