//! Template data model
//!
//! A [`Template`] is a named, versioned environment definition that declares
//! an ordered list of [`TemplateDependency`] entries. Only the fields the
//! dependency engine needs are modelled; any other fields of a template
//! document (packages, users, services, ...) are ignored on load.
//!
//! # Declaration format
//!
//! ```toml
//! name = "python-ml"
//! version = "1.4.0"
//!
//! [[dependencies]]
//! name = "cuda-base"
//! version = "11.0"
//! version_operator = ">="   # default ">="
//! optional = false          # default false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::version::{VersionConstraint, VersionOperator};

/// A dependency of one template on another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDependency {
    /// Name of the required template
    pub name: String,

    /// Required version; any version satisfies the dependency when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Comparison operator applied to `version`
    #[serde(default)]
    pub version_operator: VersionOperator,

    /// Whether the template can be built without this dependency
    #[serde(default)]
    pub optional: bool,
}

impl TemplateDependency {
    /// A required dependency on any version of `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            version_operator: VersionOperator::default(),
            optional: false,
        }
    }

    /// Constrain the dependency to `operator version`.
    #[must_use]
    pub fn with_version(mut self, operator: VersionOperator, version: impl Into<String>) -> Self {
        self.version_operator = operator;
        self.version = Some(version.into());
        self
    }

    /// Mark the dependency optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// The version constraint, if a version is declared.
    pub fn constraint(&self) -> Option<VersionConstraint> {
        self.version
            .as_ref()
            .map(|v| VersionConstraint::new(self.version_operator, v.clone()))
    }
}

/// A named, versioned environment definition.
///
/// Templates are immutable once placed in a
/// [`TemplateStore`](crate::store::TemplateStore); modifications build a new
/// value and replace the stored one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Unique template name
    pub name: String,
    /// Template version, `major[.minor[.patch]]`
    pub version: String,
    /// Declared dependencies, in declaration order
    #[serde(default)]
    pub dependencies: Vec<TemplateDependency>,
}

impl Template {
    /// A template without dependencies.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            dependencies: Vec::new(),
        }
    }

    /// Append a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: TemplateDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Look up a declared dependency by name.
    pub fn dependency(&self, name: &str) -> Option<&TemplateDependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    /// Parse a template from its TOML declaration.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let template: Self = toml::from_str(content).map_err(crate::core::EnvdepsError::from)?;
        Ok(template)
    }

    /// Serialize the template back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .with_context(|| format!("Failed to serialize template '{}'", self.name))
    }
}
