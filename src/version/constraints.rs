//! Version operators, constraints and the constraint evaluator.
//!
//! A dependency declares a version and an operator; the pair forms a
//! [`VersionConstraint`]. The evaluator entry point is [`satisfies`], which
//! takes raw strings exactly as they appear in template declarations.
//!
//! # Supported operators
//!
//! | Operator | Meaning |
//! |---|---|
//! | `>=` | at least the given version (default when empty) |
//! | `<=` | at most the given version |
//! | `==`, `=` | exactly the given version |
//! | `>` | strictly newer |
//! | `<` | strictly older |
//! | `~>` | same major version, not older than the given version |
//!
//! All functions here are pure and can be called from any thread.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Version;
use crate::core::EnvdepsError;

/// Comparison operator of a version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VersionOperator {
    /// `>=`
    #[default]
    #[serde(rename = ">=")]
    GreaterOrEqual,
    /// `<=`
    #[serde(rename = "<=")]
    LessOrEqual,
    /// `==` (also accepts `=`)
    #[serde(rename = "==", alias = "=")]
    Equal,
    /// `>`
    #[serde(rename = ">")]
    Greater,
    /// `<`
    #[serde(rename = "<")]
    Less,
    /// `~>`
    #[serde(rename = "~>")]
    Compatible,
}

impl VersionOperator {
    /// Parse an operator string. The empty string means `>=`.
    pub fn parse(input: &str) -> Result<Self, EnvdepsError> {
        match input {
            "" | ">=" => Ok(Self::GreaterOrEqual),
            "<=" => Ok(Self::LessOrEqual),
            "==" | "=" => Ok(Self::Equal),
            ">" => Ok(Self::Greater),
            "<" => Ok(Self::Less),
            "~>" => Ok(Self::Compatible),
            other => Err(EnvdepsError::InvalidOperator {
                operator: other.to_string(),
            }),
        }
    }

    /// Canonical textual form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::Greater => ">",
            Self::Less => "<",
            Self::Compatible => "~>",
        }
    }

    /// Whether `installed` satisfies `self required`.
    pub fn compare(self, installed: &Version, required: &Version) -> bool {
        match self {
            Self::GreaterOrEqual => installed >= required,
            Self::LessOrEqual => installed <= required,
            Self::Equal => installed == required,
            Self::Greater => installed > required,
            Self::Less => installed < required,
            Self::Compatible => installed.major == required.major && installed >= required,
        }
    }
}

impl fmt::Display for VersionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionOperator {
    type Err = EnvdepsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An operator applied to a version, e.g. `>= 11.0`.
///
/// The version is kept as the declared string so that a malformed
/// declaration can still be reported verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionConstraint {
    /// Comparison operator
    pub operator: VersionOperator,
    /// Declared version string
    pub version: String,
}

impl VersionConstraint {
    /// Create a constraint from an operator and a version string.
    pub fn new(operator: VersionOperator, version: impl Into<String>) -> Self {
        Self {
            operator,
            version: version.into(),
        }
    }

    /// Parse the declared version.
    pub fn required_version(&self) -> Result<Version, EnvdepsError> {
        Version::parse(&self.version)
    }

    /// Check whether a parsed version satisfies this constraint.
    ///
    /// # Errors
    ///
    /// Fails with [`EnvdepsError::InvalidVersion`] if the declared version is
    /// malformed.
    pub fn matches(&self, installed: &Version) -> Result<bool, EnvdepsError> {
        let required = self.required_version()?;
        Ok(self.operator.compare(installed, &required))
    }

    /// Check whether a version string satisfies this constraint.
    pub fn matches_str(&self, installed: &str) -> Result<bool, EnvdepsError> {
        let installed = Version::parse(installed)?;
        self.matches(&installed)
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator, self.version)
    }
}

/// Does `installed_version` satisfy `required_version` under `operator`?
///
/// Both versions are parsed as `major[.minor[.patch]]`; an empty operator
/// means `>=`.
///
/// # Errors
///
/// - [`EnvdepsError::InvalidVersion`] if either version is malformed
/// - [`EnvdepsError::InvalidOperator`] for an unknown operator
///
/// # Examples
///
/// ```rust
/// use envdeps::version::satisfies;
///
/// # fn example() -> anyhow::Result<()> {
/// assert!(satisfies("11.2", "11.0", ">=")?);
/// assert!(satisfies("1.0", "1.0.0", "==")?);
/// assert!(satisfies("1.0.0-beta", "1.0.0", ">=").is_err());
/// # Ok(())
/// # }
/// ```
pub fn satisfies(
    installed_version: &str,
    required_version: &str,
    operator: &str,
) -> Result<bool, EnvdepsError> {
    let operator = VersionOperator::parse(operator)?;
    let installed = Version::parse(installed_version)?;
    let required = Version::parse(required_version)?;
    Ok(operator.compare(&installed, &required))
}
