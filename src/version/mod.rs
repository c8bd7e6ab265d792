//! Template version parsing and constraint evaluation.
//!
//! Template versions are plain dot-separated numbers: `major[.minor[.patch]]`.
//! Missing components default to `0`, so `"11"`, `"11.0"` and `"11.0.0"` are
//! the same version. Comparison is numeric and component-wise from left to
//! right.
//!
//! Anything that is not decomposable into numeric components is rejected with
//! [`EnvdepsError::InvalidVersion`]. There is deliberately no support for
//! prefixes (`v1.0`) or pre-release tags (`1.0.0-beta`): a caller that gets an
//! invalid version reports it rather than guessing what was meant.
//!
//! # Modules
//!
//! - [`constraints`] - Operators, constraints and the [`satisfies`] evaluator
//! - [`comparison`] - Filtering and ordering lists of version strings
//! - [`conflict`] - Merging competing constraints placed on one template
//!
//! # Examples
//!
//! ```rust
//! use envdeps::version::{Version, satisfies};
//!
//! # fn example() -> anyhow::Result<()> {
//! let v: Version = "11.2".parse()?;
//! assert_eq!(v.to_string(), "11.2.0");
//!
//! assert!(satisfies("1.2.0", "1.0.0", ">=")?);
//! assert!(!satisfies("1.2.0", "2.0.0", ">=")?);
//! # Ok(())
//! # }
//! ```

pub mod comparison;
pub mod conflict;
pub mod constraints;

pub use comparison::VersionComparator;
pub use conflict::{ConflictDetector, ConflictingRequirement, ConstraintSet, VersionConflict};
pub use constraints::{VersionConstraint, VersionOperator, satisfies};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::core::EnvdepsError;

/// A numeric template version.
///
/// Ordering is derived field by field, which is exactly the component-wise
/// comparison the evaluator needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    /// Major component
    pub major: u64,
    /// Minor component, `0` when absent
    pub minor: u64,
    /// Patch component, `0` when absent
    pub patch: u64,
}

impl Version {
    /// Create a version from its three components.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a `major[.minor[.patch]]` version string.
    ///
    /// # Errors
    ///
    /// Returns [`EnvdepsError::InvalidVersion`] when the string is empty, has
    /// more than three components, or any component is not an unsigned
    /// decimal integer.
    pub fn parse(input: &str) -> Result<Self, EnvdepsError> {
        let invalid = |reason: &str| EnvdepsError::InvalidVersion {
            version: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("version is empty"));
        }

        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid("expected at most three components (major.minor.patch)"));
        }

        let mut components = [0u64; 3];
        for (slot, part) in components.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(&format!("component '{part}' is not numeric")));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid(&format!("component '{part}' is out of range")))?;
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = EnvdepsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
