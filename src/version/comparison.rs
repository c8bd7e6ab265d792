//! Version comparison utilities for lists of version strings.
//!
//! Registries report the versions they hold as raw strings. These helpers
//! filter such lists by a constraint and order them newest first, skipping
//! entries that are not valid template versions.
//!
//! # Examples
//!
//! ```rust
//! use envdeps::version::{VersionComparator, VersionConstraint, VersionOperator};
//!
//! let versions = vec![
//!     "10.0".to_string(),
//!     "11.2".to_string(),
//!     "11.0.1".to_string(),
//!     "nightly".to_string(),
//! ];
//!
//! let constraint = VersionConstraint::new(VersionOperator::GreaterOrEqual, "11.0");
//! let compatible = VersionComparator::find_compatible(&versions, &constraint);
//! assert_eq!(compatible, vec!["11.2", "11.0.1"]);
//! ```

use super::{Version, VersionConstraint};

/// Version comparison utilities.
pub struct VersionComparator;

impl VersionComparator {
    /// Returns the valid versions from `versions` sorted newest first.
    ///
    /// Malformed version strings are dropped with a debug log entry.
    pub fn sort_descending(versions: &[String]) -> Vec<String> {
        let mut parsed: Vec<(Version, &String)> = versions
            .iter()
            .filter_map(|raw| match Version::parse(raw) {
                Ok(v) => Some((v, raw)),
                Err(e) => {
                    tracing::debug!("Ignoring unparsable version '{}': {}", raw, e);
                    None
                }
            })
            .collect();

        parsed.sort_by(|a, b| b.0.cmp(&a.0));
        parsed.into_iter().map(|(_, raw)| raw.clone()).collect()
    }

    /// Returns the versions that satisfy `constraint`, newest first.
    ///
    /// Returns an empty list if the constraint's own version is malformed.
    pub fn find_compatible(versions: &[String], constraint: &VersionConstraint) -> Vec<String> {
        let Ok(required) = constraint.required_version() else {
            return Vec::new();
        };

        Self::sort_descending(versions)
            .into_iter()
            .filter(|raw| {
                Version::parse(raw).is_ok_and(|v| constraint.operator.compare(&v, &required))
            })
            .collect()
    }

    /// Returns the newest valid version in the list, if any.
    pub fn get_latest(versions: &[String]) -> Option<String> {
        Self::sort_descending(versions).into_iter().next()
    }
}
