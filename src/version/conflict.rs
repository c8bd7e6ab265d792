//! Version conflict detection and reporting.
//!
//! When several templates depend on the same template with different
//! constraints, the constraints may admit no common version. This module
//! merges constraints into a [`ConstraintSet`] (exact version, highest lower
//! bound, lowest upper bound) and reports unsatisfiable sets as
//! [`VersionConflict`]s.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::{Version, VersionComparator, VersionConstraint, VersionOperator};
use crate::core::EnvdepsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// The intersection of a set of version constraints.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    exact: Option<Version>,
    conflicting_exact: bool,
    lower: Option<Bound>,
    upper: Option<Bound>,
    constraints: Vec<VersionConstraint>,
}

impl ConstraintSet {
    /// Create an empty (unconstrained) set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intersect the set with another constraint.
    ///
    /// # Errors
    ///
    /// Fails with [`EnvdepsError::InvalidVersion`] if the constraint's version
    /// is malformed; the set is left unchanged in that case.
    pub fn add(&mut self, constraint: &VersionConstraint) -> Result<(), EnvdepsError> {
        let version = constraint.required_version()?;
        match constraint.operator {
            VersionOperator::Equal => match self.exact {
                Some(existing) if existing != version => self.conflicting_exact = true,
                _ => self.exact = Some(version),
            },
            VersionOperator::GreaterOrEqual => self.raise_lower(version, true),
            VersionOperator::Greater => self.raise_lower(version, false),
            VersionOperator::LessOrEqual => self.lower_upper(version, true),
            VersionOperator::Less => self.lower_upper(version, false),
            VersionOperator::Compatible => {
                self.raise_lower(version, true);
                // No upper bound above the largest major version.
                if let Some(next_major) = version.major.checked_add(1) {
                    self.lower_upper(Version::new(next_major, 0, 0), false);
                }
            }
        }
        self.constraints.push(constraint.clone());
        Ok(())
    }

    fn raise_lower(&mut self, version: Version, inclusive: bool) {
        let replace = match self.lower {
            None => true,
            Some(b) => version > b.version || (version == b.version && !inclusive),
        };
        if replace {
            self.lower = Some(Bound { version, inclusive });
        }
    }

    fn lower_upper(&mut self, version: Version, inclusive: bool) {
        let replace = match self.upper {
            None => true,
            Some(b) => version < b.version || (version == b.version && !inclusive),
        };
        if replace {
            self.upper = Some(Bound { version, inclusive });
        }
    }

    fn within_bounds(&self, v: &Version) -> bool {
        let above = self.lower.is_none_or(|b| if b.inclusive { *v >= b.version } else { *v > b.version });
        let below = self.upper.is_none_or(|b| if b.inclusive { *v <= b.version } else { *v < b.version });
        above && below
    }

    /// Whether `version` satisfies every constraint in the set.
    pub fn allows(&self, version: &Version) -> bool {
        if self.conflicting_exact {
            return false;
        }
        if let Some(exact) = self.exact {
            if exact != *version {
                return false;
            }
        }
        self.within_bounds(version)
    }

    /// Whether at least one version satisfies every constraint in the set.
    pub fn is_satisfiable(&self) -> bool {
        if self.conflicting_exact {
            return false;
        }
        if let Some(exact) = self.exact {
            return self.within_bounds(&exact);
        }
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) => {
                if lo.version == hi.version {
                    lo.inclusive && hi.inclusive
                } else {
                    // Two exclusive bounds one patch apart admit no version.
                    lo.version < hi.version
                        && (lo.inclusive || hi.inclusive || !adjacent(&lo.version, &hi.version))
                }
            }
            _ => true,
        }
    }

    /// Pick one concrete version for the set.
    ///
    /// Preference order: the exact version, the newest entry of `available`
    /// that the set allows, the lower bound, the upper bound. Exclusive bounds
    /// are never returned since they are not themselves allowed.
    pub fn pick(&self, available: &[String]) -> Option<String> {
        if !self.is_satisfiable() {
            return None;
        }
        if let Some(exact) = self.exact {
            return Some(exact.to_string());
        }
        let newest = VersionComparator::sort_descending(available)
            .into_iter()
            .find(|raw| Version::parse(raw).is_ok_and(|v| self.allows(&v)));
        if newest.is_some() {
            return newest;
        }
        [self.lower, self.upper]
            .into_iter()
            .flatten()
            .find(|b| b.inclusive)
            .map(|b| b.version.to_string())
    }

    /// The constraints merged into this set, in insertion order.
    pub fn constraints(&self) -> &[VersionConstraint] {
        &self.constraints
    }
}

fn adjacent(lo: &Version, hi: &Version) -> bool {
    lo.major == hi.major && lo.minor == hi.minor && lo.patch.checked_add(1) == Some(hi.patch)
}

/// One requirement that takes part in a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictingRequirement {
    /// Template that declared the dependency
    pub required_by: String,
    /// The declared constraint, e.g. `>= 11.0`
    pub constraint: String,
}

/// Represents a version conflict between dependencies on one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionConflict {
    /// Template the conflicting constraints apply to
    pub name: String,
    /// All constraints placed on the template
    pub requirements: Vec<ConflictingRequirement>,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version conflict for '{}':", self.name)?;
        for req in &self.requirements {
            writeln!(f, "  - {} requires {}", req.required_by, req.constraint)?;
        }
        Ok(())
    }
}

/// Collects requirements per template and detects unsatisfiable ones.
#[derive(Debug, Default)]
pub struct ConflictDetector {
    requirements: BTreeMap<String, Vec<(String, VersionConstraint)>>,
}

impl ConflictDetector {
    /// Create an empty detector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `required_by` places `constraint` on `name`.
    pub fn add_requirement(&mut self, name: &str, required_by: &str, constraint: &VersionConstraint) {
        self.requirements
            .entry(name.to_string())
            .or_default()
            .push((required_by.to_string(), constraint.clone()));
    }

    /// Detect conflicts among the recorded requirements, sorted by name.
    ///
    /// Constraints with malformed versions are ignored here; they are
    /// reported as mismatches by the resolver.
    pub fn detect_conflicts(&self) -> Vec<VersionConflict> {
        let mut conflicts = Vec::new();

        for (name, requirements) in &self.requirements {
            if requirements.len() <= 1 {
                continue;
            }

            let mut set = ConstraintSet::new();
            for (_, constraint) in requirements {
                let _ = set.add(constraint);
            }

            if !set.is_satisfiable() {
                conflicts.push(VersionConflict {
                    name: name.clone(),
                    requirements: requirements
                        .iter()
                        .map(|(required_by, c)| ConflictingRequirement {
                            required_by: required_by.clone(),
                            constraint: c.to_string(),
                        })
                        .collect(),
                });
            }
        }

        conflicts
    }
}
