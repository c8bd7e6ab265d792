//! Error handling for envdeps
//!
//! This module provides the error types and user-facing error reporting for the
//! template dependency engine. The error system follows two rules:
//! 1. **Strongly-typed errors** for the failures callers need to match on
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Fatal vs. recorded problems
//!
//! Only structural problems surface as errors: a dependency cycle, a target
//! template that cannot be found, a misconfigured resolver, or an expired
//! resolution deadline. Problems with individual dependencies (missing,
//! version mismatch, unfetchable) are recorded on the resolution result and
//! never abort a resolution.
//!
//! # Examples
//!
//! ```rust,no_run
//! use envdeps::core::{EnvdepsError, user_friendly_error};
//!
//! let error = EnvdepsError::CircularDependency {
//!     path: vec!["a".to_string(), "b".to_string(), "a".to_string()],
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // Shows colored error with suggestions
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::resolver::ResolutionResult;

/// The main error type for envdeps operations.
///
/// # Error Categories
///
/// ## Dependency Structure
/// - [`CircularDependency`] - A cycle in the dependency closure
/// - [`TemplateNotFound`] - The target template itself is unknown
/// - [`DuplicateDependency`] - A template already declares the dependency
/// - [`DependencyValidation`] - Required dependencies are missing or mismatched
///
/// ## Versions
/// - [`InvalidVersion`] - A version string is not numeric dot-separated
/// - [`InvalidOperator`] - An unknown comparison operator
///
/// ## Registry
/// - [`FetchFailed`] - The registry could not deliver a template
/// - [`FetcherNotConfigured`] - Fetching was requested without a fetcher
/// - [`ResolutionTimeout`] - The overall deadline expired
///
/// ## Configuration
/// - [`ConfigError`], [`TomlError`]
///
/// [`CircularDependency`]: EnvdepsError::CircularDependency
/// [`TemplateNotFound`]: EnvdepsError::TemplateNotFound
/// [`DuplicateDependency`]: EnvdepsError::DuplicateDependency
/// [`DependencyValidation`]: EnvdepsError::DependencyValidation
/// [`InvalidVersion`]: EnvdepsError::InvalidVersion
/// [`InvalidOperator`]: EnvdepsError::InvalidOperator
/// [`FetchFailed`]: EnvdepsError::FetchFailed
/// [`FetcherNotConfigured`]: EnvdepsError::FetcherNotConfigured
/// [`ResolutionTimeout`]: EnvdepsError::ResolutionTimeout
/// [`ConfigError`]: EnvdepsError::ConfigError
/// [`TomlError`]: EnvdepsError::TomlError
#[derive(Error, Debug)]
pub enum EnvdepsError {
    /// A dependency cycle was found while computing the build order.
    ///
    /// `path` lists the templates on the cycle, starting and ending with the
    /// same name (e.g. `a → b → c → a`).
    #[error("Circular dependency detected: {}", path.join(" → "))]
    CircularDependency {
        /// Template names along the cycle, first and last are equal
        path: Vec<String>,
    },

    /// The target template is absent from the store and could not be fetched.
    #[error("Template not found: {name}")]
    TemplateNotFound {
        /// Name of the requested template
        name: String,
        /// Similarly named templates known to the store
        suggestions: Vec<String>,
    },

    /// A version string could not be decomposed into numeric components.
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion {
        /// The offending version string
        version: String,
        /// Why parsing failed
        reason: String,
    },

    /// A comparison operator outside the supported set.
    #[error("Invalid version operator '{operator}' (expected one of >=, <=, ==, =, >, <, ~>)")]
    InvalidOperator {
        /// The offending operator
        operator: String,
    },

    /// Constraints placed on one template admit no common version.
    #[error("Conflicting version requirements for '{name}': {details}")]
    VersionConflict {
        /// Template the constraints apply to
        name: String,
        /// The constraints that cannot be satisfied together
        details: String,
    },

    /// The registry failed to deliver a template.
    #[error("Failed to fetch template '{name}': {reason}")]
    FetchFailed {
        /// Template that was requested
        name: String,
        /// Failure reported by the fetcher
        reason: String,
    },

    /// `fetch_missing` was requested but the resolver has no registry fetcher.
    #[error("Registry fetcher not configured, cannot fetch missing dependencies")]
    FetcherNotConfigured,

    /// The template already declares a dependency with this name.
    #[error("Template '{template}' already has dependency '{dependency}'")]
    DuplicateDependency {
        /// Template being modified
        template: String,
        /// Name of the duplicate dependency
        dependency: String,
    },

    /// One or more required dependencies are missing or do not satisfy their constraint.
    #[error("Template '{template}' has {} dependency validation error(s): {}", failures.len(), failures.join("; "))]
    DependencyValidation {
        /// Template being validated
        template: String,
        /// One message per failed required dependency
        failures: Vec<String>,
    },

    /// The overall resolution deadline expired.
    ///
    /// The partial result accumulated before the deadline is attached so that
    /// callers can still report on what was resolved.
    #[error("Dependency resolution for '{}' timed out after resolving {} dependencies", partial.target, partial.resolved.len())]
    ResolutionTimeout {
        /// Everything resolved before the deadline
        partial: Box<ResolutionResult>,
    },

    /// Invalid configuration value or file.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// TOML deserialization error.
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Error wrapper carrying a user-facing suggestion and details.
///
/// Created by [`user_friendly_error`] and displayed by the CLI.
#[derive(Debug)]
pub struct ErrorContext {
    /// Top-level error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context from a plain message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions.
///
/// Recognizes [`EnvdepsError`] variants anywhere in the error chain, I/O
/// errors and TOML errors. Anything else is displayed with its full context
/// chain.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(err) = error.chain().find_map(|e| e.downcast_ref::<EnvdepsError>()) {
        return create_error_context(err, &error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let ctx = ErrorContext::new(format!("{error:#}"));
        return match io_error.kind() {
            std::io::ErrorKind::NotFound => ctx
                .with_suggestion("Check that the file or directory exists and the path is correct"),
            std::io::ErrorKind::PermissionDenied => {
                ctx.with_suggestion("Check file ownership and permissions")
            }
            _ => ctx,
        };
    }

    ErrorContext::new(format!("{error:#}"))
}

fn create_error_context(err: &EnvdepsError, full: &anyhow::Error) -> ErrorContext {
    let ctx = ErrorContext::new(format!("{full:#}"));
    match err {
        EnvdepsError::CircularDependency { .. } => ctx
            .with_details("Templates on the cycle can never be built because each waits on the other")
            .with_suggestion("Remove one of the dependencies on the cycle from its template definition"),
        EnvdepsError::TemplateNotFound { suggestions, .. } => {
            let ctx = ctx.with_details("The template is neither in the local catalog nor in the registry");
            if suggestions.is_empty() {
                ctx.with_suggestion("Check the template name or pass --registry to fetch it")
            } else {
                ctx.with_suggestion(format!("Did you mean: {}?", suggestions.join(", ")))
            }
        }
        EnvdepsError::InvalidVersion { .. } => ctx
            .with_details("Versions are dot-separated numbers such as '1', '1.2' or '1.2.3'")
            .with_suggestion("Pre-release and prefixed versions like 'v1.0' or '1.0.0-beta' are not supported"),
        EnvdepsError::InvalidOperator { .. } => {
            ctx.with_suggestion("Use one of: >=, <=, ==, >, <, ~>")
        }
        EnvdepsError::FetcherNotConfigured => {
            ctx.with_suggestion("Pass --registry <DIR> or set 'registry_dir' in the config file")
        }
        EnvdepsError::ResolutionTimeout { .. } => ctx.with_suggestion(
            "Increase 'resolve_timeout_secs' in the config file or ENVDEPS_RESOLVE_TIMEOUT",
        ),
        EnvdepsError::ConfigError { .. } | EnvdepsError::TomlError(_) => ctx
            .with_suggestion("Check the configuration file syntax (ENVDEPS_CONFIG_PATH or ~/.envdeps/config.toml)"),
        EnvdepsError::DependencyValidation { .. } => ctx.with_suggestion(
            "Run 'envdeps resolve <template> --fetch' to fetch missing dependencies",
        ),
        _ => ctx,
    }
}
