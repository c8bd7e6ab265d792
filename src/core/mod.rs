//! Core types for envdeps
//!
//! This module holds the error vocabulary shared by every other module:
//! - [`EnvdepsError`] - Enumerated error types for structural failures
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error to user-friendly format

pub mod error;

pub use error::{EnvdepsError, ErrorContext, user_friendly_error};
