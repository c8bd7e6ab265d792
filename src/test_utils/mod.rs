//! Test utilities for envdeps
//!
//! This module provides helpers for writing tests: one-time tracing setup,
//! template fixtures, on-disk catalog/registry writers, and a scriptable
//! registry fetcher.
//!
//! It is compiled only with the `test-utils` feature, which the crate's own
//! dev-dependency enables for unit and integration tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use envdeps::test_utils::{ScriptedFetcher, dep_ge, template};
//!
//! let fetcher = ScriptedFetcher::with_templates([template("cuda-base", "11.2", [])])
//!     .failing("nvidia-driver", "registry unavailable");
//! let app = template("python-ml", "1.0", [dep_ge("cuda-base", "11.0")]);
//! ```

pub mod fetcher;
pub mod fixtures;

pub use fetcher::ScriptedFetcher;
pub use fixtures::{dep, dep_ge, optional, store, template, write_catalog, write_registry};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Installs a tracing subscriber writing through the test harness, once per
/// process. Uses `level` if given, else `RUST_LOG`; with neither, logging
/// stays off.
///
/// # Example
///
/// ```rust,no_run
/// use tracing::Level;
/// use envdeps::test_utils::init_test_logging;
///
/// init_test_logging(Some(Level::DEBUG));
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(format!("envdeps={level}"))
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
