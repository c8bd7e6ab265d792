//! Global constants used throughout the envdeps codebase.
//!
//! This module contains timeout durations, retry parameters, and parallelism
//! defaults that are used across multiple modules.

use std::time::Duration;

/// Default deadline for a single registry fetch (30 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for a whole resolution run (5 minutes).
///
/// On expiry the resolver returns the partial result accumulated so far.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of retry attempts for [`crate::registry::RetryingFetcher`].
pub const DEFAULT_FETCH_RETRIES: usize = 3;

/// Maximum backoff delay for exponential backoff (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for exponential backoff (10ms).
///
/// Used as the base of exponential backoff: each retry multiplies the
/// previous delay by this value, up to [`MAX_BACKOFF_DELAY_MS`].
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Minimum number of parallel fetches regardless of CPU count.
pub const MIN_PARALLELISM: usize = 4;

/// Multiplier applied to CPU core count for default parallelism.
pub const PARALLELISM_CORE_MULTIPLIER: usize = 2;

/// Default fetch parallelism: max(`MIN_PARALLELISM`, 2 × CPU cores).
pub fn default_max_parallel_fetches() -> usize {
    let cores = std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(4);
    std::cmp::max(MIN_PARALLELISM, cores * PARALLELISM_CORE_MULTIPLIER)
}

/// Levenshtein distance, as a percentage of the name length, under which a
/// known template is suggested for an unknown name.
pub const SIMILARITY_THRESHOLD_PERCENT: usize = 50;
