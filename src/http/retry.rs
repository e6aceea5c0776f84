//! Retry strategy construction for JWKS / discovery fetches.

use backon::ExponentialBuilder;

use crate::config::RetryConfig;

/// Build a `backon` exponential-backoff-with-jitter strategy from a
/// [`RetryConfig`].
///
/// Replaces the teacher's `failsafe/retry.rs`, which imports the
/// `backoff` crate — a dependency never actually declared in the
/// teacher's `Cargo.toml`, so that module could not have compiled as-is.
/// `backon` is the crate genuinely present in the dependency table, and
/// is used here instead.
#[must_use]
pub fn strategy(config: RetryConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(config.base_delay)
        .with_max_delay(config.max_delay)
        .with_max_times(config.max_attempts.saturating_sub(1))
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_builds_without_panicking_on_default_config() {
        let _ = strategy(RetryConfig::default());
    }
}
