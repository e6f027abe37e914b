//! Guard rails for nonsensical but parseable configuration.

use std::fmt::{self, Display};

use crate::models::OrionConfig;

/// A non-fatal configuration problem. Loading continues; the offending
/// value is used as-is where safe or clamped at the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarning {
    ZeroPollInterval,
    BackoffCapBelowBase { base_ms: u64, cap_ms: u64 },
    NonPositiveFastHz(f64),
    ZeroBatchEvery,
    EmptyBaseUrl,
}

impl Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::ZeroPollInterval => {
                write!(f, "status.poll_interval_ms is 0; the provider clamps this to 100ms")
            }
            ConfigWarning::BackoffCapBelowBase { base_ms, cap_ms } => write!(
                f,
                "status.backoff_cap_ms ({cap_ms}) is below backoff_base_ms ({base_ms}); the base wins"
            ),
            ConfigWarning::NonPositiveFastHz(hz) => {
                write!(f, "analytics.fast_hz ({hz}) must be positive; falling back to 1 Hz")
            }
            ConfigWarning::ZeroBatchEvery => {
                write!(f, "analytics.batch_every is 0; treating as 1 (batch every cycle)")
            }
            ConfigWarning::EmptyBaseUrl => {
                write!(f, "base_url is empty; only the simulated backend will work")
            }
        }
    }
}

/// Collect warnings for a parsed config. Never fails.
pub fn validate(config: &OrionConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();
    if config.status.poll_interval_ms == 0 {
        warnings.push(ConfigWarning::ZeroPollInterval);
    }
    if config.status.backoff_cap_ms < config.status.backoff_base_ms {
        warnings.push(ConfigWarning::BackoffCapBelowBase {
            base_ms: config.status.backoff_base_ms,
            cap_ms: config.status.backoff_cap_ms,
        });
    }
    if config.analytics.fast_hz <= 0.0 {
        warnings.push(ConfigWarning::NonPositiveFastHz(config.analytics.fast_hz));
    }
    if config.analytics.batch_every == 0 {
        warnings.push(ConfigWarning::ZeroBatchEvery);
    }
    if config.base_url.is_empty() && !config.developer.simulated {
        warnings.push(ConfigWarning::EmptyBaseUrl);
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_warns_only_about_base_url() {
        let warnings = validate(&OrionConfig::default());
        assert_eq!(warnings, vec![ConfigWarning::EmptyBaseUrl]);
    }

    #[test]
    fn simulated_mode_tolerates_empty_base_url() {
        let mut config = OrionConfig::default();
        config.developer.simulated = true;
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn bad_tunables_are_each_reported() {
        let mut config = OrionConfig::default();
        config.base_url = "http://printer".to_string();
        config.status.poll_interval_ms = 0;
        config.status.backoff_cap_ms = 100;
        config.analytics.fast_hz = 0.0;
        config.analytics.batch_every = 0;
        let warnings = validate(&config);
        assert_eq!(warnings.len(), 4);
    }
}
