//! Sequencer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry settings for the controllers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Base tick unit (milliseconds)
    pub base_tick_millis: u64,
    /// Close watchdog timeout, in base ticks
    pub close_timeout_ticks: u32,
    /// Close attempts allowed before the shutter faults
    pub max_close_retries: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            base_tick_millis: 100,
            close_timeout_ticks: 2,
            max_close_retries: 3,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Parse { var: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl SequencerConfig {
    pub const ENV_BASE_TICK: &'static str = "ISP_SEQ_BASE_TICK_MS";
    pub const ENV_CLOSE_TIMEOUT_TICKS: &'static str = "ISP_SEQ_CLOSE_TIMEOUT_TICKS";
    pub const ENV_MAX_CLOSE_RETRIES: &'static str = "ISP_SEQ_MAX_CLOSE_RETRIES";

    /// Load configuration from environment variables, falling back to the
    /// defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            base_tick_millis: parse_var(&lookup, Self::ENV_BASE_TICK)?
                .unwrap_or(defaults.base_tick_millis),
            close_timeout_ticks: parse_var(&lookup, Self::ENV_CLOSE_TIMEOUT_TICKS)?
                .unwrap_or(defaults.close_timeout_ticks),
            max_close_retries: parse_var(&lookup, Self::ENV_MAX_CLOSE_RETRIES)?
                .unwrap_or(defaults.max_close_retries),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_tick_millis == 0 {
            return Err(ConfigError::Zero("base_tick_millis"));
        }
        if self.close_timeout_ticks == 0 {
            return Err(ConfigError::Zero("close_timeout_ticks"));
        }
        if self.max_close_retries == 0 {
            return Err(ConfigError::Zero("max_close_retries"));
        }
        Ok(())
    }

    pub fn base_tick(&self) -> Duration {
        Duration::from_millis(self.base_tick_millis)
    }

    /// How long a close may take before the watchdog fires
    pub fn close_timeout(&self) -> Duration {
        self.base_tick() * self.close_timeout_ticks
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&'static str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Parse { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_default_close_timeout_is_two_ticks() {
        let config = SequencerConfig::default();
        assert_eq!(config.close_timeout(), Duration::from_millis(200));
        assert_eq!(config.max_close_retries, 3);
    }

    #[test]
    fn test_env_overrides() {
        let config = SequencerConfig::from_lookup(lookup(&[
            (SequencerConfig::ENV_BASE_TICK, "10"),
            (SequencerConfig::ENV_MAX_CLOSE_RETRIES, " 5 "),
        ]))
        .unwrap();

        assert_eq!(config.base_tick_millis, 10);
        assert_eq!(config.close_timeout_ticks, 2);
        assert_eq!(config.max_close_retries, 5);
        assert_eq!(config.close_timeout(), Duration::from_millis(20));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = SequencerConfig::from_lookup(lookup(&[(
            SequencerConfig::ENV_CLOSE_TIMEOUT_TICKS,
            "soon",
        )]))
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::Parse { var, .. } if var == SequencerConfig::ENV_CLOSE_TIMEOUT_TICKS)
        );
    }

    #[test]
    fn test_zero_retries_rejected() {
        let config = SequencerConfig {
            max_close_retries: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("max_close_retries"))
        ));
    }
}
