//! # Runtime Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file (or no file at all) yields a working runtime.
//!
//! ```toml
//! [pool]
//! max_idle_per_bucket = 256
//!
//! [timers]
//! max_catch_up = 64
//!
//! [frame]
//! time_scale = 1.0
//! max_delta_ms = 100
//! fixed_step_ms = 20
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

/// Top-level runtime configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Object pool settings.
    pub pool: PoolConfig,
    /// Timer scheduler settings.
    pub timers: TimerConfig,
    /// Frame dispatcher settings.
    pub frame: FrameConfig,
}

/// Object pool settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Idle instances a bucket keeps before releases start dropping them.
    pub max_idle_per_bucket: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_bucket: 256,
        }
    }
}

/// Timer scheduler settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimerConfig {
    /// Callback firings one record may produce in a single advance before
    /// the remaining backlog is skipped.
    pub max_catch_up: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self { max_catch_up: 64 }
    }
}

/// Frame dispatcher settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    /// Multiplier applied to real time to produce scaled time.
    pub time_scale: f32,
    /// Longest frame delta accepted before clamping, in milliseconds.
    pub max_delta_ms: u64,
    /// Fixed-update step used by the host loop, in milliseconds.
    pub fixed_step_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            max_delta_ms: 100,
            fixed_step_ms: 20,
        }
    }
}

impl FrameConfig {
    /// Clamp applied to frame deltas.
    #[must_use]
    pub fn max_delta(&self) -> Duration {
        Duration::from_millis(self.max_delta_ms)
    }

    /// Fixed-update step.
    #[must_use]
    pub fn fixed_step(&self) -> Duration {
        Duration::from_millis(self.fixed_step_ms)
    }
}

impl RuntimeConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys, and
    /// [`ConfigError::Invalid`] when a value is out of range.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise
    /// the same errors as [`RuntimeConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "runtime configuration loaded");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        let scale = self.frame.time_scale;
        if !scale.is_finite() || scale < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "frame.time_scale must be finite and >= 0, got {scale}"
            )));
        }
        if self.frame.fixed_step_ms == 0 {
            return Err(ConfigError::Invalid(
                "frame.fixed_step_ms must be > 0".to_string(),
            ));
        }
        if self.frame.max_delta_ms < self.frame.fixed_step_ms {
            return Err(ConfigError::Invalid(format!(
                "frame.max_delta_ms ({}) must be >= frame.fixed_step_ms ({})",
                self.frame.max_delta_ms, self.frame.fixed_step_ms
            )));
        }
        if self.timers.max_catch_up == 0 {
            return Err(ConfigError::Invalid(
                "timers.max_catch_up must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RuntimeConfig::from_toml_str("").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.frame.fixed_step(), Duration::from_millis(20));
    }

    #[test]
    fn test_partial_override() {
        let config = RuntimeConfig::from_toml_str(
            "[pool]\nmax_idle_per_bucket = 8\n\n[frame]\ntime_scale = 0.5\n",
        )
        .unwrap();
        assert_eq!(config.pool.max_idle_per_bucket, 8);
        assert!((config.frame.time_scale - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.timers, TimerConfig::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = RuntimeConfig::from_toml_str("[pool]\nmax_idle = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_negative_time_scale_rejected() {
        let err = RuntimeConfig::from_toml_str("[frame]\ntime_scale = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_fixed_step_rejected() {
        let err = RuntimeConfig::from_toml_str("[frame]\nfixed_step_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = RuntimeConfig::load("/definitely/not/here/tickwork.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => {
                assert!(path.ends_with("tickwork.toml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "tickwork-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[timers]\nmax_catch_up = 3\n").unwrap();
        let config = RuntimeConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.timers.max_catch_up, 3);
    }
}
