//! # Runtime Error Types
//!
//! Every failure the core services can report. None of these are fatal: the
//! services return them as values and log them, the caller decides.

use std::path::PathBuf;

use thiserror::Error;

use crate::timer::TimerId;

/// Errors reported by the object pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The bucket already holds instances of a different concrete type.
    #[error("bucket {bucket} holds {expected}, got {found}")]
    TypeMismatch {
        /// Bucket the operation targeted.
        bucket: String,
        /// Type the bucket is bound to.
        expected: &'static str,
        /// Type the caller supplied.
        found: &'static str,
    },

    /// No template is registered under this key.
    #[error("no template registered for {0}")]
    MissingTemplate(String),
}

/// Errors reported by the event bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The event identifier is bound to another payload type.
    #[error("event {event} carries {expected}, got {found}")]
    PayloadMismatch {
        /// Event identifier.
        event: String,
        /// Payload type the event is bound to.
        expected: &'static str,
        /// Payload type the caller supplied.
        found: &'static str,
    },
}

/// Errors reported by the timer scheduler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The timer was removed, completed, or never existed.
    #[error("unknown timer {0}")]
    UnknownTimer(TimerId),

    /// A repeating timer needs a non-zero period.
    #[error("repeating timer needs a non-zero duration")]
    ZeroPeriod,

    /// Interval callbacks need a non-zero interval.
    #[error("timer interval must be non-zero")]
    ZeroInterval,
}

/// Errors raised while loading the runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`RuntimeConfig`](crate::RuntimeConfig).
    #[error("invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Result type for event bus operations.
pub type EventResult<T> = Result<T, EventError>;

/// Result type for timer operations.
pub type TimerResult<T> = Result<T, TimerError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
