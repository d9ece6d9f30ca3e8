//! Unified error type for the telltale-lib crate.
//!
//! [`TelltaleError`] wraps module-specific errors (`AudioError`, I/O) and the
//! string-carrying kinds produced while loading configuration, registries and
//! scenario scripts. `From` impls let `?` propagate across module boundaries.
//!
//! Runtime anomalies inside the engine (unknown ids, missing assets, stale
//! completions) are not errors: they are logged and recovered locally.

use std::fmt;

use crate::audio::AudioError;
use crate::registry::IndicatorId;

/// Unified error type for telltale-lib operations.
#[derive(Debug)]
pub enum TelltaleError {
    /// Audio backend error.
    Audio(AudioError),
    /// Standard I/O error (file read/write, config persistence).
    Io(std::io::Error),
    /// Configuration parse or validation error.
    Config(String),
    /// Registry parse or validation error.
    Registry(String),
    /// Command or scenario script parse error.
    Command(String),
    /// Indicator id not present in the registry.
    UnknownIndicator(IndicatorId),
}

impl fmt::Display for TelltaleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelltaleError::Audio(e) => write!(f, "{e}"),
            TelltaleError::Io(e) => write!(f, "I/O error: {e}"),
            TelltaleError::Config(e) => write!(f, "Config error: {e}"),
            TelltaleError::Registry(e) => write!(f, "Registry error: {e}"),
            TelltaleError::Command(e) => write!(f, "Command error: {e}"),
            TelltaleError::UnknownIndicator(id) => write!(f, "Unknown indicator {id}"),
        }
    }
}

impl std::error::Error for TelltaleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelltaleError::Audio(e) => Some(e),
            TelltaleError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AudioError> for TelltaleError {
    fn from(e: AudioError) -> Self {
        TelltaleError::Audio(e)
    }
}

impl From<std::io::Error> for TelltaleError {
    fn from(e: std::io::Error) -> Self {
        TelltaleError::Io(e)
    }
}

/// Crate-level Result alias using [`TelltaleError`].
pub type Result<T> = std::result::Result<T, TelltaleError>;
