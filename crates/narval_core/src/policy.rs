//! How strictly scene-load problems are treated.

use crate::ConfigError;
use serde::{Deserialize, Serialize};

/// Severity split between batch and interactive use.
///
/// Offline renders want a broken scene to stop the job; an editor would
/// rather show something and keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Every recoverable problem aborts the load.
    #[default]
    Strict,
    /// Recoverable problems are logged and replaced by a fallback.
    Lenient,
}

impl FailurePolicy {
    /// Decide what to do with a recoverable error.
    ///
    /// Returns `Err` under `Strict`. Under `Lenient` the error is logged as a
    /// warning together with the fallback that will be used, and `Ok` is
    /// returned so the caller can substitute it.
    pub fn recover(self, error: ConfigError, fallback: &str) -> Result<(), ConfigError> {
        match self {
            FailurePolicy::Strict => {
                log::error!("{error}");
                Err(error)
            }
            FailurePolicy::Lenient => {
                log::warn!("{error}; using {fallback}");
                Ok(())
            }
        }
    }
}
