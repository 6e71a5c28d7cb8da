//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ObservableError, Result};

/// Knobs read once when a [`Runtime`](crate::Runtime) is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservableConfig {
    /// Install the array/object child factories on [`TypeTag::DEFAULT`](crate::TypeTag::DEFAULT).
    pub install_default_factories: bool,
    /// Catch listener panics during flush instead of unwinding through the queue.
    ///
    /// When off, a panic ends the flush; records the flush had not reached yet
    /// stay queued for the next one, while the rest of the panicking record's
    /// delivery is lost.
    pub isolate_listener_panics: bool,
    /// Upper bound on cascade levels walked for a single record.
    pub max_cascade_depth: usize,
}

impl Default for ObservableConfig {
    fn default() -> Self {
        Self {
            install_default_factories: true,
            isolate_listener_panics: true,
            max_cascade_depth: 1024,
        }
    }
}

impl ObservableConfig {
    /// Parse a JSON configuration document. Missing fields keep their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| ObservableError::invalid(format!("config: {e}")))
    }
}
