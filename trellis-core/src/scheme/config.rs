//! Scheme configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tuning knobs of a [`Scheme`](super::Scheme).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemeConfig {
    /// Upper bound of scheduling passes in one `run_until_idle` call.
    pub max_passes: usize,
    /// Abort a scheduling pass on the first failing node.
    pub stop_on_error: bool,
    /// Construct a node's widget as soon as the node is added.
    pub create_widgets_eagerly: bool,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            max_passes: 1024,
            stop_on_error: false,
            create_widgets_eagerly: true,
        }
    }
}

impl SchemeConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
