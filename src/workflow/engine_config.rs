//! Engine configuration
//!
//! Loaded from `engine.yaml`; every field has a default so a partial file
//! (or none at all) works:
//!
//! ```yaml
//! default_max_iterations: 100
//! statistics_window: 10
//!
//! http:
//!   timeout_ms: 30000
//!   user_agent: flowpilot/0.1
//!   headers:
//!     X-Source: automation
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Outbound HTTP settings for webhook and api steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Headers sent with every request, before step-level headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Iteration cap for loop steps that do not set `maxIterations`
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,

    /// Number of most recent executions used for success rate
    #[serde(default = "default_statistics_window")]
    pub statistics_window: usize,

    #[serde(default)]
    pub http: HttpConfig,
}

fn default_max_iterations() -> u32 {
    100
}

fn default_statistics_window() -> usize {
    10
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    concat!("flowpilot/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            headers: HashMap::new(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: default_max_iterations(),
            statistics_window: default_statistics_window(),
            http: HttpConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, crate::workflow::LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig =
            serde_yaml::from_str(&content).map_err(|e| crate::workflow::LoadError::Yaml {
                file: path.display().to_string(),
                error: e,
            })?;
        Ok(config)
    }
}
