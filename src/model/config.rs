use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration from instalog.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Free-tier caps and advisory nudge thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_free_log_cap")]
    pub free_log_cap: u64,
    #[serde(default = "default_free_bucket_cap")]
    pub free_bucket_cap: usize,
    #[serde(default = "default_free_preset_cap")]
    pub free_preset_cap: usize,
    /// Must be strictly below `free_log_cap`.
    #[serde(default = "default_soft_prompt_threshold")]
    pub soft_prompt_threshold: u64,
    /// Must be strictly below `free_log_cap`.
    #[serde(default = "default_badge_threshold")]
    pub badge_threshold: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            free_log_cap: default_free_log_cap(),
            free_bucket_cap: default_free_bucket_cap(),
            free_preset_cap: default_free_preset_cap(),
            soft_prompt_threshold: default_soft_prompt_threshold(),
            badge_threshold: default_badge_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Stored collections keep at most this many of the most recent logs.
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Override for the shared container directory (default: `<data>/shared`).
    #[serde(default)]
    pub shared_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            retention: default_retention(),
            shared_dir: None,
        }
    }
}

fn default_free_log_cap() -> u64 {
    25
}

fn default_free_bucket_cap() -> usize {
    3
}

fn default_free_preset_cap() -> usize {
    1
}

fn default_soft_prompt_threshold() -> u64 {
    10
}

fn default_badge_threshold() -> u64 {
    18
}

fn default_retention() -> usize {
    1000
}
