//! Configuration for the placement and compensation engine

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MatrixError;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Member id placed as the depth-0 root and used as the sponsor
    /// fallback when a referral code resolves to nobody
    #[serde(default)]
    pub root_member_id: Option<String>,

    /// Maximum direct children per tree position
    #[serde(default = "default_child_limit")]
    pub child_limit: i32,

    /// Active direct sponsees required per qualification tier
    #[serde(default = "default_qualification_step")]
    pub qualification_step: i32,

    /// Qualification tier cap
    #[serde(default = "default_max_qualification_level")]
    pub max_qualification_level: i32,

    /// Number of ancestor levels a purchase cascades through
    #[serde(default = "default_commission_levels")]
    pub commission_levels: i32,

    /// Default percent per level, seeded into commission_settings on
    /// first use (level 1 first)
    #[serde(default = "default_commission_percents")]
    pub commission_percents: Vec<String>,

    /// Currency recorded on ledger rows when the caller supplies none
    #[serde(default = "default_currency")]
    pub commission_currency: String,

    /// Days of activity granted by a plan renewal
    #[serde(default = "default_grace_days")]
    pub activity_grace_days: i64,
}

fn default_child_limit() -> i32 {
    8
}

fn default_qualification_step() -> i32 {
    8
}

fn default_max_qualification_level() -> i32 {
    8
}

fn default_commission_levels() -> i32 {
    8
}

fn default_commission_percents() -> Vec<String> {
    ["10", "5", "3", "2", "1.5", "1", "0.5", "0.25"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_grace_days() -> i64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize from defaults")
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, MatrixError> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| MatrixError::Config(format!("Parse failed: {}", e)))
    }
}
