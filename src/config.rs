use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Campaign-wide settings. Everything has a default so that an empty TOML
/// file (or no file at all) yields a usable configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// How many distinct users must submit results before a HIT counts as
    /// completed.
    pub max_users_per_hit: i64,
    /// Number of HITs each research group is expected to complete; groups
    /// not listed here have no requirement.
    pub group_hit_requirements: HashMap<String, i64>,
    /// Users whose last login is older than this many days are excluded
    /// from campaign statistics.
    pub active_window_days: i64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        CampaignConfig {
            max_users_per_hit: 1,
            group_hit_requirements: HashMap::new(),
            active_window_days: 90,
        }
    }
}

impl CampaignConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: CampaignConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_users_per_hit, 1);
        assert_eq!(config.active_window_days, 90);
        assert!(config.group_hit_requirements.is_empty());
    }

    #[test]
    fn partial_config_overrides() {
        let config: CampaignConfig = toml::from_str(
            "max_users_per_hit = 3\n\n[group_hit_requirements]\nCUNI = 100\n",
        )
        .unwrap();
        assert_eq!(config.max_users_per_hit, 3);
        assert_eq!(config.group_hit_requirements["CUNI"], 100);
    }
}
