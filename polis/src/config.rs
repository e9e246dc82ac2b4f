//! Configuration for the Polis engines.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use hierarchy::TierPolicy;

use crate::escalation::EscalationLevel;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid YAML for this schema
    #[error("Invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for a Polis instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolisConfig {
    /// Hierarchy store configuration
    pub hierarchy: HierarchyConfig,
    /// Endorsement engine configuration
    pub endorsement: EndorsementConfig,
    /// Election engine configuration
    pub election: ElectionConfig,
    /// Escalation engine configuration
    pub escalation: EscalationConfig,
    /// General settings
    pub general: GeneralConfig,
}

impl PolisConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Load config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }
}

/// Hierarchy store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Which tiers may attach to which territory kinds
    pub tier_policy: TierPolicy,
    /// Maximum wait for any store lock (ms)
    pub lock_timeout_ms: u64,
}

impl HierarchyConfig {
    /// Lock timeout as a duration.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            tier_policy: TierPolicy::permissive(),
            lock_timeout_ms: 5_000,
        }
    }
}

/// Endorsement engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndorsementConfig {
    /// Supporter territory must be the sponsor's territory or beneath it
    pub require_same_territory: bool,
    /// Penalty points added to a supporter's standing on a penalized revoke
    pub penalty_points: u32,
}

impl Default for EndorsementConfig {
    fn default() -> Self {
        Self {
            require_same_territory: false,
            penalty_points: 1,
        }
    }
}

/// Election engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Voters must have active status
    pub require_active_voters: bool,
    /// Candidates must have active status
    pub require_active_candidates: bool,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            require_active_voters: true,
            require_active_candidates: true,
        }
    }
}

/// Escalation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Level a newly raised signal starts at
    pub initial_level: EscalationLevel,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            initial_level: EscalationLevel::Tier1,
        }
    }
}

/// General configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Per-receiver buffer of the event bus
    pub event_capacity: usize,
    /// Entries kept by the audit trail
    pub audit_capacity: usize,
    /// Log level
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            audit_capacity: 10_000,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hierarchy::{TerritoryKind, Tier};
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PolisConfig::default();
        assert_eq!(config.hierarchy.lock_timeout(), Duration::from_secs(5));
        assert!(config.election.require_active_voters);
        assert!(!config.endorsement.require_same_territory);
        assert_eq!(config.escalation.initial_level, EscalationLevel::Tier1);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = PolisConfig::default();
        config.endorsement.penalty_points = 3;
        let yaml = config.to_yaml().unwrap();
        let parsed = PolisConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.endorsement.penalty_points, 3);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
hierarchy:
  lock_timeout_ms: 250
  tier_policy:
    rules:
      electoral_district: [tier1, tier2]
election:
  require_active_voters: false
"#;
        let config = PolisConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.hierarchy.lock_timeout_ms, 250);
        assert!(!config.hierarchy.tier_policy.allows(TerritoryKind::ElectoralDistrict, Tier::Tier3));
        assert!(!config.election.require_active_voters);
        assert!(config.election.require_active_candidates);
        assert_eq!(config.general.event_capacity, 1024);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "endorsement:\n  require_same_territory: true").unwrap();

        let config = PolisConfig::from_file(file.path()).unwrap();
        assert!(config.endorsement.require_same_territory);

        let missing = PolisConfig::from_file("/nonexistent/polis.yaml");
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
