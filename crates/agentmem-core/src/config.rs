//! Runtime configuration for memory services and the sync loop.
//!
//! Loaded from TOML, then overridden by `AGENTMEM_*` environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `AGENTMEM_WORKING_TTL_SECS` | `default_working_ttl_secs` |
//! | `AGENTMEM_SYNC_INTERVAL_SECS` | `sync_interval_secs` |
//! | `AGENTMEM_CLEANUP_INTERVAL_SECS` | `cleanup_interval_secs` |
//! | `AGENTMEM_CONFLICT_STRATEGY` | `conflict_strategy` |
//! | `AGENTMEM_AUTO_RESOLVE` | `auto_resolve` |
//! | `AGENTMEM_INSTANCE_ID` | `instance_id` |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::resolver::ConflictStrategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// TTL applied by callers that do not pick one (default 1h)
    pub default_working_ttl_secs: u64,
    /// Period of the background sync loop (default 5 min)
    pub sync_interval_secs: u64,
    /// Period of the expiry sweep (default 1 min)
    pub cleanup_interval_secs: u64,
    pub conflict_strategy: ConflictStrategy,
    /// Resolve newly detected conflicts during the sync pass
    pub auto_resolve: bool,
    /// Fixed instance id; a random UUID is used when unset
    pub instance_id: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_working_ttl_secs: 3600,
            sync_interval_secs: 300,
            cleanup_interval_secs: 60,
            conflict_strategy: ConflictStrategy::LastWriteWins,
            auto_resolve: true,
            instance_id: None,
        }
    }
}

impl MemoryConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| MemoryError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Apply `AGENTMEM_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AGENTMEM_WORKING_TTL_SECS") {
            self.default_working_ttl_secs = parse_secs("AGENTMEM_WORKING_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("AGENTMEM_SYNC_INTERVAL_SECS") {
            self.sync_interval_secs = parse_secs("AGENTMEM_SYNC_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("AGENTMEM_CLEANUP_INTERVAL_SECS") {
            self.cleanup_interval_secs = parse_secs("AGENTMEM_CLEANUP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("AGENTMEM_CONFLICT_STRATEGY") {
            self.conflict_strategy = v.parse()?;
        }
        if let Some(v) = lookup("AGENTMEM_AUTO_RESOLVE") {
            self.auto_resolve = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(MemoryError::Config(format!(
                        "AGENTMEM_AUTO_RESOLVE: not a boolean: {other}"
                    )))
                }
            };
        }
        if let Some(v) = lookup("AGENTMEM_INSTANCE_ID") {
            if !v.trim().is_empty() {
                self.instance_id = Some(v.trim().to_string());
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            return Err(MemoryError::Config("sync_interval_secs must be > 0".into()));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(MemoryError::Config("cleanup_interval_secs must be > 0".into()));
        }
        if self.default_working_ttl_secs == 0 {
            return Err(MemoryError::Config(
                "default_working_ttl_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn default_working_ttl(&self) -> Duration {
        Duration::from_secs(self.default_working_ttl_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| MemoryError::Config(format!("{name}: not a number of seconds: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let c = MemoryConfig::default();
        assert_eq!(c.sync_interval(), Duration::from_secs(300));
        assert_eq!(c.conflict_strategy, ConflictStrategy::LastWriteWins);
        assert!(c.auto_resolve);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let c = MemoryConfig::from_toml_str(
            r#"
            sync_interval_secs = 30
            conflict_strategy = "version_based"
            "#,
        )
        .unwrap();
        assert_eq!(c.sync_interval_secs, 30);
        assert_eq!(c.conflict_strategy, ConflictStrategy::VersionBased);
        assert_eq!(c.cleanup_interval_secs, 60);
    }

    #[test]
    fn zero_interval_rejected() {
        let err = MemoryConfig::from_toml_str("sync_interval_secs = 0").unwrap_err();
        assert!(matches!(err, MemoryError::Config(_)));
    }

    #[test]
    fn overrides_apply_and_validate() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AGENTMEM_SYNC_INTERVAL_SECS", "15"),
            ("AGENTMEM_CONFLICT_STRATEGY", "manual"),
            ("AGENTMEM_AUTO_RESOLVE", "off"),
            ("AGENTMEM_INSTANCE_ID", "node-a"),
        ]);
        let c = MemoryConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(c.sync_interval_secs, 15);
        assert_eq!(c.conflict_strategy, ConflictStrategy::Manual);
        assert!(!c.auto_resolve);
        assert_eq!(c.instance_id.as_deref(), Some("node-a"));

        let bad = MemoryConfig::default()
            .with_overrides(|k| (k == "AGENTMEM_SYNC_INTERVAL_SECS").then(|| "soon".to_string()));
        assert!(bad.is_err());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agentmem.toml");
        std::fs::write(&path, "default_working_ttl_secs = 120\n").unwrap();
        let c = MemoryConfig::from_file(&path).unwrap();
        assert_eq!(c.default_working_ttl(), Duration::from_secs(120));
    }
}
