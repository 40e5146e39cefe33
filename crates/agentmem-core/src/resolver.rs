//! Conflict resolution strategies.
//!
//! A resolution is a pure function of the conflict and the strategy: the same
//! inputs always pick the same side.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agentmem_state::MemoryConflict;

use crate::error::{MemoryError, Result};

/// How a conflict between local and remote copies is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Newer timestamp wins; equal timestamps keep local
    #[default]
    LastWriteWins,
    /// Strictly higher version wins; ties keep local
    VersionBased,
    LocalWins,
    RemoteWins,
    /// Never auto-resolves
    Manual,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => "last_write_wins",
            ConflictStrategy::VersionBased => "version_based",
            ConflictStrategy::LocalWins => "local_wins",
            ConflictStrategy::RemoteWins => "remote_wins",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_write_wins" | "lww" => Ok(ConflictStrategy::LastWriteWins),
            "version_based" => Ok(ConflictStrategy::VersionBased),
            "local_wins" => Ok(ConflictStrategy::LocalWins),
            "remote_wins" => Ok(ConflictStrategy::RemoteWins),
            "manual" => Ok(ConflictStrategy::Manual),
            other => Err(MemoryError::Config(format!(
                "unknown conflict strategy: {other}"
            ))),
        }
    }
}

/// Which copy won
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Local,
    Remote,
}

/// Outcome of resolving one conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub winner: Winner,
    pub value: Value,
}

/// Stateless strategy dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Pick a side for `conflict` according to `strategy`.
    pub fn resolve(
        &self,
        conflict: &MemoryConflict,
        strategy: ConflictStrategy,
    ) -> Result<Resolution> {
        let winner = match strategy {
            ConflictStrategy::LastWriteWins => {
                if conflict.remote_time > conflict.local_time {
                    Winner::Remote
                } else {
                    Winner::Local
                }
            }
            ConflictStrategy::VersionBased => {
                if conflict.remote_version > conflict.local_version {
                    Winner::Remote
                } else {
                    Winner::Local
                }
            }
            ConflictStrategy::LocalWins => Winner::Local,
            ConflictStrategy::RemoteWins => Winner::Remote,
            ConflictStrategy::Manual => {
                return Err(MemoryError::ManualResolutionRequired {
                    key: conflict.key.clone(),
                    memory_type: conflict.memory_type,
                })
            }
        };

        let value = match winner {
            Winner::Local => conflict.local_value.clone(),
            Winner::Remote => conflict.remote_value.clone(),
        };
        Ok(Resolution { winner, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmem_state::MemoryType;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn conflict(local_version: u64, remote_version: u64, remote_newer: bool) -> MemoryConflict {
        let now = Utc::now();
        let (local_time, remote_time) = if remote_newer {
            (now, now + Duration::seconds(1))
        } else {
            (now + Duration::seconds(1), now)
        };
        MemoryConflict {
            key: "k".into(),
            memory_type: MemoryType::Working,
            local_version,
            remote_version,
            local_value: json!("local"),
            remote_value: json!("remote"),
            local_time,
            remote_time,
            detected_at: now,
        }
    }

    #[test]
    fn last_write_wins_prefers_newer() {
        let r = ConflictResolver::new();
        let res = r.resolve(&conflict(1, 2, true), ConflictStrategy::LastWriteWins).unwrap();
        assert_eq!(res.winner, Winner::Remote);
        assert_eq!(res.value, json!("remote"));

        let res = r.resolve(&conflict(1, 2, false), ConflictStrategy::LastWriteWins).unwrap();
        assert_eq!(res.winner, Winner::Local);
    }

    #[test]
    fn last_write_wins_tie_keeps_local() {
        let mut c = conflict(1, 2, true);
        c.remote_time = c.local_time;
        let res = ConflictResolver::new()
            .resolve(&c, ConflictStrategy::LastWriteWins)
            .unwrap();
        assert_eq!(res.winner, Winner::Local);
    }

    #[test]
    fn version_based_ties_keep_local() {
        let r = ConflictResolver::new();
        assert_eq!(
            r.resolve(&conflict(3, 3, true), ConflictStrategy::VersionBased).unwrap().winner,
            Winner::Local
        );
        assert_eq!(
            r.resolve(&conflict(3, 4, false), ConflictStrategy::VersionBased).unwrap().winner,
            Winner::Remote
        );
    }

    #[test]
    fn fixed_sides() {
        let r = ConflictResolver::new();
        let c = conflict(1, 2, true);
        assert_eq!(r.resolve(&c, ConflictStrategy::LocalWins).unwrap().value, json!("local"));
        assert_eq!(r.resolve(&c, ConflictStrategy::RemoteWins).unwrap().value, json!("remote"));
    }

    #[test]
    fn manual_always_errors() {
        let err = ConflictResolver::new()
            .resolve(&conflict(1, 2, true), ConflictStrategy::Manual)
            .unwrap_err();
        assert!(matches!(err, MemoryError::ManualResolutionRequired { .. }));
    }

    #[test]
    fn strategy_parses_snake_case() {
        assert_eq!(
            "last_write_wins".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::LastWriteWins
        );
        assert_eq!(
            "Remote-Wins".parse::<ConflictStrategy>().unwrap(),
            ConflictStrategy::RemoteWins
        );
        assert!("coin_flip".parse::<ConflictStrategy>().is_err());
        assert_eq!(ConflictStrategy::VersionBased.to_string(), "version_based");
    }
}
