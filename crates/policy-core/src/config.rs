//! # Engine Configuration
//!
//! Runtime settings of [`crate::engine::PolicyEngine`], read from TOML with
//! environment overrides:
//!
//! ```toml
//! store_timeout_ms = 5000
//! number_attempts = 10
//! event_capacity = 256
//! database = "/var/lib/policy/ledger.redb"   # omit for in-memory
//! ```
//!
//! | Variable                  | Field              |
//! |---------------------------|--------------------|
//! | `POLICY_STORE_TIMEOUT_MS` | `store_timeout_ms` |
//! | `POLICY_DATABASE`         | `database`         |

use crate::PolicyError;
use crate::primitives::{DEFAULT_EVENT_CAPACITY, DEFAULT_NUMBER_ATTEMPTS, DEFAULT_STORE_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_STORE_TIMEOUT_MS: &str = "POLICY_STORE_TIMEOUT_MS";
pub const ENV_DATABASE: &str = "POLICY_DATABASE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Deadline for one store call, lock wait included.
    pub store_timeout_ms: u64,
    /// Contract number candidates tried before giving up.
    pub number_attempts: u32,
    /// Events buffered per live-query subscriber.
    pub event_capacity: usize,
    /// redb file; `None` keeps everything in memory.
    pub database: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            number_attempts: DEFAULT_NUMBER_ATTEMPTS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            database: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, PolicyError> {
        let config: Self =
            toml::from_str(text).map_err(|e| PolicyError::Config(format!("engine: {e}")))?;
        config.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PolicyError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, PolicyError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, PolicyError> {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = value(ENV_STORE_TIMEOUT_MS) {
            self.store_timeout_ms = raw.trim().parse().map_err(|_| {
                PolicyError::Config(format!("{ENV_STORE_TIMEOUT_MS}: '{raw}' is not a number"))
            })?;
        }
        if let Some(raw) = value(ENV_DATABASE) {
            self.database = Some(PathBuf::from(raw.trim()));
        }
        self.validate()
    }

    /// Reject zero limits.
    pub fn validate(self) -> Result<Self, PolicyError> {
        if self.store_timeout_ms == 0 {
            return Err(PolicyError::Config("store_timeout_ms must be positive".into()));
        }
        if self.number_attempts == 0 {
            return Err(PolicyError::Config("number_attempts must be positive".into()));
        }
        if self.event_capacity == 0 {
            return Err(PolicyError::Config("event_capacity must be positive".into()));
        }
        Ok(self)
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.store_timeout(), Duration::from_secs(5));
        assert_eq!(config.number_attempts, 10);
        assert_eq!(config.event_capacity, 256);
        assert!(config.database.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("store_timeout_ms = 250\n").expect("parse");
        assert_eq!(config.store_timeout_ms, 250);
        assert_eq!(config.number_attempts, 10);

        let with_db = EngineConfig::from_toml_str("database = \"/tmp/ledger.redb\"\n").expect("parse");
        assert_eq!(with_db.database, Some(PathBuf::from("/tmp/ledger.redb")));
    }

    #[test]
    fn unknown_and_zero_values_are_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("timeout = 5\n"),
            Err(PolicyError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("number_attempts = 0\n"),
            Err(PolicyError::Config(_))
        ));
    }

    #[test]
    fn overrides_replace_file_values() {
        let env: BTreeMap<&str, &str> = [
            (ENV_STORE_TIMEOUT_MS, " 750 "),
            (ENV_DATABASE, "/data/policy.redb"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(config.store_timeout_ms, 750);
        assert_eq!(config.database, Some(PathBuf::from("/data/policy.redb")));
    }

    #[test]
    fn bad_override_is_a_config_error() {
        let result = EngineConfig::default().apply_overrides(|key| {
            (key == ENV_STORE_TIMEOUT_MS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(PolicyError::Config(_))));

        let blank = EngineConfig::default()
            .apply_overrides(|_| Some("  ".to_string()))
            .expect("blank values ignored");
        assert_eq!(blank, EngineConfig::default());
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "event_capacity = 8\n").expect("write");

        assert_eq!(EngineConfig::load(&path).expect("load").event_capacity, 8);
    }
}
