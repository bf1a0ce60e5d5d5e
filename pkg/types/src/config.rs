use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::validate::validate_ttl;

/// Keeper configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// ttl: 300
/// check-interval-secs: 5
/// log-level: info
/// gc-tick-secs: 10
/// gc-lifetime-secs: 600
/// run-secs: 60
/// ```
///
/// The `gc-*` and `run-secs` keys only affect `br-keeper simulate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeeperConfigFile {
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default, alias = "check-interval-secs")]
    pub check_interval_secs: Option<u64>,
    #[serde(default, alias = "log-level")]
    pub log_level: Option<String>,
    #[serde(default, alias = "gc-tick-secs")]
    pub gc_tick_secs: Option<u64>,
    #[serde(default, alias = "gc-lifetime-secs")]
    pub gc_lifetime_secs: Option<u64>,
    #[serde(default, alias = "run-secs")]
    pub run_secs: Option<u64>,
}

impl KeeperConfigFile {
    /// Reject values that would make a timer period degenerate.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(ttl) = self.ttl {
            validate_ttl(ttl)?;
        }
        if self.check_interval_secs == Some(0) {
            bail!("check-interval-secs must be positive");
        }
        if self.gc_tick_secs == Some(0) {
            bail!("gc-tick-secs must be positive");
        }
        Ok(())
    }
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    // An empty file deserializes to YAML null, which serde_yaml rejects for structs.
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg: KeeperConfigFile =
            load_config_file("/nonexistent/br-keeper/config.yaml").unwrap();
        assert!(cfg.ttl.is_none());
        assert!(cfg.check_interval_secs.is_none());
    }

    #[test]
    fn kebab_case_keys_are_accepted() {
        let cfg: KeeperConfigFile = serde_yaml::from_str(
            "ttl: 600\ncheck-interval-secs: 2\nlog-level: debug\ngc-lifetime-secs: 30\n",
        )
        .unwrap();
        assert_eq!(cfg.ttl, Some(600));
        assert_eq!(cfg.check_interval_secs, Some(2));
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
        assert_eq!(cfg.gc_lifetime_secs, Some(30));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_from_disk() {
        let path = std::env::temp_dir().join(format!("br-keeper-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "ttl: 120\nrun-secs: 10\n").unwrap();
        let cfg: KeeperConfigFile = load_config_file(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(cfg.ttl, Some(120));
        assert_eq!(cfg.run_secs, Some(10));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_ttl = KeeperConfigFile {
            ttl: Some(0),
            ..Default::default()
        };
        assert!(zero_ttl.validate().is_err());

        let zero_check = KeeperConfigFile {
            check_interval_secs: Some(0),
            ..Default::default()
        };
        assert!(zero_check.validate().is_err());
    }
}
