//! Configuration types for ControlDB

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for one ControlDB instance
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlDbConfig {
    /// Root data directory; each cluster gets a subdirectory
    pub data_dir: PathBuf,
    /// Cluster served by this instance
    pub cluster_name: String,
    /// Number of version files kept behind the current one
    pub max_versions: i64,
    /// Worker count for the sharded config-file and static-ip stores
    pub parallel_reqs: usize,
    /// Service attribute sub-stores kept in memory
    pub attr_cache_size: usize,
    /// Service member sub-stores kept in memory
    pub member_cache_size: usize,
    /// Volume sub-stores kept in memory
    pub volume_cache_size: usize,
    /// How long a caller waits for an actor to answer
    pub request_timeout_secs: u64,
}

impl Default for ControlDbConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/controldb"),
            cluster_name: "default".to_string(),
            max_versions: 10,
            parallel_reqs: 4,
            attr_cache_size: 100,
            member_cache_size: 20,
            volume_cache_size: 20,
            request_timeout_secs: 10,
        }
    }
}

impl ControlDbConfig {
    /// Create config for a data directory and cluster
    pub fn new(data_dir: impl Into<PathBuf>, cluster_name: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cluster_name: cluster_name.into(),
            ..Default::default()
        }
    }

    /// `<data_dir>/<cluster_name>`
    #[must_use]
    pub fn cluster_dir(&self) -> PathBuf {
        self.data_dir.join(&self.cluster_name)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject settings the stores cannot run with
    pub fn validate(&self) -> DbResult<()> {
        if self.cluster_name.is_empty() {
            return Err(DbError::invalid_request("cluster name is empty"));
        }
        if self.cluster_name.contains('/') {
            return Err(DbError::invalid_request(format!(
                "cluster name {} contains a path separator",
                self.cluster_name
            )));
        }
        if self.max_versions < 1 {
            return Err(DbError::invalid_request("max_versions must be at least 1"));
        }
        if self.parallel_reqs == 0 {
            return Err(DbError::invalid_request("parallel_reqs must be at least 1"));
        }
        if self.attr_cache_size == 0 || self.member_cache_size == 0 || self.volume_cache_size == 0
        {
            return Err(DbError::invalid_request("cache sizes must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(DbError::invalid_request("request timeout must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ControlDbConfig::default();
        assert_eq!(config.max_versions, 10);
        assert_eq!(config.parallel_reqs, 4);
        assert_eq!(config.attr_cache_size, 100);
        assert_eq!(config.member_cache_size, 20);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_cluster_dir() {
        let config = ControlDbConfig::new("/data", "cluster0");
        assert_eq!(config.cluster_dir(), PathBuf::from("/data/cluster0"));
    }

    #[test]
    fn test_config_validate() {
        let mut config = ControlDbConfig::new("/data", "");
        assert!(config.validate().is_err());

        config.cluster_name = "c1".to_string();
        config.parallel_reqs = 0;
        assert!(config.validate().is_err());

        config.parallel_reqs = 4;
        config.member_cache_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_partial_toml() {
        let config: ControlDbConfig = toml::from_str(
            r#"
            data_dir = "/srv/controldb"
            cluster_name = "prod"
            parallel_reqs = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.cluster_name, "prod");
        assert_eq!(config.parallel_reqs, 8);
        assert_eq!(config.max_versions, 10);
    }
}
