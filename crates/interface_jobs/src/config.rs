//! Job runner configuration

use serde::Deserialize;
use std::collections::HashMap;
use validator::Validate;

use core_kernel::UserId;
use infra_db::DEFAULT_DATABASE_URL;

use crate::error::JobError;

/// Environment variable prefix, e.g. `DME_CHUNK_SIZE`
pub const ENV_PREFIX: &str = "DME";

/// Job runner configuration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JobConfig {
    /// Database URL
    #[serde(default = "default_database_url")]
    #[validate(length(min = 1))]
    pub database_url: String,
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub log_json: bool,
    /// Keys processed per committed database transaction
    #[serde(default = "default_chunk_size")]
    #[validate(range(min = 1, max = 10000))]
    pub chunk_size: u32,
    /// User recorded on every transaction the jobs append
    #[serde(default = "default_actor_user_id")]
    #[validate(range(min = 1))]
    pub actor_user_id: i64,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chunk_size() -> u32 {
    500
}

fn default_actor_user_id() -> i64 {
    1
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            log_level: default_log_level(),
            log_json: false,
            chunk_size: default_chunk_size(),
            actor_user_id: default_actor_user_id(),
        }
    }
}

impl JobConfig {
    /// Loads configuration from `DME_*` environment variables
    pub fn from_env() -> Result<Self, JobError> {
        Self::load(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Loads configuration from an explicit variable map, as if it were the
    /// environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, JobError> {
        Self::load(config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn load(source: config::Environment) -> Result<Self, JobError> {
        let config: JobConfig = config::Config::builder()
            .add_source(source.try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn actor(&self) -> UserId {
        UserId::new(self.actor_user_id)
    }

    pub fn chunk_limit(&self) -> i64 {
        i64::from(self.chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = JobConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.chunk_size, 500);
        assert!(!config.log_json);
        assert_eq!(config.actor(), UserId::new(1));
    }

    #[test]
    fn test_reads_prefixed_variables() {
        let config = JobConfig::from_vars(vars(&[
            ("DME_DATABASE_URL", "postgres://db/dme"),
            ("DME_CHUNK_SIZE", "250"),
            ("DME_LOG_JSON", "true"),
            ("DME_ACTOR_USER_ID", "42"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "postgres://db/dme");
        assert_eq!(config.chunk_limit(), 250);
        assert!(config.log_json);
        assert_eq!(config.actor(), UserId::new(42));
    }

    #[test]
    fn test_chunk_size_out_of_range() {
        let result = JobConfig::from_vars(vars(&[("DME_CHUNK_SIZE", "20000")]));
        assert!(matches!(result, Err(JobError::InvalidConfig(_))));

        let result = JobConfig::from_vars(vars(&[("DME_CHUNK_SIZE", "0")]));
        assert!(matches!(result, Err(JobError::InvalidConfig(_))));
    }

    #[test]
    fn test_default_passes_validation() {
        assert!(JobConfig::default().validate().is_ok());
    }
}
