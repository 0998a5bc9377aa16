//! Orchestrator configuration
//!
//! All tunables come from environment variables with sensible defaults so
//! the service can run unconfigured against a local SQLite file.

use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database URL, e.g. "sqlite://stevedore.db".
    pub database_url: String,

    /// Path to the App catalog JSON file.
    pub apps_path: String,

    /// Path to the ExecutionSystem catalog JSON file.
    pub systems_path: String,

    /// Base URL of the data-store files service (permission grants and
    /// directory creation).
    pub files_url: String,

    /// Data-store system id used in files-service URLs.
    pub store_id: String,

    /// Root of per-user home directories in the data store.
    pub store_home: String,

    /// Directory under a user's home where job outputs are archived.
    pub archive_root: String,

    /// Administrative identity: sees all jobs and receives permission
    /// grants on staged and archived paths.
    pub admin_user: String,

    /// Concurrency ceiling for jobs occupying an execution slot.
    pub max_running_jobs: usize,

    /// Delay before the first scheduler tick.
    pub initial_delay: Duration,

    /// Interval between scheduler ticks.
    pub update_interval: Duration,

    /// Interval between batch-queue polls.
    pub poll_interval: Duration,

    /// Upper bound on how long a batch job may sit in the queue before
    /// polling gives up and the job is failed.
    pub poll_timeout: Duration,

    /// Whether this instance is the designated scheduler. Exactly one
    /// instance must run the update loop.
    pub scheduler: bool,
}

impl Config {
    /// Reads configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: env_string("DATABASE_URL", "sqlite://stevedore.db"),
            apps_path: env_string("APPS_PATH", "apps.json"),
            systems_path: env_string("SYSTEMS_PATH", "systems.json"),
            files_url: env_string("FILES_URL", "http://localhost:8080/files/v2"),
            store_id: env_string("STORE_ID", "datastore"),
            store_home: env_string("STORE_HOME", "/home"),
            archive_root: env_string("ARCHIVE_ROOT", "analyses"),
            admin_user: env_string("ADMIN_USER", "admin"),
            max_running_jobs: env_parse("MAX_RUNNING_JOBS", 4),
            initial_delay: Duration::from_secs(env_parse("UPDATE_INITIAL_DELAY", 5)),
            update_interval: Duration::from_secs(env_parse("UPDATE_INTERVAL", 5)),
            poll_interval: Duration::from_secs(env_parse("POLL_INTERVAL", 15)),
            poll_timeout: Duration::from_secs(env_parse("POLL_TIMEOUT", 24 * 60 * 60)),
            scheduler: env_parse("SCHEDULER", true),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }
        if !self.files_url.starts_with("http://") && !self.files_url.starts_with("https://") {
            anyhow::bail!("files_url must start with http:// or https://");
        }
        if !self.store_home.starts_with('/') {
            anyhow::bail!("store_home must be an absolute data-store path");
        }
        if self.admin_user.is_empty() {
            anyhow::bail!("admin_user cannot be empty");
        }
        if self.max_running_jobs == 0 {
            anyhow::bail!("max_running_jobs must be greater than 0");
        }
        if self.update_interval.as_secs() == 0 {
            anyhow::bail!("update_interval must be greater than 0");
        }
        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::from_env();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_running_jobs, 4);
        assert_eq!(config.update_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::from_env();
        config.max_running_jobs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::from_env();
        config.files_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::from_env();
        config.store_home = "relative/home".to_string();
        assert!(config.validate().is_err());
    }
}
