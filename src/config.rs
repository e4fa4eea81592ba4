//! Configuration module for the deimos batch runner

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for batch runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Runner command template: program followed by arguments. Any argument
    /// containing `{payload}` has the token replaced by the task payload;
    /// without the token the payload is appended as the final argument.
    pub command: Vec<String>,

    /// Number of concurrent execution slots
    pub concurrency: usize,

    /// Timeout for each runner invocation in milliseconds
    pub timeout: u64,

    /// Maximum attempts per task, including the first
    pub max_attempts: u32,

    /// Base retry delay in milliseconds
    pub base_delay: u64,

    /// Retry delay cap in milliseconds
    pub max_delay: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            concurrency: num_cpus::get(),
            timeout: 300_000, // External tools can be slow, match their pace
            max_attempts: 3,
            base_delay: 500,
            max_delay: 30_000,
        }
    }
}

impl RunConfig {
    /// Create a new run configuration for the given runner command
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            ..Default::default()
        }
    }

    /// Set the number of concurrent slots
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the per-task timeout
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum attempts per task
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the base retry delay
    pub fn with_base_delay(mut self, base_delay: u64) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the retry delay cap
    pub fn with_max_delay(mut self, max_delay: u64) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Get per-task timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Derive the retry policy from the configured delays
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay),
            max_delay: Duration::from_millis(self.max_delay),
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            crate::RunError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: RunConfig = toml::from_str(&content)
            .map_err(|e| crate::RunError::ConfigError(format!("Failed to parse TOML: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default_config() -> Self {
        // Try to load from ~/.deimos.toml
        let home_dir = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));

        let deimos_config = home_dir.join(".deimos.toml");

        if deimos_config.exists() {
            if let Ok(config) = Self::from_toml_file(&deimos_config) {
                log::info!("Loaded config from {}", deimos_config.display());
                return config;
            }
        }

        // Return default config if no file found
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.command.is_empty() {
            return Err(crate::RunError::ConfigError(
                "Runner command cannot be empty".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(crate::RunError::ConfigError(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(crate::RunError::ConfigError(
                "Max attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builder_methods() {
        let config = RunConfig::new(vec!["scanner".to_string(), "{payload}".to_string()])
            .with_concurrency(8)
            .with_timeout(1_000)
            .with_max_attempts(5)
            .with_base_delay(100)
            .with_max_delay(2_000);

        assert_eq!(config.concurrency, 8);
        assert_eq!(config.timeout_duration(), Duration::from_secs(1));
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert_eq!(config.retry_policy().base_delay, Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let empty_command = RunConfig::default();
        assert!(empty_command.validate().is_err());

        let zero_concurrency =
            RunConfig::new(vec!["runner".to_string()]).with_concurrency(0);
        assert!(zero_concurrency.validate().is_err());

        let zero_attempts = RunConfig::new(vec!["runner".to_string()]).with_max_attempts(0);
        assert!(zero_attempts.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "command = [\"scanner\", \"--verbose\", \"{{payload}}\"]").unwrap();
        writeln!(temp_file, "concurrency = 4").unwrap();
        writeln!(temp_file, "max_attempts = 2").unwrap();

        let config = RunConfig::from_toml_file(temp_file.path()).unwrap();

        assert_eq!(config.command.len(), 3);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_attempts, 2);
        // Unspecified fields keep their defaults
        assert_eq!(config.base_delay, 500);
    }

    #[test]
    fn test_from_toml_file_rejects_garbage() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "not valid toml [[[").unwrap();

        assert!(RunConfig::from_toml_file(temp_file.path()).is_err());
    }
}
