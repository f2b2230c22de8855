//! Config loading, validation, and utility operations.

use super::model::Config;
use crate::error::{LockstepError, Result};
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockstepError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load config from a YAML file, falling back to defaults if it is missing.
    ///
    /// A file that exists but does not parse or validate is still an error:
    /// silently running with defaults would let workers disagree on timing.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit; treat it as "all defaults".
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| LockstepError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            LockstepError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lock_ttl_secs` must be positive
    /// - `heartbeat_interval_secs` must be positive and below `lock_ttl_secs`
    /// - `max_attempts` must be positive
    /// - `poll_interval_ms` must be positive
    pub fn validate(&self) -> Result<()> {
        if self.lock_ttl_secs == 0 {
            return Err(LockstepError::UserError(
                "config validation failed: lock_ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(LockstepError::UserError(
                "config validation failed: heartbeat_interval_secs must be greater than 0"
                    .to_string(),
            ));
        }

        if self.heartbeat_interval_secs >= self.lock_ttl_secs {
            return Err(LockstepError::UserError(format!(
                "config validation failed: heartbeat_interval_secs ({}) must be less than \
                 lock_ttl_secs ({}), or locks expire between renewals",
                self.heartbeat_interval_secs, self.lock_ttl_secs
            )));
        }

        if self.max_attempts == 0 {
            return Err(LockstepError::UserError(
                "config validation failed: max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(LockstepError::UserError(
                "config validation failed: poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
