//! Configuration for the triage pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::directory::{DepartmentDirectory, DirectoryError};

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid directory: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub oracle: OracleConfig,
    pub retry: RetryConfig,
    pub assignment: AssignmentConfig,
    pub parser: ParserConfig,
    pub directory: DepartmentDirectory,
}

impl TriageConfig {
    /// Load config from YAML. Missing sections take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Re-run the directory invariants; serde bypasses the constructor.
        DepartmentDirectory::new(
            self.directory.departments().to_vec(),
            self.directory.default_id(),
        )?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.assignment.capacity_ceiling == 0 {
            return Err(ConfigError::Invalid {
                field: "assignment.capacity_ceiling",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "oracle.timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Oracle call settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Sampling temperature; low for consistent classifications
    pub temperature: f32,
    /// Maximum tokens in the oracle's answer
    pub max_tokens: u32,
    /// Hard timeout for one call (seconds)
    pub timeout_secs: u64,
    /// List each department's officers in the system prompt
    pub include_officer_roster: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 500,
            timeout_secs: 60,
            include_officer_roster: true,
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry controller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure (ms)
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
        }
    }
}

/// How an officer's slot is claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimMode {
    /// Append after the read; concurrent submissions may overshoot the ceiling
    #[default]
    BestEffort,
    /// Append only if the count is still what was read; re-select on conflict
    Conditional,
}

/// Officer assignment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Maximum concurrently active complaints per officer
    pub capacity_ceiling: usize,
    pub claim_mode: ClaimMode,
    /// Selection rounds in conditional mode before giving up
    pub max_claim_attempts: u32,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            capacity_ceiling: 5,
            claim_mode: ClaimMode::BestEffort,
            max_claim_attempts: 3,
        }
    }
}

/// Oracle output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// `Label: value` lines
    #[default]
    Labeled,
    /// A JSON object
    Json,
}

/// Response parser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub format: ResponseFormat,
    /// Fewest recognised sections for a response to count as structured
    pub min_sections: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            format: ResponseFormat::Labeled,
            min_sections: 1,
        }
    }
}
