//! Submission Configuration
//!
//! Limits and logging switches for the orchestrator. Every field has a
//! default so partial JSON documents load cleanly.

use serde::{Deserialize, Serialize};

use crate::observability::Severity;

use super::error::{SubmitError, SubmitResult};

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Largest changeset accepted, including entries appended by hooks (default: 10000)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Re-entered validate/pre-event rounds allowed per submission (default: 32)
    #[serde(default = "default_max_pre_event_rounds")]
    pub max_pre_event_rounds: usize,

    /// Log every per-entry state transition at TRACE (default: false)
    #[serde(default)]
    pub trace_entries: bool,

    /// Minimum severity written by the logger (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_entries() -> usize {
    10_000
}

fn default_max_pre_event_rounds() -> usize {
    32
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_pre_event_rounds: default_max_pre_event_rounds(),
            trace_entries: false,
            log_level: default_log_level(),
        }
    }
}

impl SubmitConfig {
    /// Check limits and the log level
    pub fn validate(&self) -> SubmitResult<()> {
        if self.max_entries == 0 {
            return Err(SubmitError::configuration("max_entries must be > 0"));
        }
        if self.max_pre_event_rounds == 0 {
            return Err(SubmitError::configuration(
                "max_pre_event_rounds must be > 0",
            ));
        }
        self.severity()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> SubmitResult<Severity> {
        self.log_level.parse().map_err(|_| {
            SubmitError::configuration(format!("unknown log_level '{}'", self.log_level))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SubmitConfig::default();
        assert_eq!(config.max_entries, 10_000);
        assert_eq!(config.max_pre_event_rounds, 32);
        assert!(!config.trace_entries);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SubmitConfig = serde_json::from_str(r#"{"max_entries": 5}"#).unwrap();
        assert_eq!(config.max_entries, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_rejects_zero_limits_and_bad_level() {
        let config = SubmitConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SubmitConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SubmitError::Configuration(_))
        ));
    }
}
