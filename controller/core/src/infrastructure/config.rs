// Copyright (c) 2026 Strato Project
// SPDX-License-Identifier: Apache-2.0

//! Controller configuration, loaded from YAML.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables of the orchestration core. Every field has a default, so an
/// empty document is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// How long a start request waits for the tenant's concentrator to
    /// report in before failing.
    #[serde(with = "humantime_serde")]
    pub cnci_bootstrap_timeout: Duration,

    /// Age at which an unanswered command is presumed lost and its
    /// compensation runs.
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,

    /// Event bus buffer size per subscriber.
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cnci_bootstrap_timeout: Duration::from_secs(120),
            command_timeout: Duration::from_secs(300),
            event_capacity: 1000,
        }
    }
}

impl ControllerConfig {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&contents)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = ControllerConfig::from_yaml("{}").unwrap();
        assert_eq!(config.cnci_bootstrap_timeout, Duration::from_secs(120));
        assert_eq!(config.command_timeout, Duration::from_secs(300));
        assert_eq!(config.event_capacity, 1000);
    }

    #[test]
    fn durations_parse_humantime() {
        let config = ControllerConfig::from_yaml(
            "cnci_bootstrap_timeout: 30s\ncommand_timeout: 10m\nevent_capacity: 64\n",
        )
        .unwrap();
        assert_eq!(config.cnci_bootstrap_timeout, Duration::from_secs(30));
        assert_eq!(config.command_timeout, Duration::from_secs(600));
        assert_eq!(config.event_capacity, 64);
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(ControllerConfig::from_yaml("no_such_field: 1\n").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "command_timeout: 1m").unwrap();

        let config = ControllerConfig::load(file.path()).unwrap();
        assert_eq!(config.command_timeout, Duration::from_secs(60));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ControllerConfig::load("/nonexistent/controller.yaml");
        assert!(matches!(err, Err(ConfigError::Io { .. })));
    }
}
