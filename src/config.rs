// src/config.rs

//! Pipeline configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file at all) yields a working pipeline.
//!
//! # Example pipeline.toml
//!
//! ```toml
//! [adapters]
//! builtin = true
//! strip_unsupported_values = true
//! stamp_timestamp = true
//! record_adapter = true
//!
//! [transformations]
//! # Retry parked transformations whenever an adapter is registered
//! retry_on_adapter_registration = true
//! # Also retry them periodically (0 disables)
//! retry_interval_secs = 30
//!
//! [commands]
//! name = "configuration-sink"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default path for the pipeline configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/conflux/pipeline.toml";

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub adapters: AdapterSettings,
    pub transformations: TransformationSettings,
    pub commands: CommandSettings,
}

/// Adapter registration behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    /// Register the built-in file/properties/json/toml/map adapters
    pub builtin: bool,
    /// Drop values a configuration cannot hold
    pub strip_unsupported_values: bool,
    /// Stamp adapted sets with the time of adaptation
    pub stamp_timestamp: bool,
    /// Stamp adapted sets with the producing adapter's name
    pub record_adapter: bool,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            builtin: true,
            strip_unsupported_values: true,
            stamp_timestamp: true,
            record_adapter: true,
        }
    }
}

/// Transformation queue behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationSettings {
    /// Reschedule failed transformations when a new adapter shows up
    pub retry_on_adapter_registration: bool,
    /// Periodic reschedule interval in seconds (0 = disabled)
    pub retry_interval_secs: u64,
}

impl Default for TransformationSettings {
    fn default() -> Self {
        Self {
            retry_on_adapter_registration: true,
            retry_interval_secs: 0,
        }
    }
}

impl TransformationSettings {
    /// Periodic retry interval, if enabled
    pub fn retry_interval(&self) -> Option<Duration> {
        (self.retry_interval_secs > 0).then(|| Duration::from_secs(self.retry_interval_secs))
    }
}

/// Command queue behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Processor name used in log output
    pub name: String,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            name: "configuration-sink".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load from the given or default path, falling back to defaults when
    /// the file does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        if !path.exists() {
            tracing::debug!("No pipeline config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    fn validate(&self) -> Result<()> {
        if self.commands.name.trim().is_empty() {
            return Err(Error::Config("commands.name must not be empty".to_string()));
        }
        Ok(())
    }
}
