//! Top-level process configuration: bundles every subsystem's settings
//! behind one development/production preset pair and a builder, the way
//! the router configuration this crate started from did.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::{RfMode, TimingParams};
use crate::splitter::SplitterConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid configuration: {field} - {reason}")]
    Validation {
        /// The offending field's name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The splitter's own configuration was invalid.
    #[error("splitter configuration error: {0}")]
    Splitter(#[from] crate::splitter::SplitterConfigError),

    /// Reading or parsing a config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file's contents were not valid JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Message splitter queue sizing and instance stamping.
    pub splitter: SplitterConfig,
    /// Default DPA timing parameters the engine starts with.
    pub timing: TimingParams,
    /// Default RF mode the engine advertises at startup.
    pub rf_mode: RfMode,
    /// Directory `SchemaRegistry::load` scans for schema files.
    pub schema_dir: PathBuf,
    /// `tracing_subscriber::EnvFilter` directive used when none is set in
    /// the environment.
    pub default_log_filter: String,
    /// Emit `tracing-subscriber`'s JSON formatter instead of the default
    /// human-readable one.
    pub json_logs: bool,
}

impl GatewayConfig {
    /// A configuration suited to local development: human-readable logs,
    /// verbose filtering, schemas loaded from the repository checkout.
    #[must_use]
    pub fn development() -> Self {
        Self {
            splitter: SplitterConfig::development(),
            timing: TimingParams::default(),
            rf_mode: RfMode::Std,
            schema_dir: PathBuf::from("./schemas"),
            default_log_filter: "gatewayd_core=debug,info".to_string(),
            json_logs: false,
        }
    }

    /// A configuration suited to a deployed gateway: JSON logs for
    /// ingestion, schemas loaded from the standard install location.
    #[must_use]
    pub fn production() -> Self {
        Self {
            splitter: SplitterConfig::production(),
            timing: TimingParams::default(),
            rf_mode: RfMode::Std,
            schema_dir: PathBuf::from("/etc/gatewayd/schemas"),
            default_log_filter: "gatewayd_core=info,warn".to_string(),
            json_logs: true,
        }
    }

    /// Starts a [`GatewayConfigBuilder`] from the development preset.
    #[must_use]
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::new()
    }

    /// Validates cross-field consistency beyond what the splitter already
    /// checks on its own configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.splitter.validate()?;
        if self.schema_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation { field: "schema_dir", reason: "must not be empty".to_string() });
        }
        if self.default_log_filter.trim().is_empty() {
            return Err(ConfigError::Validation { field: "default_log_filter", reason: "must not be empty".to_string() });
        }
        Ok(())
    }

    /// Loads a configuration from a JSON file, starting from the
    /// development preset's `schema_dir`/`default_log_filter`/`json_logs`
    /// fields for any the document omits.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        #[derive(serde::Deserialize, Default)]
        #[serde(default, rename_all = "camelCase")]
        struct Overrides {
            schema_dir: Option<PathBuf>,
            default_log_filter: Option<String>,
            json_logs: Option<bool>,
            production: bool,
        }

        let text = std::fs::read_to_string(path)?;
        let overrides: Overrides = serde_json::from_str(&text)?;
        let mut config = if overrides.production { Self::production() } else { Self::development() };
        if let Some(dir) = overrides.schema_dir {
            config.schema_dir = dir;
        }
        if let Some(filter) = overrides.default_log_filter {
            config.default_log_filter = filter;
        }
        if let Some(json_logs) = overrides.json_logs {
            config.json_logs = json_logs;
        }
        config.validate()?;
        Ok(config)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// Builder for a custom [`GatewayConfig`], starting from the development
/// preset.
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Starts from the development preset.
    #[must_use]
    pub fn new() -> Self {
        Self { config: GatewayConfig::development() }
    }

    /// Overrides the splitter configuration.
    #[must_use]
    pub fn splitter(mut self, splitter: SplitterConfig) -> Self {
        self.config.splitter = splitter;
        self
    }

    /// Overrides the default timing parameters.
    #[must_use]
    pub fn timing(mut self, timing: TimingParams) -> Self {
        self.config.timing = timing;
        self
    }

    /// Overrides the schema directory.
    #[must_use]
    pub fn schema_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.schema_dir = dir.into();
        self
    }

    /// Overrides whether logs are emitted as JSON.
    #[must_use]
    pub fn json_logs(mut self, json_logs: bool) -> Self {
        self.config.json_logs = json_logs;
        self
    }

    /// Validates and builds the final configuration.
    pub fn build(self) -> Result<GatewayConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for GatewayConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_preset_is_valid() {
        GatewayConfig::development().validate().unwrap();
    }

    #[test]
    fn production_preset_is_valid() {
        GatewayConfig::production().validate().unwrap();
    }

    #[test]
    fn builder_overrides_schema_dir() {
        let config = GatewayConfig::builder().schema_dir("/tmp/schemas").build().unwrap();
        assert_eq!(config.schema_dir, PathBuf::from("/tmp/schemas"));
    }

    #[test]
    fn empty_schema_dir_is_rejected() {
        let config = GatewayConfig { schema_dir: PathBuf::new(), ..GatewayConfig::development() };
        assert!(matches!(config.validate(), Err(ConfigError::Validation { field: "schema_dir", .. })));
    }

    #[test]
    fn load_from_file_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"production": true, "jsonLogs": false}"#).unwrap();
        let config = GatewayConfig::load_from_file(&path).unwrap();
        assert_eq!(config.splitter.instance_id, "gatewayd");
        assert!(!config.json_logs);
    }
}
