//! Configuration management for crashguard.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::handler::HandlerOptions;
use crate::store::{CorruptFilePolicy, CrashStore};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "crashguard";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CRASHGUARD_`)
/// 2. TOML config file at `~/.config/crashguard/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Crash report file configuration.
    pub reports: ReportsConfig,
    /// Panic handling configuration.
    pub handler: HandlerConfig,
}

/// Crash report file configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Path to the crash report file.
    /// Defaults to `~/.local/share/crashguard/crash_reports.json`
    pub file_path: Option<PathBuf>,
    /// Record panics in the crash report file.
    pub dump_to_file: bool,
    /// Clear the crash report file when a handler starts.
    pub wipe_on_start: bool,
    /// What to do when the crash report file is malformed.
    pub corrupt_policy: CorruptFilePolicy,
}

/// Panic handling configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Terminate the process after a panic.
    pub exit_on_panic: bool,
    /// Include OS, architecture and toolchain version in reports.
    pub include_system_info: bool,
    /// Key/value pairs attached to every report.
    pub metadata: BTreeMap<String, String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            file_path: None, // Will be resolved to default at runtime
            dump_to_file: true,
            wipe_on_start: false,
            corrupt_policy: CorruptFilePolicy::Discard,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// Sources are merged in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `CRASHGUARD_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("CRASHGUARD_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.reports.file_path {
            if path.as_os_str().is_empty() {
                return Err(Error::ConfigValidation {
                    message: "reports.file_path must not be empty".to_string(),
                });
            }
        }

        if self.handler.metadata.keys().any(String::is_empty) {
            return Err(Error::ConfigValidation {
                message: "handler.metadata keys must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the crash report file path, resolving defaults if not set.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.reports
            .file_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(crate::store::DEFAULT_FILE_NAME))
    }

    /// Build a store for the configured crash report file.
    #[must_use]
    pub fn store(&self) -> CrashStore {
        CrashStore::new(self.report_path()).with_corrupt_file_policy(self.reports.corrupt_policy)
    }

    /// Build handler options from this configuration.
    ///
    /// The error callback is left at its default; set one on the result if
    /// needed.
    #[must_use]
    pub fn handler_options(&self) -> HandlerOptions {
        HandlerOptions::new()
            .dump_to_file(self.reports.dump_to_file)
            .file_path(self.report_path())
            .wipe_file(self.reports.wipe_on_start)
            .corrupt_file_policy(self.reports.corrupt_policy)
            .exit_on_panic(self.handler.exit_on_panic)
            .include_system_info(self.handler.include_system_info)
            .metadata(self.handler.metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.reports.file_path.is_none());
        assert!(config.reports.dump_to_file);
        assert!(!config.reports.wipe_on_start);
        assert_eq!(config.reports.corrupt_policy, CorruptFilePolicy::Discard);
        assert!(!config.handler.exit_on_panic);
        assert!(!config.handler.include_system_info);
        assert!(config.handler.metadata.is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_file_path() {
        let mut config = Config::default();
        config.reports.file_path = Some(PathBuf::new());

        let result = config.validate();
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("file_path"));
    }

    #[test]
    fn test_validate_empty_metadata_key() {
        let mut config = Config::default();
        config
            .handler
            .metadata
            .insert(String::new(), "value".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("metadata"));
    }

    #[test]
    fn test_report_path_default() {
        let config = Config::default();
        let path = config.report_path();

        assert!(path.to_string_lossy().contains("crash_reports.json"));
        assert!(path.to_string_lossy().contains("crashguard"));
    }

    #[test]
    fn test_report_path_custom() {
        let mut config = Config::default();
        config.reports.file_path = Some(PathBuf::from("/custom/crashes.json"));

        assert_eq!(config.report_path(), PathBuf::from("/custom/crashes.json"));
        assert_eq!(config.store().path(), PathBuf::from("/custom/crashes.json"));
    }

    #[test]
    fn test_handler_options_from_config() {
        let mut config = Config::default();
        config.reports.file_path = Some(PathBuf::from("/custom/crashes.json"));
        config.reports.wipe_on_start = true;
        config.reports.corrupt_policy = CorruptFilePolicy::Preserve;
        config.handler.exit_on_panic = true;
        config.handler.include_system_info = true;
        config
            .handler
            .metadata
            .insert("service".to_string(), "api".to_string());

        let options = config.handler_options();

        assert!(options.dump_to_file);
        assert!(options.wipe_file);
        assert!(options.exit_on_panic);
        assert!(options.include_system_info);
        assert_eq!(options.corrupt_file_policy, CorruptFilePolicy::Preserve);
        assert_eq!(options.file_path, PathBuf::from("/custom/crashes.json"));
        assert_eq!(options.metadata["service"], "api");
        assert!(!options.has_error_handler());
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("crashguard"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        // Loading from a nonexistent path should work (uses defaults)
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "crashguard_config_{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
[reports]
file_path = "/var/log/app/crashes.json"
corrupt_policy = "preserve"

[handler]
include_system_info = true

[handler.metadata]
service = "api"
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path.clone())).unwrap();
        assert_eq!(
            config.reports.file_path,
            Some(PathBuf::from("/var/log/app/crashes.json"))
        );
        assert_eq!(config.reports.corrupt_policy, CorruptFilePolicy::Preserve);
        assert!(config.reports.dump_to_file);
        assert!(config.handler.include_system_info);
        assert_eq!(config.handler.metadata["service"], "api");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_reports_config_deserialize() {
        let json = r#"{"dump_to_file": false, "wipe_on_start": true}"#;
        let reports: ReportsConfig = serde_json::from_str(json).unwrap();
        assert!(!reports.dump_to_file);
        assert!(reports.wipe_on_start);
        assert!(reports.file_path.is_none());
    }

    #[test]
    fn test_config_clone() {
        let config = Config::default();
        let cloned = config.clone();
        assert_eq!(config, cloned);
    }
}
