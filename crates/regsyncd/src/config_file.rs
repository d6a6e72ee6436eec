//! Bootstrap configuration for regsyncd
//!
//! Loads and validates the daemon's own settings from a TOML file: which
//! config provider to use, where to keep the document backup, logging and
//! the default stat flush period. The sync document itself comes from the
//! provider.
//!
//! Default location: /etc/regsync/regsyncd.toml

use crate::error::{DaemonError, Result};
use crate::provider::file::{OPTION_WATCH_FILE, PROVIDER_NAME};
use regsync_core::ProviderSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/regsync/regsyncd.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Config provider selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Registered provider name
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Where the last accepted document is kept
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,

    /// Provider-specific options
    #[serde(default = "default_provider_options")]
    pub options: BTreeMap<String, String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of compact text
    #[serde(default)]
    pub json: bool,
}

/// Stat reporting defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDefaults {
    /// Flush period used when the document sets none
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
}

/// Complete regsyncd configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegsyncConfig {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub report: ReportDefaults,
}

// Default functions
fn default_provider_name() -> String {
    PROVIDER_NAME.to_string()
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("/var/lib/regsync/sync-backup.json")
}

fn default_provider_options() -> BTreeMap<String, String> {
    BTreeMap::from([(
        OPTION_WATCH_FILE.to_string(),
        "/etc/regsync/sync.yaml".to_string(),
    )])
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_flush_interval() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            backup_path: default_backup_path(),
            options: default_provider_options(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ReportDefaults {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval(),
        }
    }
}

impl RegsyncConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                DaemonError::configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "regsyncd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(DaemonError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DaemonError::configuration(format!("Failed to serialize config: {}", e)))?;
        fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Get the default flush period as Duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.report.flush_interval_secs)
    }

    /// Provider selection in the form the manager takes
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            name: self.provider.name.clone(),
            options: self.provider.options.clone(),
            backup_path: self.provider.backup_path.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.provider.name.trim().is_empty() {
            return Err(DaemonError::configuration("provider.name must not be empty"));
        }

        if self.provider.backup_path.as_os_str().is_empty() {
            return Err(DaemonError::configuration(
                "provider.backup_path must not be empty",
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(DaemonError::configuration(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        if self.report.flush_interval_secs == 0 {
            return Err(DaemonError::configuration(
                "report.flush_interval_secs must be > 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = RegsyncConfig::default();
        assert_eq!(config.provider.name, "file");
        assert_eq!(
            config.provider.options.get(OPTION_WATCH_FILE).map(String::as_str),
            Some("/etc/regsync/sync.yaml")
        );
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.flush_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(RegsyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_empty_provider() {
        let mut config = RegsyncConfig::default();
        config.provider.name = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = RegsyncConfig::default();
        config.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_flush_interval() {
        let mut config = RegsyncConfig::default();
        config.report.flush_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[provider]
name = "file"
backup_path = "/tmp/regsync-backup.json"

[provider.options]
watch_file = "/tmp/sync.json"
interval = "5s"

[logging]
json = true
"#;
        let config: RegsyncConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.provider.backup_path,
            PathBuf::from("/tmp/regsync-backup.json")
        );
        assert_eq!(config.provider.options.len(), 2);
        assert!(config.logging.json);
        // Unspecified values should use defaults
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.report.flush_interval_secs, 60);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regsyncd.toml");
        let mut config = RegsyncConfig::default();
        config.report.flush_interval_secs = 15;
        config.save(&path).unwrap();

        assert_eq!(RegsyncConfig::load_or_default(&path).unwrap(), config);
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = RegsyncConfig::load_or_default("/nonexistent/regsyncd.toml").unwrap();
        assert_eq!(config, RegsyncConfig::default());
    }

    #[test]
    fn test_provider_settings() {
        let settings = RegsyncConfig::default().provider_settings();
        assert_eq!(settings.name, "file");
        assert_eq!(
            settings.backup_path,
            PathBuf::from("/var/lib/regsync/sync-backup.json")
        );
    }
}
