//! Harness configuration
//!
//! Loaded from a TOML file. `package_name` and `apk_prefix` are mandatory;
//! every other key falls back to the defaults below. Command line flags
//! override individual keys afterwards.

use crate::error::ConfigError;
use crate::poller::PollSettings;
use crate::reconciler::ReconcilerSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod defaults {
    use std::path::PathBuf;

    pub(super) fn fixtures_dir() -> PathBuf {
        PathBuf::from("fixtures")
    }

    pub(super) fn adb_path() -> String {
        "adb".to_string()
    }

    pub(super) const fn poll_attempts() -> u32 {
        30
    }

    pub(super) const fn poll_interval_ms() -> u64 {
        1000
    }

    pub(super) const fn boot_timeout_ms() -> u64 {
        60_000
    }

    pub(super) const fn boot_poll_interval_ms() -> u64 {
        1000
    }

    pub(super) const fn rejection_settle_delay_ms() -> u64 {
        30_000
    }

    pub(super) const fn reset_iterations() -> u32 {
        2
    }
}

/// Configuration for a compliance run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Package name of the time zone data app
    pub package_name: String,
    /// File name prefix of the OEM fixture packages
    pub apk_prefix: String,
    /// Directory holding `<apk_prefix>_test1.apk` and `<apk_prefix>_test2.apk`
    #[serde(default = "defaults::fixtures_dir")]
    pub fixtures_dir: PathBuf,
    /// adb executable
    #[serde(default = "defaults::adb_path")]
    pub adb_path: String,
    /// Device serial, when more than one device is attached
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default = "defaults::poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "defaults::boot_timeout_ms")]
    pub boot_timeout_ms: u64,
    #[serde(default = "defaults::boot_poll_interval_ms")]
    pub boot_poll_interval_ms: u64,
    /// Wait before checking that an older package was not staged
    #[serde(default = "defaults::rejection_settle_delay_ms")]
    pub rejection_settle_delay_ms: u64,
    /// Uninstall-and-reboot rounds allowed while resetting to clean
    #[serde(default = "defaults::reset_iterations")]
    pub reset_iterations: u32,
}

impl HarnessConfig {
    /// Configuration for `package_name` with default timings
    pub fn new(package_name: impl Into<String>, apk_prefix: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            apk_prefix: apk_prefix.into(),
            fixtures_dir: defaults::fixtures_dir(),
            adb_path: defaults::adb_path(),
            serial: None,
            poll_attempts: defaults::poll_attempts(),
            poll_interval_ms: defaults::poll_interval_ms(),
            boot_timeout_ms: defaults::boot_timeout_ms(),
            boot_poll_interval_ms: defaults::boot_poll_interval_ms(),
            rejection_settle_delay_ms: defaults::rejection_settle_delay_ms(),
            reset_iterations: defaults::reset_iterations(),
        }
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML, a missing mandatory key or a
    /// wrong value type, `ConfigError::Invalid` if the values fail
    /// [`HarnessConfig::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// `ConfigError::Read` if the file cannot be read, otherwise as
    /// [`HarnessConfig::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Reject values no run could succeed with
    ///
    /// # Errors
    /// `ConfigError::Invalid` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.package_name.trim().is_empty() {
            return Err(ConfigError::Invalid("package_name must not be empty".into()));
        }
        if self.apk_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("apk_prefix must not be empty".into()));
        }
        if self.poll_attempts == 0 {
            return Err(ConfigError::Invalid("poll_attempts must be at least 1".into()));
        }
        if self.boot_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "boot_poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.reset_iterations == 0 {
            return Err(ConfigError::Invalid(
                "reset_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings::new(
            self.poll_attempts,
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    #[must_use]
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            boot_timeout: Duration::from_millis(self.boot_timeout_ms),
            rejection_settle_delay: Duration::from_millis(self.rejection_settle_delay_ms),
            reset_iterations: self.reset_iterations,
        }
    }

    /// Get the boot-completed poll interval
    #[must_use]
    pub fn boot_poll_interval(&self) -> Duration {
        Duration::from_millis(self.boot_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: &str = r#"
        package_name = "com.oemcorp.timezonedata"
        apk_prefix = "TimeZoneDataOemCorp"
    "#;

    #[test]
    fn mandatory_keys_only_gives_default_timings() {
        let config = HarnessConfig::from_toml_str(REQUIRED).unwrap();
        assert_eq!(
            config,
            HarnessConfig::new("com.oemcorp.timezonedata", "TimeZoneDataOemCorp")
        );
        assert_eq!(config.poll_settings(), PollSettings::default());
        assert_eq!(config.reconciler_settings(), ReconcilerSettings::default());
    }

    #[test]
    fn package_and_prefix_are_mandatory() {
        let err = HarnessConfig::from_toml_str("").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("package_name"));

        let err = HarnessConfig::from_toml_str("package_name = \"com.example.tzdata\"")
            .unwrap_err();
        assert!(err.to_string().contains("apk_prefix"));
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let config = HarnessConfig::from_toml_str(
            r#"
            package_name = "com.example.tzdata"
            apk_prefix = "TimeZoneDataExample"
            serial = "emulator-5554"
            rejection_settle_delay_ms = 5000
            "#,
        )
        .unwrap();

        assert_eq!(config.package_name, "com.example.tzdata");
        assert_eq!(config.serial.as_deref(), Some("emulator-5554"));
        assert_eq!(
            config.reconciler_settings().rejection_settle_delay,
            Duration::from_secs(5)
        );
        assert_eq!(config.adb_path, "adb");
        assert_eq!(config.poll_attempts, 30);
    }

    #[test]
    fn wrong_value_type_is_a_parse_error() {
        let text = format!("{REQUIRED}\npoll_attempts = \"many\"");
        let err = HarnessConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_budgets_are_rejected() {
        for key in ["poll_attempts", "reset_iterations", "boot_poll_interval_ms"] {
            let text = format!("{REQUIRED}\n{key} = 0");
            let err = HarnessConfig::from_toml_str(&text).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{key}: {err}");
            assert!(err.to_string().contains(key));
        }
    }

    #[test]
    fn blank_package_is_rejected() {
        let config = HarnessConfig::new("  ", "TimeZoneDataOemCorp");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = HarnessConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tzrules.toml");
        std::fs::write(
            &path,
            format!("{REQUIRED}\nadb_path = \"/opt/sdk/adb\"\nreset_iterations = 3\n"),
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.adb_path, "/opt/sdk/adb");
        assert_eq!(config.reconciler_settings().reset_iterations, 3);
    }
}
