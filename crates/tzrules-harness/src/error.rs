//! Error types for the harness
//!
//! Failure modes:
//! - A precondition failure aborts the whole suite
//! - A condition timeout means the device never converged
//! - A device error means the command channel itself is broken
//! - An assertion failure means the device settled in the wrong state

use std::path::PathBuf;
use tzrules_device::DeviceError;

/// Main harness error type
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Nothing the harness can do will make the run meaningful
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Poll budget exhausted
    #[error("failed condition: {condition} (gave up after {attempts} attempts)")]
    ConditionTimeout { condition: String, attempts: u32 },

    /// Device transport or state query failed
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Device settled in an unexpected state
    #[error("{what}: expected {expected}, got {actual:?}")]
    Assertion {
        what: String,
        expected: String,
        actual: String,
    },

    /// Device did not come back after a reboot
    #[error("device did not finish booting within {timeout_ms} ms")]
    BootTimeout { timeout_ms: u64 },

    /// Test fixture could not be prepared
    #[error("fixture error: {0}")]
    Fixture(#[from] FixtureError),
}

impl HarnessError {
    /// Check if the error makes running further scenarios pointless
    #[inline]
    #[must_use]
    pub fn aborts_suite(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }

    /// Check if the error is an exhausted poll budget
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConditionTimeout { .. })
    }
}

/// Fixture and scratch directory errors
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// No fixture file with the expected name
    #[error("no resource found with name {name} in {}", dir.display())]
    NotFound { name: String, dir: PathBuf },

    /// Copying or cleaning up failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("invalid configuration file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are present but unusable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
