//! Device state machine and reconciliation
//!
//! While the device reports an operation in progress, every other state field
//! is transitional and must not be trusted. All reads here therefore wait for
//! the device to be idle first and then read the field. The two steps are not
//! atomic: the device can start a new operation in between. A read is treated
//! as possibly stale, and an expectation that fails is re-waited and re-read
//! once before it is reported.

use crate::error::HarnessError;
use crate::poller::Poller;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tzrules_device::{
    read_state, ActiveRulesVersion, DeviceError, DeviceTransport, InstallFlags, InstallState,
    RulesVersion, StagedOperationType, StateType,
};

/// Expected value of a state field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Equals(String),
    NotEquals(String),
}

impl Expectation {
    /// Field must read exactly `value`
    #[must_use]
    pub fn equals(value: impl Into<String>) -> Self {
        Self::Equals(value.into())
    }

    /// Field must read anything but `value`
    #[must_use]
    pub fn not_equals(value: impl Into<String>) -> Self {
        Self::NotEquals(value.into())
    }

    /// Check a raw field value against this expectation
    #[must_use]
    pub fn matches(&self, actual: &str) -> bool {
        match self {
            Self::Equals(expected) => actual == expected,
            Self::NotEquals(unexpected) => actual != unexpected,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(expected) => write!(f, "{expected:?}"),
            Self::NotEquals(unexpected) => write!(f, "anything but {unexpected:?}"),
        }
    }
}

/// Timing and retry budget of the composite operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// How long a reboot may take before boot completes
    pub boot_timeout: Duration,
    /// How long to wait before checking that an older version was rejected
    pub rejection_settle_delay: Duration,
    /// Uninstall-and-reboot rounds allowed while resetting to clean
    pub reset_iterations: u32,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            boot_timeout: Duration::from_millis(60_000),
            rejection_settle_delay: Duration::from_millis(30_000),
            reset_iterations: 2,
        }
    }
}

/// What `reset_to_clean` found and did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetOutcome {
    /// Version of the rules in the system image
    pub system_version: RulesVersion,
    /// Whether a stale staged operation forced an initial reboot
    pub cleared_staged_operation: bool,
    /// Uninstalls that actually removed something
    pub uninstalls: u32,
}

/// Drives one device between well-defined rules-version states
#[derive(Debug)]
pub struct Reconciler<D> {
    device: D,
    package: String,
    poller: Poller,
    settings: ReconcilerSettings,
}

impl<D: DeviceTransport> Reconciler<D> {
    /// Create a reconciler for the data app `package`
    pub fn new(
        device: D,
        package: impl Into<String>,
        poller: Poller,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            device,
            package: package.into(),
            poller,
            settings,
        }
    }

    /// Get the device transport
    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Get the data app package name
    #[inline]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Get the poller
    #[inline]
    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Get timing settings
    #[inline]
    pub fn settings(&self) -> ReconcilerSettings {
        self.settings
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Whether the device is processing an install or uninstall
    ///
    /// # Errors
    /// `HarnessError::Device` if the query fails.
    pub fn is_operation_in_progress(&self) -> Result<bool, HarnessError> {
        let raw = read_state(&self.device, StateType::OperationInProgress)?;
        Ok(raw.eq_ignore_ascii_case("true"))
    }

    /// Wait until no operation is in progress, then read `field`
    ///
    /// # Errors
    /// - `HarnessError::ConditionTimeout` if the device stays busy
    /// - `HarnessError::Device` if a query fails
    pub fn wait_until_idle(&self, field: StateType) -> Result<String, HarnessError> {
        self.poller.wait_for("no operation in progress", || {
            Ok(!self.is_operation_in_progress()?)
        })?;
        Ok(read_state(&self.device, field)?)
    }

    /// IANA version of the rules in the system image
    pub fn system_rules_version(&self) -> Result<String, HarnessError> {
        self.wait_until_idle(StateType::SystemRulesVersion)
    }

    /// Install state of the rules in /data
    pub fn current_install_state(&self) -> Result<String, HarnessError> {
        self.wait_until_idle(StateType::CurrentInstallState)
    }

    /// `<iana>,<revision>` of the rules in /data, or `None`
    pub fn currently_installed_version(&self) -> Result<String, HarnessError> {
        self.wait_until_idle(StateType::CurrentlyInstalledVersion)
    }

    /// Operation staged for the next boot
    pub fn staged_operation_type(&self) -> Result<String, HarnessError> {
        self.wait_until_idle(StateType::StagedOperationType)
    }

    /// Version a staged install will apply, or `None`
    pub fn staged_install_version(&self) -> Result<String, HarnessError> {
        self.wait_until_idle(StateType::StagedInstallVersion)
    }

    /// `<icu>,<libcore>` rules versions in use
    pub fn active_rules_version(&self) -> Result<String, HarnessError> {
        self.wait_until_idle(StateType::ActiveRulesVersion)
    }

    /// Read every field, each after its own idle wait
    ///
    /// The result is not a consistent snapshot.
    ///
    /// # Errors
    /// Same as [`Reconciler::wait_until_idle`].
    pub fn state_dump(&self) -> Result<Vec<(StateType, String)>, HarnessError> {
        StateType::ALL
            .into_iter()
            .map(|field| -> Result<(StateType, String), HarnessError> {
                let value = match field {
                    StateType::OperationInProgress => read_state(&self.device, field)?,
                    _ => self.wait_until_idle(field)?,
                };
                Ok((field, value))
            })
            .collect()
    }

    /// Log the device's full diagnostic dump
    ///
    /// # Errors
    /// `HarnessError::Device` if the dump cannot be fetched.
    pub fn log_device_state(&self) -> Result<(), HarnessError> {
        let dump = self.device.dump_state()?;
        tracing::info!("device time zone state:\n{dump}");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Waits and checks
    // ---------------------------------------------------------------------

    /// Poll until `operation` is staged with `version`
    ///
    /// # Errors
    /// `HarnessError::ConditionTimeout` if the device never stages it.
    pub fn wait_for_staged_status(
        &self,
        operation: StagedOperationType,
        version: &RulesVersion,
    ) -> Result<(), HarnessError> {
        let condition = format!("staged operation {operation} of {version}");
        let version = version.to_string();
        self.poller.wait_for(&condition, || {
            Ok(self.staged_operation_type()? == operation.as_str()
                && self.staged_install_version()? == version)
        })
    }

    /// Check a field against an expectation, tolerating one racing operation
    ///
    /// # Errors
    /// `HarnessError::Assertion` with expected and actual values if the field
    /// still mismatches after a second idle wait.
    pub fn expect_state(
        &self,
        field: StateType,
        expectation: &Expectation,
    ) -> Result<(), HarnessError> {
        let actual = self.wait_until_idle(field)?;
        if expectation.matches(&actual) {
            return Ok(());
        }

        tracing::warn!(
            field = %field,
            expected = %expectation,
            actual = %actual,
            "state mismatch, re-reading once in case the device was mid-operation"
        );
        let actual = self.wait_until_idle(field)?;
        if expectation.matches(&actual) {
            return Ok(());
        }
        Err(HarnessError::Assertion {
            what: field.to_string(),
            expected: expectation.to_string(),
            actual,
        })
    }

    /// Reboot the device and wait for boot to complete
    ///
    /// # Errors
    /// `HarnessError::BootTimeout` if boot does not complete in time.
    pub fn reboot_and_wait(&self) -> Result<(), HarnessError> {
        tracing::info!("rebooting device");
        let timeout = self.settings.boot_timeout;
        if self.device.reboot_and_wait_online(timeout)? {
            Ok(())
        } else {
            Err(HarnessError::BootTimeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }

    // ---------------------------------------------------------------------
    // Composite operations
    // ---------------------------------------------------------------------

    /// Bring the device back to the system image's rules
    ///
    /// A clean device may have nothing in /data at all, or may have the system
    /// image version of the data app staged or installed. Any test package
    /// left behind by an earlier run is removed by uninstalling the data app
    /// update and rebooting into the system version.
    ///
    /// # Errors
    /// - `HarnessError::Precondition` if the data app is not installed
    /// - `HarnessError::ConditionTimeout` if the device never stages the
    ///   system version after an uninstall
    /// - `HarnessError::Assertion` if the device is not clean afterwards
    pub fn reset_to_clean(&self) -> Result<ResetOutcome, HarnessError> {
        let packages = self.device.list_installed_packages()?;
        if !packages.contains(&self.package) {
            return Err(HarnessError::Precondition(format!(
                "{} not installed",
                self.package
            )));
        }

        let system_iana = self.system_rules_version()?;
        let system_version = RulesVersion::system(system_iana.clone());
        tracing::info!(system_version = %system_version, "resetting device to clean");

        let cleared_staged_operation =
            self.staged_operation_type()? != StagedOperationType::None.as_str();
        if cleared_staged_operation {
            self.reboot_and_wait()?;
        }

        let mut uninstalls = 0;
        for _ in 0..self.settings.reset_iterations {
            self.log_device_state()?;

            if let Some(code) = self.device.uninstall_package(&self.package)? {
                tracing::info!(code = %code, "nothing to uninstall, device is clean");
                break;
            }
            uninstalls += 1;

            // Uninstalling the update makes the device fall back to the
            // system image version on next boot.
            self.wait_for_staged_status(StagedOperationType::Install, &system_version)?;
            self.reboot_and_wait()?;
            self.expect_state(
                StateType::CurrentlyInstalledVersion,
                &Expectation::equals(system_version.to_string()),
            )?;
        }

        self.expect_state(
            StateType::ActiveRulesVersion,
            &Expectation::equals(ActiveRulesVersion::uniform(&system_iana).to_string()),
        )?;
        self.expect_state(
            StateType::StagedOperationType,
            &Expectation::equals(StagedOperationType::None.as_str()),
        )?;

        Ok(ResetOutcome {
            system_version,
            cleared_staged_operation,
            uninstalls,
        })
    }

    /// Install a package and check it is staged, then applied on reboot
    ///
    /// # Errors
    /// - `HarnessError::ConditionTimeout` if the version is never staged
    /// - `HarnessError::Assertion` if the install takes effect before the
    ///   reboot or is not in effect after it
    pub fn install_and_verify(
        &self,
        apk: &Path,
        expected_version: &RulesVersion,
    ) -> Result<(), HarnessError> {
        let before = self.currently_installed_version()?;

        tracing::info!(apk = %apk.display(), version = %expected_version, "installing package");
        self.device.install_package_file(apk, InstallFlags::replace())?;

        self.wait_for_staged_status(StagedOperationType::Install, expected_version)?;

        // Nothing changes until the reboot.
        self.expect_state(
            StateType::CurrentlyInstalledVersion,
            &Expectation::Equals(before),
        )?;

        self.reboot_and_wait()?;

        self.expect_state(
            StateType::StagedOperationType,
            &Expectation::equals(StagedOperationType::None.as_str()),
        )?;
        self.expect_state(
            StateType::CurrentInstallState,
            &Expectation::equals(InstallState::Installed.as_str()),
        )?;
        self.expect_state(
            StateType::CurrentlyInstalledVersion,
            &Expectation::equals(expected_version.to_string()),
        )
    }

    /// Install a package the device should refuse to stage
    ///
    /// There is no state field reporting a rejected install, so the check is
    /// that nothing got staged after a fixed settle delay. A package manager
    /// that refuses the package outright counts as a rejection too.
    ///
    /// # Errors
    /// - `HarnessError::Assertion` if something was staged
    /// - `HarnessError::Device` if the install could not be attempted
    pub fn install_and_expect_rejection(&self, apk: &Path) -> Result<(), HarnessError> {
        tracing::info!(apk = %apk.display(), "installing package expected to be rejected");
        match self.device.install_package_file(apk, InstallFlags::replace()) {
            Ok(()) => {}
            Err(DeviceError::CommandFailed { message, .. }) => {
                tracing::info!(%message, "package manager refused the package");
            }
            Err(e) => return Err(e.into()),
        }

        self.poller.pause(self.settings.rejection_settle_delay);

        self.expect_state(
            StateType::StagedOperationType,
            &Expectation::equals(StagedOperationType::None.as_str()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::PollSettings;
    use std::sync::Arc;
    use tzrules_test_utils::{RecordingSleeper, SimulatedDevice};

    fn reconciler(device: SimulatedDevice) -> Reconciler<SimulatedDevice> {
        let poller = Poller::new(
            PollSettings::default(),
            Arc::new(RecordingSleeper::new()),
        );
        Reconciler::new(
            device,
            tzrules_test_utils::DATA_APP_PACKAGE,
            poller,
            ReconcilerSettings::default(),
        )
    }

    #[test]
    fn expectation_matching() {
        assert!(Expectation::equals("None").matches("None"));
        assert!(!Expectation::equals("None").matches("Install"));
        assert!(Expectation::not_equals("2030a,1").matches("2017a,1"));
        assert!(!Expectation::not_equals("2030a,1").matches("2030a,1"));
        assert_eq!(
            Expectation::not_equals("2030a,1").to_string(),
            "anything but \"2030a,1\""
        );
    }

    #[test]
    fn idle_read_waits_out_operation_in_progress() {
        let r = reconciler(SimulatedDevice::clean().with_operation_in_progress(3));
        assert_eq!(r.staged_operation_type().unwrap(), "None");
        assert!(!r.device().is_busy());
    }

    #[test]
    fn operation_in_progress_parses_literal_true_only() {
        let r = reconciler(SimulatedDevice::clean().with_operation_in_progress(1));
        assert!(r.is_operation_in_progress().unwrap());
        assert!(!r.is_operation_in_progress().unwrap());
    }

    #[test]
    fn assertion_reports_expected_and_actual() {
        let r = reconciler(SimulatedDevice::clean());
        let err = r
            .expect_state(
                StateType::StagedOperationType,
                &Expectation::equals("Install"),
            )
            .unwrap_err();
        match err {
            HarnessError::Assertion {
                what,
                expected,
                actual,
            } => {
                assert_eq!(what, "staged-operation-type");
                assert_eq!(expected, "\"Install\"");
                assert_eq!(actual, "None");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn state_dump_covers_every_field() {
        let r = reconciler(SimulatedDevice::clean());
        let dump = r.state_dump().unwrap();
        assert_eq!(dump.len(), 7);
        assert_eq!(dump[0], (StateType::OperationInProgress, "false".to_string()));
        assert_eq!(dump[6], (StateType::ActiveRulesVersion, "2017a,2017a".to_string()));
    }
}
