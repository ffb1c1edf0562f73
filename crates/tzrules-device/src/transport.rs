//! Device transport
//!
//! The harness only needs six things from a device. Each call blocks until the
//! command itself has returned; whatever the device does asynchronously in
//! response has to be observed through the diagnostic state fields.

use crate::error::DeviceError;
use crate::state::StateType;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Options for package installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstallFlags {
    /// Replace an already installed package (`-r`)
    pub replace: bool,
}

impl InstallFlags {
    /// Install replacing any existing package
    #[inline]
    #[must_use]
    pub const fn replace() -> Self {
        Self { replace: true }
    }
}

/// Command channel to a single device under test
pub trait DeviceTransport {
    /// Push and install a package file from the host
    fn install_package_file(&self, path: &Path, flags: InstallFlags) -> Result<(), DeviceError>;

    /// Uninstall a package
    ///
    /// Returns `None` if something was removed, or the device's error code
    /// if there was nothing to remove.
    fn uninstall_package(&self, package: &str) -> Result<Option<String>, DeviceError>;

    /// Reboot and block until boot completes or `timeout` elapses
    ///
    /// Returns `false` on timeout.
    fn reboot_and_wait_online(&self, timeout: Duration) -> Result<bool, DeviceError>;

    /// Run the single-field diagnostic query and return its raw output line
    fn query_diagnostic_field(&self, field: StateType) -> Result<String, DeviceError>;

    /// Full diagnostic dump, for logging
    fn dump_state(&self) -> Result<String, DeviceError>;

    /// Names of all installed packages
    fn list_installed_packages(&self) -> Result<BTreeSet<String>, DeviceError>;
}

impl<T: DeviceTransport + ?Sized> DeviceTransport for &T {
    fn install_package_file(&self, path: &Path, flags: InstallFlags) -> Result<(), DeviceError> {
        (**self).install_package_file(path, flags)
    }

    fn uninstall_package(&self, package: &str) -> Result<Option<String>, DeviceError> {
        (**self).uninstall_package(package)
    }

    fn reboot_and_wait_online(&self, timeout: Duration) -> Result<bool, DeviceError> {
        (**self).reboot_and_wait_online(timeout)
    }

    fn query_diagnostic_field(&self, field: StateType) -> Result<String, DeviceError> {
        (**self).query_diagnostic_field(field)
    }

    fn dump_state(&self) -> Result<String, DeviceError> {
        (**self).dump_state()
    }

    fn list_installed_packages(&self) -> Result<BTreeSet<String>, DeviceError> {
        (**self).list_installed_packages()
    }
}
