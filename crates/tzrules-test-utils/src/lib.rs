//! Testing utilities for the tzrules-xts workspace
//!
//! Shared test helpers: an in-memory device that follows the rules-version
//! staging contract, a sleeper that records instead of blocking, and fixture
//! file helpers.

#![allow(missing_docs)]

mod device;

pub use device::{DeviceAction, Faults, SimulatedDevice, StaleField};

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tzrules_device::{RulesVersion, Sleeper};

/// Package name of the data app on the simulated device
pub const DATA_APP_PACKAGE: &str = "com.oemcorp.timezonedata";

/// Fixture file prefix used by the tests
pub const APK_PREFIX: &str = "TimeZoneDataOemCorp";

/// IANA version baked into the simulated system image
pub const SYSTEM_IANA: &str = "2017a";

/// Version carried by the `test1` fixture
pub const TEST1_VERSION: &str = "2030a,1";

/// Version carried by the `test2` fixture (older than the system image)
pub const TEST2_VERSION: &str = "2016g,1";

/// Sleeper that records requested delays and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.sleeps.lock().len()
    }

    /// Sum of all requested delays
    pub fn total(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}

/// Write a package file the simulated device can install
///
/// Simulated packages carry nothing but their rules version.
pub fn write_package(dir: &Path, file_name: &str, version: &RulesVersion) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, version.to_string()).unwrap();
    path
}

/// Populate `dir` with the `test1` and `test2` fixtures under [`APK_PREFIX`]
pub fn write_standard_fixtures(dir: &Path) {
    write_package(
        dir,
        &format!("{APK_PREFIX}_test1.apk"),
        &TEST1_VERSION.parse().unwrap(),
    );
    write_package(
        dir,
        &format!("{APK_PREFIX}_test2.apk"),
        &TEST2_VERSION.parse().unwrap(),
    );
}
