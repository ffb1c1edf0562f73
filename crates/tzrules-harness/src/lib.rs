//! tzrules-harness - Compliance checks for time zone rules updates
//!
//! Drives a device through installs, uninstalls and reboots of the time zone
//! data app and checks that its rules-version staging reaches the expected
//! states within bounded time:
//! - `Poller` retries a state predicate with fixed backoff
//! - `Reconciler` knows what "idle", "staged", "installed" and "clean" mean
//! - `ScenarioRunner` runs the compliance scenarios with setup and teardown
//!
//! # Example
//!
//! ```rust,ignore
//! use tzrules_harness::prelude::*;
//! use tzrules_device::AdbDevice;
//!
//! let config = HarnessConfig::load("tzrules.toml".as_ref())?;
//! let runner = ScenarioRunner::from_config(AdbDevice::new(&config.adb_path), &config);
//! let report = runner.run_suite(&Scenario::ALL);
//! println!("{}", report.generate_text());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod fixtures;
pub mod logging;
pub mod poller;
pub mod reconciler;
pub mod report;
pub mod scenario;
pub mod suite;

pub use config::HarnessConfig;
pub use error::{ConfigError, FixtureError, HarnessError};
pub use fixtures::{Fixture, FixtureStore, ScratchDir};
pub use poller::{PollSettings, Poller};
pub use reconciler::{Expectation, Reconciler, ReconcilerSettings, ResetOutcome};
pub use report::{Outcome, ScenarioReport, SuiteReport};
pub use scenario::{Scenario, ScenarioStep};
pub use suite::ScenarioRunner;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running the compliance scenarios
    pub use crate::{
        Expectation, HarnessConfig, HarnessError, PollSettings, Poller, Reconciler,
        ReconcilerSettings, Scenario, ScenarioRunner, SuiteReport,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
