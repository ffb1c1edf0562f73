//! Scenario and suite driver
//!
//! Every scenario runs as setup, body, teardown: setup and teardown both
//! reset the device to clean, and teardown runs whatever happened before it.

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::fixtures::{FixtureStore, ScratchDir};
use crate::poller::Poller;
use crate::reconciler::Reconciler;
use crate::report::{Outcome, ScenarioReport, SuiteReport};
use crate::scenario::{Scenario, ScenarioStep};
use std::sync::Arc;
use std::time::Instant;
use tzrules_device::{DeviceTransport, ThreadSleeper};

/// Runs compliance scenarios against one device
#[derive(Debug)]
pub struct ScenarioRunner<D> {
    reconciler: Reconciler<D>,
    fixtures: FixtureStore,
}

impl<D: DeviceTransport> ScenarioRunner<D> {
    /// Create a runner from its parts
    pub fn new(reconciler: Reconciler<D>, fixtures: FixtureStore) -> Self {
        Self {
            reconciler,
            fixtures,
        }
    }

    /// Create a runner that sleeps for real, as configured
    pub fn from_config(device: D, config: &HarnessConfig) -> Self {
        let poller = Poller::new(config.poll_settings(), Arc::new(ThreadSleeper));
        let reconciler = Reconciler::new(
            device,
            config.package_name.clone(),
            poller,
            config.reconciler_settings(),
        );
        Self::new(
            reconciler,
            FixtureStore::new(&config.fixtures_dir, &config.apk_prefix),
        )
    }

    #[inline]
    pub fn reconciler(&self) -> &Reconciler<D> {
        &self.reconciler
    }

    /// Run one scenario with setup and teardown
    pub fn run_scenario(&self, scenario: Scenario) -> ScenarioReport {
        self.execute(scenario).0
    }

    /// Run scenarios in order
    ///
    /// A scenario failing on a precondition aborts the suite; every scenario
    /// after it is reported as skipped.
    pub fn run_suite(&self, scenarios: &[Scenario]) -> SuiteReport {
        let mut report = SuiteReport::new();
        let mut remaining = scenarios.iter();

        for &scenario in remaining.by_ref() {
            let (scenario_report, aborts) = self.execute(scenario);
            report.scenarios.push(scenario_report);
            if aborts {
                tracing::error!(scenario = %scenario, "precondition failed, aborting suite");
                break;
            }
        }
        report
            .scenarios
            .extend(remaining.map(|&scenario| ScenarioReport::skipped(scenario)));

        report
    }

    /// Run a scenario; the flag tells whether the suite must stop
    fn execute(&self, scenario: Scenario) -> (ScenarioReport, bool) {
        let started = Instant::now();
        tracing::info!(scenario = %scenario, "starting scenario");

        let (error, teardown_error) = match ScratchDir::create() {
            Ok(scratch) => {
                let result = self
                    .reconciler
                    .reset_to_clean()
                    .and_then(|_| self.run_steps(scenario, &scratch));

                let teardown = self.reconciler.reset_to_clean().err();
                if let Some(err) = &teardown {
                    tracing::warn!(scenario = %scenario, error = %err, "teardown failed");
                }
                if let Err(err) = scratch.close() {
                    tracing::warn!(scenario = %scenario, error = %err, "cannot remove scratch directory");
                }
                (result.err(), teardown)
            }
            Err(err) => (Some(HarnessError::from(err)), None),
        };

        let aborts = error.as_ref().is_some_and(HarnessError::aborts_suite);
        let outcome = if error.is_none() && teardown_error.is_none() {
            Outcome::Passed
        } else {
            Outcome::Failed
        };
        match &error {
            Some(err) => tracing::error!(scenario = %scenario, error = %err, "scenario failed"),
            None => tracing::info!(scenario = %scenario, %outcome, "scenario finished"),
        }

        let report = ScenarioReport {
            scenario,
            outcome,
            error: error.map(|e| e.to_string()),
            teardown_error: teardown_error.map(|e| e.to_string()),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        (report, aborts)
    }

    fn run_steps(&self, scenario: Scenario, scratch: &ScratchDir) -> Result<(), HarnessError> {
        for step in scenario.steps() {
            match step {
                ScenarioStep::Expect { field, expectation } => {
                    self.reconciler.expect_state(field, &expectation)?;
                }
                ScenarioStep::InstallAndVerify { fixture, version } => {
                    let apk = self.fixtures.extract(fixture, scratch)?;
                    self.reconciler.install_and_verify(&apk, &version)?;
                }
                ScenarioStep::InstallAndExpectRejection { fixture } => {
                    let apk = self.fixtures.extract(fixture, scratch)?;
                    self.reconciler.install_and_expect_rejection(&apk)?;
                }
            }
        }
        Ok(())
    }
}
