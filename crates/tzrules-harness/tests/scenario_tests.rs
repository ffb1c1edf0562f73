//! End-to-end scenario runs against the simulated device

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tzrules_device::{InstallState, RulesVersion, StagedOperation};
use tzrules_harness::{
    FixtureStore, Outcome, PollSettings, Poller, Reconciler, ReconcilerSettings, Scenario,
    ScenarioReport, ScenarioRunner,
};
use tzrules_test_utils::{
    write_standard_fixtures, DeviceAction, Faults, RecordingSleeper, SimulatedDevice,
    APK_PREFIX, DATA_APP_PACKAGE,
};

struct Harness {
    runner: ScenarioRunner<SimulatedDevice>,
    sleeper: Arc<RecordingSleeper>,
    _fixtures: TempDir,
}

fn harness(device: SimulatedDevice) -> Harness {
    let fixtures = tempfile::tempdir().unwrap();
    write_standard_fixtures(fixtures.path());

    let sleeper = Arc::new(RecordingSleeper::new());
    let poller = Poller::new(PollSettings::default(), sleeper.clone());
    let reconciler = Reconciler::new(
        device,
        DATA_APP_PACKAGE,
        poller,
        ReconcilerSettings::default(),
    );
    let runner = ScenarioRunner::new(reconciler, FixtureStore::new(fixtures.path(), APK_PREFIX));

    Harness {
        runner,
        sleeper,
        _fixtures: fixtures,
    }
}

fn installed_paths(device: &SimulatedDevice) -> Vec<std::path::PathBuf> {
    device
        .actions()
        .into_iter()
        .filter_map(|action| match action {
            DeviceAction::Install { path, .. } => Some(path),
            _ => None,
        })
        .collect()
}

#[test]
fn newer_version_accepted_passes_and_leaves_device_clean() {
    let h = harness(SimulatedDevice::clean());

    let report = h.runner.run_scenario(Scenario::NewerVersionAccepted);

    assert_eq!(report.outcome, Outcome::Passed, "{report:?}");
    assert_eq!(report.error, None);
    assert_eq!(report.teardown_error, None);

    let device = h.runner.reconciler().device();
    assert_eq!(device.install_count(), 1);
    // One reboot to apply test1, one in teardown to restore the system version.
    assert_eq!(device.reboot_count(), 2);
    assert_eq!(device.installed(), Some(RulesVersion::system("2017a")));
    assert_eq!(device.staged(), StagedOperation::None);
}

#[test]
fn older_version_rejected_passes() {
    let h = harness(SimulatedDevice::clean());

    let report = h.runner.run_scenario(Scenario::OlderVersionRejected);

    assert_eq!(report.outcome, Outcome::Passed, "{report:?}");
    assert!(h.sleeper.sleeps().contains(&Duration::from_secs(30)));
    let device = h.runner.reconciler().device();
    assert_eq!(device.install_count(), 1);
    assert_eq!(device.staged(), StagedOperation::None);
}

#[test]
fn newer_version_accepted_recovers_from_leftover_install() {
    let leftover = RulesVersion::new("2030a", 1);
    let h = harness(SimulatedDevice::clean().with_leftover_install(&leftover));

    let report = h.runner.run_scenario(Scenario::NewerVersionAccepted);

    assert_eq!(report.outcome, Outcome::Passed, "{report:?}");
    assert_eq!(
        h.runner.reconciler().device().install_state(),
        InstallState::Installed
    );
}

#[test]
fn device_accepting_older_versions_fails_rejection_scenario() {
    let h = harness(SimulatedDevice::clean().with_faults(Faults {
        accept_older_versions: true,
        ..Faults::default()
    }));

    let report = h.runner.run_scenario(Scenario::OlderVersionRejected);

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(
        report.error.as_deref(),
        Some("staged-operation-type: expected \"None\", got \"Install\"")
    );
    // Teardown still brings the device back.
    assert_eq!(report.teardown_error, None);
    assert_eq!(
        h.runner.reconciler().device().installed(),
        Some(RulesVersion::system("2017a"))
    );
}

#[test]
fn scratch_directory_is_removed_after_failure() {
    let h = harness(SimulatedDevice::clean().with_faults(Faults {
        accept_older_versions: true,
        ..Faults::default()
    }));

    let report = h.runner.run_scenario(Scenario::OlderVersionRejected);
    assert_eq!(report.outcome, Outcome::Failed);

    let paths = installed_paths(h.runner.reconciler().device());
    assert_eq!(paths.len(), 1);
    assert!(!paths[0].exists());
    assert!(paths[0]
        .parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("timeZoneUpdateTest")));
    assert!(!paths[0].parent().unwrap().exists());
}

#[test]
fn each_scenario_gets_its_own_scratch_directory() {
    let h = harness(SimulatedDevice::clean());

    let report = h.runner.run_suite(&Scenario::ALL);
    assert!(report.passed(), "{}", report.generate_text());

    let paths = installed_paths(h.runner.reconciler().device());
    assert_eq!(paths.len(), 2);
    assert_ne!(paths[0].parent(), paths[1].parent());
}

#[test]
fn full_suite_passes_on_compliant_device() {
    let h = harness(SimulatedDevice::clean().with_busy_queries(3));

    let report = h.runner.run_suite(&Scenario::ALL);

    let outcomes: Vec<_> = report
        .scenarios
        .iter()
        .map(|s| (s.scenario, s.outcome))
        .collect();
    assert_eq!(
        outcomes,
        vec![
            (Scenario::NewerVersionAccepted, Outcome::Passed),
            (Scenario::OlderVersionRejected, Outcome::Passed),
        ]
    );
    assert!(report.generate_text().ends_with("=== Result: PASS ===\n"));
}

#[test]
fn suite_aborts_when_data_app_is_missing() {
    let h = harness(SimulatedDevice::clean().without_data_app());

    let report = h.runner.run_suite(&Scenario::ALL);

    assert_eq!(report.scenarios[0].outcome, Outcome::Failed);
    assert_eq!(
        report.scenarios[1],
        ScenarioReport::skipped(Scenario::OlderVersionRejected)
    );
    assert!(!report.passed());
    assert_eq!(h.runner.reconciler().device().install_count(), 0);
}

#[test]
fn ordinary_failure_does_not_abort_suite() {
    let h = harness(SimulatedDevice::clean().with_faults(Faults {
        accept_older_versions: true,
        ..Faults::default()
    }));

    let report = h
        .runner
        .run_suite(&[Scenario::OlderVersionRejected, Scenario::NewerVersionAccepted]);

    assert_eq!(report.scenarios[0].outcome, Outcome::Failed);
    assert_eq!(report.scenarios[1].outcome, Outcome::Passed);
}
