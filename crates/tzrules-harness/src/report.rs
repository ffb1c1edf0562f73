//! Run reports

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fmt::Write as _;

use crate::scenario::Scenario;

/// Result of a single scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    /// Not run because an earlier scenario aborted the suite
    Skipped,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Passed => "PASS",
            Outcome::Failed => "FAIL",
            Outcome::Skipped => "SKIP",
        })
    }
}

/// Report for one scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub outcome: Outcome,
    /// First error from setup or the scenario body
    pub error: Option<String>,
    /// Teardown error, reported alongside `error`
    pub teardown_error: Option<String>,
    pub duration_ms: u64,
}

impl ScenarioReport {
    /// Report for a scenario that was never started
    #[must_use]
    pub fn skipped(scenario: Scenario) -> Self {
        Self {
            scenario,
            outcome: Outcome::Skipped,
            error: None,
            teardown_error: None,
            duration_ms: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

/// Report for a whole suite
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub started_at: DateTime<Utc>,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    /// Start an empty report stamped with the current time
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            scenarios: Vec::new(),
        }
    }

    /// Check if every scenario passed
    ///
    /// An empty suite passes.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.scenarios
            .iter()
            .filter(|report| report.outcome == outcome)
            .count()
    }

    /// Generate text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Time Zone Rules Update Compliance Report ===\n\n");
        let _ = writeln!(report, "Started: {}", self.started_at.to_rfc3339());
        for scenario in &self.scenarios {
            let _ = writeln!(
                report,
                "[{}] {} ({} ms)",
                scenario.outcome, scenario.scenario, scenario.duration_ms
            );
            if let Some(error) = &scenario.error {
                let _ = writeln!(report, "    error: {error}");
            }
            if let Some(error) = &scenario.teardown_error {
                let _ = writeln!(report, "    teardown error: {error}");
            }
        }

        let _ = writeln!(
            report,
            "\nPassed: {}  Failed: {}  Skipped: {}",
            self.count(Outcome::Passed),
            self.count(Outcome::Failed),
            self.count(Outcome::Skipped)
        );
        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );

        report
    }

    /// Serialize as pretty-printed JSON
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for SuiteReport {
    fn default() -> Self {
        Self::new()
    }
}
