//! Compliance scenarios
//!
//! Each scenario is an ordered list of steps: an action on the device paired
//! with the state it must reach, or a bare state expectation.

use crate::fixtures::Fixture;
use crate::reconciler::Expectation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tzrules_device::{RulesVersion, StagedOperationType, StateType};

/// One step of a scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStep {
    /// Check a state field without acting on the device
    Expect {
        field: StateType,
        expectation: Expectation,
    },
    /// Install a fixture; it must be staged, then installed after a reboot
    InstallAndVerify {
        fixture: Fixture,
        version: RulesVersion,
    },
    /// Install a fixture; nothing may be staged
    InstallAndExpectRejection { fixture: Fixture },
}

/// Compliance scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Rules newer than the system image are staged and applied on reboot
    NewerVersionAccepted,
    /// Rules older than the system image are never staged
    OlderVersionRejected,
}

impl Scenario {
    /// Every scenario, in run order
    pub const ALL: [Scenario; 2] = [Scenario::NewerVersionAccepted, Scenario::OlderVersionRejected];

    /// Name used on the command line and in reports
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Scenario::NewerVersionAccepted => "newer-version-accepted",
            Scenario::OlderVersionRejected => "older-version-rejected",
        }
    }

    /// Steps to run between setup and teardown
    #[must_use]
    pub fn steps(self) -> Vec<ScenarioStep> {
        match self {
            Scenario::NewerVersionAccepted => {
                let fixture = Fixture::Test1;
                let version = Fixture::test1_version();
                vec![
                    ScenarioStep::Expect {
                        field: StateType::CurrentlyInstalledVersion,
                        expectation: Expectation::not_equals(version.to_string()),
                    },
                    ScenarioStep::Expect {
                        field: StateType::StagedOperationType,
                        expectation: Expectation::equals(StagedOperationType::None.as_str()),
                    },
                    ScenarioStep::InstallAndVerify { fixture, version },
                ]
            }
            Scenario::OlderVersionRejected => vec![ScenarioStep::InstallAndExpectRejection {
                fixture: Fixture::Test2,
            }],
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|s| s.name()).collect();
                format!("unknown scenario {s:?} (expected one of: {})", known.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_version_checks_preconditions_before_installing() {
        let steps = Scenario::NewerVersionAccepted.steps();
        assert_eq!(steps.len(), 3);
        assert!(matches!(
            &steps[0],
            ScenarioStep::Expect { field: StateType::CurrentlyInstalledVersion, expectation }
                if *expectation == Expectation::not_equals("2030a,1")
        ));
        assert!(matches!(
            &steps[2],
            ScenarioStep::InstallAndVerify { fixture: Fixture::Test1, version }
                if version.to_string() == "2030a,1"
        ));
    }

    #[test]
    fn older_version_only_installs_test2() {
        assert_eq!(
            Scenario::OlderVersionRejected.steps(),
            vec![ScenarioStep::InstallAndExpectRejection {
                fixture: Fixture::Test2
            }]
        );
    }

    #[test]
    fn names_parse_back() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>(), Ok(scenario));
        }
        assert!("install-everything".parse::<Scenario>().is_err());
    }
}
