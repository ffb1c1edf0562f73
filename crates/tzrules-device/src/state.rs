//! Device state fields and rules version values
//!
//! The device reports its rules-version staging state through a diagnostic
//! dump that can be narrowed to a single field with a one-character code.
//! The codes are shared with the device-side dump implementation and must
//! never be renumbered on one side only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the seven diagnostic state fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateType {
    /// Whether an install/uninstall is being processed
    OperationInProgress,
    /// IANA version of the rules in the system image
    SystemRulesVersion,
    /// Install state of the rules in /data
    CurrentInstallState,
    /// Rules version installed in /data
    CurrentlyInstalledVersion,
    /// Operation staged for the next boot
    StagedOperationType,
    /// Rules version staged for the next boot
    StagedInstallVersion,
    /// Rules versions in effect (ICU, libcore)
    ActiveRulesVersion,
}

impl StateType {
    /// Every field, in dump order
    pub const ALL: [StateType; 7] = [
        StateType::OperationInProgress,
        StateType::SystemRulesVersion,
        StateType::CurrentInstallState,
        StateType::CurrentlyInstalledVersion,
        StateType::StagedOperationType,
        StateType::StagedInstallVersion,
        StateType::ActiveRulesVersion,
    ];

    /// Single-character code passed to `dumpsys timezone -format_state`
    #[inline]
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            StateType::OperationInProgress => 'p',
            StateType::SystemRulesVersion => 's',
            StateType::CurrentInstallState => 'c',
            StateType::CurrentlyInstalledVersion => 'i',
            StateType::StagedOperationType => 'o',
            StateType::StagedInstallVersion => 't',
            StateType::ActiveRulesVersion => 'a',
        }
    }

    /// Inverse of [`StateType::code`]
    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.code() == code)
    }

    /// Label the device prints in front of the value
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            StateType::OperationInProgress => "Operation in progress",
            StateType::SystemRulesVersion => "System rules version",
            StateType::CurrentInstallState => "Current install state",
            StateType::CurrentlyInstalledVersion => "Installed rules version",
            StateType::StagedOperationType => "Staged operation",
            StateType::StagedInstallVersion => "Staged rules version",
            StateType::ActiveRulesVersion => "Active rules version (ICU, libcore)",
        }
    }

    /// Kebab-case name used in logs and reports
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            StateType::OperationInProgress => "operation-in-progress",
            StateType::SystemRulesVersion => "system-rules-version",
            StateType::CurrentInstallState => "current-install-state",
            StateType::CurrentlyInstalledVersion => "currently-installed-version",
            StateType::StagedOperationType => "staged-operation-type",
            StateType::StagedInstallVersion => "staged-install-version",
            StateType::ActiveRulesVersion => "active-rules-version",
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error parsing a rules version string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RulesVersionError {
    /// No `,` separating IANA version and revision
    #[error("missing revision in {0:?}")]
    MissingRevision(String),

    /// IANA version part is empty
    #[error("empty IANA version in {0:?}")]
    EmptyIanaVersion(String),

    /// Revision is not a non-negative integer
    #[error("invalid revision in {0:?}")]
    InvalidRevision(String),
}

/// A time zone rules payload identifier: IANA version plus revision
///
/// Serialized as `"<iana_version>,<revision>"`, e.g. `"2030a,1"`. The host
/// never orders versions; whether an older version is rejected is decided
/// on the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RulesVersion {
    pub iana_version: String,
    pub revision: u32,
}

impl RulesVersion {
    /// Create a rules version
    #[inline]
    #[must_use]
    pub fn new(iana_version: impl Into<String>, revision: u32) -> Self {
        Self {
            iana_version: iana_version.into(),
            revision,
        }
    }

    /// Version of the rules shipped with the system image
    ///
    /// Devices are assumed to ship with revision 1.
    #[inline]
    #[must_use]
    pub fn system(iana_version: impl Into<String>) -> Self {
        Self::new(iana_version, 1)
    }
}

impl fmt::Display for RulesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.iana_version, self.revision)
    }
}

impl FromStr for RulesVersion {
    type Err = RulesVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (iana, revision) = s
            .split_once(',')
            .ok_or_else(|| RulesVersionError::MissingRevision(s.to_string()))?;
        if iana.is_empty() {
            return Err(RulesVersionError::EmptyIanaVersion(s.to_string()));
        }
        let revision = revision
            .parse()
            .map_err(|_| RulesVersionError::InvalidRevision(s.to_string()))?;
        Ok(Self::new(iana, revision))
    }
}

/// Rules versions in effect, as reported by ICU and libcore
///
/// Both should always agree with each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRulesVersion {
    pub icu: String,
    pub libcore: String,
}

impl ActiveRulesVersion {
    /// Both subsystems on the same IANA version
    #[must_use]
    pub fn uniform(iana_version: &str) -> Self {
        Self {
            icu: iana_version.to_string(),
            libcore: iana_version.to_string(),
        }
    }
}

impl fmt::Display for ActiveRulesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.icu, self.libcore)
    }
}

/// Install state of the rules in /data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallState {
    NotInstalled,
    Installed,
    Unknown,
}

impl InstallState {
    /// Value as printed by the device
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            InstallState::NotInstalled => "None",
            InstallState::Installed => "Installed",
            InstallState::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of operation staged for the next boot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedOperationType {
    None,
    Install,
    Uninstall,
    Unknown,
}

impl StagedOperationType {
    /// Value as printed by the device
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StagedOperationType::None => "None",
            StagedOperationType::Install => "Install",
            StagedOperationType::Uninstall => "Uninstall",
            StagedOperationType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for StagedOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation staged for the next boot, with its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StagedOperation {
    None,
    Install(RulesVersion),
    Uninstall,
}

impl StagedOperation {
    /// Kind of this operation
    #[must_use]
    pub fn kind(&self) -> StagedOperationType {
        match self {
            StagedOperation::None => StagedOperationType::None,
            StagedOperation::Install(_) => StagedOperationType::Install,
            StagedOperation::Uninstall => StagedOperationType::Uninstall,
        }
    }

    /// Staged rules version, if the operation carries one
    #[must_use]
    pub fn version(&self) -> Option<&RulesVersion> {
        match self {
            StagedOperation::Install(version) => Some(version),
            StagedOperation::None | StagedOperation::Uninstall => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn field_codes_are_distinct_and_invertible() {
        let codes: HashSet<char> = StateType::ALL.iter().map(|f| f.code()).collect();
        assert_eq!(codes.len(), StateType::ALL.len());

        for field in StateType::ALL {
            assert_eq!(StateType::from_code(field.code()), Some(field));
        }
    }

    #[test]
    fn field_codes_match_dump_alphabet() {
        let alphabet: String = StateType::ALL.iter().map(|f| f.code()).collect();
        assert_eq!(alphabet, "psciota");
        assert_eq!(StateType::from_code('x'), None);
    }

    #[test]
    fn rules_version_parses_and_prints() {
        let version: RulesVersion = "2030a,1".parse().unwrap();
        assert_eq!(version, RulesVersion::new("2030a", 1));
        assert_eq!(version.to_string(), "2030a,1");
        assert_eq!(RulesVersion::system("2017c").to_string(), "2017c,1");
    }

    #[test]
    fn rules_version_rejects_malformed_input() {
        assert_eq!(
            "2030a".parse::<RulesVersion>(),
            Err(RulesVersionError::MissingRevision("2030a".into()))
        );
        assert_eq!(
            ",1".parse::<RulesVersion>(),
            Err(RulesVersionError::EmptyIanaVersion(",1".into()))
        );
        assert_eq!(
            "2030a,x".parse::<RulesVersion>(),
            Err(RulesVersionError::InvalidRevision("2030a,x".into()))
        );
    }

    #[test]
    fn active_version_joins_both_subsystems() {
        assert_eq!(ActiveRulesVersion::uniform("2017a").to_string(), "2017a,2017a");
    }

    #[test]
    fn staged_operation_kind_and_version() {
        let staged = StagedOperation::Install(RulesVersion::new("2030a", 1));
        assert_eq!(staged.kind(), StagedOperationType::Install);
        assert_eq!(staged.version().map(ToString::to_string).as_deref(), Some("2030a,1"));
        assert_eq!(StagedOperation::Uninstall.version(), None);
        assert_eq!(StagedOperation::None.kind().as_str(), "None");
    }
}
