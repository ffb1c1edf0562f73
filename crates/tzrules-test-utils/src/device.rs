//! Simulated device
//!
//! Models the device side of rules-version staging closely enough to drive
//! the reconciler: installs and uninstalls are processed asynchronously (the
//! device reports an operation in progress for a configurable number of
//! queries), staged operations take effect on reboot, and versions older
//! than the system image are rejected.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tzrules_device::{
    ActiveRulesVersion, DeviceError, DeviceTransport, InstallFlags, InstallState, RulesVersion,
    StagedOperation, StateType,
};

use crate::{DATA_APP_PACKAGE, SYSTEM_IANA};

/// Something the harness asked the device to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    Install { path: PathBuf, replace: bool },
    Uninstall { package: String, removed: bool },
    Reboot,
    Dump,
    ListPackages,
}

/// Misconfigurations and transport failures to inject
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Stage versions older than the system image instead of rejecting them
    pub accept_older_versions: bool,
    /// Never stage the system version after the data app is uninstalled
    pub ignore_uninstall: bool,
    /// Fail every query after this many successful ones
    pub fail_queries_after: Option<usize>,
    /// Reboots never report boot completion
    pub boot_never_completes: bool,
    /// The package manager refuses older versions outright
    pub refuse_downgrades: bool,
    /// A field that lags behind the device state for its first reads
    pub stale_field: Option<StaleField>,
}

/// Outdated value reported by one field while the device is idle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleField {
    pub field: StateType,
    pub value: String,
    /// Reads of `field` that still see `value`
    pub reads: usize,
}

#[derive(Debug)]
enum Effect {
    Stage(StagedOperation),
    Nothing,
}

#[derive(Debug)]
struct Pending {
    remaining: usize,
    effect: Effect,
}

#[derive(Debug)]
struct Model {
    package: String,
    packages: BTreeSet<String>,
    data_app_updated: bool,
    system_iana: String,
    install_state: InstallState,
    installed: Option<RulesVersion>,
    staged: StagedOperation,
    pending: Option<Pending>,
    busy_queries: usize,
    faults: Faults,
    actions: Vec<DeviceAction>,
    queries: usize,
}

impl Model {
    fn tick(&mut self) {
        let Some(pending) = &mut self.pending else {
            return;
        };
        if pending.remaining > 0 {
            pending.remaining -= 1;
            return;
        }
        if let Some(Pending {
            effect: Effect::Stage(staged),
            ..
        }) = self.pending.take()
        {
            self.staged = staged;
        }
    }

    fn start(&mut self, effect: Effect) {
        self.pending = Some(Pending {
            remaining: self.busy_queries,
            effect,
        });
    }

    fn active(&self) -> ActiveRulesVersion {
        match &self.installed {
            Some(v) if v.iana_version > self.system_iana => ActiveRulesVersion::uniform(&v.iana_version),
            _ => ActiveRulesVersion::uniform(&self.system_iana),
        }
    }

    fn value(&self, field: StateType) -> String {
        if self.pending.is_some() {
            return match field {
                StateType::OperationInProgress => "true".to_string(),
                _ => "Unknown".to_string(),
            };
        }
        match field {
            StateType::OperationInProgress => "false".to_string(),
            StateType::SystemRulesVersion => self.system_iana.clone(),
            StateType::CurrentInstallState => self.install_state.to_string(),
            StateType::CurrentlyInstalledVersion => self
                .installed
                .as_ref()
                .map_or_else(|| "None".to_string(), ToString::to_string),
            StateType::StagedOperationType => self.staged.kind().to_string(),
            StateType::StagedInstallVersion => self
                .staged
                .version()
                .map_or_else(|| "None".to_string(), ToString::to_string),
            StateType::ActiveRulesVersion => self.active().to_string(),
        }
    }

    fn accepts(&self, version: &RulesVersion) -> bool {
        let system = RulesVersion::system(self.system_iana.clone());
        let newer = (&version.iana_version, version.revision) > (&system.iana_version, system.revision);
        newer || self.faults.accept_older_versions
    }
}

/// In-memory device implementing `DeviceTransport`
#[derive(Debug)]
pub struct SimulatedDevice {
    model: Mutex<Model>,
}

impl SimulatedDevice {
    /// A device with only the system image data app and nothing in /data
    pub fn clean() -> Self {
        Self::with_system_version(SYSTEM_IANA)
    }

    pub fn with_system_version(system_iana: &str) -> Self {
        let package = DATA_APP_PACKAGE.to_string();
        Self {
            model: Mutex::new(Model {
                packages: BTreeSet::from(["com.android.phone".to_string(), package.clone()]),
                package,
                data_app_updated: false,
                system_iana: system_iana.to_string(),
                install_state: InstallState::NotInstalled,
                installed: None,
                staged: StagedOperation::None,
                pending: None,
                busy_queries: 2,
                faults: Faults::default(),
                actions: Vec::new(),
                queries: 0,
            }),
        }
    }

    /// A previous run left a data app update and its rules installed
    #[must_use]
    pub fn with_leftover_install(self, version: &RulesVersion) -> Self {
        {
            let mut m = self.model.lock();
            m.data_app_updated = true;
            m.installed = Some(version.clone());
            m.install_state = InstallState::Installed;
        }
        self
    }

    /// A data app update is present without anything installed yet
    #[must_use]
    pub fn with_updated_data_app(self) -> Self {
        self.model.lock().data_app_updated = true;
        self
    }

    /// Something is already staged for the next boot
    #[must_use]
    pub fn with_staged(self, staged: StagedOperation) -> Self {
        self.model.lock().staged = staged;
        self
    }

    /// The device is busy for the next `queries` queries
    #[must_use]
    pub fn with_operation_in_progress(self, queries: usize) -> Self {
        self.model.lock().pending = Some(Pending {
            remaining: queries,
            effect: Effect::Nothing,
        });
        self
    }

    /// Number of queries each install/uninstall keeps the device busy
    #[must_use]
    pub fn with_busy_queries(self, queries: usize) -> Self {
        self.model.lock().busy_queries = queries;
        self
    }

    #[must_use]
    pub fn with_faults(self, faults: Faults) -> Self {
        self.model.lock().faults = faults;
        self
    }

    /// The data app is not installed at all
    #[must_use]
    pub fn without_data_app(self) -> Self {
        {
            let mut m = self.model.lock();
            let package = m.package.clone();
            m.packages.remove(&package);
        }
        self
    }

    pub fn actions(&self) -> Vec<DeviceAction> {
        self.model.lock().actions.clone()
    }

    pub fn reboot_count(&self) -> usize {
        self.count(|a| matches!(a, DeviceAction::Reboot))
    }

    pub fn uninstall_count(&self) -> usize {
        self.count(|a| matches!(a, DeviceAction::Uninstall { .. }))
    }

    pub fn install_count(&self) -> usize {
        self.count(|a| matches!(a, DeviceAction::Install { .. }))
    }

    pub fn query_count(&self) -> usize {
        self.model.lock().queries
    }

    pub fn staged(&self) -> StagedOperation {
        self.model.lock().staged.clone()
    }

    pub fn installed(&self) -> Option<RulesVersion> {
        self.model.lock().installed.clone()
    }

    pub fn install_state(&self) -> InstallState {
        self.model.lock().install_state
    }

    pub fn active_rules_version(&self) -> ActiveRulesVersion {
        self.model.lock().active()
    }

    pub fn is_busy(&self) -> bool {
        self.model.lock().pending.is_some()
    }

    fn count(&self, pred: impl Fn(&DeviceAction) -> bool) -> usize {
        self.model.lock().actions.iter().filter(|a| pred(a)).count()
    }
}

impl DeviceTransport for SimulatedDevice {
    fn install_package_file(&self, path: &Path, flags: InstallFlags) -> Result<(), DeviceError> {
        let content = std::fs::read_to_string(path)?;
        let version: RulesVersion = content.trim().parse().map_err(|e| DeviceError::CommandFailed {
            command: format!("install {}", path.display()),
            message: format!("Failure [INSTALL_PARSE_FAILED]: {e}"),
        })?;

        let mut m = self.model.lock();
        m.actions.push(DeviceAction::Install {
            path: path.to_path_buf(),
            replace: flags.replace,
        });
        if m.faults.refuse_downgrades && !m.accepts(&version) {
            return Err(DeviceError::CommandFailed {
                command: format!("install {}", path.display()),
                message: "Failure [INSTALL_FAILED_VERSION_DOWNGRADE]".to_string(),
            });
        }
        m.data_app_updated = true;
        let effect = if m.accepts(&version) {
            Effect::Stage(StagedOperation::Install(version))
        } else {
            Effect::Nothing
        };
        m.start(effect);
        Ok(())
    }

    fn uninstall_package(&self, package: &str) -> Result<Option<String>, DeviceError> {
        let mut m = self.model.lock();
        let removable = package == m.package && m.data_app_updated;
        m.actions.push(DeviceAction::Uninstall {
            package: package.to_string(),
            removed: removable,
        });
        if !removable {
            return Ok(Some("DELETE_FAILED_INTERNAL_ERROR".to_string()));
        }

        m.data_app_updated = false;
        let effect = if m.faults.ignore_uninstall {
            Effect::Nothing
        } else {
            Effect::Stage(StagedOperation::Install(RulesVersion::system(m.system_iana.clone())))
        };
        m.start(effect);
        Ok(None)
    }

    fn reboot_and_wait_online(&self, _timeout: Duration) -> Result<bool, DeviceError> {
        let mut m = self.model.lock();
        m.actions.push(DeviceAction::Reboot);
        m.pending = None;
        if m.faults.boot_never_completes {
            return Ok(false);
        }
        match std::mem::replace(&mut m.staged, StagedOperation::None) {
            StagedOperation::Install(version) => {
                m.installed = Some(version);
                m.install_state = InstallState::Installed;
            }
            StagedOperation::Uninstall => {
                m.installed = None;
                m.install_state = InstallState::NotInstalled;
            }
            StagedOperation::None => {}
        }
        Ok(true)
    }

    fn query_diagnostic_field(&self, field: StateType) -> Result<String, DeviceError> {
        let mut m = self.model.lock();
        if m.faults.fail_queries_after.is_some_and(|n| m.queries >= n) {
            return Err(DeviceError::QueryFailed {
                field,
                reason: "error: device offline".to_string(),
            });
        }
        m.queries += 1;
        m.tick();

        let model = &mut *m;
        if model.pending.is_none() {
            if let Some(stale) = model.faults.stale_field.as_mut() {
                if stale.field == field && stale.reads > 0 {
                    stale.reads -= 1;
                    return Ok(format!("{}: {}\n", field.label(), stale.value));
                }
            }
        }
        Ok(format!("{}: {}\n", field.label(), model.value(field)))
    }

    fn dump_state(&self) -> Result<String, DeviceError> {
        let mut m = self.model.lock();
        m.actions.push(DeviceAction::Dump);
        let mut out = String::from("Time zone rules manager state:\n");
        for field in StateType::ALL {
            out.push_str(&format!("  {}: {}\n", field.label(), m.value(field)));
        }
        Ok(out)
    }

    fn list_installed_packages(&self) -> Result<BTreeSet<String>, DeviceError> {
        let mut m = self.model.lock();
        m.actions.push(DeviceAction::ListPackages);
        Ok(m.packages.clone())
    }
}
