//! `adb` transport
//!
//! `AdbDevice` implements `DeviceTransport` by invoking `adb`. Process
//! spawning sits behind `CommandRunner` so the argument vectors and the output
//! interpretation can be tested without a device attached.

use crate::clock::{Sleeper, ThreadSleeper};
use crate::error::DeviceError;
use crate::state::StateType;
use crate::transport::{DeviceTransport, InstallFlags};
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

/// Captured result of one finished command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given stderr
    #[must_use]
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    fn first_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
    }
}

/// Runs an external program to completion
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner {
    /// Run `program` with `args`, capturing its output
    ///
    /// Only a failure to start the process is an error; a non-zero exit is
    /// reported through `CommandOutput::success`.
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DeviceError>;
}

/// Production runner built on `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, DeviceError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| DeviceError::Spawn {
                program: program.to_string(),
                source,
            })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Device reached through `adb`
pub struct AdbDevice {
    adb_path: String,
    serial: Option<String>,
    runner: Box<dyn CommandRunner>,
    sleeper: Box<dyn Sleeper>,
    boot_poll_interval: Duration,
}

impl AdbDevice {
    /// Device using the given `adb` binary and the system process runner
    #[must_use]
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial: None,
            runner: Box::new(SystemRunner),
            sleeper: Box::new(ThreadSleeper),
            boot_poll_interval: Duration::from_secs(1),
        }
    }

    /// Target a specific device serial (`-s`)
    #[must_use]
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// With custom command runner
    #[must_use]
    pub fn with_runner(mut self, runner: Box<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// With custom sleeper for boot polling
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// With boot-completion poll interval
    #[must_use]
    pub fn with_boot_poll_interval(mut self, interval: Duration) -> Self {
        self.boot_poll_interval = interval;
        self
    }

    fn args<I, S>(&self, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = Vec::new();
        if let Some(serial) = &self.serial {
            args.push("-s".to_string());
            args.push(serial.clone());
        }
        args.extend(rest.into_iter().map(Into::into));
        args
    }

    fn adb<I, S>(&self, rest: I) -> Result<(String, CommandOutput), DeviceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = self.args(rest);
        let command_line = format!("{} {}", self.adb_path, args.join(" "));
        tracing::debug!(command = %command_line, "running adb");
        let output = self.runner.run(&self.adb_path, &args)?;
        Ok((command_line, output))
    }

    fn adb_checked<I, S>(&self, rest: I) -> Result<CommandOutput, DeviceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (command, output) = self.adb(rest)?;
        if output.success {
            Ok(output)
        } else {
            Err(DeviceError::CommandFailed {
                message: output.first_line().unwrap_or("non-zero exit").to_string(),
                command,
            })
        }
    }

    fn boot_completed(&self) -> bool {
        match self.adb(["shell", "getprop", "sys.boot_completed"]) {
            Ok((_, output)) => output.success && output.stdout.trim() == "1",
            Err(e) => {
                tracing::debug!(error = %e, "boot check failed, device still offline");
                false
            }
        }
    }
}

impl DeviceTransport for AdbDevice {
    fn install_package_file(&self, path: &Path, flags: InstallFlags) -> Result<(), DeviceError> {
        let mut rest = vec!["install".to_string()];
        if flags.replace {
            rest.push("-r".to_string());
        }
        rest.push(path.display().to_string());

        let (command, output) = self.adb(rest)?;
        if !output.success || output.stdout.contains("Failure") {
            return Err(DeviceError::CommandFailed {
                message: output.first_line().unwrap_or("install failed").to_string(),
                command,
            });
        }
        tracing::info!(path = %path.display(), "installed package file");
        Ok(())
    }

    fn uninstall_package(&self, package: &str) -> Result<Option<String>, DeviceError> {
        let (_, output) = self.adb(["shell", "pm", "uninstall", package])?;
        if output.stdout.contains("Success") {
            tracing::info!(package, "uninstalled package");
            return Ok(None);
        }
        let code = output
            .first_line()
            .unwrap_or("uninstall failed")
            .to_string();
        tracing::info!(package, code = %code, "nothing uninstalled");
        Ok(Some(code))
    }

    fn reboot_and_wait_online(&self, timeout: Duration) -> Result<bool, DeviceError> {
        self.adb_checked(["reboot"])?;
        // Older adb lacks wait-for-disconnect; boot polling still covers it.
        if let Err(e) = self.adb_checked(["wait-for-disconnect"]) {
            tracing::debug!(error = %e, "wait-for-disconnect unavailable");
        }

        // Bounded by the poll budget and by wall-clock time, whichever runs
        // out first.
        let deadline = Instant::now() + timeout;
        let mut waited = Duration::ZERO;
        loop {
            if self.boot_completed() {
                tracing::info!(waited = ?waited, "device boot completed");
                return Ok(true);
            }
            if waited >= timeout || Instant::now() >= deadline {
                tracing::warn!(timeout = ?timeout, "device did not finish booting");
                return Ok(false);
            }
            self.sleeper.sleep(self.boot_poll_interval);
            waited += self.boot_poll_interval;
        }
    }

    fn query_diagnostic_field(&self, field: StateType) -> Result<String, DeviceError> {
        let code = field.code().to_string();
        let (_, output) = self.adb(["shell", "dumpsys", "timezone", "-format_state", code.as_str()])?;
        if !output.success {
            return Err(DeviceError::QueryFailed {
                field,
                reason: output.first_line().unwrap_or("non-zero exit").to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn dump_state(&self) -> Result<String, DeviceError> {
        Ok(self.adb_checked(["shell", "dumpsys", "timezone"])?.stdout)
    }

    fn list_installed_packages(&self) -> Result<BTreeSet<String>, DeviceError> {
        let output = self.adb_checked(["shell", "pm", "list", "packages"])?;
        Ok(output
            .stdout
            .lines()
            .filter_map(|line| line.trim().strip_prefix("package:"))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::{eq, function};
    use std::path::PathBuf;

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _duration: Duration) {}
    }

    fn args_are(expected: &[&str]) -> impl Fn(&[String]) -> bool + Send + 'static {
        let expected: Vec<String> = expected.iter().map(|s| (*s).to_string()).collect();
        move |args: &[String]| args == expected.as_slice()
    }

    fn device(runner: MockCommandRunner) -> AdbDevice {
        AdbDevice::new("adb")
            .with_serial("emulator-5554")
            .with_runner(Box::new(runner))
            .with_sleeper(Box::new(NoSleep))
    }

    #[test]
    fn query_uses_format_state_code() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .with(
                eq("adb"),
                function(args_are(&[
                    "-s",
                    "emulator-5554",
                    "shell",
                    "dumpsys",
                    "timezone",
                    "-format_state",
                    "o",
                ])),
            )
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("Staged operation: None\n")));

        let raw = device(runner)
            .query_diagnostic_field(StateType::StagedOperationType)
            .unwrap();
        assert_eq!(raw, "Staged operation: None\n");
    }

    #[test]
    fn failed_query_is_a_query_error() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(CommandOutput::failed("error: device offline")));

        let err = device(runner)
            .query_diagnostic_field(StateType::OperationInProgress)
            .unwrap_err();
        assert!(err.is_query_error());
        assert!(err.to_string().contains("device offline"));
    }

    #[test]
    fn install_passes_replace_flag_and_path() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .with(
                eq("adb"),
                function(args_are(&["-s", "emulator-5554", "install", "-r", "/tmp/x/temp1.apk"])),
            )
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("Performing Streamed Install\nSuccess\n")));

        device(runner)
            .install_package_file(&PathBuf::from("/tmp/x/temp1.apk"), InstallFlags::replace())
            .unwrap();
    }

    #[test]
    fn install_failure_output_is_an_error() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _| {
            Ok(CommandOutput::ok("Failure [INSTALL_FAILED_VERSION_DOWNGRADE]\n"))
        });

        let err = device(runner)
            .install_package_file(&PathBuf::from("a.apk"), InstallFlags::default())
            .unwrap_err();
        assert!(matches!(err, DeviceError::CommandFailed { .. }));
    }

    #[test]
    fn uninstall_success_returns_none() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .with(
                eq("adb"),
                function(args_are(&["-s", "emulator-5554", "shell", "pm", "uninstall", "com.oem.tzdata"])),
            )
            .returning(|_, _| Ok(CommandOutput::ok("Success\n")));

        assert_eq!(device(runner).uninstall_package("com.oem.tzdata").unwrap(), None);
    }

    #[test]
    fn uninstall_failure_returns_error_code() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _| Ok(CommandOutput::ok("Failure [DELETE_FAILED_INTERNAL_ERROR]\n")));

        let code = device(runner).uninstall_package("com.oem.tzdata").unwrap();
        assert_eq!(code.as_deref(), Some("Failure [DELETE_FAILED_INTERNAL_ERROR]"));
    }

    #[test]
    fn list_packages_strips_prefix() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _| {
            Ok(CommandOutput::ok(
                "package:com.android.phone\npackage:com.oem.tzdata\n\n",
            ))
        });

        let packages = device(runner).list_installed_packages().unwrap();
        assert!(packages.contains("com.oem.tzdata"));
        assert_eq!(packages.len(), 2);
    }

    #[test]
    fn reboot_polls_until_boot_completed() {
        let mut runner = MockCommandRunner::new();
        let mut boot_checks = 0;
        runner.expect_run().returning(move |_, args| {
            if args.iter().any(|a| a == "getprop") {
                boot_checks += 1;
                let value = if boot_checks < 3 { "" } else { "1" };
                Ok(CommandOutput::ok(format!("{value}\n")))
            } else {
                Ok(CommandOutput::ok(""))
            }
        });

        let online = device(runner)
            .reboot_and_wait_online(Duration::from_secs(60))
            .unwrap();
        assert!(online);
    }

    #[test]
    fn reboot_times_out_when_boot_never_completes() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, args| {
            if args.iter().any(|a| a == "getprop") {
                Ok(CommandOutput::failed("error: no devices/emulators found"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        });

        let online = device(runner)
            .with_boot_poll_interval(Duration::from_millis(500))
            .reboot_and_wait_online(Duration::from_secs(5))
            .unwrap();
        assert!(!online);
    }

    #[test]
    fn reboot_with_zero_poll_interval_still_times_out() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, args| {
            if args.iter().any(|a| a == "getprop") {
                Ok(CommandOutput::failed("error: no devices/emulators found"))
            } else {
                Ok(CommandOutput::ok(""))
            }
        });

        let online = device(runner)
            .with_boot_poll_interval(Duration::ZERO)
            .reboot_and_wait_online(Duration::from_millis(50))
            .unwrap();
        assert!(!online);
    }
}
