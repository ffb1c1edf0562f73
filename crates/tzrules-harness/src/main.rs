//! `tzrules-xts`: run the time zone rules update compliance scenarios on a device

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tzrules_device::{AdbDevice, DeviceTransport};
use tzrules_harness::{logging, HarnessConfig, Scenario, ScenarioRunner};

fn cli() -> Command {
    Command::new("tzrules-xts")
        .version(tzrules_harness::VERSION)
        .about("Time zone rules update compliance checks")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("package")
                .long("package")
                .global(true)
                .help("Package name of the time zone data app"),
        )
        .arg(
            Arg::new("apk-prefix")
                .long("apk-prefix")
                .global(true)
                .help("File name prefix of the fixture packages"),
        )
        .arg(
            Arg::new("fixtures")
                .long("fixtures")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the fixture packages"),
        )
        .arg(
            Arg::new("serial")
                .long("serial")
                .short('s')
                .global(true)
                .help("Serial of the device to test"),
        )
        .arg(
            Arg::new("adb")
                .long("adb")
                .global(true)
                .help("Path to the adb executable"),
        )
        .arg(
            Arg::new("settle-delay-ms")
                .long("settle-delay-ms")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Wait before checking that an older package was not staged"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Print the report as JSON"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Write logs as JSON lines"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log debug output"),
        )
        .subcommand(
            Command::new("run")
                .about("Run the compliance scenarios")
                .arg(
                    Arg::new("scenario")
                        .long("scenario")
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(Scenario))
                        .help("Scenario to run (repeatable, default: all)"),
                ),
        )
        .subcommand(Command::new("reset").about("Reset the device to the system rules version"))
        .subcommand(
            Command::new("state")
                .about("Print the device's time zone rules state")
                .arg(
                    Arg::new("raw")
                        .long("raw")
                        .action(ArgAction::SetTrue)
                        .help("Print the full diagnostic dump"),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> Result<HarnessConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => {
            let package = matches
                .get_one::<String>("package")
                .context("--package is required when no --config is given")?;
            let prefix = matches
                .get_one::<String>("apk-prefix")
                .context("--apk-prefix is required when no --config is given")?;
            HarnessConfig::new(package, prefix)
        }
    };

    if let Some(package) = matches.get_one::<String>("package") {
        config.package_name.clone_from(package);
    }
    if let Some(prefix) = matches.get_one::<String>("apk-prefix") {
        config.apk_prefix.clone_from(prefix);
    }
    if let Some(dir) = matches.get_one::<PathBuf>("fixtures") {
        config.fixtures_dir.clone_from(dir);
    }
    if let Some(serial) = matches.get_one::<String>("serial") {
        config.serial = Some(serial.clone());
    }
    if let Some(adb) = matches.get_one::<String>("adb") {
        config.adb_path.clone_from(adb);
    }
    if let Some(delay) = matches.get_one::<u64>("settle-delay-ms") {
        config.rejection_settle_delay_ms = *delay;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn device(config: &HarnessConfig) -> AdbDevice {
    let device =
        AdbDevice::new(&config.adb_path).with_boot_poll_interval(config.boot_poll_interval());
    match &config.serial {
        Some(serial) => device.with_serial(serial),
        None => device,
    }
}

/// Returns whether the command succeeded
fn run(matches: &ArgMatches) -> Result<bool> {
    let config = load_config(matches)?;
    let runner = ScenarioRunner::from_config(device(&config), &config);
    let json = matches.get_flag("json");

    match matches.subcommand() {
        Some(("run", args)) => {
            let scenarios: Vec<Scenario> = match args.get_many::<Scenario>("scenario") {
                Some(selected) => selected.copied().collect(),
                None => Scenario::ALL.to_vec(),
            };

            let report = runner.run_suite(&scenarios);
            if json {
                println!("{}", report.to_json().context("serializing report")?);
            } else {
                println!("{}", report.generate_text());
            }
            Ok(report.passed())
        }
        Some(("reset", _)) => {
            let outcome = runner.reconciler().reset_to_clean()?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "system_version": outcome.system_version.to_string(),
                        "cleared_staged_operation": outcome.cleared_staged_operation,
                        "uninstalls": outcome.uninstalls,
                    })
                );
            } else {
                println!("Device reset to system rules {}", outcome.system_version);
                println!("  Cleared staged operation: {}", outcome.cleared_staged_operation);
                println!("  Uninstalls: {}", outcome.uninstalls);
            }
            Ok(true)
        }
        Some(("state", args)) => {
            if args.get_flag("raw") {
                print!("{}", runner.reconciler().device().dump_state()?);
                return Ok(true);
            }

            let fields = runner.reconciler().state_dump()?;
            if json {
                let map: serde_json::Map<String, serde_json::Value> = fields
                    .iter()
                    .map(|(field, value)| (field.name().to_string(), value.clone().into()))
                    .collect();
                println!("{}", serde_json::Value::Object(map));
            } else {
                for (field, value) in &fields {
                    println!("{}: {}", field.label(), value);
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn main() {
    let matches = cli().get_matches();
    logging::init(matches.get_flag("verbose"), matches.get_flag("log-json"));

    let code = match run(&matches) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            2
        }
    };
    std::process::exit(code);
}
