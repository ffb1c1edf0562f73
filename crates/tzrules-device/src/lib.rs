//! tzrules-device - Device side of the time zone rules update checks
//!
//! Describes what the host can observe about a device's rules-version staging
//! subsystem and how it talks to the device:
//! - The seven diagnostic state fields and their single-character codes
//! - Rules version values and staged operation types
//! - The `DeviceTransport` trait the harness drives
//! - An `adb` transport built on a `CommandRunner` seam
//!
//! # Example
//!
//! ```rust,ignore
//! use tzrules_device::{AdbDevice, StateType, read_state};
//!
//! let device = AdbDevice::new("adb").with_serial("emulator-5554");
//! let staged = read_state(&device, StateType::StagedOperationType)?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod adb;
pub mod clock;
pub mod error;
pub mod reader;
pub mod state;
pub mod transport;

pub use adb::{AdbDevice, CommandOutput, CommandRunner, SystemRunner};
pub use clock::{Sleeper, ThreadSleeper};
pub use error::DeviceError;
pub use reader::{parse_state_line, read_state};
pub use state::{
    ActiveRulesVersion, InstallState, RulesVersion, RulesVersionError, StagedOperation,
    StagedOperationType, StateType,
};
pub use transport::{DeviceTransport, InstallFlags};
