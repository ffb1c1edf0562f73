//! Error types for device access
//!
//! A `DeviceError` always means the command channel itself misbehaved:
//! the process could not be started, the command failed, or the device
//! answered with something we cannot parse. State mismatches are not
//! device errors; the harness reports those separately.

use crate::state::StateType;

/// Device access errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The transport process could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A device command completed unsuccessfully
    #[error("command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    /// A diagnostic state query could not be executed
    #[error("query for {field} failed: {reason}")]
    QueryFailed { field: StateType, reason: String },

    /// A diagnostic state query returned output we cannot parse
    #[error("unparsable output for {field}: {output:?}")]
    Unparsable { field: StateType, output: String },

    /// Local file access failed (package files, fixtures)
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    /// Check if the error came from reading a state field
    #[inline]
    #[must_use]
    pub fn is_query_error(&self) -> bool {
        matches!(self, Self::QueryFailed { .. } | Self::Unparsable { .. })
    }
}
