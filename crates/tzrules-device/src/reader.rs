//! Device state reader
//!
//! A single-field query prints one line, `"<Label>: <value>\n"`. The reader
//! keeps what follows the first `:` and drops exactly one character from each
//! end of it (the space the device adds after the colon and the line
//! terminator). Interpreting the value is left to callers.

use crate::error::DeviceError;
use crate::state::StateType;
use crate::transport::DeviceTransport;

/// Query one state field and return its raw value
///
/// # Errors
/// - `DeviceError::QueryFailed` if the device could not be queried
/// - `DeviceError::Unparsable` if the output is not a `Label: value` line
pub fn read_state<D>(device: &D, field: StateType) -> Result<String, DeviceError>
where
    D: DeviceTransport + ?Sized,
{
    let output = device
        .query_diagnostic_field(field)
        .map_err(|e| match e {
            DeviceError::QueryFailed { .. } | DeviceError::Unparsable { .. } => e,
            other => DeviceError::QueryFailed {
                field,
                reason: other.to_string(),
            },
        })?;
    let value = parse_state_line(field, &output)?;
    tracing::debug!(field = %field, value = %value, "read device state");
    Ok(value)
}

/// Extract the value from a `"<Label>: <value>\n"` line
///
/// # Errors
/// `DeviceError::Unparsable` when there is no `:` or the text after it is too
/// short to carry both delimiters.
pub fn parse_state_line(field: StateType, output: &str) -> Result<String, DeviceError> {
    let unparsable = || DeviceError::Unparsable {
        field,
        output: output.to_string(),
    };

    let (_, rest) = output.split_once(':').ok_or_else(unparsable)?;

    let mut chars = rest.chars();
    if chars.next().is_none() || chars.next_back().is_none() {
        return Err(unparsable());
    }
    Ok(chars.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_label_and_single_delimiters() {
        let value = parse_state_line(StateType::StagedOperationType, "Staged operation: Install\n");
        assert_eq!(value.unwrap(), "Install");
    }

    #[test]
    fn keeps_inner_whitespace_untouched() {
        let value = parse_state_line(StateType::SystemRulesVersion, "System rules version:  2017a \n");
        assert_eq!(value.unwrap(), " 2017a ");
    }

    #[test]
    fn value_may_contain_commas_and_parentheses() {
        let value = parse_state_line(
            StateType::ActiveRulesVersion,
            "Active rules version (ICU, libcore): 2017a,2017a\n",
        );
        assert_eq!(value.unwrap(), "2017a,2017a");
    }

    #[test]
    fn empty_value_between_delimiters_is_allowed() {
        let value = parse_state_line(StateType::StagedInstallVersion, "Staged rules version: \n");
        assert_eq!(value.unwrap(), "");
    }

    #[test]
    fn rejects_output_without_label() {
        let err = parse_state_line(StateType::OperationInProgress, "true\n").unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Unparsable {
                field: StateType::OperationInProgress,
                ..
            }
        ));
    }

    #[test]
    fn rejects_value_too_short_for_delimiters() {
        assert!(parse_state_line(StateType::OperationInProgress, "Operation in progress:").is_err());
        assert!(parse_state_line(StateType::OperationInProgress, "Operation in progress:x").is_err());
    }
}
