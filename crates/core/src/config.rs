//! Environment variable helpers shared by the client, pipeline and CLI
//! configuration loaders.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read a required variable, rejecting empty values.
pub fn require_var(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::Missing(var)),
    }
}

/// Read and parse an optional variable, falling back to `default` when it
/// is unset or blank.
pub fn parse_var_or<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_value(var, &value),
        _ => Ok(default),
    }
}

/// Parse a raw value for `var`, reporting the variable name on failure.
pub fn parse_value<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: format!("'{}': {e}", value.trim()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers() {
        let v: u64 = parse_value("X", " 1500 ").unwrap();
        assert_eq!(v, 1500);
    }

    #[test]
    fn reports_variable_on_bad_value() {
        let err = parse_value::<u64>("CARTOON_STORY_POLL_MS", "soon").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("CARTOON_STORY_POLL_MS"), "{msg}");
        assert!(msg.contains("soon"), "{msg}");
    }
}
